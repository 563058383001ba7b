use ndarray::{Array2, ArrayView2, Zip};

/// Huber loss averaged over every element, quadratic within `delta`.
pub fn huber_loss(predictions: ArrayView2<'_, f64>, targets: ArrayView2<'_, f64>, delta: f64) -> f64 {
    let count = predictions.len();
    if count == 0 {
        return 0.0;
    }
    let mut total = 0.0;
    Zip::from(&predictions).and(&targets).for_each(|&p, &t| {
        let err = (p - t).abs();
        total += if err <= delta {
            0.5 * err * err
        } else {
            delta * (err - 0.5 * delta)
        };
    });
    total / count as f64
}

/// Gradient of [`huber_loss`] with respect to the predictions.
pub fn huber_gradient(
    predictions: ArrayView2<'_, f64>,
    targets: ArrayView2<'_, f64>,
    delta: f64,
) -> Array2<f64> {
    let count = predictions.len().max(1) as f64;
    let mut grad = Array2::zeros(predictions.raw_dim());
    Zip::from(&mut grad)
        .and(&predictions)
        .and(&targets)
        .for_each(|g, &p, &t| {
            *g = (p - t).clamp(-delta, delta) / count;
        });
    grad
}

/// Sum of squared errors, used to accumulate RMSE across batches.
pub fn squared_error_sum(predictions: ArrayView2<'_, f64>, targets: ArrayView2<'_, f64>) -> f64 {
    let mut total = 0.0;
    Zip::from(&predictions).and(&targets).for_each(|&p, &t| {
        total += (p - t) * (p - t);
    });
    total
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_huber_quadratic_and_linear_regions() {
        let preds = array![[0.5, 3.0]];
        let targets = array![[0.0, 0.0]];
        // 0.5 * 0.25 = 0.125 ; 1.0 * (3.0 - 0.5) = 2.5
        let loss = huber_loss(preds.view(), targets.view(), 1.0);
        assert!((loss - (0.125 + 2.5) / 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_huber_gradient_is_clipped() {
        let preds = array![[0.5, 3.0, -4.0]];
        let targets = array![[0.0, 0.0, 0.0]];
        let grad = huber_gradient(preds.view(), targets.view(), 1.0);
        assert!((grad[[0, 0]] - 0.5 / 3.0).abs() < 1e-12);
        assert!((grad[[0, 1]] - 1.0 / 3.0).abs() < 1e-12);
        assert!((grad[[0, 2]] + 1.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_perfect_prediction_has_zero_loss() {
        let preds = array![[1.0, 2.0], [3.0, 4.0]];
        assert_eq!(huber_loss(preds.view(), preds.view(), 1.0), 0.0);
        assert_eq!(squared_error_sum(preds.view(), preds.view()), 0.0);
    }
}
