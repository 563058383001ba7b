//! Stacked forecaster: `LSTM(units) -> Dense(relu) -> Dense(horizon)`.

use super::dense::{Activation, DenseCache, DenseGradients, DenseLayer};
use super::lstm::{LstmCache, LstmGradients, LstmLayer};
use crate::domain::errors::PipelineError;
use ndarray::{Array2, ArrayView3, ArrayViewD, ArrayViewMutD, Axis, concatenate};
use rand::Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Sequences per rayon task during inference.
const PREDICT_CHUNK: usize = 256;

/// Shape of the network, stored with every saved model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkArchitecture {
    pub window_size: usize,
    pub feature_count: usize,
    pub lstm_units: usize,
    pub dense_units: usize,
    pub horizon: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastNetwork {
    pub architecture: NetworkArchitecture,
    pub lstm: LstmLayer,
    pub hidden: DenseLayer,
    pub output: DenseLayer,
}

pub struct NetworkCache {
    lstm: LstmCache,
    hidden: DenseCache,
    output: DenseCache,
}

pub struct NetworkGradients {
    pub lstm: LstmGradients,
    pub hidden: DenseGradients,
    pub output: DenseGradients,
}

impl NetworkGradients {
    /// Gradient views in the same order as [`ForecastNetwork::parameters_mut`].
    pub fn views(&self) -> Vec<ArrayViewD<'_, f64>> {
        vec![
            self.lstm.kernel.view().into_dyn(),
            self.lstm.recurrent_kernel.view().into_dyn(),
            self.lstm.bias.view().into_dyn(),
            self.hidden.weights.view().into_dyn(),
            self.hidden.bias.view().into_dyn(),
            self.output.weights.view().into_dyn(),
            self.output.bias.view().into_dyn(),
        ]
    }

    /// Adds the derivative of `l2 * ||lstm.kernel||²`.
    pub fn add_kernel_l2(&mut self, network: &ForecastNetwork, l2: f64) {
        if l2 > 0.0 {
            self.lstm.kernel.scaled_add(2.0 * l2, &network.lstm.kernel);
        }
    }
}

impl ForecastNetwork {
    pub fn new<R: Rng + ?Sized>(architecture: NetworkArchitecture, rng: &mut R) -> Self {
        let lstm = LstmLayer::new(architecture.feature_count, architecture.lstm_units, rng);
        let hidden = DenseLayer::new(
            architecture.lstm_units,
            architecture.dense_units,
            Activation::Relu,
            rng,
        );
        let output = DenseLayer::new(
            architecture.dense_units,
            architecture.horizon,
            Activation::Linear,
            rng,
        );
        Self {
            architecture,
            lstm,
            hidden,
            output,
        }
    }

    pub fn parameter_count(&self) -> usize {
        self.lstm.parameter_count() + self.hidden.parameter_count() + self.output.parameter_count()
    }

    fn check_input(&self, windows: &ArrayView3<'_, f64>) -> Result<(), PipelineError> {
        let (_, w, f) = windows.dim();
        if w != self.architecture.window_size || f != self.architecture.feature_count {
            return Err(PipelineError::InvalidInput(format!(
                "model expects windows of shape [_, {}, {}], got [_, {}, {}]",
                self.architecture.window_size, self.architecture.feature_count, w, f
            )));
        }
        Ok(())
    }

    fn forward_chunk(&self, windows: ArrayView3<'_, f64>) -> Array2<f64> {
        let h = self.lstm.forward(windows);
        self.output.forward(&self.hidden.forward(&h))
    }

    /// Scaled predictions `[N, H]` for scaled windows `[N, W, F]`.
    pub fn predict(&self, windows: ArrayView3<'_, f64>) -> Result<Array2<f64>, PipelineError> {
        self.check_input(&windows)?;
        if windows.len_of(Axis(0)) == 0 {
            return Ok(Array2::zeros((0, self.architecture.horizon)));
        }

        let chunks: Vec<ArrayView3<'_, f64>> =
            windows.axis_chunks_iter(Axis(0), PREDICT_CHUNK).collect();
        let outputs: Vec<Array2<f64>> = chunks
            .into_par_iter()
            .map(|chunk| self.forward_chunk(chunk))
            .collect();
        let views: Vec<_> = outputs.iter().map(|o| o.view()).collect();
        concatenate(Axis(0), &views).map_err(|e| PipelineError::InvalidInput(e.to_string()))
    }

    pub fn forward_train(
        &self,
        windows: ArrayView3<'_, f64>,
    ) -> Result<(Array2<f64>, NetworkCache), PipelineError> {
        self.check_input(&windows)?;
        let (h, lstm) = self.lstm.forward_train(windows);
        let (hidden_out, hidden) = self.hidden.forward_train(h);
        let (out, output) = self.output.forward_train(hidden_out);
        Ok((
            out,
            NetworkCache {
                lstm,
                hidden,
                output,
            },
        ))
    }

    pub fn backward(&self, cache: &NetworkCache, d_output: &Array2<f64>) -> NetworkGradients {
        let (output, d_hidden_out) = self.output.backward(&cache.output, d_output);
        let (hidden, d_h) = self.hidden.backward(&cache.hidden, &d_hidden_out);
        let lstm = self.lstm.backward(&cache.lstm, d_h);
        NetworkGradients {
            lstm,
            hidden,
            output,
        }
    }

    /// `l2 * ||lstm.kernel||²`; recurrent weights and biases are not penalised.
    pub fn kernel_l2_penalty(&self, l2: f64) -> f64 {
        l2 * self.lstm.kernel.iter().map(|w| w * w).sum::<f64>()
    }

    /// Mutable parameter views in a fixed order shared with [`NetworkGradients::views`].
    pub fn parameters_mut(&mut self) -> Vec<ArrayViewMutD<'_, f64>> {
        vec![
            self.lstm.kernel.view_mut().into_dyn(),
            self.lstm.recurrent_kernel.view_mut().into_dyn(),
            self.lstm.bias.view_mut().into_dyn(),
            self.hidden.weights.view_mut().into_dyn(),
            self.hidden.bias.view_mut().into_dyn(),
            self.output.weights.view_mut().into_dyn(),
            self.output.bias.view_mut().into_dyn(),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ml::loss::{huber_gradient, huber_loss};
    use ndarray::Array3;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn architecture() -> NetworkArchitecture {
        NetworkArchitecture {
            window_size: 4,
            feature_count: 3,
            lstm_units: 5,
            dense_units: 4,
            horizon: 2,
        }
    }

    #[test]
    fn test_same_seed_same_weights() {
        let a = ForecastNetwork::new(architecture(), &mut StdRng::seed_from_u64(42));
        let b = ForecastNetwork::new(architecture(), &mut StdRng::seed_from_u64(42));
        let c = ForecastNetwork::new(architecture(), &mut StdRng::seed_from_u64(43));
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_predict_shape_and_chunking() {
        let net = ForecastNetwork::new(architecture(), &mut StdRng::seed_from_u64(1));
        let windows = Array3::from_shape_fn((PREDICT_CHUNK + 7, 4, 3), |(n, t, f)| {
            ((n + t + f) % 9) as f64 / 9.0
        });
        let preds = net.predict(windows.view()).unwrap();
        assert_eq!(preds.dim(), (PREDICT_CHUNK + 7, 2));

        // Chunked inference must agree with one big forward pass.
        let direct = net.forward_chunk(windows.view());
        for (a, b) in preds.iter().zip(direct.iter()) {
            assert!((a - b).abs() < 1e-12);
        }
    }

    #[test]
    fn test_predict_rejects_wrong_shape() {
        let net = ForecastNetwork::new(architecture(), &mut StdRng::seed_from_u64(1));
        let windows = Array3::zeros((2, 5, 3));
        assert!(net.predict(windows.view()).is_err());
    }

    #[test]
    fn test_backward_matches_finite_differences_on_output_layer() {
        let mut net = ForecastNetwork::new(architecture(), &mut StdRng::seed_from_u64(3));
        let windows =
            Array3::from_shape_fn((3, 4, 3), |(n, t, f)| ((n * 5 + t * 2 + f) % 7) as f64 / 7.0);
        let targets = Array2::from_shape_fn((3, 2), |(n, h)| (n + h) as f64 * 0.3);

        let (out, cache) = net.forward_train(windows.view()).unwrap();
        let d_out = huber_gradient(out.view(), targets.view(), 1.0);
        let grads = net.backward(&cache, &d_out);

        let eps = 1e-6;
        let loss = |n: &ForecastNetwork| {
            let p = n.predict(windows.view()).unwrap();
            huber_loss(p.view(), targets.view(), 1.0)
        };

        let original = net.output.bias[1];
        net.output.bias[1] = original + eps;
        let plus = loss(&net);
        net.output.bias[1] = original - eps;
        let minus = loss(&net);
        net.output.bias[1] = original;
        assert!(((plus - minus) / (2.0 * eps) - grads.output.bias[1]).abs() < 1e-6);

        let original = net.lstm.kernel[[1, 3]];
        net.lstm.kernel[[1, 3]] = original + eps;
        let plus = loss(&net);
        net.lstm.kernel[[1, 3]] = original - eps;
        let minus = loss(&net);
        net.lstm.kernel[[1, 3]] = original;
        assert!(((plus - minus) / (2.0 * eps) - grads.lstm.kernel[[1, 3]]).abs() < 1e-6);
    }

    #[test]
    fn test_l2_applies_to_lstm_kernel_only() {
        let net = ForecastNetwork::new(architecture(), &mut StdRng::seed_from_u64(5));
        let expected: f64 = net.lstm.kernel.iter().map(|w| w * w).sum::<f64>() * 0.5;
        assert!((net.kernel_l2_penalty(0.5) - expected).abs() < 1e-12);

        let (out, cache) = net
            .forward_train(Array3::zeros((1, 4, 3)).view())
            .unwrap();
        let mut grads = net.backward(&cache, &Array2::zeros(out.raw_dim()));
        let recurrent_before = grads.lstm.recurrent_kernel.clone();
        grads.add_kernel_l2(&net, 0.5);
        assert_eq!(grads.lstm.recurrent_kernel, recurrent_before);
        assert!((grads.lstm.kernel[[0, 0]] - net.lstm.kernel[[0, 0]]).abs() < 1e-12);
    }

    #[test]
    fn test_views_align_with_parameters() {
        let mut net = ForecastNetwork::new(architecture(), &mut StdRng::seed_from_u64(5));
        let (out, cache) = net
            .forward_train(Array3::zeros((1, 4, 3)).view())
            .unwrap();
        let grads = net.backward(&cache, &Array2::zeros(out.raw_dim()));
        let grad_shapes: Vec<Vec<usize>> = grads.views().iter().map(|v| v.shape().to_vec()).collect();
        let param_shapes: Vec<Vec<usize>> = net
            .parameters_mut()
            .iter()
            .map(|v| v.shape().to_vec())
            .collect();
        assert_eq!(grad_shapes, param_shapes);
    }
}
