use ndarray::{ArrayD, ArrayViewD, ArrayViewMutD, Zip};

/// Adam with bias correction. State is allocated on the first step from the
/// gradient shapes and must stay aligned with the parameter order.
#[derive(Debug, Clone)]
pub struct Adam {
    pub learning_rate: f64,
    pub beta1: f64,
    pub beta2: f64,
    pub epsilon: f64,
    step: i32,
    first_moment: Vec<ArrayD<f64>>,
    second_moment: Vec<ArrayD<f64>>,
}

impl Adam {
    pub fn new(learning_rate: f64) -> Self {
        Self {
            learning_rate,
            beta1: 0.9,
            beta2: 0.999,
            epsilon: 1e-7,
            step: 0,
            first_moment: Vec::new(),
            second_moment: Vec::new(),
        }
    }

    pub fn steps_taken(&self) -> i32 {
        self.step
    }

    pub fn step(&mut self, params: &mut [ArrayViewMutD<'_, f64>], grads: &[ArrayViewD<'_, f64>]) {
        if self.first_moment.len() != grads.len() {
            self.first_moment = grads.iter().map(|g| ArrayD::zeros(g.raw_dim())).collect();
            self.second_moment = grads.iter().map(|g| ArrayD::zeros(g.raw_dim())).collect();
        }

        self.step += 1;
        let (beta1, beta2, eps) = (self.beta1, self.beta2, self.epsilon);
        let lr_t = self.learning_rate * (1.0 - beta2.powi(self.step)).sqrt()
            / (1.0 - beta1.powi(self.step));

        for (i, (param, grad)) in params.iter_mut().zip(grads).enumerate() {
            let m = &mut self.first_moment[i];
            let v = &mut self.second_moment[i];
            Zip::from(param)
                .and(m)
                .and(v)
                .and(grad)
                .for_each(|p, m, v, &g| {
                    *m = beta1 * *m + (1.0 - beta1) * g;
                    *v = beta2 * *v + (1.0 - beta2) * g * g;
                    *p -= lr_t * *m / (v.sqrt() + eps);
                });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_first_step_moves_by_learning_rate() {
        let mut adam = Adam::new(0.1);
        let mut w = array![1.0, -2.0].into_dyn();
        let g = array![0.5, -3.0].into_dyn();

        adam.step(&mut [w.view_mut()], &[g.view()]);

        // Bias-corrected first step is lr * sign(g) up to epsilon.
        assert!((w[0] - 0.9).abs() < 1e-5);
        assert!((w[1] + 1.9).abs() < 1e-5);
        assert_eq!(adam.steps_taken(), 1);
    }

    #[test]
    fn test_minimises_quadratic() {
        let mut adam = Adam::new(0.05);
        let mut w = array![3.0].into_dyn();
        for _ in 0..500 {
            let g = w.mapv(|x| 2.0 * x);
            adam.step(&mut [w.view_mut()], &[g.view()]);
        }
        assert!(w[0].abs() < 1e-2, "w = {}", w[0]);
    }
}
