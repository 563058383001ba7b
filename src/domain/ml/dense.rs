use super::lstm::glorot_uniform;
use ndarray::{Array1, Array2, Axis};
use rand::Rng;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Activation {
    Linear,
    Relu,
}

impl Activation {
    fn apply(self, x: f64) -> f64 {
        match self {
            Activation::Linear => x,
            Activation::Relu => x.max(0.0),
        }
    }

    fn derivative(self, pre_activation: f64) -> f64 {
        match self {
            Activation::Linear => 1.0,
            Activation::Relu => {
                if pre_activation > 0.0 {
                    1.0
                } else {
                    0.0
                }
            }
        }
    }
}

/// Fully connected layer `y = act(x·weights + bias)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DenseLayer {
    /// `[in, out]`
    pub weights: Array2<f64>,
    pub bias: Array1<f64>,
    pub activation: Activation,
}

#[derive(Debug, Clone)]
pub struct DenseGradients {
    pub weights: Array2<f64>,
    pub bias: Array1<f64>,
}

#[derive(Debug, Clone)]
pub struct DenseCache {
    input: Array2<f64>,
    pre_activation: Array2<f64>,
}

impl DenseLayer {
    pub fn new<R: Rng + ?Sized>(
        inputs: usize,
        outputs: usize,
        activation: Activation,
        rng: &mut R,
    ) -> Self {
        Self {
            weights: glorot_uniform(inputs, outputs, rng),
            bias: Array1::zeros(outputs),
            activation,
        }
    }

    pub fn outputs(&self) -> usize {
        self.weights.ncols()
    }

    pub fn parameter_count(&self) -> usize {
        self.weights.len() + self.bias.len()
    }

    pub fn forward(&self, input: &Array2<f64>) -> Array2<f64> {
        let activation = self.activation;
        (input.dot(&self.weights) + &self.bias).mapv_into(|v| activation.apply(v))
    }

    pub fn forward_train(&self, input: Array2<f64>) -> (Array2<f64>, DenseCache) {
        let pre_activation = input.dot(&self.weights) + &self.bias;
        let activation = self.activation;
        let output = pre_activation.mapv(|v| activation.apply(v));
        (
            output,
            DenseCache {
                input,
                pre_activation,
            },
        )
    }

    /// Returns parameter gradients and the gradient with respect to the input.
    pub fn backward(
        &self,
        cache: &DenseCache,
        d_output: &Array2<f64>,
    ) -> (DenseGradients, Array2<f64>) {
        let activation = self.activation;
        let d_pre = d_output * &cache.pre_activation.mapv(|v| activation.derivative(v));
        let grads = DenseGradients {
            weights: cache.input.t().dot(&d_pre),
            bias: d_pre.sum_axis(Axis(0)),
        };
        let d_input = d_pre.dot(&self.weights.t());
        (grads, d_input)
    }
}
