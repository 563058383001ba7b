//! Single LSTM layer with batched forward pass and backpropagation through time.
//!
//! Gate blocks are packed along the last axis in `i, f, g, o` order:
//! `z = x·kernel + h·recurrent_kernel + bias`, shape `[B, 4U]`.

use ndarray::{Array1, Array2, ArrayView3, Axis, s};
use rand::Rng;
use serde::{Deserialize, Serialize};

pub(crate) fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

/// Glorot/Xavier uniform initialisation for a `(fan_in, fan_out)` matrix.
pub(crate) fn glorot_uniform<R: Rng + ?Sized>(
    fan_in: usize,
    fan_out: usize,
    rng: &mut R,
) -> Array2<f64> {
    let limit = (6.0 / (fan_in + fan_out) as f64).sqrt();
    Array2::from_shape_fn((fan_in, fan_out), |_| rng.random_range(-limit..limit))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LstmLayer {
    /// `[F, 4U]`
    pub kernel: Array2<f64>,
    /// `[U, 4U]`
    pub recurrent_kernel: Array2<f64>,
    /// `[4U]`, forget-gate block initialised to one.
    pub bias: Array1<f64>,
}

#[derive(Debug, Clone)]
pub struct LstmGradients {
    pub kernel: Array2<f64>,
    pub recurrent_kernel: Array2<f64>,
    pub bias: Array1<f64>,
}

/// Activations of one timestep kept for the backward pass.
#[derive(Debug, Clone)]
struct LstmStep {
    x: Array2<f64>,
    h_prev: Array2<f64>,
    c_prev: Array2<f64>,
    input_gate: Array2<f64>,
    forget_gate: Array2<f64>,
    candidate: Array2<f64>,
    output_gate: Array2<f64>,
    tanh_cell: Array2<f64>,
}

#[derive(Debug, Clone)]
pub struct LstmCache {
    steps: Vec<LstmStep>,
}

struct StepOutput {
    input_gate: Array2<f64>,
    forget_gate: Array2<f64>,
    candidate: Array2<f64>,
    output_gate: Array2<f64>,
    cell: Array2<f64>,
    tanh_cell: Array2<f64>,
    hidden: Array2<f64>,
}

impl LstmLayer {
    pub fn new<R: Rng + ?Sized>(input_size: usize, units: usize, rng: &mut R) -> Self {
        let mut bias = Array1::zeros(4 * units);
        bias.slice_mut(s![units..2 * units]).fill(1.0);
        Self {
            kernel: glorot_uniform(input_size, 4 * units, rng),
            recurrent_kernel: glorot_uniform(units, 4 * units, rng),
            bias,
        }
    }

    pub fn units(&self) -> usize {
        self.recurrent_kernel.nrows()
    }

    pub fn input_size(&self) -> usize {
        self.kernel.nrows()
    }

    pub fn parameter_count(&self) -> usize {
        self.kernel.len() + self.recurrent_kernel.len() + self.bias.len()
    }

    fn step(&self, x: &Array2<f64>, h_prev: &Array2<f64>, c_prev: &Array2<f64>) -> StepOutput {
        let u = self.units();
        let z = x.dot(&self.kernel) + h_prev.dot(&self.recurrent_kernel) + &self.bias;

        let input_gate = z.slice(s![.., 0..u]).mapv(sigmoid);
        let forget_gate = z.slice(s![.., u..2 * u]).mapv(sigmoid);
        let candidate = z.slice(s![.., 2 * u..3 * u]).mapv(f64::tanh);
        let output_gate = z.slice(s![.., 3 * u..4 * u]).mapv(sigmoid);

        let cell = &forget_gate * c_prev + &input_gate * &candidate;
        let tanh_cell = cell.mapv(f64::tanh);
        let hidden = &output_gate * &tanh_cell;

        StepOutput {
            input_gate,
            forget_gate,
            candidate,
            output_gate,
            cell,
            tanh_cell,
            hidden,
        }
    }

    /// Final hidden state `[B, U]` for windows `[B, W, F]`.
    pub fn forward(&self, windows: ArrayView3<'_, f64>) -> Array2<f64> {
        let batch = windows.len_of(Axis(0));
        let mut hidden = Array2::zeros((batch, self.units()));
        let mut cell = Array2::zeros((batch, self.units()));

        for t in 0..windows.len_of(Axis(1)) {
            let x = windows.slice(s![.., t, ..]).to_owned();
            let out = self.step(&x, &hidden, &cell);
            hidden = out.hidden;
            cell = out.cell;
        }
        hidden
    }

    pub fn forward_train(&self, windows: ArrayView3<'_, f64>) -> (Array2<f64>, LstmCache) {
        let batch = windows.len_of(Axis(0));
        let timesteps = windows.len_of(Axis(1));
        let mut hidden = Array2::zeros((batch, self.units()));
        let mut cell = Array2::zeros((batch, self.units()));
        let mut steps = Vec::with_capacity(timesteps);

        for t in 0..timesteps {
            let x = windows.slice(s![.., t, ..]).to_owned();
            let out = self.step(&x, &hidden, &cell);
            steps.push(LstmStep {
                x,
                h_prev: hidden,
                c_prev: cell,
                input_gate: out.input_gate,
                forget_gate: out.forget_gate,
                candidate: out.candidate,
                output_gate: out.output_gate,
                tanh_cell: out.tanh_cell,
            });
            hidden = out.hidden;
            cell = out.cell;
        }

        (hidden, LstmCache { steps })
    }

    /// Backpropagates the gradient of the final hidden state through every timestep.
    pub fn backward(&self, cache: &LstmCache, d_hidden: Array2<f64>) -> LstmGradients {
        let u = self.units();
        let mut grads = LstmGradients {
            kernel: Array2::zeros(self.kernel.raw_dim()),
            recurrent_kernel: Array2::zeros(self.recurrent_kernel.raw_dim()),
            bias: Array1::zeros(self.bias.raw_dim()),
        };

        let mut dh = d_hidden;
        let mut dc: Array2<f64> = Array2::zeros(dh.raw_dim());

        for step in cache.steps.iter().rev() {
            let d_output = &dh * &step.tanh_cell;
            let dc_total = &dc + &(&dh * &step.output_gate * &step.tanh_cell.mapv(|t| 1.0 - t * t));

            let d_forget = &dc_total * &step.c_prev;
            let d_input = &dc_total * &step.candidate;
            let d_candidate = &dc_total * &step.input_gate;
            dc = &dc_total * &step.forget_gate;

            let mut dz = Array2::zeros((dh.nrows(), 4 * u));
            dz.slice_mut(s![.., 0..u])
                .assign(&(d_input * &step.input_gate.mapv(|v| v * (1.0 - v))));
            dz.slice_mut(s![.., u..2 * u])
                .assign(&(d_forget * &step.forget_gate.mapv(|v| v * (1.0 - v))));
            dz.slice_mut(s![.., 2 * u..3 * u])
                .assign(&(d_candidate * &step.candidate.mapv(|v| 1.0 - v * v)));
            dz.slice_mut(s![.., 3 * u..4 * u])
                .assign(&(d_output * &step.output_gate.mapv(|v| v * (1.0 - v))));

            grads.kernel += &step.x.t().dot(&dz);
            grads.recurrent_kernel += &step.h_prev.t().dot(&dz);
            grads.bias += &dz.sum_axis(Axis(0));
            dh = dz.dot(&self.recurrent_kernel.t());
        }

        grads
    }
}
