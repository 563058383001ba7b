//! Forecast accuracy metrics in lot units.
//!
//! Every metric is computed per forecast step (one column of `[N, H]`) and
//! pooled over all steps. `None` marks an undefined value: MAPE when every
//! true value is zero, percentage RMSE when the mean true value is zero.

use crate::domain::errors::PipelineError;
use ndarray::ArrayView2;
use serde::{Deserialize, Serialize};

/// Floor for the SMAPE denominator when both values are zero.
pub const SMAPE_EPSILON: f64 = 1e-10;

/// Symmetric MAPE in percent; bounded by `[0, 200]`.
pub fn smape<I>(pairs: I) -> Option<f64>
where
    I: IntoIterator<Item = (f64, f64)>,
{
    let mut sum = 0.0;
    let mut count = 0usize;
    for (truth, pred) in pairs {
        let mut denominator = (truth.abs() + pred.abs()) / 2.0;
        if denominator == 0.0 {
            denominator = SMAPE_EPSILON;
        }
        sum += (truth - pred).abs() / denominator;
        count += 1;
    }
    (count > 0).then(|| sum / count as f64 * 100.0)
}

/// RMSE as a percentage of the mean true value.
pub fn percentage_rmse<I>(pairs: I) -> Option<f64>
where
    I: IntoIterator<Item = (f64, f64)>,
{
    let mut squared = 0.0;
    let mut truth_sum = 0.0;
    let mut count = 0usize;
    for (truth, pred) in pairs {
        squared += (truth - pred) * (truth - pred);
        truth_sum += truth;
        count += 1;
    }
    if count == 0 {
        return None;
    }
    let mean_truth = truth_sum / count as f64;
    let value = (squared / count as f64).sqrt() / mean_truth * 100.0;
    value.is_finite().then_some(value)
}

/// MAPE in percent over pairs whose true value is non-zero.
pub fn mape<I>(pairs: I) -> Option<f64>
where
    I: IntoIterator<Item = (f64, f64)>,
{
    let mut sum = 0.0;
    let mut count = 0usize;
    for (truth, pred) in pairs {
        if truth != 0.0 {
            sum += ((truth - pred) / truth).abs();
            count += 1;
        }
    }
    (count > 0).then(|| sum / count as f64 * 100.0)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastMetrics {
    pub smape_per_step: Vec<f64>,
    pub perc_rmse_per_step: Vec<Option<f64>>,
    pub mape_per_step: Vec<Option<f64>>,
    pub smape_overall: f64,
    pub perc_rmse_overall: Option<f64>,
    pub mape_overall: Option<f64>,
}

impl ForecastMetrics {
    pub fn compute(
        y_true: ArrayView2<'_, f64>,
        y_pred: ArrayView2<'_, f64>,
    ) -> Result<Self, PipelineError> {
        if y_true.dim() != y_pred.dim() {
            return Err(PipelineError::InvalidInput(format!(
                "metric shapes differ: {:?} vs {:?}",
                y_true.dim(),
                y_pred.dim()
            )));
        }
        if y_true.is_empty() {
            return Err(PipelineError::InvalidInput(
                "cannot score an empty test set".to_string(),
            ));
        }

        let horizon = y_true.ncols();
        let mut smape_per_step = Vec::with_capacity(horizon);
        let mut perc_rmse_per_step = Vec::with_capacity(horizon);
        let mut mape_per_step = Vec::with_capacity(horizon);
        for step in 0..horizon {
            let pairs: Vec<(f64, f64)> = y_true
                .column(step)
                .iter()
                .copied()
                .zip(y_pred.column(step).iter().copied())
                .collect();
            smape_per_step.push(smape(pairs.iter().copied()).unwrap_or(0.0));
            perc_rmse_per_step.push(percentage_rmse(pairs.iter().copied()));
            mape_per_step.push(mape(pairs));
        }

        let all = || y_true.iter().copied().zip(y_pred.iter().copied());
        Ok(Self {
            smape_per_step,
            perc_rmse_per_step,
            mape_per_step,
            smape_overall: smape(all()).unwrap_or(0.0),
            perc_rmse_overall: percentage_rmse(all()),
            mape_overall: mape(all()),
        })
    }

    pub fn horizon(&self) -> usize {
        self.smape_per_step.len()
    }

    /// 1-based forecast steps with an undefined MAPE or percentage RMSE.
    pub fn undefined_steps(&self) -> Vec<usize> {
        self.mape_per_step
            .iter()
            .zip(&self.perc_rmse_per_step)
            .enumerate()
            .filter(|(_, (mape, rmse))| mape.is_none() || rmse.is_none())
            .map(|(step, _)| step + 1)
            .collect()
    }
}
