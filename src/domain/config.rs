//! Training hyper-parameters as a validated value object.

use crate::domain::ml::NetworkArchitecture;
use crate::domain::ml::feature_registry::FeatureVariant;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum TrainingConfigError {
    #[error("Invalid value: {field} = {value}. Must be at least 1")]
    ZeroSize { field: String, value: usize },

    #[error("Invalid value: {field} = {value}. Must be positive and finite")]
    NonPositive { field: String, value: f64 },

    #[error("Invalid split: train {train} + validation {validation} + test {test} must equal 1")]
    InvalidSplit {
        train: f64,
        validation: f64,
        test: f64,
    },
}

/// Hyper-parameters shared by every facility in a batch run.
///
/// # Invariants
///
/// - `window_size`, `forecast_horizon`, `epochs`, `batch_size`,
///   `hidden_units` and `dense_units` are at least 1
/// - `learning_rate` and `huber_delta` are positive
/// - split fractions are non-negative and sum to 1
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingConfig {
    pub window_size: usize,
    pub forecast_horizon: usize,
    pub epochs: usize,
    pub batch_size: usize,
    pub learning_rate: f64,
    pub hidden_units: usize,
    pub dense_units: usize,
    /// L2 weight on the LSTM input kernel.
    pub l2_weight: f64,
    pub huber_delta: f64,
    pub seed: u64,
    pub train_fraction: f64,
    pub validation_fraction: f64,
    pub test_fraction: f64,
    /// `None` disables the stale-gap check.
    pub max_carry_forward_steps: Option<usize>,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            window_size: 20,
            forecast_horizon: 8,
            epochs: 50,
            batch_size: 128,
            learning_rate: 0.001,
            hidden_units: 64,
            dense_units: 8,
            l2_weight: 0.0005,
            huber_delta: 1.0,
            seed: 42,
            train_fraction: 0.70,
            validation_fraction: 0.15,
            test_fraction: 0.15,
            max_carry_forward_steps: None,
        }
    }
}

impl TrainingConfig {
    pub fn validate(&self) -> Result<(), TrainingConfigError> {
        for (field, value) in [
            ("window_size", self.window_size),
            ("forecast_horizon", self.forecast_horizon),
            ("epochs", self.epochs),
            ("batch_size", self.batch_size),
            ("hidden_units", self.hidden_units),
            ("dense_units", self.dense_units),
        ] {
            if value == 0 {
                return Err(TrainingConfigError::ZeroSize {
                    field: field.to_string(),
                    value,
                });
            }
        }

        for (field, value) in [
            ("learning_rate", self.learning_rate),
            ("huber_delta", self.huber_delta),
        ] {
            if !(value.is_finite() && value > 0.0) {
                return Err(TrainingConfigError::NonPositive {
                    field: field.to_string(),
                    value,
                });
            }
        }

        if !(self.l2_weight.is_finite() && self.l2_weight >= 0.0) {
            return Err(TrainingConfigError::NonPositive {
                field: "l2_weight".to_string(),
                value: self.l2_weight,
            });
        }

        let fractions = [self.train_fraction, self.validation_fraction, self.test_fraction];
        let sum: f64 = fractions.iter().sum();
        if fractions.iter().any(|f| *f < 0.0) || (sum - 1.0).abs() > 1e-9 {
            return Err(TrainingConfigError::InvalidSplit {
                train: self.train_fraction,
                validation: self.validation_fraction,
                test: self.test_fraction,
            });
        }

        Ok(())
    }

    pub fn architecture(&self, variant: FeatureVariant) -> NetworkArchitecture {
        NetworkArchitecture {
            window_size: self.window_size,
            feature_count: variant.feature_count(),
            lstm_units: self.hidden_units,
            dense_units: self.dense_units,
            horizon: self.forecast_horizon,
        }
    }
}

/// Partial overrides read from a TOML `[training]` table.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TrainingOverrides {
    pub window_size: Option<usize>,
    pub forecast_horizon: Option<usize>,
    pub epochs: Option<usize>,
    pub batch_size: Option<usize>,
    pub learning_rate: Option<f64>,
    pub hidden_units: Option<usize>,
    pub dense_units: Option<usize>,
    pub l2_weight: Option<f64>,
    pub huber_delta: Option<f64>,
    pub seed: Option<u64>,
    pub train_fraction: Option<f64>,
    pub validation_fraction: Option<f64>,
    pub test_fraction: Option<f64>,
    pub max_carry_forward_steps: Option<usize>,
}

impl TrainingOverrides {
    pub fn apply(&self, config: &mut TrainingConfig) {
        macro_rules! take {
            ($($field:ident),*) => {
                $(if let Some(v) = self.$field { config.$field = v; })*
            };
        }
        take!(
            window_size,
            forecast_horizon,
            epochs,
            batch_size,
            learning_rate,
            hidden_units,
            dense_units,
            l2_weight,
            huber_delta,
            seed,
            train_fraction,
            validation_fraction,
            test_fraction
        );
        if self.max_carry_forward_steps.is_some() {
            config.max_carry_forward_steps = self.max_carry_forward_steps;
        }
    }
}
