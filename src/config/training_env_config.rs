//! Training hyper-parameters from environment variables.

use crate::domain::config::TrainingConfig;
use anyhow::{Context, Result};
use std::env;

pub struct TrainingEnvConfig;

impl TrainingEnvConfig {
    /// Reads `LOTCAST_*` training variables, falling back to [`TrainingConfig::default`].
    pub fn from_env() -> Result<TrainingConfig> {
        let d = TrainingConfig::default();
        Ok(TrainingConfig {
            window_size: Self::parse_usize("LOTCAST_WINDOW_SIZE", d.window_size)?,
            forecast_horizon: Self::parse_usize("LOTCAST_FORECAST_HORIZON", d.forecast_horizon)?,
            epochs: Self::parse_usize("LOTCAST_EPOCHS", d.epochs)?,
            batch_size: Self::parse_usize("LOTCAST_BATCH_SIZE", d.batch_size)?,
            learning_rate: Self::parse_f64("LOTCAST_LEARNING_RATE", d.learning_rate)?,
            hidden_units: Self::parse_usize("LOTCAST_HIDDEN_UNITS", d.hidden_units)?,
            dense_units: Self::parse_usize("LOTCAST_DENSE_UNITS", d.dense_units)?,
            l2_weight: Self::parse_f64("LOTCAST_L2_WEIGHT", d.l2_weight)?,
            huber_delta: Self::parse_f64("LOTCAST_HUBER_DELTA", d.huber_delta)?,
            seed: Self::parse_u64("LOTCAST_SEED", d.seed)?,
            max_carry_forward_steps: Self::parse_optional_usize("LOTCAST_MAX_CARRY_FORWARD_STEPS")?,
            ..d
        })
    }

    fn parse_usize(key: &str, default: usize) -> Result<usize> {
        env::var(key)
            .unwrap_or_else(|_| default.to_string())
            .parse::<usize>()
            .context(format!("Failed to parse {}", key))
    }

    fn parse_f64(key: &str, default: f64) -> Result<f64> {
        env::var(key)
            .unwrap_or_else(|_| default.to_string())
            .parse::<f64>()
            .context(format!("Failed to parse {}", key))
    }

    fn parse_u64(key: &str, default: u64) -> Result<u64> {
        env::var(key)
            .unwrap_or_else(|_| default.to_string())
            .parse::<u64>()
            .context(format!("Failed to parse {}", key))
    }

    fn parse_optional_usize(key: &str) -> Result<Option<usize>> {
        match env::var(key) {
            Ok(raw) if !raw.trim().is_empty() => raw
                .trim()
                .parse::<usize>()
                .map(Some)
                .context(format!("Failed to parse {}", key)),
            _ => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_training_env_defaults() {
        let config = TrainingEnvConfig::from_env().expect("Should parse with defaults");
        assert_eq!(config.window_size, 20);
        assert_eq!(config.forecast_horizon, 8);
        assert_eq!(config.batch_size, 128);
        assert!(config.validate().is_ok());
    }
}
