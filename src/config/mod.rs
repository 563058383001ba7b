//! Configuration for lotcast.
//!
//! Paths and training hyper-parameters come from environment variables (with
//! `.env` support through `dotenvy` in the binary). An optional TOML file can
//! override the `[training]` section.

mod paths_config;
mod training_env_config;

pub use paths_config::PathsEnvConfig;
pub use training_env_config::TrainingEnvConfig;

use crate::domain::config::{TrainingConfig, TrainingOverrides};
use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::Path;

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    #[serde(default)]
    training: TrainingOverrides,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub paths: PathsEnvConfig,
    pub training: TrainingConfig,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let paths = PathsEnvConfig::from_env();
        let training = TrainingEnvConfig::from_env().context("Failed to load training config")?;
        Ok(Self { paths, training })
    }

    /// Applies the `[training]` table of a TOML file on top of the current values.
    pub fn apply_file(&mut self, path: &Path) -> Result<()> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {:?}", path))?;
        self.apply_toml(&content)
            .with_context(|| format!("Failed to parse config file {:?}", path))
    }

    pub fn apply_toml(&mut self, content: &str) -> Result<()> {
        let file: ConfigFile = toml::from_str(content)?;
        file.training.apply(&mut self.training);
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        self.training
            .validate()
            .context("Invalid training configuration")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_from_env_defaults() {
        let config = Config::from_env().expect("Should parse with defaults");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_toml_overrides_training_section() {
        let mut config = Config::from_env().unwrap();
        config
            .apply_toml("[training]\nepochs = 3\nlearning_rate = 0.01\nmax_carry_forward_steps = 96\n")
            .unwrap();

        assert_eq!(config.training.epochs, 3);
        assert_eq!(config.training.learning_rate, 0.01);
        assert_eq!(config.training.max_carry_forward_steps, Some(96));
        assert_eq!(config.training.window_size, 20);
    }

    #[test]
    fn test_toml_rejects_unknown_keys_and_bad_splits() {
        let mut config = Config::from_env().unwrap();
        assert!(config.apply_toml("[training]\nepoch = 3\n").is_err());

        config
            .apply_toml("[training]\ntrain_fraction = 0.9\n")
            .unwrap();
        assert!(config.validate().is_err());
    }
}
