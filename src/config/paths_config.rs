//! Input and output locations from environment variables.

use std::env;
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq)]
pub struct PathsEnvConfig {
    pub parking_dir: PathBuf,
    pub precipitation_file: PathBuf,
    pub models_dir: PathBuf,
    pub error_log: PathBuf,
}

impl Default for PathsEnvConfig {
    fn default() -> Self {
        Self {
            parking_dir: PathBuf::from("Data/ParkingAvailability"),
            precipitation_file: PathBuf::from("Data/Precipitation/data.csv"),
            models_dir: PathBuf::from("trained_models"),
            error_log: PathBuf::from("error.log"),
        }
    }
}

impl PathsEnvConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            parking_dir: path_var("LOTCAST_PARKING_DIR", defaults.parking_dir),
            precipitation_file: path_var("LOTCAST_PRECIPITATION_FILE", defaults.precipitation_file),
            models_dir: path_var("LOTCAST_MODELS_DIR", defaults.models_dir),
            error_log: path_var("LOTCAST_ERROR_LOG", defaults.error_log),
        }
    }
}

fn path_var(key: &str, default: PathBuf) -> PathBuf {
    env::var(key).map(PathBuf::from).unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paths_defaults() {
        let config = PathsEnvConfig::default();
        assert_eq!(config.parking_dir, PathBuf::from("Data/ParkingAvailability"));
        assert_eq!(config.models_dir, PathBuf::from("trained_models"));
    }
}
