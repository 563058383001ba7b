//! Persisted model artifacts.
//!
//! A trained model is stored as JSON together with everything needed to
//! rebuild its inputs: architecture, feature variant, the origin of the
//! `time_index` column, and the run id shared with its scalers.

use super::feature_registry::FeatureVariant;
use super::network::ForecastNetwork;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Which of the two saved weight sets a model artifact holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    /// Lowest validation loss seen during training.
    BestCheckpoint,
    /// Weights after the last epoch, used for deployment.
    Final,
}

impl ModelKind {
    pub fn file_name(&self) -> &'static str {
        match self {
            ModelKind::BestCheckpoint => "best_model.json",
            ModelKind::Final => "final_model.json",
        }
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelKind::BestCheckpoint => f.write_str("best"),
            ModelKind::Final => f.write_str("final"),
        }
    }
}

impl FromStr for ModelKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "best" | "best_checkpoint" | "checkpoint" => Ok(ModelKind::BestCheckpoint),
            "final" => Ok(ModelKind::Final),
            other => anyhow::bail!("Unknown model kind '{}' (expected best|final)", other),
        }
    }
}

/// Loss and RMSE for one epoch, both in scaled units.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EpochStats {
    pub epoch: usize,
    pub train_loss: f64,
    pub train_rmse: f64,
    pub val_loss: f64,
    pub val_rmse: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub facility_id: String,
    pub variant: FeatureVariant,
    pub kind: ModelKind,
    pub run_id: Uuid,
    /// First grid timestamp of the series; `time_index` counts from here.
    pub series_origin: NaiveDateTime,
    pub best_epoch: usize,
    pub best_val_loss: f64,
    pub history: Vec<EpochStats>,
    pub training_seconds: f64,
    pub created_at: DateTime<Utc>,
    pub network: ForecastNetwork,
}

impl ModelArtifact {
    pub fn window_size(&self) -> usize {
        self.network.architecture.window_size
    }

    pub fn horizon(&self) -> usize {
        self.network.architecture.horizon
    }
}
