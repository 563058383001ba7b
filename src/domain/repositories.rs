//! Repository abstraction for trained artifacts.
//!
//! Every (facility, variant) pair owns one artifact set: two model files,
//! the fitted scalers and the split indices. Business logic only talks to
//! [`ArtifactRepository`]; `FileArtifactRepository` persists to disk and
//! `InMemoryArtifactRepository` backs tests.

use crate::domain::errors::PipelineError;
use crate::domain::forecasting::SplitIndices;
use crate::domain::ml::artifact::{ModelArtifact, ModelKind};
use crate::domain::ml::feature_registry::FeatureVariant;
use crate::domain::ml::scaler::ScalerPair;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ArtifactKey {
    pub facility_id: String,
    pub variant: FeatureVariant,
}

impl ArtifactKey {
    pub fn new(facility_id: impl Into<String>, variant: FeatureVariant) -> Self {
        Self {
            facility_id: facility_id.into(),
            variant,
        }
    }

    pub(crate) fn missing(&self, artifact: &str) -> PipelineError {
        PipelineError::MissingArtifact {
            facility_id: self.facility_id.clone(),
            variant: self.variant.to_string(),
            artifact: artifact.to_string(),
        }
    }
}

impl fmt::Display for ArtifactKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.facility_id, self.variant)
    }
}

/// A model paired with the scalers fitted in the same run.
#[derive(Debug, Clone)]
pub struct TrainedModel {
    pub model: ModelArtifact,
    pub scalers: ScalerPair,
}

pub trait ArtifactRepository: Send + Sync {
    fn save_model(&self, model: &ModelArtifact) -> Result<(), PipelineError>;

    fn load_model(&self, key: &ArtifactKey, kind: ModelKind)
    -> Result<ModelArtifact, PipelineError>;

    fn save_scalers(&self, key: &ArtifactKey, scalers: &ScalerPair) -> Result<(), PipelineError>;

    fn load_scalers(&self, key: &ArtifactKey) -> Result<ScalerPair, PipelineError>;

    fn save_split(&self, key: &ArtifactKey, split: &SplitIndices) -> Result<(), PipelineError>;

    fn load_split(&self, key: &ArtifactKey) -> Result<SplitIndices, PipelineError>;

    /// Facilities holding a model of `kind` for `variant`, sorted.
    fn facilities_with_model(
        &self,
        variant: FeatureVariant,
        kind: ModelKind,
    ) -> Result<Vec<String>, PipelineError>;

    /// Loads a model and its scalers, rejecting pairs from different runs.
    fn load_trained(
        &self,
        key: &ArtifactKey,
        kind: ModelKind,
    ) -> Result<TrainedModel, PipelineError> {
        let model = self.load_model(key, kind)?;
        let scalers = self.load_scalers(key)?;

        if model.run_id != scalers.run_id {
            return Err(PipelineError::ArtifactMismatch {
                facility_id: key.facility_id.clone(),
                variant: key.variant.to_string(),
                reason: format!(
                    "model run {} does not match scaler run {}",
                    model.run_id, scalers.run_id
                ),
            });
        }
        if model.variant != key.variant || model.facility_id != key.facility_id {
            return Err(PipelineError::ArtifactMismatch {
                facility_id: key.facility_id.clone(),
                variant: key.variant.to_string(),
                reason: format!(
                    "model file belongs to {}/{}",
                    model.facility_id, model.variant
                ),
            });
        }
        if scalers.feature.n_features() != key.variant.feature_count() {
            return Err(PipelineError::ArtifactMismatch {
                facility_id: key.facility_id.clone(),
                variant: key.variant.to_string(),
                reason: format!(
                    "feature scaler has {} columns, expected {}",
                    scalers.feature.n_features(),
                    key.variant.feature_count()
                ),
            });
        }

        Ok(TrainedModel { model, scalers })
    }
}
