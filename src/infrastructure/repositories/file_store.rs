//! Artifact repository backed by JSON files.
//!
//! Layout: `<root>/<facility>/<variant>/{best_model, final_model,
//! feature_scaler, target_scaler, split_indices}.json`. Each scaler file
//! carries the run id of the training run that fitted it.

use crate::domain::errors::PipelineError;
use crate::domain::forecasting::SplitIndices;
use crate::domain::ml::artifact::{ModelArtifact, ModelKind};
use crate::domain::ml::feature_registry::FeatureVariant;
use crate::domain::ml::scaler::{MinMaxScaler, ScalerPair};
use crate::domain::repositories::{ArtifactKey, ArtifactRepository};
use crate::infrastructure::persistence::{read_json, write_json};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;
use uuid::Uuid;

const FEATURE_SCALER_FILE: &str = "feature_scaler.json";
const TARGET_SCALER_FILE: &str = "target_scaler.json";
const SPLIT_FILE: &str = "split_indices.json";

#[derive(Debug, Serialize, Deserialize)]
struct ScalerFile {
    run_id: Uuid,
    scaler: MinMaxScaler,
}

pub struct FileArtifactRepository {
    root: PathBuf,
}

impl FileArtifactRepository {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn artifact_dir(&self, key: &ArtifactKey) -> PathBuf {
        self.root.join(&key.facility_id).join(key.variant.name())
    }

    fn load<T: serde::de::DeserializeOwned>(
        &self,
        key: &ArtifactKey,
        file_name: &str,
    ) -> Result<T, PipelineError> {
        let path = self.artifact_dir(key).join(file_name);
        read_json(&path)?.ok_or_else(|| key.missing(file_name))
    }
}

impl ArtifactRepository for FileArtifactRepository {
    fn save_model(&self, model: &ModelArtifact) -> Result<(), PipelineError> {
        let key = ArtifactKey::new(model.facility_id.as_str(), model.variant);
        let path = self.artifact_dir(&key).join(model.kind.file_name());
        write_json(&path, model)?;
        debug!("Saved {} model to {:?}", model.kind, path);
        Ok(())
    }

    fn load_model(
        &self,
        key: &ArtifactKey,
        kind: ModelKind,
    ) -> Result<ModelArtifact, PipelineError> {
        self.load(key, kind.file_name())
    }

    fn save_scalers(&self, key: &ArtifactKey, scalers: &ScalerPair) -> Result<(), PipelineError> {
        let dir = self.artifact_dir(key);
        write_json(
            &dir.join(FEATURE_SCALER_FILE),
            &ScalerFile {
                run_id: scalers.run_id,
                scaler: scalers.feature.clone(),
            },
        )?;
        write_json(
            &dir.join(TARGET_SCALER_FILE),
            &ScalerFile {
                run_id: scalers.run_id,
                scaler: scalers.target.clone(),
            },
        )
    }

    fn load_scalers(&self, key: &ArtifactKey) -> Result<ScalerPair, PipelineError> {
        let feature: ScalerFile = self.load(key, FEATURE_SCALER_FILE)?;
        let target: ScalerFile = self.load(key, TARGET_SCALER_FILE)?;
        if feature.run_id != target.run_id {
            return Err(PipelineError::ArtifactMismatch {
                facility_id: key.facility_id.clone(),
                variant: key.variant.to_string(),
                reason: format!(
                    "feature scaler run {} does not match target scaler run {}",
                    feature.run_id, target.run_id
                ),
            });
        }
        Ok(ScalerPair {
            run_id: feature.run_id,
            feature: feature.scaler,
            target: target.scaler,
        })
    }

    fn save_split(&self, key: &ArtifactKey, split: &SplitIndices) -> Result<(), PipelineError> {
        write_json(&self.artifact_dir(key).join(SPLIT_FILE), split)
    }

    fn load_split(&self, key: &ArtifactKey) -> Result<SplitIndices, PipelineError> {
        self.load(key, SPLIT_FILE)
    }

    fn facilities_with_model(
        &self,
        variant: FeatureVariant,
        kind: ModelKind,
    ) -> Result<Vec<String>, PipelineError> {
        if !self.root.exists() {
            return Ok(Vec::new());
        }

        let mut ids = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let model_path = entry.path().join(variant.name()).join(kind.file_name());
            if model_path.is_file()
                && let Some(id) = entry.file_name().to_str()
            {
                ids.push(id.to_string());
            }
        }
        ids.sort();
        Ok(ids)
    }
}
