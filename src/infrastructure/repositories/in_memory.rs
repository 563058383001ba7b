//! In-memory artifact repository.
//!
//! Thread-safe through `Arc<RwLock>`; artifacts are kept as cloned values and
//! lost when the process exits. Used by tests and dry runs.

use crate::domain::errors::PipelineError;
use crate::domain::forecasting::SplitIndices;
use crate::domain::ml::artifact::{ModelArtifact, ModelKind};
use crate::domain::ml::feature_registry::FeatureVariant;
use crate::domain::ml::scaler::ScalerPair;
use crate::domain::repositories::{ArtifactKey, ArtifactRepository};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

#[derive(Default)]
struct Store {
    models: HashMap<(ArtifactKey, ModelKind), ModelArtifact>,
    scalers: HashMap<ArtifactKey, ScalerPair>,
    splits: HashMap<ArtifactKey, SplitIndices>,
}

pub struct InMemoryArtifactRepository {
    store: Arc<RwLock<Store>>,
}

impl InMemoryArtifactRepository {
    pub fn new() -> Self {
        Self {
            store: Arc::new(RwLock::new(Store::default())),
        }
    }

    /// Drops one persisted scaler pair, leaving models and split in place.
    pub fn remove_scalers(&self, key: &ArtifactKey) -> Result<(), PipelineError> {
        self.store.write().map_err(|_| poisoned())?.scalers.remove(key);
        Ok(())
    }
}

impl Default for InMemoryArtifactRepository {
    fn default() -> Self {
        Self::new()
    }
}

fn poisoned() -> PipelineError {
    PipelineError::InvalidInput("artifact store lock poisoned".to_string())
}

impl ArtifactRepository for InMemoryArtifactRepository {
    fn save_model(&self, model: &ModelArtifact) -> Result<(), PipelineError> {
        let key = ArtifactKey::new(model.facility_id.as_str(), model.variant);
        self.store
            .write()
            .map_err(|_| poisoned())?
            .models
            .insert((key, model.kind), model.clone());
        Ok(())
    }

    fn load_model(
        &self,
        key: &ArtifactKey,
        kind: ModelKind,
    ) -> Result<ModelArtifact, PipelineError> {
        let store = self.store.read().map_err(|_| poisoned())?;
        store
            .models
            .get(&(key.clone(), kind))
            .cloned()
            .ok_or_else(|| key.missing(kind.file_name()))
    }

    fn save_scalers(&self, key: &ArtifactKey, scalers: &ScalerPair) -> Result<(), PipelineError> {
        self.store
            .write()
            .map_err(|_| poisoned())?
            .scalers
            .insert(key.clone(), scalers.clone());
        Ok(())
    }

    fn load_scalers(&self, key: &ArtifactKey) -> Result<ScalerPair, PipelineError> {
        let store = self.store.read().map_err(|_| poisoned())?;
        store
            .scalers
            .get(key)
            .cloned()
            .ok_or_else(|| key.missing("feature_scaler.json"))
    }

    fn save_split(&self, key: &ArtifactKey, split: &SplitIndices) -> Result<(), PipelineError> {
        self.store
            .write()
            .map_err(|_| poisoned())?
            .splits
            .insert(key.clone(), split.clone());
        Ok(())
    }

    fn load_split(&self, key: &ArtifactKey) -> Result<SplitIndices, PipelineError> {
        let store = self.store.read().map_err(|_| poisoned())?;
        store
            .splits
            .get(key)
            .cloned()
            .ok_or_else(|| key.missing("split_indices.json"))
    }

    fn facilities_with_model(
        &self,
        variant: FeatureVariant,
        kind: ModelKind,
    ) -> Result<Vec<String>, PipelineError> {
        let store = self.store.read().map_err(|_| poisoned())?;
        let mut ids: Vec<String> = store
            .models
            .keys()
            .filter(|(key, k)| key.variant == variant && *k == kind)
            .map(|(key, _)| key.facility_id.clone())
            .collect();
        ids.sort();
        ids.dedup();
        Ok(ids)
    }
}
