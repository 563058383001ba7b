use super::preparation::DataPreparer;
use crate::application::ml::{ModelTrainer, TrainingRun};
use crate::application::preprocessing::{Sequencer, Splitter};
use crate::domain::config::TrainingConfig;
use crate::domain::errors::PipelineError;
use crate::domain::ml::feature_registry::FeatureVariant;
use crate::domain::ml::scaler::ScalerPair;
use crate::domain::ports::ReadingSource;
use crate::domain::repositories::{ArtifactKey, ArtifactRepository};
use serde::Serialize;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VariantTrainingSummary {
    pub variant: FeatureVariant,
    pub run_id: Uuid,
    pub train_sequences: usize,
    pub validation_sequences: usize,
    pub test_sequences: usize,
    pub best_epoch: usize,
    pub best_val_loss: f64,
    pub training_seconds: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FacilityTrainingSummary {
    pub facility_id: String,
    pub variants: Vec<VariantTrainingSummary>,
}

/// Runs load, resample, features, sequences, split, scale, train and persist
/// for one facility at a time.
pub struct TrainingPipeline {
    source: Arc<dyn ReadingSource>,
    repository: Arc<dyn ArtifactRepository>,
    preparer: DataPreparer,
    sequencer: Sequencer,
    splitter: Splitter,
    trainer: ModelTrainer,
}

impl TrainingPipeline {
    pub fn new(
        source: Arc<dyn ReadingSource>,
        repository: Arc<dyn ArtifactRepository>,
        config: TrainingConfig,
    ) -> Result<Self, PipelineError> {
        config
            .validate()
            .map_err(|e| PipelineError::InvalidInput(e.to_string()))?;

        let preparer = DataPreparer::new(source.as_ref(), config.max_carry_forward_steps)?;
        Ok(Self {
            source,
            repository,
            preparer,
            sequencer: Sequencer::new(config.window_size, config.forecast_horizon),
            splitter: Splitter::new(config.validation_fraction, config.test_fraction),
            trainer: ModelTrainer::new(config),
        })
    }

    pub fn has_precipitation(&self) -> bool {
        self.preparer.has_precipitation()
    }

    pub fn train_facility(
        &self,
        facility_id: &str,
        variants: &[FeatureVariant],
    ) -> Result<FacilityTrainingSummary, PipelineError> {
        let facility = self.preparer.load_series(self.source.as_ref(), facility_id)?;
        info!(
            "{}: {} grid points after resampling (longest carried run {} steps)",
            facility_id,
            facility.series.len(),
            facility.series.longest_fill_run
        );

        let mut summaries = Vec::with_capacity(variants.len());
        for &variant in variants {
            let prepared = self.preparer.prepare(&facility, variant, &self.sequencer, None)?;
            let split = self.splitter.split(facility_id, &prepared.sequences)?;

            let run_id = Uuid::new_v4();
            let scalers = ScalerPair::fit(&split.train, run_id)?;
            let train = scalers.transform_set(&split.train)?;
            let validation = scalers.transform_set(&split.validation)?;

            let run = TrainingRun {
                facility_id: facility_id.to_string(),
                variant,
                run_id,
                series_origin: prepared.table.origin,
            };
            let trained = self.trainer.train(&run, &train, &validation)?;

            let key = ArtifactKey::new(facility_id, variant);
            self.repository.save_model(&trained.best)?;
            self.repository.save_model(&trained.final_model)?;
            self.repository.save_scalers(&key, &scalers)?;
            self.repository.save_split(&key, &split.indices)?;
            info!("{}: saved artifacts for run {}", key, run_id);

            summaries.push(VariantTrainingSummary {
                variant,
                run_id,
                train_sequences: split.train.len(),
                validation_sequences: split.validation.len(),
                test_sequences: split.test.len(),
                best_epoch: trained.best.best_epoch,
                best_val_loss: trained.best.best_val_loss,
                training_seconds: trained.best.training_seconds,
            });
        }

        Ok(FacilityTrainingSummary {
            facility_id: facility_id.to_string(),
            variants: summaries,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::evaluation::Evaluator;
    use crate::application::pipeline::find_missing_models;
    use crate::domain::forecasting::{PrecipitationReading, RawReading};
    use crate::domain::ml::artifact::ModelKind;
    use crate::infrastructure::InMemoryArtifactRepository;
    use chrono::{Duration, NaiveDate};
    use std::collections::BTreeMap;
    use std::path::PathBuf;

    struct StubSource {
        facilities: BTreeMap<String, Vec<RawReading>>,
    }

    impl ReadingSource for StubSource {
        fn facility_ids(&self) -> Result<Vec<String>, PipelineError> {
            Ok(self.facilities.keys().cloned().collect())
        }

        fn load_facility(&self, facility_id: &str) -> Result<Vec<RawReading>, PipelineError> {
            self.facilities
                .get(facility_id)
                .cloned()
                .ok_or_else(|| PipelineError::MissingInputFile {
                    path: PathBuf::from(format!("{}.csv", facility_id)),
                })
        }

        fn load_precipitation(&self) -> Result<Option<Vec<PrecipitationReading>>, PipelineError> {
            Ok(None)
        }

        fn precipitation_location(&self) -> PathBuf {
            PathBuf::from("precipitation.csv")
        }
    }

    fn two_days(facility_id: &str) -> Vec<RawReading> {
        let start = NaiveDate::from_ymd_opt(2024, 4, 1)
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .unwrap();
        (0..192)
            .map(|i| RawReading {
                facility_id: facility_id.to_string(),
                timestamp: start + Duration::minutes(15 * i),
                lots_available: Some(30.0 + (i % 4) as f64),
                total_lots: None,
            })
            .collect()
    }

    fn config() -> TrainingConfig {
        TrainingConfig {
            epochs: 2,
            batch_size: 32,
            hidden_units: 4,
            dense_units: 2,
            ..Default::default()
        }
    }

    #[test]
    fn test_train_without_precipitation_source() {
        let mut facilities = BTreeMap::new();
        facilities.insert("M1".to_string(), two_days("M1"));
        let source: Arc<dyn ReadingSource> = Arc::new(StubSource { facilities });
        let memory = Arc::new(InMemoryArtifactRepository::new());
        let repository: Arc<dyn ArtifactRepository> = memory.clone();

        let pipeline = TrainingPipeline::new(source.clone(), repository.clone(), config()).unwrap();
        assert!(!pipeline.has_precipitation());

        let summary = pipeline
            .train_facility("M1", &[FeatureVariant::TimeOnly])
            .unwrap();
        // 192 rows give 165 sequences.
        let variant = &summary.variants[0];
        assert_eq!(
            (
                variant.train_sequences,
                variant.validation_sequences,
                variant.test_sequences
            ),
            (115, 25, 25)
        );
        assert!(matches!(
            pipeline.train_facility("M1", &[FeatureVariant::TimeAndPrecipitation]),
            Err(PipelineError::MissingInputFile { .. })
        ));
        assert!(matches!(
            pipeline.train_facility("M9", &[FeatureVariant::TimeOnly]),
            Err(PipelineError::MissingInputFile { .. })
        ));

        let key = ArtifactKey::new("M1", FeatureVariant::TimeOnly);
        let trained = repository.load_trained(&key, ModelKind::Final).unwrap();
        assert_eq!(trained.model.run_id, variant.run_id);
        assert_eq!(trained.model.history.len(), 2);
        assert!(
            find_missing_models(source.as_ref(), repository.as_ref(), FeatureVariant::TimeOnly)
                .unwrap()
                .is_empty()
        );

        // The precipitation model was never trained.
        let evaluator =
            Evaluator::new(source.clone(), repository.clone(), None, ModelKind::BestCheckpoint)
                .unwrap();
        let err = evaluator.evaluate("M1").unwrap_err();
        assert!(matches!(err, PipelineError::MissingArtifact { .. }));

        memory.remove_scalers(&key).unwrap();
        assert!(matches!(
            repository.load_trained(&key, ModelKind::BestCheckpoint),
            Err(PipelineError::MissingArtifact { .. })
        ));
        assert_eq!(
            find_missing_models(source.as_ref(), repository.as_ref(), FeatureVariant::TimeOnly)
                .unwrap(),
            vec!["M1"]
        );
    }
}
