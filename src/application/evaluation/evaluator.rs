//! Per-facility evaluation of both feature variants on the persisted test split.

use super::comparison::FacilityComparison;
use super::metrics::ForecastMetrics;
use crate::application::ml::{LstmPredictor, Predictor};
use crate::application::pipeline::preparation::{DataPreparer, FacilitySeries};
use crate::application::preprocessing::Sequencer;
use crate::domain::errors::PipelineError;
use crate::domain::forecasting::SequenceSet;
use crate::domain::ml::artifact::ModelKind;
use crate::domain::ml::feature_registry::FeatureVariant;
use crate::domain::ports::ReadingSource;
use crate::domain::repositories::{ArtifactKey, ArtifactRepository, TrainedModel};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariantEvaluation {
    pub variant: FeatureVariant,
    pub model_kind: ModelKind,
    pub run_id: Uuid,
    pub test_sequences: usize,
    pub metrics: ForecastMetrics,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FacilityEvaluation {
    pub facility_id: String,
    pub time_only: VariantEvaluation,
    pub with_precipitation: VariantEvaluation,
    pub comparison: FacilityComparison,
}

pub struct Evaluator {
    source: Arc<dyn ReadingSource>,
    repository: Arc<dyn ArtifactRepository>,
    preparer: DataPreparer,
    model_kind: ModelKind,
}

impl Evaluator {
    pub fn new(
        source: Arc<dyn ReadingSource>,
        repository: Arc<dyn ArtifactRepository>,
        max_carry_forward_steps: Option<usize>,
        model_kind: ModelKind,
    ) -> Result<Self, PipelineError> {
        let preparer = DataPreparer::new(source.as_ref(), max_carry_forward_steps)?;
        Ok(Self {
            source,
            repository,
            preparer,
            model_kind,
        })
    }

    pub fn model_kind(&self) -> ModelKind {
        self.model_kind
    }

    /// Scores both variants of one facility on the test labels saved with its
    /// time-only split.
    pub fn evaluate(&self, facility_id: &str) -> Result<FacilityEvaluation, PipelineError> {
        let facility = self.preparer.load_series(self.source.as_ref(), facility_id)?;
        let labels = self.test_labels(facility_id)?;

        let time_only = self.evaluate_variant(&facility, FeatureVariant::TimeOnly, &labels)?;
        let with_precipitation =
            self.evaluate_variant(&facility, FeatureVariant::TimeAndPrecipitation, &labels)?;
        let comparison = FacilityComparison::compare(&time_only.metrics, &with_precipitation.metrics);

        info!(
            "{}: SMAPE time-only {:.2}% vs with-precipitation {:.2}% ({} test sequences)",
            facility_id,
            time_only.metrics.smape_overall,
            with_precipitation.metrics.smape_overall,
            time_only.test_sequences
        );

        Ok(FacilityEvaluation {
            facility_id: facility_id.to_string(),
            time_only,
            with_precipitation,
            comparison,
        })
    }

    /// Regenerates the saved test partition of one variant, unscaled.
    pub fn test_sequences(
        &self,
        facility_id: &str,
        variant: FeatureVariant,
    ) -> Result<SequenceSet, PipelineError> {
        let facility = self.preparer.load_series(self.source.as_ref(), facility_id)?;
        let labels = self.test_labels(facility_id)?;
        let trained = self
            .repository
            .load_trained(&ArtifactKey::new(facility_id, variant), self.model_kind)?;
        self.rebuild_test(&facility, &trained, &labels)
    }

    fn test_labels(&self, facility_id: &str) -> Result<HashSet<NaiveDateTime>, PipelineError> {
        let split = self
            .repository
            .load_split(&ArtifactKey::new(facility_id, FeatureVariant::TimeOnly))?;
        let labels = split.test_set();
        if labels.is_empty() {
            return Err(PipelineError::TooFewSequences {
                facility_id: facility_id.to_string(),
                sequences: 0,
                required: 1,
            });
        }
        Ok(labels)
    }

    /// `time_index` is measured from the model's series origin, not from the
    /// first regenerated row.
    fn rebuild_test(
        &self,
        facility: &FacilitySeries,
        trained: &TrainedModel,
        labels: &HashSet<NaiveDateTime>,
    ) -> Result<SequenceSet, PipelineError> {
        let model = &trained.model;
        let sequencer = Sequencer::new(model.window_size(), model.horizon());
        let prepared =
            self.preparer
                .prepare(facility, model.variant, &sequencer, Some(model.series_origin))?;
        let test = prepared.sequences.select_by_labels(labels);
        if test.is_empty() {
            return Err(PipelineError::TooFewSequences {
                facility_id: model.facility_id.clone(),
                sequences: 0,
                required: labels.len(),
            });
        }
        if test.len() < labels.len() {
            debug!(
                "{}/{}: {} of {} saved test labels regenerated",
                model.facility_id,
                model.variant,
                test.len(),
                labels.len()
            );
        }
        Ok(test)
    }

    fn evaluate_variant(
        &self,
        facility: &FacilitySeries,
        variant: FeatureVariant,
        labels: &HashSet<NaiveDateTime>,
    ) -> Result<VariantEvaluation, PipelineError> {
        let key = ArtifactKey::new(facility.series.facility_id.as_str(), variant);
        let trained = self.repository.load_trained(&key, self.model_kind)?;
        let test = self.rebuild_test(facility, &trained, labels)?;

        let run_id = trained.model.run_id;
        let predictor = LstmPredictor::new(trained);
        let predictions = predictor.predict(&test.windows)?;
        let metrics = ForecastMetrics::compute(test.targets.view(), predictions.view())?;

        Ok(VariantEvaluation {
            variant,
            model_kind: self.model_kind,
            run_id,
            test_sequences: test.len(),
            metrics,
        })
    }
}
