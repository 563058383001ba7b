//! Readings to sequences for one facility, shared by training and evaluation.

use crate::application::preprocessing::{FeatureBuilder, Resampler, Sequencer};
use crate::domain::errors::PipelineError;
use crate::domain::forecasting::{FeatureTable, PrecipitationSeries, ResampledSeries, SequenceSet};
use crate::domain::ml::feature_registry::FeatureVariant;
use crate::domain::ports::ReadingSource;
use chrono::NaiveDateTime;
use std::path::PathBuf;
use tracing::info;

/// Facility series ready for feature building.
#[derive(Debug, Clone)]
pub struct FacilitySeries {
    pub series: ResampledSeries,
}

/// Feature table and its sequences for one variant.
#[derive(Debug, Clone)]
pub struct PreparedVariant {
    pub table: FeatureTable,
    pub sequences: SequenceSet,
}

pub struct DataPreparer {
    resampler: Resampler,
    builder: FeatureBuilder,
    precipitation: Option<PrecipitationSeries>,
    precipitation_path: PathBuf,
}

impl DataPreparer {
    /// Loads and resamples the shared precipitation file once for the whole batch.
    pub fn new(
        source: &dyn ReadingSource,
        max_carry_forward_steps: Option<usize>,
    ) -> Result<Self, PipelineError> {
        let resampler = Resampler::new(max_carry_forward_steps);
        let precipitation = match source.load_precipitation()? {
            Some(readings) => {
                let series = resampler.resample_precipitation(&readings)?;
                info!(
                    "Loaded precipitation: {} readings, {} grid points",
                    readings.len(),
                    series.points.len()
                );
                Some(series)
            }
            None => None,
        };

        Ok(Self {
            resampler,
            builder: FeatureBuilder,
            precipitation,
            precipitation_path: source.precipitation_location(),
        })
    }

    pub fn has_precipitation(&self) -> bool {
        self.precipitation.is_some()
    }

    pub fn load_series(
        &self,
        source: &dyn ReadingSource,
        facility_id: &str,
    ) -> Result<FacilitySeries, PipelineError> {
        let readings = source.load_facility(facility_id)?;
        let series = self.resampler.resample(facility_id, &readings)?;
        Ok(FacilitySeries { series })
    }

    /// Builds the variant's feature table and slices it into sequences.
    ///
    /// `origin` pins `time_index` to a trained model's series origin; `None`
    /// measures from the first row. Fails with `InsufficientData` when the
    /// table cannot produce one sequence.
    pub fn prepare(
        &self,
        facility: &FacilitySeries,
        variant: FeatureVariant,
        sequencer: &Sequencer,
        origin: Option<NaiveDateTime>,
    ) -> Result<PreparedVariant, PipelineError> {
        if variant.uses_precipitation() && self.precipitation.is_none() {
            return Err(PipelineError::MissingInputFile {
                path: self.precipitation_path.clone(),
            });
        }

        let table = self
            .builder
            .build_from(&facility.series, self.precipitation.as_ref(), variant, origin)?;
        if table.len() < sequencer.required_rows() {
            return Err(PipelineError::InsufficientData {
                facility_id: facility.series.facility_id.clone(),
                rows: table.len(),
                required: sequencer.required_rows(),
            });
        }

        let sequences = sequencer.sequence(&table);
        Ok(PreparedVariant { table, sequences })
    }
}
