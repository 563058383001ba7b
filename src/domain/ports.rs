use crate::domain::errors::PipelineError;
use crate::domain::forecasting::{PrecipitationReading, RawReading};

/// Source of raw occupancy and precipitation readings.
pub trait ReadingSource: Send + Sync {
    /// Facility ids with a readings file, sorted.
    fn facility_ids(&self) -> Result<Vec<String>, PipelineError>;

    /// All readings of one facility; `MissingInputFile` if it has none on record.
    fn load_facility(&self, facility_id: &str) -> Result<Vec<RawReading>, PipelineError>;

    /// Shared precipitation readings, `Ok(None)` when no precipitation source is configured.
    fn load_precipitation(&self) -> Result<Option<Vec<PrecipitationReading>>, PipelineError>;

    /// Human-readable location of the precipitation source for error reports.
    fn precipitation_location(&self) -> std::path::PathBuf;
}
