pub mod outcome;
pub mod sequence;
pub mod types;

pub use outcome::{FacilityOutcome, SkipReason};
pub use sequence::{DataSplit, Sequence, SequenceSet, SplitIndices};
pub use types::{
    FeatureRow, FeatureTable, GridPoint, PrecipitationReading, PrecipitationSeries, RawReading,
    ResampledSeries, RESAMPLE_INTERVAL_MINUTES,
};
