pub mod batch;
pub mod preparation;
pub mod training;

pub use batch::{BatchReport, BatchRunner, FacilitySelection, SkippedFacility, find_missing_models};
pub use preparation::DataPreparer;
pub use training::{FacilityTrainingSummary, TrainingPipeline, VariantTrainingSummary};
