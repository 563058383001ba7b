pub mod comparison;
pub mod evaluator;
pub mod metrics;
pub mod reporting;

pub use comparison::{FacilityComparison, Improvement, PairedTTest, paired_t_test};
pub use evaluator::{Evaluator, FacilityEvaluation, VariantEvaluation};
pub use metrics::ForecastMetrics;
pub use reporting::EvaluationReport;
