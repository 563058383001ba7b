// Resampling, feature building, sequencing and splitting
pub mod preprocessing;

// Network training, prediction and inference
pub mod ml;

// Metrics, variant comparison and reports
pub mod evaluation;

// Per-facility orchestration
pub mod pipeline;
