// Validated training parameters
pub mod config;

// Series, features and sequence types
pub mod forecasting;

// Network, scalers and persisted artifacts
pub mod ml;

// Port interfaces
pub mod ports;

// Repository traits
pub mod repositories;

// Domain-specific error types
pub mod errors;
