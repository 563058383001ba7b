use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by the forecasting pipeline for a single facility run.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Input file not found: {}", path.display())]
    MissingInputFile { path: PathBuf },

    #[error("Insufficient data for {facility_id}: {rows} rows < {required} required")]
    InsufficientData {
        facility_id: String,
        rows: usize,
        required: usize,
    },

    #[error("Insufficient data for {facility_id}: {sequences} sequences < {required} required")]
    TooFewSequences {
        facility_id: String,
        sequences: usize,
        required: usize,
    },

    #[error("No usable readings for {facility_id}")]
    EmptySeries { facility_id: String },

    #[error("Stale gap for {facility_id}: value carried forward {steps} steps (limit {limit})")]
    StaleGap {
        facility_id: String,
        steps: usize,
        limit: usize,
    },

    #[error("Missing {artifact} artifact for {facility_id}/{variant}")]
    MissingArtifact {
        facility_id: String,
        variant: String,
        artifact: String,
    },

    #[error("Artifact mismatch for {facility_id}/{variant}: {reason}")]
    ArtifactMismatch {
        facility_id: String,
        variant: String,
        reason: String,
    },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Failure classes recorded in the batch error log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    MissingInputFile,
    InsufficientData,
    MissingArtifact,
    DegenerateMetric,
    UnexpectedException,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ErrorKind::MissingInputFile => "MissingInputFile",
            ErrorKind::InsufficientData => "InsufficientData",
            ErrorKind::MissingArtifact => "MissingArtifact",
            ErrorKind::DegenerateMetric => "DegenerateMetric",
            ErrorKind::UnexpectedException => "UnexpectedException",
        };
        f.write_str(label)
    }
}

impl PipelineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PipelineError::MissingInputFile { .. } => ErrorKind::MissingInputFile,
            PipelineError::InsufficientData { .. }
            | PipelineError::TooFewSequences { .. }
            | PipelineError::EmptySeries { .. }
            | PipelineError::StaleGap { .. } => ErrorKind::InsufficientData,
            PipelineError::MissingArtifact { .. } | PipelineError::ArtifactMismatch { .. } => {
                ErrorKind::MissingArtifact
            }
            _ => ErrorKind::UnexpectedException,
        }
    }

    /// Expected data conditions that skip a facility rather than count as crashes.
    pub fn is_skip(&self) -> bool {
        !matches!(self.kind(), ErrorKind::UnexpectedException)
    }
}
