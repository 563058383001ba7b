use crate::domain::errors::{ErrorKind, PipelineError};

/// Why a facility was left out of a batch step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkipReason {
    pub kind: ErrorKind,
    pub detail: String,
}

impl From<&PipelineError> for SkipReason {
    fn from(err: &PipelineError) -> Self {
        Self {
            kind: err.kind(),
            detail: err.to_string(),
        }
    }
}

/// Result of one facility's pipeline run, as seen by the batch orchestrator.
#[derive(Debug)]
pub enum FacilityOutcome<T> {
    Completed(T),
    Skipped(SkipReason),
    Failed(PipelineError),
}

impl<T> FacilityOutcome<T> {
    pub fn from_result(result: Result<T, PipelineError>) -> Self {
        match result {
            Ok(value) => FacilityOutcome::Completed(value),
            Err(err) if err.is_skip() => FacilityOutcome::Skipped(SkipReason::from(&err)),
            Err(err) => FacilityOutcome::Failed(err),
        }
    }

    pub fn completed(&self) -> Option<&T> {
        match self {
            FacilityOutcome::Completed(value) => Some(value),
            _ => None,
        }
    }

    pub fn into_completed(self) -> Option<T> {
        match self {
            FacilityOutcome::Completed(value) => Some(value),
            _ => None,
        }
    }

    /// Error-log class for non-completed outcomes.
    pub fn error_kind(&self) -> Option<ErrorKind> {
        match self {
            FacilityOutcome::Completed(_) => None,
            FacilityOutcome::Skipped(reason) => Some(reason.kind),
            FacilityOutcome::Failed(_) => Some(ErrorKind::UnexpectedException),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_from_result_classifies() {
        let ok: FacilityOutcome<u32> = FacilityOutcome::from_result(Ok(7));
        assert_eq!(ok.completed(), Some(&7));
        assert_eq!(ok.error_kind(), None);

        let skipped: FacilityOutcome<u32> =
            FacilityOutcome::from_result(Err(PipelineError::MissingInputFile {
                path: PathBuf::from("x.csv"),
            }));
        assert_eq!(skipped.error_kind(), Some(ErrorKind::MissingInputFile));
        assert!(matches!(skipped, FacilityOutcome::Skipped(_)));

        let failed: FacilityOutcome<u32> =
            FacilityOutcome::from_result(Err(PipelineError::InvalidInput("nan".into())));
        assert_eq!(failed.error_kind(), Some(ErrorKind::UnexpectedException));
        assert!(failed.into_completed().is_none());
    }
}
