//! Facility batch orchestration.
//!
//! A batch step runs one facility after another. Each facility yields a
//! [`FacilityOutcome`]; skips and failures are logged and recorded in the
//! error log, and the loop moves on to the next facility.

use crate::domain::errors::{ErrorKind, PipelineError};
use crate::domain::forecasting::FacilityOutcome;
use crate::domain::ml::artifact::ModelKind;
use crate::domain::ml::feature_registry::FeatureVariant;
use crate::domain::ports::ReadingSource;
use crate::domain::repositories::{ArtifactKey, ArtifactRepository};
use crate::infrastructure::error_log::ErrorLog;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::IndexedRandom;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

/// Which facilities a batch step processes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FacilitySelection {
    All,
    List(Vec<String>),
    /// Seeded random sample of `count` facilities, returned in sorted order.
    Sample { count: usize, seed: u64 },
}

impl FacilitySelection {
    pub fn resolve(&self, available: &[String]) -> Vec<String> {
        match self {
            FacilitySelection::All => available.to_vec(),
            FacilitySelection::List(ids) => ids.clone(),
            FacilitySelection::Sample { count, seed } => {
                let mut rng = StdRng::seed_from_u64(*seed);
                let mut picked: Vec<String> = available
                    .choose_multiple(&mut rng, (*count).min(available.len()))
                    .cloned()
                    .collect();
                picked.sort();
                picked
            }
        }
    }
}

/// A facility a batch step did not complete, with its error-log class.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkippedFacility {
    pub facility_id: String,
    pub kind: String,
    pub detail: String,
}

#[derive(Debug)]
pub struct BatchReport<T> {
    pub outcomes: Vec<(String, FacilityOutcome<T>)>,
}

impl<T> BatchReport<T> {
    pub fn completed(&self) -> impl Iterator<Item = (&str, &T)> {
        self.outcomes
            .iter()
            .filter_map(|(id, outcome)| outcome.completed().map(|value| (id.as_str(), value)))
    }

    pub fn completed_count(&self) -> usize {
        self.completed().count()
    }

    pub fn not_completed(&self) -> impl Iterator<Item = (&str, &FacilityOutcome<T>)> {
        self.outcomes
            .iter()
            .filter(|(_, outcome)| outcome.completed().is_none())
            .map(|(id, outcome)| (id.as_str(), outcome))
    }

    /// Splits into completed values and the facilities left behind, in batch order.
    pub fn into_parts(self) -> (Vec<T>, Vec<SkippedFacility>) {
        let mut completed = Vec::new();
        let mut skipped = Vec::new();
        for (facility_id, outcome) in self.outcomes {
            let kind = outcome.error_kind();
            match outcome {
                FacilityOutcome::Completed(value) => completed.push(value),
                FacilityOutcome::Skipped(reason) => skipped.push(SkippedFacility {
                    facility_id,
                    kind: reason.kind.to_string(),
                    detail: reason.detail,
                }),
                FacilityOutcome::Failed(err) => skipped.push(SkippedFacility {
                    facility_id,
                    kind: kind.map(|k| k.to_string()).unwrap_or_default(),
                    detail: err.to_string(),
                }),
            }
        }
        (completed, skipped)
    }
}

pub struct BatchRunner {
    error_log: ErrorLog,
}

impl BatchRunner {
    pub fn new(error_log: ErrorLog) -> Self {
        Self { error_log }
    }

    pub fn error_log(&self) -> &ErrorLog {
        &self.error_log
    }

    /// Runs `step_fn` for every facility without letting one failure stop the batch.
    pub fn run<T, F>(&self, step: &str, facilities: &[String], mut step_fn: F) -> BatchReport<T>
    where
        F: FnMut(&str) -> Result<T, PipelineError>,
    {
        let total = facilities.len();
        let mut outcomes = Vec::with_capacity(total);

        for (i, facility_id) in facilities.iter().enumerate() {
            info!("[{}/{}] {} {}", i + 1, total, step, facility_id);
            let outcome = FacilityOutcome::from_result(step_fn(facility_id));

            match &outcome {
                FacilityOutcome::Completed(_) => {}
                FacilityOutcome::Skipped(reason) => {
                    warn!("Skipping {} ({}): {}", facility_id, reason.kind, reason.detail);
                    self.record(step, facility_id, &outcome, &reason.detail);
                }
                FacilityOutcome::Failed(err) => {
                    error!("{} failed for {}: {}", step, facility_id, err);
                    self.record(step, facility_id, &outcome, &err.to_string());
                }
            }
            outcomes.push((facility_id.clone(), outcome));
        }

        let report = BatchReport { outcomes };
        info!(
            "{}: {}/{} facilities completed",
            step,
            report.completed_count(),
            total
        );
        report
    }

    /// Logs and records a condition found after a facility completed.
    pub fn note(&self, step: &str, facility_id: &str, kind: ErrorKind, detail: &str) {
        warn!("{} {}: {} ({})", step, facility_id, detail, kind);
        if let Err(e) = self.error_log.append(step, facility_id, kind, detail) {
            error!(
                "Failed to write error log {}: {}",
                self.error_log.path().display(),
                e
            );
        }
    }

    fn record<T>(&self, step: &str, facility_id: &str, outcome: &FacilityOutcome<T>, detail: &str) {
        let Some(kind) = outcome.error_kind() else {
            return;
        };
        if let Err(e) = self.error_log.append(step, facility_id, kind, detail) {
            error!(
                "Failed to write error log {}: {}",
                self.error_log.path().display(),
                e
            );
        }
    }
}

/// Facilities with a readings file but no complete artifact set for `variant`.
///
/// A set is complete when both model files load with their paired scalers and
/// the split indices are present. An unreadable set counts as missing and the
/// audit moves on to the next facility.
pub fn find_missing_models(
    source: &dyn ReadingSource,
    repository: &dyn ArtifactRepository,
    variant: FeatureVariant,
) -> Result<Vec<String>, PipelineError> {
    let mut missing = Vec::new();
    for facility_id in source.facility_ids()? {
        let key = ArtifactKey::new(facility_id.as_str(), variant);
        let complete = repository
            .load_trained(&key, ModelKind::BestCheckpoint)
            .and_then(|_| repository.load_trained(&key, ModelKind::Final))
            .and_then(|_| repository.load_split(&key));
        match complete {
            Ok(_) => {}
            Err(e) if e.is_skip() => missing.push(facility_id),
            Err(e) => {
                warn!("{}: artifacts unreadable: {}", key, e);
                missing.push(facility_id);
            }
        }
    }
    Ok(missing)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn temp_log_path(tag: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!(
            "lotcast_test_{}_{}_{}.log",
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .map(|d| d.as_nanos())
                .unwrap_or(0),
            tag
        ))
    }

    #[test]
    fn test_sample_is_seeded_and_sorted() {
        let available = ids(&["a", "b", "c", "d", "e", "f"]);
        let selection = FacilitySelection::Sample { count: 3, seed: 42 };
        let first = selection.resolve(&available);
        let second = selection.resolve(&available);

        assert_eq!(first.len(), 3);
        assert_eq!(first, second);
        let mut sorted = first.clone();
        sorted.sort();
        assert_eq!(first, sorted);

        let oversized = FacilitySelection::Sample { count: 10, seed: 1 }.resolve(&available);
        assert_eq!(oversized, available);
    }

    #[test]
    fn test_list_and_all() {
        let available = ids(&["a", "b"]);
        assert_eq!(FacilitySelection::All.resolve(&available), available);
        assert_eq!(
            FacilitySelection::List(ids(&["z"])).resolve(&available),
            ids(&["z"])
        );
    }

    #[test]
    fn test_failures_do_not_stop_batch() {
        let path = temp_log_path("batch");
        let runner = BatchRunner::new(ErrorLog::new(&path));
        let facilities = ids(&["ok1", "missing", "short", "boom", "ok2"]);

        let report = runner.run("train", &facilities, |id| match id {
            "missing" => Err(PipelineError::MissingInputFile {
                path: "missing.csv".into(),
            }),
            "short" => Err(PipelineError::InsufficientData {
                facility_id: id.to_string(),
                rows: 3,
                required: 28,
            }),
            "boom" => Err(PipelineError::InvalidInput("unexpected".to_string())),
            _ => Ok(id.len()),
        });

        assert_eq!(report.outcomes.len(), 5);
        assert_eq!(report.completed_count(), 2);
        let kinds: Vec<Option<ErrorKind>> = report
            .not_completed()
            .map(|(_, outcome)| outcome.error_kind())
            .collect();
        assert_eq!(
            kinds,
            vec![
                Some(ErrorKind::MissingInputFile),
                Some(ErrorKind::InsufficientData),
                Some(ErrorKind::UnexpectedException),
            ]
        );

        let entries = runner.error_log().read_entries().unwrap();
        assert_eq!(entries.len(), 3);
        assert!(entries[0].contains("\tmissing\tMissingInputFile\t"));

        let (completed, skipped) = report.into_parts();
        assert_eq!(completed, vec![3, 3]);
        assert_eq!(skipped.len(), 3);
        assert_eq!(skipped[2].facility_id, "boom");
        assert_eq!(skipped[2].kind, "UnexpectedException");

        runner.note("evaluate", "ok1", ErrorKind::DegenerateMetric, "MAPE undefined at step 3");
        let entries = runner.error_log().read_entries().unwrap();
        assert_eq!(entries.len(), 4);
        assert!(entries[3].contains("\tok1\tDegenerateMetric\tMAPE undefined at step 3"));

        std::fs::remove_file(path).ok();
    }
}
