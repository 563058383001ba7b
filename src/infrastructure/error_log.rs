//! Append-only log of facilities a batch step could not complete.
//!
//! One tab-separated line per entry:
//! `<utc timestamp>\t<step>\t<facility>\t<error kind>\t<detail>`.

use crate::domain::errors::{ErrorKind, PipelineError};
use chrono::{SecondsFormat, Utc};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

pub struct ErrorLog {
    path: PathBuf,
    lock: Mutex<()>,
}

impl ErrorLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(
        &self,
        step: &str,
        facility_id: &str,
        kind: ErrorKind,
        detail: &str,
    ) -> Result<(), PipelineError> {
        let _guard = self
            .lock
            .lock()
            .map_err(|_| PipelineError::InvalidInput("error log lock poisoned".to_string()))?;

        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        // Tabs and newlines inside the detail would break the line format.
        let detail = detail.replace(['\t', '\n'], " ");
        writeln!(
            file,
            "{}\t{}\t{}\t{}\t{}",
            Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            step,
            facility_id,
            kind,
            detail
        )?;
        Ok(())
    }

    /// Lines currently in the log; empty when the file does not exist yet.
    pub fn read_entries(&self) -> Result<Vec<String>, PipelineError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let content = fs::read_to_string(&self.path)?;
        Ok(content.lines().map(str::to_string).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};

    static TEST_COUNTER: AtomicU64 = AtomicU64::new(0);

    fn temp_log() -> (ErrorLog, PathBuf) {
        let unique_id = TEST_COUNTER.fetch_add(1, Ordering::SeqCst);
        let temp_dir = std::env::temp_dir().join(format!(
            "lotcast_test_{}_{}_{}_errlog",
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .map(|d| d.as_nanos())
                .unwrap_or(0),
            unique_id
        ));
        (ErrorLog::new(temp_dir.join("nested").join("error.log")), temp_dir)
    }

    #[test]
    fn test_append_creates_file_and_parent() {
        let (log, temp_dir) = temp_log();
        assert!(log.read_entries().unwrap().is_empty());

        log.append("train", "A1", ErrorKind::MissingInputFile, "gone")
            .unwrap();
        log.append("train", "B2", ErrorKind::InsufficientData, "too\tshort\n")
            .unwrap();

        let entries = log.read_entries().unwrap();
        assert_eq!(entries.len(), 2);
        let fields: Vec<&str> = entries[1].split('\t').collect();
        assert_eq!(fields.len(), 5);
        assert_eq!(fields[2], "B2");
        assert_eq!(fields[3], "InsufficientData");
        assert_eq!(fields[4], "too short ");

        fs::remove_dir_all(temp_dir).ok();
    }
}
