#![allow(dead_code)]

use chrono::{Duration, NaiveDate, NaiveDateTime};
use lotcast::domain::config::TrainingConfig;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

static TEST_COUNTER: AtomicU64 = AtomicU64::new(0);

pub struct TestWorkspace {
    pub root: PathBuf,
}

impl TestWorkspace {
    pub fn new(tag: &str) -> Self {
        let unique_id = TEST_COUNTER.fetch_add(1, Ordering::SeqCst);
        let root = std::env::temp_dir().join(format!(
            "lotcast_it_{}_{}_{}_{}",
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .map(|d| d.as_nanos())
                .unwrap_or(0),
            unique_id,
            tag
        ));
        fs::create_dir_all(root.join("parking")).expect("Failed to create test temp dir");
        Self { root }
    }

    pub fn parking_dir(&self) -> PathBuf {
        self.root.join("parking")
    }

    pub fn precipitation_file(&self) -> PathBuf {
        self.root.join("precipitation.csv")
    }

    pub fn models_dir(&self) -> PathBuf {
        self.root.join("models")
    }

    pub fn error_log(&self) -> PathBuf {
        self.root.join("error.log")
    }

    pub fn facility_csv(&self, facility_id: &str) -> PathBuf {
        self.parking_dir().join(format!("{}.csv", facility_id))
    }
}

impl Drop for TestWorkspace {
    fn drop(&mut self) {
        fs::remove_dir_all(&self.root).ok();
    }
}

pub fn start() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 6, 3)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .expect("valid start")
}

/// Facility CSV with one reading every 5 minutes for `days` days.
pub fn write_facility_csv(path: &Path, days: i64, value: impl Fn(i64) -> f64) {
    let mut content = String::from("update_datetime,lots_available,total_lots\n");
    for i in 0..days * 288 {
        let ts = start() + Duration::minutes(5 * i);
        content.push_str(&format!(
            "{},{},120\n",
            ts.format("%Y-%m-%d %H:%M:%S"),
            value(i)
        ));
    }
    fs::write(path, content).expect("write facility csv");
}

/// Precipitation every 15 minutes over the same span.
pub fn write_precipitation_csv(path: &Path, days: i64) {
    let mut content = String::from("timestamp,precipitation\n");
    for i in 0..days * 96 {
        let ts = start() + Duration::minutes(15 * i);
        let mm = if (i / 8) % 5 == 0 { 0.4 } else { 0.0 };
        content.push_str(&format!("{},{}\n", ts.format("%Y-%m-%dT%H:%M:%S"), mm));
    }
    fs::write(path, content).expect("write precipitation csv");
}

/// Small network and few epochs so integration tests stay quick.
pub fn small_config() -> TrainingConfig {
    TrainingConfig {
        epochs: 3,
        batch_size: 64,
        learning_rate: 0.01,
        hidden_units: 16,
        dense_units: 4,
        ..TrainingConfig::default()
    }
}
