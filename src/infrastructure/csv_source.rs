//! CSV-backed reading source.
//!
//! One `<facility_id>.csv` per facility with `update_datetime` and
//! `lots_available` columns, plus one shared precipitation CSV with
//! `timestamp` and `precipitation` columns. Other columns are ignored.

use crate::domain::errors::PipelineError;
use crate::domain::forecasting::{PrecipitationReading, RawReading};
use crate::domain::ports::ReadingSource;
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::Deserialize;
use std::fs::{self, File};
use std::io::BufReader;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const NAIVE_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

#[derive(Debug, Deserialize)]
struct FacilityRecord {
    update_datetime: String,
    #[serde(deserialize_with = "csv::invalid_option")]
    lots_available: Option<f64>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    total_lots: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct PrecipitationRecord {
    timestamp: String,
    #[serde(deserialize_with = "csv::invalid_option")]
    precipitation: Option<f64>,
}

/// Parses the timestamp shapes found in the raw exports.
///
/// RFC 3339 values keep their stated wall-clock time; the offset is dropped.
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.naive_local());
    }
    for format in NAIVE_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(dt);
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

pub struct CsvReadingSource {
    parking_dir: PathBuf,
    precipitation_file: PathBuf,
}

impl CsvReadingSource {
    pub fn new(parking_dir: impl Into<PathBuf>, precipitation_file: impl Into<PathBuf>) -> Self {
        Self {
            parking_dir: parking_dir.into(),
            precipitation_file: precipitation_file.into(),
        }
    }

    pub fn facility_path(&self, facility_id: &str) -> PathBuf {
        self.parking_dir.join(format!("{}.csv", facility_id))
    }

    fn open(path: &Path) -> Result<csv::Reader<BufReader<File>>, PipelineError> {
        if !path.is_file() {
            return Err(PipelineError::MissingInputFile {
                path: path.to_path_buf(),
            });
        }
        let file = File::open(path)?;
        Ok(csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(BufReader::new(file)))
    }
}

impl ReadingSource for CsvReadingSource {
    fn facility_ids(&self) -> Result<Vec<String>, PipelineError> {
        if !self.parking_dir.is_dir() {
            return Err(PipelineError::MissingInputFile {
                path: self.parking_dir.clone(),
            });
        }

        let mut ids = Vec::new();
        for entry in fs::read_dir(&self.parking_dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("csv") {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                ids.push(stem.to_string());
            }
        }
        ids.sort();
        Ok(ids)
    }

    fn load_facility(&self, facility_id: &str) -> Result<Vec<RawReading>, PipelineError> {
        let path = self.facility_path(facility_id);
        let mut rdr = Self::open(&path)?;

        let mut readings = Vec::new();
        let mut unparseable = 0usize;
        for result in rdr.deserialize() {
            let record: FacilityRecord = result?;
            let Some(timestamp) = parse_timestamp(&record.update_datetime) else {
                unparseable += 1;
                continue;
            };
            readings.push(RawReading {
                facility_id: facility_id.to_string(),
                timestamp,
                lots_available: record.lots_available,
                total_lots: record.total_lots.map(|v| v.round() as i64),
            });
        }

        if unparseable > 0 {
            warn!(
                "{}: dropped {} rows with unparseable update_datetime",
                facility_id, unparseable
            );
        }
        debug!("Loaded {} readings from {:?}", readings.len(), path);
        Ok(readings)
    }

    fn load_precipitation(&self) -> Result<Option<Vec<PrecipitationReading>>, PipelineError> {
        if !self.precipitation_file.is_file() {
            warn!(
                "Precipitation file {:?} not found; only the time-only variant can run",
                self.precipitation_file
            );
            return Ok(None);
        }

        let mut rdr = Self::open(&self.precipitation_file)?;
        let mut readings = Vec::new();
        for result in rdr.deserialize() {
            let record: PrecipitationRecord = result?;
            if let Some(timestamp) = parse_timestamp(&record.timestamp) {
                readings.push(PrecipitationReading {
                    timestamp,
                    precipitation: record.precipitation,
                });
            }
        }
        Ok(Some(readings))
    }

    fn precipitation_location(&self) -> PathBuf {
        self.precipitation_file.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;
    use std::sync::atomic::{AtomicU64, Ordering};

    static TEST_COUNTER: AtomicU64 = AtomicU64::new(0);

    fn temp_dir() -> PathBuf {
        let unique_id = TEST_COUNTER.fetch_add(1, Ordering::SeqCst);
        let dir = std::env::temp_dir().join(format!(
            "lotcast_test_{}_{}_{}_csv",
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .map(|d| d.as_nanos())
                .unwrap_or(0),
            unique_id
        ));
        fs::create_dir_all(&dir).expect("Failed to create test temp dir");
        dir
    }

    #[test]
    fn test_parse_timestamp_formats() {
        let expected = NaiveDate::from_ymd_opt(2024, 5, 6)
            .and_then(|d| d.and_hms_opt(7, 8, 9))
            .unwrap();
        assert_eq!(parse_timestamp("2024-05-06T07:08:09"), Some(expected));
        assert_eq!(parse_timestamp("2024-05-06 07:08:09"), Some(expected));
        assert_eq!(parse_timestamp("2024-05-06T07:08:09+09:00"), Some(expected));
        assert_eq!(
            parse_timestamp("2024-05-06 07:08:09.250").map(|t| t.nanosecond()),
            Some(250_000_000)
        );
        assert_eq!(
            parse_timestamp("2024-05-06").map(|t| t.hour()),
            Some(0)
        );
        assert_eq!(parse_timestamp("yesterday"), None);
    }

    #[test]
    fn test_load_facility_blank_and_extra_columns() {
        let dir = temp_dir();
        fs::write(
            dir.join("P1.csv"),
            "req_time,update_datetime,lots_available,total_lots\n\
             x,2024-01-01 00:00:00,12,40\n\
             x,2024-01-01 00:05:00,,40\n\
             x,not a time,5,40\n\
             x,2024-01-01 00:10:00,14,\n",
        )
        .unwrap();
        fs::write(dir.join("notes.txt"), "ignored").unwrap();
        let source = CsvReadingSource::new(&dir, dir.join("missing_precip.csv"));

        assert_eq!(source.facility_ids().unwrap(), vec!["P1".to_string()]);
        let readings = source.load_facility("P1").unwrap();
        assert_eq!(readings.len(), 3);
        assert_eq!(readings[0].lots_available, Some(12.0));
        assert_eq!(readings[0].total_lots, Some(40));
        assert_eq!(readings[1].lots_available, None);
        assert_eq!(readings[2].total_lots, None);

        assert!(source.load_precipitation().unwrap().is_none());
        fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn test_missing_facility_file() {
        let dir = temp_dir();
        let source = CsvReadingSource::new(&dir, dir.join("precip.csv"));
        let err = source.load_facility("ghost").unwrap_err();
        assert!(matches!(err, PipelineError::MissingInputFile { ref path } if path.ends_with("ghost.csv")));
        fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn test_load_precipitation() {
        let dir = temp_dir();
        let precip = dir.join("precip.csv");
        fs::write(
            &precip,
            "timestamp,precipitation\n2024-01-01T00:00:00,0.5\n2024-01-01T01:00:00,\n",
        )
        .unwrap();
        let source = CsvReadingSource::new(&dir, &precip);
        let readings = source.load_precipitation().unwrap().unwrap();
        assert_eq!(readings.len(), 2);
        assert_eq!(readings[0].precipitation, Some(0.5));
        assert_eq!(readings[1].precipitation, None);
        fs::remove_dir_all(dir).ok();
    }
}
