use crate::domain::ml::feature_registry::FeatureVariant;
use chrono::{Duration, NaiveDateTime};
use ndarray::Array2;
use serde::{Deserialize, Serialize};

/// Grid spacing for every resampled series.
pub const RESAMPLE_INTERVAL_MINUTES: i64 = 15;

pub fn resample_interval() -> Duration {
    Duration::minutes(RESAMPLE_INTERVAL_MINUTES)
}

/// One occupancy snapshot as ingested. `lots_available` is `None` when the source cell was blank.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawReading {
    pub facility_id: String,
    pub timestamp: NaiveDateTime,
    pub lots_available: Option<f64>,
    pub total_lots: Option<i64>,
}

/// A single precipitation observation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrecipitationReading {
    pub timestamp: NaiveDateTime,
    pub precipitation: Option<f64>,
}

/// Value on the uniform resampling grid.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GridPoint {
    pub timestamp: NaiveDateTime,
    pub value: f64,
}

/// Gap-free, strictly increasing 15-minute series of `lots_available` for one facility.
#[derive(Debug, Clone, PartialEq)]
pub struct ResampledSeries {
    pub facility_id: String,
    pub points: Vec<GridPoint>,
    /// Longest run of consecutive buckets filled by carrying a value forward.
    pub longest_fill_run: usize,
}

impl ResampledSeries {
    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn first_timestamp(&self) -> Option<NaiveDateTime> {
        self.points.first().map(|p| p.timestamp)
    }

    pub fn last_timestamp(&self) -> Option<NaiveDateTime> {
        self.points.last().map(|p| p.timestamp)
    }
}

/// Precipitation on the same 15-minute grid.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PrecipitationSeries {
    pub points: Vec<GridPoint>,
}

/// Per-timestamp feature record shared by both variants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureRow {
    pub timestamp: NaiveDateTime,
    pub lots_available: f64,
    /// Zero when the variant does not use precipitation.
    pub precipitation: f64,
    pub hour_sin: f64,
    pub hour_cos: f64,
    pub minute_sin: f64,
    pub minute_cos: f64,
    pub day_sin: f64,
    pub day_cos: f64,
    pub day_of_month_sin: f64,
    pub day_of_month_cos: f64,
    pub month_sin: f64,
    pub month_cos: f64,
    pub is_weekend: f64,
    /// Minutes elapsed since the series origin.
    pub time_index: f64,
}

/// Feature rows for one facility, laid out for one variant.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureTable {
    pub facility_id: String,
    pub variant: FeatureVariant,
    /// Timestamp that `time_index` is measured from.
    pub origin: NaiveDateTime,
    pub rows: Vec<FeatureRow>,
}

impl FeatureTable {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn timestamps(&self) -> Vec<NaiveDateTime> {
        self.rows.iter().map(|r| r.timestamp).collect()
    }

    /// Dense `[T, F]` matrix in the variant's column order.
    pub fn to_matrix(&self) -> Array2<f64> {
        let features = self.variant.feature_count();
        let mut matrix = Array2::zeros((self.rows.len(), features));
        let mut buffer = vec![0.0; features];
        for (row, mut out) in self.rows.iter().zip(matrix.rows_mut()) {
            self.variant.write_vector(row, &mut buffer);
            for (dst, src) in out.iter_mut().zip(buffer.iter()) {
                *dst = *src;
            }
        }
        matrix
    }
}
