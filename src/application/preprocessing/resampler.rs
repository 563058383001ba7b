//! Irregular readings onto the 15-minute grid.
//!
//! Facility readings are sorted, missing values forward-filled, averaged per
//! bucket, and empty buckets carry the previous bucket forward. Precipitation
//! follows the same bucketing but fills empty buckets by linear interpolation.

use crate::domain::errors::PipelineError;
use crate::domain::forecasting::types::resample_interval;
use crate::domain::forecasting::{
    GridPoint, PrecipitationReading, PrecipitationSeries, RawReading, ResampledSeries,
};
use chrono::{Duration, DurationRound, NaiveDateTime};
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Carried-forward runs longer than one day are logged.
pub const STALE_WARN_STEPS: usize = 96;

#[derive(Debug, Clone)]
pub struct Resampler {
    interval: Duration,
    max_carry_forward_steps: Option<usize>,
}

impl Default for Resampler {
    fn default() -> Self {
        Self::new(None)
    }
}

struct Bucket {
    sum: f64,
    count: usize,
}

impl Resampler {
    pub fn new(max_carry_forward_steps: Option<usize>) -> Self {
        Self {
            interval: resample_interval(),
            max_carry_forward_steps,
        }
    }

    fn bucket_of(&self, timestamp: NaiveDateTime) -> Result<NaiveDateTime, PipelineError> {
        timestamp
            .duration_trunc(self.interval)
            .map_err(|e| PipelineError::InvalidInput(format!("cannot bucket {}: {}", timestamp, e)))
    }

    /// Sorts, forward-fills and averages `(timestamp, value)` pairs into buckets.
    ///
    /// Returns the buckets and the number of leading missing values dropped.
    fn bucketize(
        &self,
        mut samples: Vec<(NaiveDateTime, Option<f64>)>,
    ) -> Result<(BTreeMap<NaiveDateTime, Bucket>, usize), PipelineError> {
        samples.sort_by_key(|(ts, _)| *ts);

        let mut buckets: BTreeMap<NaiveDateTime, Bucket> = BTreeMap::new();
        let mut last: Option<f64> = None;
        let mut leading_missing = 0;

        for (timestamp, value) in samples {
            let value = match value.filter(|v| v.is_finite()).or(last) {
                Some(v) => v,
                None => {
                    leading_missing += 1;
                    continue;
                }
            };
            last = Some(value);

            let bucket = buckets
                .entry(self.bucket_of(timestamp)?)
                .or_insert(Bucket { sum: 0.0, count: 0 });
            bucket.sum += value;
            bucket.count += 1;
        }

        Ok((buckets, leading_missing))
    }

    /// Resamples one facility's readings.
    ///
    /// The grid spans the first to the last non-missing reading; nothing is
    /// produced before or after that span.
    pub fn resample(
        &self,
        facility_id: &str,
        readings: &[RawReading],
    ) -> Result<ResampledSeries, PipelineError> {
        let samples = readings
            .iter()
            .map(|r| (r.timestamp, r.lots_available))
            .collect();
        let (buckets, leading_missing) = self.bucketize(samples)?;

        if leading_missing > 0 {
            warn!(
                "{}: dropped {} leading readings without lots_available",
                facility_id, leading_missing
            );
        }

        let (Some(&start), Some(&end)) = (buckets.keys().next(), buckets.keys().next_back())
        else {
            return Err(PipelineError::EmptySeries {
                facility_id: facility_id.to_string(),
            });
        };

        let mut points = Vec::with_capacity(buckets.len());
        let mut current = start;
        let mut carried = 0.0;
        let mut fill_run = 0usize;
        let mut longest_fill_run = 0usize;

        while current <= end {
            let value = match buckets.get(&current) {
                Some(bucket) => {
                    fill_run = 0;
                    bucket.sum / bucket.count as f64
                }
                None => {
                    fill_run += 1;
                    longest_fill_run = longest_fill_run.max(fill_run);
                    carried
                }
            };
            carried = value;
            points.push(GridPoint {
                timestamp: current,
                value,
            });
            current += self.interval;
        }

        if longest_fill_run > STALE_WARN_STEPS {
            warn!(
                "{}: value carried forward for {} consecutive steps",
                facility_id, longest_fill_run
            );
        }
        if let Some(limit) = self.max_carry_forward_steps {
            if longest_fill_run > limit {
                return Err(PipelineError::StaleGap {
                    facility_id: facility_id.to_string(),
                    steps: longest_fill_run,
                    limit,
                });
            }
        }

        debug!(
            "{}: resampled {} readings into {} rows",
            facility_id,
            readings.len(),
            points.len()
        );

        Ok(ResampledSeries {
            facility_id: facility_id.to_string(),
            points,
            longest_fill_run,
        })
    }

    /// Resamples precipitation; empty buckets are linearly interpolated
    /// between their neighbours.
    pub fn resample_precipitation(
        &self,
        readings: &[PrecipitationReading],
    ) -> Result<PrecipitationSeries, PipelineError> {
        let samples = readings
            .iter()
            .map(|r| (r.timestamp, r.precipitation))
            .collect();
        let (buckets, leading_missing) = self.bucketize(samples)?;
        if leading_missing > 0 {
            warn!(
                "precipitation: dropped {} leading readings without a value",
                leading_missing
            );
        }

        let mut points: Vec<GridPoint> = Vec::with_capacity(buckets.len());
        let mut iter = buckets.iter().peekable();
        while let Some((&timestamp, bucket)) = iter.next() {
            let value = bucket.sum / bucket.count as f64;
            points.push(GridPoint { timestamp, value });

            if let Some((next_ts, next_bucket)) = iter.peek() {
                let next_ts = **next_ts;
                let next_value = next_bucket.sum / next_bucket.count as f64;
                let gap_steps = (next_ts - timestamp).num_minutes() / self.interval.num_minutes();
                for step in 1..gap_steps {
                    let fraction = step as f64 / gap_steps as f64;
                    points.push(GridPoint {
                        timestamp: timestamp + self.interval * step as i32,
                        value: value + (next_value - value) * fraction,
                    });
                }
            }
        }

        Ok(PrecipitationSeries { points })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn ts(day: u32, hour: u32, minute: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 5, day)
            .and_then(|d| d.and_hms_opt(hour, minute, 0))
            .unwrap()
    }

    fn reading(timestamp: NaiveDateTime, lots: Option<f64>) -> RawReading {
        RawReading {
            facility_id: "A1".to_string(),
            timestamp,
            lots_available: lots,
            total_lots: Some(100),
        }
    }

    #[test]
    fn test_bucket_mean_and_sorting() {
        let readings = vec![
            reading(ts(1, 0, 10), Some(30.0)),
            reading(ts(1, 0, 0), Some(10.0)),
            reading(ts(1, 0, 5), Some(20.0)),
            reading(ts(1, 0, 20), Some(40.0)),
        ];
        let series = Resampler::default().resample("A1", &readings).unwrap();

        assert_eq!(series.len(), 2);
        assert_eq!(series.points[0].timestamp, ts(1, 0, 0));
        assert_eq!(series.points[0].value, 20.0);
        assert_eq!(series.points[1].timestamp, ts(1, 0, 15));
        assert_eq!(series.points[1].value, 40.0);
    }

    #[test]
    fn test_gaps_are_carried_forward() {
        let readings = vec![
            reading(ts(1, 0, 0), Some(10.0)),
            reading(ts(1, 1, 0), Some(50.0)),
        ];
        let series = Resampler::default().resample("A1", &readings).unwrap();

        let values: Vec<f64> = series.points.iter().map(|p| p.value).collect();
        assert_eq!(values, vec![10.0, 10.0, 10.0, 10.0, 50.0]);
        assert_eq!(series.longest_fill_run, 3);
        for pair in series.points.windows(2) {
            assert_eq!(pair[1].timestamp - pair[0].timestamp, Duration::minutes(15));
        }
    }

    #[test]
    fn test_missing_values_forward_filled_before_bucketing() {
        let readings = vec![
            reading(ts(1, 0, 0), Some(10.0)),
            reading(ts(1, 0, 20), None),
            reading(ts(1, 0, 25), Some(30.0)),
        ];
        let series = Resampler::default().resample("A1", &readings).unwrap();
        // Second bucket averages the filled 10.0 and 30.0.
        assert_eq!(series.points[1].value, 20.0);
    }

    #[test]
    fn test_leading_missing_excluded() {
        let readings = vec![
            reading(ts(1, 0, 0), None),
            reading(ts(1, 0, 30), Some(12.0)),
        ];
        let series = Resampler::default().resample("A1", &readings).unwrap();
        assert_eq!(series.first_timestamp(), Some(ts(1, 0, 30)));
        assert_eq!(series.len(), 1);
    }

    #[test]
    fn test_all_missing_is_empty_series() {
        let readings = vec![reading(ts(1, 0, 0), None)];
        let err = Resampler::default().resample("A1", &readings).unwrap_err();
        assert!(matches!(err, PipelineError::EmptySeries { .. }));

        let err = Resampler::default().resample("A1", &[]).unwrap_err();
        assert!(matches!(err, PipelineError::EmptySeries { .. }));
    }

    #[test]
    fn test_resampling_is_idempotent() {
        let readings: Vec<RawReading> = (0..50)
            .map(|i| {
                reading(
                    ts(1, 0, 0) + Duration::minutes(15 * i),
                    Some((i * 7 % 13) as f64),
                )
            })
            .collect();
        let resampler = Resampler::default();
        let first = resampler.resample("A1", &readings).unwrap();

        let again: Vec<RawReading> = first
            .points
            .iter()
            .map(|p| reading(p.timestamp, Some(p.value)))
            .collect();
        let second = resampler.resample("A1", &again).unwrap();

        assert_eq!(first.points, second.points);
        assert_eq!(first.len(), 50);
    }

    #[test]
    fn test_stale_gap_limit() {
        let readings = vec![
            reading(ts(1, 0, 0), Some(10.0)),
            reading(ts(2, 0, 0), Some(10.0)),
        ];
        let series = Resampler::new(None).resample("A1", &readings).unwrap();
        assert_eq!(series.longest_fill_run, 95);

        let err = Resampler::new(Some(10)).resample("A1", &readings).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::StaleGap {
                steps: 95,
                limit: 10,
                ..
            }
        ));
    }

    #[test]
    fn test_precipitation_interpolates_gaps() {
        let readings = vec![
            PrecipitationReading {
                timestamp: ts(1, 0, 0),
                precipitation: Some(0.0),
            },
            PrecipitationReading {
                timestamp: ts(1, 1, 0),
                precipitation: Some(4.0),
            },
        ];
        let series = Resampler::default()
            .resample_precipitation(&readings)
            .unwrap();
        let values: Vec<f64> = series.points.iter().map(|p| p.value).collect();
        assert_eq!(values, vec![0.0, 1.0, 2.0, 3.0, 4.0]);
        assert_eq!(series.points[2].timestamp, ts(1, 0, 30));
    }

    #[test]
    fn test_precipitation_empty_input() {
        let series = Resampler::default().resample_precipitation(&[]).unwrap();
        assert!(series.points.is_empty());
    }
}
