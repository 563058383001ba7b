use crate::domain::errors::PipelineError;
use crate::domain::forecasting::{FeatureRow, FeatureTable, PrecipitationSeries, ResampledSeries};
use crate::domain::ml::feature_registry::FeatureVariant;
use chrono::{Datelike, NaiveDateTime, Timelike};
use std::collections::HashMap;
use std::f64::consts::PI;
use tracing::debug;

/// Sine/cosine pair placing `value` on a circle of circumference `period`.
pub fn cyclical_encode(value: f64, period: f64) -> (f64, f64) {
    let angle = 2.0 * PI * value / period;
    (angle.sin(), angle.cos())
}

/// Encodes one grid timestamp. `time_index` is measured in minutes from `origin`.
pub fn encode_row(
    timestamp: NaiveDateTime,
    origin: NaiveDateTime,
    lots_available: f64,
    precipitation: f64,
) -> FeatureRow {
    let day_of_week = timestamp.weekday().num_days_from_monday();
    let (hour_sin, hour_cos) = cyclical_encode(timestamp.hour() as f64, 24.0);
    let (minute_sin, minute_cos) = cyclical_encode(timestamp.minute() as f64, 60.0);
    let (day_sin, day_cos) = cyclical_encode(day_of_week as f64, 7.0);
    let (day_of_month_sin, day_of_month_cos) = cyclical_encode(timestamp.day() as f64, 31.0);
    let (month_sin, month_cos) = cyclical_encode(timestamp.month() as f64, 12.0);

    FeatureRow {
        timestamp,
        lots_available,
        precipitation,
        hour_sin,
        hour_cos,
        minute_sin,
        minute_cos,
        day_sin,
        day_cos,
        day_of_month_sin,
        day_of_month_cos,
        month_sin,
        month_cos,
        is_weekend: if day_of_week >= 5 { 1.0 } else { 0.0 },
        time_index: (timestamp - origin).num_seconds() as f64 / 60.0,
    }
}

/// Turns a resampled series into a feature table for one variant.
#[derive(Debug, Clone, Copy, Default)]
pub struct FeatureBuilder;

impl FeatureBuilder {
    /// With `precipitation` present, only grid timestamps covered by both
    /// series are kept, for either variant, so the two variants share their
    /// timestamps. `TimeOnly` then zeroes the precipitation column.
    pub fn build(
        &self,
        series: &ResampledSeries,
        precipitation: Option<&PrecipitationSeries>,
        variant: FeatureVariant,
    ) -> Result<FeatureTable, PipelineError> {
        self.build_from(series, precipitation, variant, None)
    }

    /// Like [`FeatureBuilder::build`], but measures `time_index` from a fixed
    /// `origin` (the one a model was trained with) instead of the first row.
    pub fn build_from(
        &self,
        series: &ResampledSeries,
        precipitation: Option<&PrecipitationSeries>,
        variant: FeatureVariant,
        origin: Option<NaiveDateTime>,
    ) -> Result<FeatureTable, PipelineError> {
        if variant.uses_precipitation() && precipitation.is_none() {
            return Err(PipelineError::InvalidInput(format!(
                "{} requires a precipitation series",
                variant
            )));
        }

        let merged: Vec<(NaiveDateTime, f64, f64)> = match precipitation {
            Some(precip) => {
                let lookup: HashMap<NaiveDateTime, f64> = precip
                    .points
                    .iter()
                    .map(|p| (p.timestamp, p.value))
                    .collect();
                series
                    .points
                    .iter()
                    .filter_map(|p| lookup.get(&p.timestamp).map(|&v| (p.timestamp, p.value, v)))
                    .collect()
            }
            None => series
                .points
                .iter()
                .map(|p| (p.timestamp, p.value, 0.0))
                .collect(),
        };

        let origin = origin
            .or_else(|| merged.first().map(|(ts, _, _)| *ts))
            .or_else(|| series.first_timestamp())
            .ok_or_else(|| PipelineError::EmptySeries {
                facility_id: series.facility_id.clone(),
            })?;

        let rows: Vec<FeatureRow> = merged
            .into_iter()
            .map(|(timestamp, lots, precip)| {
                let precip = if variant.uses_precipitation() { precip } else { 0.0 };
                encode_row(timestamp, origin, lots, precip)
            })
            .collect();

        debug!(
            "{} [{}]: built {} feature rows from {} grid points",
            series.facility_id,
            variant,
            rows.len(),
            series.len()
        );

        Ok(FeatureTable {
            facility_id: series.facility_id.clone(),
            variant,
            origin,
            rows,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::forecasting::GridPoint;
    use chrono::{Duration, NaiveDate};

    fn ts(day: u32, hour: u32, minute: u32) -> NaiveDateTime {
        // 2024-06-01 is a Saturday.
        NaiveDate::from_ymd_opt(2024, 6, day)
            .and_then(|d| d.and_hms_opt(hour, minute, 0))
            .unwrap()
    }

    fn series(start: NaiveDateTime, values: &[f64]) -> ResampledSeries {
        ResampledSeries {
            facility_id: "B7".to_string(),
            points: values
                .iter()
                .enumerate()
                .map(|(i, &value)| GridPoint {
                    timestamp: start + Duration::minutes(15 * i as i64),
                    value,
                })
                .collect(),
            longest_fill_run: 0,
        }
    }

    #[test]
    fn test_cyclical_encoding_is_periodic() {
        for hour in 0..24 {
            let (s0, c0) = cyclical_encode(hour as f64, 24.0);
            let (s1, c1) = cyclical_encode((hour + 24) as f64, 24.0);
            assert!((s0 - s1).abs() < 1e-9);
            assert!((c0 - c1).abs() < 1e-9);
        }
        let (s, c) = cyclical_encode(0.0, 60.0);
        assert_eq!((s, c), (0.0, 1.0));
    }

    #[test]
    fn test_encode_row_calendar_fields() {
        let origin = ts(1, 0, 0);
        let row = encode_row(ts(3, 6, 45), origin, 12.0, 0.4);

        // Monday, 6:45.
        assert_eq!(row.is_weekend, 0.0);
        assert!((row.hour_sin - 1.0).abs() < 1e-12);
        assert!((row.minute_sin + 1.0).abs() < 1e-12);
        assert_eq!(row.day_sin, 0.0);
        assert_eq!(row.time_index, (2.0 * 24.0 + 6.0) * 60.0 + 45.0);

        let saturday = encode_row(ts(1, 12, 0), origin, 12.0, 0.0);
        assert_eq!(saturday.is_weekend, 1.0);
        assert_eq!(saturday.time_index, 720.0);
    }

    #[test]
    fn test_time_only_without_precipitation() {
        let s = series(ts(1, 0, 0), &[1.0, 2.0, 3.0]);
        let table = FeatureBuilder
            .build(&s, None, FeatureVariant::TimeOnly)
            .unwrap();

        assert_eq!(table.len(), 3);
        assert_eq!(table.origin, ts(1, 0, 0));
        assert!(table.rows.iter().all(|r| r.precipitation == 0.0));
        assert_eq!(table.to_matrix().dim(), (3, 13));
        assert_eq!(table.rows[2].time_index, 30.0);
    }

    #[test]
    fn test_precipitation_inner_join_shared_by_both_variants() {
        let s = series(ts(1, 0, 0), &[1.0, 2.0, 3.0, 4.0]);
        let precip = PrecipitationSeries {
            points: vec![
                GridPoint {
                    timestamp: ts(1, 0, 15),
                    value: 0.5,
                },
                GridPoint {
                    timestamp: ts(1, 0, 30),
                    value: 0.7,
                },
                GridPoint {
                    timestamp: ts(1, 0, 45),
                    value: 0.9,
                },
                GridPoint {
                    timestamp: ts(1, 1, 0),
                    value: 1.1,
                },
            ],
        };

        let with = FeatureBuilder
            .build(&s, Some(&precip), FeatureVariant::TimeAndPrecipitation)
            .unwrap();
        let without = FeatureBuilder
            .build(&s, Some(&precip), FeatureVariant::TimeOnly)
            .unwrap();

        assert_eq!(with.timestamps(), without.timestamps());
        assert_eq!(with.len(), 3);
        assert_eq!(with.origin, ts(1, 0, 15));
        assert_eq!(with.rows[0].time_index, 0.0);
        assert_eq!(with.rows[0].precipitation, 0.5);
        assert_eq!(without.rows[0].precipitation, 0.0);

        let matrix = with.to_matrix();
        assert_eq!(matrix.dim(), (3, 14));
        assert_eq!(matrix[[1, 0]], 3.0);
        assert_eq!(matrix[[1, 1]], 0.7);
    }

    #[test]
    fn test_fixed_origin_keeps_time_index() {
        let full = series(ts(1, 0, 0), &[1.0, 2.0, 3.0, 4.0]);
        let pruned = series(ts(1, 0, 30), &[3.0, 4.0]);

        let reference = FeatureBuilder
            .build(&full, None, FeatureVariant::TimeOnly)
            .unwrap();
        let drifted = FeatureBuilder
            .build(&pruned, None, FeatureVariant::TimeOnly)
            .unwrap();
        let anchored = FeatureBuilder
            .build_from(&pruned, None, FeatureVariant::TimeOnly, Some(ts(1, 0, 0)))
            .unwrap();

        assert_eq!(drifted.rows[0].time_index, 0.0);
        assert_eq!(anchored.origin, ts(1, 0, 0));
        assert_eq!(anchored.rows, reference.rows[2..].to_vec());
    }

    #[test]
    fn test_precipitation_variant_requires_series() {
        let s = series(ts(1, 0, 0), &[1.0]);
        assert!(
            FeatureBuilder
                .build(&s, None, FeatureVariant::TimeAndPrecipitation)
                .is_err()
        );
    }
}
