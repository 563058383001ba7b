use crate::domain::forecasting::types::FeatureRow;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Ordered feature names for the time-only variant: 13 columns, the target
/// `lots_available`, ten cyclical encodings, `is_weekend` and `time_index`.
/// The precipitation variant adds one column for 14.
/// Column 0 MUST stay `lots_available`: forecast targets are read from it.
/// Any change here is a breaking change for persisted models and scalers.
pub const TIME_ONLY_FEATURES: &[&str] = &[
    "lots_available",
    "hour_sin",
    "hour_cos",
    "minute_sin",
    "minute_cos",
    "day_sin",
    "day_cos",
    "day_of_month_sin",
    "day_of_month_cos",
    "month_sin",
    "month_cos",
    "is_weekend",
    "time_index",
];

/// Same layout with `precipitation` as the second column.
pub const WITH_PRECIPITATION_FEATURES: &[&str] = &[
    "lots_available",
    "precipitation",
    "hour_sin",
    "hour_cos",
    "minute_sin",
    "minute_cos",
    "day_sin",
    "day_cos",
    "day_of_month_sin",
    "day_of_month_cos",
    "month_sin",
    "month_cos",
    "is_weekend",
    "time_index",
];

/// Index of the forecast target inside every feature vector.
pub const TARGET_COLUMN: usize = 0;

/// The two feature pipelines compared by the ablation study.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureVariant {
    TimeOnly,
    #[serde(rename = "with_precipitation")]
    TimeAndPrecipitation,
}

impl FeatureVariant {
    pub const ALL: [FeatureVariant; 2] = [
        FeatureVariant::TimeOnly,
        FeatureVariant::TimeAndPrecipitation,
    ];

    /// Stable name used for artifact directories and reports.
    pub fn name(&self) -> &'static str {
        match self {
            FeatureVariant::TimeOnly => "time_only",
            FeatureVariant::TimeAndPrecipitation => "with_precipitation",
        }
    }

    pub fn feature_names(&self) -> &'static [&'static str] {
        match self {
            FeatureVariant::TimeOnly => TIME_ONLY_FEATURES,
            FeatureVariant::TimeAndPrecipitation => WITH_PRECIPITATION_FEATURES,
        }
    }

    pub fn feature_count(&self) -> usize {
        self.feature_names().len()
    }

    pub fn uses_precipitation(&self) -> bool {
        matches!(self, FeatureVariant::TimeAndPrecipitation)
    }

    /// Writes the variant's feature vector for `row` into `out` (length = `feature_count`).
    pub fn write_vector(&self, row: &FeatureRow, out: &mut [f64]) {
        let time_features = [
            row.hour_sin,
            row.hour_cos,
            row.minute_sin,
            row.minute_cos,
            row.day_sin,
            row.day_cos,
            row.day_of_month_sin,
            row.day_of_month_cos,
            row.month_sin,
            row.month_cos,
            row.is_weekend,
            row.time_index,
        ];

        out[TARGET_COLUMN] = row.lots_available;
        let offset = match self {
            FeatureVariant::TimeOnly => 1,
            FeatureVariant::TimeAndPrecipitation => {
                out[1] = row.precipitation;
                2
            }
        };
        out[offset..offset + time_features.len()].copy_from_slice(&time_features);
    }

    pub fn to_vector(&self, row: &FeatureRow) -> Vec<f64> {
        let mut out = vec![0.0; self.feature_count()];
        self.write_vector(row, &mut out);
        out
    }
}

impl fmt::Display for FeatureVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for FeatureVariant {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "time_only" | "time" => Ok(FeatureVariant::TimeOnly),
            "with_precipitation" | "time_and_precipitation" | "precipitation" => {
                Ok(FeatureVariant::TimeAndPrecipitation)
            }
            _ => anyhow::bail!(
                "Invalid feature variant: {}. Must be 'time-only' or 'with-precipitation'",
                s
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn sample_row() -> FeatureRow {
        let timestamp = NaiveDate::from_ymd_opt(2024, 3, 9)
            .and_then(|d| d.and_hms_opt(10, 15, 0))
            .expect("valid timestamp");
        FeatureRow {
            timestamp,
            lots_available: 42.0,
            precipitation: 1.5,
            hour_sin: 0.1,
            hour_cos: 0.2,
            minute_sin: 0.3,
            minute_cos: 0.4,
            day_sin: 0.5,
            day_cos: 0.6,
            day_of_month_sin: 0.7,
            day_of_month_cos: 0.8,
            month_sin: 0.9,
            month_cos: 1.0,
            is_weekend: 1.0,
            time_index: 735.0,
        }
    }

    #[test]
    fn test_feature_vector_length() {
        let row = sample_row();
        for variant in FeatureVariant::ALL {
            assert_eq!(variant.to_vector(&row).len(), variant.feature_count());
        }
        assert_eq!(FeatureVariant::TimeOnly.feature_count(), 13);
        assert_eq!(FeatureVariant::TimeAndPrecipitation.feature_count(), 14);
    }

    #[test]
    fn test_feature_consistency() {
        let row = sample_row();

        let time_only = FeatureVariant::TimeOnly.to_vector(&row);
        assert_eq!(time_only[0], 42.0);
        assert_eq!(time_only[1], 0.1);
        assert_eq!(time_only[12], 735.0);

        let with_precip = FeatureVariant::TimeAndPrecipitation.to_vector(&row);
        assert_eq!(with_precip[0], 42.0);
        assert_eq!(with_precip[1], 1.5);
        assert_eq!(&with_precip[2..], &time_only[1..]);
    }

    #[test]
    fn test_names_match_layout() {
        for variant in FeatureVariant::ALL {
            assert_eq!(variant.feature_names()[TARGET_COLUMN], "lots_available");
        }
        assert_eq!(WITH_PRECIPITATION_FEATURES[1], "precipitation");
    }

    #[test]
    fn test_parse_variant() {
        assert_eq!(
            "time-only".parse::<FeatureVariant>().unwrap(),
            FeatureVariant::TimeOnly
        );
        assert_eq!(
            "with_precipitation".parse::<FeatureVariant>().unwrap(),
            FeatureVariant::TimeAndPrecipitation
        );
        assert!("rainfall".parse::<FeatureVariant>().is_err());
    }
}
