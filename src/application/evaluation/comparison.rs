//! Time-only vs. with-precipitation comparison.
//!
//! Improvement is `time_only - with_precipitation`, so a positive value means
//! precipitation lowered the error.

use super::metrics::ForecastMetrics;
use serde::{Deserialize, Serialize};
use statrs::distribution::{ContinuousCDF, StudentsT};
use statrs::statistics::{Data, Distribution};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Improvement {
    pub absolute: Option<f64>,
    /// Relative to the time-only baseline, in percent.
    pub percentage: Option<f64>,
}

impl Improvement {
    pub fn between(baseline: Option<f64>, candidate: Option<f64>) -> Self {
        let absolute = match (baseline, candidate) {
            (Some(b), Some(c)) => Some(b - c),
            _ => None,
        };
        let percentage = match (absolute, baseline) {
            (Some(diff), Some(b)) => Some(diff / b * 100.0).filter(|v| v.is_finite()),
            _ => None,
        };
        Self {
            absolute,
            percentage,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricImprovements {
    pub smape: Improvement,
    pub perc_rmse: Improvement,
    pub mape: Improvement,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FacilityComparison {
    pub overall: MetricImprovements,
    pub per_step: Vec<MetricImprovements>,
}

impl FacilityComparison {
    pub fn compare(time_only: &ForecastMetrics, with_precipitation: &ForecastMetrics) -> Self {
        let overall = MetricImprovements {
            smape: Improvement::between(
                Some(time_only.smape_overall),
                Some(with_precipitation.smape_overall),
            ),
            perc_rmse: Improvement::between(
                time_only.perc_rmse_overall,
                with_precipitation.perc_rmse_overall,
            ),
            mape: Improvement::between(time_only.mape_overall, with_precipitation.mape_overall),
        };

        let steps = time_only.horizon().min(with_precipitation.horizon());
        let per_step = (0..steps)
            .map(|i| MetricImprovements {
                smape: Improvement::between(
                    Some(time_only.smape_per_step[i]),
                    Some(with_precipitation.smape_per_step[i]),
                ),
                perc_rmse: Improvement::between(
                    time_only.perc_rmse_per_step[i],
                    with_precipitation.perc_rmse_per_step[i],
                ),
                mape: Improvement::between(
                    time_only.mape_per_step[i],
                    with_precipitation.mape_per_step[i],
                ),
            })
            .collect();

        Self { overall, per_step }
    }
}

/// Two-sided paired t-test result. `None` statistics mean the test carries no
/// signal (fewer than two pairs, or zero variance of the differences).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PairedTTest {
    pub pairs: usize,
    pub t_statistic: Option<f64>,
    pub p_value: Option<f64>,
}

/// Paired t-test on `a - b`; pairs where either side is undefined are dropped.
pub fn paired_t_test(a: &[Option<f64>], b: &[Option<f64>]) -> PairedTTest {
    let differences: Vec<f64> = a
        .iter()
        .zip(b)
        .filter_map(|(x, y)| match (x, y) {
            (Some(x), Some(y)) if x.is_finite() && y.is_finite() => Some(x - y),
            _ => None,
        })
        .collect();
    let pairs = differences.len();

    let no_signal = PairedTTest {
        pairs,
        t_statistic: None,
        p_value: None,
    };
    if pairs < 2 {
        return no_signal;
    }

    let data = Data::new(differences);
    let (Some(mean), Some(std_dev)) = (data.mean(), data.std_dev()) else {
        return no_signal;
    };

    let t = mean / (std_dev / (pairs as f64).sqrt());
    if !t.is_finite() {
        return no_signal;
    }

    let p_value = StudentsT::new(0.0, 1.0, (pairs - 1) as f64)
        .ok()
        .map(|dist| 2.0 * (1.0 - dist.cdf(t.abs())))
        .filter(|p| p.is_finite());

    PairedTTest {
        pairs,
        t_statistic: Some(t),
        p_value,
    }
}

/// Mean of the defined values, or `None` when there are none.
pub fn mean_defined<I>(values: I) -> Option<f64>
where
    I: IntoIterator<Item = Option<f64>>,
{
    let defined: Vec<f64> = values
        .into_iter()
        .flatten()
        .filter(|v| v.is_finite())
        .collect();
    if defined.is_empty() {
        None
    } else {
        Data::new(defined).mean()
    }
}
