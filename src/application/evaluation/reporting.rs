//! Aggregation of per-facility evaluations into the comparison report.

use super::comparison::{PairedTTest, mean_defined, paired_t_test};
use super::evaluator::FacilityEvaluation;
use super::metrics::ForecastMetrics;
use crate::application::pipeline::batch::SkippedFacility;
use crate::domain::errors::PipelineError;
use crate::domain::ml::artifact::ModelKind;
use serde::{Deserialize, Serialize};
use std::io::Write;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VariantSummary {
    pub mean_smape: Option<f64>,
    pub mean_perc_rmse: Option<f64>,
    pub mean_mape: Option<f64>,
}

impl VariantSummary {
    fn from_metrics<'a>(metrics: impl Iterator<Item = &'a ForecastMetrics> + Clone) -> Self {
        Self {
            mean_smape: mean_defined(metrics.clone().map(|m| Some(m.smape_overall))),
            mean_perc_rmse: mean_defined(metrics.clone().map(|m| m.perc_rmse_overall)),
            mean_mape: mean_defined(metrics.map(|m| m.mape_overall)),
        }
    }
}

/// Cross-facility means for one forecast step (1-based), one row of the steps CSV.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StepSummary {
    pub step: usize,
    pub smape_time_only: Option<f64>,
    pub smape_with_precipitation: Option<f64>,
    pub smape_improvement: Option<f64>,
    pub perc_rmse_time_only: Option<f64>,
    pub perc_rmse_with_precipitation: Option<f64>,
    pub perc_rmse_improvement: Option<f64>,
    pub mape_time_only: Option<f64>,
    pub mape_with_precipitation: Option<f64>,
    pub mape_improvement: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SignificanceTests {
    pub smape: PairedTTest,
    pub perc_rmse: PairedTTest,
    pub mape: PairedTTest,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateSummary {
    pub facility_count: usize,
    pub time_only: VariantSummary,
    pub with_precipitation: VariantSummary,
    /// Mean of per-facility `time_only - with_precipitation` differences.
    pub mean_improvement: VariantSummary,
    pub per_step: Vec<StepSummary>,
    pub significance: SignificanceTests,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationReport {
    pub model_kind: ModelKind,
    pub facilities: Vec<FacilityEvaluation>,
    pub skipped: Vec<SkippedFacility>,
    /// `None` when no facility could be evaluated.
    pub summary: Option<AggregateSummary>,
}

impl EvaluationReport {
    pub fn build(
        model_kind: ModelKind,
        facilities: Vec<FacilityEvaluation>,
        skipped: Vec<SkippedFacility>,
    ) -> Self {
        let summary = (!facilities.is_empty()).then(|| summarize(&facilities));
        Self {
            model_kind,
            facilities,
            skipped,
            summary,
        }
    }

    pub fn to_json(&self) -> Result<String, PipelineError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Writes the per-step means as CSV with a header row.
    pub fn write_steps_csv<W: Write>(&self, writer: W) -> Result<(), PipelineError> {
        let mut wtr = csv::WriterBuilder::new().has_headers(true).from_writer(writer);
        if let Some(summary) = &self.summary {
            for step in &summary.per_step {
                wtr.serialize(step)?;
            }
        }
        wtr.flush()?;
        Ok(())
    }

    /// Console tables for the interactive `evaluate` command.
    pub fn print(&self) {
        println!("{}", "=".repeat(100));
        println!("PRECIPITATION ABLATION REPORT ({} model)", self.model_kind);
        println!("{}", "=".repeat(100));
        println!(
            "{:<16} | {:>10} | {:>10} | {:>10} | {:>10} | {:>10} | {:>10}",
            "Facility", "SMAPE T", "SMAPE T+P", "%RMSE T", "%RMSE T+P", "MAPE T", "MAPE T+P"
        );
        println!("{}", "-".repeat(100));
        for f in &self.facilities {
            let t = &f.time_only.metrics;
            let p = &f.with_precipitation.metrics;
            println!(
                "{:<16} | {:>10} | {:>10} | {:>10} | {:>10} | {:>10} | {:>10}",
                f.facility_id,
                fmt_value(Some(t.smape_overall)),
                fmt_value(Some(p.smape_overall)),
                fmt_value(t.perc_rmse_overall),
                fmt_value(p.perc_rmse_overall),
                fmt_value(t.mape_overall),
                fmt_value(p.mape_overall),
            );
        }

        if let Some(summary) = &self.summary {
            println!("{}", "-".repeat(100));
            for (label, s) in [
                ("Mean time-only", &summary.time_only),
                ("Mean with-precip", &summary.with_precipitation),
                ("Mean improvement", &summary.mean_improvement),
            ] {
                println!(
                    "{:<18} SMAPE {:>9}  %RMSE {:>9}  MAPE {:>9}",
                    label,
                    fmt_value(s.mean_smape),
                    fmt_value(s.mean_perc_rmse),
                    fmt_value(s.mean_mape),
                );
            }

            println!("\nPer-step SMAPE (time-only / with-precipitation / improvement)");
            for step in &summary.per_step {
                println!(
                    "  t+{:<3} {:>9} {:>9} {:>9}",
                    step.step,
                    fmt_value(step.smape_time_only),
                    fmt_value(step.smape_with_precipitation),
                    fmt_value(step.smape_improvement),
                );
            }

            println!("\nPaired t-tests over {} facilities", summary.facility_count);
            for (label, test) in [
                ("SMAPE", &summary.significance.smape),
                ("%RMSE", &summary.significance.perc_rmse),
                ("MAPE", &summary.significance.mape),
            ] {
                println!(
                    "  {:<6} pairs {:>4}  t {:>9}  p {:>9}",
                    label,
                    test.pairs,
                    fmt_value(test.t_statistic),
                    fmt_value(test.p_value),
                );
            }
        } else {
            println!("No facility could be evaluated.");
        }

        if !self.skipped.is_empty() {
            println!("\nSkipped {} facilities:", self.skipped.len());
            for s in &self.skipped {
                println!("  {:<16} {:<20} {}", s.facility_id, s.kind, s.detail);
            }
        }
        println!("{}", "=".repeat(100));
    }
}

fn fmt_value(value: Option<f64>) -> String {
    match value {
        Some(v) => format!("{:.3}", v),
        None => "n/a".to_string(),
    }
}

fn mean_over<F>(facilities: &[FacilityEvaluation], pick: F) -> Option<f64>
where
    F: Fn(&FacilityEvaluation) -> Option<f64>,
{
    mean_defined(facilities.iter().map(pick))
}

/// Paired test of time-only against with-precipitation values across facilities.
fn paired_over<F>(facilities: &[FacilityEvaluation], pick: F) -> PairedTTest
where
    F: Fn(&ForecastMetrics) -> Option<f64>,
{
    let time_only: Vec<Option<f64>> = facilities.iter().map(|f| pick(&f.time_only.metrics)).collect();
    let with_precipitation: Vec<Option<f64>> = facilities
        .iter()
        .map(|f| pick(&f.with_precipitation.metrics))
        .collect();
    paired_t_test(&time_only, &with_precipitation)
}

fn summarize(facilities: &[FacilityEvaluation]) -> AggregateSummary {
    let time_only = VariantSummary::from_metrics(facilities.iter().map(|f| &f.time_only.metrics));
    let with_precipitation =
        VariantSummary::from_metrics(facilities.iter().map(|f| &f.with_precipitation.metrics));
    let mean_improvement = VariantSummary {
        mean_smape: mean_over(facilities, |f| f.comparison.overall.smape.absolute),
        mean_perc_rmse: mean_over(facilities, |f| f.comparison.overall.perc_rmse.absolute),
        mean_mape: mean_over(facilities, |f| f.comparison.overall.mape.absolute),
    };

    let horizon = facilities
        .iter()
        .map(|f| {
            f.time_only
                .metrics
                .horizon()
                .min(f.with_precipitation.metrics.horizon())
        })
        .min()
        .unwrap_or(0);
    let per_step = (0..horizon)
        .map(|i| StepSummary {
            step: i + 1,
            smape_time_only: mean_over(facilities, |f| Some(f.time_only.metrics.smape_per_step[i])),
            smape_with_precipitation: mean_over(facilities, |f| {
                Some(f.with_precipitation.metrics.smape_per_step[i])
            }),
            smape_improvement: mean_over(facilities, |f| f.comparison.per_step[i].smape.absolute),
            perc_rmse_time_only: mean_over(facilities, |f| {
                f.time_only.metrics.perc_rmse_per_step[i]
            }),
            perc_rmse_with_precipitation: mean_over(facilities, |f| {
                f.with_precipitation.metrics.perc_rmse_per_step[i]
            }),
            perc_rmse_improvement: mean_over(facilities, |f| {
                f.comparison.per_step[i].perc_rmse.absolute
            }),
            mape_time_only: mean_over(facilities, |f| f.time_only.metrics.mape_per_step[i]),
            mape_with_precipitation: mean_over(facilities, |f| {
                f.with_precipitation.metrics.mape_per_step[i]
            }),
            mape_improvement: mean_over(facilities, |f| f.comparison.per_step[i].mape.absolute),
        })
        .collect();

    let significance = SignificanceTests {
        smape: paired_over(facilities, |m| Some(m.smape_overall)),
        perc_rmse: paired_over(facilities, |m| m.perc_rmse_overall),
        mape: paired_over(facilities, |m| m.mape_overall),
    };

    AggregateSummary {
        facility_count: facilities.len(),
        time_only,
        with_precipitation,
        mean_improvement,
        per_step,
        significance,
    }
}
