//! lotcast command line.
//!
//! Trains per-facility LSTM forecasters for both feature variants, evaluates
//! them against each other, audits missing artifacts and serves one-off
//! forecasts from a recent-window response.

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use lotcast::application::evaluation::{EvaluationReport, Evaluator};
use lotcast::application::ml::{Forecaster, LstmPredictor, Predictor, RecentWindow};
use lotcast::application::pipeline::{
    BatchRunner, FacilitySelection, TrainingPipeline, find_missing_models,
};
use lotcast::config::Config;
use lotcast::domain::errors::ErrorKind;
use lotcast::domain::ml::{FeatureVariant, ModelKind};
use lotcast::domain::ports::ReadingSource;
use lotcast::domain::repositories::{ArtifactKey, ArtifactRepository};
use lotcast::infrastructure::csv_source::parse_timestamp;
use lotcast::infrastructure::persistence::write_atomic;
use lotcast::infrastructure::{CsvReadingSource, ErrorLog, FileArtifactRepository};
use std::io::Read;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Parser)]
#[command(author, version, about = "Parking availability forecaster", long_about = None)]
struct Cli {
    /// Directory of per-facility CSV files
    #[arg(long, global = true)]
    parking_dir: Option<PathBuf>,

    /// Shared precipitation CSV
    #[arg(long, global = true)]
    precipitation_file: Option<PathBuf>,

    /// Root directory of trained artifacts
    #[arg(long, global = true)]
    models_dir: Option<PathBuf>,

    /// Error log appended to for every skipped or failed facility
    #[arg(long, global = true)]
    error_log: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Train models for a set of facilities
    Train {
        /// Facility id (repeatable); all facilities when omitted
        #[arg(short, long = "facility")]
        facilities: Vec<String>,

        /// Train a seeded random sample of N facilities
        #[arg(long, conflicts_with = "facilities")]
        sample: Option<usize>,

        /// Seed for --sample
        #[arg(long, default_value = "42")]
        seed: u64,

        /// time-only, with-precipitation or both
        #[arg(long, default_value = "both")]
        variant: String,

        /// TOML file with a [training] section
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Compare both variants on their saved test splits
    Evaluate {
        /// Facility id (repeatable); all facilities with a time-only model when omitted
        #[arg(short, long = "facility")]
        facilities: Vec<String>,

        /// best or final
        #[arg(long, default_value = "best")]
        model: String,

        /// Write the full report as JSON
        #[arg(long)]
        report_json: Option<PathBuf>,

        /// Write per-step averages as CSV
        #[arg(long)]
        steps_csv: Option<PathBuf>,
    },
    /// List facilities without a complete artifact set
    Missing,
    /// Forecast from a recent-window JSON response (file or stdin)
    Forecast {
        #[arg(short, long)]
        facility: String,

        /// Timestamp of the last value in the window
        #[arg(long)]
        end_time: String,

        #[arg(long, default_value = "time-only")]
        variant: String,

        /// best or final
        #[arg(long, default_value = "final")]
        model: String,

        /// Response JSON file; stdin when omitted
        #[arg(short, long)]
        input: Option<PathBuf>,
    },
}

fn parse_variants(raw: &str) -> Result<Vec<FeatureVariant>> {
    if raw.eq_ignore_ascii_case("both") {
        return Ok(FeatureVariant::ALL.to_vec());
    }
    Ok(vec![FeatureVariant::from_str(raw)?])
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let mut config = Config::from_env()?;
    if let Some(dir) = cli.parking_dir {
        config.paths.parking_dir = dir;
    }
    if let Some(file) = cli.precipitation_file {
        config.paths.precipitation_file = file;
    }
    if let Some(dir) = cli.models_dir {
        config.paths.models_dir = dir;
    }
    if let Some(file) = cli.error_log {
        config.paths.error_log = file;
    }

    let source = Arc::new(CsvReadingSource::new(
        config.paths.parking_dir.clone(),
        config.paths.precipitation_file.clone(),
    ));
    let repository = Arc::new(FileArtifactRepository::new(config.paths.models_dir.clone()));

    match cli.command {
        Commands::Train {
            facilities,
            sample,
            seed,
            variant,
            config: config_file,
        } => {
            if let Some(path) = config_file {
                config.apply_file(&path)?;
            }
            config.validate()?;
            let variants = parse_variants(&variant)?;

            let selection = match sample {
                Some(count) => FacilitySelection::Sample { count, seed },
                None if facilities.is_empty() => FacilitySelection::All,
                None => FacilitySelection::List(facilities),
            };
            let available = source
                .facility_ids()
                .context("Failed to list facility files")?;
            let ids = selection.resolve(&available);
            info!(
                "Training {} of {} facilities, variants {:?}",
                ids.len(),
                available.len(),
                variants
            );

            let pipeline = TrainingPipeline::new(source, repository, config.training.clone())
                .context("Failed to initialise training pipeline")?;
            if !pipeline.has_precipitation() && variants.iter().any(|v| v.uses_precipitation()) {
                warn!("No precipitation data: with-precipitation runs will be skipped");
            }

            let runner = BatchRunner::new(ErrorLog::new(config.paths.error_log.clone()));
            let report = runner.run("train", &ids, |id| pipeline.train_facility(id, &variants));

            for (_, summary) in report.completed() {
                for v in &summary.variants {
                    println!(
                        "{:<16} {:<20} train {:>5} val {:>5} test {:>5}  best epoch {:>3}  val_loss {:.6}  {:.1}s",
                        summary.facility_id,
                        v.variant,
                        v.train_sequences,
                        v.validation_sequences,
                        v.test_sequences,
                        v.best_epoch,
                        v.best_val_loss,
                        v.training_seconds
                    );
                }
            }
            println!(
                "Trained {}/{} facilities; see {} for skipped ones",
                report.completed_count(),
                ids.len(),
                config.paths.error_log.display()
            );
        }
        Commands::Evaluate {
            facilities,
            model,
            report_json,
            steps_csv,
        } => {
            let kind = ModelKind::from_str(&model)?;
            let ids = if facilities.is_empty() {
                repository
                    .facilities_with_model(FeatureVariant::TimeOnly, kind)
                    .context("Failed to list trained facilities")?
            } else {
                facilities
            };
            if ids.is_empty() {
                bail!(
                    "No trained {} models under {}",
                    kind,
                    config.paths.models_dir.display()
                );
            }

            let evaluator = Evaluator::new(
                source,
                repository,
                config.training.max_carry_forward_steps,
                kind,
            )
            .context("Failed to initialise evaluator")?;
            let runner = BatchRunner::new(ErrorLog::new(config.paths.error_log.clone()));
            let batch = runner.run("evaluate", &ids, |id| evaluator.evaluate(id));

            let (evaluations, skipped) = batch.into_parts();
            for evaluation in &evaluations {
                for variant in [&evaluation.time_only, &evaluation.with_precipitation] {
                    let steps = variant.metrics.undefined_steps();
                    if !steps.is_empty() {
                        runner.note(
                            "evaluate",
                            &evaluation.facility_id,
                            ErrorKind::DegenerateMetric,
                            &format!("{} metrics undefined at steps {:?}", variant.variant, steps),
                        );
                    }
                }
            }
            let report = EvaluationReport::build(kind, evaluations, skipped);
            report.print();

            if let Some(path) = report_json {
                write_atomic(&path, report.to_json()?.as_bytes())
                    .with_context(|| format!("Failed to write report {:?}", path))?;
                info!("Saved evaluation report to {:?}", path);
            }
            if let Some(path) = steps_csv {
                let mut buffer = Vec::new();
                report.write_steps_csv(&mut buffer)?;
                write_atomic(&path, &buffer)
                    .with_context(|| format!("Failed to write per-step CSV {:?}", path))?;
                info!("Saved per-step averages to {:?}", path);
            }
        }
        Commands::Missing => {
            for variant in FeatureVariant::ALL {
                let missing = find_missing_models(source.as_ref(), repository.as_ref(), variant)?;
                println!("{} ({} missing):", variant, missing.len());
                for id in missing {
                    println!("  {}", id);
                }
            }
        }
        Commands::Forecast {
            facility,
            end_time,
            variant,
            model,
            input,
        } => {
            let variant = FeatureVariant::from_str(&variant)?;
            let kind = ModelKind::from_str(&model)?;
            let end_time = parse_timestamp(&end_time)
                .with_context(|| format!("Unrecognised --end-time {:?}", end_time))?;

            let body = match input {
                Some(path) => std::fs::read_to_string(&path)
                    .with_context(|| format!("Failed to read {:?}", path))?,
                None => {
                    let mut body = String::new();
                    std::io::stdin()
                        .read_to_string(&mut body)
                        .context("Failed to read stdin")?;
                    body
                }
            };

            let window = RecentWindow::from_query_response(&facility, end_time, &body)?;
            let trained = repository.load_trained(&ArtifactKey::new(facility.as_str(), variant), kind)?;
            let predictor = LstmPredictor::new(trained);
            info!("Forecasting with {} (run {})", predictor.name(), predictor.version());

            let forecast = Forecaster::new(predictor).forecast(&window)?;
            for step in &forecast.steps {
                info!("{} -> {:.1} lots", step.timestamp, step.lots_available);
            }
            println!("{}", forecast.to_predictions_json());
        }
    }

    Ok(())
}
