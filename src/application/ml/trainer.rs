//! Mini-batch training loop with best-checkpoint selection.

use super::optimizer::Adam;
use crate::domain::config::TrainingConfig;
use crate::domain::errors::PipelineError;
use crate::domain::forecasting::SequenceSet;
use crate::domain::ml::artifact::{EpochStats, ModelArtifact, ModelKind};
use crate::domain::ml::feature_registry::FeatureVariant;
use crate::domain::ml::loss::{huber_gradient, huber_loss, squared_error_sum};
use crate::domain::ml::network::ForecastNetwork;
use chrono::{NaiveDateTime, Utc};
use ndarray::Axis;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use std::time::Instant;
use tracing::{debug, info};
use uuid::Uuid;

/// Identifies what a training run is for; copied into both artifacts.
#[derive(Debug, Clone)]
pub struct TrainingRun {
    pub facility_id: String,
    pub variant: FeatureVariant,
    pub run_id: Uuid,
    pub series_origin: NaiveDateTime,
}

/// Best-checkpoint and final-epoch models of one run.
#[derive(Debug, Clone)]
pub struct TrainedPair {
    pub best: ModelArtifact,
    pub final_model: ModelArtifact,
}

pub struct ModelTrainer {
    config: TrainingConfig,
}

impl ModelTrainer {
    pub fn new(config: TrainingConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    /// Loss (Huber plus kernel L2) and RMSE of `network` on `set`, in scaled units.
    pub fn evaluate_loss(
        &self,
        network: &ForecastNetwork,
        set: &SequenceSet,
    ) -> Result<(f64, f64), PipelineError> {
        let preds = network.predict(set.windows.view())?;
        let loss = huber_loss(preds.view(), set.targets.view(), self.config.huber_delta)
            + network.kernel_l2_penalty(self.config.l2_weight);
        let rmse = (squared_error_sum(preds.view(), set.targets.view())
            / set.targets.len().max(1) as f64)
            .sqrt();
        Ok((loss, rmse))
    }

    /// Trains on already-scaled `train`, selecting the checkpoint with the
    /// lowest validation loss.
    pub fn train(
        &self,
        run: &TrainingRun,
        train: &SequenceSet,
        validation: &SequenceSet,
    ) -> Result<TrainedPair, PipelineError> {
        if train.is_empty() || validation.is_empty() {
            return Err(PipelineError::TooFewSequences {
                facility_id: run.facility_id.clone(),
                sequences: train.len() + validation.len(),
                required: 2,
            });
        }

        let cfg = &self.config;
        let mut rng = StdRng::seed_from_u64(cfg.seed);
        let mut network = ForecastNetwork::new(cfg.architecture(run.variant), &mut rng);
        let mut optimizer = Adam::new(cfg.learning_rate);

        info!(
            "{} [{}]: training {} params on {} sequences ({} validation), {} epochs",
            run.facility_id,
            run.variant,
            network.parameter_count(),
            train.len(),
            validation.len(),
            cfg.epochs
        );

        let started = Instant::now();
        let mut order: Vec<usize> = (0..train.len()).collect();
        let mut history = Vec::with_capacity(cfg.epochs);
        let mut best: Option<(ForecastNetwork, usize, f64)> = None;

        for epoch in 1..=cfg.epochs {
            order.shuffle(&mut rng);

            let mut loss_sum = 0.0;
            let mut squared_sum = 0.0;
            for batch in order.chunks(cfg.batch_size) {
                let windows = train.windows.select(Axis(0), batch);
                let targets = train.targets.select(Axis(0), batch);

                let (preds, cache) = network.forward_train(windows.view())?;
                let batch_loss = huber_loss(preds.view(), targets.view(), cfg.huber_delta)
                    + network.kernel_l2_penalty(cfg.l2_weight);
                if !batch_loss.is_finite() {
                    return Err(PipelineError::InvalidInput(format!(
                        "{} [{}]: training loss diverged at epoch {}",
                        run.facility_id, run.variant, epoch
                    )));
                }
                loss_sum += batch_loss * batch.len() as f64;
                squared_sum += squared_error_sum(preds.view(), targets.view());

                let d_out = huber_gradient(preds.view(), targets.view(), cfg.huber_delta);
                let mut grads = network.backward(&cache, &d_out);
                grads.add_kernel_l2(&network, cfg.l2_weight);
                optimizer.step(&mut network.parameters_mut(), &grads.views());
            }

            let (val_loss, val_rmse) = self.evaluate_loss(&network, validation)?;
            let stats = EpochStats {
                epoch,
                train_loss: loss_sum / train.len() as f64,
                train_rmse: (squared_sum / train.targets.len() as f64).sqrt(),
                val_loss,
                val_rmse,
            };

            let improved = best.as_ref().is_none_or(|(_, _, b)| val_loss < *b);
            if improved {
                debug!(
                    "{} [{}]: val_loss improved to {:.6}, checkpointing epoch {}",
                    run.facility_id, run.variant, val_loss, epoch
                );
                best = Some((network.clone(), epoch, val_loss));
            }

            info!(
                "{} [{}] epoch {}/{} - loss: {:.5} - rmse: {:.5} - val_loss: {:.5} - val_rmse: {:.5}{}",
                run.facility_id,
                run.variant,
                epoch,
                cfg.epochs,
                stats.train_loss,
                stats.train_rmse,
                stats.val_loss,
                stats.val_rmse,
                if improved { " *" } else { "" }
            );
            history.push(stats);
        }

        let training_seconds = started.elapsed().as_secs_f64();
        let (best_network, best_epoch, best_val_loss) = best.ok_or_else(|| {
            PipelineError::InvalidInput("training finished without any epoch".to_string())
        })?;

        info!(
            "{} [{}]: trained in {:.1}s, best epoch {} (val_loss {:.6})",
            run.facility_id, run.variant, training_seconds, best_epoch, best_val_loss
        );

        let artifact = |kind: ModelKind, network: ForecastNetwork| ModelArtifact {
            facility_id: run.facility_id.clone(),
            variant: run.variant,
            kind,
            run_id: run.run_id,
            series_origin: run.series_origin,
            best_epoch,
            best_val_loss,
            history: history.clone(),
            training_seconds,
            created_at: Utc::now(),
            network,
        };

        Ok(TrainedPair {
            best: artifact(ModelKind::BestCheckpoint, best_network),
            final_model: artifact(ModelKind::Final, network),
        })
    }
}
