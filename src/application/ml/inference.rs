//! Forecasting from a recent-window response.
//!
//! The query service answers with `{"instances": [[[v], [v], ...]]}`: one
//! instance holding 15-minute `lots_available` values, oldest first. An
//! optional second element per step carries precipitation.

use super::predictor::{LstmPredictor, Predictor};
use crate::application::preprocessing::feature_builder::encode_row;
use crate::domain::errors::PipelineError;
use crate::domain::forecasting::types::resample_interval;
use crate::domain::ml::feature_registry::FeatureVariant;
use chrono::{DurationRound, NaiveDateTime};
use ndarray::Array3;
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
struct QueryResponse {
    instances: Vec<Vec<Vec<f64>>>,
}

/// Recent history for one facility, ending at `end_time`.
#[derive(Debug, Clone, PartialEq)]
pub struct RecentWindow {
    pub facility_id: String,
    pub end_time: NaiveDateTime,
    pub values: Vec<f64>,
    pub precipitation: Option<Vec<f64>>,
}

impl RecentWindow {
    pub fn from_query_response(
        facility_id: &str,
        end_time: NaiveDateTime,
        body: &str,
    ) -> Result<Self, PipelineError> {
        let response: QueryResponse = serde_json::from_str(body)?;
        let instance = response.instances.into_iter().next().ok_or_else(|| {
            PipelineError::InvalidInput("query response holds no instances".to_string())
        })?;

        let mut values = Vec::with_capacity(instance.len());
        let mut precipitation = Vec::with_capacity(instance.len());
        for step in &instance {
            match step.as_slice() {
                [lots] => values.push(*lots),
                [lots, precip, ..] => {
                    values.push(*lots);
                    precipitation.push(*precip);
                }
                [] => {
                    return Err(PipelineError::InvalidInput(
                        "empty step in query response".to_string(),
                    ));
                }
            }
        }

        let precipitation = if !precipitation.is_empty() && precipitation.len() == values.len() {
            Some(precipitation)
        } else {
            None
        };

        Ok(Self {
            facility_id: facility_id.to_string(),
            end_time,
            values,
            precipitation,
        })
    }

    /// Front-pads with the earliest value or keeps the most recent `window_size` values.
    pub fn fit_to(values: &[f64], window_size: usize) -> Result<Vec<f64>, PipelineError> {
        let Some(&earliest) = values.first() else {
            return Err(PipelineError::InvalidInput(
                "recent window is empty".to_string(),
            ));
        };
        if values.len() >= window_size {
            return Ok(values[values.len() - window_size..].to_vec());
        }
        let mut padded = vec![earliest; window_size - values.len()];
        padded.extend_from_slice(values);
        Ok(padded)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ForecastStep {
    pub timestamp: NaiveDateTime,
    pub lots_available: f64,
}

/// Forecast in lot units, nearest step first.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Forecast {
    pub facility_id: String,
    pub variant: FeatureVariant,
    pub model_version: String,
    pub steps: Vec<ForecastStep>,
}

impl Forecast {
    pub fn values(&self) -> Vec<f64> {
        self.steps.iter().map(|s| s.lots_available).collect()
    }

    /// `{"predictions": [[...]]}`, the shape returned by the hosted endpoint.
    pub fn to_predictions_json(&self) -> serde_json::Value {
        serde_json::json!({ "predictions": [self.values()] })
    }
}

pub struct Forecaster {
    predictor: LstmPredictor,
}

impl Forecaster {
    pub fn new(predictor: LstmPredictor) -> Self {
        Self { predictor }
    }

    pub fn forecast(&self, window: &RecentWindow) -> Result<Forecast, PipelineError> {
        let model = &self.predictor.trained().model;
        let variant = model.variant;
        let window_size = model.window_size();
        let interval = resample_interval();

        let values = RecentWindow::fit_to(&window.values, window_size)?;
        let precipitation = match (&window.precipitation, variant.uses_precipitation()) {
            (Some(p), true) => RecentWindow::fit_to(p, window_size)?,
            (None, true) => {
                return Err(PipelineError::InvalidInput(format!(
                    "{} model needs precipitation in the recent window",
                    variant
                )));
            }
            (_, false) => vec![0.0; window_size],
        };

        let end = window
            .end_time
            .duration_trunc(interval)
            .map_err(|e| PipelineError::InvalidInput(e.to_string()))?;

        let features = variant.feature_count();
        let mut input = Array3::zeros((1, window_size, features));
        let mut buffer = vec![0.0; features];
        for (k, (lots, precip)) in values.iter().zip(&precipitation).enumerate() {
            let timestamp = end - interval * (window_size - 1 - k) as i32;
            let row = encode_row(timestamp, model.series_origin, *lots, *precip);
            variant.write_vector(&row, &mut buffer);
            for (f, value) in buffer.iter().enumerate() {
                input[[0, k, f]] = *value;
            }
        }

        let preds = self.predictor.predict(&input)?;
        let steps = preds
            .row(0)
            .iter()
            .enumerate()
            .map(|(h, &lots_available)| ForecastStep {
                timestamp: end + interval * (h as i32 + 1),
                lots_available,
            })
            .collect();

        Ok(Forecast {
            facility_id: window.facility_id.clone(),
            variant,
            model_version: self.predictor.version().to_string(),
            steps,
        })
    }
}
