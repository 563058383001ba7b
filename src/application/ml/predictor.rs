use crate::domain::errors::PipelineError;
use crate::domain::repositories::TrainedModel;
use ndarray::{Array2, Array3};

/// Interface for trained forecasters.
pub trait Predictor: Send + Sync {
    /// Forecasts `[N, H]` lot counts from unscaled windows `[N, W, F]`.
    fn predict(&self, windows: &Array3<f64>) -> Result<Array2<f64>, PipelineError>;

    /// Facility, variant and checkpoint the weights belong to.
    fn name(&self) -> &str;

    /// Training run id shared by the weights and their scalers.
    fn version(&self) -> &str;
}

/// LSTM network wrapped with the scalers from its training run.
pub struct LstmPredictor {
    trained: TrainedModel,
    name: String,
    version: String,
}

impl LstmPredictor {
    pub fn new(trained: TrainedModel) -> Self {
        let name = format!(
            "LSTM {}/{} ({})",
            trained.model.facility_id, trained.model.variant, trained.model.kind
        );
        let version = trained.model.run_id.to_string();
        Self {
            trained,
            name,
            version,
        }
    }

    pub fn trained(&self) -> &TrainedModel {
        &self.trained
    }
}

impl Predictor for LstmPredictor {
    fn predict(&self, windows: &Array3<f64>) -> Result<Array2<f64>, PipelineError> {
        let scaled = self.trained.scalers.feature.transform_windows(windows)?;
        let preds = self.trained.model.network.predict(scaled.view())?;
        self.trained.scalers.invert_predictions(preds.view())
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn version(&self) -> &str {
        &self.version
    }
}
