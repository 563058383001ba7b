pub mod inference;
pub mod optimizer;
pub mod predictor;
pub mod trainer;

pub use inference::{Forecast, Forecaster, RecentWindow};
pub use predictor::{LstmPredictor, Predictor};
pub use trainer::{ModelTrainer, TrainedPair, TrainingRun};
