pub mod artifact;
pub mod dense;
pub mod feature_registry;
pub mod loss;
pub mod lstm;
pub mod network;
pub mod scaler;

pub use artifact::{EpochStats, ModelArtifact, ModelKind};
pub use feature_registry::FeatureVariant;
pub use network::{ForecastNetwork, NetworkArchitecture};
pub use scaler::{MinMaxScaler, ScalerPair};
