pub mod feature_builder;
pub mod resampler;
pub mod sequencer;
pub mod splitter;

pub use feature_builder::FeatureBuilder;
pub use resampler::Resampler;
pub use sequencer::Sequencer;
pub use splitter::Splitter;
