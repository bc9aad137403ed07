//! ML-assisted algorithm selection: waste prediction, champion/challenger
//! experiments with deterministic bucketing, shadow comparison, and
//! calibration.

pub mod calibration;
pub mod experiment;
pub mod predictor;
pub mod shadow;

pub use experiment::{CachedExperimentLookup, ExperimentCacheConfig, ExperimentResolver};
pub use predictor::{NullPredictor, Predictor, StaticPredictor};
pub use shadow::ShadowComparator;
