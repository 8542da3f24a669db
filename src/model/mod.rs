//! Unsupervised outlier model: isolation forest training and artifact persistence.

mod artifact;
mod forest;

pub use artifact::{checksum, ModelArtifact, FORMAT_VERSION, MODEL_TYPE};
pub use forest::{
    ForestParams, IsolationForest, IsolationTree, DEFAULT_MAX_SAMPLES, DEFAULT_SEED, DEFAULT_TREES,
};
