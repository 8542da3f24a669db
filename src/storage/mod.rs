//! Persistence for samples, the model registry and anomaly scores.

mod sqlite;

pub use sqlite::{AnomalyScore, MetricStore, ModelRecord};
