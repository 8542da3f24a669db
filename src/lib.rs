//! EdgePulse ML — per-tenant, per-metric anomaly scoring jobs.
//!
//! Modular structure:
//! - [`features`] — Epoch-aligned window statistics and the six-column model input contract
//! - [`model`] — Isolation forest training and artifact persistence
//! - [`scoring`] — Anomaly scores from a trained forest
//! - [`storage`] — SQLite sample store, model registry and score table
//! - [`ingest`] — Validated device payloads into the sample store
//! - [`pipeline`] — `compute_features` / `train` / `score` orchestration
//! - [`logging`] — Structured logging and JSON-lines output

pub mod config;
pub mod error;
pub mod features;
pub mod ingest;
pub mod logging;
pub mod model;
pub mod pipeline;
pub mod scoring;
pub mod storage;

pub use config::PipelineConfig;
pub use error::{PipelineError, Result};
pub use features::{extract_windows, FeatureMatrix, FeatureVector, Sample};
pub use logging::StructuredLogger;
pub use model::{IsolationForest, ModelArtifact};
pub use pipeline::{Lookback, Pipeline, ScoreOutcome, TrainOutcome};
pub use scoring::{Scorer, WindowScore};
pub use storage::MetricStore;
