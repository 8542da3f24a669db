//! Statistical window features extracted from raw metric samples.

mod matrix;
mod stats;
mod window;

pub use matrix::{FeatureColumn, FeatureMatrix, FeatureRow, FeatureSchema, MODEL_COLUMNS};
pub use stats::{mad, median, population_std};
pub use window::{extract_windows, MAX_WINDOW_SECS};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One raw observation of a metric. Input order is arbitrary.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub ts: DateTime<Utc>,
    pub value: f64,
}

impl Sample {
    pub fn new(ts: DateTime<Utc>, value: f64) -> Self {
        Self { ts, value }
    }
}

/// Aggregate statistics for one non-empty epoch-aligned window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    /// Exclusive upper boundary of the window
    pub window_end: DateTime<Utc>,
    pub mean: f64,
    /// Population standard deviation (ddof = 0)
    pub std: f64,
    pub min: f64,
    pub max: f64,
    pub count: u64,
    pub median: f64,
    /// Median absolute deviation from the median
    pub mad: f64,
    pub range: f64,
}
