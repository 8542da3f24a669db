//! Model input contract: exactly six named attributes in a fixed order.
//!
//! Rows carry named fields and the forest addresses them through
//! [`FeatureColumn`], so trainer and scorer cannot disagree on positions. The
//! schema a model was trained with is persisted with it and compared again at
//! scoring time.

use super::FeatureVector;
use crate::error::{PipelineError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureColumn {
    Mean,
    Std,
    Median,
    Mad,
    Range,
    Count,
}

/// Column order used for training and scoring.
pub const MODEL_COLUMNS: [FeatureColumn; 6] = [
    FeatureColumn::Mean,
    FeatureColumn::Std,
    FeatureColumn::Median,
    FeatureColumn::Mad,
    FeatureColumn::Range,
    FeatureColumn::Count,
];

impl FeatureColumn {
    pub fn name(self) -> &'static str {
        match self {
            FeatureColumn::Mean => "mean",
            FeatureColumn::Std => "std",
            FeatureColumn::Median => "median",
            FeatureColumn::Mad => "mad",
            FeatureColumn::Range => "range",
            FeatureColumn::Count => "count",
        }
    }
}

impl fmt::Display for FeatureColumn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Ordered column list a matrix was built with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeatureSchema(Vec<FeatureColumn>);

impl FeatureSchema {
    pub fn model() -> Self {
        Self(MODEL_COLUMNS.to_vec())
    }

    pub fn columns(&self) -> &[FeatureColumn] {
        &self.0
    }

    /// Fail with `ScoringInputMismatch` unless `found` has the same columns in the same order.
    pub fn ensure_matches(&self, found: &FeatureSchema) -> Result<()> {
        if self == found {
            return Ok(());
        }
        Err(PipelineError::ScoringInputMismatch {
            expected: self.to_string(),
            found: found.to_string(),
        })
    }
}

impl Default for FeatureSchema {
    fn default() -> Self {
        Self::model()
    }
}

impl fmt::Display for FeatureSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.0.iter().map(|c| c.name()).collect();
        f.write_str(&names.join(", "))
    }
}

/// One model input row. Missing (NaN) statistics are already replaced by 0.0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureRow {
    pub window_end: DateTime<Utc>,
    pub mean: f64,
    pub std: f64,
    pub median: f64,
    pub mad: f64,
    pub range: f64,
    pub count: f64,
}

impl FeatureRow {
    pub fn value(&self, column: FeatureColumn) -> f64 {
        match column {
            FeatureColumn::Mean => self.mean,
            FeatureColumn::Std => self.std,
            FeatureColumn::Median => self.median,
            FeatureColumn::Mad => self.mad,
            FeatureColumn::Range => self.range,
            FeatureColumn::Count => self.count,
        }
    }
}

impl From<&FeatureVector> for FeatureRow {
    fn from(v: &FeatureVector) -> Self {
        Self {
            window_end: v.window_end,
            mean: zero_nan(v.mean),
            std: zero_nan(v.std),
            median: zero_nan(v.median),
            mad: zero_nan(v.mad),
            range: zero_nan(v.range),
            count: v.count as f64,
        }
    }
}

fn zero_nan(v: f64) -> f64 {
    if v.is_nan() {
        0.0
    } else {
        v
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FeatureMatrix {
    schema: FeatureSchema,
    rows: Vec<FeatureRow>,
}

impl FeatureMatrix {
    pub fn from_vectors(vectors: &[FeatureVector]) -> Self {
        Self {
            schema: FeatureSchema::model(),
            rows: vectors.iter().map(FeatureRow::from).collect(),
        }
    }

    /// Build from loosely typed feature records (e.g. a JSON feature table).
    ///
    /// Every record needs `window_end` and all six model attributes; a `null`
    /// attribute becomes 0.0, a missing one is a schema mismatch.
    pub fn from_records(records: &[serde_json::Value]) -> Result<Self> {
        let expected = FeatureSchema::model();
        let mut rows = Vec::with_capacity(records.len());

        for (i, record) in records.iter().enumerate() {
            let obj = record
                .as_object()
                .ok_or_else(|| PipelineError::InvalidInput(format!("record {i} is not an object")))?;

            let present: Vec<FeatureColumn> = MODEL_COLUMNS
                .iter()
                .copied()
                .filter(|c| obj.contains_key(c.name()))
                .collect();
            if present.len() != MODEL_COLUMNS.len() {
                return Err(PipelineError::ScoringInputMismatch {
                    expected: expected.to_string(),
                    found: FeatureSchema(present).to_string(),
                });
            }

            let window_end = obj
                .get("window_end")
                .and_then(|v| v.as_str())
                .ok_or_else(|| PipelineError::InvalidInput(format!("record {i} has no window_end")))?;
            let window_end = DateTime::parse_from_rfc3339(window_end)
                .map_err(|e| PipelineError::InvalidInput(format!("record {i} window_end: {e}")))?
                .with_timezone(&Utc);

            let field = |c: FeatureColumn| -> Result<f64> {
                match obj.get(c.name()) {
                    Some(serde_json::Value::Null) | None => Ok(0.0),
                    Some(v) => v.as_f64().ok_or_else(|| {
                        PipelineError::InvalidInput(format!("record {i} {c} is not numeric"))
                    }),
                }
            };

            rows.push(FeatureRow {
                window_end,
                mean: field(FeatureColumn::Mean)?,
                std: field(FeatureColumn::Std)?,
                median: field(FeatureColumn::Median)?,
                mad: field(FeatureColumn::Mad)?,
                range: field(FeatureColumn::Range)?,
                count: field(FeatureColumn::Count)?,
            });
        }

        Ok(Self {
            schema: expected,
            rows,
        })
    }

    pub fn schema(&self) -> &FeatureSchema {
        &self.schema
    }

    pub fn rows(&self) -> &[FeatureRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}
