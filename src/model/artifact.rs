//! Persisted model artifacts: JSON blob on disk, SHA-256 recorded in the registry.

use super::IsolationForest;
use crate::error::{PipelineError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

pub const MODEL_TYPE: &str = "isolation_forest_v1";
pub const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub model_type: String,
    pub format_version: u32,
    pub trained_at: DateTime<Utc>,
    /// Number of feature windows the forest was fitted on
    pub windows: usize,
    pub forest: IsolationForest,
}

impl ModelArtifact {
    pub fn new(forest: IsolationForest, windows: usize, trained_at: DateTime<Utc>) -> Self {
        Self {
            model_type: MODEL_TYPE.to_string(),
            format_version: FORMAT_VERSION,
            trained_at,
            windows,
            forest,
        }
    }

    /// `<model_dir>/<tenant>/<metric>.json`. Identifiers must be plain path components.
    pub fn path_for(model_dir: &Path, tenant: &str, metric: &str) -> Result<PathBuf> {
        for (what, id) in [("tenant", tenant), ("metric", metric)] {
            let plain = !id.is_empty()
                && id != "."
                && id != ".."
                && !id.contains(&['/', '\\', '\0'][..]);
            if !plain {
                return Err(PipelineError::InvalidInput(format!(
                    "{what} id {id:?} cannot be used as a path component"
                )));
            }
        }
        Ok(model_dir.join(tenant).join(format!("{metric}.json")))
    }

    /// Write to `path` (temp file + rename) and return the hex SHA-256 of the bytes written.
    pub fn save(&self, path: &Path) -> Result<String> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let bytes = serde_json::to_vec(self)?;
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, &bytes)?;
        std::fs::rename(&tmp, path)?;
        Ok(checksum(&bytes))
    }

    /// Load from `path`, verifying `expected_checksum` when given. Any failure
    /// to produce a usable model is `ModelUnavailable`.
    pub fn load(path: &Path, expected_checksum: Option<&str>) -> Result<Self> {
        let bytes = std::fs::read(path)
            .map_err(|e| PipelineError::model_unavailable(path, e.to_string()))?;

        if let Some(expected) = expected_checksum {
            let actual = checksum(&bytes);
            if !actual.eq_ignore_ascii_case(expected) {
                return Err(PipelineError::model_unavailable(
                    path,
                    format!("checksum mismatch: expected {expected}, got {actual}"),
                ));
            }
        }

        let artifact: ModelArtifact = serde_json::from_slice(&bytes)
            .map_err(|e| PipelineError::model_unavailable(path, format!("corrupt artifact: {e}")))?;

        if artifact.model_type != MODEL_TYPE || artifact.format_version != FORMAT_VERSION {
            return Err(PipelineError::model_unavailable(
                path,
                format!(
                    "unsupported model {} v{}",
                    artifact.model_type, artifact.format_version
                ),
            ));
        }
        artifact
            .forest
            .validate()
            .map_err(|reason| PipelineError::model_unavailable(path, reason))?;
        Ok(artifact)
    }
}

pub fn checksum(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}
