//! Error taxonomy surfaced at the invocation boundary. Every failure maps to
//! a distinct process exit status; nothing is retried internally.

use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, PipelineError>;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("no feature windows for tenant={tenant} metric={metric}")]
    NoData { tenant: String, metric: String },

    #[error("no trained model registered for tenant={tenant} metric={metric}")]
    ModelNotFound { tenant: String, metric: String },

    #[error("model artifact {} unavailable: {reason}", path.display())]
    ModelUnavailable { path: PathBuf, reason: String },

    #[error("feature columns do not match the model: expected [{expected}], found [{found}]")]
    ScoringInputMismatch { expected: String, found: String },

    #[error("persistence error: {0}")]
    Persistence(#[from] rusqlite::Error),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl PipelineError {
    /// Process exit status for this error (sysexits-style where one fits).
    pub fn exit_code(&self) -> i32 {
        match self {
            PipelineError::NoData { .. } | PipelineError::ModelNotFound { .. } => 2,
            PipelineError::ModelUnavailable { .. } => 3,
            PipelineError::ScoringInputMismatch { .. } => 4,
            PipelineError::Persistence(_) => 5,
            PipelineError::InvalidInput(_) | PipelineError::Serialization(_) => 65,
            PipelineError::Io(_) => 74,
            PipelineError::Configuration(_) => 78,
        }
    }

    pub(crate) fn model_unavailable(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        PipelineError::ModelUnavailable {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_data_and_model_share_status_two() {
        let no_data = PipelineError::NoData {
            tenant: "t".into(),
            metric: "m".into(),
        };
        let no_model = PipelineError::ModelNotFound {
            tenant: "t".into(),
            metric: "m".into(),
        };
        assert_eq!(no_data.exit_code(), 2);
        assert_eq!(no_model.exit_code(), 2);
    }

    #[test]
    fn fatal_conditions_have_distinct_statuses() {
        let codes = [
            PipelineError::Configuration("x".into()).exit_code(),
            PipelineError::model_unavailable("/m.json", "gone").exit_code(),
            PipelineError::ScoringInputMismatch {
                expected: "a".into(),
                found: "b".into(),
            }
            .exit_code(),
            PipelineError::Persistence(rusqlite::Error::InvalidQuery).exit_code(),
            PipelineError::InvalidInput("x".into()).exit_code(),
        ];
        for (i, a) in codes.iter().enumerate() {
            assert_ne!(*a, 0);
            for b in &codes[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }
}
