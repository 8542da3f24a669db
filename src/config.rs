//! Pipeline configuration. Built once at startup and passed to each component.

use crate::error::{PipelineError, Result};
use crate::features::MAX_WINDOW_SECS;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const ENV_DATABASE_URL: &str = "DATABASE_URL";
pub const ENV_FEATURE_WINDOW_SEC: &str = "FEATURE_WINDOW_SEC";
pub const ENV_SCORE_INTERVAL_SEC: &str = "SCORE_INTERVAL_SEC";
pub const ENV_MODEL_DIR: &str = "MODEL_DIR";
pub const ENV_LOG_LEVEL: &str = "EDGEPULSE_LOG_LEVEL";
pub const ENV_LOG_JSON: &str = "EDGEPULSE_LOG_JSON";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Data-store connection string (`sqlite://path`, `sqlite::memory:` or a bare path)
    pub database_url: Option<String>,
    /// Feature window width in seconds
    pub feature_window_secs: u64,
    /// Scoring cadence expected of the external scheduler; not consumed internally
    pub score_interval_secs: u64,
    /// Root directory for model artifacts
    pub model_dir: PathBuf,
    /// Logging
    pub log: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub level: String,
    pub json: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            feature_window_secs: 300,
            score_interval_secs: 600,
            model_dir: std::env::temp_dir().join("models"),
            log: LogConfig::default(),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl PipelineConfig {
    /// Load from JSON file if present; otherwise return default.
    /// A file that exists but cannot be read or parsed is an error.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let data = std::fs::read_to_string(path).map_err(|e| {
            PipelineError::Configuration(format!("cannot read {}: {e}", path.display()))
        })?;
        serde_json::from_str(&data)
            .map_err(|e| PipelineError::Configuration(format!("invalid config {}: {e}", path.display())))
    }

    /// File (if any) layered under the process environment.
    pub fn from_file_and_env(path: &Path) -> Result<Self> {
        Self::load(path)?.with_env(|key| std::env::var(key).ok())
    }

    /// Apply environment-style overrides read through `lookup`.
    pub fn with_env<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(ENV_DATABASE_URL).filter(|v| !v.trim().is_empty()) {
            self.database_url = Some(url);
        }
        if let Some(v) = lookup(ENV_FEATURE_WINDOW_SEC) {
            self.feature_window_secs = parse_var(ENV_FEATURE_WINDOW_SEC, &v)?;
        }
        if let Some(v) = lookup(ENV_SCORE_INTERVAL_SEC) {
            self.score_interval_secs = parse_var(ENV_SCORE_INTERVAL_SEC, &v)?;
        }
        if let Some(dir) = lookup(ENV_MODEL_DIR).filter(|v| !v.trim().is_empty()) {
            self.model_dir = PathBuf::from(dir);
        }
        if let Some(level) = lookup(ENV_LOG_LEVEL) {
            self.log.level = level;
        }
        if let Some(v) = lookup(ENV_LOG_JSON) {
            self.log.json = parse_var(ENV_LOG_JSON, &v)?;
        }
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<()> {
        if self.feature_window_secs == 0 {
            return Err(PipelineError::Configuration(
                "feature window length must be greater than zero".into(),
            ));
        }
        if self.feature_window_secs > MAX_WINDOW_SECS {
            return Err(PipelineError::Configuration(format!(
                "feature window length {}s exceeds the maximum of {MAX_WINDOW_SECS}s",
                self.feature_window_secs
            )));
        }
        Ok(())
    }

    /// Connection string, or a fatal configuration error when unset.
    pub fn database_url(&self) -> Result<&str> {
        self.database_url
            .as_deref()
            .ok_or_else(|| PipelineError::Configuration(format!("{ENV_DATABASE_URL} is not set")))
    }
}

fn parse_var<T: std::str::FromStr>(name: &str, raw: &str) -> Result<T> {
    raw.trim()
        .parse()
        .map_err(|_| PipelineError::Configuration(format!("{name}={raw:?} is not a valid value")))
}
