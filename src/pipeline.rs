//! Orchestration of one batch invocation: fetch → extract → train | score → persist.
//!
//! Each operation runs to completion or returns the first error. Persisting the
//! artifact and upserting its registry row are separate writes: a crash between
//! them leaves an orphaned artifact that the next successful `train` overwrites.

use crate::config::PipelineConfig;
use crate::error::{PipelineError, Result};
use crate::features::{extract_windows, FeatureMatrix, FeatureVector};
use crate::model::{ForestParams, IsolationForest, ModelArtifact, MODEL_TYPE};
use crate::scoring::{Scorer, WindowScore};
use crate::storage::{MetricStore, ModelRecord};
use chrono::{DateTime, Duration, Utc};
use std::path::PathBuf;
use tracing::{debug, info};

/// How far back from "now" to read samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Lookback(Duration);

impl Lookback {
    pub fn hours(n: u32) -> Self {
        Self(Duration::hours(i64::from(n)))
    }

    pub fn days(n: u32) -> Self {
        Self(Duration::days(i64::from(n)))
    }

    pub fn since(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now.checked_sub_signed(self.0).unwrap_or(DateTime::<Utc>::MIN_UTC)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrainOutcome {
    pub artefact_path: PathBuf,
    pub checksum: String,
    pub windows: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScoreOutcome {
    pub scores: Vec<WindowScore>,
    pub rows_written: usize,
}

pub struct Pipeline {
    config: PipelineConfig,
    store: MetricStore,
    forest: ForestParams,
    now: Option<DateTime<Utc>>,
}

impl Pipeline {
    pub fn new(config: PipelineConfig, store: MetricStore) -> Self {
        Self {
            config,
            store,
            forest: ForestParams::default(),
            now: None,
        }
    }

    /// Open the configured store. A missing connection string is fatal.
    pub fn connect(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        let store = MetricStore::open(config.database_url()?)?;
        Ok(Self::new(config, store))
    }

    /// Pin the reference instant that lookbacks are measured from.
    pub fn with_now(mut self, now: DateTime<Utc>) -> Self {
        self.now = Some(now);
        self
    }

    pub fn with_forest_params(mut self, params: ForestParams) -> Self {
        self.forest = params;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn store(&self) -> &MetricStore {
        &self.store
    }

    fn now(&self) -> DateTime<Utc> {
        self.now.unwrap_or_else(Utc::now)
    }

    /// Feature windows for the lookback period. Empty when there are no samples.
    pub fn compute_features(&self, tenant: &str, metric: &str, lookback: Lookback) -> Result<Vec<FeatureVector>> {
        let since = lookback.since(self.now());
        let samples = self.store.fetch_samples(tenant, metric, since)?;
        let vectors = extract_windows(&samples, self.config.feature_window_secs)?;
        debug!(
            tenant,
            metric,
            samples = samples.len(),
            windows = vectors.len(),
            window_secs = self.config.feature_window_secs,
            "extracted feature windows"
        );
        Ok(vectors)
    }

    /// Fit a fresh forest, persist it and point the registry at it.
    pub fn train(&self, tenant: &str, metric: &str, lookback: Lookback) -> Result<TrainOutcome> {
        let artefact_path = ModelArtifact::path_for(&self.config.model_dir, tenant, metric)?;

        let vectors = self.compute_features(tenant, metric, lookback)?;
        if vectors.is_empty() {
            return Err(PipelineError::NoData {
                tenant: tenant.to_string(),
                metric: metric.to_string(),
            });
        }

        let matrix = FeatureMatrix::from_vectors(&vectors);
        let forest = IsolationForest::fit(&matrix, self.forest)?;
        let now = self.now();
        let artifact = ModelArtifact::new(forest, matrix.len(), now);
        let checksum = artifact.save(&artefact_path)?;

        self.store.upsert_model(&ModelRecord {
            tenant_id: tenant.to_string(),
            metric_id: metric.to_string(),
            model_type: MODEL_TYPE.to_string(),
            artefact_path: artefact_path.clone(),
            checksum: Some(checksum.clone()),
            updated_at: now,
        })?;

        info!(
            tenant,
            metric,
            windows = matrix.len(),
            path = %artefact_path.display(),
            "model trained"
        );
        Ok(TrainOutcome {
            artefact_path,
            checksum,
            windows: matrix.len(),
        })
    }

    /// Score the lookback period and upsert one row per window. No windows is
    /// a successful run with nothing written.
    pub fn score(&self, tenant: &str, metric: &str, lookback: Lookback) -> Result<ScoreOutcome> {
        let record = self.registered_model(tenant, metric)?;
        let vectors = self.compute_features(tenant, metric, lookback)?;
        self.score_with(&record, &FeatureMatrix::from_vectors(&vectors))
    }

    /// Score an externally supplied feature matrix against the registered model.
    pub fn score_matrix(&self, tenant: &str, metric: &str, matrix: &FeatureMatrix) -> Result<ScoreOutcome> {
        let record = self.registered_model(tenant, metric)?;
        self.score_with(&record, matrix)
    }

    fn registered_model(&self, tenant: &str, metric: &str) -> Result<ModelRecord> {
        self.store
            .latest_model(tenant, metric, MODEL_TYPE)?
            .ok_or_else(|| PipelineError::ModelNotFound {
                tenant: tenant.to_string(),
                metric: metric.to_string(),
            })
    }

    fn score_with(&self, record: &ModelRecord, matrix: &FeatureMatrix) -> Result<ScoreOutcome> {
        if matrix.is_empty() {
            info!(tenant = %record.tenant_id, metric = %record.metric_id, "no feature windows to score");
            return Ok(ScoreOutcome {
                scores: Vec::new(),
                rows_written: 0,
            });
        }

        let artifact = ModelArtifact::load(&record.artefact_path, record.checksum.as_deref())?;
        let scores = Scorer::from_artifact(artifact).score(matrix)?;
        let rows_written = self
            .store
            .upsert_scores(&record.tenant_id, &record.metric_id, &scores, self.now())?;

        info!(
            tenant = %record.tenant_id,
            metric = %record.metric_id,
            rows = rows_written,
            "anomaly scores upserted"
        );
        Ok(ScoreOutcome { scores, rows_written })
    }
}
