//! Ingest batches: validate a device payload and append its points to the sample store.
//!
//! Payload shape:
//! `{"device_external_id": "...", "metrics": [{"name": "...", "ts": "<RFC 3339>", "value": 1.0, "unit": "..."}]}`

use crate::error::{PipelineError, Result};
use crate::features::Sample;
use crate::storage::MetricStore;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricPoint {
    pub name: String,
    pub ts: String,
    pub value: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestRequest {
    pub device_external_id: String,
    pub metrics: Vec<MetricPoint>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestReceipt {
    pub batch_id: String,
    pub points: usize,
    pub metrics: usize,
}

/// A point that passed validation, grouped by series.
struct Series {
    unit: Option<String>,
    samples: Vec<Sample>,
}

impl IngestRequest {
    pub fn from_json(raw: &str) -> Result<Self> {
        serde_json::from_str(raw).map_err(|e| PipelineError::InvalidInput(format!("invalid ingest payload: {e}")))
    }

    fn validate(&self) -> Result<BTreeMap<&str, Series>> {
        if self.device_external_id.trim().is_empty() {
            return Err(PipelineError::InvalidInput("device_external_id is empty".into()));
        }
        if self.metrics.is_empty() {
            return Err(PipelineError::InvalidInput("metrics must contain at least one point".into()));
        }

        let mut series: BTreeMap<&str, Series> = BTreeMap::new();
        for (i, p) in self.metrics.iter().enumerate() {
            if p.name.is_empty() {
                return Err(PipelineError::InvalidInput(format!("metrics[{i}].name is empty")));
            }
            let ts = DateTime::parse_from_rfc3339(&p.ts)
                .map_err(|e| PipelineError::InvalidInput(format!("metrics[{i}].ts {:?}: {e}", p.ts)))?
                .with_timezone(&Utc);
            if !p.value.is_finite() {
                return Err(PipelineError::InvalidInput(format!("metrics[{i}].value is not finite")));
            }
            let entry = series.entry(p.name.as_str()).or_insert_with(|| Series {
                unit: p.unit.clone(),
                samples: Vec::new(),
            });
            entry.samples.push(Sample::new(ts, p.value));
        }
        Ok(series)
    }
}

/// Validate `request` as a whole, then write each metric series for `tenant`
/// under one fresh batch id. Nothing is written if validation fails.
pub fn ingest(store: &MetricStore, tenant: &str, request: &IngestRequest) -> Result<IngestReceipt> {
    let series = request.validate()?;
    let batch_id = Uuid::new_v4().to_string();

    let mut points = 0;
    for (metric, s) in &series {
        points += store.insert_samples(tenant, metric, &s.samples, s.unit.as_deref(), Some(batch_id.as_str()))?;
    }

    info!(
        tenant,
        device = %request.device_external_id,
        batch_id = %batch_id,
        points,
        metrics = series.len(),
        "ingested batch"
    );
    Ok(IngestReceipt {
        batch_id,
        points,
        metrics: series.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const PAYLOAD: &str = r#"{
        "device_external_id": "edge-01",
        "metrics": [
            {"name": "cpu", "ts": "2024-01-01T00:00:01+00:00", "value": 0.5, "unit": "ratio"},
            {"name": "cpu", "ts": "2024-01-01T01:00:02+01:00", "value": 0.7},
            {"name": "temp", "ts": "2024-01-01T00:00:03Z", "value": 41.0}
        ]
    }"#;

    #[test]
    fn valid_batch_lands_per_metric() {
        let store = MetricStore::open("sqlite::memory:").unwrap();
        let req = IngestRequest::from_json(PAYLOAD).unwrap();
        let receipt = ingest(&store, "acme", &req).unwrap();
        assert_eq!(receipt.points, 3);
        assert_eq!(receipt.metrics, 2);
        assert!(Uuid::parse_str(&receipt.batch_id).is_ok());

        let epoch = Utc.timestamp_opt(0, 0).unwrap();
        let cpu = store.fetch_samples("acme", "cpu", epoch).unwrap();
        assert_eq!(cpu.len(), 2);
        // +01:00 offset normalised to UTC
        assert_eq!(cpu[1].ts, Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 2).unwrap());
        assert_eq!(store.fetch_samples("acme", "temp", epoch).unwrap().len(), 1);
    }

    #[test]
    fn invalid_points_reject_the_whole_batch() {
        let store = MetricStore::open("sqlite::memory:").unwrap();
        let raw = r#"{"device_external_id": "d", "metrics": [
            {"name": "cpu", "ts": "2024-01-01T00:00:01Z", "value": 1.0},
            {"name": "cpu", "ts": "yesterday", "value": 2.0}
        ]}"#;
        let req = IngestRequest::from_json(raw).unwrap();
        let err = ingest(&store, "acme", &req).unwrap_err();
        assert!(matches!(err, PipelineError::InvalidInput(_)));
        let epoch = Utc.timestamp_opt(0, 0).unwrap();
        assert!(store.fetch_samples("acme", "cpu", epoch).unwrap().is_empty());
    }

    #[test]
    fn empty_batches_and_names_are_rejected() {
        let empty = IngestRequest::from_json(r#"{"device_external_id": "d", "metrics": []}"#).unwrap();
        assert!(empty.validate().is_err());
        let unnamed = IngestRequest::from_json(
            r#"{"device_external_id": "d", "metrics": [{"name": "", "ts": "2024-01-01T00:00:00Z", "value": 1}]}"#,
        )
        .unwrap();
        assert!(unnamed.validate().is_err());
        assert!(IngestRequest::from_json("not json").is_err());
    }
}
