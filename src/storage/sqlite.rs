//! SQLite-backed metric store: raw datapoints, the model registry and anomaly scores.
//! Timestamps are stored as Unix milliseconds.

use crate::error::{PipelineError, Result};
use crate::features::Sample;
use crate::scoring::WindowScore;
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Registry row pointing at the current artifact for (tenant, metric, model_type).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelRecord {
    pub tenant_id: String,
    pub metric_id: String,
    pub model_type: String,
    pub artefact_path: PathBuf,
    /// Hex SHA-256 of the artifact bytes
    pub checksum: Option<String>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyScore {
    pub tenant_id: String,
    pub metric_id: String,
    pub window_end: DateTime<Utc>,
    pub anomaly_score: f64,
    pub updated_at: DateTime<Utc>,
}

pub struct MetricStore {
    conn: Mutex<Connection>,
}

impl MetricStore {
    /// Open from a connection string: `sqlite::memory:`, `sqlite://<path>` or a bare path.
    pub fn open(database_url: &str) -> Result<Self> {
        let url = database_url.trim();
        let conn = if url == "sqlite::memory:" || url == ":memory:" {
            Connection::open_in_memory()?
        } else if let Some(path) = url.strip_prefix("sqlite://") {
            Connection::open(path)?
        } else if url.contains("://") {
            return Err(PipelineError::Configuration(format!(
                "unsupported database url {url:?}; expected sqlite://<path>"
            )));
        } else {
            Connection::open(url)?
        };
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS datapoints (
                tenant_id TEXT NOT NULL,
                metric_id TEXT NOT NULL,
                ts INTEGER NOT NULL,
                value REAL NOT NULL,
                unit TEXT,
                ingest_batch_id TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_datapoints_series ON datapoints(tenant_id, metric_id, ts);
            CREATE TABLE IF NOT EXISTS models (
                tenant_id TEXT NOT NULL,
                metric_id TEXT NOT NULL,
                model_type TEXT NOT NULL,
                artefact_path TEXT NOT NULL,
                checksum TEXT,
                updated_at INTEGER NOT NULL,
                PRIMARY KEY (tenant_id, metric_id, model_type)
            );
            CREATE TABLE IF NOT EXISTS anomaly_scores (
                tenant_id TEXT NOT NULL,
                metric_id TEXT NOT NULL,
                window_end INTEGER NOT NULL,
                anomaly_score REAL NOT NULL,
                updated_at INTEGER NOT NULL,
                PRIMARY KEY (tenant_id, metric_id, window_end)
            );
            "#,
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append samples for one series in a single transaction.
    pub fn insert_samples(
        &self,
        tenant: &str,
        metric: &str,
        samples: &[Sample],
        unit: Option<&str>,
        batch_id: Option<&str>,
    ) -> Result<usize> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO datapoints (tenant_id, metric_id, ts, value, unit, ingest_batch_id)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )?;
            for s in samples {
                stmt.execute(params![tenant, metric, s.ts.timestamp_millis(), s.value, unit, batch_id])?;
            }
        }
        tx.commit()?;
        Ok(samples.len())
    }

    /// Samples for a series with `ts >= since`, ascending.
    pub fn fetch_samples(&self, tenant: &str, metric: &str, since: DateTime<Utc>) -> Result<Vec<Sample>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT ts, value FROM datapoints
              WHERE tenant_id = ?1 AND metric_id = ?2 AND ts >= ?3
              ORDER BY ts ASC",
        )?;
        let rows = stmt.query_map(params![tenant, metric, since.timestamp_millis()], |row| {
            Ok(Sample {
                ts: millis_to_utc(0, row.get(0)?)?,
                value: row.get(1)?,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Insert or replace the registry row keyed on (tenant, metric, model_type).
    pub fn upsert_model(&self, record: &ModelRecord) -> Result<()> {
        self.conn().execute(
            "INSERT INTO models (tenant_id, metric_id, model_type, artefact_path, checksum, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT (tenant_id, metric_id, model_type)
             DO UPDATE SET artefact_path = excluded.artefact_path,
                           checksum = excluded.checksum,
                           updated_at = excluded.updated_at",
            params![
                record.tenant_id,
                record.metric_id,
                record.model_type,
                record.artefact_path.to_string_lossy(),
                record.checksum,
                record.updated_at.timestamp_millis(),
            ],
        )?;
        Ok(())
    }

    pub fn latest_model(&self, tenant: &str, metric: &str, model_type: &str) -> Result<Option<ModelRecord>> {
        let conn = self.conn();
        let record = conn
            .query_row(
                "SELECT tenant_id, metric_id, model_type, artefact_path, checksum, updated_at
                   FROM models
                  WHERE tenant_id = ?1 AND metric_id = ?2 AND model_type = ?3
                  ORDER BY updated_at DESC
                  LIMIT 1",
                params![tenant, metric, model_type],
                |row| {
                    Ok(ModelRecord {
                        tenant_id: row.get(0)?,
                        metric_id: row.get(1)?,
                        model_type: row.get(2)?,
                        artefact_path: PathBuf::from(row.get::<_, String>(3)?),
                        checksum: row.get(4)?,
                        updated_at: millis_to_utc(5, row.get(5)?)?,
                    })
                },
            )
            .optional()?;
        Ok(record)
    }

    /// Upsert each score keyed on (tenant, metric, window_end). One statement
    /// per row; a failure part-way leaves earlier rows written.
    pub fn upsert_scores(
        &self,
        tenant: &str,
        metric: &str,
        scores: &[WindowScore],
        updated_at: DateTime<Utc>,
    ) -> Result<usize> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "INSERT INTO anomaly_scores (tenant_id, metric_id, window_end, anomaly_score, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT (tenant_id, metric_id, window_end)
             DO UPDATE SET anomaly_score = excluded.anomaly_score,
                           updated_at = excluded.updated_at",
        )?;
        let mut written = 0;
        for s in scores {
            written += stmt.execute(params![
                tenant,
                metric,
                s.window_end.timestamp_millis(),
                s.anomaly_score,
                updated_at.timestamp_millis(),
            ])?;
        }
        Ok(written)
    }

    /// All stored scores for a series, ascending by window end.
    pub fn scores(&self, tenant: &str, metric: &str) -> Result<Vec<AnomalyScore>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT tenant_id, metric_id, window_end, anomaly_score, updated_at
               FROM anomaly_scores
              WHERE tenant_id = ?1 AND metric_id = ?2
              ORDER BY window_end ASC",
        )?;
        let rows = stmt.query_map(params![tenant, metric], |row| {
            Ok(AnomalyScore {
                tenant_id: row.get(0)?,
                metric_id: row.get(1)?,
                window_end: millis_to_utc(2, row.get(2)?)?,
                anomaly_score: row.get(3)?,
                updated_at: millis_to_utc(4, row.get(4)?)?,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }
}

fn millis_to_utc(idx: usize, ms: i64) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp_millis(ms).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            Type::Integer,
            format!("timestamp {ms} out of range").into(),
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    #[test]
    fn samples_filter_by_series_and_since() {
        let store = MetricStore::open("sqlite::memory:").unwrap();
        let samples = [Sample::new(ts(30), 3.0), Sample::new(ts(10), 1.0), Sample::new(ts(20), 2.0)];
        store.insert_samples("t1", "cpu", &samples, Some("%"), Some("b1")).unwrap();
        store.insert_samples("t1", "mem", &[Sample::new(ts(15), 9.0)], None, None).unwrap();
        store.insert_samples("t2", "cpu", &[Sample::new(ts(15), 9.0)], None, None).unwrap();

        let got = store.fetch_samples("t1", "cpu", ts(20)).unwrap();
        assert_eq!(got, vec![Sample::new(ts(20), 2.0), Sample::new(ts(30), 3.0)]);
    }

    #[test]
    fn model_registry_upserts_on_key() {
        let store = MetricStore::open("sqlite::memory:").unwrap();
        assert!(store.latest_model("t", "m", "iforest").unwrap().is_none());

        let mut rec = ModelRecord {
            tenant_id: "t".into(),
            metric_id: "m".into(),
            model_type: "iforest".into(),
            artefact_path: PathBuf::from("/models/t/m.json"),
            checksum: Some("aa".into()),
            updated_at: ts(100),
        };
        store.upsert_model(&rec).unwrap();
        rec.artefact_path = PathBuf::from("/models/t/m-2.json");
        rec.checksum = Some("bb".into());
        rec.updated_at = ts(200);
        store.upsert_model(&rec).unwrap();

        assert_eq!(store.latest_model("t", "m", "iforest").unwrap(), Some(rec));
        let count: i64 = store
            .conn()
            .query_row("SELECT COUNT(*) FROM models", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn repeated_score_upserts_keep_one_row_with_latest_value() {
        let store = MetricStore::open("sqlite::memory:").unwrap();
        let first = [WindowScore { window_end: ts(300), anomaly_score: 0.1 }];
        let second = [WindowScore { window_end: ts(300), anomaly_score: 0.7 }];
        store.upsert_scores("t", "m", &first, ts(1)).unwrap();
        store.upsert_scores("t", "m", &second, ts(2)).unwrap();

        let rows = store.scores("t", "m").unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].anomaly_score, 0.7);
        assert_eq!(rows[0].updated_at, ts(2));
    }

    #[test]
    fn file_backed_store_persists_across_opens() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}", dir.path().join("edgepulse.db").display());
        {
            let store = MetricStore::open(&url).unwrap();
            store.insert_samples("t", "m", &[Sample::new(ts(5), 1.5)], None, None).unwrap();
        }
        let store = MetricStore::open(&url).unwrap();
        assert_eq!(store.fetch_samples("t", "m", ts(0)).unwrap().len(), 1);
    }

    #[test]
    fn foreign_schemes_are_configuration_errors() {
        let err = MetricStore::open("postgres://db/edgepulse").err().unwrap();
        assert!(matches!(err, PipelineError::Configuration(_)));
    }

    #[test]
    fn unreachable_store_is_persistence_error() {
        let err = MetricStore::open("sqlite:///nonexistent-dir/sub/db.sqlite").err().unwrap();
        assert!(matches!(err, PipelineError::Persistence(_)));
    }
}
