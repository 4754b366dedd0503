use crate::model::{
    DailyMetric, FeatureMap, InferenceEvent, LabelEvent, MetricRecord, ModelKey, PredKind,
};
use anyhow::Context;
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Bound variables per IN (...) chunk, comfortably under SQLite's limit.
const IN_CHUNK: usize = 500;

#[derive(Clone)]
pub struct Store {
    pub(crate) conn: Arc<Mutex<Connection>>,
}

impl Store {
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open sqlite db at {}", path.display()))?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn memory() -> anyhow::Result<Self> {
        let conn = Connection::open_in_memory().context("failed to open in-memory sqlite db")?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn init_schema(&self) -> anyhow::Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch(crate::storage::schema::DDL)?;
        Ok(())
    }

    pub fn insert_inference(&self, ev: &InferenceEvent) -> anyhow::Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO inference_events(ts, model_id, model_version, request_id, pred_type,
                                          latency_ms, features_json, y_pred_num, y_pred_text,
                                          segment_json, sanitized)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                format_ts(&ev.ts),
                ev.model_id,
                ev.model_version,
                ev.request_id,
                ev.pred_kind.as_str(),
                ev.latency_ms,
                serde_json::to_string(&ev.features)?,
                ev.y_pred_num,
                ev.y_pred_text,
                serde_json::to_string(&ev.segment)?,
                ev.sanitized,
            ],
        )?;
        Ok(())
    }

    pub fn insert_label(&self, ev: &LabelEvent) -> anyhow::Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO label_events(ts_label, model_id, request_id, y_true_num, y_true_text)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                format_ts(&ev.ts_label),
                ev.model_id,
                ev.request_id,
                ev.y_true_num,
                ev.y_true_text,
            ],
        )?;
        Ok(())
    }

    /// Model/version pairs that produced at least one event on `day`.
    pub fn models_active_on(&self, day: NaiveDate) -> anyhow::Result<Vec<ModelKey>> {
        let (start, end) = day_bounds(day)?;
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT DISTINCT model_id, model_version FROM inference_events
             WHERE ts >= ?1 AND ts < ?2
             ORDER BY model_id, model_version",
        )?;
        let rows = stmt.query_map(params![start, end], |row| {
            Ok(ModelKey {
                model_id: row.get(0)?,
                model_version: row.get(1)?,
            })
        })?;
        let mut out = Vec::new();
        for r in rows {
            out.push(r?);
        }
        Ok(out)
    }

    pub fn earliest_event_day(&self, key: &ModelKey) -> anyhow::Result<Option<NaiveDate>> {
        let conn = self.conn.lock().unwrap();
        let min_ts: Option<String> = conn.query_row(
            "SELECT MIN(ts) FROM inference_events WHERE model_id=?1 AND model_version=?2",
            params![key.model_id, key.model_version],
            |row| row.get(0),
        )?;
        match min_ts {
            Some(raw) => Ok(Some(parse_ts(&raw)?.date_naive())),
            None => Ok(None),
        }
    }

    pub fn inference_events_on(
        &self,
        key: &ModelKey,
        day: NaiveDate,
    ) -> anyhow::Result<Vec<InferenceEvent>> {
        let next = day
            .succ_opt()
            .with_context(|| format!("day {} has no successor", day))?;
        self.inference_events_between(key, day, next)
    }

    /// Events in the half-open day range [start, end), ordered by (ts, id).
    pub fn inference_events_between(
        &self,
        key: &ModelKey,
        start: NaiveDate,
        end: NaiveDate,
    ) -> anyhow::Result<Vec<InferenceEvent>> {
        let raw_rows = {
            let conn = self.conn.lock().unwrap();
            let mut stmt = conn.prepare(
                "SELECT ts, request_id, pred_type, latency_ms, features_json,
                        y_pred_num, y_pred_text, segment_json, sanitized
                 FROM inference_events
                 WHERE model_id=?1 AND model_version=?2 AND ts >= ?3 AND ts < ?4
                 ORDER BY ts, id",
            )?;
            let rows = stmt.query_map(
                params![key.model_id, key.model_version, day_start(start), day_start(end)],
                |row| {
                    Ok(RawInferenceRow {
                        ts: row.get(0)?,
                        request_id: row.get(1)?,
                        pred_type: row.get(2)?,
                        latency_ms: row.get(3)?,
                        features_json: row.get(4)?,
                        y_pred_num: row.get(5)?,
                        y_pred_text: row.get(6)?,
                        segment_json: row.get(7)?,
                        sanitized: row.get(8)?,
                    })
                },
            )?;
            let mut collected = Vec::new();
            for r in rows {
                collected.push(r?);
            }
            collected
        };

        // Conversion happens outside the row closure so an unknown pred_type
        // or corrupt JSON surfaces as this model's error, not a sqlite one.
        let mut out = Vec::with_capacity(raw_rows.len());
        for raw in raw_rows {
            out.push(raw.into_event(key)?);
        }
        Ok(out)
    }

    /// Labels for the given correlation keys, scoped by model_id. For any
    /// single request the rows come back ordered by (ts_label, insertion);
    /// chunking never splits one request across chunks.
    pub fn labels_for_requests(
        &self,
        model_id: &str,
        request_ids: &[String],
    ) -> anyhow::Result<Vec<LabelEvent>> {
        if request_ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut keys: Vec<&str> = request_ids.iter().map(|s| s.as_str()).collect();
        keys.sort_unstable();
        keys.dedup();

        let raw_rows = {
            let conn = self.conn.lock().unwrap();
            let mut collected: Vec<(String, String, Option<f64>, Option<String>)> = Vec::new();
            for chunk in keys.chunks(IN_CHUNK) {
                let placeholders = vec!["?"; chunk.len()].join(",");
                let sql = format!(
                    "SELECT ts_label, request_id, y_true_num, y_true_text FROM label_events
                     WHERE model_id = ? AND request_id IN ({})
                     ORDER BY ts_label, id",
                    placeholders
                );
                let mut stmt = conn.prepare(&sql)?;
                let bind = std::iter::once(model_id).chain(chunk.iter().copied());
                let rows = stmt.query_map(rusqlite::params_from_iter(bind), |row| {
                    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
                })?;
                for r in rows {
                    collected.push(r?);
                }
            }
            collected
        };

        let mut out = Vec::with_capacity(raw_rows.len());
        for (ts_raw, request_id, y_true_num, y_true_text) in raw_rows {
            out.push(LabelEvent {
                ts_label: parse_ts(&ts_raw)?,
                model_id: model_id.to_string(),
                request_id,
                y_true_num,
                y_true_text,
            });
        }
        Ok(out)
    }

    /// Writes one run's metrics in a single transaction; the natural key
    /// (day, model_id, model_version, metric_name) makes re-runs overwrite
    /// instead of duplicate.
    pub fn upsert_daily_metrics(
        &self,
        key: &ModelKey,
        day: NaiveDate,
        metrics: &[MetricRecord],
    ) -> anyhow::Result<usize> {
        let day_str = day.to_string();
        let created_at = format_ts(&Utc::now());
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO metrics_daily(day, model_id, model_version, metric_name,
                                           metric_value, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(day, model_id, model_version, metric_name)
                 DO UPDATE SET metric_value=excluded.metric_value, created_at=excluded.created_at",
            )?;
            for m in metrics {
                stmt.execute(params![
                    day_str,
                    key.model_id,
                    key.model_version,
                    m.name,
                    m.value,
                    created_at,
                ])?;
            }
        }
        tx.commit()?;
        Ok(metrics.len())
    }

    pub fn daily_metrics(&self, key: &ModelKey, day: NaiveDate) -> anyhow::Result<Vec<DailyMetric>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT metric_name, metric_value FROM metrics_daily
             WHERE day=?1 AND model_id=?2 AND model_version=?3
             ORDER BY metric_name",
        )?;
        let rows = stmt.query_map(
            params![day.to_string(), key.model_id, key.model_version],
            |row| Ok((row.get::<_, String>(0)?, row.get::<_, f64>(1)?)),
        )?;
        let mut out = Vec::new();
        for r in rows {
            let (name, value) = r?;
            out.push(DailyMetric {
                day,
                model_id: key.model_id.clone(),
                model_version: key.model_version.clone(),
                name,
                value,
            });
        }
        Ok(out)
    }
}

struct RawInferenceRow {
    ts: String,
    request_id: Option<String>,
    pred_type: String,
    latency_ms: Option<i64>,
    features_json: String,
    y_pred_num: Option<f64>,
    y_pred_text: Option<String>,
    segment_json: String,
    sanitized: bool,
}

impl RawInferenceRow {
    fn into_event(self, key: &ModelKey) -> anyhow::Result<InferenceEvent> {
        let pred_kind = PredKind::parse(&self.pred_type)?;
        let features: FeatureMap = serde_json::from_str(&self.features_json)
            .with_context(|| format!("corrupt features_json for model {}", key))?;
        let segment: FeatureMap = serde_json::from_str(&self.segment_json)
            .with_context(|| format!("corrupt segment_json for model {}", key))?;
        Ok(InferenceEvent {
            ts: parse_ts(&self.ts)?,
            model_id: key.model_id.clone(),
            model_version: key.model_version.clone(),
            request_id: self.request_id,
            pred_kind,
            latency_ms: self.latency_ms,
            features,
            y_pred_num: self.y_pred_num,
            y_pred_text: self.y_pred_text,
            segment,
            sanitized: self.sanitized,
        })
    }
}

// Timestamps are stored as fixed-width RFC 3339 UTC strings so text
// comparison orders them chronologically.
fn format_ts(ts: &DateTime<Utc>) -> String {
    ts.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
}

fn parse_ts(raw: &str) -> anyhow::Result<DateTime<Utc>> {
    let dt = DateTime::parse_from_rfc3339(raw)
        .with_context(|| format!("invalid timestamp in storage: {}", raw))?;
    Ok(dt.with_timezone(&Utc))
}

fn day_start(day: NaiveDate) -> String {
    format!("{}T00:00:00.000Z", day.format("%Y-%m-%d"))
}

fn day_bounds(day: NaiveDate) -> anyhow::Result<(String, String)> {
    let next = day
        .succ_opt()
        .with_context(|| format!("day {} has no successor", day))?;
    Ok((day_start(day), day_start(next)))
}
