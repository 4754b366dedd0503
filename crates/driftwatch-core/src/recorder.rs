use crate::model::{FeatureMap, FieldValue, InferenceEvent, LabelEvent, PredKind};
use crate::storage::Store;
use chrono::{DateTime, Utc};

/// Caller-side input for one inference event. `ts` and `request_id` are
/// filled in at log time when not provided.
#[derive(Debug, Clone)]
pub struct InferenceRecord {
    pub model_id: String,
    pub model_version: String,
    pub pred_kind: PredKind,
    pub ts: Option<DateTime<Utc>>,
    pub request_id: Option<String>,
    pub latency_ms: Option<i64>,
    pub features: FeatureMap,
    pub y_pred_num: Option<f64>,
    pub y_pred_text: Option<String>,
    pub segment: FeatureMap,
}

impl InferenceRecord {
    pub fn new(
        model_id: impl Into<String>,
        model_version: impl Into<String>,
        pred_kind: PredKind,
    ) -> Self {
        Self {
            model_id: model_id.into(),
            model_version: model_version.into(),
            pred_kind,
            ts: None,
            request_id: None,
            latency_ms: None,
            features: FeatureMap::new(),
            y_pred_num: None,
            y_pred_text: None,
            segment: FeatureMap::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LabelRecord {
    pub model_id: String,
    pub request_id: String,
    pub ts_label: Option<DateTime<Utc>>,
    pub y_true_num: Option<f64>,
    pub y_true_text: Option<String>,
}

impl LabelRecord {
    pub fn new(model_id: impl Into<String>, request_id: impl Into<String>) -> Self {
        Self {
            model_id: model_id.into(),
            request_id: request_id.into(),
            ts_label: None,
            y_true_num: None,
            y_true_text: None,
        }
    }
}

/// Sanitizing writer over the event store. This is the only ingestion path
/// the crate ships; anything producing events is expected to go through it.
#[derive(Clone)]
pub struct Recorder {
    store: Store,
}

impl Recorder {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// Writes one inference event and returns its correlation key. Non-finite
    /// numeric values are replaced with explicit nulls and the event flagged,
    /// so data-quality problems surface in the day's sanitized_rate instead
    /// of failing ingestion.
    pub fn log_inference(&self, rec: InferenceRecord) -> anyhow::Result<String> {
        let ts = rec.ts.unwrap_or_else(Utc::now);
        let request_id = rec.request_id.unwrap_or_else(generate_request_id);

        let mut sanitized = false;
        let features = sanitize_map(rec.features, &mut sanitized);
        let segment = sanitize_map(rec.segment, &mut sanitized);
        let y_pred_num = sanitize_num(rec.y_pred_num, &mut sanitized);

        let ev = InferenceEvent {
            ts,
            model_id: rec.model_id,
            model_version: rec.model_version,
            request_id: Some(request_id.clone()),
            pred_kind: rec.pred_kind,
            latency_ms: rec.latency_ms,
            features,
            y_pred_num,
            y_pred_text: rec.y_pred_text,
            segment,
            sanitized,
        };
        self.store.insert_inference(&ev)?;
        tracing::debug!(
            model = %ev.model_id,
            version = %ev.model_version,
            request_id = %request_id,
            sanitized,
            "recorded inference event"
        );
        Ok(request_id)
    }

    pub fn log_label(&self, rec: LabelRecord) -> anyhow::Result<()> {
        let mut sanitized = false;
        let y_true_num = sanitize_num(rec.y_true_num, &mut sanitized);
        if sanitized {
            tracing::warn!(
                model = %rec.model_id,
                request_id = %rec.request_id,
                "non-finite label value dropped"
            );
        }
        let ev = LabelEvent {
            ts_label: rec.ts_label.unwrap_or_else(Utc::now),
            model_id: rec.model_id,
            request_id: rec.request_id,
            y_true_num,
            y_true_text: rec.y_true_text,
        };
        self.store.insert_label(&ev)?;
        Ok(())
    }
}

fn sanitize_map(map: FeatureMap, flag: &mut bool) -> FeatureMap {
    map.into_iter()
        .map(|(k, v)| match v {
            FieldValue::Num(n) if !n.is_finite() => {
                *flag = true;
                (k, FieldValue::Absent)
            }
            other => (k, other),
        })
        .collect()
}

fn sanitize_num(v: Option<f64>, flag: &mut bool) -> Option<f64> {
    match v {
        Some(n) if !n.is_finite() => {
            *flag = true;
            None
        }
        other => other,
    }
}

fn generate_request_id() -> String {
    use std::time::{SystemTime, UNIX_EPOCH};
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    format!("req-{:x}", nanos)
}
