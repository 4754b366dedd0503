use crate::errors::ConfigError;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// One scalar value in a feature or segment map. `Absent` round-trips as
/// JSON null, which is how sanitized values stay visible in storage instead
/// of silently disappearing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Num(f64),
    Text(String),
    Absent,
}

impl FieldValue {
    pub fn as_num(&self) -> Option<f64> {
        match self {
            FieldValue::Num(v) => Some(*v),
            _ => None,
        }
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, FieldValue::Absent)
    }
}

/// Ordered feature-name -> value mapping, as attached to an inference event.
pub type FeatureMap = BTreeMap<String, FieldValue>;

/// Declared prediction kind of a model version. Drives which performance
/// metrics the engine computes once labels arrive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PredKind {
    Classification,
    Regression,
    Other,
}

impl PredKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PredKind::Classification => "classification",
            PredKind::Regression => "regression",
            PredKind::Other => "other",
        }
    }

    /// Strict on purpose: an unknown kind in storage fails the run for the
    /// model that wrote it instead of being coerced to a default.
    pub fn parse(s: &str) -> Result<Self, ConfigError> {
        match s {
            "classification" => Ok(PredKind::Classification),
            "regression" => Ok(PredKind::Regression),
            "other" => Ok(PredKind::Other),
            other => Err(ConfigError(format!("unknown prediction kind: {}", other))),
        }
    }
}

/// (model_id, model_version) pair the engine computes metrics for.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ModelKey {
    pub model_id: String,
    pub model_version: String,
}

impl ModelKey {
    pub fn new(model_id: impl Into<String>, model_version: impl Into<String>) -> Self {
        Self {
            model_id: model_id.into(),
            model_version: model_version.into(),
        }
    }
}

impl fmt::Display for ModelKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.model_id, self.model_version)
    }
}

/// Immutable record of one model prediction. Appended at serving time and
/// never updated; the daily job only reads these.
#[derive(Debug, Clone, PartialEq)]
pub struct InferenceEvent {
    pub ts: DateTime<Utc>,
    pub model_id: String,
    pub model_version: String,
    pub request_id: Option<String>,
    pub pred_kind: PredKind,
    pub latency_ms: Option<i64>,
    pub features: FeatureMap,
    pub y_pred_num: Option<f64>,
    pub y_pred_text: Option<String>,
    pub segment: FeatureMap,
    pub sanitized: bool,
}

/// Delayed ground truth, correlated back to an inference event by
/// (model_id, request_id). The label log carries no model version; one label
/// feeds every version that served the request.
#[derive(Debug, Clone, PartialEq)]
pub struct LabelEvent {
    pub ts_label: DateTime<Utc>,
    pub model_id: String,
    pub request_id: String,
    pub y_true_num: Option<f64>,
    pub y_true_text: Option<String>,
}

/// One metric produced by the engine for a (model, version, day) run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricRecord {
    pub name: String,
    pub value: f64,
}

impl MetricRecord {
    pub fn new(name: impl Into<String>, value: f64) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }
}

/// One row of the metrics sink, keyed by (day, model_id, model_version, name).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyMetric {
    pub day: NaiveDate,
    pub model_id: String,
    pub model_version: String,
    pub name: String,
    pub value: f64,
}

// Flat metric vocabulary. Per-feature metrics use a double-underscore
// separator so dashboards can split name from feature.
pub const METRIC_N_EVENTS: &str = "n_events";
pub const METRIC_P50_LATENCY_MS: &str = "p50_latency_ms";
pub const METRIC_P95_LATENCY_MS: &str = "p95_latency_ms";
pub const METRIC_SANITIZED_RATE: &str = "sanitized_rate";
pub const METRIC_N_UNBASELINED_FEATURES: &str = "n_unbaselined_features";
pub const METRIC_N_LABELED: &str = "n_labeled";
pub const METRIC_N_DUPLICATE_LABELS: &str = "n_duplicate_labels";
pub const METRIC_ACCURACY: &str = "accuracy";
pub const METRIC_ERROR_RATE: &str = "error_rate";
pub const METRIC_PRECISION: &str = "precision";
pub const METRIC_RECALL: &str = "recall";
pub const METRIC_F1: &str = "f1";
pub const METRIC_MAE: &str = "mae";
pub const METRIC_RMSE: &str = "rmse";

pub fn psi_metric_name(feature: &str) -> String {
    format!("psi__{}", feature)
}

pub fn missing_rate_metric_name(feature: &str) -> String {
    format!("missing_rate__{}", feature)
}
