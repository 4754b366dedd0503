pub const DDL: &str = r#"
CREATE TABLE IF NOT EXISTS inference_events (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  ts TEXT NOT NULL,
  model_id TEXT NOT NULL,
  model_version TEXT NOT NULL,
  request_id TEXT,
  pred_type TEXT NOT NULL,
  latency_ms INTEGER,
  features_json TEXT NOT NULL,
  y_pred_num REAL,
  y_pred_text TEXT,
  segment_json TEXT NOT NULL,
  sanitized INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS idx_inference_model_ts
  ON inference_events(model_id, model_version, ts);
CREATE INDEX IF NOT EXISTS idx_inference_request
  ON inference_events(model_id, request_id);

CREATE TABLE IF NOT EXISTS label_events (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  ts_label TEXT NOT NULL,
  model_id TEXT NOT NULL,
  request_id TEXT NOT NULL,
  y_true_num REAL,
  y_true_text TEXT
);

CREATE INDEX IF NOT EXISTS idx_label_request
  ON label_events(model_id, request_id);

CREATE TABLE IF NOT EXISTS metrics_daily (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  day TEXT NOT NULL,
  model_id TEXT NOT NULL,
  model_version TEXT NOT NULL,
  metric_name TEXT NOT NULL,
  metric_value REAL NOT NULL,
  created_at TEXT NOT NULL,
  UNIQUE(day, model_id, model_version, metric_name)
);
"#;
