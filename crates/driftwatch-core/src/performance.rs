use crate::config::EngineConfig;
use crate::model::{
    InferenceEvent, LabelEvent, MetricRecord, PredKind, METRIC_ACCURACY, METRIC_ERROR_RATE,
    METRIC_F1, METRIC_MAE, METRIC_N_DUPLICATE_LABELS, METRIC_N_LABELED, METRIC_PRECISION,
    METRIC_RECALL, METRIC_RMSE,
};
use std::collections::{HashMap, HashSet};

/// One inference event joined to its ground truth.
#[derive(Debug, Clone)]
pub struct MatchedPair {
    pub kind: PredKind,
    pub y_pred_num: Option<f64>,
    pub y_pred_text: Option<String>,
    pub y_true_num: Option<f64>,
    pub y_true_text: Option<String>,
}

#[derive(Debug, Default)]
pub struct JoinOutcome {
    pub pairs: Vec<MatchedPair>,
    /// Correlation keys among the day's events that carried more than one
    /// label.
    pub duplicate_label_keys: usize,
}

/// Pure join of the day's inference events with the labels fetched for their
/// correlation keys. Per key at most one pair:
/// - several labels for one key: the first in (ts_label, insertion) order
///   wins and the key counts as duplicated;
/// - several day events sharing one key: the earliest (ts, insertion) event
///   joins;
/// - labels without a matching event are ignored.
/// `labels` is expected in the store's (ts_label, insertion) order.
pub fn join_labels(events: &[InferenceEvent], labels: &[LabelEvent]) -> JoinOutcome {
    let mut keyed_events: HashMap<&str, &InferenceEvent> = HashMap::new();
    for ev in events {
        if let Some(key) = ev.request_id.as_deref() {
            keyed_events.entry(key).or_insert(ev);
        }
    }

    let mut chosen: HashMap<&str, &LabelEvent> = HashMap::new();
    let mut label_counts: HashMap<&str, usize> = HashMap::new();
    for label in labels {
        let key = label.request_id.as_str();
        if !keyed_events.contains_key(key) {
            continue;
        }
        *label_counts.entry(key).or_insert(0) += 1;
        chosen.entry(key).or_insert(label);
    }
    let duplicate_label_keys = label_counts.values().filter(|c| **c > 1).count();

    // Emit pairs in event order so the outcome is deterministic.
    let mut pairs = Vec::with_capacity(chosen.len());
    let mut emitted: HashSet<&str> = HashSet::new();
    for ev in events {
        if let Some(key) = ev.request_id.as_deref() {
            if emitted.contains(key) {
                continue;
            }
            if let Some(label) = chosen.get(key) {
                emitted.insert(key);
                pairs.push(MatchedPair {
                    kind: ev.pred_kind,
                    y_pred_num: ev.y_pred_num,
                    y_pred_text: ev.y_pred_text.clone(),
                    y_true_num: label.y_true_num,
                    y_true_text: label.y_true_text.clone(),
                });
            }
        }
    }

    JoinOutcome {
        pairs,
        duplicate_label_keys,
    }
}

/// n_labeled, n_duplicate_labels, and the per-kind outcome metrics for the
/// joined pairs. Pairs of kind Other count toward the join totals but
/// produce no outcome metric.
pub fn compute(
    events: &[InferenceEvent],
    labels: &[LabelEvent],
    cfg: &EngineConfig,
) -> Vec<MetricRecord> {
    let joined = join_labels(events, labels);
    let mut out = vec![
        MetricRecord::new(METRIC_N_LABELED, joined.pairs.len() as f64),
        MetricRecord::new(
            METRIC_N_DUPLICATE_LABELS,
            joined.duplicate_label_keys as f64,
        ),
    ];
    out.extend(classification_metrics(&joined.pairs, cfg));
    out.extend(regression_metrics(&joined.pairs));
    out
}

/// Class label of one side of a pair: the recorded text when present,
/// otherwise the numeric score thresholded into "1"/"0".
fn class_label(num: Option<f64>, text: &Option<String>, threshold: f64) -> Option<String> {
    if let Some(t) = text {
        return Some(t.clone());
    }
    num.map(|v| {
        if v >= threshold {
            "1".to_string()
        } else {
            "0".to_string()
        }
    })
}

fn classification_metrics(pairs: &[MatchedPair], cfg: &EngineConfig) -> Vec<MetricRecord> {
    let positive = cfg.positive_class.as_deref();
    let mut total = 0usize;
    let mut correct = 0usize;
    let mut true_pos = 0usize;
    let mut false_pos = 0usize;
    let mut false_neg = 0usize;

    for pair in pairs.iter().filter(|p| p.kind == PredKind::Classification) {
        let pred = match class_label(pair.y_pred_num, &pair.y_pred_text, cfg.class_threshold) {
            Some(v) => v,
            None => continue,
        };
        let truth = match class_label(pair.y_true_num, &pair.y_true_text, cfg.class_threshold) {
            Some(v) => v,
            None => continue,
        };
        total += 1;
        if pred == truth {
            correct += 1;
        }
        if let Some(pc) = positive {
            if pred == pc && truth == pc {
                true_pos += 1;
            } else if pred == pc {
                false_pos += 1;
            } else if truth == pc {
                false_neg += 1;
            }
        }
    }

    if total == 0 {
        return Vec::new();
    }
    let accuracy = correct as f64 / total as f64;
    let mut out = vec![
        MetricRecord::new(METRIC_ACCURACY, accuracy),
        MetricRecord::new(METRIC_ERROR_RATE, 1.0 - accuracy),
    ];

    if positive.is_some() {
        // Empty denominators omit the metric rather than faking a zero.
        let precision = if true_pos + false_pos > 0 {
            Some(true_pos as f64 / (true_pos + false_pos) as f64)
        } else {
            None
        };
        let recall = if true_pos + false_neg > 0 {
            Some(true_pos as f64 / (true_pos + false_neg) as f64)
        } else {
            None
        };
        if let Some(p) = precision {
            out.push(MetricRecord::new(METRIC_PRECISION, p));
        }
        if let Some(r) = recall {
            out.push(MetricRecord::new(METRIC_RECALL, r));
        }
        if let (Some(p), Some(r)) = (precision, recall) {
            if p + r > 0.0 {
                out.push(MetricRecord::new(METRIC_F1, 2.0 * p * r / (p + r)));
            }
        }
    }
    out
}

fn regression_metrics(pairs: &[MatchedPair]) -> Vec<MetricRecord> {
    let mut errors: Vec<f64> = Vec::new();
    for pair in pairs.iter().filter(|p| p.kind == PredKind::Regression) {
        if let (Some(pred), Some(truth)) = (pair.y_pred_num, pair.y_true_num) {
            errors.push(pred - truth);
        }
    }
    if errors.is_empty() {
        return Vec::new();
    }
    let n = errors.len() as f64;
    let mae = errors.iter().map(|e| e.abs()).sum::<f64>() / n;
    let mse = errors.iter().map(|e| e * e).sum::<f64>() / n;
    vec![
        MetricRecord::new(METRIC_MAE, mae),
        MetricRecord::new(METRIC_RMSE, mse.sqrt()),
    ]
}
