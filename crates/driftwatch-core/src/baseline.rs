use crate::config::EngineConfig;
use crate::model::{FieldValue, InferenceEvent};
use crate::stats;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

/// Reference distribution for one numeric feature: ascending bin edges and
/// the fraction of baseline observations per bin.
#[derive(Debug, Clone)]
pub struct FeatureBaseline {
    pub edges: Vec<f64>,
    pub fractions: Vec<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    NonNumeric,
    LowDistinct,
    LowPresence,
    DegenerateBins,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::NonNumeric => "non_numeric",
            SkipReason::LowDistinct => "low_distinct",
            SkipReason::LowPresence => "low_presence",
            SkipReason::DegenerateBins => "degenerate_bins",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SkippedFeature {
    pub name: String,
    pub reason: SkipReason,
}

/// Everything the drift calculator needs about a model/version's baseline
/// window. Rebuilt from raw events on every run, never persisted.
#[derive(Debug, Clone, Default)]
pub struct BaselineSet {
    pub n_events: usize,
    /// Features that passed the exclusion rules, with their reference bins.
    pub features: BTreeMap<String, FeatureBaseline>,
    /// Features excluded from drift, with the rule that excluded them.
    pub skipped: Vec<SkippedFeature>,
    /// Every feature name seen in the window with any value, tracked or not.
    pub observed: BTreeSet<String>,
}

/// Builds the reference distributions from the baseline window's events.
/// Exclusions are reported, never failures: a feature that cannot be binned
/// becomes a `SkippedFeature`, and the run continues without it.
pub fn build_baseline(events: &[InferenceEvent], cfg: &EngineConfig) -> BaselineSet {
    let mut set = BaselineSet {
        n_events: events.len(),
        ..Default::default()
    };
    if events.is_empty() {
        return set;
    }

    let mut numeric: BTreeMap<&str, Vec<f64>> = BTreeMap::new();
    let mut textual: BTreeSet<&str> = BTreeSet::new();
    for ev in events {
        for (name, value) in &ev.features {
            set.observed.insert(name.clone());
            match value {
                FieldValue::Num(v) if v.is_finite() => {
                    numeric.entry(name).or_default().push(*v)
                }
                FieldValue::Text(_) => {
                    textual.insert(name);
                }
                _ => {}
            }
        }
    }

    let n = events.len() as f64;
    for (name, mut values) in numeric {
        let presence = values.len() as f64 / n;
        if presence < cfg.min_feature_presence {
            set.skipped.push(SkippedFeature {
                name: name.to_string(),
                reason: SkipReason::LowPresence,
            });
            continue;
        }
        stats::sort_sample(&mut values);
        if count_distinct_sorted(&values) < cfg.min_distinct_values {
            set.skipped.push(SkippedFeature {
                name: name.to_string(),
                reason: SkipReason::LowDistinct,
            });
            continue;
        }
        let edges = quantile_edges(&values, cfg.psi_bins);
        if edges.len() < 3 {
            // duplicate-edge merging left fewer than 2 usable bins
            set.skipped.push(SkippedFeature {
                name: name.to_string(),
                reason: SkipReason::DegenerateBins,
            });
            continue;
        }
        let fractions = bin_fractions(&values, &edges);
        set.features
            .insert(name.to_string(), FeatureBaseline { edges, fractions });
    }

    // Text-only features are visible to reliability but cannot be binned.
    for name in textual {
        if !set.features.contains_key(name) && !set.skipped.iter().any(|s| s.name == name) {
            set.skipped.push(SkippedFeature {
                name: name.to_string(),
                reason: SkipReason::NonNumeric,
            });
        }
    }
    set.skipped.sort_by(|a, b| a.name.cmp(&b.name));
    set
}

/// Equal-frequency edges: linear-interpolated quantiles at i/bins, with
/// non-increasing duplicates merged so heavy ties collapse bins instead of
/// producing zero-width ones.
fn quantile_edges(sorted: &[f64], bins: usize) -> Vec<f64> {
    let mut edges: Vec<f64> = Vec::with_capacity(bins + 1);
    for i in 0..=bins {
        let q = i as f64 / bins as f64;
        let e = stats::quantile(sorted, q);
        if edges.last().map_or(true, |last| e > *last) {
            edges.push(e);
        }
    }
    edges
}

fn count_distinct_sorted(sorted: &[f64]) -> usize {
    let mut distinct = 0;
    let mut last = None;
    for v in sorted {
        if last.map_or(true, |l: f64| *v != l) {
            distinct += 1;
            last = Some(*v);
        }
    }
    distinct
}

/// Index of the bin holding `v`. Values beyond the outermost edges clamp
/// into the first/last bin.
pub(crate) fn bin_index(v: f64, edges: &[f64]) -> usize {
    let bins = edges.len() - 1;
    let idx = edges.partition_point(|e| *e <= v);
    idx.saturating_sub(1).min(bins - 1)
}

/// Per-bin observation fractions for `values` against `edges`.
pub fn bin_fractions(values: &[f64], edges: &[f64]) -> Vec<f64> {
    let bins = edges.len().saturating_sub(1);
    if bins == 0 || values.is_empty() {
        return vec![0.0; bins];
    }
    let mut counts = vec![0usize; bins];
    for v in values {
        counts[bin_index(*v, edges)] += 1;
    }
    let n = values.len() as f64;
    counts.into_iter().map(|c| c as f64 / n).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{FeatureMap, PredKind};
    use chrono::{TimeZone, Utc};

    fn ev(features: Vec<(&str, FieldValue)>) -> InferenceEvent {
        InferenceEvent {
            ts: Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap(),
            model_id: "m".into(),
            model_version: "v".into(),
            request_id: None,
            pred_kind: PredKind::Classification,
            latency_ms: None,
            features: features
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
            y_pred_num: None,
            y_pred_text: None,
            segment: FeatureMap::new(),
            sanitized: false,
        }
    }

    #[test]
    fn uniform_feature_gets_equal_frequency_bins() {
        let events: Vec<_> = (0..100)
            .map(|i| ev(vec![("x", FieldValue::Num(i as f64 + 0.5))]))
            .collect();
        let set = build_baseline(&events, &EngineConfig::default());

        let fb = set.features.get("x").expect("x tracked");
        assert_eq!(fb.edges.len(), 11);
        assert!((fb.edges[0] - 0.5).abs() < 1e-9);
        assert!((fb.edges[10] - 99.5).abs() < 1e-9);
        assert_eq!(fb.fractions.len(), 10);
        for f in &fb.fractions {
            assert!((f - 0.1).abs() < 1e-9);
        }
        assert!(set.skipped.is_empty());
    }

    #[test]
    fn exclusion_rules_report_instead_of_failing() {
        let mut events = Vec::new();
        for i in 0..100 {
            let mut fields = vec![
                ("steady", FieldValue::Num(7.0)),
                ("spread", FieldValue::Num(i as f64)),
                ("channel", FieldValue::Text("web".into())),
            ];
            // sparse appears in only a fifth of events
            if i % 5 == 0 {
                fields.push(("sparse", FieldValue::Num(i as f64)));
            }
            events.push(ev(fields));
        }
        let set = build_baseline(&events, &EngineConfig::default());

        assert!(set.features.contains_key("spread"));
        assert!(!set.features.contains_key("steady"));
        assert!(!set.features.contains_key("sparse"));
        assert!(!set.features.contains_key("channel"));

        let reason = |name: &str| {
            set.skipped
                .iter()
                .find(|s| s.name == name)
                .map(|s| s.reason)
        };
        assert_eq!(reason("steady"), Some(SkipReason::LowDistinct));
        assert_eq!(reason("sparse"), Some(SkipReason::LowPresence));
        assert_eq!(reason("channel"), Some(SkipReason::NonNumeric));

        // all four names were observed regardless of tracking
        assert!(set.observed.contains("steady"));
        assert!(set.observed.contains("sparse"));
    }

    #[test]
    fn heavy_ties_merge_edges() {
        let mut cfg = EngineConfig::default();
        cfg.min_distinct_values = 2;
        let events: Vec<_> = (0..10)
            .map(|i| {
                let v = if i < 5 { 1.0 } else { 2.0 };
                ev(vec![("x", FieldValue::Num(v))])
            })
            .collect();
        let set = build_baseline(&events, &cfg);

        let fb = set.features.get("x").expect("x tracked");
        assert_eq!(fb.edges, vec![1.0, 1.5, 2.0]);
        assert_eq!(fb.fractions, vec![0.5, 0.5]);
    }

    #[test]
    fn degenerate_bins_when_ties_leave_one_bin() {
        let mut cfg = EngineConfig::default();
        cfg.min_distinct_values = 2;
        // 99 tied values and a single outlier pass the distinct gate but
        // every interior quantile collapses onto the tie.
        let mut events: Vec<_> = (0..99)
            .map(|_| ev(vec![("x", FieldValue::Num(1.0))]))
            .collect();
        events.push(ev(vec![("x", FieldValue::Num(2.0))]));
        let set = build_baseline(&events, &cfg);

        assert!(!set.features.contains_key("x"));
        assert!(set
            .skipped
            .iter()
            .any(|s| s.name == "x" && s.reason == SkipReason::DegenerateBins));
    }

    #[test]
    fn bin_index_clamps_out_of_range_values() {
        let edges = vec![0.0, 1.0, 2.0, 3.0];
        assert_eq!(bin_index(-5.0, &edges), 0);
        assert_eq!(bin_index(0.0, &edges), 0);
        assert_eq!(bin_index(1.5, &edges), 1);
        assert_eq!(bin_index(3.0, &edges), 2);
        assert_eq!(bin_index(99.0, &edges), 2);
    }

    #[test]
    fn empty_window_yields_empty_baseline() {
        let set = build_baseline(&[], &EngineConfig::default());
        assert_eq!(set.n_events, 0);
        assert!(set.features.is_empty());
        assert!(set.observed.is_empty());
    }
}
