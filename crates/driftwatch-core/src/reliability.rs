use crate::baseline::BaselineSet;
use crate::model::{
    missing_rate_metric_name, FieldValue, InferenceEvent, MetricRecord, METRIC_N_EVENTS,
    METRIC_N_UNBASELINED_FEATURES, METRIC_P50_LATENCY_MS, METRIC_P95_LATENCY_MS,
    METRIC_SANITIZED_RATE,
};
use crate::stats;
use std::collections::BTreeSet;

/// Volume and data-quality metrics from the day's raw events alone. A day
/// with zero events emits only n_events = 0; every rate below divides by the
/// event count, which is nonzero past that gate.
pub fn compute(events: &[InferenceEvent], baseline: &BaselineSet) -> Vec<MetricRecord> {
    let mut out = vec![MetricRecord::new(METRIC_N_EVENTS, events.len() as f64)];
    if events.is_empty() {
        return out;
    }
    let n = events.len() as f64;

    let mut latencies: Vec<f64> = events
        .iter()
        .filter_map(|ev| ev.latency_ms.map(|v| v as f64))
        .collect();
    if !latencies.is_empty() {
        stats::sort_sample(&mut latencies);
        out.push(MetricRecord::new(
            METRIC_P50_LATENCY_MS,
            stats::quantile(&latencies, 0.50),
        ));
        out.push(MetricRecord::new(
            METRIC_P95_LATENCY_MS,
            stats::quantile(&latencies, 0.95),
        ));
    }

    let sanitized = events.iter().filter(|ev| ev.sanitized).count();
    out.push(MetricRecord::new(METRIC_SANITIZED_RATE, sanitized as f64 / n));

    // Missing rates cover the union of baseline-observed and day-observed
    // feature names, so a feature that vanished today still reports.
    let mut universe: BTreeSet<&str> = baseline.observed.iter().map(|s| s.as_str()).collect();
    let mut day_observed: BTreeSet<&str> = BTreeSet::new();
    for ev in events {
        for (name, value) in &ev.features {
            universe.insert(name);
            if !value.is_absent() {
                day_observed.insert(name);
            }
        }
    }
    for name in &universe {
        let missing = events
            .iter()
            .filter(|ev| ev.features.get(*name).map_or(true, FieldValue::is_absent))
            .count();
        out.push(MetricRecord::new(
            missing_rate_metric_name(name),
            missing as f64 / n,
        ));
    }

    // Features never seen in the baseline window cannot drift-score; count
    // them so a schema change is visible the day it lands.
    if baseline.n_events > 0 {
        let mut unbaselined = 0usize;
        for name in &day_observed {
            if !baseline.observed.contains(*name) {
                unbaselined += 1;
            }
        }
        out.push(MetricRecord::new(
            METRIC_N_UNBASELINED_FEATURES,
            unbaselined as f64,
        ));
    }

    out
}
