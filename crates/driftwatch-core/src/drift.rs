use crate::baseline::{bin_fractions, BaselineSet};
use crate::config::EngineConfig;
use crate::model::{psi_metric_name, FieldValue, InferenceEvent, MetricRecord};

/// Population stability index between two binned distributions:
/// sum over bins of (cur - base) * ln(cur / base).
/// An exactly-zero fraction on either side is replaced by `floor` before the
/// ratio and log, so a vanished or brand-new bin contributes a large finite
/// term instead of an infinite one.
pub fn psi(base_fracs: &[f64], cur_fracs: &[f64], floor: f64) -> f64 {
    debug_assert_eq!(base_fracs.len(), cur_fracs.len());
    let mut total = 0.0;
    for (b, c) in base_fracs.iter().zip(cur_fracs.iter()) {
        let b = if *b == 0.0 { floor } else { *b };
        let c = if *c == 0.0 { floor } else { *c };
        total += (c - b) * (c / b).ln();
    }
    total
}

/// One psi__<feature> metric per tracked feature with at least one numeric
/// observation on the day. A tracked feature with no observations emits
/// nothing here; its missing rate of 1.0 is the reliability signal for that
/// condition.
pub fn compute(
    events: &[InferenceEvent],
    baseline: &BaselineSet,
    cfg: &EngineConfig,
) -> Vec<MetricRecord> {
    let mut out = Vec::new();
    for (name, fb) in &baseline.features {
        let values: Vec<f64> = events
            .iter()
            .filter_map(|ev| ev.features.get(name).and_then(FieldValue::as_num))
            .filter(|v| v.is_finite())
            .collect();
        if values.is_empty() {
            tracing::debug!(feature = %name, "no numeric observations today, psi skipped");
            continue;
        }
        let cur = bin_fractions(&values, &fb.edges);
        out.push(MetricRecord::new(
            psi_metric_name(name),
            psi(&fb.fractions, &cur, cfg.smoothing_floor),
        ));
    }
    out
}
