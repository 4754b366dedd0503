//! Order statistics shared by the reliability and baseline calculators.

/// Linear-interpolated quantile over an ascending-sorted slice.
/// `q` is clamped to [0, 1]; an empty slice yields 0.0 so callers can gate
/// on sample count instead of unwrapping.
pub fn quantile(sorted: &[f64], q: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    if sorted.len() == 1 {
        return sorted[0];
    }
    let q = q.clamp(0.0, 1.0);
    let pos = q * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    if lo == hi {
        return sorted[lo];
    }
    let frac = pos - lo as f64;
    sorted[lo] + (sorted[hi] - sorted[lo]) * frac
}

/// Sort a sample in place for quantile queries. Inputs are filtered to
/// finite values before this point; the fallback only keeps the comparator
/// total.
pub fn sort_sample(values: &mut [f64]) {
    values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quantile_interpolates_between_ranks() {
        // 100 latencies: 10, 20, ..., 1000.
        let sorted: Vec<f64> = (1..=100).map(|i| (i * 10) as f64).collect();
        // pos = 0.5 * 99 = 49.5 -> halfway between 500 and 510.
        assert!((quantile(&sorted, 0.50) - 505.0).abs() < 1e-9);
        // pos = 0.95 * 99 = 94.05 -> 950 + 0.05 * 10.
        assert!((quantile(&sorted, 0.95) - 950.5).abs() < 1e-9);
    }

    #[test]
    fn quantile_exact_ranks_and_edges() {
        let sorted = vec![1.0, 2.0, 3.0, 4.0, 5.0];
        assert_eq!(quantile(&sorted, 0.0), 1.0);
        assert_eq!(quantile(&sorted, 0.5), 3.0);
        assert_eq!(quantile(&sorted, 1.0), 5.0);
        assert_eq!(quantile(&sorted, 0.25), 2.0);
    }

    #[test]
    fn quantile_degenerate_inputs() {
        assert_eq!(quantile(&[], 0.5), 0.0);
        assert_eq!(quantile(&[42.0], 0.95), 42.0);
    }
}
