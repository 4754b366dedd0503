use crate::errors::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const SUPPORTED_CONFIG_VERSION: u32 = 1;

pub const DEFAULT_BASELINE_DAYS: u32 = 14;
pub const DEFAULT_PSI_BINS: usize = 10;
/// Substituted for an exactly-zero bin fraction before the PSI ratio/log.
pub const DEFAULT_SMOOTHING_FLOOR: f64 = 1e-4;
pub const DEFAULT_MIN_DISTINCT_VALUES: usize = 5;
pub const DEFAULT_MIN_FEATURE_PRESENCE: f64 = 0.5;
pub const DEFAULT_CLASS_THRESHOLD: f64 = 0.5;
pub const DEFAULT_PARALLEL: usize = 4;

/// Engine knobs. Every calculator receives this explicitly; nothing reads
/// configuration ambiently.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default = "default_version")]
    pub version: u32,

    /// Baseline window length: the first N days of a model/version's events.
    #[serde(default = "default_baseline_days")]
    pub baseline_days: u32,

    /// Equal-frequency bins for PSI.
    #[serde(default = "default_psi_bins")]
    pub psi_bins: usize,

    /// Zero-count smoothing floor for PSI fractions.
    #[serde(default = "default_smoothing_floor")]
    pub smoothing_floor: f64,

    /// Features with fewer distinct baseline values are excluded from drift.
    #[serde(default = "default_min_distinct_values")]
    pub min_distinct_values: usize,

    /// Features numerically present in less than this fraction of baseline
    /// events are excluded from drift.
    #[serde(default = "default_min_feature_presence")]
    pub min_feature_presence: f64,

    /// Numeric classification outputs at or above this score read as the
    /// positive class when no textual label is recorded.
    #[serde(default = "default_class_threshold")]
    pub class_threshold: f64,

    /// Positive class label for precision/recall/f1. Unset disables those
    /// three metrics.
    #[serde(default)]
    pub positive_class: Option<String>,

    /// Model/version pairs computed concurrently within one day run.
    #[serde(default = "default_parallel")]
    pub parallel: usize,
}

fn default_version() -> u32 {
    SUPPORTED_CONFIG_VERSION
}
fn default_baseline_days() -> u32 {
    DEFAULT_BASELINE_DAYS
}
fn default_psi_bins() -> usize {
    DEFAULT_PSI_BINS
}
fn default_smoothing_floor() -> f64 {
    DEFAULT_SMOOTHING_FLOOR
}
fn default_min_distinct_values() -> usize {
    DEFAULT_MIN_DISTINCT_VALUES
}
fn default_min_feature_presence() -> f64 {
    DEFAULT_MIN_FEATURE_PRESENCE
}
fn default_class_threshold() -> f64 {
    DEFAULT_CLASS_THRESHOLD
}
fn default_parallel() -> usize {
    DEFAULT_PARALLEL
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            version: default_version(),
            baseline_days: default_baseline_days(),
            psi_bins: default_psi_bins(),
            smoothing_floor: default_smoothing_floor(),
            min_distinct_values: default_min_distinct_values(),
            min_feature_presence: default_min_feature_presence(),
            class_threshold: default_class_threshold(),
            positive_class: None,
            parallel: default_parallel(),
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.baseline_days == 0 {
            return Err(ConfigError("baseline_days must be at least 1".into()));
        }
        if self.psi_bins < 2 {
            return Err(ConfigError("psi_bins must be at least 2".into()));
        }
        if !self.smoothing_floor.is_finite() || self.smoothing_floor <= 0.0 {
            return Err(ConfigError(
                "smoothing_floor must be a positive finite value".into(),
            ));
        }
        if self.min_distinct_values < 2 {
            return Err(ConfigError("min_distinct_values must be at least 2".into()));
        }
        if !(0.0..=1.0).contains(&self.min_feature_presence) {
            return Err(ConfigError(
                "min_feature_presence must be within [0, 1]".into(),
            ));
        }
        if !self.class_threshold.is_finite() {
            return Err(ConfigError("class_threshold must be finite".into()));
        }
        if self.parallel == 0 {
            return Err(ConfigError("parallel must be at least 1".into()));
        }
        Ok(())
    }
}

pub fn load_config(path: &Path) -> Result<EngineConfig, ConfigError> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| ConfigError(format!("failed to read config {}: {}", path.display(), e)))?;
    let cfg: EngineConfig = serde_yaml::from_str(&raw)
        .map_err(|e| ConfigError(format!("failed to parse YAML: {}", e)))?;
    if cfg.version != SUPPORTED_CONFIG_VERSION {
        return Err(ConfigError(format!(
            "unsupported config version {} (supported: {})",
            cfg.version, SUPPORTED_CONFIG_VERSION
        )));
    }
    cfg.validate()?;
    Ok(cfg)
}

pub fn write_sample_config(path: &Path) -> Result<(), ConfigError> {
    std::fs::write(path, include_str!("../../../driftwatch.yaml"))
        .map_err(|e| ConfigError(format!("failed to write sample config: {}", e)))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_constants() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.baseline_days, 14);
        assert_eq!(cfg.psi_bins, 10);
        assert_eq!(cfg.smoothing_floor, 1e-4);
        assert_eq!(cfg.min_distinct_values, 5);
        assert_eq!(cfg.min_feature_presence, 0.5);
        assert_eq!(cfg.class_threshold, 0.5);
        assert!(cfg.positive_class.is_none());
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn partial_yaml_fills_defaults() {
        let cfg: EngineConfig =
            serde_yaml::from_str("version: 1\npsi_bins: 20\npositive_class: \"1\"\n").unwrap();
        assert_eq!(cfg.psi_bins, 20);
        assert_eq!(cfg.baseline_days, 14);
        assert_eq!(cfg.positive_class.as_deref(), Some("1"));
    }

    #[test]
    fn rejects_unsupported_version() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("driftwatch.yaml");
        std::fs::write(&path, "version: 9\n").unwrap();
        let err = load_config(&path).unwrap_err();
        assert!(err.to_string().contains("unsupported config version"));
    }

    #[test]
    fn rejects_invalid_knobs() {
        let mut cfg = EngineConfig::default();
        cfg.psi_bins = 1;
        assert!(cfg.validate().is_err());

        let mut cfg = EngineConfig::default();
        cfg.smoothing_floor = 0.0;
        assert!(cfg.validate().is_err());

        let mut cfg = EngineConfig::default();
        cfg.min_feature_presence = 1.5;
        assert!(cfg.validate().is_err());

        let mut cfg = EngineConfig::default();
        cfg.parallel = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn sample_config_loads_clean() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("driftwatch.yaml");
        write_sample_config(&path).unwrap();
        let cfg = load_config(&path).unwrap();
        assert_eq!(cfg.version, SUPPORTED_CONFIG_VERSION);
    }
}
