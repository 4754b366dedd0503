use std::fmt;

/// Configuration failure (bad YAML, invalid knob, unknown prediction kind in
/// storage). Kept as its own type so callers can map it to a dedicated exit
/// code instead of folding it into infrastructure errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigError(pub String);

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "config error: {}", self.0)
    }
}

impl std::error::Error for ConfigError {}
