pub mod job;

pub use job::{DayArtifacts, Engine, ModelDayMetrics, ModelDayOutcome, RunStatus};
