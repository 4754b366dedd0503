use crate::baseline::build_baseline;
use crate::config::EngineConfig;
use crate::model::{InferenceEvent, MetricRecord, ModelKey, METRIC_N_EVENTS};
use crate::storage::Store;
use crate::{drift, performance, reliability};
use anyhow::Context;
use chrono::{Days, NaiveDate};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::Semaphore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Completed,
    Failed,
}

/// Per-model row of a day run. Failures land here as data, never as a
/// propagated error, so sibling models keep running.
#[derive(Debug, Clone, Serialize)]
pub struct ModelDayOutcome {
    pub model_id: String,
    pub model_version: String,
    pub day: NaiveDate,
    pub status: RunStatus,
    pub message: String,
    pub metrics_written: usize,
    pub n_events: usize,
    pub skipped_features: Vec<String>,
}

impl ModelDayOutcome {
    fn failed(key: &ModelKey, day: NaiveDate, message: String) -> Self {
        Self {
            model_id: key.model_id.clone(),
            model_version: key.model_version.clone(),
            day,
            status: RunStatus::Failed,
            message,
            metrics_written: 0,
            n_events: 0,
            skipped_features: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DayArtifacts {
    pub day: NaiveDate,
    pub outcomes: Vec<ModelDayOutcome>,
}

/// In-memory result of one (model, version, day) computation, before any
/// write happens.
#[derive(Debug)]
pub struct ModelDayMetrics {
    pub metrics: Vec<MetricRecord>,
    pub n_events: usize,
    pub skipped_features: Vec<String>,
}

#[derive(Clone)]
pub struct Engine {
    pub store: Store,
    pub config: EngineConfig,
}

impl Engine {
    pub fn new(store: Store, config: EngineConfig) -> Self {
        Self { store, config }
    }

    /// Full pipeline for one (model, version, day): baseline, drift,
    /// reliability, label join, performance. Reads only; the caller decides
    /// whether the result is written.
    pub fn compute_model_day(
        &self,
        key: &ModelKey,
        day: NaiveDate,
    ) -> anyhow::Result<ModelDayMetrics> {
        let events = self
            .store
            .inference_events_on(key, day)
            .with_context(|| format!("loading {} events for {}", key, day))?;

        if events.is_empty() {
            tracing::info!(model = %key, %day, "no events, writing n_events=0 only");
            return Ok(ModelDayMetrics {
                metrics: vec![MetricRecord::new(METRIC_N_EVENTS, 0.0)],
                n_events: 0,
                skipped_features: Vec::new(),
            });
        }

        let baseline_events = self.baseline_events(key)?;
        let baseline = build_baseline(&baseline_events, &self.config);
        for skip in &baseline.skipped {
            tracing::debug!(
                model = %key,
                feature = %skip.name,
                reason = skip.reason.as_str(),
                "feature excluded from drift"
            );
        }

        let mut metrics = reliability::compute(&events, &baseline);
        metrics.extend(drift::compute(&events, &baseline, &self.config));

        let request_ids: Vec<String> = events
            .iter()
            .filter_map(|ev| ev.request_id.clone())
            .collect();
        let labels = self
            .store
            .labels_for_requests(&key.model_id, &request_ids)
            .with_context(|| format!("loading labels for {}", key))?;
        metrics.extend(performance::compute(&events, &labels, &self.config));

        Ok(ModelDayMetrics {
            n_events: events.len(),
            skipped_features: baseline.skipped.iter().map(|s| s.name.clone()).collect(),
            metrics,
        })
    }

    /// Baseline window: the first `baseline_days` days from the model's
    /// earliest stored event. Early in a model's life this can include the
    /// target day itself.
    fn baseline_events(&self, key: &ModelKey) -> anyhow::Result<Vec<InferenceEvent>> {
        let first = match self.store.earliest_event_day(key)? {
            Some(d) => d,
            None => return Ok(Vec::new()),
        };
        let end = first
            .checked_add_days(Days::new(u64::from(self.config.baseline_days)))
            .with_context(|| format!("baseline window end overflows past {}", first))?;
        self.store.inference_events_between(key, first, end)
    }

    /// Compute fully in memory, then write in one transaction. Re-running
    /// with unchanged events rewrites the same rows.
    pub fn run_model_day(&self, key: &ModelKey, day: NaiveDate) -> anyhow::Result<ModelDayOutcome> {
        self.config.validate()?;
        let computed = self.compute_model_day(key, day)?;
        let written = self
            .store
            .upsert_daily_metrics(key, day, &computed.metrics)
            .with_context(|| format!("writing metrics for {} on {}", key, day))?;
        tracing::info!(
            model = %key,
            %day,
            metrics = written,
            events = computed.n_events,
            "model day computed"
        );
        Ok(ModelDayOutcome {
            model_id: key.model_id.clone(),
            model_version: key.model_version.clone(),
            day,
            status: RunStatus::Completed,
            message: String::new(),
            metrics_written: written,
            n_events: computed.n_events,
            skipped_features: computed.skipped_features,
        })
    }

    /// One day across every model/version active on it.
    pub async fn run_day(&self, day: NaiveDate) -> anyhow::Result<DayArtifacts> {
        self.config.validate()?;
        let models = self.store.models_active_on(day)?;
        tracing::info!(%day, models = models.len(), "starting day run");
        self.run_models(day, models).await
    }

    /// Exactly the given triple, whether or not it saw events. This is the
    /// path that writes n_events=0 for a silent day.
    pub async fn run_model(&self, key: &ModelKey, day: NaiveDate) -> anyhow::Result<DayArtifacts> {
        self.config.validate()?;
        self.run_models(day, vec![key.clone()]).await
    }

    /// Inclusive backfill over [from, to].
    pub async fn run_range(
        &self,
        from: NaiveDate,
        to: NaiveDate,
    ) -> anyhow::Result<Vec<DayArtifacts>> {
        let mut out = Vec::new();
        let mut day = from;
        while day <= to {
            out.push(self.run_day(day).await?);
            day = day.succ_opt().context("backfill day overflow")?;
        }
        Ok(out)
    }

    async fn run_models(
        &self,
        day: NaiveDate,
        models: Vec<ModelKey>,
    ) -> anyhow::Result<DayArtifacts> {
        let sem = Arc::new(Semaphore::new(self.config.parallel.max(1)));
        let mut handles = Vec::new();
        for key in models {
            let permit = sem.clone().acquire_owned().await?;
            let this = self.clone();
            let h = tokio::spawn(async move {
                let _permit = permit;
                let outcome = this.run_model_day(&key, day);
                (key, outcome)
            });
            handles.push(h);
        }

        let mut outcomes = Vec::new();
        for h in handles {
            let outcome = match h.await {
                Ok((_, Ok(outcome))) => outcome,
                Ok((key, Err(e))) => {
                    let message = format!("{:#}", e);
                    tracing::warn!(model = %key, %day, error = %message, "model day failed");
                    ModelDayOutcome::failed(&key, day, message)
                }
                Err(e) => ModelDayOutcome::failed(
                    &ModelKey::new("unknown", "unknown"),
                    day,
                    format!("join error: {}", e),
                ),
            };
            outcomes.push(outcome);
        }
        Ok(DayArtifacts { day, outcomes })
    }
}
