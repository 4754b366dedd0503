//! Delayed-label behavior through the full engine: late labels fold into
//! the same day's rows on re-run, duplicates resolve to the earliest label,
//! and orphans never fail a run.

use anyhow::Result;
use chrono::{DateTime, Days, NaiveDate, TimeZone, Utc};
use driftwatch_core::config::EngineConfig;
use driftwatch_core::engine::{Engine, RunStatus};
use driftwatch_core::model::{FieldValue, ModelKey, PredKind};
use driftwatch_core::recorder::{InferenceRecord, LabelRecord, Recorder};
use driftwatch_core::storage::Store;
use std::collections::BTreeMap;

fn day(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

fn at(d: NaiveDate, hour: u32, minute: u32) -> DateTime<Utc> {
    Utc.from_utc_datetime(&d.and_hms_opt(hour, minute, 0).unwrap())
}

fn positive_class_config() -> EngineConfig {
    let mut cfg = EngineConfig::default();
    cfg.positive_class = Some("1".to_string());
    cfg
}

/// 100 classification events: the first half predicted positive, the rest
/// negative, each with a distinct numeric feature so the baseline tracks it.
fn seed_events(rec: &Recorder, d: NaiveDate) -> Result<()> {
    for i in 0..100 {
        let mut inf = InferenceRecord::new("fraud", "v1", PredKind::Classification);
        inf.ts = Some(at(d, 1 + (i as u32 % 20), i as u32 % 60));
        inf.request_id = Some(format!("r-{:03}", i));
        inf.latency_ms = Some(5 + i as i64);
        inf.features
            .insert("amount".to_string(), FieldValue::Num(i as f64));
        inf.y_pred_num = Some(if i < 50 { 0.9 } else { 0.1 });
        rec.log_inference(inf)?;
    }
    Ok(())
}

fn label(rec: &Recorder, ts: DateTime<Utc>, request_id: &str, truth: f64) -> Result<()> {
    let mut lab = LabelRecord::new("fraud", request_id);
    lab.ts_label = Some(ts);
    lab.y_true_num = Some(truth);
    rec.log_label(lab)?;
    Ok(())
}

fn metric_map(store: &Store, key: &ModelKey, d: NaiveDate) -> Result<BTreeMap<String, f64>> {
    Ok(store
        .daily_metrics(key, d)?
        .into_iter()
        .map(|m| (m.name, m.value))
        .collect())
}

#[test]
fn late_labels_converge_to_a_full_recompute() -> Result<()> {
    let d = day("2026-03-10");
    let key = ModelKey::new("fraud", "v1");

    // Database 1: labels arrive in two waves with a run in between.
    let store = Store::memory()?;
    store.init_schema()?;
    let rec = Recorder::new(store.clone());
    seed_events(&rec, d)?;
    for i in 0..60 {
        let truth = if i < 50 { 1.0 } else { 0.0 };
        label(&rec, at(d, 22, i as u32 % 60), &format!("r-{:03}", i), truth)?;
    }

    let engine = Engine::new(store.clone(), positive_class_config());
    let first = engine.run_model_day(&key, d)?;
    assert_eq!(first.status, RunStatus::Completed);

    let partial = metric_map(&store, &key, d)?;
    assert_eq!(partial["n_labeled"], 60.0);
    assert_eq!(partial["n_duplicate_labels"], 0.0);
    assert_eq!(partial["accuracy"], 1.0);
    assert_eq!(partial["error_rate"], 0.0);
    assert_eq!(partial["precision"], 1.0);
    assert_eq!(partial["recall"], 1.0);
    assert_eq!(partial["f1"], 1.0);

    // The remaining truth lands three days later, all contradicting the
    // negative predictions.
    let late = d.checked_add_days(Days::new(3)).unwrap();
    for i in 60..100 {
        label(&rec, at(late, 8, i as u32 % 60), &format!("r-{:03}", i), 1.0)?;
    }
    engine.run_model_day(&key, d)?;
    let updated = metric_map(&store, &key, d)?;
    assert_eq!(updated["n_labeled"], 100.0);
    assert_eq!(updated["accuracy"], 0.6);
    assert_eq!(updated["error_rate"], 1.0 - 0.6);
    assert_eq!(updated["precision"], 1.0);
    assert_eq!(updated["recall"], 50.0 / 90.0);
    assert!((updated["f1"] - 5.0 / 7.0).abs() < 1e-12);

    // Database 2: identical events with every label present up front must
    // produce exactly the rows the re-run converged to.
    let fresh = Store::memory()?;
    fresh.init_schema()?;
    let fresh_rec = Recorder::new(fresh.clone());
    seed_events(&fresh_rec, d)?;
    for i in 0..60 {
        let truth = if i < 50 { 1.0 } else { 0.0 };
        label(&fresh_rec, at(d, 22, i as u32 % 60), &format!("r-{:03}", i), truth)?;
    }
    for i in 60..100 {
        label(&fresh_rec, at(late, 8, i as u32 % 60), &format!("r-{:03}", i), 1.0)?;
    }
    Engine::new(fresh.clone(), positive_class_config()).run_model_day(&key, d)?;

    assert_eq!(metric_map(&fresh, &key, d)?, updated);
    Ok(())
}

#[test]
fn duplicate_labels_resolve_to_the_earliest_and_are_counted() -> Result<()> {
    let d = day("2026-03-10");
    let key = ModelKey::new("fraud", "v1");
    let store = Store::memory()?;
    store.init_schema()?;
    let rec = Recorder::new(store.clone());

    for (i, rid) in ["r-a", "r-b", "r-c"].iter().enumerate() {
        let mut inf = InferenceRecord::new("fraud", "v1", PredKind::Classification);
        inf.ts = Some(at(d, 9, i as u32));
        inf.request_id = Some(rid.to_string());
        inf.features
            .insert("amount".to_string(), FieldValue::Num(i as f64 * 10.0));
        inf.y_pred_num = Some(if *rid == "r-a" { 0.9 } else { 0.1 });
        rec.log_inference(inf)?;
    }

    // r-a: the later-timestamped contradiction arrives first, then the
    // earlier truth. The earlier one must win the join.
    label(&rec, at(d, 12, 0), "r-a", 0.0)?;
    label(&rec, at(d, 10, 0), "r-a", 1.0)?;
    // r-b: same timestamp twice, first insertion wins.
    label(&rec, at(d, 11, 0), "r-b", 0.0)?;
    label(&rec, at(d, 11, 0), "r-b", 1.0)?;

    let engine = Engine::new(store.clone(), EngineConfig::default());
    let outcome = engine.run_model_day(&key, d)?;
    assert_eq!(outcome.status, RunStatus::Completed);

    let metrics = metric_map(&store, &key, d)?;
    assert_eq!(metrics["n_labeled"], 2.0);
    assert_eq!(metrics["n_duplicate_labels"], 2.0);
    // r-a predicted 1 with chosen truth 1, r-b predicted 0 with chosen
    // truth 0. Any other winner would drag accuracy below 1.
    assert_eq!(metrics["accuracy"], 1.0);
    Ok(())
}

#[test]
fn orphan_labels_are_ignored() -> Result<()> {
    let d = day("2026-03-10");
    let key = ModelKey::new("fraud", "v1");
    let store = Store::memory()?;
    store.init_schema()?;
    let rec = Recorder::new(store.clone());

    for (i, rid) in ["r-1", "r-2"].iter().enumerate() {
        let mut inf = InferenceRecord::new("fraud", "v1", PredKind::Classification);
        inf.ts = Some(at(d, 9, i as u32));
        inf.request_id = Some(rid.to_string());
        inf.features
            .insert("amount".to_string(), FieldValue::Num(i as f64));
        inf.y_pred_num = Some(0.9);
        rec.log_inference(inf)?;
    }
    label(&rec, at(d, 14, 0), "r-1", 1.0)?;
    label(&rec, at(d, 14, 5), "r-2", 1.0)?;
    // Never served, and served by a different model respectively.
    label(&rec, at(d, 14, 10), "ghost", 1.0)?;
    {
        let mut lab = LabelRecord::new("other-model", "r-1");
        lab.ts_label = Some(at(d, 14, 15));
        lab.y_true_num = Some(0.0);
        rec.log_label(lab)?;
    }

    let engine = Engine::new(store.clone(), EngineConfig::default());
    let outcome = engine.run_model_day(&key, d)?;
    assert_eq!(outcome.status, RunStatus::Completed);

    let metrics = metric_map(&store, &key, d)?;
    assert_eq!(metrics["n_labeled"], 2.0);
    assert_eq!(metrics["n_duplicate_labels"], 0.0);
    assert_eq!(metrics["accuracy"], 1.0);
    Ok(())
}
