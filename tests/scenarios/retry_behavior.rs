//! Test: Per-step retry policies and backoff timing

use crate::helpers::*;
use mlops_pipeline::codec::DataConverter;
use mlops_pipeline::core::{ExecutionStatus, Phase, PipelineError, StepPolicies};
use mlops_pipeline::execution::{ExecutionEvent, PipelineEngine, PipelineHandle};
use mlops_pipeline::persistence::InMemoryPayloadJournal;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Training retries transient faults with capped exponential backoff
#[tokio::test(start_paused = true)]
async fn test_training_backoff_is_capped() {
    let mut engine = engine(
        ScriptedActivities::with_metrics(excellent_metrics())
            .failing(TRAIN, infra_errors(7, "GPU temporarily unavailable")),
    );
    let events = record_events(&mut engine);
    let handle = PipelineHandle::new();
    handle.signal_named("approve_prod_deployment").unwrap();

    let started = Instant::now();
    let result = engine.execute(&handle, trigger()).await.unwrap();

    let expected: Vec<Duration> = [2, 4, 8, 16, 32, 60, 60]
        .into_iter()
        .map(Duration::from_secs)
        .collect();
    assert_eq!(retry_delays(&events.lock().unwrap()), expected);
    assert!(started.elapsed() >= Duration::from_secs(182));

    assert_eq!(engine.activities().count(TRAIN), 8);
    assert_eq!(engine.activities().count(PREPROCESS), 1);
    assert_eq!(result.status, ExecutionStatus::Completed);

    let completed_training = events.lock().unwrap().iter().any(|e| {
        matches!(e, ExecutionEvent::StepCompleted { phase: Phase::Training, attempts: 8 })
    });
    assert!(completed_training);
}

/// Experiment logging keeps retrying while the store is down
#[tokio::test(start_paused = true)]
async fn test_experiment_logging_survives_outage() {
    let engine = engine(
        ScriptedActivities::with_metrics(metrics(0.83, 2.0, 0.75))
            .failing(LOG_EXPERIMENT, infra_errors(12, "connection refused")),
    );

    let result = engine.run(trigger()).await.unwrap();

    assert_eq!(engine.activities().count(LOG_EXPERIMENT), 13);
    assert_eq!(result.experiment.experiment_id, 1);
    assert_eq!(result.deployment.environment, "dev_only");
}

/// Preprocessing gives up after its bounded attempts
#[tokio::test(start_paused = true)]
async fn test_preprocessing_bounded_retries() {
    let engine = engine(
        ScriptedActivities::with_metrics(excellent_metrics())
            .failing(PREPROCESS, infra_errors(3, "disk busy")),
    );
    let handle = PipelineHandle::new();

    let err = engine.execute(&handle, trigger()).await.unwrap_err();

    assert!(matches!(
        err,
        PipelineError::RetriesExhausted { phase: Phase::Preprocessing, attempts: 3, .. }
    ));
    assert_eq!(engine.activities().count(PREPROCESS), 3);
    assert_eq!(engine.activities().count(TRAIN), 0);

    let snapshot = handle.status();
    assert_eq!(snapshot.status, ExecutionStatus::Failed);
    assert_eq!(snapshot.current_step, "preprocessing");
    assert!(snapshot
        .failure_reason
        .unwrap()
        .starts_with("retries_exhausted after 3 attempts"));
}

/// A transient dev deployment fault is retried and the run carries on
#[tokio::test(start_paused = true)]
async fn test_dev_deployment_recovers() {
    let engine = engine(
        ScriptedActivities::with_metrics(metrics(0.83, 2.0, 0.75))
            .failing(DEPLOY_DEV, vec![infra("Deployment service temporarily unavailable")]),
    );

    let result = engine.run(trigger()).await.unwrap();

    assert_eq!(engine.activities().count(DEPLOY_DEV), 2);
    assert_eq!(result.deployment.environment, "dev_only");
}

/// A step that outlives its time limit is retried like a transient fault
#[tokio::test(start_paused = true)]
async fn test_step_timeout_is_retried() {
    let mut policies = StepPolicies::default();
    policies.training.max_duration = Duration::from_secs(5);

    let activities = ScriptedActivities::with_metrics(metrics(0.83, 2.0, 0.75))
        .with_training_delay(Duration::from_secs(30));
    let mut engine = PipelineEngine::new(
        activities,
        policies,
        DataConverter::plain(),
        Arc::new(InMemoryPayloadJournal::new()),
    );
    let events = record_events(&mut engine);
    let handle = PipelineHandle::new();

    let run = tokio::spawn({
        let handle = handle.clone();
        async move { engine.execute(&handle, trigger()).await }
    });

    // Every attempt times out; the unbounded policy keeps trying
    tokio::time::sleep(Duration::from_secs(120)).await;
    assert!(!run.is_finished());
    assert_eq!(handle.status().current_step, "training");

    let timeouts = events
        .lock()
        .unwrap()
        .iter()
        .filter(|e| {
            matches!(e, ExecutionEvent::StepRetrying { error, .. } if error.starts_with("Timeout"))
        })
        .count();
    assert!(timeouts >= 3);
    run.abort();
}
