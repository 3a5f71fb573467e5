//! Test: Quality gate and the dev/prod promotion decision

use crate::helpers::*;
use mlops_pipeline::core::{
    DeploymentStatus, ExecutionStatus, Phase, StepResult, ACCURACY_CHECK, MAE_CHECK, R2_CHECK,
};
use mlops_pipeline::execution::{ExecutionEvent, PipelineHandle};

/// A failed gate records one skipped deployment and never deploys
#[tokio::test(start_paused = true)]
async fn test_failed_gate_skips_deployment() {
    let engine = engine(ScriptedActivities::with_metrics(metrics(0.79, 2.0, 0.75)));
    let handle = PipelineHandle::new();

    let result = engine.execute(&handle, trigger()).await.unwrap();

    assert!(!result.quality.passed);
    assert_eq!(result.quality.failed_checks(), vec![ACCURACY_CHECK]);
    assert_eq!(result.deployment.environment, "none");
    assert!(!result.deployment.success);
    assert_eq!(result.deployment.reason.as_deref(), Some("quality_gate_failed"));
    assert_eq!(result.deployment_status, DeploymentStatus::Skipped);
    assert_eq!(result.status, ExecutionStatus::Completed);

    assert_eq!(engine.activities().count(DEPLOY_DEV), 0);
    assert_eq!(engine.activities().count(DEPLOY_PROD), 0);

    let state = handle.state();
    let deployments: Vec<_> = state
        .step_results()
        .iter()
        .filter_map(|r| r.result.as_deployment())
        .collect();
    assert_eq!(deployments.len(), 1);

    let snapshot = handle.status();
    assert!(snapshot.quality_gate_failed);
    assert_eq!(snapshot.current_step, "completed");
    assert_eq!(snapshot.deployment_status, "skipped");
    assert_eq!(snapshot.failure_reason.as_deref(), Some("quality_gate_failed"));
    assert_completed_steps(
        &snapshot,
        &[
            "preprocessing",
            "training",
            "experiment_logging",
            "quality_assessment",
            "deployment_skipped",
        ],
    );
}

/// Metrics exactly at the thresholds pass, but 0.80 is not enough to promote
#[tokio::test(start_paused = true)]
async fn test_boundary_metrics_pass_and_stay_in_dev() {
    let engine = engine(ScriptedActivities::with_metrics(metrics(0.80, 2.5, 0.70)));

    let result = engine.run(trigger()).await.unwrap();

    assert!(result.quality.passed);
    assert!(result.quality.checks[ACCURACY_CHECK]);
    assert!(result.quality.checks[MAE_CHECK]);
    assert!(result.quality.checks[R2_CHECK]);
    assert_eq!(result.deployment.environment, "dev_only");
    assert!(result.deployment.success);
    assert_eq!(result.deployment_status, DeploymentStatus::DevDeployed);
}

/// Passing the gate below the promotion threshold ends in dev without suspending
#[tokio::test(start_paused = true)]
async fn test_non_promotion_never_awaits_approval() {
    let mut engine = engine(ScriptedActivities::with_metrics(metrics(0.83, 2.0, 0.75)));
    let events = record_events(&mut engine);
    let handle = PipelineHandle::new();

    let result = engine.execute(&handle, trigger()).await.unwrap();

    assert_eq!(result.deployment.environment, "dev_only");
    assert_eq!(engine.activities().count(DEPLOY_DEV), 1);
    assert_eq!(engine.activities().count(DEPLOY_PROD), 0);
    assert!(!events
        .lock()
        .unwrap()
        .iter()
        .any(|e| matches!(e, ExecutionEvent::AwaitingApproval { .. })));

    let snapshot = handle.status();
    assert!(!snapshot.awaiting_approval);
    assert_eq!(snapshot.deployment_status, "dev_deployed");
    assert!(matches!(
        handle.state().result_for(Phase::DevDeployment),
        Some(StepResult::Deployment(d)) if d.environment == "dev"
    ));
}

/// The dev-only outcome lands in the audit log after the dev deployment
#[tokio::test(start_paused = true)]
async fn test_dev_only_outcome_is_recorded() {
    let engine = engine(ScriptedActivities::with_metrics(metrics(0.83, 2.0, 0.75)));
    let handle = PipelineHandle::new();

    let result = engine.execute(&handle, trigger()).await.unwrap();

    let state = handle.state();
    let outcome = state
        .result_for(Phase::Completed)
        .and_then(StepResult::as_deployment)
        .unwrap();
    assert_eq!(outcome, &result.deployment);
    assert_eq!(outcome.environment, "dev_only");
    assert!(outcome.success);

    assert_completed_steps(
        &handle.status(),
        &[
            "preprocessing",
            "training",
            "experiment_logging",
            "quality_assessment",
            "dev_deployment",
            "completed",
        ],
    );
}

/// Quality metrics are visible to status queries once assessed
#[tokio::test(start_paused = true)]
async fn test_status_reports_quality_metrics() {
    let engine = engine(ScriptedActivities::with_metrics(metrics(0.79, 2.0, 0.75)));
    let handle = PipelineHandle::new();
    assert!(handle.status().quality_metrics.is_none());

    engine.execute(&handle, trigger()).await.unwrap();

    let reported = handle.status().quality_metrics.unwrap();
    assert_eq!(reported.accuracy, 0.79);
    assert_eq!(reported.training_samples, 4177);
}
