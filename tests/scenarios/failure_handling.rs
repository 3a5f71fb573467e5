//! Test: Fatal step failures and prod deployment failure outcomes

use crate::helpers::*;
use mlops_pipeline::core::{
    DeploymentStatus, ExecutionStatus, Phase, PipelineError, StepError, StepResult,
};
use mlops_pipeline::execution::{ExecutionEvent, PipelineHandle};

/// Bad input data fails the run on the first attempt
#[tokio::test(start_paused = true)]
async fn test_validation_error_is_fatal() {
    let mut engine = engine(
        ScriptedActivities::with_metrics(excellent_metrics()).failing(
            PREPROCESS,
            vec![StepError::Validation(
                "Insufficient training data: 12 samples (minimum 20)".to_string(),
            )],
        ),
    );
    let events = record_events(&mut engine);
    let handle = PipelineHandle::new();

    let err = engine.execute(&handle, trigger()).await.unwrap_err();
    assert!(matches!(
        err,
        PipelineError::StepFailed { phase: Phase::Preprocessing, .. }
    ));
    assert_eq!(engine.activities().calls(), vec![PREPROCESS]);

    let snapshot = handle.status();
    assert_eq!(snapshot.status, ExecutionStatus::Failed);
    assert_eq!(snapshot.current_step, "preprocessing");
    assert_eq!(snapshot.deployment_status, "failed");
    assert!(snapshot.completed_steps.is_empty());
    let reason = snapshot.failure_reason.unwrap();
    assert!(reason.starts_with("ValidationError"));
    assert!(reason.contains("Insufficient training data"));

    let events = events.lock().unwrap();
    assert!(events.iter().any(|e| matches!(
        e,
        ExecutionEvent::StepFailed { phase: Phase::Preprocessing, .. }
    )));
    assert!(matches!(
        events.last(),
        Some(ExecutionEvent::RunCompleted {
            status: ExecutionStatus::Failed,
            deployment_status: DeploymentStatus::Failed,
            ..
        })
    ));
    assert!(!events
        .iter()
        .any(|e| matches!(e, ExecutionEvent::StepRetrying { .. })));
}

/// Dev deployment that keeps failing exhausts its attempts and fails the run
#[tokio::test(start_paused = true)]
async fn test_dev_deployment_exhaustion_fails_run() {
    let engine = engine(
        ScriptedActivities::with_metrics(excellent_metrics())
            .failing(DEPLOY_DEV, infra_errors(3, "Deployment service unavailable")),
    );
    let handle = PipelineHandle::new();

    let err = engine.execute(&handle, trigger()).await.unwrap_err();
    assert!(matches!(
        err,
        PipelineError::RetriesExhausted { phase: Phase::DevDeployment, attempts: 3, .. }
    ));
    assert_eq!(engine.activities().count(DEPLOY_DEV), 3);
    assert_eq!(engine.activities().count(DEPLOY_PROD), 0);

    let snapshot = handle.status();
    assert_eq!(snapshot.status, ExecutionStatus::Failed);
    assert_eq!(snapshot.current_step, "dev_deployment");
    assert!(!snapshot.awaiting_approval);
    assert!(snapshot
        .failure_reason
        .as_ref()
        .unwrap()
        .starts_with("retries_exhausted after 3 attempts"));
    assert_completed_steps(
        &snapshot,
        &[
            "preprocessing",
            "training",
            "experiment_logging",
            "quality_assessment",
        ],
    );
}

/// A failed prod deployment is a recorded outcome; the run still completes
#[tokio::test(start_paused = true)]
async fn test_prod_failure_completes_with_prod_failed() {
    let mut engine = engine(
        ScriptedActivities::with_metrics(excellent_metrics())
            .failing(DEPLOY_PROD, infra_errors(2, "Production cluster unreachable")),
    );
    let events = record_events(&mut engine);
    let handle = PipelineHandle::new();
    handle.signal_named("approve_prod_deployment").unwrap();

    let result = engine.execute(&handle, trigger()).await.unwrap();

    assert_eq!(result.status, ExecutionStatus::Completed);
    assert_eq!(result.deployment_status, DeploymentStatus::ProdFailed);
    assert_eq!(result.deployment.environment, "prod");
    assert!(!result.deployment.success);
    assert!(result
        .deployment
        .reason
        .as_deref()
        .unwrap()
        .contains("Production cluster unreachable"));
    assert_eq!(engine.activities().count(DEPLOY_PROD), 2);

    let state = handle.state();
    assert!(matches!(
        state.result_for(Phase::DevDeployment),
        Some(StepResult::Deployment(d)) if d.success
    ));
    assert!(matches!(
        state.result_for(Phase::ProdDeployment),
        Some(StepResult::Deployment(d)) if !d.success
    ));

    let snapshot = handle.status();
    assert_eq!(snapshot.status, ExecutionStatus::Completed);
    assert_eq!(snapshot.deployment_status, "prod_failed");
    assert_eq!(snapshot.current_step, "completed");
    assert!(snapshot.failure_reason.is_some());

    let events = events.lock().unwrap();
    assert!(events.iter().any(|e| matches!(
        e,
        ExecutionEvent::StepFailed { phase: Phase::ProdDeployment, .. }
    )));
    assert!(matches!(
        events.last(),
        Some(ExecutionEvent::RunCompleted {
            status: ExecutionStatus::Completed,
            deployment_status: DeploymentStatus::ProdFailed,
            ..
        })
    ));
}

/// Rejected store credentials are not retried even under an unbounded policy
#[tokio::test(start_paused = true)]
async fn test_authentication_error_not_retried() {
    let engine = engine(
        ScriptedActivities::with_metrics(excellent_metrics()).failing(
            LOG_EXPERIMENT,
            vec![StepError::Authentication("password rejected for mlops".to_string())],
        ),
    );
    let handle = PipelineHandle::new();

    let err = engine.execute(&handle, trigger()).await.unwrap_err();
    assert!(matches!(
        err.step_error(),
        Some(StepError::Authentication(_))
    ));
    assert_eq!(engine.activities().count(LOG_EXPERIMENT), 1);
    assert_eq!(engine.activities().count(DEPLOY_DEV), 0);

    let snapshot = handle.status();
    assert_eq!(snapshot.current_step, "experiment_logging");
    assert!(snapshot
        .failure_reason
        .unwrap()
        .starts_with("AuthenticationError"));
    assert!(snapshot.quality_metrics.is_none());
}

/// Missing deployment configuration fails fast
#[tokio::test(start_paused = true)]
async fn test_configuration_error_in_dev_deployment() {
    let engine = engine(
        ScriptedActivities::with_metrics(metrics(0.82, 2.1, 0.72)).failing(
            DEPLOY_DEV,
            vec![StepError::Configuration(
                "Environment config not found: environments/dev.yml".to_string(),
            )],
        ),
    );

    let err = engine.run(trigger()).await.unwrap_err();
    assert!(err.failure_reason().starts_with("ConfigurationError"));
    assert_eq!(engine.activities().count(DEPLOY_DEV), 1);
}
