//! Test: Production approval gate, signals and status queries

use crate::helpers::*;
use mlops_pipeline::core::{DeploymentStatus, Phase};
use mlops_pipeline::execution::{ExecutionEvent, PipelineHandle, Signal};
use std::time::Duration;

#[tokio::test]
async fn test_promotion_suspends_until_approved() {
    let mut engine = engine(ScriptedActivities::with_metrics(excellent_metrics()));
    let events = record_events(&mut engine);
    let handle = PipelineHandle::new();

    let run = tokio::spawn({
        let handle = handle.clone();
        async move {
            let result = engine.execute(&handle, trigger()).await;
            (result, engine)
        }
    });

    let snapshot = handle.wait_for_phase(Phase::AwaitingApproval).await;
    assert!(snapshot.awaiting_approval);
    assert!(!snapshot.approved);
    assert_eq!(snapshot.current_step, "awaiting_prod_approval");
    assert_eq!(snapshot.deployment_status, "pending");

    // Still suspended: nothing moves without the signal
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!run.is_finished());
    assert!(handle.query_named("get_status").unwrap().awaiting_approval);

    handle.signal_named("approve_prod_deployment").unwrap();
    let (result, engine) = run.await.unwrap();
    let result = result.unwrap();

    assert_eq!(result.deployment.environment, "prod");
    assert!(result.deployment.success);
    assert_eq!(result.deployment_status, DeploymentStatus::ProdDeployed);
    assert_eq!(engine.activities().count(DEPLOY_PROD), 1);

    let snapshot = handle.status();
    assert!(!snapshot.awaiting_approval);
    assert!(snapshot.approved);
    assert_eq!(snapshot.deployment_status, "prod_deployed");
    assert_completed_steps(
        &snapshot,
        &[
            "preprocessing",
            "training",
            "experiment_logging",
            "quality_assessment",
            "dev_deployment",
            "prod_deployment",
        ],
    );

    let events = events.lock().unwrap();
    let awaiting = events
        .iter()
        .position(|e| matches!(e, ExecutionEvent::AwaitingApproval { .. }))
        .unwrap();
    let approved = events
        .iter()
        .position(|e| matches!(e, ExecutionEvent::ApprovalReceived { .. }))
        .unwrap();
    assert!(awaiting < approved);
}

/// A signal sent before the gate is buffered and satisfies it later
#[tokio::test(start_paused = true)]
async fn test_early_signal_is_buffered() {
    let engine = engine(ScriptedActivities::with_metrics(excellent_metrics()));
    let handle = PipelineHandle::new();

    handle.signal(Signal::ApproveProdDeployment);
    assert!(handle.status().approved);
    assert!(!handle.status().awaiting_approval);

    let result = engine.execute(&handle, trigger()).await.unwrap();
    assert_eq!(result.deployment_status, DeploymentStatus::ProdDeployed);
}

/// Repeated approvals are no-ops: one prod deployment, one recorded result
#[tokio::test]
async fn test_repeated_signals_are_idempotent() {
    let engine = engine(ScriptedActivities::with_metrics(excellent_metrics()));
    let handle = PipelineHandle::new();
    handle.signal(Signal::ApproveProdDeployment);

    let run = tokio::spawn({
        let handle = handle.clone();
        async move {
            let result = engine.execute(&handle, trigger()).await;
            (result, engine)
        }
    });

    handle.signal(Signal::ApproveProdDeployment);
    handle.signal_named("approve_prod_deployment").unwrap();

    let (result, engine) = run.await.unwrap();
    result.unwrap();

    handle.signal(Signal::ApproveProdDeployment);
    assert_eq!(engine.activities().count(DEPLOY_PROD), 1);

    let state = handle.state();
    assert!(state.approved);
    assert_eq!(
        state
            .completed_phases()
            .iter()
            .filter(|p| *p == "prod_deployment")
            .count(),
        1
    );
}

/// Queries during an in-flight step see only fully completed phases
#[tokio::test(start_paused = true)]
async fn test_query_during_in_flight_step() {
    let engine = engine(
        ScriptedActivities::with_metrics(excellent_metrics())
            .with_training_delay(Duration::from_secs(20)),
    );
    let handle = PipelineHandle::new();

    let run = tokio::spawn({
        let handle = handle.clone();
        async move { engine.execute(&handle, trigger()).await }
    });

    let snapshot = handle.wait_for_phase(Phase::Training).await;
    assert_eq!(snapshot.current_step, "training");
    assert_completed_steps(&snapshot, &["preprocessing"]);
    assert!(snapshot.quality_metrics.is_none());

    // Many concurrent readers, none of them blocking the run
    let readers: Vec<_> = (0..8)
        .map(|_| {
            let handle = handle.clone();
            tokio::spawn(async move { handle.status() })
        })
        .collect();
    for reader in readers {
        let seen = reader.await.unwrap();
        assert!(seen.completed_steps.len() <= 3);
    }

    let gate = handle.wait_for_phase(Phase::AwaitingApproval).await;
    assert!(gate.awaiting_approval);
    assert_eq!(gate.quality_metrics.unwrap().accuracy, 0.86);

    handle.signal(Signal::ApproveProdDeployment);
    run.await.unwrap().unwrap();
    assert_eq!(handle.wait_for_completion().await.current_step, "completed");
}
