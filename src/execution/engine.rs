//! Main execution engine - orchestrates a single pipeline run

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

use crate::activities::Activities;
use crate::codec::DataConverter;
use crate::core::{
    quality, DeploymentRequest, DeploymentResult, DeploymentStatus, ExecutionStatus,
    ExperimentLogResult, Phase, PipelineError, PreprocessingResult, PromotionDecision,
    QualityResult, StepError, StepPolicies, StepPolicy, StepResult, TrainingResult, TriggerInput,
};
use crate::execution::executor::StepExecutor;
use crate::execution::handle::PipelineHandle;
use crate::persistence::{Direction, PayloadJournal};

/// Events that can occur during a pipeline run
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionEvent {
    RunStarted {
        run_id: Uuid,
        trigger: TriggerInput,
    },
    StepStarted {
        phase: Phase,
        attempt: u32,
    },
    StepRetrying {
        phase: Phase,
        attempt: u32,
        delay: Duration,
        error: String,
    },
    StepCompleted {
        phase: Phase,
        attempts: u32,
    },
    StepFailed {
        phase: Phase,
        error: String,
    },
    AwaitingApproval {
        run_id: Uuid,
    },
    ApprovalReceived {
        run_id: Uuid,
    },
    RunCompleted {
        run_id: Uuid,
        status: ExecutionStatus,
        deployment_status: DeploymentStatus,
    },
}

/// Type for event handlers
pub type EventHandler = Arc<dyn Fn(ExecutionEvent) + Send + Sync>;

/// Fan-out of events to registered handlers
#[derive(Clone, Default)]
pub struct EventEmitter {
    handlers: Vec<EventHandler>,
}

impl EventEmitter {
    pub fn push(&mut self, handler: EventHandler) {
        self.handlers.push(handler);
    }

    pub fn emit(&self, event: ExecutionEvent) {
        for handler in &self.handlers {
            handler(event.clone());
        }
    }
}

/// Everything a finished run produced
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalResult {
    pub run_id: Uuid,
    pub preprocessing: PreprocessingResult,
    pub training: TrainingResult,
    pub experiment: ExperimentLogResult,
    pub quality: QualityResult,
    pub deployment: DeploymentResult,
    pub deployment_status: DeploymentStatus,
    pub status: ExecutionStatus,
}

/// Main pipeline execution engine
pub struct PipelineEngine<A> {
    activities: A,
    policies: StepPolicies,
    converter: DataConverter,
    journal: Arc<dyn PayloadJournal>,
    executor: StepExecutor,
    events: EventEmitter,
}

impl<A: Activities> PipelineEngine<A> {
    pub fn new(
        activities: A,
        policies: StepPolicies,
        converter: DataConverter,
        journal: Arc<dyn PayloadJournal>,
    ) -> Self {
        Self {
            activities,
            policies,
            converter,
            journal,
            executor: StepExecutor::new(),
            events: EventEmitter::default(),
        }
    }

    /// Add an event handler
    pub fn add_event_handler<F>(&mut self, handler: F)
    where
        F: Fn(ExecutionEvent) + Send + Sync + 'static,
    {
        self.events.push(Arc::new(handler));
    }

    pub fn activities(&self) -> &A {
        &self.activities
    }

    pub fn converter(&self) -> &DataConverter {
        &self.converter
    }

    /// Run a pipeline on a fresh handle
    pub async fn run(&self, trigger: TriggerInput) -> Result<FinalResult, PipelineError> {
        self.execute(&PipelineHandle::new(), trigger).await
    }

    /// Run a pipeline, publishing its state through `handle`
    ///
    /// Any error that escapes a step fails the run: the failure reason is
    /// recorded against the current phase before the error is returned.
    pub async fn execute(
        &self,
        handle: &PipelineHandle,
        trigger: TriggerInput,
    ) -> Result<FinalResult, PipelineError> {
        let run_id = handle.run_id();
        info!("Starting pipeline run {} for {}", run_id, trigger.file_path);
        self.events.emit(ExecutionEvent::RunStarted {
            run_id,
            trigger: trigger.clone(),
        });
        handle.update(|state| state.start());

        match self.drive(handle, &trigger).await {
            Ok(result) => {
                info!(
                    "Pipeline run {} completed ({})",
                    run_id,
                    result.deployment_status.as_str()
                );
                self.events.emit(ExecutionEvent::RunCompleted {
                    run_id,
                    status: result.status,
                    deployment_status: result.deployment_status,
                });
                Ok(result)
            }
            Err(err) => {
                let reason = err.failure_reason();
                warn!("Pipeline run {} failed: {}", run_id, reason);
                handle.update(|state| state.fail(reason));
                self.events.emit(ExecutionEvent::RunCompleted {
                    run_id,
                    status: ExecutionStatus::Failed,
                    deployment_status: DeploymentStatus::Failed,
                });
                Err(err)
            }
        }
    }

    async fn drive(
        &self,
        handle: &PipelineHandle,
        trigger: &TriggerInput,
    ) -> Result<FinalResult, PipelineError> {
        let run_id = handle.run_id();
        let activities = &self.activities;

        let preprocessing = self
            .run_step(handle, Phase::Preprocessing, &self.policies.preprocessing, trigger, || {
                activities.preprocess(trigger)
            })
            .await?;
        handle.record(Phase::Preprocessing, StepResult::Preprocessing(preprocessing.clone()))?;

        let training = self
            .run_step(handle, Phase::Training, &self.policies.training, &preprocessing, || {
                activities.train(&preprocessing)
            })
            .await?;
        handle.record(Phase::Training, StepResult::Training(training.clone()))?;

        let experiment = self
            .run_step(
                handle,
                Phase::ExperimentLogging,
                &self.policies.experiment_logging,
                &training,
                || activities.log_experiment(run_id, &training),
            )
            .await?;
        handle.record(Phase::ExperimentLogging, StepResult::ExperimentLog(experiment.clone()))?;

        let quality = self.assess_quality(handle, &training).await?;

        let finish = |deployment: DeploymentResult, deployment_status: DeploymentStatus| {
            FinalResult {
                run_id,
                preprocessing: preprocessing.clone(),
                training: training.clone(),
                experiment: experiment.clone(),
                quality: quality.clone(),
                deployment,
                deployment_status,
                status: ExecutionStatus::Completed,
            }
        };

        if !quality.passed {
            warn!(
                "Model {} failed quality gate ({}); deployment skipped",
                training.model_id,
                quality.failed_checks().join(", ")
            );
            let skipped = DeploymentResult::quality_gate_failed();
            handle.update(|state| state.enter(Phase::Skipped));
            handle.record(Phase::Skipped, StepResult::Deployment(skipped.clone()))?;
            handle.update(|state| {
                state.complete(DeploymentStatus::Skipped);
                state.failure_reason = skipped.reason.clone();
            });
            return Ok(finish(skipped, DeploymentStatus::Skipped));
        }

        let dev_request = DeploymentRequest {
            model_id: training.model_id.clone(),
            environment: "dev".to_string(),
        };
        let dev = self
            .run_step(
                handle,
                Phase::DevDeployment,
                &self.policies.dev_deployment,
                &dev_request,
                || activities.deploy(&dev_request),
            )
            .await?;
        handle.record(Phase::DevDeployment, StepResult::Deployment(dev.clone()))?;

        if quality::promotion_decision(&dev, &training.metrics) == PromotionDecision::DevOnly {
            info!(
                "Model {} stays in dev (accuracy {:.3})",
                training.model_id, training.metrics.accuracy
            );
            let outcome = DeploymentResult::dev_only();
            handle.record(Phase::Completed, StepResult::Deployment(outcome.clone()))?;
            handle.update(|state| state.complete(DeploymentStatus::DevDeployed));
            return Ok(finish(outcome, DeploymentStatus::DevDeployed));
        }

        handle.update(|state| state.enter(Phase::AwaitingApproval));
        info!("Run {} awaiting production approval", run_id);
        self.events.emit(ExecutionEvent::AwaitingApproval { run_id });
        handle.wait_for_approval().await?;
        self.events.emit(ExecutionEvent::ApprovalReceived { run_id });

        let prod_request = DeploymentRequest {
            model_id: training.model_id.clone(),
            environment: "prod".to_string(),
        };
        let prod = self
            .run_step(
                handle,
                Phase::ProdDeployment,
                &self.policies.prod_deployment,
                &prod_request,
                || activities.deploy(&prod_request),
            )
            .await;

        // A failed prod deployment is an outcome, not a run failure
        let (deployment, deployment_status) = match prod {
            Ok(result) => (result, DeploymentStatus::ProdDeployed),
            Err(err) if err.step_error().is_some() => (
                DeploymentResult::failed("prod", err.failure_reason()),
                DeploymentStatus::ProdFailed,
            ),
            Err(err) => return Err(err),
        };
        handle.record(Phase::ProdDeployment, StepResult::Deployment(deployment.clone()))?;
        handle.update(|state| {
            state.complete(deployment_status);
            if !deployment.success {
                state.failure_reason = deployment.reason.clone();
            }
        });

        Ok(finish(deployment, deployment_status))
    }

    /// Evaluate the quality gate on the training metrics
    async fn assess_quality(
        &self,
        handle: &PipelineHandle,
        training: &TrainingResult,
    ) -> Result<QualityResult, PipelineError> {
        let phase = Phase::QualityAssessment;
        handle.update(|state| state.enter(phase));
        self.events.emit(ExecutionEvent::StepStarted { phase, attempt: 1 });
        self.journal_payload(handle.run_id(), phase, Direction::Input, &training.metrics)
            .await?;

        let result = quality::evaluate(&training.model_id, &training.metrics);

        self.journal_payload(handle.run_id(), phase, Direction::Output, &result)
            .await?;
        handle.record(phase, StepResult::Quality(result.clone()))?;
        self.events.emit(ExecutionEvent::StepCompleted { phase, attempts: 1 });
        Ok(result)
    }

    /// Dispatch one step: journal its input, execute under its policy, journal its output
    async fn run_step<I, O, F, Fut>(
        &self,
        handle: &PipelineHandle,
        phase: Phase,
        policy: &StepPolicy,
        input: &I,
        call: F,
    ) -> Result<O, PipelineError>
    where
        I: Serialize,
        O: Serialize,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<O, StepError>>,
    {
        let run_id = handle.run_id();
        handle.update(|state| state.enter(phase));
        self.journal_payload(run_id, phase, Direction::Input, input).await?;

        let outcome = match self.executor.execute(phase, policy, &self.events, call).await {
            Ok(outcome) => outcome,
            Err(err) => {
                self.events.emit(ExecutionEvent::StepFailed {
                    phase,
                    error: err.failure_reason(),
                });
                return Err(err);
            }
        };

        self.journal_payload(run_id, phase, Direction::Output, &outcome.value)
            .await?;
        self.events.emit(ExecutionEvent::StepCompleted {
            phase,
            attempts: outcome.attempts,
        });
        Ok(outcome.value)
    }

    async fn journal_payload<T: Serialize>(
        &self,
        run_id: Uuid,
        phase: Phase,
        direction: Direction,
        value: &T,
    ) -> Result<(), PipelineError> {
        let payload = self.converter.to_payload(value)?;
        self.journal
            .append(run_id, phase.name(), direction, &payload)
            .await?;
        Ok(())
    }
}
