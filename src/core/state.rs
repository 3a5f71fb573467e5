//! Execution state models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::core::error::PipelineError;
use crate::core::step::{ModelMetrics, QualityResult, StepResult};

/// Overall pipeline execution status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecutionStatus {
    /// Pipeline has not started
    Pending,
    /// Pipeline is currently running (including while awaiting approval)
    Running,
    /// Pipeline reached a deployment outcome
    Completed,
    /// Pipeline stopped on a fatal error
    Failed,
}

/// Phase of a pipeline run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Preprocessing,
    Training,
    ExperimentLogging,
    QualityAssessment,
    DevDeployment,
    AwaitingApproval,
    ProdDeployment,
    /// Deployment skipped because the quality gate failed
    Skipped,
    Completed,
}

impl Phase {
    pub fn name(&self) -> &'static str {
        match self {
            Phase::Preprocessing => "preprocessing",
            Phase::Training => "training",
            Phase::ExperimentLogging => "experiment_logging",
            Phase::QualityAssessment => "quality_assessment",
            Phase::DevDeployment => "dev_deployment",
            Phase::AwaitingApproval => "awaiting_prod_approval",
            Phase::ProdDeployment => "prod_deployment",
            Phase::Skipped => "deployment_skipped",
            Phase::Completed => "completed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Phase::Completed)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Where the run stands with respect to deployment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentStatus {
    Pending,
    /// Quality gate failed, nothing deployed
    Skipped,
    DevDeployed,
    ProdDeployed,
    /// Prod deployment attempted and failed; dev deployment stands
    ProdFailed,
    /// Run failed before reaching a deployment outcome
    Failed,
}

impl DeploymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeploymentStatus::Pending => "pending",
            DeploymentStatus::Skipped => "skipped",
            DeploymentStatus::DevDeployed => "dev_deployed",
            DeploymentStatus::ProdDeployed => "prod_deployed",
            DeploymentStatus::ProdFailed => "prod_failed",
            DeploymentStatus::Failed => "failed",
        }
    }
}

/// One entry in the run's audit log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepRecord {
    pub phase: Phase,
    pub result: StepResult,
    pub completed_at: DateTime<Utc>,
}

/// Durable state of a single pipeline run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineState {
    /// Unique run ID
    pub run_id: Uuid,

    /// Current execution status
    pub status: ExecutionStatus,

    /// Phase currently in flight (or the terminal phase)
    pub current_phase: Phase,

    /// Append-only step results, in completion order
    step_results: Vec<StepRecord>,

    /// Set by the approval signal; never reset
    pub approved: bool,

    pub deployment_status: DeploymentStatus,

    /// Why the run failed or skipped deployment
    pub failure_reason: Option<String>,

    /// When execution started
    pub started_at: Option<DateTime<Utc>>,

    /// When execution completed/failed
    pub completed_at: Option<DateTime<Utc>>,
}

impl PipelineState {
    /// Create a new pipeline state
    pub fn new(run_id: Uuid) -> Self {
        Self {
            run_id,
            status: ExecutionStatus::Pending,
            current_phase: Phase::Preprocessing,
            step_results: Vec::new(),
            approved: false,
            deployment_status: DeploymentStatus::Pending,
            failure_reason: None,
            started_at: None,
            completed_at: None,
        }
    }

    /// Mark pipeline as started
    pub fn start(&mut self) {
        self.status = ExecutionStatus::Running;
        self.started_at = Some(Utc::now());
    }

    /// Move to the next phase
    pub fn enter(&mut self, phase: Phase) {
        self.current_phase = phase;
    }

    /// Append the result of a finished phase
    ///
    /// Each phase records at most once; entries are never replaced.
    pub fn record(&mut self, phase: Phase, result: StepResult) -> Result<(), PipelineError> {
        if self.result_for(phase).is_some() {
            return Err(PipelineError::DuplicateStepResult(phase));
        }
        self.step_results.push(StepRecord {
            phase,
            result,
            completed_at: Utc::now(),
        });
        Ok(())
    }

    /// Set the approval flag; returns true only on the first call
    pub fn approve(&mut self) -> bool {
        if self.approved {
            return false;
        }
        self.approved = true;
        true
    }

    /// Mark pipeline as completed
    pub fn complete(&mut self, deployment_status: DeploymentStatus) {
        self.current_phase = Phase::Completed;
        self.deployment_status = deployment_status;
        self.status = ExecutionStatus::Completed;
        self.completed_at = Some(Utc::now());
    }

    /// Mark pipeline as failed; the current phase is left in place
    pub fn fail(&mut self, reason: impl Into<String>) {
        self.status = ExecutionStatus::Failed;
        self.deployment_status = DeploymentStatus::Failed;
        self.failure_reason = Some(reason.into());
        self.completed_at = Some(Utc::now());
    }

    pub fn step_results(&self) -> &[StepRecord] {
        &self.step_results
    }

    pub fn result_for(&self, phase: Phase) -> Option<&StepResult> {
        self.step_results
            .iter()
            .find(|r| r.phase == phase)
            .map(|r| &r.result)
    }

    /// Names of completed phases, in order
    pub fn completed_phases(&self) -> Vec<String> {
        self.step_results
            .iter()
            .map(|r| r.phase.name().to_string())
            .collect()
    }

    pub fn quality_result(&self) -> Option<&QualityResult> {
        self.result_for(Phase::QualityAssessment)
            .and_then(StepResult::as_quality)
    }

    pub fn quality_metrics(&self) -> Option<ModelMetrics> {
        self.quality_result().map(|q| q.metrics)
    }

    /// Suspended at the approval gate with no approval received yet
    pub fn is_awaiting_approval(&self) -> bool {
        self.current_phase == Phase::AwaitingApproval
            && self.status == ExecutionStatus::Running
            && !self.approved
    }

    /// Whether the run has stopped (completed or failed)
    pub fn is_terminal(&self) -> bool {
        matches!(self.status, ExecutionStatus::Completed | ExecutionStatus::Failed)
    }
}
