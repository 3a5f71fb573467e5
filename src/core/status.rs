//! Read-only status snapshots served by the `get_status` query

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::state::{ExecutionStatus, PipelineState};
use crate::core::step::ModelMetrics;

/// Consistent view of a run at one instant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub run_id: Uuid,
    pub current_step: String,
    pub completed_steps: Vec<String>,
    pub awaiting_approval: bool,
    pub approved: bool,
    pub quality_gate_failed: bool,
    pub deployment_status: String,
    pub failure_reason: Option<String>,
    pub quality_metrics: Option<ModelMetrics>,
    pub status: ExecutionStatus,
}

impl From<&PipelineState> for StatusSnapshot {
    fn from(state: &PipelineState) -> Self {
        Self {
            run_id: state.run_id,
            current_step: state.current_phase.name().to_string(),
            completed_steps: state.completed_phases(),
            awaiting_approval: state.is_awaiting_approval(),
            approved: state.approved,
            quality_gate_failed: state.quality_result().is_some_and(|q| !q.passed),
            deployment_status: state.deployment_status.as_str().to_string(),
            failure_reason: state.failure_reason.clone(),
            quality_metrics: state.quality_metrics(),
            status: state.status,
        }
    }
}
