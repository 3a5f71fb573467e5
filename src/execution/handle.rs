//! Handle to a single pipeline run: signals in, status queries out

use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, info};
use uuid::Uuid;

use crate::core::{Phase, PipelineError, PipelineState, StatusSnapshot, StepResult};

/// Name of the approval signal
pub const APPROVE_PROD_DEPLOYMENT: &str = "approve_prod_deployment";

/// Name of the status query
pub const GET_STATUS: &str = "get_status";

/// Asynchronous notifications a run accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    ApproveProdDeployment,
}

impl Signal {
    pub fn name(&self) -> &'static str {
        match self {
            Signal::ApproveProdDeployment => APPROVE_PROD_DEPLOYMENT,
        }
    }
}

impl FromStr for Signal {
    type Err = HandleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            APPROVE_PROD_DEPLOYMENT => Ok(Signal::ApproveProdDeployment),
            other => Err(HandleError::UnknownSignal(other.to_string())),
        }
    }
}

/// Read-only queries a run answers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Query {
    GetStatus,
}

impl FromStr for Query {
    type Err = HandleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            GET_STATUS => Ok(Query::GetStatus),
            other => Err(HandleError::UnknownQuery(other.to_string())),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum HandleError {
    #[error("Unknown signal: {0}")]
    UnknownSignal(String),

    #[error("Unknown query: {0}")]
    UnknownQuery(String),
}

/// Cloneable handle to one run's state
///
/// The engine is the only writer. Signals flip the approval flag through the
/// same channel, so every reader sees whole states, never a half-applied update.
#[derive(Clone)]
pub struct PipelineHandle {
    state: Arc<watch::Sender<PipelineState>>,
}

impl std::fmt::Debug for PipelineHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineHandle")
            .field("run_id", &self.run_id())
            .finish()
    }
}

impl Default for PipelineHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineHandle {
    pub fn new() -> Self {
        Self::with_run_id(Uuid::new_v4())
    }

    pub fn with_run_id(run_id: Uuid) -> Self {
        let (tx, _rx) = watch::channel(PipelineState::new(run_id));
        Self {
            state: Arc::new(tx),
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.state.borrow().run_id
    }

    /// Deliver a signal; never blocks and never fails
    pub fn signal(&self, signal: Signal) {
        match signal {
            Signal::ApproveProdDeployment => {
                let first = self.state.send_if_modified(|state| state.approve());
                if first {
                    info!("Production deployment approved for run {}", self.run_id());
                } else {
                    debug!("Duplicate approval signal ignored");
                }
            }
        }
    }

    pub fn signal_named(&self, name: &str) -> Result<(), HandleError> {
        self.signal(name.parse()?);
        Ok(())
    }

    pub fn query(&self, query: Query) -> StatusSnapshot {
        match query {
            Query::GetStatus => self.status(),
        }
    }

    pub fn query_named(&self, name: &str) -> Result<StatusSnapshot, HandleError> {
        Ok(self.query(name.parse()?))
    }

    /// Consistent snapshot of the run
    pub fn status(&self) -> StatusSnapshot {
        StatusSnapshot::from(&*self.state.borrow())
    }

    /// Full copy of the current state
    pub fn state(&self) -> PipelineState {
        self.state.borrow().clone()
    }

    /// Wait until the run reaches `phase` or stops; returns the snapshot at that point
    pub async fn wait_for_phase(&self, phase: Phase) -> StatusSnapshot {
        let mut rx = self.state.subscribe();
        let reached = rx
            .wait_for(|state| state.current_phase == phase || state.is_terminal())
            .await
            .map(|state| StatusSnapshot::from(&*state));
        // The sender lives in `self`, so the channel cannot close here
        reached.unwrap_or_else(|_| self.status())
    }

    /// Wait until the run stops
    pub async fn wait_for_completion(&self) -> StatusSnapshot {
        let mut rx = self.state.subscribe();
        let done = rx
            .wait_for(PipelineState::is_terminal)
            .await
            .map(|state| StatusSnapshot::from(&*state));
        done.unwrap_or_else(|_| self.status())
    }

    /// Apply a mutation and notify observers
    pub(crate) fn update<F>(&self, mutate: F)
    where
        F: FnOnce(&mut PipelineState),
    {
        self.state.send_modify(mutate);
    }

    /// Append a step result; rejected (and not broadcast) when the phase already has one
    pub(crate) fn record(&self, phase: Phase, result: StepResult) -> Result<(), PipelineError> {
        let mut outcome = Ok(());
        self.state.send_if_modified(|state| {
            outcome = state.record(phase, result);
            outcome.is_ok()
        });
        outcome
    }

    /// Suspend until the approval flag is set; signals sent earlier count
    pub(crate) async fn wait_for_approval(&self) -> Result<(), PipelineError> {
        let mut rx = self.state.subscribe();
        rx.wait_for(|state| state.approved)
            .await
            .map(|_| ())
            .map_err(|_| PipelineError::ChannelClosed(Phase::AwaitingApproval))
    }
}
