//! Step executor - runs one step under its retry policy and time limit

use std::future::Future;
use tokio::time::{sleep, timeout};
use tracing::{debug, error, info, warn};

use crate::core::{Phase, PipelineError, RetryDecision, StepError, StepPolicy};
use crate::execution::engine::{EventEmitter, ExecutionEvent};

/// Value produced by a step, with the number of attempts it took
#[derive(Debug, Clone, PartialEq)]
pub struct StepOutcome<T> {
    pub value: T,
    pub attempts: u32,
}

/// Executes a single step, retrying retryable failures
#[derive(Debug, Default, Clone, Copy)]
pub struct StepExecutor;

impl StepExecutor {
    pub fn new() -> Self {
        Self
    }

    /// Run `attempt` until it succeeds, fails fatally or runs out of attempts
    ///
    /// Each attempt is bounded by the policy's `max_duration`; an attempt that
    /// exceeds it fails with [`StepError::Timeout`], which is retryable.
    pub async fn execute<T, F, Fut>(
        &self,
        phase: Phase,
        policy: &StepPolicy,
        events: &EventEmitter,
        mut attempt: F,
    ) -> Result<StepOutcome<T>, PipelineError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, StepError>>,
    {
        let mut attempts = 0u32;
        loop {
            attempts += 1;
            debug!("Executing step {} (attempt {})", phase, attempts);
            events.emit(ExecutionEvent::StepStarted {
                phase,
                attempt: attempts,
            });

            let result = match timeout(policy.max_duration, attempt()).await {
                Ok(result) => result,
                Err(_) => Err(StepError::Timeout(policy.max_duration)),
            };

            let err = match result {
                Ok(value) => {
                    info!("Step {} completed after {} attempt(s)", phase, attempts);
                    return Ok(StepOutcome { value, attempts });
                }
                Err(err) => err,
            };

            match policy.retry.decide(attempts, &err) {
                RetryDecision::RetryAfter(delay) => {
                    warn!(
                        "Step {} attempt {} failed ({}); retrying in {:?}",
                        phase, attempts, err, delay
                    );
                    events.emit(ExecutionEvent::StepRetrying {
                        phase,
                        attempt: attempts,
                        delay,
                        error: err.to_string(),
                    });
                    sleep(delay).await;
                }
                RetryDecision::Fatal => {
                    error!("Step {} failed with non-retryable {}: {}", phase, err.kind(), err);
                    return Err(PipelineError::StepFailed { phase, source: err });
                }
                RetryDecision::Exhausted => {
                    error!("Step {} exhausted {} attempts: {}", phase, attempts, err);
                    return Err(PipelineError::RetriesExhausted {
                        phase,
                        attempts,
                        last_error: err,
                    });
                }
            }
        }
    }
}
