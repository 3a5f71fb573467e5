//! Retry policies and backoff schedule

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::core::error::{ConfigError, StepError};
use crate::core::state::Phase;

/// Upper bound on attempts for a step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MaxAttempts {
    /// At most this many attempts in total (including the first)
    Bounded(u32),
    /// Retry retryable failures forever
    Unbounded,
}

impl MaxAttempts {
    /// Decode the "0 means unbounded" convention used in config files
    pub fn from_config(maximum_attempts: u32) -> Self {
        if maximum_attempts == 0 {
            MaxAttempts::Unbounded
        } else {
            MaxAttempts::Bounded(maximum_attempts)
        }
    }

    /// Whether another attempt may follow `attempts` completed attempts
    pub fn allows_another(&self, attempts: u32) -> bool {
        match self {
            MaxAttempts::Bounded(max) => attempts < *max,
            MaxAttempts::Unbounded => true,
        }
    }
}

/// Retry policy for one step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub initial_interval: Duration,
    pub max_attempts: MaxAttempts,
    pub backoff_coefficient: f64,
    /// Cap on the wait between attempts
    pub max_interval: Duration,
}

/// What the retry engine decided after a failed attempt
#[derive(Debug, Clone, PartialEq)]
pub enum RetryDecision {
    /// Wait this long, then try again
    RetryAfter(Duration),
    /// The error is not retryable
    Fatal,
    /// Retryable, but no attempts remain
    Exhausted,
}

impl RetryPolicy {
    /// Create a validated policy
    pub fn new(
        initial_interval: Duration,
        max_attempts: MaxAttempts,
        backoff_coefficient: f64,
        max_interval: Duration,
    ) -> Result<Self, ConfigError> {
        if initial_interval.is_zero() {
            return Err(ConfigError::Invalid(
                "retry initial interval must be positive".to_string(),
            ));
        }
        if !backoff_coefficient.is_finite() || backoff_coefficient < 1.0 {
            return Err(ConfigError::Invalid(format!(
                "backoff coefficient must be >= 1.0, got {}",
                backoff_coefficient
            )));
        }
        if max_interval < initial_interval {
            return Err(ConfigError::Invalid(format!(
                "maximum interval {:?} is shorter than initial interval {:?}",
                max_interval, initial_interval
            )));
        }
        if max_attempts == MaxAttempts::Bounded(0) {
            return Err(ConfigError::Invalid(
                "bounded retry policy needs at least one attempt".to_string(),
            ));
        }
        Ok(Self {
            initial_interval,
            max_attempts,
            backoff_coefficient,
            max_interval,
        })
    }

    /// Bounded policy with coefficient 2.0 and a cap of 100x the initial interval
    pub fn bounded(initial_interval: Duration, attempts: u32) -> Self {
        Self {
            initial_interval,
            max_attempts: MaxAttempts::Bounded(attempts.max(1)),
            backoff_coefficient: 2.0,
            max_interval: initial_interval.saturating_mul(100),
        }
    }

    /// Unbounded policy with coefficient 2.0 and the given cap
    pub fn unbounded(initial_interval: Duration, max_interval: Duration) -> Self {
        Self {
            initial_interval,
            max_attempts: MaxAttempts::Unbounded,
            backoff_coefficient: 2.0,
            max_interval: max_interval.max(initial_interval),
        }
    }

    /// Wait before retry number `retry` (1 = the wait after the first failure)
    ///
    /// `min(initial * coefficient^(retry - 1), max_interval)`
    pub fn backoff(&self, retry: u32) -> Duration {
        let exponent = i32::try_from(retry.saturating_sub(1)).unwrap_or(i32::MAX);
        let secs = self.initial_interval.as_secs_f64() * self.backoff_coefficient.powi(exponent);
        if !secs.is_finite() || secs >= self.max_interval.as_secs_f64() {
            self.max_interval
        } else {
            Duration::from_secs_f64(secs)
        }
    }

    /// The sequence of waits this policy would apply, in order
    pub fn schedule(&self) -> impl Iterator<Item = Duration> + '_ {
        let limit = match self.max_attempts {
            MaxAttempts::Bounded(max) => max.saturating_sub(1),
            MaxAttempts::Unbounded => u32::MAX,
        };
        (1..=limit).map(move |retry| self.backoff(retry))
    }

    /// Decide what follows a failure of attempt number `attempt`
    pub fn decide(&self, attempt: u32, error: &StepError) -> RetryDecision {
        if !error.is_retryable() {
            return RetryDecision::Fatal;
        }
        if !self.max_attempts.allows_another(attempt) {
            return RetryDecision::Exhausted;
        }
        RetryDecision::RetryAfter(self.backoff(attempt))
    }
}

/// Retry policy plus per-attempt time limit
#[derive(Debug, Clone, PartialEq)]
pub struct StepPolicy {
    pub retry: RetryPolicy,
    pub max_duration: Duration,
}

/// Policies for every dispatched step
#[derive(Debug, Clone, PartialEq)]
pub struct StepPolicies {
    pub preprocessing: StepPolicy,
    pub training: StepPolicy,
    pub experiment_logging: StepPolicy,
    pub dev_deployment: StepPolicy,
    pub prod_deployment: StepPolicy,
}

impl StepPolicies {
    pub fn for_phase(&self, phase: Phase) -> Option<&StepPolicy> {
        match phase {
            Phase::Preprocessing => Some(&self.preprocessing),
            Phase::Training => Some(&self.training),
            Phase::ExperimentLogging => Some(&self.experiment_logging),
            Phase::DevDeployment => Some(&self.dev_deployment),
            Phase::ProdDeployment => Some(&self.prod_deployment),
            _ => None,
        }
    }
}

impl Default for StepPolicies {
    fn default() -> Self {
        Self {
            // Fail fast on bad input
            preprocessing: StepPolicy {
                retry: RetryPolicy::bounded(Duration::from_secs(1), 3),
                max_duration: Duration::from_secs(5 * 60),
            },
            training: StepPolicy {
                retry: RetryPolicy::unbounded(Duration::from_secs(2), Duration::from_secs(60)),
                max_duration: Duration::from_secs(10 * 60),
            },
            experiment_logging: StepPolicy {
                retry: RetryPolicy::unbounded(Duration::from_secs(1), Duration::from_secs(30)),
                max_duration: Duration::from_secs(2 * 60),
            },
            dev_deployment: StepPolicy {
                retry: RetryPolicy::bounded(Duration::from_secs(1), 3),
                max_duration: Duration::from_secs(5 * 60),
            },
            prod_deployment: StepPolicy {
                retry: RetryPolicy::bounded(Duration::from_secs(5), 2),
                max_duration: Duration::from_secs(5 * 60),
            },
        }
    }
}
