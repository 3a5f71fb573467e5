//! Error taxonomy for steps and pipeline runs

use crate::codec::CodecError;
use crate::core::state::Phase;
use crate::persistence::StoreError;
use std::time::Duration;
use thiserror::Error;

/// Failure reported by a single step attempt
#[derive(Debug, Clone, Error, PartialEq)]
pub enum StepError {
    /// Bad input data (e.g. too few samples); never retried
    #[error("Validation error: {0}")]
    Validation(String),

    /// Transient infrastructure fault; retried per policy
    #[error("Infrastructure error: {0}")]
    Infrastructure(String),

    /// Missing or invalid configuration; never retried
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Credentials rejected by a downstream store; never retried
    #[error("Authentication error: {0}")]
    Authentication(String),

    /// Payload failed authentication; never retried
    #[error("Integrity error: {0}")]
    Integrity(String),

    /// Attempt exceeded the step's maximum duration
    #[error("Timeout after {0:?}")]
    Timeout(Duration),
}

impl StepError {
    /// Whether the retry engine may attempt the step again
    pub fn is_retryable(&self) -> bool {
        matches!(self, StepError::Infrastructure(_) | StepError::Timeout(_))
    }

    /// Short classification name, used in failure reasons
    pub fn kind(&self) -> &'static str {
        match self {
            StepError::Validation(_) => "ValidationError",
            StepError::Infrastructure(_) => "InfrastructureError",
            StepError::Configuration(_) => "ConfigurationError",
            StepError::Authentication(_) => "AuthenticationError",
            StepError::Integrity(_) => "IntegrityError",
            StepError::Timeout(_) => "TimeoutError",
        }
    }
}

/// Invalid or missing configuration detected at startup
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing configuration: {0}")]
    Missing(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse {path}: {message}")]
    Parse { path: String, message: String },
}

/// Error that terminates a pipeline run
#[derive(Debug, Error)]
pub enum PipelineError {
    /// A step failed with a non-retryable error
    #[error("Step {phase} failed: {source}")]
    StepFailed {
        phase: Phase,
        #[source]
        source: StepError,
    },

    /// A step ran out of attempts on retryable errors
    #[error("Step {phase} failed after {attempts} attempts: {last_error}")]
    RetriesExhausted {
        phase: Phase,
        attempts: u32,
        last_error: StepError,
    },

    /// The audit log already holds a result for this phase
    #[error("Step result for {0} already recorded")]
    DuplicateStepResult(Phase),

    /// The run handle went away while the run was suspended
    #[error("Run state channel closed while {0}")]
    ChannelClosed(Phase),

    #[error("Payload codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("Persistence error: {0}")]
    Persistence(#[from] StoreError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl PipelineError {
    /// The step error behind a step failure, if any
    pub fn step_error(&self) -> Option<&StepError> {
        match self {
            PipelineError::StepFailed { source, .. } => Some(source),
            PipelineError::RetriesExhausted { last_error, .. } => Some(last_error),
            _ => None,
        }
    }

    /// Failure reason recorded in the run state and shown by status queries
    pub fn failure_reason(&self) -> String {
        match self {
            PipelineError::StepFailed { source, .. } => {
                format!("{}: {}", source.kind(), source)
            }
            PipelineError::RetriesExhausted { attempts, last_error, .. } => {
                format!("retries_exhausted after {} attempts: {}", attempts, last_error)
            }
            other => other.to_string(),
        }
    }
}
