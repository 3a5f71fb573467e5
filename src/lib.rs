//! mlops-pipeline - a durable MLOps pipeline orchestrator
//!
//! Runs ingest → train → track → evaluate → deploy with per-step retry
//! policies, a human approval gate before production, a live status query,
//! and selective encryption of the payloads recorded for each step.

pub mod activities;
pub mod cli;
pub mod codec;
pub mod core;
pub mod execution;
pub mod persistence;

// Re-export commonly used types
pub use activities::{Activities, LocalActivities};
pub use codec::{DataConverter, EncryptionCodec, EncryptionKey, Payload, PayloadCodec};
pub use core::{
    ExecutionStatus, Phase, PipelineConfig, PipelineError, PipelineState, RetryPolicy,
    StatusSnapshot, StepError, StepResult, TriggerInput,
};
pub use execution::{ExecutionEvent, FinalResult, PipelineEngine, PipelineHandle};
