//! Core domain models for the MLOps pipeline
//!
//! This module defines the phases, step results, retry policies, quality
//! gate and durable state of a single pipeline run.

pub mod config;
pub mod error;
pub mod quality;
pub mod retry;
pub mod state;
pub mod status;
pub mod step;

pub use config::PipelineConfig;
pub use error::*;
pub use quality::*;
pub use retry::*;
pub use state::*;
pub use status::*;
pub use step::*;
