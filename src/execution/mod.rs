//! Pipeline execution engine

pub mod engine;
pub mod executor;
pub mod handle;

pub use engine::{EventEmitter, EventHandler, ExecutionEvent, FinalResult, PipelineEngine};
pub use executor::{StepExecutor, StepOutcome};
pub use handle::{HandleError, PipelineHandle, Query, Signal};
