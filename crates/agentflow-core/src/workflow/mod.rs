//! Workflow engine core: ordering, template resolution, and run execution.
//!
//! - `scheduler` -- topological order, cycle detection, branch activity
//! - `resolver` -- `{{path}}` template resolution against the run context
//! - `context` -- per-run context of trigger data, node outputs, credentials
//! - `retry` -- retry policy and exponential backoff
//! - `cost` -- per-run token and cost accounting
//! - `step_executor` -- single-node lifecycle and persistence
//! - `checkpoint` -- pause/resume checkpoints for human approval
//! - `orchestrator` -- the run loop and its finalization

pub mod checkpoint;
pub mod context;
pub mod cost;
pub mod error;
pub mod orchestrator;
pub mod resolver;
pub mod retry;
pub mod scheduler;
pub mod step_executor;

pub use error::EngineError;
pub use orchestrator::{Orchestrator, ResumeRequest, RunRequest, RunResult};
