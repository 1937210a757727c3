//! Run lifecycle event publishing.
//!
//! [`EventSink`] is the port an external pub/sub channel implements.
//! [`EventBus`] is the in-process implementation on `tokio::sync::broadcast`;
//! [`EventEmitter`] is what the engine actually calls, and never lets a
//! publish failure reach the run.

pub mod bus;
pub mod emitter;

pub use bus::EventBus;
pub use emitter::EventEmitter;

use agentflow_types::event::ExecutionEvent;

#[derive(Debug, thiserror::Error)]
pub enum EventError {
    #[error("channel '{0}' is closed")]
    Closed(String),

    #[error("publish failed: {0}")]
    Publish(String),
}

/// Destination for run events.
pub trait EventSink: Send + Sync {
    fn publish(&self, channel: &str, event: &ExecutionEvent) -> Result<(), EventError>;
}
