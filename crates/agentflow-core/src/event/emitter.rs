//! Fire-and-forget event emission for one run.

use std::sync::Arc;

use agentflow_types::event::{EventKind, ExecutionEvent};
use uuid::Uuid;

use super::EventSink;

/// Stamps events with run id and time and publishes them on the run's
/// channel. Publish errors are logged and swallowed.
#[derive(Clone)]
pub struct EventEmitter {
    sink: Arc<dyn EventSink>,
}

impl EventEmitter {
    pub fn new(sink: Arc<dyn EventSink>) -> Self {
        Self { sink }
    }

    pub fn emit(&self, execution_id: Uuid, kind: EventKind) {
        let event = ExecutionEvent::new(execution_id, kind);
        let channel = event.channel();
        if let Err(e) = self.sink.publish(&channel, &event) {
            tracing::warn!(
                %execution_id,
                event_type = event.kind.event_type(),
                error = %e,
                "failed to publish execution event"
            );
        }
    }
}

impl std::fmt::Debug for EventEmitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventEmitter").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{EventBus, EventError};

    struct BrokenSink;

    impl EventSink for BrokenSink {
        fn publish(&self, channel: &str, _event: &ExecutionEvent) -> Result<(), EventError> {
            Err(EventError::Closed(channel.to_string()))
        }
    }

    #[test]
    fn test_publish_failure_is_swallowed() {
        let emitter = EventEmitter::new(Arc::new(BrokenSink));
        emitter.emit(Uuid::now_v7(), EventKind::ExecutionCancelled {});
    }

    #[tokio::test]
    async fn test_emits_on_run_channel() {
        let bus = EventBus::new(8);
        let id = Uuid::now_v7();
        let mut rx = bus.subscribe_execution(&id);
        let emitter = EventEmitter::new(Arc::new(bus));

        emitter.emit(id, EventKind::StepSkipped { node_id: "n1".into() });

        let event = rx.recv().await.unwrap();
        assert_eq!(event.execution_id, id);
        assert_eq!(event.kind, EventKind::StepSkipped { node_id: "n1".into() });
    }
}
