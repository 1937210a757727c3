//! Broadcast event bus keyed by channel name.
//!
//! Each run publishes on its own channel (`execution:{id}`). A channel's
//! broadcast sender is created lazily by the first subscriber or publisher.
//! Publishing with no active subscribers is a no-op.

use std::sync::Arc;

use agentflow_types::event::{execution_channel, ExecutionEvent};
use dashmap::DashMap;
use tokio::sync::broadcast;
use uuid::Uuid;

use super::{EventError, EventSink};

pub struct EventBus {
    channels: Arc<DashMap<String, broadcast::Sender<ExecutionEvent>>>,
    capacity: usize,
}

impl EventBus {
    /// Create a bus whose channels each buffer `capacity` events.
    pub fn new(capacity: usize) -> Self {
        Self {
            channels: Arc::new(DashMap::new()),
            capacity: capacity.max(1),
        }
    }

    /// Receive all future events published on `channel`.
    pub fn subscribe(&self, channel: &str) -> broadcast::Receiver<ExecutionEvent> {
        self.channels
            .entry(channel.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe()
    }

    /// Receive all future events of one run.
    pub fn subscribe_execution(&self, execution_id: &Uuid) -> broadcast::Receiver<ExecutionEvent> {
        self.subscribe(&execution_channel(execution_id))
    }

    /// Drop a finished run's channel. Existing receivers see the channel close.
    pub fn close(&self, channel: &str) {
        self.channels.remove(channel);
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }
}

impl EventSink for EventBus {
    fn publish(&self, channel: &str, event: &ExecutionEvent) -> Result<(), EventError> {
        if let Some(sender) = self.channels.get(channel) {
            // Err only means no live receivers.
            let _ = sender.send(event.clone());
        }
        Ok(())
    }
}

impl Clone for EventBus {
    fn clone(&self) -> Self {
        Self {
            channels: Arc::clone(&self.channels),
            capacity: self.capacity,
        }
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("channels", &self.channels.len())
            .field("capacity", &self.capacity)
            .finish()
    }
}
