//! Run lifecycle events.
//!
//! Every lifecycle transition is published as a flat JSON object
//! `{type, execution_id, timestamp, ...fields}` on the run's channel
//! (`execution:{id}`).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Channel name for a run's events.
pub fn execution_channel(execution_id: &Uuid) -> String {
    format!("execution:{execution_id}")
}

/// An event envelope: the run it belongs to, when it happened, and what happened.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionEvent {
    pub execution_id: Uuid,
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub kind: EventKind,
}

impl ExecutionEvent {
    pub fn new(execution_id: Uuid, kind: EventKind) -> Self {
        Self {
            execution_id,
            timestamp: Utc::now(),
            kind,
        }
    }

    pub fn channel(&self) -> String {
        execution_channel(&self.execution_id)
    }
}

/// What happened.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum EventKind {
    #[serde(rename = "execution.started")]
    ExecutionStarted { node_count: usize },

    #[serde(rename = "execution.completed")]
    ExecutionCompleted { total_tokens: u64, total_cost: f64 },

    #[serde(rename = "execution.failed")]
    ExecutionFailed { error: String },

    #[serde(rename = "execution.waiting_approval")]
    ExecutionWaitingApproval {
        node_id: String,
        step_id: Uuid,
        message: String,
    },

    #[serde(rename = "execution.resumed")]
    ExecutionResumed { node_id: String, approved: bool },

    #[serde(rename = "execution.cancelled")]
    ExecutionCancelled {},

    #[serde(rename = "step.started")]
    StepStarted {
        step_id: Uuid,
        node_id: String,
        node_type: String,
        order: u32,
    },

    #[serde(rename = "step.completed")]
    StepCompleted {
        step_id: Uuid,
        node_id: String,
        output: serde_json::Value,
        tokens_used: u64,
        cost: f64,
        duration_ms: u64,
    },

    #[serde(rename = "step.failed")]
    StepFailed {
        step_id: Uuid,
        node_id: String,
        error: String,
        duration_ms: u64,
    },

    #[serde(rename = "step.waiting_approval")]
    StepWaitingApproval {
        step_id: Uuid,
        node_id: String,
        message: String,
    },

    #[serde(rename = "step.skipped")]
    StepSkipped { node_id: String },
}

impl EventKind {
    /// The wire `type` string.
    pub fn event_type(&self) -> &'static str {
        match self {
            EventKind::ExecutionStarted { .. } => "execution.started",
            EventKind::ExecutionCompleted { .. } => "execution.completed",
            EventKind::ExecutionFailed { .. } => "execution.failed",
            EventKind::ExecutionWaitingApproval { .. } => "execution.waiting_approval",
            EventKind::ExecutionResumed { .. } => "execution.resumed",
            EventKind::ExecutionCancelled {} => "execution.cancelled",
            EventKind::StepStarted { .. } => "step.started",
            EventKind::StepCompleted { .. } => "step.completed",
            EventKind::StepFailed { .. } => "step.failed",
            EventKind::StepWaitingApproval { .. } => "step.waiting_approval",
            EventKind::StepSkipped { .. } => "step.skipped",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serializes_flat_with_type_tag() {
        let id = Uuid::now_v7();
        let event = ExecutionEvent::new(
            id,
            EventKind::StepSkipped {
                node_id: "send_a".into(),
            },
        );
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "step.skipped");
        assert_eq!(value["execution_id"], id.to_string());
        assert_eq!(value["node_id"], "send_a");
        assert!(value["timestamp"].is_string());
        assert!(value.get("kind").is_none());
    }

    #[test]
    fn test_event_type_matches_serialized_tag() {
        let kinds = vec![
            EventKind::ExecutionStarted { node_count: 3 },
            EventKind::ExecutionFailed {
                error: "boom".into(),
            },
            EventKind::ExecutionCancelled {},
            EventKind::StepWaitingApproval {
                step_id: Uuid::now_v7(),
                node_id: "h".into(),
                message: "Approval required".into(),
            },
        ];
        for kind in kinds {
            let value = serde_json::to_value(&kind).unwrap();
            assert_eq!(value["type"], kind.event_type());
        }
    }

    #[test]
    fn test_event_deserializes_from_flat_json() {
        let id = Uuid::now_v7();
        let json = serde_json::json!({
            "type": "execution.completed",
            "execution_id": id,
            "timestamp": "2025-01-01T00:00:00Z",
            "total_tokens": 42,
            "total_cost": 0.5
        });
        let event: ExecutionEvent = serde_json::from_value(json).unwrap();
        assert_eq!(event.channel(), format!("execution:{id}"));
        assert_eq!(
            event.kind,
            EventKind::ExecutionCompleted {
                total_tokens: 42,
                total_cost: 0.5
            }
        );
    }
}
