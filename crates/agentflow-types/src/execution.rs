//! Execution, step, log, and cost record types.
//!
//! An [`Execution`] is one end-to-end run of a graph against a triggering
//! payload. Each attempted node produces a [`StepRecord`]; a step is created
//! `running` and becomes immutable once it reaches a terminal status.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Status enums
// ---------------------------------------------------------------------------

/// Status of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Pending,
    Running,
    Completed,
    Failed,
    WaitingApproval,
    Cancelled,
}

impl ExecutionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionStatus::Pending => "pending",
            ExecutionStatus::Running => "running",
            ExecutionStatus::Completed => "completed",
            ExecutionStatus::Failed => "failed",
            ExecutionStatus::WaitingApproval => "waiting_approval",
            ExecutionStatus::Cancelled => "cancelled",
        }
    }

    /// Terminal statuses set `completed_at`; a paused run is not terminal.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ExecutionStatus::Completed | ExecutionStatus::Failed | ExecutionStatus::Cancelled
        )
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExecutionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ExecutionStatus::Pending),
            "running" => Ok(ExecutionStatus::Running),
            "completed" => Ok(ExecutionStatus::Completed),
            "failed" => Ok(ExecutionStatus::Failed),
            "waiting_approval" => Ok(ExecutionStatus::WaitingApproval),
            "cancelled" => Ok(ExecutionStatus::Cancelled),
            other => Err(format!("invalid execution status: '{other}'")),
        }
    }
}

/// Status of an individual step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Running,
    Completed,
    Failed,
    WaitingApproval,
    Skipped,
}

impl StepStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepStatus::Running => "running",
            StepStatus::Completed => "completed",
            StepStatus::Failed => "failed",
            StepStatus::WaitingApproval => "waiting_approval",
            StepStatus::Skipped => "skipped",
        }
    }
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StepStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "running" => Ok(StepStatus::Running),
            "completed" => Ok(StepStatus::Completed),
            "failed" => Ok(StepStatus::Failed),
            "waiting_approval" => Ok(StepStatus::WaitingApproval),
            "skipped" => Ok(StepStatus::Skipped),
            other => Err(format!("invalid step status: '{other}'")),
        }
    }
}

/// Severity of an execution log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Info,
    Warning,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Info => "info",
            LogLevel::Warning => "warning",
            LogLevel::Error => "error",
        }
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "info" => Ok(LogLevel::Info),
            "warning" => Ok(LogLevel::Warning),
            "error" => Ok(LogLevel::Error),
            other => Err(format!("invalid log level: '{other}'")),
        }
    }
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// A single run of a graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Execution {
    /// UUIDv7 execution ID.
    pub id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub graph_id: Option<String>,
    pub status: ExecutionStatus,
    #[serde(default)]
    pub trigger_data: serde_json::Value,
    pub total_tokens: u64,
    pub total_cost: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Execution {
    /// A fresh `pending` execution record.
    pub fn pending(id: Uuid, graph_id: Option<String>, trigger_data: serde_json::Value) -> Self {
        Self {
            id,
            graph_id,
            status: ExecutionStatus::Pending,
            trigger_data,
            total_tokens: 0,
            total_cost: 0.0,
            error: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }
}

/// A status transition for an execution, applied by the repository.
///
/// Moving to `running` stamps `started_at` (once); moving to a terminal
/// status stamps `completed_at`.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionUpdate {
    pub status: ExecutionStatus,
    pub error: Option<String>,
    pub total_tokens: Option<u64>,
    pub total_cost: Option<f64>,
}

impl ExecutionUpdate {
    pub fn status(status: ExecutionStatus) -> Self {
        Self {
            status,
            error: None,
            total_tokens: None,
            total_cost: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::status(ExecutionStatus::Failed)
        }
    }

    pub fn with_totals(mut self, total_tokens: u64, total_cost: f64) -> Self {
        self.total_tokens = Some(total_tokens);
        self.total_cost = Some(total_cost);
        self
    }
}

/// The persisted record of one node's execution within a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepRecord {
    pub id: Uuid,
    pub execution_id: Uuid,
    pub node_id: String,
    pub node_type: String,
    pub order: u32,
    pub status: StepStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub tokens_used: u64,
    pub cost: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    pub attempts: u32,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl StepRecord {
    /// A new step in `running` status.
    pub fn running(
        execution_id: Uuid,
        node_id: impl Into<String>,
        node_type: impl Into<String>,
        order: u32,
        input: serde_json::Value,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            execution_id,
            node_id: node_id.into(),
            node_type: node_type.into(),
            order,
            status: StepStatus::Running,
            input: Some(input),
            output: None,
            error: None,
            tokens_used: 0,
            cost: 0.0,
            duration_ms: None,
            attempts: 0,
            started_at: Utc::now(),
            completed_at: None,
        }
    }

    /// A step recorded for a node that was skipped by branch evaluation.
    pub fn skipped(
        execution_id: Uuid,
        node_id: impl Into<String>,
        node_type: impl Into<String>,
        order: u32,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7(),
            execution_id,
            node_id: node_id.into(),
            node_type: node_type.into(),
            order,
            status: StepStatus::Skipped,
            input: None,
            output: None,
            error: None,
            tokens_used: 0,
            cost: 0.0,
            duration_ms: Some(0),
            attempts: 0,
            started_at: now,
            completed_at: Some(now),
        }
    }
}

/// The terminal (or paused) outcome written onto a `running` step.
#[derive(Debug, Clone, PartialEq)]
pub struct StepCompletion {
    pub status: StepStatus,
    pub output: Option<serde_json::Value>,
    pub error: Option<String>,
    pub tokens_used: u64,
    pub cost: f64,
    pub duration_ms: u64,
    pub attempts: u32,
}

/// A human-readable log line attached to a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionLog {
    pub id: Uuid,
    pub execution_id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_id: Option<Uuid>,
    pub level: LogLevel,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

impl ExecutionLog {
    pub fn new(
        execution_id: Uuid,
        step_id: Option<Uuid>,
        level: LogLevel,
        message: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            execution_id,
            step_id,
            level,
            message: message.into(),
            created_at: Utc::now(),
        }
    }
}

// ---------------------------------------------------------------------------
// Cost accounting
// ---------------------------------------------------------------------------

/// One step's contribution to a run's cost.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostRecord {
    pub model: String,
    pub tokens: u64,
    pub cost: f64,
}

/// Per-model aggregate within a [`CostSummary`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelCost {
    pub tokens: u64,
    pub cost: f64,
    pub steps: u32,
}

/// Grouped view of a run's cost records.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CostSummary {
    pub total_tokens: u64,
    pub total_cost: f64,
    pub step_count: u32,
    pub by_model: BTreeMap<String, ModelCost>,
}

// ---------------------------------------------------------------------------
// Pause / resume
// ---------------------------------------------------------------------------

/// Everything needed to continue a run that paused at a human node.
///
/// The checkpoint is handed back to the caller instead of being held by the
/// engine; the engine keeps no state between runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunCheckpoint {
    pub execution_id: Uuid,
    pub paused_node_id: String,
    pub paused_step_id: Uuid,
    /// Position in the topological order to continue from.
    pub next_index: usize,
    /// Node ids in topological order.
    pub step_order: Vec<String>,
    /// Hex SHA-256 of the graph's nodes and edges at pause time.
    pub graph_fingerprint: String,
    pub context: serde_json::Value,
    pub skipped: Vec<String>,
    /// Outputs of processed nodes keyed by node id, read by branch edges.
    #[serde(default)]
    pub branch_outputs: BTreeMap<String, serde_json::Value>,
    pub cost_records: Vec<CostRecord>,
}

/// The approver's decision for a paused run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApprovalDecision {
    pub approved: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approver: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

impl ApprovalDecision {
    pub fn approve() -> Self {
        Self {
            approved: true,
            approver: None,
            comment: None,
        }
    }

    pub fn reject(comment: impl Into<String>) -> Self {
        Self {
            approved: false,
            approver: None,
            comment: Some(comment.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_serializes_snake_case() {
        let json = serde_json::to_string(&ExecutionStatus::WaitingApproval).unwrap();
        assert_eq!(json, "\"waiting_approval\"");
        assert_eq!(
            "waiting_approval".parse::<ExecutionStatus>().unwrap(),
            ExecutionStatus::WaitingApproval
        );
        assert_eq!(StepStatus::Skipped.to_string(), "skipped");
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(ExecutionStatus::Completed.is_terminal());
        assert!(ExecutionStatus::Cancelled.is_terminal());
        assert!(!ExecutionStatus::WaitingApproval.is_terminal());
        assert!(!ExecutionStatus::Running.is_terminal());
    }

    #[test]
    fn test_skipped_step_is_already_complete() {
        let step = StepRecord::skipped(Uuid::now_v7(), "n1", "action", 3);
        assert_eq!(step.status, StepStatus::Skipped);
        assert!(step.completed_at.is_some());
        assert!(step.input.is_none());
    }

    #[test]
    fn test_checkpoint_survives_json() {
        let checkpoint = RunCheckpoint {
            execution_id: Uuid::now_v7(),
            paused_node_id: "review".into(),
            paused_step_id: Uuid::now_v7(),
            next_index: 2,
            step_order: vec!["start".into(), "review".into(), "send".into()],
            graph_fingerprint: "ab12".into(),
            context: serde_json::json!({"trigger": {"data": {}}}),
            skipped: vec![],
            branch_outputs: BTreeMap::from([("start".into(), serde_json::json!({}))]),
            cost_records: vec![CostRecord {
                model: "gpt-4o".into(),
                tokens: 10,
                cost: 0.001,
            }],
        };
        let json = serde_json::to_string(&checkpoint).unwrap();
        let back: RunCheckpoint = serde_json::from_str(&json).unwrap();
        assert_eq!(back, checkpoint);
    }
}
