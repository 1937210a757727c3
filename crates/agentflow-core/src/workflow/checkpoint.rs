//! Pause/resume checkpoints.
//!
//! A run that pauses at a human node hands back a [`RunCheckpoint`] instead
//! of keeping state in the engine. Resuming requires the graph's fingerprint
//! (SHA-256 over its nodes and edges) and topological order to match the
//! recorded ones, so a checkpoint can only continue against the graph it was
//! taken from.

use agentflow_types::execution::{ApprovalDecision, RunCheckpoint};
use agentflow_types::graph::{Graph, Node};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use super::context::ExecutionContext;
use super::cost::CostTracker;
use super::error::EngineError;
use super::scheduler::BranchState;

/// Hex SHA-256 of `graph`'s nodes and edges.
///
/// Node configs serialize with sorted object keys, so the fingerprint does not
/// depend on key order in the source document.
pub fn fingerprint(graph: &Graph) -> String {
    let canonical = json!({"nodes": graph.nodes, "edges": graph.edges}).to_string();
    format!("{:x}", Sha256::digest(canonical.as_bytes()))
}

/// Capture a paused run. `paused_index` is the paused node's position.
#[allow(clippy::too_many_arguments)]
pub fn capture(
    execution_id: Uuid,
    graph: &Graph,
    order: &[&Node],
    paused_index: usize,
    paused_step_id: Uuid,
    context: &ExecutionContext,
    branches: &BranchState,
    costs: &CostTracker,
) -> RunCheckpoint {
    RunCheckpoint {
        execution_id,
        paused_node_id: order
            .get(paused_index)
            .map(|n| n.id.clone())
            .unwrap_or_default(),
        paused_step_id,
        next_index: paused_index + 1,
        step_order: order.iter().map(|n| n.id.clone()).collect(),
        graph_fingerprint: fingerprint(graph),
        context: context.snapshot(),
        skipped: branches.skipped_ids(),
        branch_outputs: branches.outputs(),
        cost_records: costs.records().to_vec(),
    }
}

/// Check that `checkpoint` belongs to `execution_id` and was taken from
/// `graph`, whose order is `order`. Returns the paused node.
pub fn validate<'g>(
    checkpoint: &RunCheckpoint,
    execution_id: Uuid,
    graph: &Graph,
    order: &[&'g Node],
) -> Result<&'g Node, EngineError> {
    if checkpoint.execution_id != execution_id {
        return Err(EngineError::InvalidCheckpoint(format!(
            "checkpoint belongs to execution {}",
            checkpoint.execution_id
        )));
    }

    let ids: Vec<&str> = order.iter().map(|n| n.id.as_str()).collect();
    if ids != checkpoint.step_order || fingerprint(graph) != checkpoint.graph_fingerprint {
        return Err(EngineError::InvalidCheckpoint(
            "graph changed since the run paused".to_string(),
        ));
    }

    let paused = checkpoint
        .next_index
        .checked_sub(1)
        .and_then(|i| order.get(i))
        .ok_or_else(|| {
            EngineError::InvalidCheckpoint(format!(
                "resume position {} is out of range",
                checkpoint.next_index
            ))
        })?;
    if paused.id != checkpoint.paused_node_id {
        return Err(EngineError::InvalidCheckpoint(format!(
            "paused node '{}' is not at position {}",
            checkpoint.paused_node_id,
            checkpoint.next_index - 1
        )));
    }
    Ok(paused)
}

/// The output recorded for a human node once a decision arrives.
pub fn decision_output(decision: &ApprovalDecision) -> Value {
    json!({
        "approved": decision.approved,
        "approver": decision.approver,
        "comment": decision.comment,
    })
}
