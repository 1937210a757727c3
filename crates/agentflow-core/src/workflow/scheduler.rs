//! Execution ordering and branch activation.
//!
//! Ordering uses Kahn's algorithm with a FIFO queue: roots are taken in
//! declaration order, and later ties resolve in the order nodes become
//! ready. The order is computed once per run; a graph with a cycle is
//! rejected before any node executes.
//!
//! Branch activation is evaluated per node against the outputs recorded so
//! far. A node with no incoming edges is always active. Otherwise it is active
//! iff at least one incoming edge is active, where an edge is active iff its
//! source was not skipped and either the edge is unconditional (no label, or
//! a non-logic source) or its label equals the logic source's `branch` output.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};

use agentflow_types::graph::{Edge, Graph, Node};
use serde_json::Value;

use super::error::EngineError;

/// Compute a topological order of `graph`'s nodes.
pub fn topological_order(graph: &Graph) -> Result<Vec<&Node>, EngineError> {
    let mut index: HashMap<&str, usize> = HashMap::with_capacity(graph.nodes.len());
    for (i, node) in graph.nodes.iter().enumerate() {
        if index.insert(node.id.as_str(), i).is_some() {
            return Err(EngineError::DuplicateNode(node.id.clone()));
        }
    }

    let mut in_degree = vec![0usize; graph.nodes.len()];
    let mut successors: Vec<Vec<usize>> = vec![Vec::new(); graph.nodes.len()];

    for edge in &graph.edges {
        let source = *index
            .get(edge.source_id.as_str())
            .ok_or_else(|| EngineError::UnknownNode(edge.source_id.clone()))?;
        let target = *index
            .get(edge.target_id.as_str())
            .ok_or_else(|| EngineError::UnknownNode(edge.target_id.clone()))?;
        successors[source].push(target);
        in_degree[target] += 1;
    }

    let mut queue: VecDeque<usize> = (0..graph.nodes.len())
        .filter(|&i| in_degree[i] == 0)
        .collect();
    let mut order = Vec::with_capacity(graph.nodes.len());

    while let Some(current) = queue.pop_front() {
        order.push(&graph.nodes[current]);
        for &next in &successors[current] {
            in_degree[next] -= 1;
            if in_degree[next] == 0 {
                queue.push_back(next);
            }
        }
    }

    if order.len() < graph.nodes.len() {
        let nodes = graph
            .nodes
            .iter()
            .enumerate()
            .filter(|(i, _)| in_degree[*i] > 0)
            .map(|(_, n)| n.id.clone())
            .collect();
        return Err(EngineError::GraphCycle { nodes });
    }

    Ok(order)
}

/// Per-run record of skipped nodes and the outputs that branch edges read.
#[derive(Debug, Clone, Default)]
pub struct BranchState {
    skipped: HashSet<String>,
    outputs: HashMap<String, Value>,
}

impl BranchState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild state for a resumed run from what a checkpoint recorded.
    pub fn restore(skipped: &[String], outputs: &BTreeMap<String, Value>) -> Self {
        Self {
            skipped: skipped.iter().cloned().collect(),
            outputs: outputs
                .iter()
                .map(|(id, output)| (id.clone(), output.clone()))
                .collect(),
        }
    }

    pub fn record_output(&mut self, node_id: &str, output: &Value) {
        self.outputs.insert(node_id.to_string(), output.clone());
    }

    pub fn mark_skipped(&mut self, node_id: &str) {
        self.skipped.insert(node_id.to_string());
    }

    pub fn is_skipped(&self, node_id: &str) -> bool {
        self.skipped.contains(node_id)
    }

    /// Skipped node ids, sorted for stable serialization.
    pub fn skipped_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.skipped.iter().cloned().collect();
        ids.sort();
        ids
    }

    /// Recorded outputs keyed by node id, sorted for stable serialization.
    pub fn outputs(&self) -> BTreeMap<String, Value> {
        self.outputs
            .iter()
            .map(|(id, output)| (id.clone(), output.clone()))
            .collect()
    }

    /// Whether `node_id` should execute given everything recorded so far.
    pub fn is_active(&self, graph: &Graph, node_id: &str) -> bool {
        let mut incoming = graph.incoming(node_id).peekable();
        if incoming.peek().is_none() {
            return true;
        }
        incoming.any(|edge| self.edge_active(graph, edge))
    }

    fn edge_active(&self, graph: &Graph, edge: &Edge) -> bool {
        if self.skipped.contains(&edge.source_id) {
            return false;
        }

        let source_is_logic = graph
            .node(&edge.source_id)
            .is_some_and(|n| n.is_logic());

        match edge.branch_label() {
            Some(label) if source_is_logic => {
                self.branch_of(&edge.source_id).as_deref() == Some(label)
            }
            _ => true,
        }
    }

    fn branch_of(&self, node_id: &str) -> Option<String> {
        match self.outputs.get(node_id)?.get("branch")? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }
}
