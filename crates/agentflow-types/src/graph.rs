//! Graph definition types: nodes, edges, and graph-level settings.
//!
//! A graph is loaded by an external persistence collaborator and is immutable
//! for the duration of a run. Node types are kept as raw strings so that an
//! unknown type surfaces as a validation error when the node is dispatched,
//! not when the graph is deserialized.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// The fixed set of node variants the engine knows how to execute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    Trigger,
    Ai,
    Action,
    Logic,
    Human,
}

impl NodeKind {
    /// All variants, in registry order.
    pub const ALL: [NodeKind; 5] = [
        NodeKind::Trigger,
        NodeKind::Ai,
        NodeKind::Action,
        NodeKind::Logic,
        NodeKind::Human,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            NodeKind::Trigger => "trigger",
            NodeKind::Ai => "ai",
            NodeKind::Action => "action",
            NodeKind::Logic => "logic",
            NodeKind::Human => "human",
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NodeKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "trigger" => Ok(NodeKind::Trigger),
            "ai" => Ok(NodeKind::Ai),
            "action" => Ok(NodeKind::Action),
            "logic" => Ok(NodeKind::Logic),
            "human" => Ok(NodeKind::Human),
            other => Err(format!("unknown node type: '{other}'")),
        }
    }
}

/// A single automation step in a graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: String,
    #[serde(rename = "type")]
    pub node_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtype: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default)]
    pub config: serde_json::Value,
}

impl Node {
    /// Key under which this node's output is stored in the run context.
    ///
    /// An absent or empty label falls back to the node id.
    pub fn key(&self) -> &str {
        match self.label.as_deref() {
            Some(label) if !label.is_empty() => label,
            _ => &self.id,
        }
    }

    /// Parse the node's type string into a [`NodeKind`].
    pub fn kind(&self) -> Result<NodeKind, String> {
        self.node_type.parse()
    }

    /// Whether this node is a logic node (the only source of branch labels).
    pub fn is_logic(&self) -> bool {
        self.node_type == NodeKind::Logic.as_str()
    }
}

/// A directed dependency between two nodes.
///
/// `label` is a branch tag; it only has meaning on edges leaving a logic node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    pub source_id: String,
    pub target_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

impl Edge {
    /// The branch label, treating an empty string as unconditional.
    pub fn branch_label(&self) -> Option<&str> {
        self.label.as_deref().filter(|l| !l.is_empty())
    }
}

/// Graph-level settings that shape a run (currently the retry policy).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_retries: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backoff_base: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backoff_max_secs: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retryable: Option<Vec<String>>,
}

/// A published graph version: nodes, edges, and settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Graph {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub edges: Vec<Edge>,
    #[serde(default)]
    pub settings: GraphSettings,
}

impl Graph {
    /// Look up a node by id.
    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id == id)
    }

    /// All edges pointing at `node_id`.
    pub fn incoming<'a>(&'a self, node_id: &'a str) -> impl Iterator<Item = &'a Edge> + 'a {
        self.edges.iter().filter(move |e| e.target_id == node_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_kind_round_trips_through_str() {
        for kind in NodeKind::ALL {
            assert_eq!(kind.as_str().parse::<NodeKind>().unwrap(), kind);
        }
        assert!("webhook".parse::<NodeKind>().is_err());
    }

    #[test]
    fn test_node_key_falls_back_to_id() {
        let mut node: Node = serde_json::from_value(serde_json::json!({
            "id": "n1",
            "type": "ai",
        }))
        .unwrap();
        assert_eq!(node.key(), "n1");

        node.label = Some(String::new());
        assert_eq!(node.key(), "n1");

        node.label = Some("summarize".into());
        assert_eq!(node.key(), "summarize");
    }

    #[test]
    fn test_unknown_node_type_deserializes() {
        let node: Node = serde_json::from_value(serde_json::json!({
            "id": "n1",
            "type": "teleport",
            "config": {"x": 1}
        }))
        .unwrap();
        assert!(node.kind().is_err());
        assert_eq!(node.config["x"], 1);
    }

    #[test]
    fn test_graph_deserializes_with_defaults() {
        let graph: Graph = serde_json::from_str(
            r#"{
                "nodes": [{"id": "a", "type": "trigger"}, {"id": "b", "type": "logic"}],
                "edges": [{"source_id": "a", "target_id": "b", "label": ""}]
            }"#,
        )
        .unwrap();
        assert_eq!(graph.nodes.len(), 2);
        assert!(graph.settings.max_retries.is_none());
        assert!(graph.node("b").unwrap().is_logic());
        assert_eq!(graph.edges[0].branch_label(), None);
        assert_eq!(graph.incoming("b").count(), 1);
    }
}
