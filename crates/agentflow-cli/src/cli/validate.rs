//! `agentflow validate`: structural checks without executing anything.

use std::path::Path;

use anyhow::{bail, Result};
use console::style;

use agentflow_core::workflow::scheduler::topological_order;

use super::load_graph;

pub fn handle_validate(graph_path: &Path, json: bool) -> Result<()> {
    let graph = load_graph(graph_path)?;

    let order: Vec<String> = match topological_order(&graph) {
        Ok(nodes) => nodes.iter().map(|n| n.id.clone()).collect(),
        Err(err) => {
            if json {
                println!(
                    "{}",
                    serde_json::json!({"valid": false, "error": err.to_string()})
                );
            }
            bail!("Graph is invalid: {err}");
        }
    };

    if json {
        let out = serde_json::json!({
            "valid": true,
            "nodes": graph.nodes.len(),
            "edges": graph.edges.len(),
            "order": order,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    println!();
    println!(
        "  {} Graph '{}' is valid ({} nodes, {} edges)",
        style("*").green().bold(),
        style(graph.name.as_deref().or(graph.id.as_deref()).unwrap_or("unnamed")).cyan(),
        graph.nodes.len(),
        graph.edges.len()
    );
    println!("  Execution order:");
    for (i, id) in order.iter().enumerate() {
        println!("    {}. {id}", i + 1);
    }
    println!();

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_graph(dir: &TempDir, body: &str) -> std::path::PathBuf {
        let path = dir.path().join("graph.json");
        std::fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn test_acyclic_graph_is_valid() {
        let tmp = TempDir::new().unwrap();
        let path = write_graph(
            &tmp,
            r#"{"nodes": [{"id": "a", "type": "trigger"}, {"id": "b", "type": "ai"}],
                "edges": [{"source_id": "a", "target_id": "b"}]}"#,
        );
        handle_validate(&path, true).unwrap();
    }

    #[test]
    fn test_cycle_is_reported() {
        let tmp = TempDir::new().unwrap();
        let path = write_graph(
            &tmp,
            r#"{"nodes": [{"id": "a", "type": "ai"}, {"id": "b", "type": "ai"}],
                "edges": [{"source_id": "a", "target_id": "b"}, {"source_id": "b", "target_id": "a"}]}"#,
        );
        let err = handle_validate(&path, false).unwrap_err();
        assert!(err.to_string().contains("cycle"));
    }
}
