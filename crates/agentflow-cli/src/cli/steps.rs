//! `agentflow steps` and `agentflow cancel`: inspect and stop stored runs.

use anyhow::{bail, Context, Result};
use comfy_table::{presets, Cell, Color, ContentArrangement, Table};
use console::style;
use uuid::Uuid;

use agentflow_core::repository::ExecutionRepository;
use agentflow_types::execution::LogLevel;

use super::step_table;
use crate::state::AppState;

pub async fn handle_steps(state: &AppState, execution_id_str: &str, logs: bool, json: bool) -> Result<()> {
    let execution_id = parse_execution_id(execution_id_str)?;
    let repo = state.orchestrator.repository();

    let execution = repo
        .get_execution(&execution_id)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to get execution: {e}"))?
        .ok_or_else(|| anyhow::anyhow!("Execution '{execution_id_str}' not found"))?;
    let steps = repo
        .list_steps(&execution_id)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to list steps: {e}"))?;
    let entries = if logs {
        repo.list_logs(&execution_id)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to list logs: {e}"))?
    } else {
        Vec::new()
    };

    if json {
        let mut out = serde_json::json!({
            "execution": execution,
            "steps": steps,
        });
        if logs {
            out["logs"] = serde_json::to_value(&entries)?;
        }
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    println!();
    println!(
        "  Execution {} ({})",
        style(execution.id).cyan(),
        execution.status
    );
    println!(
        "  Tokens: {}  Cost: ${:.6}",
        execution.total_tokens, execution.total_cost
    );
    if let Some(ref err) = execution.error {
        println!("  Error: {}", style(err).red());
    }
    println!();

    if steps.is_empty() {
        println!("  No steps recorded.");
        println!();
    } else {
        println!("{}", step_table(&steps));
        println!();
    }

    if logs && !entries.is_empty() {
        let mut table = Table::new();
        table
            .load_preset(presets::UTF8_FULL_CONDENSED)
            .set_content_arrangement(ContentArrangement::Dynamic)
            .set_header(vec![
                Cell::new("Time").fg(Color::Cyan),
                Cell::new("Level"),
                Cell::new("Message"),
            ]);
        for entry in &entries {
            let level = match entry.level {
                LogLevel::Info => Cell::new("info"),
                LogLevel::Warning => Cell::new("warning").fg(Color::Yellow),
                LogLevel::Error => Cell::new("error").fg(Color::Red),
            };
            table.add_row(vec![
                Cell::new(entry.created_at.format("%H:%M:%S%.3f").to_string()),
                level,
                Cell::new(&entry.message),
            ]);
        }
        println!("{table}");
        println!();
    }

    Ok(())
}

pub async fn handle_cancel(state: &AppState, execution_id_str: &str, json: bool) -> Result<()> {
    let execution_id = parse_execution_id(execution_id_str)?;

    if let Err(e) = state.orchestrator.cancel(execution_id).await {
        bail!("Cannot cancel execution '{execution_id_str}': {e}");
    }

    if json {
        println!(
            "{}",
            serde_json::json!({"cancelled": execution_id_str, "status": "cancelled"})
        );
    } else {
        println!();
        println!(
            "  {} Cancelled execution '{}'",
            style("*").green().bold(),
            style(execution_id_str).cyan()
        );
        println!();
    }

    Ok(())
}

fn parse_execution_id(raw: &str) -> Result<Uuid> {
    raw.parse()
        .with_context(|| format!("Invalid execution ID: '{raw}'"))
}
