//! CLI command definitions and shared helpers for the `agentflow` binary.
//!
//! Uses clap derive macros for argument parsing. Graphs, credentials and
//! checkpoints are JSON files; engine settings come from a TOML file.

pub mod resume;
pub mod run;
pub mod steps;
pub mod validate;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use comfy_table::{presets, Cell, Color, ContentArrangement, Table};
use console::style;
use serde_json::Value;

use agentflow_core::workflow::context::Credentials;
use agentflow_core::workflow::RunResult;
use agentflow_types::config::ProvidersConfig;
use agentflow_types::execution::{ExecutionStatus, RunCheckpoint, StepRecord, StepStatus};
use agentflow_types::graph::Graph;

/// Run node graphs of triggers, LLM calls, actions, logic and approvals.
#[derive(Parser)]
#[command(name = "agentflow", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output machine-readable JSON instead of styled text.
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress all output except errors.
    #[arg(long, global = true)]
    pub quiet: bool,

    /// Detailed output (-v for verbose, -vv for debug/trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Emit log lines as JSON.
    #[arg(long, global = true)]
    pub log_json: bool,

    /// Export spans to stdout through OpenTelemetry.
    #[arg(long, global = true)]
    pub otel: bool,

    /// Engine configuration file (TOML).
    #[arg(long, global = true, env = "AGENTFLOW_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Execute a graph from its trigger.
    Run(RunArgs),

    /// Check a graph for cycles and dangling edges and print its execution order.
    Validate {
        /// Path to the graph JSON file.
        #[arg(long)]
        graph: PathBuf,
    },

    /// Continue a run paused at a human node.
    Resume(ResumeArgs),

    /// Show the step records of a run.
    Steps {
        /// Execution UUID.
        execution_id: String,

        /// Also print the run's log entries.
        #[arg(long)]
        logs: bool,

        /// Database URL (defaults to the data directory).
        #[arg(long, env = "AGENTFLOW_DATABASE_URL")]
        db: Option<String>,
    },

    /// Cancel a pending run or one waiting for approval.
    Cancel {
        /// Execution UUID.
        execution_id: String,

        /// Database URL (defaults to the data directory).
        #[arg(long, env = "AGENTFLOW_DATABASE_URL")]
        db: Option<String>,
    },
}

#[derive(Args)]
pub struct RunArgs {
    /// Path to the graph JSON file.
    #[arg(long)]
    pub graph: PathBuf,

    /// Trigger payload as inline JSON, or `@path` to read it from a file.
    #[arg(long)]
    pub trigger: Option<String>,

    /// Credentials JSON file (integration name -> object).
    #[arg(long)]
    pub credentials: Option<PathBuf>,

    /// Database URL (defaults to the data directory).
    #[arg(long, env = "AGENTFLOW_DATABASE_URL")]
    pub db: Option<String>,

    /// Where to write the checkpoint if the run pauses for approval.
    #[arg(long)]
    pub checkpoint_out: Option<PathBuf>,
}

#[derive(Args)]
pub struct ResumeArgs {
    /// Path to the graph JSON file the run was started with.
    #[arg(long)]
    pub graph: PathBuf,

    /// Checkpoint JSON written when the run paused.
    #[arg(long)]
    pub checkpoint: PathBuf,

    /// Reject instead of approve.
    #[arg(long)]
    pub reject: bool,

    /// Comment recorded with the decision.
    #[arg(long)]
    pub comment: Option<String>,

    /// Who made the decision.
    #[arg(long)]
    pub approver: Option<String>,

    /// Credentials JSON file (integration name -> object).
    #[arg(long)]
    pub credentials: Option<PathBuf>,

    /// Database URL (defaults to the data directory).
    #[arg(long, env = "AGENTFLOW_DATABASE_URL")]
    pub db: Option<String>,

    /// Where to write the checkpoint if the run pauses again.
    #[arg(long)]
    pub checkpoint_out: Option<PathBuf>,
}

// ---------------------------------------------------------------------------
// Input files
// ---------------------------------------------------------------------------

/// Key in the credentials file holding LLM provider overrides.
pub const PROVIDERS_KEY: &str = "providers";

pub fn load_graph(path: &Path) -> Result<Graph> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read graph file {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse graph file {}", path.display()))
}

/// Parse `--trigger`: inline JSON, `@file`, or an empty object when absent.
pub fn parse_trigger(raw: Option<&str>) -> Result<Value> {
    match raw {
        None => Ok(Value::Object(Default::default())),
        Some(raw) => {
            let content = match raw.strip_prefix('@') {
                Some(path) => std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read trigger file {path}"))?,
                None => raw.to_string(),
            };
            serde_json::from_str(&content).context("Trigger payload is not valid JSON")
        }
    }
}

/// Split a credentials file into integration credentials and the optional
/// `providers` override block. Provider keys never reach node handlers.
pub fn load_credentials(path: Option<&Path>) -> Result<(Credentials, Option<ProvidersConfig>)> {
    let Some(path) = path else {
        return Ok((Credentials::new(), None));
    };
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read credentials file {}", path.display()))?;
    let mut credentials: Credentials = serde_json::from_str(&content)
        .with_context(|| format!("Credentials file {} must be a JSON object", path.display()))?;

    let providers = credentials
        .remove(PROVIDERS_KEY)
        .map(serde_json::from_value::<ProvidersConfig>)
        .transpose()
        .context("Invalid 'providers' block in credentials file")?;
    Ok((credentials, providers))
}

pub fn load_checkpoint(path: &Path) -> Result<RunCheckpoint> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read checkpoint file {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse checkpoint file {}", path.display()))
}

/// Persist a checkpoint when the run paused and a destination was given.
pub fn write_checkpoint(result: &RunResult, out: Option<&Path>) -> Result<Option<PathBuf>> {
    match (&result.checkpoint, out) {
        (Some(checkpoint), Some(path)) => {
            std::fs::write(path, serde_json::to_string_pretty(checkpoint)?)
                .with_context(|| format!("Failed to write checkpoint to {}", path.display()))?;
            Ok(Some(path.to_path_buf()))
        }
        _ => Ok(None),
    }
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

/// Print the outcome of a run (or resumed segment) and its steps.
pub fn display_result(
    result: &RunResult,
    steps: &[StepRecord],
    checkpoint_path: Option<&Path>,
    json: bool,
) -> Result<()> {
    if json {
        let out = serde_json::json!({
            "execution_id": result.execution_id.to_string(),
            "status": result.status.as_str(),
            "total_tokens": result.total_tokens,
            "total_cost": result.total_cost,
            "cost_summary": result.cost_summary,
            "error": result.error,
            "context": result.context,
            // Inline the checkpoint only when it was not written to a file
            "checkpoint": if checkpoint_path.is_none() { serde_json::to_value(&result.checkpoint)? } else { Value::Null },
            "checkpoint_path": checkpoint_path.map(|p| p.display().to_string()),
            "steps": steps,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    println!();
    println!(
        "  {} Execution {}",
        status_marker(result.status),
        style(result.execution_id).cyan()
    );
    println!("  Status: {}", result.status);
    println!(
        "  Tokens: {}  Cost: ${:.6}",
        result.total_tokens, result.total_cost
    );
    if let Some(ref err) = result.error {
        println!("  Error: {}", style(err).red());
    }
    println!();
    if !steps.is_empty() {
        println!("{}", step_table(steps));
        println!();
    }

    if let Some(ref checkpoint) = result.checkpoint {
        println!(
            "  Paused at '{}' waiting for approval.",
            style(&checkpoint.paused_node_id).yellow()
        );
        match checkpoint_path {
            Some(path) => println!(
                "  Checkpoint written to {}. Continue with: {}",
                path.display(),
                style(format!(
                    "agentflow resume --graph <graph.json> --checkpoint {}",
                    path.display()
                ))
                .dim()
            ),
            None => println!(
                "  {}",
                style("Re-run with --checkpoint-out <file> to save the checkpoint for resume.").dim()
            ),
        }
        println!();
    }

    Ok(())
}

pub fn step_table(steps: &[StepRecord]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("#").fg(Color::Cyan),
            Cell::new("Node"),
            Cell::new("Type"),
            Cell::new("Status"),
            Cell::new("Attempts"),
            Cell::new("Tokens"),
            Cell::new("Cost"),
            Cell::new("Duration"),
            Cell::new("Error"),
        ]);

    for s in steps {
        let duration = s
            .duration_ms
            .map(|ms| format!("{ms}ms"))
            .unwrap_or_else(|| "-".to_string());
        let error = s
            .error
            .as_ref()
            .map(|e| e.chars().take(40).collect::<String>())
            .unwrap_or_else(|| "-".to_string());

        table.add_row(vec![
            Cell::new(s.order),
            Cell::new(&s.node_id),
            Cell::new(&s.node_type),
            format_step_status(s.status),
            Cell::new(s.attempts),
            Cell::new(s.tokens_used),
            Cell::new(format!("{:.6}", s.cost)),
            Cell::new(duration),
            Cell::new(error),
        ]);
    }
    table
}

fn status_marker(status: ExecutionStatus) -> console::StyledObject<&'static str> {
    match status {
        ExecutionStatus::Completed => style("*").green().bold(),
        ExecutionStatus::WaitingApproval => style("||").magenta().bold(),
        ExecutionStatus::Cancelled => style("-").yellow().bold(),
        ExecutionStatus::Failed => style("x").red().bold(),
        ExecutionStatus::Pending | ExecutionStatus::Running => style(">").blue().bold(),
    }
}

fn format_step_status(status: StepStatus) -> Cell {
    match status {
        StepStatus::Running => Cell::new("running").fg(Color::Blue),
        StepStatus::Completed => Cell::new("completed").fg(Color::Green),
        StepStatus::Failed => Cell::new("failed").fg(Color::Red),
        StepStatus::WaitingApproval => Cell::new("waiting_approval").fg(Color::Magenta),
        StepStatus::Skipped => Cell::new("skipped").fg(Color::DarkGrey),
    }
}
