//! agentflow CLI entry point.
//!
//! Binary name: `agentflow`
//!
//! Parses CLI arguments, initializes tracing, then dispatches to the command
//! handler. `validate` needs no database; every other command wires the
//! SQLite repository and the orchestrator through [`AppState`].

mod cli;
mod state;

use clap::Parser;

use agentflow_observe::tracing_setup::{init_tracing, shutdown_tracing, TracingOptions};
use cli::{Cli, Commands};
use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Set up tracing based on verbosity
    let filter = match cli.verbose {
        0 if cli.quiet => "error",
        0 => "warn",
        1 => "info,agentflow_core=debug,agentflow_infra=debug",
        _ => "trace",
    };
    init_tracing(TracingOptions {
        json: cli.log_json,
        otel: cli.otel,
        default_filter: filter.to_string(),
    })
    .map_err(|e| anyhow::anyhow!("failed to initialize tracing: {e}"))?;

    let result = dispatch(cli).await;
    shutdown_tracing();
    result
}

async fn dispatch(cli: Cli) -> anyhow::Result<()> {
    // Validation is pure and needs no app state
    if let Commands::Validate { graph } = &cli.command {
        return cli::validate::handle_validate(graph, cli.json);
    }

    let db = match &cli.command {
        Commands::Run(args) => args.db.clone(),
        Commands::Resume(args) => args.db.clone(),
        Commands::Steps { db, .. } | Commands::Cancel { db, .. } => db.clone(),
        Commands::Validate { .. } => None,
    };
    let state = AppState::init(cli.config.as_deref(), db.as_deref()).await?;

    match cli.command {
        Commands::Run(args) => cli::run::handle_run(&state, args, cli.json).await,
        Commands::Resume(args) => cli::resume::handle_resume(&state, args, cli.json).await,
        Commands::Steps {
            execution_id, logs, ..
        } => cli::steps::handle_steps(&state, &execution_id, logs, cli.json).await,
        Commands::Cancel { execution_id, .. } => {
            cli::steps::handle_cancel(&state, &execution_id, cli.json).await
        }
        Commands::Validate { .. } => Ok(()),
    }
}
