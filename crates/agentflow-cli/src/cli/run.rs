//! `agentflow run`: execute a graph from its trigger.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use uuid::Uuid;

use agentflow_core::repository::ExecutionRepository;
use agentflow_core::workflow::{RunRequest, RunResult};
use agentflow_infra::config::resolve_provider_credentials;
use agentflow_infra::llm::build_provider_router;
use agentflow_types::event::execution_channel;

use super::{display_result, load_credentials, load_graph, parse_trigger, write_checkpoint, RunArgs};
use crate::state::AppState;

pub async fn handle_run(state: &AppState, args: RunArgs, json: bool) -> Result<()> {
    let graph = load_graph(&args.graph)?;
    let trigger_data = parse_trigger(args.trigger.as_deref())?;
    let (credentials, org_providers) = load_credentials(args.credentials.as_deref())?;
    let providers = resolve_provider_credentials(org_providers.as_ref(), &state.config);
    let router = build_provider_router(&providers, &state.config);

    let execution_id = Uuid::now_v7();
    let result = with_run_tasks(state, execution_id, async {
        state
            .orchestrator
            .run(RunRequest {
                execution_id,
                graph,
                trigger_data,
                credentials,
                router,
            })
            .await
    })
    .await
    .context("Run could not be executed")?;

    report(state, &result, args.checkpoint_out.as_deref(), json).await
}

/// Drive `run` with an event watcher and a Ctrl-C handler attached to the
/// execution's channel. Both are torn down when `run` finishes.
pub(super) async fn with_run_tasks<T>(
    state: &AppState,
    execution_id: Uuid,
    run: impl std::future::Future<Output = T>,
) -> T {
    let watcher = watch_events(state, execution_id);
    let interrupt = cancel_on_interrupt(state, execution_id);

    let output = run.await;

    interrupt.abort();
    state.bus.close(&execution_channel(&execution_id));
    if let Err(e) = watcher.await {
        tracing::debug!("event watcher ended abnormally: {e}");
    }
    output
}

/// Write the checkpoint (if paused) and print the result with its steps.
pub(super) async fn report(
    state: &AppState,
    result: &RunResult,
    checkpoint_out: Option<&Path>,
    json: bool,
) -> Result<()> {
    let checkpoint_path = write_checkpoint(result, checkpoint_out)?;
    let steps = state
        .orchestrator
        .repository()
        .list_steps(&result.execution_id)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to list steps: {e}"))?;
    display_result(result, &steps, checkpoint_path.as_deref(), json)
}

fn watch_events(state: &AppState, execution_id: Uuid) -> JoinHandle<()> {
    let mut events = state.bus.subscribe_execution(&execution_id);
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => tracing::info!(
                    %execution_id,
                    event = event.kind.event_type(),
                    "{}",
                    serde_json::to_string(&event).unwrap_or_default()
                ),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(%execution_id, skipped, "event watcher lagged");
                }
                Err(RecvError::Closed) => break,
            }
        }
    })
}

fn cancel_on_interrupt(state: &AppState, execution_id: Uuid) -> JoinHandle<()> {
    let orchestrator = Arc::clone(&state.orchestrator);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!(%execution_id, "interrupt received, cancelling after the current step");
            if let Err(e) = orchestrator.cancel(execution_id).await {
                tracing::warn!(%execution_id, "cancel failed: {e}");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentflow_types::execution::ExecutionStatus;
    use crate::state::test_support::{test_state, write, APPROVAL_GRAPH};
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_run_pauses_and_writes_checkpoint() {
        let tmp = TempDir::new().unwrap();
        let state = test_state(&tmp).await;
        let graph = write(&tmp, "graph.json", APPROVAL_GRAPH);
        let checkpoint_out = tmp.path().join("checkpoint.json");

        handle_run(
            &state,
            RunArgs {
                graph,
                trigger: Some(r#"{"n": 1}"#.into()),
                credentials: None,
                db: None,
                checkpoint_out: Some(checkpoint_out.clone()),
            },
            true,
        )
        .await
        .unwrap();

        let checkpoint = crate::cli::load_checkpoint(&checkpoint_out).unwrap();
        assert_eq!(checkpoint.paused_node_id, "review");
        let execution = state
            .orchestrator
            .repository()
            .get_execution(&checkpoint.execution_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(execution.status, ExecutionStatus::WaitingApproval);
    }
}
