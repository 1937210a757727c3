//! `agentflow resume`: continue a run paused at a human node.

use anyhow::{Context, Result};

use agentflow_core::workflow::ResumeRequest;
use agentflow_infra::config::resolve_provider_credentials;
use agentflow_infra::llm::build_provider_router;
use agentflow_types::execution::ApprovalDecision;

use super::run::{report, with_run_tasks};
use super::{load_checkpoint, load_credentials, load_graph, ResumeArgs};
use crate::state::AppState;

pub async fn handle_resume(state: &AppState, args: ResumeArgs, json: bool) -> Result<()> {
    let graph = load_graph(&args.graph)?;
    let checkpoint = load_checkpoint(&args.checkpoint)?;
    let (credentials, org_providers) = load_credentials(args.credentials.as_deref())?;
    let providers = resolve_provider_credentials(org_providers.as_ref(), &state.config);
    let router = build_provider_router(&providers, &state.config);

    let decision = ApprovalDecision {
        approved: !args.reject,
        approver: args.approver,
        comment: args.comment,
    };
    tracing::info!(
        execution_id = %checkpoint.execution_id,
        node_id = %checkpoint.paused_node_id,
        approved = decision.approved,
        "resuming run"
    );

    let execution_id = checkpoint.execution_id;
    let result = with_run_tasks(state, execution_id, async {
        state
            .orchestrator
            .resume(ResumeRequest {
                graph,
                checkpoint,
                decision,
                credentials,
                router,
            })
            .await
    })
    .await
    .context("Run could not be resumed")?;

    report(state, &result, args.checkpoint_out.as_deref(), json).await
}
