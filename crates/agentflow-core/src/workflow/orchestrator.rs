//! Run orchestration: ordering, branch skipping, the run loop, finalization.
//!
//! # Execution flow
//!
//! 1. Load (or create) the `pending` execution record.
//! 2. Compute the topological order. A cycle fails the run here, before it
//!    ever moves to `running` and before any step record exists.
//! 3. Walk the order one node at a time. Inactive nodes are recorded as
//!    skipped; active nodes go through the [`StepExecutor`] and their
//!    output is merged into the context under the node's key.
//! 4. Finalize: `completed`, `failed` (first failing step halts the run),
//!    `waiting_approval` (a human node paused it; a [`RunCheckpoint`] is
//!    returned), or `cancelled`.
//!
//! Nodes execute strictly sequentially, even where the graph would allow
//! parallel branches. Cancellation is checked between nodes and never
//! interrupts a step already in progress.

use std::sync::Arc;

use agentflow_types::event::EventKind;
use agentflow_types::execution::{
    ApprovalDecision, CostSummary, Execution, ExecutionLog, ExecutionStatus, ExecutionUpdate,
    LogLevel, RunCheckpoint, StepCompletion, StepStatus,
};
use agentflow_types::graph::{Graph, Node};
use dashmap::DashMap;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{info_span, Instrument};
use uuid::Uuid;

use super::checkpoint;
use super::context::{Credentials, ExecutionContext};
use super::cost::CostTracker;
use super::error::EngineError;
use super::retry::RetryPolicy;
use super::scheduler::{topological_order, BranchState};
use super::step_executor::{StepExecutor, StepResult};
use crate::event::{EventEmitter, EventSink};
use crate::handler::HandlerRegistry;
use crate::llm::router::ProviderRouter;
use crate::repository::ExecutionRepository;

// ---------------------------------------------------------------------------
// Requests and results
// ---------------------------------------------------------------------------

/// Everything one run needs. The router is built per run from the caller's
/// resolved credentials.
pub struct RunRequest {
    pub execution_id: Uuid,
    pub graph: Graph,
    pub trigger_data: Value,
    pub credentials: Credentials,
    pub router: ProviderRouter,
}

/// Continue a paused run with an approval decision.
pub struct ResumeRequest {
    pub graph: Graph,
    pub checkpoint: RunCheckpoint,
    pub decision: ApprovalDecision,
    pub credentials: Credentials,
    pub router: ProviderRouter,
}

/// How a run (or a resumed segment of it) ended.
#[derive(Debug, Clone)]
pub struct RunResult {
    pub execution_id: Uuid,
    pub status: ExecutionStatus,
    pub total_tokens: u64,
    pub total_cost: f64,
    pub cost_summary: CostSummary,
    /// Final template-visible context (credentials excluded).
    pub context: Value,
    pub error: Option<String>,
    /// Present when `status` is `waiting_approval`.
    pub checkpoint: Option<RunCheckpoint>,
}

/// Mutable state of one run while it is being driven.
struct RunState<'g> {
    execution_id: Uuid,
    graph: &'g Graph,
    order: Vec<&'g Node>,
    context: ExecutionContext,
    branches: BranchState,
    costs: CostTracker,
    policy: RetryPolicy,
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

/// Drives graph runs against a repository and an event sink.
///
/// Generic over `R: ExecutionRepository` for storage flexibility. Holds no
/// per-run state other than cancellation tokens of runs in flight.
pub struct Orchestrator<R: ExecutionRepository> {
    repository: Arc<R>,
    emitter: EventEmitter,
    registry: Arc<HandlerRegistry>,
    retry_defaults: RetryPolicy,
    /// Cancellation tokens keyed by execution id.
    cancellation_tokens: DashMap<Uuid, CancellationToken>,
}

impl<R: ExecutionRepository> Orchestrator<R> {
    pub fn new(repository: Arc<R>, sink: Arc<dyn EventSink>, registry: Arc<HandlerRegistry>) -> Self {
        Self {
            repository,
            emitter: EventEmitter::new(sink),
            registry,
            retry_defaults: RetryPolicy::default(),
            cancellation_tokens: DashMap::new(),
        }
    }

    /// Retry policy used where a graph's settings leave a field unset.
    pub fn with_retry_defaults(mut self, policy: RetryPolicy) -> Self {
        self.retry_defaults = policy;
        self
    }

    pub fn repository(&self) -> &Arc<R> {
        &self.repository
    }

    /// Execute a graph from the start.
    ///
    /// Returns `Err` only for structural problems and storage failures; a
    /// failing step yields `Ok` with `status: failed`.
    pub async fn run(&self, request: RunRequest) -> Result<RunResult, EngineError> {
        let execution_id = request.execution_id;
        let span = info_span!("workflow.run", %execution_id, graph_id = ?request.graph.id);
        self.run_inner(request).instrument(span).await
    }

    async fn run_inner(&self, request: RunRequest) -> Result<RunResult, EngineError> {
        let RunRequest {
            execution_id,
            graph,
            trigger_data,
            credentials,
            router,
        } = request;

        let execution = match self.repository.get_execution(&execution_id).await? {
            Some(execution) => execution,
            None => {
                let execution =
                    Execution::pending(execution_id, graph.id.clone(), trigger_data.clone());
                self.repository.create_execution(&execution).await?;
                execution
            }
        };
        if execution.status != ExecutionStatus::Pending {
            return Err(EngineError::InvalidState {
                id: execution_id,
                status: execution.status.to_string(),
                operation: "run",
            });
        }

        let order = match topological_order(&graph) {
            Ok(order) => order,
            Err(err) => {
                tracing::error!(%execution_id, error = %err, "graph rejected before execution");
                self.repository
                    .update_execution(&execution_id, &ExecutionUpdate::failed(err.to_string()))
                    .await?;
                self.emitter.emit(
                    execution_id,
                    EventKind::ExecutionFailed {
                        error: err.to_string(),
                    },
                );
                return Err(err);
            }
        };

        self.repository
            .update_execution(&execution_id, &ExecutionUpdate::status(ExecutionStatus::Running))
            .await?;
        self.emitter.emit(
            execution_id,
            EventKind::ExecutionStarted {
                node_count: order.len(),
            },
        );
        tracing::info!(%execution_id, nodes = order.len(), "execution started");

        let state = RunState {
            execution_id,
            graph: &graph,
            order,
            context: ExecutionContext::new(execution_id, trigger_data, credentials),
            branches: BranchState::new(),
            costs: CostTracker::new(),
            policy: RetryPolicy::for_graph(&self.retry_defaults, &graph.settings),
        };
        self.drive_tracked(state, 0, &router).await
    }

    /// Continue a run paused at a human node.
    ///
    /// The human step is completed with `{approved, approver, comment}` as its
    /// output, which downstream nodes can reference and branch on; a
    /// rejection does not end the run by itself.
    pub async fn resume(&self, request: ResumeRequest) -> Result<RunResult, EngineError> {
        let execution_id = request.checkpoint.execution_id;
        let span = info_span!("workflow.resume", %execution_id);
        self.resume_inner(request).instrument(span).await
    }

    async fn resume_inner(&self, request: ResumeRequest) -> Result<RunResult, EngineError> {
        let ResumeRequest {
            graph,
            checkpoint,
            decision,
            credentials,
            router,
        } = request;
        let execution_id = checkpoint.execution_id;

        let execution = self
            .repository
            .get_execution(&execution_id)
            .await?
            .ok_or(EngineError::RunNotFound(execution_id))?;
        if execution.status != ExecutionStatus::WaitingApproval {
            return Err(EngineError::InvalidState {
                id: execution_id,
                status: execution.status.to_string(),
                operation: "resume",
            });
        }

        let order = topological_order(&graph)?;
        let paused = checkpoint::validate(&checkpoint, execution_id, &graph, &order)?;

        let output = checkpoint::decision_output(&decision);
        self.repository
            .finish_step(
                &checkpoint.paused_step_id,
                &StepCompletion {
                    status: StepStatus::Completed,
                    output: Some(output.clone()),
                    error: None,
                    tokens_used: 0,
                    cost: 0.0,
                    duration_ms: 0,
                    attempts: 1,
                },
            )
            .await?;
        let verdict = if decision.approved { "approved" } else { "rejected" };
        self.repository
            .add_log(&ExecutionLog::new(
                execution_id,
                Some(checkpoint.paused_step_id),
                LogLevel::Info,
                format!(
                    "Node '{}' {verdict} by {}",
                    paused.id,
                    decision.approver.as_deref().unwrap_or("unknown approver")
                ),
            ))
            .await?;

        let mut context = ExecutionContext::restore(execution_id, checkpoint.context, credentials);
        context.set_output(paused.key(), output.clone());
        let mut branches = BranchState::restore(&checkpoint.skipped, &checkpoint.branch_outputs);
        branches.record_output(&paused.id, &output);

        self.repository
            .update_execution(&execution_id, &ExecutionUpdate::status(ExecutionStatus::Running))
            .await?;
        self.emitter.emit(
            execution_id,
            EventKind::ExecutionResumed {
                node_id: paused.id.clone(),
                approved: decision.approved,
            },
        );
        self.emitter.emit(
            execution_id,
            EventKind::StepCompleted {
                step_id: checkpoint.paused_step_id,
                node_id: paused.id.clone(),
                output,
                tokens_used: 0,
                cost: 0.0,
                duration_ms: 0,
            },
        );
        tracing::info!(%execution_id, node_id = %paused.id, approved = decision.approved, "execution resumed");

        let state = RunState {
            execution_id,
            graph: &graph,
            order,
            context,
            branches,
            costs: CostTracker::from_records(checkpoint.cost_records),
            policy: RetryPolicy::for_graph(&self.retry_defaults, &graph.settings),
        };
        self.drive_tracked(state, checkpoint.next_index, &router).await
    }

    /// Request cancellation of a run.
    ///
    /// A run in flight stops before its next node. A `pending` or paused run
    /// is marked `cancelled` immediately.
    pub async fn cancel(&self, execution_id: Uuid) -> Result<(), EngineError> {
        if let Some(token) = self.cancellation_tokens.get(&execution_id) {
            token.cancel();
            tracing::info!(%execution_id, "cancellation requested");
            return Ok(());
        }

        let execution = self
            .repository
            .get_execution(&execution_id)
            .await?
            .ok_or(EngineError::RunNotFound(execution_id))?;
        match execution.status {
            ExecutionStatus::Pending | ExecutionStatus::WaitingApproval => {
                self.repository
                    .update_execution(
                        &execution_id,
                        &ExecutionUpdate::status(ExecutionStatus::Cancelled),
                    )
                    .await?;
                self.emitter
                    .emit(execution_id, EventKind::ExecutionCancelled {});
                tracing::info!(%execution_id, "execution cancelled");
                Ok(())
            }
            status => Err(EngineError::InvalidState {
                id: execution_id,
                status: status.to_string(),
                operation: "cancel",
            }),
        }
    }

    /// Drive the run with a registered cancellation token.
    async fn drive_tracked(
        &self,
        state: RunState<'_>,
        start: usize,
        router: &ProviderRouter,
    ) -> Result<RunResult, EngineError> {
        let execution_id = state.execution_id;
        let token = CancellationToken::new();
        self.cancellation_tokens.insert(execution_id, token.clone());
        let result = self.drive(state, start, router, &token).await;
        self.cancellation_tokens.remove(&execution_id);
        if let Err(ref err) = result {
            self.fail_after_error(execution_id, err).await;
        }
        result
    }

    /// Best-effort finalization after a storage error mid-run: steps left
    /// `running` and the execution itself are marked `failed`.
    async fn fail_after_error(&self, execution_id: Uuid, err: &EngineError) {
        let message = err.to_string();
        tracing::error!(%execution_id, error = %message, "run aborted by an engine error");

        match self.repository.list_steps(&execution_id).await {
            Ok(steps) => {
                for step in steps.iter().filter(|s| s.status == StepStatus::Running) {
                    let completion = StepCompletion {
                        status: StepStatus::Failed,
                        output: None,
                        error: Some(message.clone()),
                        tokens_used: 0,
                        cost: 0.0,
                        duration_ms: 0,
                        attempts: step.attempts.max(1),
                    };
                    if let Err(e) = self.repository.finish_step(&step.id, &completion).await {
                        tracing::warn!(%execution_id, step_id = %step.id, "could not fail step: {e}");
                    }
                }
            }
            Err(e) => tracing::warn!(%execution_id, "could not list steps: {e}"),
        }

        match self
            .repository
            .update_execution(&execution_id, &ExecutionUpdate::failed(message.clone()))
            .await
        {
            Ok(_) => self
                .emitter
                .emit(execution_id, EventKind::ExecutionFailed { error: message }),
            Err(e) => tracing::warn!(%execution_id, "could not mark execution failed: {e}"),
        }
    }

    async fn drive(
        &self,
        mut state: RunState<'_>,
        start: usize,
        router: &ProviderRouter,
        cancel: &CancellationToken,
    ) -> Result<RunResult, EngineError> {
        let executor = StepExecutor {
            execution_id: state.execution_id,
            repository: self.repository.as_ref(),
            emitter: &self.emitter,
            registry: self.registry.as_ref(),
            policy: &state.policy,
        };

        for index in start..state.order.len() {
            let node = state.order[index];
            let order = u32::try_from(index).unwrap_or(u32::MAX);

            if cancel.is_cancelled() {
                return self.finish_cancelled(&state).await;
            }

            if !state.branches.is_active(state.graph, &node.id) {
                state.branches.mark_skipped(&node.id);
                executor.skip(node, order).await?;
                continue;
            }

            let result = executor
                .execute(node, order, &state.context, router, &mut state.costs)
                .await?;
            match result {
                StepResult::Completed { output, .. } => {
                    state.branches.record_output(&node.id, &output);
                    state.context.set_output(node.key(), output);
                }
                StepResult::AwaitingApproval { step_id, message } => {
                    return self.finish_paused(&state, index, step_id, message).await;
                }
                StepResult::Failed { error, .. } => {
                    return self.finish_failed(&state, error).await;
                }
            }
        }

        self.finish_completed(&state).await
    }

    // -- finalization -------------------------------------------------------

    async fn finish_completed(&self, state: &RunState<'_>) -> Result<RunResult, EngineError> {
        let id = state.execution_id;
        self.repository
            .update_execution(
                &id,
                &ExecutionUpdate::status(ExecutionStatus::Completed)
                    .with_totals(state.costs.total_tokens(), state.costs.total_cost()),
            )
            .await?;
        self.emitter.emit(
            id,
            EventKind::ExecutionCompleted {
                total_tokens: state.costs.total_tokens(),
                total_cost: state.costs.total_cost(),
            },
        );
        tracing::info!(
            execution_id = %id,
            total_tokens = state.costs.total_tokens(),
            total_cost = state.costs.total_cost(),
            "execution completed"
        );
        Ok(result(state, ExecutionStatus::Completed, None, None))
    }

    async fn finish_failed(
        &self,
        state: &RunState<'_>,
        error: String,
    ) -> Result<RunResult, EngineError> {
        let id = state.execution_id;
        self.repository
            .update_execution(
                &id,
                &ExecutionUpdate::failed(error.clone())
                    .with_totals(state.costs.total_tokens(), state.costs.total_cost()),
            )
            .await?;
        self.emitter.emit(
            id,
            EventKind::ExecutionFailed {
                error: error.clone(),
            },
        );
        tracing::warn!(execution_id = %id, error = %error, "execution failed");
        Ok(result(state, ExecutionStatus::Failed, Some(error), None))
    }

    async fn finish_paused(
        &self,
        state: &RunState<'_>,
        index: usize,
        step_id: Uuid,
        message: String,
    ) -> Result<RunResult, EngineError> {
        let id = state.execution_id;
        let node_id = state.order[index].id.clone();
        self.repository
            .update_execution(
                &id,
                &ExecutionUpdate::status(ExecutionStatus::WaitingApproval)
                    .with_totals(state.costs.total_tokens(), state.costs.total_cost()),
            )
            .await?;
        self.emitter.emit(
            id,
            EventKind::ExecutionWaitingApproval {
                node_id: node_id.clone(),
                step_id,
                message,
            },
        );
        tracing::info!(execution_id = %id, node_id = %node_id, "execution waiting for approval");

        let checkpoint = checkpoint::capture(
            id,
            state.graph,
            &state.order,
            index,
            step_id,
            &state.context,
            &state.branches,
            &state.costs,
        );
        Ok(result(
            state,
            ExecutionStatus::WaitingApproval,
            None,
            Some(checkpoint),
        ))
    }

    async fn finish_cancelled(&self, state: &RunState<'_>) -> Result<RunResult, EngineError> {
        let id = state.execution_id;
        self.repository
            .update_execution(
                &id,
                &ExecutionUpdate::status(ExecutionStatus::Cancelled)
                    .with_totals(state.costs.total_tokens(), state.costs.total_cost()),
            )
            .await?;
        self.emitter.emit(id, EventKind::ExecutionCancelled {});
        tracing::info!(execution_id = %id, "execution cancelled");
        Ok(result(state, ExecutionStatus::Cancelled, None, None))
    }
}

fn result(
    state: &RunState<'_>,
    status: ExecutionStatus,
    error: Option<String>,
    checkpoint: Option<RunCheckpoint>,
) -> RunResult {
    RunResult {
        execution_id: state.execution_id,
        status,
        total_tokens: state.costs.total_tokens(),
        total_cost: state.costs.total_cost(),
        cost_summary: state.costs.summary(),
        context: state.context.as_value(),
        error,
        checkpoint,
    }
}

impl<R: ExecutionRepository> std::fmt::Debug for Orchestrator<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("registry", &self.registry)
            .field("retry_defaults", &self.retry_defaults)
            .field("runs_in_flight", &self.cancellation_tokens.len())
            .finish()
    }
}
