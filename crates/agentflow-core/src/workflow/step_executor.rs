//! Single-node execution: `running -> {completed | failed | waiting_approval}`.
//!
//! The executor resolves the node's config against the run context, persists
//! a `running` step, invokes the handler under the run's retry policy, and
//! writes the step's outcome. Repository failures are engine errors; handler
//! failures are reported as [`StepResult::Failed`] so the orchestrator can
//! fail the run without unwinding.

use std::time::Instant;

use agentflow_types::event::EventKind;
use agentflow_types::execution::{ExecutionLog, LogLevel, StepCompletion, StepRecord, StepStatus};
use agentflow_types::graph::Node;
use serde_json::Value;
use tracing::{info_span, Instrument};
use uuid::Uuid;

use super::context::ExecutionContext;
use super::cost::CostTracker;
use super::error::EngineError;
use super::resolver::resolve_value;
use super::retry::{execute_with_retry, RetryNotice, RetryPolicy};
use crate::event::EventEmitter;
use crate::handler::{HandlerInput, HandlerOutcome, HandlerRegistry};
use crate::llm::router::ProviderRouter;
use crate::repository::ExecutionRepository;

/// Model name recorded for token usage that names no model.
pub const UNKNOWN_MODEL: &str = "unknown";

/// How one node's execution ended.
#[derive(Debug, Clone, PartialEq)]
pub enum StepResult {
    Completed { step_id: Uuid, output: Value },
    AwaitingApproval { step_id: Uuid, message: String },
    Failed { step_id: Uuid, error: String },
}

/// Executes nodes of one run. Borrowed collaborators are owned by the
/// orchestrator.
pub struct StepExecutor<'a, R: ExecutionRepository> {
    pub execution_id: Uuid,
    pub repository: &'a R,
    pub emitter: &'a EventEmitter,
    pub registry: &'a HandlerRegistry,
    pub policy: &'a RetryPolicy,
}

impl<R: ExecutionRepository> StepExecutor<'_, R> {
    /// Execute `node` at position `order` of the run.
    pub async fn execute(
        &self,
        node: &Node,
        order: u32,
        context: &ExecutionContext,
        router: &ProviderRouter,
        costs: &mut CostTracker,
    ) -> Result<StepResult, EngineError> {
        let span = info_span!(
            "workflow.step",
            execution_id = %self.execution_id,
            node_id = %node.id,
            node_type = %node.node_type,
            order,
        );
        self.execute_inner(node, order, context, router, costs)
            .instrument(span)
            .await
    }

    async fn execute_inner(
        &self,
        node: &Node,
        order: u32,
        context: &ExecutionContext,
        router: &ProviderRouter,
        costs: &mut CostTracker,
    ) -> Result<StepResult, EngineError> {
        let config = resolve_value(&node.config, &context.as_value());
        let step = StepRecord::running(
            self.execution_id,
            &node.id,
            &node.node_type,
            order,
            config.clone(),
        );
        let step_id = step.id;
        self.repository.create_step(&step).await?;
        self.emitter.emit(
            self.execution_id,
            EventKind::StepStarted {
                step_id,
                node_id: node.id.clone(),
                node_type: node.node_type.clone(),
                order,
            },
        );

        let started = Instant::now();

        let handler = match self.registry.lookup(node) {
            Ok(handler) => handler,
            Err(err) => {
                return self
                    .fail(node, step_id, err.to_string(), 1, elapsed_ms(started))
                    .await;
            }
        };

        let input = HandlerInput {
            node,
            config: &config,
            step_id,
            context,
            router,
        };
        let outcome = execute_with_retry(self.policy, |_| handler.execute(&input)).await;

        let retries = match &outcome {
            Ok(attempted) => &attempted.retries,
            Err(failure) => &failure.retries,
        };
        self.log_retries(node, step_id, retries).await?;

        let attempted = match outcome {
            Ok(attempted) => attempted,
            Err(failure) => {
                return self
                    .fail(
                        node,
                        step_id,
                        failure.error.to_string(),
                        failure.attempts,
                        elapsed_ms(started),
                    )
                    .await;
            }
        };
        let duration_ms = elapsed_ms(started);

        match attempted.value {
            HandlerOutcome::Completed(output) => {
                self.repository
                    .finish_step(
                        &step_id,
                        &StepCompletion {
                            status: StepStatus::Completed,
                            output: Some(output.data.clone()),
                            error: None,
                            tokens_used: output.tokens_used,
                            cost: output.cost,
                            duration_ms,
                            attempts: attempted.attempts,
                        },
                    )
                    .await?;

                if output.tokens_used > 0 || output.cost > 0.0 {
                    let model = output
                        .model
                        .clone()
                        .or_else(|| config.get("model").and_then(Value::as_str).map(str::to_string))
                        .unwrap_or_else(|| UNKNOWN_MODEL.to_string());
                    costs.add_step(model, output.tokens_used, output.cost);
                }

                self.log(
                    step_id,
                    LogLevel::Info,
                    format!("Node '{}' completed in {duration_ms}ms", node.id),
                )
                .await?;
                tracing::info!(
                    node_id = %node.id,
                    attempts = attempted.attempts,
                    duration_ms,
                    tokens = output.tokens_used,
                    "step completed"
                );
                self.emitter.emit(
                    self.execution_id,
                    EventKind::StepCompleted {
                        step_id,
                        node_id: node.id.clone(),
                        output: output.data.clone(),
                        tokens_used: output.tokens_used,
                        cost: output.cost,
                        duration_ms,
                    },
                );
                Ok(StepResult::Completed {
                    step_id,
                    output: output.data,
                })
            }
            HandlerOutcome::ApprovalRequired(request) => {
                self.repository
                    .finish_step(
                        &step_id,
                        &StepCompletion {
                            status: StepStatus::WaitingApproval,
                            output: None,
                            error: None,
                            tokens_used: 0,
                            cost: 0.0,
                            duration_ms,
                            attempts: attempted.attempts,
                        },
                    )
                    .await?;
                self.log(
                    step_id,
                    LogLevel::Info,
                    format!("Node '{}' awaiting approval: {}", node.id, request.message),
                )
                .await?;
                tracing::info!(node_id = %node.id, "step waiting for approval");
                self.emitter.emit(
                    self.execution_id,
                    EventKind::StepWaitingApproval {
                        step_id,
                        node_id: node.id.clone(),
                        message: request.message.clone(),
                    },
                );
                Ok(StepResult::AwaitingApproval {
                    step_id,
                    message: request.message,
                })
            }
        }
    }

    /// Record `node` as skipped by branch evaluation.
    pub async fn skip(&self, node: &Node, order: u32) -> Result<(), EngineError> {
        let step = StepRecord::skipped(self.execution_id, &node.id, &node.node_type, order);
        self.repository.create_step(&step).await?;
        tracing::debug!(node_id = %node.id, "node skipped");
        self.emitter.emit(
            self.execution_id,
            EventKind::StepSkipped {
                node_id: node.id.clone(),
            },
        );
        Ok(())
    }

    async fn fail(
        &self,
        node: &Node,
        step_id: Uuid,
        error: String,
        attempts: u32,
        duration_ms: u64,
    ) -> Result<StepResult, EngineError> {
        self.repository
            .finish_step(
                &step_id,
                &StepCompletion {
                    status: StepStatus::Failed,
                    output: None,
                    error: Some(error.clone()),
                    tokens_used: 0,
                    cost: 0.0,
                    duration_ms,
                    attempts,
                },
            )
            .await?;
        self.log(
            step_id,
            LogLevel::Error,
            format!("Node '{}' failed: {error}", node.id),
        )
        .await?;
        tracing::error!(node_id = %node.id, attempts, error = %error, "step failed");
        self.emitter.emit(
            self.execution_id,
            EventKind::StepFailed {
                step_id,
                node_id: node.id.clone(),
                error: error.clone(),
                duration_ms,
            },
        );
        Ok(StepResult::Failed { step_id, error })
    }

    async fn log_retries(
        &self,
        node: &Node,
        step_id: Uuid,
        retries: &[RetryNotice],
    ) -> Result<(), EngineError> {
        for notice in retries {
            self.log(
                step_id,
                LogLevel::Warning,
                format!(
                    "Node '{}' attempt {}/{} failed, retrying in {:.1}s: {}",
                    node.id,
                    notice.attempt,
                    self.policy.max_retries + 1,
                    notice.backoff.as_secs_f64(),
                    notice.error
                ),
            )
            .await?;
        }
        Ok(())
    }

    async fn log(&self, step_id: Uuid, level: LogLevel, message: String) -> Result<(), EngineError> {
        self.repository
            .add_log(&ExecutionLog::new(
                self.execution_id,
                Some(step_id),
                level,
                message,
            ))
            .await?;
        Ok(())
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}
