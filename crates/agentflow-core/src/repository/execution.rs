//! Execution repository trait definition.

use agentflow_types::error::RepositoryError;
use agentflow_types::execution::{
    Execution, ExecutionLog, ExecutionStatus, ExecutionUpdate, StepCompletion, StepRecord,
    StepStatus,
};
use chrono::Utc;
use uuid::Uuid;

/// Repository trait for run, step, and log persistence.
///
/// Implementations live in agentflow-infra (e.g., SqliteExecutionRepository).
/// Uses native async fn in traits (Rust 2024 edition, no async_trait macro).
pub trait ExecutionRepository: Send + Sync {
    /// Insert a new execution record.
    fn create_execution(
        &self,
        execution: &Execution,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Apply a status transition. Returns the updated record.
    fn update_execution(
        &self,
        id: &Uuid,
        update: &ExecutionUpdate,
    ) -> impl std::future::Future<Output = Result<Execution, RepositoryError>> + Send;

    fn get_execution(
        &self,
        id: &Uuid,
    ) -> impl std::future::Future<Output = Result<Option<Execution>, RepositoryError>> + Send;

    /// Insert a step record (normally `running` or `skipped`).
    fn create_step(
        &self,
        step: &StepRecord,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Write a step's outcome. Steps in a terminal status are immutable and
    /// yield [`RepositoryError::Conflict`].
    fn finish_step(
        &self,
        step_id: &Uuid,
        completion: &StepCompletion,
    ) -> impl std::future::Future<Output = Result<StepRecord, RepositoryError>> + Send;

    /// Steps of a run in execution order.
    fn list_steps(
        &self,
        execution_id: &Uuid,
    ) -> impl std::future::Future<Output = Result<Vec<StepRecord>, RepositoryError>> + Send;

    fn add_log(
        &self,
        log: &ExecutionLog,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Log lines of a run, oldest first.
    fn list_logs(
        &self,
        execution_id: &Uuid,
    ) -> impl std::future::Future<Output = Result<Vec<ExecutionLog>, RepositoryError>> + Send;
}

/// Apply `update` to `execution` the way every repository must.
///
/// Moving to `running` stamps `started_at` once; a terminal status stamps
/// `completed_at`. A terminal execution cannot change status again.
pub fn apply_update(
    execution: &mut Execution,
    update: &ExecutionUpdate,
) -> Result<(), RepositoryError> {
    if execution.status.is_terminal() && execution.status != update.status {
        return Err(RepositoryError::Conflict(format!(
            "execution {} is already {}",
            execution.id, execution.status
        )));
    }

    let now = Utc::now();
    execution.status = update.status;
    if update.status == ExecutionStatus::Running && execution.started_at.is_none() {
        execution.started_at = Some(now);
    }
    if update.status.is_terminal() {
        execution.completed_at = Some(now);
    }
    if let Some(error) = &update.error {
        execution.error = Some(error.clone());
    }
    if let Some(tokens) = update.total_tokens {
        execution.total_tokens = tokens;
    }
    if let Some(cost) = update.total_cost {
        execution.total_cost = cost;
    }
    Ok(())
}

/// Whether a step status can no longer change.
pub fn step_is_final(status: StepStatus) -> bool {
    matches!(
        status,
        StepStatus::Completed | StepStatus::Failed | StepStatus::Skipped
    )
}

/// Apply `completion` to `step`, enforcing step immutability.
pub fn apply_completion(
    step: &mut StepRecord,
    completion: &StepCompletion,
) -> Result<(), RepositoryError> {
    if step_is_final(step.status) {
        return Err(RepositoryError::Conflict(format!(
            "step {} is already {}",
            step.id, step.status
        )));
    }
    step.status = completion.status;
    step.output = completion.output.clone();
    step.error = completion.error.clone();
    step.tokens_used = completion.tokens_used;
    step.cost = completion.cost;
    step.duration_ms = Some(completion.duration_ms);
    step.attempts = completion.attempts;
    if step_is_final(completion.status) {
        step.completed_at = Some(Utc::now());
    }
    Ok(())
}
