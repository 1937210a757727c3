//! In-memory execution repository.
//!
//! Holds everything behind one mutex; no lock is held across an await.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use agentflow_types::error::RepositoryError;
use agentflow_types::execution::{
    Execution, ExecutionLog, ExecutionUpdate, StepCompletion, StepRecord,
};
use uuid::Uuid;

use super::execution::{apply_completion, apply_update, ExecutionRepository};

#[derive(Debug, Default)]
struct State {
    executions: HashMap<Uuid, Execution>,
    steps: Vec<StepRecord>,
    logs: Vec<ExecutionLog>,
}

#[derive(Debug, Default)]
pub struct InMemoryExecutionRepository {
    state: Mutex<State>,
}

impl InMemoryExecutionRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ExecutionRepository for InMemoryExecutionRepository {
    async fn create_execution(&self, execution: &Execution) -> Result<(), RepositoryError> {
        let mut state = self.state();
        if state.executions.contains_key(&execution.id) {
            return Err(RepositoryError::Conflict(format!(
                "execution {} already exists",
                execution.id
            )));
        }
        state.executions.insert(execution.id, execution.clone());
        Ok(())
    }

    async fn update_execution(
        &self,
        id: &Uuid,
        update: &ExecutionUpdate,
    ) -> Result<Execution, RepositoryError> {
        let mut state = self.state();
        let execution = state
            .executions
            .get_mut(id)
            .ok_or(RepositoryError::NotFound)?;
        apply_update(execution, update)?;
        Ok(execution.clone())
    }

    async fn get_execution(&self, id: &Uuid) -> Result<Option<Execution>, RepositoryError> {
        Ok(self.state().executions.get(id).cloned())
    }

    async fn create_step(&self, step: &StepRecord) -> Result<(), RepositoryError> {
        let mut state = self.state();
        if !state.executions.contains_key(&step.execution_id) {
            return Err(RepositoryError::NotFound);
        }
        state.steps.push(step.clone());
        Ok(())
    }

    async fn finish_step(
        &self,
        step_id: &Uuid,
        completion: &StepCompletion,
    ) -> Result<StepRecord, RepositoryError> {
        let mut state = self.state();
        let step = state
            .steps
            .iter_mut()
            .find(|s| s.id == *step_id)
            .ok_or(RepositoryError::NotFound)?;
        apply_completion(step, completion)?;
        Ok(step.clone())
    }

    async fn list_steps(&self, execution_id: &Uuid) -> Result<Vec<StepRecord>, RepositoryError> {
        let mut steps: Vec<StepRecord> = self
            .state()
            .steps
            .iter()
            .filter(|s| s.execution_id == *execution_id)
            .cloned()
            .collect();
        steps.sort_by_key(|s| (s.order, s.started_at));
        Ok(steps)
    }

    async fn add_log(&self, log: &ExecutionLog) -> Result<(), RepositoryError> {
        self.state().logs.push(log.clone());
        Ok(())
    }

    async fn list_logs(&self, execution_id: &Uuid) -> Result<Vec<ExecutionLog>, RepositoryError> {
        Ok(self
            .state()
            .logs
            .iter()
            .filter(|l| l.execution_id == *execution_id)
            .cloned()
            .collect())
    }
}
