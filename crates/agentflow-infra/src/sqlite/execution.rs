//! SQLite execution repository implementation.
//!
//! Implements `ExecutionRepository` from `agentflow-core` using sqlx with
//! split read/write pools. Status transitions are read-modify-write inside
//! one writer transaction and go through the same `apply_update` /
//! `apply_completion` rules as every other repository.

use agentflow_core::repository::execution::{apply_completion, apply_update, ExecutionRepository};
use agentflow_types::error::RepositoryError;
use agentflow_types::execution::{
    Execution, ExecutionLog, ExecutionStatus, ExecutionUpdate, LogLevel, StepCompletion,
    StepRecord, StepStatus,
};
use chrono::{DateTime, Utc};
use sqlx::Row;
use uuid::Uuid;

use super::pool::DatabasePool;

/// SQLite-backed implementation of `ExecutionRepository`.
pub struct SqliteExecutionRepository {
    pool: DatabasePool,
}

impl SqliteExecutionRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

// ---------------------------------------------------------------------------
// Internal row types
// ---------------------------------------------------------------------------

const EXECUTION_COLUMNS: &str = "id, graph_id, status, trigger_data, total_tokens, total_cost, error, created_at, started_at, completed_at";

const STEP_COLUMNS: &str = "id, execution_id, node_id, node_type, step_order, status, input, output, error, tokens_used, cost, duration_ms, attempts, started_at, completed_at";

struct ExecutionRow {
    id: String,
    graph_id: Option<String>,
    status: String,
    trigger_data: String,
    total_tokens: i64,
    total_cost: f64,
    error: Option<String>,
    created_at: String,
    started_at: Option<String>,
    completed_at: Option<String>,
}

impl ExecutionRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            graph_id: row.try_get("graph_id")?,
            status: row.try_get("status")?,
            trigger_data: row.try_get("trigger_data")?,
            total_tokens: row.try_get("total_tokens")?,
            total_cost: row.try_get("total_cost")?,
            error: row.try_get("error")?,
            created_at: row.try_get("created_at")?,
            started_at: row.try_get("started_at")?,
            completed_at: row.try_get("completed_at")?,
        })
    }

    fn into_execution(self) -> Result<Execution, RepositoryError> {
        Ok(Execution {
            id: parse_uuid(&self.id)?,
            graph_id: self.graph_id,
            status: self
                .status
                .parse::<ExecutionStatus>()
                .map_err(RepositoryError::Query)?,
            trigger_data: parse_json(&self.trigger_data, "trigger_data")?,
            total_tokens: u64::try_from(self.total_tokens).unwrap_or(0),
            total_cost: self.total_cost,
            error: self.error,
            created_at: parse_datetime(&self.created_at)?,
            started_at: self.started_at.as_deref().map(parse_datetime).transpose()?,
            completed_at: self.completed_at.as_deref().map(parse_datetime).transpose()?,
        })
    }
}

struct StepRow {
    id: String,
    execution_id: String,
    node_id: String,
    node_type: String,
    step_order: i64,
    status: String,
    input: Option<String>,
    output: Option<String>,
    error: Option<String>,
    tokens_used: i64,
    cost: f64,
    duration_ms: Option<i64>,
    attempts: i64,
    started_at: String,
    completed_at: Option<String>,
}

impl StepRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            execution_id: row.try_get("execution_id")?,
            node_id: row.try_get("node_id")?,
            node_type: row.try_get("node_type")?,
            step_order: row.try_get("step_order")?,
            status: row.try_get("status")?,
            input: row.try_get("input")?,
            output: row.try_get("output")?,
            error: row.try_get("error")?,
            tokens_used: row.try_get("tokens_used")?,
            cost: row.try_get("cost")?,
            duration_ms: row.try_get("duration_ms")?,
            attempts: row.try_get("attempts")?,
            started_at: row.try_get("started_at")?,
            completed_at: row.try_get("completed_at")?,
        })
    }

    fn into_step(self) -> Result<StepRecord, RepositoryError> {
        Ok(StepRecord {
            id: parse_uuid(&self.id)?,
            execution_id: parse_uuid(&self.execution_id)?,
            node_id: self.node_id,
            node_type: self.node_type,
            order: u32::try_from(self.step_order).unwrap_or(0),
            status: self
                .status
                .parse::<StepStatus>()
                .map_err(RepositoryError::Query)?,
            input: self
                .input
                .as_deref()
                .map(|s| parse_json(s, "step input"))
                .transpose()?,
            output: self
                .output
                .as_deref()
                .map(|s| parse_json(s, "step output"))
                .transpose()?,
            error: self.error,
            tokens_used: u64::try_from(self.tokens_used).unwrap_or(0),
            cost: self.cost,
            duration_ms: self.duration_ms.and_then(|d| u64::try_from(d).ok()),
            attempts: u32::try_from(self.attempts).unwrap_or(0),
            started_at: parse_datetime(&self.started_at)?,
            completed_at: self.completed_at.as_deref().map(parse_datetime).transpose()?,
        })
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn parse_uuid(s: &str) -> Result<Uuid, RepositoryError> {
    s.parse::<Uuid>()
        .map_err(|e| RepositoryError::Query(format!("invalid UUID: {e}")))
}

fn parse_datetime(s: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Query(format!("invalid datetime: {e}")))
}

fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339()
}

fn parse_json(s: &str, what: &str) -> Result<serde_json::Value, RepositoryError> {
    serde_json::from_str(s).map_err(|e| RepositoryError::Query(format!("invalid {what} JSON: {e}")))
}

fn to_json(value: &serde_json::Value) -> String {
    value.to_string()
}

fn to_i64(n: u64) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

fn query_error(e: sqlx::Error) -> RepositoryError {
    RepositoryError::Query(e.to_string())
}

fn is_unique_violation(e: &sqlx::Error) -> bool {
    matches!(e, sqlx::Error::Database(db) if db.is_unique_violation())
}

fn is_foreign_key_violation(e: &sqlx::Error) -> bool {
    matches!(e, sqlx::Error::Database(db) if db.is_foreign_key_violation())
}

// ---------------------------------------------------------------------------
// ExecutionRepository impl
// ---------------------------------------------------------------------------

impl ExecutionRepository for SqliteExecutionRepository {
    async fn create_execution(&self, execution: &Execution) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"INSERT INTO executions (id, graph_id, status, trigger_data, total_tokens, total_cost, error, created_at, started_at, completed_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(execution.id.to_string())
        .bind(&execution.graph_id)
        .bind(execution.status.as_str())
        .bind(to_json(&execution.trigger_data))
        .bind(to_i64(execution.total_tokens))
        .bind(execution.total_cost)
        .bind(&execution.error)
        .bind(format_datetime(&execution.created_at))
        .bind(execution.started_at.as_ref().map(format_datetime))
        .bind(execution.completed_at.as_ref().map(format_datetime))
        .execute(&self.pool.writer)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                RepositoryError::Conflict(format!("execution {} already exists", execution.id))
            } else {
                query_error(e)
            }
        })?;

        Ok(())
    }

    async fn update_execution(
        &self,
        id: &Uuid,
        update: &ExecutionUpdate,
    ) -> Result<Execution, RepositoryError> {
        let mut tx = self.pool.writer.begin().await.map_err(query_error)?;

        let row = sqlx::query(&format!("SELECT {EXECUTION_COLUMNS} FROM executions WHERE id = ?"))
            .bind(id.to_string())
            .fetch_optional(&mut *tx)
            .await
            .map_err(query_error)?
            .ok_or(RepositoryError::NotFound)?;
        let mut execution = ExecutionRow::from_row(&row)
            .map_err(query_error)?
            .into_execution()?;

        apply_update(&mut execution, update)?;

        sqlx::query(
            r#"UPDATE executions
               SET status = ?, error = ?, total_tokens = ?, total_cost = ?, started_at = ?, completed_at = ?
               WHERE id = ?"#,
        )
        .bind(execution.status.as_str())
        .bind(&execution.error)
        .bind(to_i64(execution.total_tokens))
        .bind(execution.total_cost)
        .bind(execution.started_at.as_ref().map(format_datetime))
        .bind(execution.completed_at.as_ref().map(format_datetime))
        .bind(id.to_string())
        .execute(&mut *tx)
        .await
        .map_err(query_error)?;

        tx.commit().await.map_err(query_error)?;
        Ok(execution)
    }

    async fn get_execution(&self, id: &Uuid) -> Result<Option<Execution>, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {EXECUTION_COLUMNS} FROM executions WHERE id = ?"))
            .bind(id.to_string())
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(query_error)?;

        match row {
            Some(row) => {
                let r = ExecutionRow::from_row(&row).map_err(query_error)?;
                Ok(Some(r.into_execution()?))
            }
            None => Ok(None),
        }
    }

    async fn create_step(&self, step: &StepRecord) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"INSERT INTO execution_steps (id, execution_id, node_id, node_type, step_order, status, input, output, error, tokens_used, cost, duration_ms, attempts, started_at, completed_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(step.id.to_string())
        .bind(step.execution_id.to_string())
        .bind(&step.node_id)
        .bind(&step.node_type)
        .bind(i64::from(step.order))
        .bind(step.status.as_str())
        .bind(step.input.as_ref().map(to_json))
        .bind(step.output.as_ref().map(to_json))
        .bind(&step.error)
        .bind(to_i64(step.tokens_used))
        .bind(step.cost)
        .bind(step.duration_ms.map(to_i64))
        .bind(i64::from(step.attempts))
        .bind(format_datetime(&step.started_at))
        .bind(step.completed_at.as_ref().map(format_datetime))
        .execute(&self.pool.writer)
        .await
        .map_err(|e| {
            if is_foreign_key_violation(&e) {
                RepositoryError::NotFound
            } else {
                query_error(e)
            }
        })?;

        Ok(())
    }

    async fn finish_step(
        &self,
        step_id: &Uuid,
        completion: &StepCompletion,
    ) -> Result<StepRecord, RepositoryError> {
        let mut tx = self.pool.writer.begin().await.map_err(query_error)?;

        let row = sqlx::query(&format!("SELECT {STEP_COLUMNS} FROM execution_steps WHERE id = ?"))
            .bind(step_id.to_string())
            .fetch_optional(&mut *tx)
            .await
            .map_err(query_error)?
            .ok_or(RepositoryError::NotFound)?;
        let mut step = StepRow::from_row(&row).map_err(query_error)?.into_step()?;

        apply_completion(&mut step, completion)?;

        sqlx::query(
            r#"UPDATE execution_steps
               SET status = ?, output = ?, error = ?, tokens_used = ?, cost = ?, duration_ms = ?, attempts = ?, completed_at = ?
               WHERE id = ?"#,
        )
        .bind(step.status.as_str())
        .bind(step.output.as_ref().map(to_json))
        .bind(&step.error)
        .bind(to_i64(step.tokens_used))
        .bind(step.cost)
        .bind(step.duration_ms.map(to_i64))
        .bind(i64::from(step.attempts))
        .bind(step.completed_at.as_ref().map(format_datetime))
        .bind(step_id.to_string())
        .execute(&mut *tx)
        .await
        .map_err(query_error)?;

        tx.commit().await.map_err(query_error)?;
        Ok(step)
    }

    async fn list_steps(&self, execution_id: &Uuid) -> Result<Vec<StepRecord>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {STEP_COLUMNS} FROM execution_steps WHERE execution_id = ? ORDER BY step_order ASC, started_at ASC"
        ))
        .bind(execution_id.to_string())
        .fetch_all(&self.pool.reader)
        .await
        .map_err(query_error)?;

        rows.iter()
            .map(|row| StepRow::from_row(row).map_err(query_error)?.into_step())
            .collect()
    }

    async fn add_log(&self, log: &ExecutionLog) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"INSERT INTO execution_logs (id, execution_id, step_id, level, message, created_at)
               VALUES (?, ?, ?, ?, ?, ?)"#,
        )
        .bind(log.id.to_string())
        .bind(log.execution_id.to_string())
        .bind(log.step_id.map(|id| id.to_string()))
        .bind(log.level.as_str())
        .bind(&log.message)
        .bind(format_datetime(&log.created_at))
        .execute(&self.pool.writer)
        .await
        .map_err(|e| {
            if is_foreign_key_violation(&e) {
                RepositoryError::NotFound
            } else {
                query_error(e)
            }
        })?;

        Ok(())
    }

    async fn list_logs(&self, execution_id: &Uuid) -> Result<Vec<ExecutionLog>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, execution_id, step_id, level, message, created_at FROM execution_logs WHERE execution_id = ? ORDER BY created_at ASC, id ASC",
        )
        .bind(execution_id.to_string())
        .fetch_all(&self.pool.reader)
        .await
        .map_err(query_error)?;

        rows.iter()
            .map(|row| {
                let id: String = row.try_get("id").map_err(query_error)?;
                let execution_id: String = row.try_get("execution_id").map_err(query_error)?;
                let step_id: Option<String> = row.try_get("step_id").map_err(query_error)?;
                let level: String = row.try_get("level").map_err(query_error)?;
                let message: String = row.try_get("message").map_err(query_error)?;
                let created_at: String = row.try_get("created_at").map_err(query_error)?;

                Ok(ExecutionLog {
                    id: parse_uuid(&id)?,
                    execution_id: parse_uuid(&execution_id)?,
                    step_id: step_id.as_deref().map(parse_uuid).transpose()?,
                    level: level.parse::<LogLevel>().map_err(RepositoryError::Query)?,
                    message,
                    created_at: parse_datetime(&created_at)?,
                })
            })
            .collect()
    }
}
