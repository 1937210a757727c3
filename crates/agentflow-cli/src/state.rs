//! Application state wiring the engine to its adapters.
//!
//! AppState pins the generic orchestrator to the SQLite repository, the
//! in-process event bus, and the reqwest transport.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use agentflow_core::event::EventBus;
use agentflow_core::handler::action::ActionHandler;
use agentflow_core::handler::HandlerRegistry;
use agentflow_core::workflow::retry::RetryPolicy;
use agentflow_core::workflow::Orchestrator;
use agentflow_infra::config::load_engine_config;
use agentflow_infra::sqlite::{default_database_url, DatabasePool, SqliteExecutionRepository};
use agentflow_infra::transport::ReqwestTransport;
use agentflow_types::config::EngineConfig;

pub type ConcreteOrchestrator = Orchestrator<SqliteExecutionRepository>;

/// Shared state for one CLI invocation.
pub struct AppState {
    pub config: EngineConfig,
    pub bus: Arc<EventBus>,
    pub orchestrator: Arc<ConcreteOrchestrator>,
}

impl AppState {
    /// Load configuration, open the database, and wire the orchestrator.
    pub async fn init(config_path: Option<&Path>, database_url: Option<&str>) -> anyhow::Result<Self> {
        let config = load_engine_config(config_path).await;

        let database_url = match database_url {
            Some(url) => url.to_string(),
            None => {
                let url = default_database_url();
                // Ensure data directory exists
                if let Some(dir) = url
                    .strip_prefix("sqlite://")
                    .and_then(|path| Path::new(path).parent())
                {
                    tokio::fs::create_dir_all(dir).await?;
                }
                url
            }
        };
        let pool = DatabasePool::new(&database_url).await?;
        let repository = Arc::new(SqliteExecutionRepository::new(pool));

        let transport = Arc::new(ReqwestTransport::new());
        let mut registry = HandlerRegistry::standard(transport.clone());
        registry.register(Arc::new(
            ActionHandler::new(transport)
                .with_default_timeout(Duration::from_secs(config.http.action_timeout_secs)),
        ));

        let bus = Arc::new(EventBus::new(config.events.channel_capacity));
        let orchestrator = Orchestrator::new(repository, bus.clone(), Arc::new(registry))
            .with_retry_defaults(RetryPolicy::from_config(&config.retry));

        tracing::debug!(%database_url, "app state ready");
        Ok(Self {
            config,
            bus,
            orchestrator: Arc::new(orchestrator),
        })
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use std::path::PathBuf;
    use tempfile::TempDir;

    /// App state over a fresh database in `dir` with default configuration.
    pub async fn test_state(dir: &TempDir) -> AppState {
        let url = format!("sqlite://{}?mode=rwc", dir.path().join("cli.db").display());
        AppState::init(Some(&dir.path().join("absent.toml")), Some(&url))
            .await
            .unwrap()
    }

    pub fn write(dir: &TempDir, name: &str, body: &str) -> PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, body).unwrap();
        path
    }

    pub const APPROVAL_GRAPH: &str = r#"{
        "nodes": [
            {"id": "start", "type": "trigger"},
            {"id": "review", "type": "human", "config": {"message": "ok?"}},
            {"id": "gate", "type": "logic", "subtype": "if_else",
             "config": {"condition": {"left": "{{review.approved}}", "operator": "eq", "right": true}}},
            {"id": "after", "type": "logic", "subtype": "if_else"}
        ],
        "edges": [
            {"source_id": "start", "target_id": "review"},
            {"source_id": "review", "target_id": "gate"},
            {"source_id": "gate", "target_id": "after", "label": "true"}
        ]
    }"#;
}
