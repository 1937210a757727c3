use agentflow_types::error::RepositoryError;
use uuid::Uuid;

/// Errors that stop the engine from driving a run at all.
///
/// A failing step is not one of these: it is reported as a failed
/// `RunResult`. These cover structural problems (cycles, dangling edges),
/// storage faults, and misuse of resume/cancel.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The graph is not acyclic. Raised before any node executes.
    #[error("graph contains a cycle; involved nodes: {}", .nodes.join(", "))]
    GraphCycle { nodes: Vec<String> },

    /// An edge references a node id that does not exist.
    #[error("edge references unknown node '{0}'")]
    UnknownNode(String),

    /// Two nodes share an id.
    #[error("duplicate node id '{0}'")]
    DuplicateNode(String),

    /// Persistence failure.
    #[error("repository error: {0}")]
    Repository(#[from] RepositoryError),

    /// A checkpoint does not line up with the graph it is resumed against.
    #[error("invalid checkpoint: {0}")]
    InvalidCheckpoint(String),

    /// Run not found (for cancel/resume).
    #[error("execution not found: {0}")]
    RunNotFound(Uuid),

    /// The run is not in a state that allows the requested operation.
    #[error("execution {id} is {status}; cannot {operation}")]
    InvalidState {
        id: Uuid,
        status: String,
        operation: &'static str,
    },
}
