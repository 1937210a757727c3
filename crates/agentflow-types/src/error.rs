use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Coarse classification of a failure, used by retry policies.
///
/// Categories form a small hierarchy: a retry policy that lists a category
/// name also matches every category beneath it (`transport` covers both
/// `timeout` and `connection`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    Transport,
    Timeout,
    Connection,
    Provider,
    RateLimited,
    HttpStatus,
    Validation,
    Repository,
    Internal,
}

impl ErrorCategory {
    pub fn name(&self) -> &'static str {
        match self {
            ErrorCategory::Transport => "transport",
            ErrorCategory::Timeout => "timeout",
            ErrorCategory::Connection => "connection",
            ErrorCategory::Provider => "provider",
            ErrorCategory::RateLimited => "rate_limited",
            ErrorCategory::HttpStatus => "http_status",
            ErrorCategory::Validation => "validation",
            ErrorCategory::Repository => "repository",
            ErrorCategory::Internal => "internal",
        }
    }

    pub fn parent(&self) -> Option<ErrorCategory> {
        match self {
            ErrorCategory::Timeout | ErrorCategory::Connection => Some(ErrorCategory::Transport),
            ErrorCategory::RateLimited | ErrorCategory::HttpStatus => {
                Some(ErrorCategory::Provider)
            }
            _ => None,
        }
    }

    /// This category followed by each of its ancestors.
    pub fn lineage(self) -> impl Iterator<Item = ErrorCategory> {
        std::iter::successors(Some(self), |c| c.parent())
    }

    /// Whether `name` names this category or one of its ancestors.
    pub fn matches(&self, name: &str) -> bool {
        self.lineage().any(|c| c.name() == name)
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Errors from repository operations (used by trait definitions in agentflow-core).
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database connection error")]
    Connection,

    #[error("query error: {0}")]
    Query(String),

    #[error("entity not found")]
    NotFound,

    #[error("conflict: {0}")]
    Conflict(String),
}
