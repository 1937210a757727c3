//! Node handlers: one implementation per node kind.
//!
//! Every handler implements [`NodeHandler`]: given the node, its resolved
//! config and the run context, it produces a [`HandlerOutcome`]. Handlers are
//! stateless across runs; everything run-scoped arrives through
//! [`HandlerInput`]. The [`HandlerRegistry`] maps [`NodeKind`] to a handler
//! and turns an unknown node type into a validation error at lookup.

pub mod action;
pub mod ai;
pub mod human;
pub mod logic;
pub mod trigger;

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use agentflow_types::error::ErrorCategory;
use agentflow_types::graph::{Node, NodeKind};
use agentflow_types::llm::LlmError;
use serde_json::Value;
use uuid::Uuid;

use crate::llm::router::ProviderRouter;
use crate::transport::{HttpTransport, TransportError};
use crate::workflow::context::ExecutionContext;

// ---------------------------------------------------------------------------
// Outcome types
// ---------------------------------------------------------------------------

/// Data produced by a handler that completed normally.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeOutput {
    pub data: Value,
    pub tokens_used: u64,
    pub cost: f64,
    /// Model that produced the tokens, for cost attribution.
    pub model: Option<String>,
}

impl NodeOutput {
    /// Output with no token usage.
    pub fn data(data: Value) -> Self {
        Self {
            data,
            tokens_used: 0,
            cost: 0.0,
            model: None,
        }
    }
}

/// A request to pause the run until a human approves.
#[derive(Debug, Clone, PartialEq)]
pub struct ApprovalRequest {
    pub step_id: Uuid,
    pub message: String,
}

/// What a handler produced.
#[derive(Debug, Clone, PartialEq)]
pub enum HandlerOutcome {
    Completed(NodeOutput),
    ApprovalRequired(ApprovalRequest),
}

/// Errors a handler can raise. Each maps to an [`ErrorCategory`] that the
/// retry policy matches against.
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error(transparent)]
    Llm(#[from] LlmError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("{message}")]
    Execution {
        category: ErrorCategory,
        message: String,
    },
}

impl HandlerError {
    pub fn validation(message: impl Into<String>) -> Self {
        HandlerError::Validation(message.into())
    }

    pub fn execution(category: ErrorCategory, message: impl Into<String>) -> Self {
        HandlerError::Execution {
            category,
            message: message.into(),
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            HandlerError::Validation(_) => ErrorCategory::Validation,
            HandlerError::Llm(e) => e.category(),
            HandlerError::Transport(e) => e.category(),
            HandlerError::Execution { category, .. } => *category,
        }
    }
}

// ---------------------------------------------------------------------------
// Handler trait
// ---------------------------------------------------------------------------

/// Everything a handler may read for one invocation.
pub struct HandlerInput<'a> {
    pub node: &'a Node,
    /// Node config with templates already resolved against the context.
    pub config: &'a Value,
    pub step_id: Uuid,
    pub context: &'a ExecutionContext,
    pub router: &'a ProviderRouter,
}

impl HandlerInput<'_> {
    /// A string config field.
    pub fn str_field(&self, key: &str) -> Option<&str> {
        self.config.get(key).and_then(Value::as_str)
    }

    /// A config selector (`action_type`, `logic_type`, ...), falling back to
    /// the node's subtype and then `default`.
    pub fn selector(&self, key: &str, default: &'static str) -> String {
        self.str_field(key)
            .or(self.node.subtype.as_deref())
            .filter(|s| !s.is_empty())
            .unwrap_or(default)
            .to_string()
    }
}

pub type HandlerFuture<'a> =
    Pin<Box<dyn Future<Output = Result<HandlerOutcome, HandlerError>> + Send + 'a>>;

/// One node variant's execution logic.
///
/// Object-safe (boxed futures) so the registry can hold `Arc<dyn NodeHandler>`.
pub trait NodeHandler: Send + Sync {
    fn kind(&self) -> NodeKind;

    fn execute<'a>(&'a self, input: &'a HandlerInput<'a>) -> HandlerFuture<'a>;
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Maps node kinds to handlers.
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: HashMap<NodeKind, Arc<dyn NodeHandler>>,
}

impl HandlerRegistry {
    pub fn empty() -> Self {
        Self::default()
    }

    /// The five built-in handlers. Action nodes send HTTP through `transport`.
    pub fn standard(transport: Arc<dyn HttpTransport>) -> Self {
        let mut registry = Self::empty();
        registry.register(Arc::new(trigger::TriggerHandler));
        registry.register(Arc::new(ai::AiHandler));
        registry.register(Arc::new(action::ActionHandler::new(transport)));
        registry.register(Arc::new(logic::LogicHandler));
        registry.register(Arc::new(human::HumanHandler));
        registry
    }

    /// Register (or replace) the handler for its kind.
    pub fn register(&mut self, handler: Arc<dyn NodeHandler>) {
        self.handlers.insert(handler.kind(), handler);
    }

    /// Handler for `node`'s type, or a validation error for unknown types.
    pub fn lookup(&self, node: &Node) -> Result<Arc<dyn NodeHandler>, HandlerError> {
        let kind = node.kind().map_err(HandlerError::Validation)?;
        self.handlers
            .get(&kind)
            .cloned()
            .ok_or_else(|| HandlerError::validation(format!("no handler registered for '{kind}'")))
    }
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut kinds: Vec<&str> = self.handlers.keys().map(|k| k.as_str()).collect();
        kinds.sort();
        f.debug_struct("HandlerRegistry").field("kinds", &kinds).finish()
    }
}
