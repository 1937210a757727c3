//! LlmProvider trait definition.
//!
//! This is the core abstraction that all chat providers implement. Each
//! implementation normalizes its vendor request/response shape to the
//! common [`ChatRequest`] / [`ChatResponse`] pair and prices the call from a
//! static per-model table.

use agentflow_types::llm::{ChatRequest, ChatResponse, LlmError};

/// Trait for chat provider backends (OpenAI, Anthropic, Google, Ollama).
///
/// Uses native async fn in traits (RPITIT, Rust 2024 edition).
/// Implementations live in agentflow-infra.
pub trait LlmProvider: Send + Sync {
    /// Provider name as used in routing tables (e.g., "anthropic").
    fn name(&self) -> &str;

    /// Model used when a request does not name one.
    fn default_model(&self) -> &str;

    /// Send a chat request and receive the full response.
    fn chat(
        &self,
        request: &ChatRequest,
    ) -> impl std::future::Future<Output = Result<ChatResponse, LlmError>> + Send;
}
