//! Observability for agentflow: subscriber setup and the span attribute
//! names used for LLM calls.

pub mod genai_attrs;
pub mod tracing_setup;
