//! Execution engine and port trait definitions for agentflow.
//!
//! This crate defines the "ports" (repository, event sink, LLM provider, HTTP
//! transport) that the infrastructure layer implements, plus the engine that
//! drives a graph run through them. It depends only on `agentflow-types` --
//! never on `agentflow-infra` or any database/HTTP crate.

pub mod event;
pub mod handler;
pub mod llm;
pub mod repository;
pub mod transport;
pub mod workflow;

#[cfg(test)]
pub(crate) mod test_support;
