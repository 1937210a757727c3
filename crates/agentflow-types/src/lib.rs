//! Shared domain types for agentflow.
//!
//! This crate contains the types used across the execution engine: graphs,
//! execution and step records, lifecycle events, LLM request/response shapes,
//! engine configuration, and the error taxonomy.
//!
//! Zero infrastructure dependencies -- only serde, uuid, chrono, thiserror.

pub mod config;
pub mod error;
pub mod event;
pub mod execution;
pub mod graph;
pub mod llm;
