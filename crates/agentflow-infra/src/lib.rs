//! Infrastructure implementations for agentflow.
//!
//! Concrete adapters for the ports defined in `agentflow-core`: LLM
//! providers, the reqwest-backed action transport, and the SQLite execution
//! repository, plus the engine configuration loader.

pub mod config;
pub mod llm;
pub mod sqlite;
pub mod transport;
