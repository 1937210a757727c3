//! LLM provider abstraction and per-run model routing.

pub mod box_provider;
pub mod provider;
pub mod router;
