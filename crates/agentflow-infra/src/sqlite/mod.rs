//! SQLite persistence for execution records.

pub mod execution;
pub mod pool;

pub use execution::SqliteExecutionRepository;
pub use pool::{default_database_url, DatabasePool};
