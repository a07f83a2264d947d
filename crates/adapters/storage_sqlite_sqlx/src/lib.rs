//! # ruleflow-adapter-storage-sqlite-sqlx
//!
//! `SQLite` persistence adapter using [sqlx](https://docs.rs/sqlx).
//!
//! ## Responsibilities
//! - Implement [`RuleRepository`](ruleflow_app::ports::RuleRepository) and
//!   [`EventLog`](ruleflow_app::ports::EventLog)
//! - Manage `SQLite` connection pool lifecycle
//! - Run database migrations (using sqlx embedded migrations)
//! - Map between domain types and database rows
//!
//! ## Dependency rule
//! Depends on `ruleflow-app` (for port traits) and `ruleflow-domain` (for domain types).
//! The `app` and `domain` crates must never reference this adapter.

mod error;
mod event_log;
mod pool;
mod rule_repo;

pub use error::StorageError;
pub use event_log::SqliteEventLog;
pub use pool::{Config, Database};
pub use rule_repo::SqliteRuleRepository;
