//! Common error types used across the workspace.
//!
//! Each layer defines its own typed errors and converts into
//! [`RuleflowError`] via `#[from]`.

use crate::schedule::CronError;

/// Top-level error for ruleflow operations.
#[derive(Debug, thiserror::Error)]
pub enum RuleflowError {
    /// A domain invariant was violated.
    #[error("validation error")]
    Validation(#[from] ValidationError),

    /// The requested item does not exist.
    #[error("not found")]
    NotFound(#[from] NotFoundError),

    /// A schedule trigger carries an expression or timezone that cannot be used.
    #[error("invalid schedule")]
    Cron(#[from] CronError),

    /// A persistence adapter failed.
    #[error("storage error")]
    Storage(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// Domain invariant violations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    /// A rule must be named.
    #[error("name must not be empty")]
    EmptyName,

    /// A rule needs at least one action.
    #[error("at least one action is required")]
    NoActions,

    /// The component only accepts rules with a specific trigger kind.
    #[error("expected a {expected} trigger, got {actual}")]
    UnexpectedTrigger {
        expected: &'static str,
        actual: &'static str,
    },
}

/// Lookup of a missing item.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{entity} {id} not found")]
pub struct NotFoundError {
    pub entity: &'static str,
    pub id: String,
}
