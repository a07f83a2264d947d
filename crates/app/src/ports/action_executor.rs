//! Action executor port — the sink that performs an action's side effect.
//!
//! The core never sends email or calls webhooks itself. It hands each
//! [`Action`] with its [`ExecutionContext`] to an [`ActionExecutor`] and
//! records what comes back.

use std::future::Future;

use ruleflow_domain::automation::{Action, ActionType};
use ruleflow_domain::execution::ExecutionContext;

/// What the sink reports for an action it handled.
///
/// Expected failures (a bounced address, a 4xx from a webhook) are
/// reported as `success: false` rather than as an [`ActionError`].
#[derive(Debug, Clone, PartialEq)]
pub struct ActionOutcome {
    pub success: bool,
    pub message: String,
    pub data: Option<serde_json::Value>,
}

impl ActionOutcome {
    #[must_use]
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            data: None,
        }
    }

    #[must_use]
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            data: None,
        }
    }

    #[must_use]
    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }
}

/// Unexpected failures while executing an action.
#[derive(Debug, thiserror::Error)]
pub enum ActionError {
    /// The sink has no implementation for this action type.
    #[error("unsupported action type {0}")]
    Unsupported(ActionType),

    /// The action's configuration payload is unusable.
    #[error("invalid {action_type} configuration: {reason}")]
    InvalidConfig {
        action_type: ActionType,
        reason: String,
    },

    /// The side effect itself failed.
    #[error("{action_type} failed")]
    Failed {
        action_type: ActionType,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

/// Performs the side effect behind an [`Action`].
pub trait ActionExecutor {
    /// Execute one action for the run described by `context`.
    fn execute(
        &self,
        action: &Action,
        context: &ExecutionContext,
    ) -> impl Future<Output = Result<ActionOutcome, ActionError>> + Send;
}

impl<T: ActionExecutor + Send + Sync> ActionExecutor for std::sync::Arc<T> {
    fn execute(
        &self,
        action: &Action,
        context: &ExecutionContext,
    ) -> impl Future<Output = Result<ActionOutcome, ActionError>> + Send {
        (**self).execute(action, context)
    }
}
