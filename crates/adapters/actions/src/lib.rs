//! # ruleflow-adapter-actions
//!
//! Built-in [`ActionExecutor`] used when no real integration is wired in.
//!
//! Every known action type is checked for the configuration keys it needs,
//! `{{path}}` placeholders are filled from the trigger data, and the side
//! effect is logged and recorded instead of performed.
//!
//! | Action | Required keys |
//! |--------|---------------|
//! | `send_email` | `to` |
//! | `create_task` | `title` |
//! | `update_record` | `table` |
//! | `send_notification` | `message` |
//! | `call_webhook` | `url` (http or https) |
//! | `run_query` | `query` |
//! | `export_data` | `format` (`csv` or `json`) |
//!
//! ## Dependency rule
//!
//! Depends on `ruleflow-app` (port traits) and `ruleflow-domain` only.

mod template;

use std::future::Future;
use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};

use serde_json::Value;

use ruleflow_app::ports::{ActionError, ActionExecutor, ActionOutcome};
use ruleflow_domain::automation::{Action, ActionType};
use ruleflow_domain::execution::ExecutionContext;
use ruleflow_domain::id::{ActionId, ExecutionId, RuleId};

const EXPORT_FORMATS: [&str; 2] = ["csv", "json"];

/// Number of performed actions kept for inspection.
pub const DEFAULT_PERFORMED_CAPACITY: usize = 100;

/// An action the executor accepted, with its rendered configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct PerformedAction {
    pub action_id: ActionId,
    pub action_type: ActionType,
    pub rule_id: RuleId,
    pub execution_id: ExecutionId,
    pub config: Value,
}

/// Action sink that logs instead of performing side effects.
///
/// The most recent accepted actions are kept, oldest evicted first.
#[derive(Debug)]
pub struct LoggingActionExecutor {
    performed: Mutex<VecDeque<PerformedAction>>,
    capacity: usize,
}

impl Default for LoggingActionExecutor {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_PERFORMED_CAPACITY)
    }
}

impl LoggingActionExecutor {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep at most `capacity` performed actions. Zero keeps none.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            performed: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    /// The most recently accepted actions, in execution order.
    #[must_use]
    pub fn performed(&self) -> Vec<PerformedAction> {
        self.performed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }

    fn remember(&self, action: PerformedAction) {
        if self.capacity == 0 {
            return;
        }
        let mut performed = self.performed.lock().unwrap_or_else(PoisonError::into_inner);
        while performed.len() >= self.capacity {
            performed.pop_front();
        }
        performed.push_back(action);
    }

    fn perform(&self, action: &Action, context: &ExecutionContext) -> Result<ActionOutcome, ActionError> {
        let config = template::render(&action.config, &context.trigger_data);
        let message = describe(action.action_type, &config)?;

        tracing::info!(
            rule_id = %context.rule_id,
            execution_id = %context.execution_id,
            action_id = %action.id,
            action_type = %action.action_type,
            "{message}"
        );

        self.remember(PerformedAction {
            action_id: action.id,
            action_type: action.action_type,
            rule_id: context.rule_id,
            execution_id: context.execution_id,
            config: config.clone(),
        });

        Ok(ActionOutcome::ok(message).with_data(config))
    }
}

impl ActionExecutor for LoggingActionExecutor {
    fn execute(
        &self,
        action: &Action,
        context: &ExecutionContext,
    ) -> impl Future<Output = Result<ActionOutcome, ActionError>> + Send {
        let result = self.perform(action, context);
        async { result }
    }
}

fn describe(action_type: ActionType, config: &Value) -> Result<String, ActionError> {
    let message = match action_type {
        ActionType::SendEmail => {
            let to = required_str(action_type, config, "to")?;
            let subject = config.get("subject").and_then(Value::as_str).unwrap_or("");
            format!("email to {to}: {subject}")
        }
        ActionType::CreateTask => {
            format!("task created: {}", required_str(action_type, config, "title")?)
        }
        ActionType::UpdateRecord => {
            format!("record updated in {}", required_str(action_type, config, "table")?)
        }
        ActionType::SendNotification => {
            format!("notification: {}", required_str(action_type, config, "message")?)
        }
        ActionType::CallWebhook => {
            let url = required_str(action_type, config, "url")?;
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(invalid(action_type, format!("url {url:?} is not http(s)")));
            }
            let method = config.get("method").and_then(Value::as_str).unwrap_or("POST");
            format!("webhook {method} {url}")
        }
        ActionType::RunQuery => {
            format!("query run: {}", required_str(action_type, config, "query")?)
        }
        ActionType::ExportData => {
            let format = required_str(action_type, config, "format")?;
            if !EXPORT_FORMATS.contains(&format) {
                return Err(invalid(action_type, format!("unsupported format {format:?}")));
            }
            format!("data exported as {format}")
        }
        ActionType::Unknown => return Err(ActionError::Unsupported(action_type)),
    };
    Ok(message)
}

fn required_str<'a>(
    action_type: ActionType,
    config: &'a Value,
    key: &str,
) -> Result<&'a str, ActionError> {
    match config.get(key).and_then(Value::as_str) {
        Some(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(invalid(action_type, format!("missing `{key}`"))),
    }
}

fn invalid(action_type: ActionType, reason: String) -> ActionError {
    ActionError::InvalidConfig {
        action_type,
        reason,
    }
}
