//! Execution records — the context and outcome of a single rule run.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::automation::ActionType;
use crate::id::{ActionId, ExecutionId, RuleId};
use crate::time::{Timestamp, now};

/// Ephemeral data bundle for one rule run. Never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionContext {
    pub execution_id: ExecutionId,
    pub rule_id: RuleId,
    /// Payload carried by whatever fired the rule.
    pub trigger_data: Value,
    pub user_id: Option<String>,
    pub timestamp: Timestamp,
}

impl ExecutionContext {
    /// Create a context with a fresh execution id, stamped now.
    #[must_use]
    pub fn new(rule_id: RuleId, trigger_data: Value) -> Self {
        Self {
            execution_id: ExecutionId::new(),
            rule_id,
            trigger_data,
            user_id: None,
            timestamp: now(),
        }
    }

    #[must_use]
    pub fn with_user(mut self, user_id: Option<String>) -> Self {
        self.user_id = user_id;
        self
    }
}

/// Outcome of a single action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionResult {
    pub action_id: ActionId,
    pub action_type: ActionType,
    pub success: bool,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl ActionResult {
    #[must_use]
    pub fn failed(action_id: ActionId, action_type: ActionType, message: impl Into<String>) -> Self {
        Self {
            action_id,
            action_type,
            success: false,
            message: message.into(),
            data: None,
        }
    }
}

/// Structured outcome of one rule run.
///
/// `success` is true iff no action failed. A run whose conditions were not
/// met is a successful no-op.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub execution_id: ExecutionId,
    pub rule_id: RuleId,
    pub success: bool,
    pub message: String,
    pub conditions_met: bool,
    pub action_results: Vec<ActionResult>,
    pub actions_executed: usize,
    pub actions_failed: usize,
    pub duration_ms: u64,
    pub started_at: Timestamp,
}

impl ExecutionResult {
    /// Failure reported without running anything (missing or disabled rule).
    #[must_use]
    pub fn rejected(context: &ExecutionContext, message: impl Into<String>) -> Self {
        Self {
            execution_id: context.execution_id,
            rule_id: context.rule_id,
            success: false,
            message: message.into(),
            conditions_met: false,
            action_results: Vec::new(),
            actions_executed: 0,
            actions_failed: 0,
            duration_ms: 0,
            started_at: context.timestamp,
        }
    }

    /// Successful no-op because the conditions did not hold.
    #[must_use]
    pub fn skipped(context: &ExecutionContext, duration_ms: u64) -> Self {
        Self {
            execution_id: context.execution_id,
            rule_id: context.rule_id,
            success: true,
            message: "Conditions not met".to_string(),
            conditions_met: false,
            action_results: Vec::new(),
            actions_executed: 0,
            actions_failed: 0,
            duration_ms,
            started_at: context.timestamp,
        }
    }

    /// Summarise a completed run from its per-action results.
    #[must_use]
    pub fn completed(
        context: &ExecutionContext,
        action_results: Vec<ActionResult>,
        duration_ms: u64,
    ) -> Self {
        let actions_failed = action_results.iter().filter(|r| !r.success).count();
        let actions_executed = action_results.len() - actions_failed;
        let message = if actions_failed == 0 {
            format!("Executed {actions_executed} action(s)")
        } else {
            format!("Executed {actions_executed} action(s), {actions_failed} failed")
        };
        Self {
            execution_id: context.execution_id,
            rule_id: context.rule_id,
            success: actions_failed == 0,
            message,
            conditions_met: true,
            action_results,
            actions_executed,
            actions_failed,
            duration_ms,
            started_at: context.timestamp,
        }
    }
}

/// Aggregated counters for a rule.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExecutionStats {
    pub total_executions: u64,
    pub success_count: u64,
    pub error_count: u64,
    /// Fraction of successful runs in `[0, 1]`; `0` when never run.
    pub success_rate: f64,
}

impl ExecutionStats {
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn new(total_executions: u64, success_count: u64, error_count: u64) -> Self {
        let success_rate = if total_executions == 0 {
            0.0
        } else {
            success_count as f64 / total_executions as f64
        };
        Self {
            total_executions,
            success_count,
            error_count,
            success_rate,
        }
    }
}
