//! Automation rules — trigger → condition → action bindings.
//!
//! Each rule has exactly one [`Trigger`] that determines when it is
//! evaluated, an ordered list of [`Condition`]s folded left to right, and
//! one or more [`Action`]s executed in order. Rules also carry their own
//! execution statistics, which only ever grow.

mod action;
mod condition;
mod trigger;

pub use action::{Action, ActionType};
pub use condition::{Condition, LogicalOperator, Operator, evaluate_all, extract_field};
pub use trigger::Trigger;

use serde::{Deserialize, Serialize};

use crate::error::{RuleflowError, ValidationError};
use crate::execution::ExecutionStats;
use crate::id::RuleId;
use crate::schedule::Schedule;
use crate::time::{Timestamp, now};

/// A named binding of one trigger, conditions and actions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutomationRule {
    pub id: RuleId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub enabled: bool,
    pub trigger: Trigger,
    #[serde(default)]
    pub conditions: Vec<Condition>,
    pub actions: Vec<Action>,
    #[serde(default)]
    pub execution_count: u64,
    #[serde(default)]
    pub success_count: u64,
    #[serde(default)]
    pub error_count: u64,
    #[serde(default)]
    pub last_executed: Option<Timestamp>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl AutomationRule {
    /// Create a builder for constructing an [`AutomationRule`].
    #[must_use]
    pub fn builder() -> AutomationRuleBuilder {
        AutomationRuleBuilder::default()
    }

    /// Check domain invariants.
    ///
    /// # Errors
    ///
    /// Returns [`RuleflowError::Validation`] when:
    /// - `name` is empty ([`ValidationError::EmptyName`])
    /// - `actions` is empty ([`ValidationError::NoActions`])
    ///
    /// Returns [`RuleflowError::Cron`] when a schedule trigger carries an
    /// unusable expression or timezone.
    pub fn validate(&self) -> Result<(), RuleflowError> {
        if self.name.trim().is_empty() {
            return Err(ValidationError::EmptyName.into());
        }
        if self.actions.is_empty() {
            return Err(ValidationError::NoActions.into());
        }
        if let Trigger::Schedule { cron, timezone } = &self.trigger {
            Schedule::new(cron, timezone)?;
        }
        Ok(())
    }

    /// Record the outcome of one run.
    ///
    /// `last_executed` never moves backwards.
    pub fn record_execution(&mut self, success: bool, at: Timestamp) {
        self.execution_count += 1;
        if success {
            self.success_count += 1;
        } else {
            self.error_count += 1;
        }
        self.last_executed = Some(self.last_executed.map_or(at, |prev| prev.max(at)));
    }

    /// Aggregate statistics derived from the counters.
    #[must_use]
    pub fn stats(&self) -> ExecutionStats {
        ExecutionStats::new(self.execution_count, self.success_count, self.error_count)
    }

    /// Stamp a new modification time.
    pub fn touch(&mut self) {
        self.updated_at = now().max(self.updated_at);
    }
}

/// Step-by-step builder for [`AutomationRule`].
#[derive(Debug, Default)]
pub struct AutomationRuleBuilder {
    id: Option<RuleId>,
    name: Option<String>,
    description: Option<String>,
    enabled: Option<bool>,
    trigger: Option<Trigger>,
    conditions: Vec<Condition>,
    actions: Vec<Action>,
}

impl AutomationRuleBuilder {
    #[must_use]
    pub fn id(mut self, id: RuleId) -> Self {
        self.id = Some(id);
        self
    }

    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    #[must_use]
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = Some(enabled);
        self
    }

    #[must_use]
    pub fn trigger(mut self, trigger: Trigger) -> Self {
        self.trigger = Some(trigger);
        self
    }

    #[must_use]
    pub fn condition(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    #[must_use]
    pub fn action(mut self, action: Action) -> Self {
        self.actions.push(action);
        self
    }

    /// Consume the builder, validate, and return an [`AutomationRule`].
    ///
    /// # Errors
    ///
    /// Returns [`RuleflowError::Validation`] if required fields are missing
    /// or empty, or [`RuleflowError::Cron`] for an unusable schedule.
    pub fn build(self) -> Result<AutomationRule, RuleflowError> {
        let ts = now();
        let rule = AutomationRule {
            id: self.id.unwrap_or_default(),
            name: self.name.unwrap_or_default(),
            description: self.description.unwrap_or_default(),
            enabled: self.enabled.unwrap_or(true),
            trigger: self.trigger.unwrap_or(Trigger::Manual),
            conditions: self.conditions,
            actions: self.actions,
            execution_count: 0,
            success_count: 0,
            error_count: 0,
            last_executed: None,
            created_at: ts,
            updated_at: ts,
        };
        rule.validate()?;
        Ok(rule)
    }
}
