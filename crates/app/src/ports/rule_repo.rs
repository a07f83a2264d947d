//! Rule repository port — persistence for automation rules.

use std::future::Future;

use ruleflow_domain::automation::AutomationRule;
use ruleflow_domain::error::RuleflowError;
use ruleflow_domain::id::RuleId;

/// Repository for persisting and loading [`AutomationRule`]s.
pub trait RuleRepository {
    /// Load every stored rule.
    fn get_all(&self) -> impl Future<Output = Result<Vec<AutomationRule>, RuleflowError>> + Send;

    /// Get a rule by its unique identifier.
    fn get_by_id(
        &self,
        id: RuleId,
    ) -> impl Future<Output = Result<Option<AutomationRule>, RuleflowError>> + Send;

    /// Insert the rule, or replace the stored rule with the same id.
    fn save(
        &self,
        rule: AutomationRule,
    ) -> impl Future<Output = Result<AutomationRule, RuleflowError>> + Send;

    /// Delete a rule by its unique identifier. Deleting a missing rule is not an error.
    fn delete(&self, id: RuleId) -> impl Future<Output = Result<(), RuleflowError>> + Send;
}

impl<T: RuleRepository + Send + Sync> RuleRepository for std::sync::Arc<T> {
    fn get_all(&self) -> impl Future<Output = Result<Vec<AutomationRule>, RuleflowError>> + Send {
        (**self).get_all()
    }

    fn get_by_id(
        &self,
        id: RuleId,
    ) -> impl Future<Output = Result<Option<AutomationRule>, RuleflowError>> + Send {
        (**self).get_by_id(id)
    }

    fn save(
        &self,
        rule: AutomationRule,
    ) -> impl Future<Output = Result<AutomationRule, RuleflowError>> + Send {
        (**self).save(rule)
    }

    fn delete(&self, id: RuleId) -> impl Future<Output = Result<(), RuleflowError>> + Send {
        (**self).delete(id)
    }
}
