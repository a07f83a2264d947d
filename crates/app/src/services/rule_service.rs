//! Rule service — use-cases for managing stored automation rules.

use ruleflow_domain::automation::AutomationRule;
use ruleflow_domain::error::{NotFoundError, RuleflowError};
use ruleflow_domain::id::RuleId;

use crate::ports::RuleRepository;

/// Application service for rule CRUD operations.
pub struct RuleService<R> {
    repo: R,
}

impl<R: RuleRepository> RuleService<R> {
    /// Create a new service backed by the given repository.
    pub fn new(repo: R) -> Self {
        Self { repo }
    }

    /// Store a new rule after validating domain invariants.
    ///
    /// # Errors
    ///
    /// Returns [`RuleflowError::Validation`] or [`RuleflowError::Cron`] if
    /// invariants fail, or a storage error propagated from the repository.
    #[tracing::instrument(skip(self, rule), fields(rule_name = %rule.name))]
    pub async fn create_rule(&self, rule: AutomationRule) -> Result<AutomationRule, RuleflowError> {
        rule.validate()?;
        self.repo.save(rule).await
    }

    /// Look up a rule by id, returning an error if not found.
    ///
    /// # Errors
    ///
    /// Returns [`RuleflowError::NotFound`] when no rule with `id` exists,
    /// or a storage error from the repository.
    #[tracing::instrument(skip(self))]
    pub async fn get_rule(&self, id: RuleId) -> Result<AutomationRule, RuleflowError> {
        self.repo
            .get_by_id(id)
            .await?
            .ok_or_else(|| not_found(id))
    }

    /// # Errors
    ///
    /// Returns a storage error propagated from the repository.
    pub async fn list_rules(&self) -> Result<Vec<AutomationRule>, RuleflowError> {
        self.repo.get_all().await
    }

    /// # Errors
    ///
    /// Returns a storage error propagated from the repository.
    pub async fn list_enabled(&self) -> Result<Vec<AutomationRule>, RuleflowError> {
        let mut rules = self.repo.get_all().await?;
        rules.retain(|rule| rule.enabled);
        Ok(rules)
    }

    /// Replace a stored rule, keeping its creation time.
    ///
    /// # Errors
    ///
    /// Returns a validation error if invariants fail,
    /// [`RuleflowError::NotFound`] when the rule does not exist, or a
    /// storage error from the repository.
    #[tracing::instrument(skip(self, rule), fields(rule_id = %rule.id))]
    pub async fn update_rule(
        &self,
        mut rule: AutomationRule,
    ) -> Result<AutomationRule, RuleflowError> {
        rule.validate()?;
        let existing = self.get_rule(rule.id).await?;
        rule.created_at = existing.created_at;
        rule.updated_at = rule.updated_at.max(existing.updated_at);
        rule.touch();
        self.repo.save(rule).await
    }

    /// Delete a rule by id.
    ///
    /// # Errors
    ///
    /// Returns [`RuleflowError::NotFound`] when the rule does not exist, or
    /// a storage error from the repository.
    #[tracing::instrument(skip(self))]
    pub async fn delete_rule(&self, id: RuleId) -> Result<(), RuleflowError> {
        self.get_rule(id).await?;
        self.repo.delete(id).await
    }
}

fn not_found(id: RuleId) -> RuleflowError {
    NotFoundError {
        entity: "Rule",
        id: id.to_string(),
    }
    .into()
}
