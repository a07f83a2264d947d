//! Automation runtime — one engine shared by the dispatcher and scheduler.
//!
//! The runtime is the single entry point for rule lifecycle changes: it
//! keeps the engine registry, the event subscriptions and the scheduled
//! jobs consistent with each other.

use std::sync::Arc;

use serde_json::Value;

use ruleflow_domain::automation::{AutomationRule, Trigger};
use ruleflow_domain::error::{NotFoundError, RuleflowError};
use ruleflow_domain::event::EventData;
use ruleflow_domain::execution::{ExecutionContext, ExecutionResult};
use ruleflow_domain::id::RuleId;

use crate::event_dispatcher::{DEFAULT_EVENT_HISTORY_CAPACITY, EventDispatcher};
use crate::ports::{ActionExecutor, RuleRepository};
use crate::rule_engine::{DEFAULT_EXECUTION_HISTORY_CAPACITY, RuleEngine};
use crate::scheduler::Scheduler;

/// Sizing of the in-memory histories.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuntimeSettings {
    pub event_history_capacity: usize,
    pub execution_history_capacity: usize,
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self {
            event_history_capacity: DEFAULT_EVENT_HISTORY_CAPACITY,
            execution_history_capacity: DEFAULT_EXECUTION_HISTORY_CAPACITY,
        }
    }
}

/// Owns the rule engine, event dispatcher and scheduler.
pub struct AutomationRuntime<X> {
    engine: Arc<RuleEngine<X>>,
    dispatcher: EventDispatcher<X>,
    scheduler: Scheduler<X>,
}

impl<X> AutomationRuntime<X>
where
    X: ActionExecutor + Send + Sync + 'static,
{
    pub fn new(executor: X) -> Self {
        Self::with_settings(executor, RuntimeSettings::default())
    }

    pub fn with_settings(executor: X, settings: RuntimeSettings) -> Self {
        let engine = Arc::new(RuleEngine::with_history_capacity(
            executor,
            settings.execution_history_capacity,
        ));
        Self {
            dispatcher: EventDispatcher::with_history_capacity(
                Arc::clone(&engine),
                settings.event_history_capacity,
            ),
            scheduler: Scheduler::new(Arc::clone(&engine)),
            engine,
        }
    }

    #[must_use]
    pub fn engine(&self) -> &RuleEngine<X> {
        &self.engine
    }

    #[must_use]
    pub fn dispatcher(&self) -> &EventDispatcher<X> {
        &self.dispatcher
    }

    #[must_use]
    pub fn scheduler(&self) -> &Scheduler<X> {
        &self.scheduler
    }

    /// Validate a rule and wire it to whatever fires it.
    ///
    /// A rule id that is already registered goes through
    /// [`AutomationRuntime::update_rule`], so its statistics are kept and
    /// its previous wiring is replaced.
    ///
    /// # Errors
    ///
    /// Returns a validation or cron error; nothing is registered in that case.
    #[tracing::instrument(skip(self, rule), fields(rule_id = %rule.id, rule_name = %rule.name))]
    pub async fn register_rule(
        &self,
        rule: AutomationRule,
    ) -> Result<AutomationRule, RuleflowError> {
        rule.validate()?;
        if self.engine.get_rule(rule.id).await.is_some() {
            tracing::debug!("rule already registered, updating");
            return self.update_rule(rule).await;
        }
        self.engine.add_rule(rule.clone()).await;
        if let Err(err) = self.route(&rule).await {
            self.engine.remove_rule(rule.id).await;
            return Err(err);
        }
        tracing::info!(trigger = %rule.trigger, "rule registered");
        Ok(rule)
    }

    /// Replace a registered rule.
    ///
    /// Subscriptions and jobs are re-derived when the trigger changed;
    /// otherwise only their enabled state follows the rule.
    ///
    /// # Errors
    ///
    /// Returns a validation or cron error, or [`RuleflowError::NotFound`]
    /// when the rule is not registered.
    #[tracing::instrument(skip(self, rule), fields(rule_id = %rule.id))]
    pub async fn update_rule(&self, rule: AutomationRule) -> Result<AutomationRule, RuleflowError> {
        rule.validate()?;
        let previous = self
            .engine
            .get_rule(rule.id)
            .await
            .ok_or_else(|| not_found(rule.id))?;
        let updated = self.engine.update_rule(rule).await?;

        if previous.trigger == updated.trigger {
            self.dispatcher.set_enabled(updated.id, updated.enabled).await;
            self.scheduler
                .set_job_active(updated.id, updated.enabled)
                .await;
        } else {
            self.dispatcher.unregister(updated.id).await;
            self.scheduler.remove_job(updated.id).await;
            self.route(&updated).await?;
        }
        Ok(updated)
    }

    /// Remove a rule from the engine, the dispatcher and the scheduler.
    ///
    /// # Errors
    ///
    /// Returns [`RuleflowError::NotFound`] when the rule is not registered.
    #[tracing::instrument(skip(self))]
    pub async fn remove_rule(&self, rule_id: RuleId) -> Result<AutomationRule, RuleflowError> {
        let removed = self
            .engine
            .remove_rule(rule_id)
            .await
            .ok_or_else(|| not_found(rule_id))?;
        self.dispatcher.unregister(rule_id).await;
        self.scheduler.remove_job(rule_id).await;
        tracing::info!("rule removed");
        Ok(removed)
    }

    /// Enable or disable a rule everywhere it is wired.
    ///
    /// # Errors
    ///
    /// Returns [`RuleflowError::NotFound`] when the rule is not registered.
    #[tracing::instrument(skip(self))]
    pub async fn toggle_rule(
        &self,
        rule_id: RuleId,
        enabled: bool,
    ) -> Result<AutomationRule, RuleflowError> {
        let rule = self.engine.toggle_rule(rule_id, enabled).await?;
        self.dispatcher.set_enabled(rule_id, enabled).await;
        self.scheduler.set_job_active(rule_id, enabled).await;
        Ok(rule)
    }

    /// Run a rule on demand, as a manual or webhook invocation.
    pub async fn trigger_manual(
        &self,
        rule_id: RuleId,
        data: Value,
        user_id: Option<String>,
    ) -> ExecutionResult {
        let context = ExecutionContext::new(rule_id, data).with_user(user_id);
        self.engine.execute(rule_id, Some(context)).await
    }

    /// Emit an event to every subscribed rule.
    pub async fn emit(&self, event: EventData) -> Vec<(RuleId, ExecutionResult)> {
        self.dispatcher.emit(event).await
    }

    pub async fn start(&self) {
        self.scheduler.start().await;
    }

    pub async fn stop(&self) {
        self.scheduler.stop().await;
    }

    /// Register every stored rule. Rules that fail validation are skipped.
    ///
    /// Returns the number of rules registered.
    ///
    /// # Errors
    ///
    /// Returns a storage error propagated from the repository.
    #[tracing::instrument(skip(self, repo))]
    pub async fn load_rules<R: RuleRepository>(&self, repo: &R) -> Result<usize, RuleflowError> {
        let mut loaded = 0;
        for rule in repo.get_all().await? {
            let rule_id = rule.id;
            match self.register_rule(rule).await {
                Ok(_) => loaded += 1,
                Err(err) => tracing::warn!(rule_id = %rule_id, error = %err, "skipping stored rule"),
            }
        }
        tracing::info!(loaded, "rules loaded");
        Ok(loaded)
    }

    /// Save every registered rule, including its execution statistics.
    ///
    /// # Errors
    ///
    /// Returns the first storage error from the repository.
    #[tracing::instrument(skip(self, repo))]
    pub async fn persist_rules<R: RuleRepository>(&self, repo: &R) -> Result<usize, RuleflowError> {
        let rules = self.engine.list_rules().await;
        let count = rules.len();
        for rule in rules {
            repo.save(rule).await?;
        }
        tracing::info!(count, "rules persisted");
        Ok(count)
    }

    async fn route(&self, rule: &AutomationRule) -> Result<(), RuleflowError> {
        match rule.trigger {
            Trigger::Event { .. } => self.dispatcher.register(rule).await,
            Trigger::Schedule { .. } => self.scheduler.add_job(rule).await.map(|_| ()),
            Trigger::Webhook { .. } | Trigger::Manual => Ok(()),
        }
    }
}

fn not_found(rule_id: RuleId) -> RuleflowError {
    NotFoundError {
        entity: "Rule",
        id: rule_id.to_string(),
    }
    .into()
}
