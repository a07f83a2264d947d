//! Rule engine — owns the rule registry and runs rules.
//!
//! A run evaluates the rule's conditions against the trigger data and, if
//! they hold, executes every action in order through the
//! [`ActionExecutor`] port. Each action is isolated: a failing action is
//! recorded and the next one still runs. The engine is the error boundary
//! for rule execution — [`RuleEngine::execute`] always returns a structured
//! [`ExecutionResult`], never an error.

use std::collections::{HashMap, VecDeque};
use std::time::Instant;

use tokio::sync::RwLock;

use ruleflow_domain::automation::{Action, ActionType, AutomationRule, evaluate_all};
use ruleflow_domain::error::{NotFoundError, RuleflowError};
use ruleflow_domain::execution::{ActionResult, ExecutionContext, ExecutionResult, ExecutionStats};
use ruleflow_domain::id::RuleId;
use ruleflow_domain::time::now;

use crate::ports::ActionExecutor;

/// Number of results kept per rule.
pub const DEFAULT_EXECUTION_HISTORY_CAPACITY: usize = 100;

#[derive(Default)]
struct Registry {
    rules: HashMap<RuleId, AutomationRule>,
    history: HashMap<RuleId, VecDeque<ExecutionResult>>,
}

/// Registry of rules plus the machinery to run them.
pub struct RuleEngine<X> {
    executor: X,
    registry: RwLock<Registry>,
    history_capacity: usize,
}

impl<X> RuleEngine<X>
where
    X: ActionExecutor + Sync,
{
    /// Create an engine keeping the default number of results per rule.
    pub fn new(executor: X) -> Self {
        Self::with_history_capacity(executor, DEFAULT_EXECUTION_HISTORY_CAPACITY)
    }

    /// Create an engine keeping at most `capacity` results per rule.
    pub fn with_history_capacity(executor: X, capacity: usize) -> Self {
        Self {
            executor,
            registry: RwLock::new(Registry::default()),
            history_capacity: capacity.max(1),
        }
    }

    /// Borrow the action sink.
    pub fn executor(&self) -> &X {
        &self.executor
    }

    /// Register a rule, replacing any rule with the same id.
    #[tracing::instrument(skip(self, rule), fields(rule_id = %rule.id, rule_name = %rule.name))]
    pub async fn add_rule(&self, rule: AutomationRule) {
        self.registry.write().await.rules.insert(rule.id, rule);
        tracing::debug!("rule registered");
    }

    /// Replace an existing rule's definition and stamp a new modification time.
    ///
    /// Execution statistics carry over from the registered rule so they
    /// never go backwards.
    ///
    /// # Errors
    ///
    /// Returns [`RuleflowError::NotFound`] if no rule with that id is registered.
    #[tracing::instrument(skip(self, rule), fields(rule_id = %rule.id))]
    pub async fn update_rule(&self, mut rule: AutomationRule) -> Result<AutomationRule, RuleflowError> {
        let mut registry = self.registry.write().await;
        let existing = registry.rules.get(&rule.id).ok_or_else(|| not_found(rule.id))?;

        rule.execution_count = rule.execution_count.max(existing.execution_count);
        rule.success_count = rule.success_count.max(existing.success_count);
        rule.error_count = rule.error_count.max(existing.error_count);
        rule.last_executed = rule.last_executed.max(existing.last_executed);
        rule.created_at = existing.created_at;
        rule.updated_at = rule.updated_at.max(existing.updated_at);
        rule.touch();

        registry.rules.insert(rule.id, rule.clone());
        Ok(rule)
    }

    /// Delete a rule and its execution history.
    #[tracing::instrument(skip(self))]
    pub async fn remove_rule(&self, rule_id: RuleId) -> Option<AutomationRule> {
        let mut registry = self.registry.write().await;
        registry.history.remove(&rule_id);
        registry.rules.remove(&rule_id)
    }

    /// Flip the enabled flag without touching anything else.
    ///
    /// # Errors
    ///
    /// Returns [`RuleflowError::NotFound`] if no rule with that id is registered.
    #[tracing::instrument(skip(self))]
    pub async fn toggle_rule(
        &self,
        rule_id: RuleId,
        enabled: bool,
    ) -> Result<AutomationRule, RuleflowError> {
        let mut registry = self.registry.write().await;
        let rule = registry
            .rules
            .get_mut(&rule_id)
            .ok_or_else(|| not_found(rule_id))?;
        rule.enabled = enabled;
        Ok(rule.clone())
    }

    pub async fn get_rule(&self, rule_id: RuleId) -> Option<AutomationRule> {
        self.registry.read().await.rules.get(&rule_id).cloned()
    }

    /// Every registered rule, ordered by name.
    pub async fn list_rules(&self) -> Vec<AutomationRule> {
        let mut rules: Vec<_> = self.registry.read().await.rules.values().cloned().collect();
        rules.sort_by(|a, b| a.name.cmp(&b.name));
        rules
    }

    pub async fn rule_count(&self) -> usize {
        self.registry.read().await.rules.len()
    }

    /// Run a rule.
    ///
    /// When `context` is `None` a fresh context with null trigger data is
    /// used. A missing or disabled rule yields a failed result without
    /// running anything. Unmet conditions yield a successful result with no
    /// actions executed. Neither case touches statistics or history.
    #[tracing::instrument(skip(self, context), fields(rule_id = %rule_id))]
    pub async fn execute(
        &self,
        rule_id: RuleId,
        context: Option<ExecutionContext>,
    ) -> ExecutionResult {
        let mut context =
            context.unwrap_or_else(|| ExecutionContext::new(rule_id, serde_json::Value::Null));
        context.rule_id = rule_id;

        let Some(rule) = self.get_rule(rule_id).await else {
            tracing::debug!("rule not found");
            return ExecutionResult::rejected(&context, "Rule not found");
        };
        if !rule.enabled {
            tracing::debug!("rule is disabled");
            return ExecutionResult::rejected(&context, "Rule is disabled");
        }

        let started = Instant::now();
        if !evaluate_all(&rule.conditions, &context.trigger_data) {
            tracing::debug!(execution_id = %context.execution_id, "conditions not met");
            return ExecutionResult::skipped(&context, elapsed_ms(started));
        }

        let mut action_results = Vec::with_capacity(rule.actions.len());
        for action in &rule.actions {
            action_results.push(self.run_action(action, &context).await);
        }
        let result = ExecutionResult::completed(&context, action_results, elapsed_ms(started));

        tracing::info!(
            execution_id = %context.execution_id,
            success = result.success,
            actions_executed = result.actions_executed,
            actions_failed = result.actions_failed,
            "rule executed"
        );
        self.record(rule_id, &result).await;
        result
    }

    /// Past results for a rule, oldest first.
    pub async fn get_execution_history(&self, rule_id: RuleId) -> Vec<ExecutionResult> {
        self.registry
            .read()
            .await
            .history
            .get(&rule_id)
            .map(|entries| entries.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Counters for a rule, `None` if it is not registered.
    pub async fn get_execution_stats(&self, rule_id: RuleId) -> Option<ExecutionStats> {
        self.registry
            .read()
            .await
            .rules
            .get(&rule_id)
            .map(AutomationRule::stats)
    }

    async fn run_action(&self, action: &Action, context: &ExecutionContext) -> ActionResult {
        if action.action_type == ActionType::Unknown {
            tracing::warn!(action_id = %action.id, "unknown action type");
            return ActionResult::failed(action.id, action.action_type, "Unknown action type");
        }

        match self.executor.execute(action, context).await {
            Ok(outcome) => ActionResult {
                action_id: action.id,
                action_type: action.action_type,
                success: outcome.success,
                message: outcome.message,
                data: outcome.data,
            },
            Err(err) => {
                tracing::warn!(
                    action_id = %action.id,
                    action_type = %action.action_type,
                    error = %err,
                    "action failed"
                );
                ActionResult::failed(action.id, action.action_type, err.to_string())
            }
        }
    }

    async fn record(&self, rule_id: RuleId, result: &ExecutionResult) {
        let mut registry = self.registry.write().await;
        // The rule may have been removed while its actions were running.
        let Some(rule) = registry.rules.get_mut(&rule_id) else {
            return;
        };
        rule.record_execution(result.success, now());

        let history = registry.history.entry(rule_id).or_default();
        history.push_back(result.clone());
        while history.len() > self.history_capacity {
            history.pop_front();
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

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::{ActionError, ActionOutcome};
    use ruleflow_domain::automation::{Condition, Operator, Trigger};
    use std::future::Future;
    use std::sync::Mutex;

    // ── Recording executor ─────────────────────────────────────────

    /// Records every action it sees; fails the ones whose config says so.
    #[derive(Default)]
    struct RecordingExecutor {
        calls: Mutex<Vec<Action>>,
    }

    impl ActionExecutor for RecordingExecutor {
        fn execute(
            &self,
            action: &Action,
            _context: &ExecutionContext,
        ) -> impl Future<Output = Result<ActionOutcome, ActionError>> + Send {
            self.calls.lock().unwrap().push(action.clone());
            let result = if action.config.get("error").is_some() {
                Err(ActionError::InvalidConfig {
                    action_type: action.action_type,
                    reason: "forced".to_string(),
                })
            } else if action.config.get("soft_fail").is_some() {
                Ok(ActionOutcome::failed("soft failure"))
            } else {
                Ok(ActionOutcome::ok("done"))
            };
            async { result }
        }
    }

    // ── Helpers ────────────────────────────────────────────────────

    fn action(config: serde_json::Value) -> Action {
        Action::new(ActionType::UpdateRecord, config)
    }

    fn rule_with(actions: Vec<Action>, conditions: Vec<Condition>) -> AutomationRule {
        let mut builder = AutomationRule::builder().name("Test rule").trigger(Trigger::Manual);
        for a in actions {
            builder = builder.action(a);
        }
        for c in conditions {
            builder = builder.condition(c);
        }
        builder.build().unwrap()
    }

    async fn engine_with(rule: &AutomationRule) -> RuleEngine<RecordingExecutor> {
        let engine = RuleEngine::new(RecordingExecutor::default());
        engine.add_rule(rule.clone()).await;
        engine
    }

    fn context_for(rule: &AutomationRule, data: serde_json::Value) -> Option<ExecutionContext> {
        Some(ExecutionContext::new(rule.id, data))
    }

    // ── Tests ──────────────────────────────────────────────────────

    #[tokio::test]
    async fn should_fail_without_error_when_rule_missing() {
        let engine = RuleEngine::new(RecordingExecutor::default());
        let result = engine.execute(RuleId::new(), None).await;
        assert!(!result.success);
        assert_eq!(result.message, "Rule not found");
    }

    #[tokio::test]
    async fn should_not_invoke_actions_when_rule_disabled() {
        let mut rule = rule_with(vec![action(serde_json::json!({}))], vec![]);
        rule.enabled = false;
        let engine = engine_with(&rule).await;

        let result = engine.execute(rule.id, None).await;

        assert!(!result.success);
        assert_eq!(result.message, "Rule is disabled");
        assert!(engine.executor().calls.lock().unwrap().is_empty());
        assert_eq!(engine.get_execution_stats(rule.id).await.unwrap().total_executions, 0);
    }

    #[tokio::test]
    async fn should_execute_actions_when_condition_list_empty() {
        let rule = rule_with(vec![action(serde_json::json!({}))], vec![]);
        let engine = engine_with(&rule).await;

        let result = engine.execute(rule.id, None).await;

        assert!(result.success);
        assert!(result.conditions_met);
        assert_eq!(result.actions_executed, 1);
        assert_eq!(engine.executor().calls.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn should_return_successful_noop_when_conditions_not_met() {
        let rule = rule_with(
            vec![action(serde_json::json!({}))],
            vec![Condition::new(
                "data.status",
                Operator::Equals,
                serde_json::json!("uploaded"),
            )],
        );
        let engine = engine_with(&rule).await;

        let result = engine
            .execute(rule.id, context_for(&rule, serde_json::json!({"data": {"status": "processing"}})))
            .await;

        assert!(result.success);
        assert!(!result.conditions_met);
        assert_eq!(result.actions_executed, 0);
        assert!(engine.executor().calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn should_keep_running_actions_after_one_fails() {
        let rule = rule_with(
            vec![
                action(serde_json::json!({"step": 1})),
                action(serde_json::json!({"step": 2, "error": true})),
                action(serde_json::json!({"step": 3})),
            ],
            vec![],
        );
        let engine = engine_with(&rule).await;

        let result = engine.execute(rule.id, None).await;

        assert!(!result.success);
        assert_eq!(result.actions_executed, 2);
        assert_eq!(result.actions_failed, 1);
        assert_eq!(result.actions_executed + result.actions_failed, rule.actions.len());
        assert!(!result.action_results[1].success);
        assert!(result.action_results[1].message.contains("forced"));

        let calls = engine.executor().calls.lock().unwrap();
        let steps: Vec<_> = calls.iter().map(|a| a.config["step"].clone()).collect();
        assert_eq!(steps, vec![serde_json::json!(1), serde_json::json!(2), serde_json::json!(3)]);
    }

    #[tokio::test]
    async fn should_count_soft_failure_as_failed_action() {
        let rule = rule_with(vec![action(serde_json::json!({"soft_fail": true}))], vec![]);
        let engine = engine_with(&rule).await;

        let result = engine.execute(rule.id, None).await;

        assert!(!result.success);
        assert_eq!(result.actions_failed, 1);
        assert_eq!(result.action_results[0].message, "soft failure");
    }

    #[tokio::test]
    async fn should_fail_unknown_action_without_calling_executor() {
        let rule = rule_with(
            vec![
                Action::new(ActionType::Unknown, serde_json::json!({})),
                action(serde_json::json!({})),
            ],
            vec![],
        );
        let engine = engine_with(&rule).await;

        let result = engine.execute(rule.id, None).await;

        assert_eq!(result.actions_failed, 1);
        assert_eq!(result.actions_executed, 1);
        assert_eq!(result.action_results[0].message, "Unknown action type");
        assert_eq!(engine.executor().calls.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn should_keep_statistics_consistent_over_many_runs() {
        let ok_rule = rule_with(vec![action(serde_json::json!({}))], vec![]);
        let engine = engine_with(&ok_rule).await;
        let failing = rule_with(vec![action(serde_json::json!({"error": true}))], vec![]);
        engine.add_rule(failing.clone()).await;

        for _ in 0..5 {
            engine.execute(ok_rule.id, None).await;
        }
        for _ in 0..3 {
            engine.execute(failing.id, None).await;
        }

        let stats = engine.get_execution_stats(ok_rule.id).await.unwrap();
        assert_eq!(stats.total_executions, 5);
        assert_eq!(stats.success_count + stats.error_count, 5);
        assert!((stats.success_rate - 1.0).abs() < f64::EPSILON);

        let stats = engine.get_execution_stats(failing.id).await.unwrap();
        assert_eq!(stats.total_executions, 3);
        assert_eq!(stats.error_count, 3);

        let rule = engine.get_rule(ok_rule.id).await.unwrap();
        assert!(rule.last_executed.is_some());
    }

    #[tokio::test]
    async fn should_bound_execution_history() {
        let rule = rule_with(vec![action(serde_json::json!({}))], vec![]);
        let engine = RuleEngine::with_history_capacity(RecordingExecutor::default(), 3);
        engine.add_rule(rule.clone()).await;

        let mut ids = Vec::new();
        for _ in 0..5 {
            ids.push(engine.execute(rule.id, None).await.execution_id);
        }

        let history = engine.get_execution_history(rule.id).await;
        let kept: Vec<_> = history.iter().map(|r| r.execution_id).collect();
        assert_eq!(kept, ids[2..].to_vec());
    }

    #[tokio::test]
    async fn should_keep_default_history_capacity_of_one_hundred() {
        let rule = rule_with(vec![action(serde_json::json!({}))], vec![]);
        let engine = engine_with(&rule).await;
        for _ in 0..105 {
            engine.execute(rule.id, None).await;
        }
        assert_eq!(engine.get_execution_history(rule.id).await.len(), 100);
        assert_eq!(engine.get_execution_stats(rule.id).await.unwrap().total_executions, 105);
    }

    #[tokio::test]
    async fn should_purge_history_when_rule_removed() {
        let rule = rule_with(vec![action(serde_json::json!({}))], vec![]);
        let engine = engine_with(&rule).await;
        engine.execute(rule.id, None).await;

        let removed = engine.remove_rule(rule.id).await;

        assert!(removed.is_some());
        assert!(engine.get_execution_history(rule.id).await.is_empty());
        assert!(engine.get_execution_stats(rule.id).await.is_none());
    }

    #[tokio::test]
    async fn should_toggle_only_enabled_flag() {
        let rule = rule_with(vec![action(serde_json::json!({}))], vec![]);
        let engine = engine_with(&rule).await;

        let toggled = engine.toggle_rule(rule.id, false).await.unwrap();

        assert!(!toggled.enabled);
        assert_eq!(toggled.name, rule.name);
        assert_eq!(toggled.updated_at, rule.updated_at);
    }

    #[tokio::test]
    async fn should_return_not_found_when_toggling_missing_rule() {
        let engine = RuleEngine::new(RecordingExecutor::default());
        let result = engine.toggle_rule(RuleId::new(), true).await;
        assert!(matches!(result, Err(RuleflowError::NotFound(_))));
    }

    #[tokio::test]
    async fn should_preserve_statistics_when_rule_updated() {
        let rule = rule_with(vec![action(serde_json::json!({}))], vec![]);
        let engine = engine_with(&rule).await;
        engine.execute(rule.id, None).await;

        let mut replacement = rule.clone();
        replacement.name = "Renamed".to_string();
        let updated = engine.update_rule(replacement).await.unwrap();

        assert_eq!(updated.name, "Renamed");
        assert_eq!(updated.execution_count, 1);
        assert!(updated.updated_at >= rule.updated_at);
        assert_eq!(updated.created_at, rule.created_at);
    }

    #[tokio::test]
    async fn should_return_not_found_when_updating_missing_rule() {
        let engine = RuleEngine::new(RecordingExecutor::default());
        let rule = rule_with(vec![action(serde_json::json!({}))], vec![]);
        assert!(matches!(
            engine.update_rule(rule).await,
            Err(RuleflowError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn should_list_rules_sorted_by_name() {
        let engine = RuleEngine::new(RecordingExecutor::default());
        for name in ["b", "a", "c"] {
            let mut rule = rule_with(vec![action(serde_json::json!({}))], vec![]);
            rule.name = name.to_string();
            engine.add_rule(rule).await;
        }
        let names: Vec<_> = engine.list_rules().await.into_iter().map(|r| r.name).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
        assert_eq!(engine.rule_count().await, 3);
    }
}
