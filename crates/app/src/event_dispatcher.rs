//! Event dispatcher — routes emitted events to the rules subscribed to them.
//!
//! Rules subscribe under an [`EventKey`] derived from their event trigger.
//! Emitting an event records it in a bounded history, fans it out to any
//! [`broadcast`] subscribers, then runs every enabled matching rule through
//! the [`RuleEngine`]. One rule's failure never prevents the others.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock, broadcast};

use ruleflow_domain::automation::AutomationRule;
use ruleflow_domain::error::{RuleflowError, ValidationError};
use ruleflow_domain::event::{EventData, EventKey};
use ruleflow_domain::execution::{ExecutionContext, ExecutionResult};
use ruleflow_domain::id::RuleId;

use crate::ports::ActionExecutor;
use crate::rule_engine::RuleEngine;

/// Number of emitted events kept in memory.
pub const DEFAULT_EVENT_HISTORY_CAPACITY: usize = 1000;

const BROADCAST_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy)]
struct Subscription {
    rule_id: RuleId,
    enabled: bool,
}

/// Matches emitted events against subscribed rules.
pub struct EventDispatcher<X> {
    engine: Arc<RuleEngine<X>>,
    subscriptions: RwLock<HashMap<EventKey, Vec<Subscription>>>,
    history: Mutex<VecDeque<EventData>>,
    history_capacity: usize,
    sender: broadcast::Sender<EventData>,
}

impl<X> EventDispatcher<X>
where
    X: ActionExecutor + Sync,
{
    #[must_use]
    pub fn new(engine: Arc<RuleEngine<X>>) -> Self {
        Self::with_history_capacity(engine, DEFAULT_EVENT_HISTORY_CAPACITY)
    }

    #[must_use]
    pub fn with_history_capacity(engine: Arc<RuleEngine<X>>, capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(BROADCAST_CAPACITY);
        let capacity = capacity.max(1);
        Self {
            engine,
            subscriptions: RwLock::new(HashMap::new()),
            history: Mutex::new(VecDeque::with_capacity(capacity)),
            history_capacity: capacity,
            sender,
        }
    }

    /// Subscribe an event-triggered rule, replacing any earlier subscription
    /// of the same rule.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::UnexpectedTrigger`] when the rule is not
    /// event-triggered.
    #[tracing::instrument(skip(self, rule), fields(rule_id = %rule.id))]
    pub async fn register(&self, rule: &AutomationRule) -> Result<(), RuleflowError> {
        let Some(key) = rule.trigger.event_key() else {
            return Err(ValidationError::UnexpectedTrigger {
                expected: "event",
                actual: rule.trigger.kind(),
            }
            .into());
        };

        let mut subscriptions = self.subscriptions.write().await;
        remove_from_buckets(&mut subscriptions, rule.id);
        subscriptions.entry(key.clone()).or_default().push(Subscription {
            rule_id: rule.id,
            enabled: rule.enabled,
        });
        tracing::debug!(key = %key, "rule subscribed");
        Ok(())
    }

    /// Drop a rule from every bucket. Returns whether it was subscribed.
    #[tracing::instrument(skip(self))]
    pub async fn unregister(&self, rule_id: RuleId) -> bool {
        remove_from_buckets(&mut *self.subscriptions.write().await, rule_id)
    }

    /// Update the enabled snapshot of a subscribed rule.
    pub async fn set_enabled(&self, rule_id: RuleId, enabled: bool) -> bool {
        let mut found = false;
        for subscription in self
            .subscriptions
            .write()
            .await
            .values_mut()
            .flatten()
            .filter(|s| s.rule_id == rule_id)
        {
            subscription.enabled = enabled;
            found = true;
        }
        found
    }

    /// Whether a rule has a subscription.
    pub async fn is_registered(&self, rule_id: RuleId) -> bool {
        self.subscriptions
            .read()
            .await
            .values()
            .flatten()
            .any(|s| s.rule_id == rule_id)
    }

    /// Number of subscribed rules across all buckets.
    pub async fn subscription_count(&self) -> usize {
        self.subscriptions.read().await.values().map(Vec::len).sum()
    }

    /// Emit an event and run every enabled rule subscribed to it.
    ///
    /// Returns the result of each run, in bucket order.
    #[tracing::instrument(skip(self, event), fields(event = %event.event))]
    pub async fn emit(&self, event: EventData) -> Vec<(RuleId, ExecutionResult)> {
        {
            let mut history = self.history.lock().await;
            history.push_back(event.clone());
            while history.len() > self.history_capacity {
                history.pop_front();
            }
        }
        // No receivers is not an error.
        let _ = self.sender.send(event.clone());

        let matched = self.matching_rules(&event).await;
        if matched.is_empty() {
            tracing::trace!("no matching rules");
            return Vec::new();
        }

        let trigger_data = event.to_trigger_data();
        let mut results = Vec::with_capacity(matched.len());
        for rule_id in matched {
            let context = ExecutionContext::new(rule_id, trigger_data.clone())
                .with_user(event.user_id.clone());
            let result = self.engine.execute(rule_id, Some(context)).await;
            if !result.success {
                tracing::warn!(rule_id = %rule_id, message = %result.message, "rule run failed");
            }
            results.push((rule_id, result));
        }
        results
    }

    /// Most recent events, oldest first. `None` returns the whole history.
    pub async fn history(&self, limit: Option<usize>) -> Vec<EventData> {
        let history = self.history.lock().await;
        tail(history.iter(), history.len(), limit)
    }

    /// Most recent events scoped to `table`, oldest first.
    pub async fn events_for_table(&self, table: &str, limit: Option<usize>) -> Vec<EventData> {
        let history = self.history.lock().await;
        let matching: Vec<_> = history
            .iter()
            .filter(|e| e.table.as_deref() == Some(table))
            .collect();
        let len = matching.len();
        tail(matching.into_iter(), len, limit)
    }

    /// Most recent events named `event`, oldest first.
    pub async fn events_for_type(&self, event: &str, limit: Option<usize>) -> Vec<EventData> {
        let history = self.history.lock().await;
        let matching: Vec<_> = history.iter().filter(|e| e.event == event).collect();
        let len = matching.len();
        tail(matching.into_iter(), len, limit)
    }

    pub async fn clear_history(&self) {
        self.history.lock().await.clear();
    }

    /// Receive every event emitted after this call.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<EventData> {
        self.sender.subscribe()
    }

    async fn matching_rules(&self, event: &EventData) -> Vec<RuleId> {
        let subscriptions = self.subscriptions.read().await;
        let mut matched: Vec<RuleId> = Vec::new();
        for key in event.probe_keys() {
            let Some(bucket) = subscriptions.get(&key) else {
                continue;
            };
            for subscription in bucket.iter().filter(|s| s.enabled) {
                if !matched.contains(&subscription.rule_id) {
                    matched.push(subscription.rule_id);
                }
            }
        }
        matched
    }
}

fn remove_from_buckets(
    subscriptions: &mut HashMap<EventKey, Vec<Subscription>>,
    rule_id: RuleId,
) -> bool {
    let mut removed = false;
    subscriptions.retain(|_, bucket| {
        let before = bucket.len();
        bucket.retain(|s| s.rule_id != rule_id);
        removed |= bucket.len() != before;
        !bucket.is_empty()
    });
    removed
}

fn tail<'a>(
    events: impl Iterator<Item = &'a EventData>,
    len: usize,
    limit: Option<usize>,
) -> Vec<EventData> {
    let skip = limit.map_or(0, |limit| len.saturating_sub(limit));
    events.skip(skip).cloned().collect()
}
