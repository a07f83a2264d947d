//! Event log port — durable record of emitted events.

use std::future::Future;

use ruleflow_domain::error::RuleflowError;
use ruleflow_domain::event::EventData;

/// Append-only store for [`EventData`].
pub trait EventLog {
    /// Persist an emitted event.
    fn append(&self, event: EventData) -> impl Future<Output = Result<(), RuleflowError>> + Send;

    /// Get the most recent events, ordered newest-first.
    fn recent(
        &self,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<EventData>, RuleflowError>> + Send;
}
