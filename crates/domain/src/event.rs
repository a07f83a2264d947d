//! Event — an immutable record of something that happened in the product.
//!
//! Producers emit [`EventData`] with a dotted `<domain>.<verb>` name and,
//! when table-scoped matching is wanted, the `table` and `operation` that
//! caused it. Rules subscribe through an [`EventKey`].

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::time::{Timestamp, now};

/// Well-known event names. Not enforced; any dotted name may be emitted.
pub mod names {
    pub const USER_CREATED: &str = "user.created";
    pub const USER_UPDATED: &str = "user.updated";
    pub const USER_DELETED: &str = "user.deleted";
    pub const RECORDING_CREATED: &str = "recording.created";
    pub const RECORDING_PROCESSED: &str = "recording.processed";
    pub const RECORDING_DELETED: &str = "recording.deleted";
    pub const TASK_CREATED: &str = "task.created";
    pub const TASK_COMPLETED: &str = "task.completed";
    pub const SYSTEM_ERROR: &str = "system.error";
}

/// An emitted domain event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventData {
    pub event: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation: Option<String>,
    #[serde(default)]
    pub data: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_data: Option<Value>,
    pub timestamp: Timestamp,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

impl EventData {
    /// Create an event stamped now, with no table, operation or user.
    #[must_use]
    pub fn new(event: impl Into<String>, data: Value) -> Self {
        Self {
            event: event.into(),
            table: None,
            operation: None,
            data,
            previous_data: None,
            timestamp: now(),
            user_id: None,
        }
    }

    #[must_use]
    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table = Some(table.into());
        self
    }

    #[must_use]
    pub fn with_operation(mut self, operation: impl Into<String>) -> Self {
        self.operation = Some(operation.into());
        self
    }

    #[must_use]
    pub fn with_previous_data(mut self, previous_data: Value) -> Self {
        self.previous_data = Some(previous_data);
        self
    }

    #[must_use]
    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// Keys probed when resolving subscribers, in probe order, without duplicates:
    /// the bare event name, the event with its own table and operation, and
    /// the event with only its operation.
    #[must_use]
    pub fn probe_keys(&self) -> Vec<EventKey> {
        let candidates = [
            EventKey::new(&self.event, None, None),
            EventKey::new(&self.event, self.table.as_deref(), self.operation.as_deref()),
            EventKey::new(&self.event, None, self.operation.as_deref()),
        ];
        let mut keys: Vec<EventKey> = Vec::with_capacity(candidates.len());
        for key in candidates {
            if !keys.contains(&key) {
                keys.push(key);
            }
        }
        keys
    }

    /// JSON view handed to condition evaluation and actions.
    #[must_use]
    pub fn to_trigger_data(&self) -> Value {
        json!({
            "event": self.event,
            "table": self.table,
            "operation": self.operation,
            "data": self.data,
            "previous_data": self.previous_data,
            "timestamp": self.timestamp.to_rfc3339(),
            "user_id": self.user_id,
        })
    }
}

/// Composite subscription key: event name plus optional table and operation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EventKey {
    pub event: String,
    pub table: Option<String>,
    pub operation: Option<String>,
}

impl EventKey {
    #[must_use]
    pub fn new(event: &str, table: Option<&str>, operation: Option<&str>) -> Self {
        Self {
            event: event.to_string(),
            table: table.map(str::to_string),
            operation: operation.map(str::to_string),
        }
    }
}

impl std::fmt::Display for EventKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.event)?;
        if let Some(table) = &self.table {
            write!(f, ":{table}")?;
        }
        if let Some(operation) = &self.operation {
            write!(f, "#{operation}")?;
        }
        Ok(())
    }
}
