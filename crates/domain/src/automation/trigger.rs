//! Trigger — what starts the evaluation of a rule.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::event::EventKey;

/// Describes what activates an automation rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Trigger {
    /// Fires on a five-field cron pattern (e.g. `"0 9 * * 1"`).
    Schedule {
        cron: String,
        /// IANA timezone name the pattern is interpreted in.
        #[serde(default = "default_timezone")]
        timezone: String,
    },
    /// Fires when a matching domain event is emitted.
    Event {
        /// Dotted event name, e.g. `"recording.created"`.
        event: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        table: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        operation: Option<String>,
    },
    /// Fires when an inbound webhook is received.
    Webhook {
        url: String,
        #[serde(default = "default_method")]
        method: String,
        #[serde(default)]
        headers: BTreeMap<String, String>,
    },
    /// Fires only when invoked explicitly.
    Manual,
}

fn default_timezone() -> String {
    "UTC".to_string()
}

fn default_method() -> String {
    "POST".to_string()
}

impl Trigger {
    /// Short name of the trigger variant, as used in the serialized `type` tag.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Schedule { .. } => "schedule",
            Self::Event { .. } => "event",
            Self::Webhook { .. } => "webhook",
            Self::Manual => "manual",
        }
    }

    /// Subscription key for event triggers, `None` for every other variant.
    #[must_use]
    pub fn event_key(&self) -> Option<EventKey> {
        match self {
            Self::Event {
                event,
                table,
                operation,
            } => Some(EventKey::new(event, table.as_deref(), operation.as_deref())),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_schedule(&self) -> bool {
        matches!(self, Self::Schedule { .. })
    }

    #[must_use]
    pub fn is_event(&self) -> bool {
        matches!(self, Self::Event { .. })
    }
}

impl std::fmt::Display for Trigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Schedule { cron, timezone } => write!(f, "schedule({cron} {timezone})"),
            Self::Event { .. } => match self.event_key() {
                Some(key) => write!(f, "event({key})"),
                None => f.write_str("event"),
            },
            Self::Webhook { url, method, .. } => write!(f, "webhook({method} {url})"),
            Self::Manual => f.write_str("manual"),
        }
    }
}
