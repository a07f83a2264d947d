//! Action — the side effect performed when a rule's conditions pass.

use serde::{Deserialize, Serialize};

use crate::id::ActionId;

/// Kind of side effect an action performs.
///
/// Types this build does not know about deserialize to
/// [`Unknown`](Self::Unknown) so stored rules still load; executing such
/// an action fails that action only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    SendEmail,
    CreateTask,
    UpdateRecord,
    SendNotification,
    CallWebhook,
    RunQuery,
    ExportData,
    #[serde(other)]
    Unknown,
}

impl ActionType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::SendEmail => "send_email",
            Self::CreateTask => "create_task",
            Self::UpdateRecord => "update_record",
            Self::SendNotification => "send_notification",
            Self::CallWebhook => "call_webhook",
            Self::RunQuery => "run_query",
            Self::ExportData => "export_data",
            Self::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for ActionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One step of a rule, executed in list order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    #[serde(default)]
    pub id: ActionId,
    #[serde(rename = "type")]
    pub action_type: ActionType,
    /// Type-specific configuration, e.g. `{"to": "...", "subject": "..."}` for email.
    #[serde(default)]
    pub config: serde_json::Value,
}

impl Action {
    #[must_use]
    pub fn new(action_type: ActionType, config: serde_json::Value) -> Self {
        Self {
            id: ActionId::new(),
            action_type,
            config,
        }
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}({})", self.action_type, self.id)
    }
}
