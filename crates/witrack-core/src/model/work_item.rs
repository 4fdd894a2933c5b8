use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const SYSTEM_TITLE: &str = "system.title";
pub const SYSTEM_DESCRIPTION: &str = "system.description";
pub const SYSTEM_STATE: &str = "system.state";
pub const SYSTEM_CREATOR: &str = "system.creator";
pub const SYSTEM_ASSIGNEE: &str = "system.assignee";
pub const SYSTEM_ITERATION: &str = "system.iteration";
pub const SYSTEM_LABELS: &str = "system.labels";

pub const STATE_NEW: &str = "new";
pub const STATE_OPEN: &str = "open";
pub const STATE_IN_PROGRESS: &str = "in progress";
pub const STATE_RESOLVED: &str = "resolved";
pub const STATE_CLOSED: &str = "closed";

/// Every value `system.state` may take, in workflow order.
pub const SYSTEM_STATES: [&str; 5] = [
    STATE_NEW,
    STATE_OPEN,
    STATE_IN_PROGRESS,
    STATE_RESOLVED,
    STATE_CLOSED,
];

/// A work item as exchanged with callers: field values in wire shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkItem {
    pub id: String,
    #[serde(rename = "type")]
    pub type_name: String,
    pub version: i64,
    pub fields: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at_us: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at_us: Option<i64>,
}

impl WorkItem {
    /// Field value by name, `None` when absent or null.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name).filter(|value| !value.is_null())
    }

    #[must_use]
    pub fn title(&self) -> Option<&str> {
        self.field(SYSTEM_TITLE).and_then(Value::as_str)
    }

    #[must_use]
    pub fn state(&self) -> Option<&str> {
        self.field(SYSTEM_STATE).and_then(Value::as_str)
    }

    #[must_use]
    pub fn assignee(&self) -> Option<&str> {
        self.field(SYSTEM_ASSIGNEE).and_then(Value::as_str)
    }
}
