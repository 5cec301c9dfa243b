use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const PK_ATTRIBUTE: &str = "PK";
pub const SK_ATTRIBUTE: &str = "SK";

/// One row: attribute name to value.
pub type Item = serde_json::Map<String, Value>;

#[derive(Debug, Clone, PartialEq)]
pub enum WriteCondition {
    Always,
    /// No row with the same keys exists.
    NotExists,
    /// No row exists, or the stored `attribute` differs from `value`.
    AbsentOrDiffers { attribute: String, value: Value },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutOutcome {
    Created,
    Replaced,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EventName {
    Insert,
    Modify,
    Remove,
}

impl EventName {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventName::Insert => "INSERT",
            EventName::Modify => "MODIFY",
            EventName::Remove => "REMOVE",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamKeys {
    #[serde(rename = "PK")]
    pub pk: String,
    #[serde(rename = "SK")]
    pub sk: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamRecord {
    pub shard: u32,
    /// Monotonic within a shard, starting at 1.
    pub sequence: u64,
    pub event_name: EventName,
    pub keys: StreamKeys,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_image: Option<Item>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_image: Option<Item>,
    pub approximate_created_at: DateTime<Utc>,
}

/// Reads a string key attribute from an item.
pub fn key_attribute<'a>(item: &'a Item, attribute: &'static str) -> Option<&'a str> {
    item.get(attribute)
        .and_then(Value::as_str)
        .filter(|value| !value.is_empty())
}
