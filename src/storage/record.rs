use super::types::Item;
use crate::discovery::types::CandidateEntity;
use crate::error::StoreError;
use crate::keys::EntityKeySet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Attribute holding the scrape-run id of the last writer; the idempotency token.
pub const SCRAPE_RUN_ATTRIBUTE: &str = "scrapeRunId";

/// The authoritative entity row. Stored flat: keys, entity attributes and
/// scrape results share one attribute namespace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityRecord {
    #[serde(flatten)]
    pub keys: EntityKeySet,
    #[serde(flatten)]
    pub entity: CandidateEntity,
    pub scrape_run_id: String,
    pub last_written_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub portfolio: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub website: Option<String>,
}

impl EntityRecord {
    pub fn to_item(&self) -> Result<Item, StoreError> {
        match serde_json::to_value(self) {
            Ok(Value::Object(item)) => Ok(item),
            Ok(_) => Err(StoreError::Serialization(
                "entity record did not encode to an object".to_string(),
            )),
            Err(e) => Err(StoreError::Serialization(e.to_string())),
        }
    }

    pub fn from_item(item: &Item) -> Result<Self, StoreError> {
        serde_json::from_value(Value::Object(item.clone()))
            .map_err(|e| StoreError::Serialization(e.to_string()))
    }
}
