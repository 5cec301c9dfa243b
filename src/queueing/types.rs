use crate::discovery::types::{CandidateEntity, DiscoveredItem};
use crate::keys::{EntityKeySet, KeyIssue};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Queue message body. Carries the whole entity so workers never read back
/// discovery output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScrapeJob {
    pub entity_id: String,
    pub keys: EntityKeySet,
    pub scrape_run_id: String,
    pub priority: u8,
    pub queued_at: DateTime<Utc>,
    pub entity: CandidateEntity,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub key_issues: Vec<KeyIssue>,
}

/// Accepts a full discovery batch; the summary, if present, is ignored.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnqueueRequest {
    #[serde(default)]
    pub discovered_items: Vec<DiscoveredItem>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailedItem {
    pub id: String,
    pub code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnqueueResult {
    pub scrape_run_id: String,
    pub total_attempted: usize,
    pub successful_count: usize,
    pub failed_count: usize,
    pub failed_items: Vec<FailedItem>,
}
