use crate::error::{Classify, IndexError, PipelineError};
use crate::storage::EventName;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// What happened to one mutation event that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventOutcome {
    /// The document was upserted or deleted.
    Applied,
    /// A REMOVE for a document the index never had.
    AlreadyAbsent,
    /// Not an entity-level row; the index was not touched.
    Filtered,
}

/// A failed event, tagged with its operation and keys.
#[derive(Debug, Clone, PartialEq)]
pub struct EventFailure {
    pub sequence: u64,
    pub operation: EventName,
    pub pk: String,
    pub sk: String,
    pub error: PipelineError,
    pub retryable: bool,
}

impl EventFailure {
    pub fn new(sequence: u64, operation: EventName, pk: &str, sk: &str, error: PipelineError) -> Self {
        let retryable = error.is_retryable();
        Self {
            sequence,
            operation,
            pk: pk.to_string(),
            sk: sk.to_string(),
            error,
            retryable,
        }
    }

    /// Rejected by an open breaker; the index was never called.
    pub fn is_circuit_open(&self) -> bool {
        self.error == PipelineError::Index(IndexError::CircuitOpen)
    }

    pub fn diagnostic(&self) -> String {
        format!(
            "operation={} pk={} sk={} sequence={} cause={}",
            self.operation.as_str(),
            self.pk,
            self.sk,
            self.sequence,
            self.error
        )
    }
}

/// Result of one ordered shard batch. Processing stops at the first failure;
/// the records after it are counted in `pending`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StreamBatchResult {
    pub applied: usize,
    pub skipped: usize,
    pub failures: Vec<EventFailure>,
    pub pending: usize,
}

impl StreamBatchResult {
    /// Records handled before the first failure.
    pub fn processed(&self) -> usize {
        self.applied + self.skipped
    }
}

/// An event the stream gave up on.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeadLetterEntry {
    pub shard: u32,
    pub sequence: u64,
    pub operation: String,
    pub pk: String,
    pub sk: String,
    pub cause: String,
    pub attempts: u32,
    pub dead_lettered_at: DateTime<Utc>,
}

impl DeadLetterEntry {
    pub fn from_failure(shard: u32, failure: &EventFailure, attempts: u32) -> Self {
        Self {
            shard,
            sequence: failure.sequence,
            operation: failure.operation.as_str().to_string(),
            pk: failure.pk.clone(),
            sk: failure.sk.clone(),
            cause: failure.error.to_string(),
            attempts,
            dead_lettered_at: Utc::now(),
        }
    }
}

/// What one `ShardPoller::poll_once` call did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PollSummary {
    pub read: usize,
    pub applied: usize,
    pub skipped: usize,
    pub dead_lettered: usize,
    /// A retryable failure is holding the checkpoint.
    pub retrying: bool,
    pub circuit_open: bool,
}
