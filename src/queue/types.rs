use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Most entries accepted by one send call and most messages returned by one receive.
pub const MAX_BATCH_ENTRIES: usize = 10;

/// Largest message body the backend accepts.
pub const MAX_MESSAGE_BYTES: usize = 256 * 1024;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutgoingMessage {
    /// Caller-chosen id, unique within one batch.
    pub id: String,
    pub body: String,
    pub priority: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SendSuccess {
    pub id: String,
    pub message_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SendFailure {
    pub id: String,
    pub code: String,
    pub message: String,
    pub sender_fault: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SendBatchOutcome {
    pub successful: Vec<SendSuccess>,
    pub failed: Vec<SendFailure>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReceivedMessage {
    pub message_id: String,
    pub receipt_handle: String,
    pub body: String,
    pub priority: u8,
    pub receive_count: u32,
    pub sent_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeadLetteredMessage {
    pub message_id: String,
    pub body: String,
    pub reason: String,
    pub receive_count: u32,
    pub dead_lettered_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    pub visible: usize,
    pub in_flight: usize,
    pub dead_lettered: usize,
}
