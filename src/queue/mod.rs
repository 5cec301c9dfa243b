//! Durable Job Queue
//!
//! The queue is the only coordination point between the queueing stage and the
//! scrape workers. Delivery is at-least-once and unordered; nothing downstream
//! may assume a message is seen exactly once.
//!
//! ## Lease model
//! A received message is hidden behind a **lease** (visibility timeout). If the
//! consumer deletes it before the lease ends, it is gone. If the consumer dies or
//! releases it, the message becomes visible again and is redelivered. Every
//! delivery bumps a receive counter; past `max_receive_count` the message is
//! redriven to the dead-letter list instead of being delivered again.
//!
//! ## Submodules
//! - **`types`**: message envelopes, batch outcomes, backend limits.
//! - **`memory`**: `MemoryQueue`, the in-process implementation used by the binary and tests.

pub mod memory;
pub mod types;

pub use memory::{MemoryQueue, QueueSettings};
pub use types::*;

use crate::error::QueueError;

use async_trait::async_trait;
use std::time::Duration;

#[async_trait]
pub trait Queue: Send + Sync {
    /// Sends up to [`MAX_BATCH_ENTRIES`] messages. Per-entry failures are reported
    /// in the outcome; only a malformed request fails the whole call.
    async fn send_batch(&self, entries: Vec<OutgoingMessage>) -> Result<SendBatchOutcome, QueueError>;

    /// Long-polls for up to `max_messages`, waiting at most `wait` when the queue is empty.
    async fn receive(
        &self,
        max_messages: usize,
        wait: Duration,
    ) -> Result<Vec<ReceivedMessage>, QueueError>;

    /// Acknowledges a message; it will not be delivered again.
    async fn delete(&self, receipt_handle: &str) -> Result<(), QueueError>;

    /// Ends the lease early so the message is redelivered promptly.
    async fn release(&self, receipt_handle: &str) -> Result<(), QueueError>;

    /// Moves a message straight to the dead-letter destination.
    async fn dead_letter(&self, receipt_handle: &str, reason: &str) -> Result<(), QueueError>;
}

#[cfg(test)]
mod tests;
