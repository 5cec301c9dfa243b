use super::types::DeadLetterEntry;
use crate::error::QueueError;

use async_trait::async_trait;
use std::sync::Mutex;

/// Destination for stream events that could not be applied.
#[async_trait]
pub trait DeadLetterSink: Send + Sync {
    async fn send(&self, entry: DeadLetterEntry) -> Result<(), QueueError>;
}

#[derive(Debug, Default)]
pub struct MemoryDeadLetterSink {
    entries: Mutex<Vec<DeadLetterEntry>>,
}

impl MemoryDeadLetterSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<DeadLetterEntry> {
        self.entries
            .lock()
            .map(|entries| entries.clone())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|entries| entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl DeadLetterSink for MemoryDeadLetterSink {
    async fn send(&self, entry: DeadLetterEntry) -> Result<(), QueueError> {
        tracing::error!(
            "Dead-lettered stream event shard={} operation={} pk={} sk={} attempts={} cause={}",
            entry.shard,
            entry.operation,
            entry.pk,
            entry.sk,
            entry.attempts,
            entry.cause
        );
        self.entries
            .lock()
            .map_err(|_| QueueError::Unavailable("dead-letter sink lock poisoned".to_string()))?
            .push(entry);
        Ok(())
    }
}
