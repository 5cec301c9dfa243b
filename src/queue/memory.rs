//! In-process queue with visibility leases, priority admission and redrive.

use super::types::*;
use super::Queue;
use crate::error::QueueError;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::collections::HashSet;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::Instant;
use uuid::Uuid;

/// Gap between availability checks while a long poll is waiting.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, Copy)]
pub struct QueueSettings {
    pub visibility_timeout: Duration,
    /// Deliveries allowed before a message is redriven to the dead-letter list.
    pub max_receive_count: u32,
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            visibility_timeout: Duration::from_secs(30),
            max_receive_count: 3,
        }
    }
}

#[derive(Debug, Clone)]
struct Lease {
    receipt: String,
    expires: Instant,
}

#[derive(Debug, Clone)]
struct QueueEntry {
    body: String,
    priority: u8,
    sequence: u64,
    sent_at: DateTime<Utc>,
    receive_count: u32,
    lease: Option<Lease>,
}

impl QueueEntry {
    fn is_available(&self, now: Instant) -> bool {
        match &self.lease {
            None => true,
            Some(lease) => now >= lease.expires,
        }
    }

    fn holds(&self, receipt: &str) -> bool {
        self.lease.as_ref().is_some_and(|lease| lease.receipt == receipt)
    }
}

enum Claim {
    Delivered(ReceivedMessage),
    Redrive,
}

pub struct MemoryQueue {
    name: String,
    settings: QueueSettings,
    /// `message id -> entry`
    messages: DashMap<String, QueueEntry>,
    /// `receipt handle -> message id`, only for the latest delivery of each message.
    receipts: DashMap<String, String>,
    dead_letters: Mutex<Vec<DeadLetteredMessage>>,
    sequence: AtomicU64,
}

impl MemoryQueue {
    pub fn new(name: impl Into<String>, settings: QueueSettings) -> Self {
        Self {
            name: name.into(),
            settings,
            messages: DashMap::new(),
            receipts: DashMap::new(),
            dead_letters: Mutex::new(Vec::new()),
            sequence: AtomicU64::new(0),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn stats(&self) -> QueueStats {
        let now = Instant::now();
        let (visible, in_flight) = self.messages.iter().fold((0, 0), |(v, f), entry| {
            if entry.value().is_available(now) {
                (v + 1, f)
            } else {
                (v, f + 1)
            }
        });
        QueueStats {
            visible,
            in_flight,
            dead_lettered: self.dead_letter_count(),
        }
    }

    pub fn dead_letter_count(&self) -> usize {
        self.dead_letters.lock().map(|dl| dl.len()).unwrap_or(0)
    }

    pub fn dead_letters(&self) -> Vec<DeadLetteredMessage> {
        self.dead_letters
            .lock()
            .map(|dl| dl.clone())
            .unwrap_or_default()
    }

    /// Leases up to `max` currently visible messages, highest priority first and
    /// oldest first within a priority.
    fn claim_available(&self, max: usize) -> Vec<ReceivedMessage> {
        let now = Instant::now();

        let mut candidates: Vec<(u8, u64, String)> = self
            .messages
            .iter()
            .filter(|entry| entry.value().is_available(now))
            .map(|entry| (entry.priority, entry.sequence, entry.key().clone()))
            .collect();
        candidates.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));

        let mut received = Vec::new();
        for (_, _, message_id) in candidates {
            if received.len() >= max {
                break;
            }

            let claim = match self.messages.get_mut(&message_id) {
                None => continue,
                Some(mut entry) => {
                    // Another receiver may have leased it since the scan.
                    if !entry.is_available(now) {
                        continue;
                    }
                    if entry.receive_count >= self.settings.max_receive_count {
                        Claim::Redrive
                    } else {
                        entry.receive_count += 1;
                        let receipt = Uuid::new_v4().to_string();
                        let previous = entry.lease.replace(Lease {
                            receipt: receipt.clone(),
                            expires: now + self.settings.visibility_timeout,
                        });
                        if let Some(previous) = previous {
                            self.receipts.remove(&previous.receipt);
                        }
                        Claim::Delivered(ReceivedMessage {
                            message_id: message_id.clone(),
                            receipt_handle: receipt,
                            body: entry.body.clone(),
                            priority: entry.priority,
                            receive_count: entry.receive_count,
                            sent_at: entry.sent_at,
                        })
                    }
                }
            };

            match claim {
                Claim::Delivered(message) => {
                    self.receipts
                        .insert(message.receipt_handle.clone(), message_id);
                    received.push(message);
                }
                Claim::Redrive => {
                    tracing::warn!(
                        "Message {} exceeded {} receives on {}, redriving",
                        message_id,
                        self.settings.max_receive_count,
                        self.name
                    );
                    self.move_to_dead_letter(&message_id, "maxReceiveCount exceeded");
                }
            }
        }

        received
    }

    fn move_to_dead_letter(&self, message_id: &str, reason: &str) {
        let Some((_, entry)) = self.messages.remove(message_id) else {
            return;
        };
        if let Some(lease) = &entry.lease {
            self.receipts.remove(&lease.receipt);
        }
        if let Ok(mut dead_letters) = self.dead_letters.lock() {
            dead_letters.push(DeadLetteredMessage {
                message_id: message_id.to_string(),
                body: entry.body,
                reason: reason.to_string(),
                receive_count: entry.receive_count,
                dead_lettered_at: Utc::now(),
            });
        }
    }

    /// Resolves a receipt to its message id, rejecting receipts that were
    /// superseded by a later delivery.
    fn resolve_receipt(&self, receipt_handle: &str) -> Result<String, QueueError> {
        let invalid = || QueueError::ReceiptHandleInvalid(receipt_handle.to_string());
        let message_id = self
            .receipts
            .get(receipt_handle)
            .map(|id| id.value().clone())
            .ok_or_else(invalid)?;
        match self.messages.get(&message_id) {
            Some(entry) if entry.holds(receipt_handle) => Ok(message_id),
            _ => Err(invalid()),
        }
    }
}

#[async_trait]
impl Queue for MemoryQueue {
    async fn send_batch(&self, entries: Vec<OutgoingMessage>) -> Result<SendBatchOutcome, QueueError> {
        if entries.len() > MAX_BATCH_ENTRIES {
            return Err(QueueError::TooManyEntriesInBatchRequest {
                count: entries.len(),
                max: MAX_BATCH_ENTRIES,
            });
        }
        let mut seen = HashSet::new();
        if !entries.iter().all(|entry| seen.insert(entry.id.as_str())) {
            return Err(QueueError::BatchEntryIdsNotDistinct);
        }

        let mut outcome = SendBatchOutcome::default();
        for entry in entries {
            if entry.body.len() > MAX_MESSAGE_BYTES {
                outcome.failed.push(SendFailure {
                    message: format!(
                        "message of {} bytes exceeds {} bytes",
                        entry.body.len(),
                        MAX_MESSAGE_BYTES
                    ),
                    id: entry.id,
                    code: "MessageTooLong".to_string(),
                    sender_fault: true,
                });
                continue;
            }

            let message_id = Uuid::new_v4().to_string();
            self.messages.insert(
                message_id.clone(),
                QueueEntry {
                    body: entry.body,
                    priority: entry.priority,
                    sequence: self.sequence.fetch_add(1, Ordering::Relaxed),
                    sent_at: Utc::now(),
                    receive_count: 0,
                    lease: None,
                },
            );
            outcome.successful.push(SendSuccess {
                id: entry.id,
                message_id,
            });
        }

        tracing::debug!(
            "Queue {} accepted {} messages, rejected {}",
            self.name,
            outcome.successful.len(),
            outcome.failed.len()
        );
        Ok(outcome)
    }

    async fn receive(
        &self,
        max_messages: usize,
        wait: Duration,
    ) -> Result<Vec<ReceivedMessage>, QueueError> {
        let max = max_messages.clamp(1, MAX_BATCH_ENTRIES);
        let deadline = Instant::now() + wait;

        loop {
            let batch = self.claim_available(max);
            if !batch.is_empty() {
                return Ok(batch);
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(Vec::new());
            }
            tokio::time::sleep((deadline - now).min(POLL_INTERVAL)).await;
        }
    }

    async fn delete(&self, receipt_handle: &str) -> Result<(), QueueError> {
        let message_id = self.resolve_receipt(receipt_handle)?;
        let removed = self
            .messages
            .remove_if(&message_id, |_, entry| entry.holds(receipt_handle));
        self.receipts.remove(receipt_handle);
        match removed {
            Some(_) => Ok(()),
            None => Err(QueueError::ReceiptHandleInvalid(receipt_handle.to_string())),
        }
    }

    async fn release(&self, receipt_handle: &str) -> Result<(), QueueError> {
        let message_id = self.resolve_receipt(receipt_handle)?;
        if let Some(mut entry) = self.messages.get_mut(&message_id) {
            if let Some(lease) = entry.lease.as_mut() {
                lease.expires = Instant::now();
            }
        }
        Ok(())
    }

    async fn dead_letter(&self, receipt_handle: &str, reason: &str) -> Result<(), QueueError> {
        let message_id = self.resolve_receipt(receipt_handle)?;
        self.move_to_dead_letter(&message_id, reason);
        Ok(())
    }
}
