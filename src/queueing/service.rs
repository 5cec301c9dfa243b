use super::priority::PriorityRules;
use super::types::{EnqueueResult, FailedItem, ScrapeJob};
use crate::discovery::types::DiscoveredItem;
use crate::error::PipelineError;
use crate::keys::KeyDeriver;
use crate::keys::types::entity_pk;
use crate::queue::{MAX_BATCH_ENTRIES, OutgoingMessage, Queue};
use crate::telemetry::{Metric, PipelineMetrics};

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

pub const VALIDATION_ERROR_CODE: &str = "ValidationError";
pub const SERIALIZATION_ERROR_CODE: &str = "SerializationError";

pub struct QueueingService {
    queue: Arc<dyn Queue>,
    deriver: KeyDeriver,
    rules: PriorityRules,
    metrics: Arc<PipelineMetrics>,
    batch_size: usize,
    send_timeout: Duration,
}

impl QueueingService {
    pub fn new(
        queue: Arc<dyn Queue>,
        deriver: KeyDeriver,
        rules: PriorityRules,
        metrics: Arc<PipelineMetrics>,
    ) -> Self {
        Self {
            queue,
            deriver,
            rules,
            metrics,
            batch_size: MAX_BATCH_ENTRIES,
            send_timeout: Duration::from_secs(5),
        }
    }

    /// Batch size is capped at the backend maximum whatever is requested.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.clamp(1, MAX_BATCH_ENTRIES);
        self
    }

    pub fn with_send_timeout(mut self, timeout: Duration) -> Self {
        self.send_timeout = timeout;
        self
    }

    /// Queues one scrape job per item under a fresh scrape-run id.
    ///
    /// Never fails as a whole: validation rejects and send failures are
    /// accumulated in `failed_items` and later batches are still sent.
    pub async fn enqueue(&self, items: Vec<DiscoveredItem>) -> EnqueueResult {
        let scrape_run_id = Uuid::new_v4().to_string();
        let queued_at = Utc::now();
        let total_attempted = items.len();

        let mut failed_items = Vec::new();
        let mut jobs = Vec::with_capacity(items.len());
        for item in items {
            match self.prepare(item, &scrape_run_id, queued_at) {
                Ok(job) => jobs.push(job),
                Err(failure) => failed_items.push(failure),
            }
        }

        let mut successful_count = 0;
        for (batch_index, chunk) in jobs.chunks(self.batch_size).enumerate() {
            successful_count += self.send_chunk(batch_index, chunk, &mut failed_items).await;
        }

        self.metrics.add(Metric::Enqueued, successful_count as u64);
        self.metrics.add(Metric::EnqueueFailed, failed_items.len() as u64);

        tracing::info!(
            "Scrape run {}: {} attempted, {} queued, {} failed",
            scrape_run_id,
            total_attempted,
            successful_count,
            failed_items.len()
        );

        EnqueueResult {
            scrape_run_id,
            total_attempted,
            successful_count,
            failed_count: failed_items.len(),
            failed_items,
        }
    }

    /// Builds the job for one item, deriving keys when the item arrived without
    /// them. Supplied keys must belong to the (trimmed) entity id.
    fn prepare(
        &self,
        item: DiscoveredItem,
        scrape_run_id: &str,
        queued_at: DateTime<Utc>,
    ) -> Result<ScrapeJob, FailedItem> {
        let DiscoveredItem {
            mut entity,
            keys,
            key_issues,
        } = item;
        entity.entity_id = entity.entity_id.trim().to_string();

        let reject = |id: &str, error: PipelineError| {
            tracing::warn!("Rejected item {:?}: {}", id, error);
            FailedItem {
                id: id.to_string(),
                code: VALIDATION_ERROR_CODE.to_string(),
                message: Some(error.to_string()),
            }
        };

        let (keys, key_issues) = match keys {
            Some(keys) => {
                let expected = entity_pk(&entity.entity_id);
                if entity.entity_id.is_empty() || keys.pk != expected {
                    return Err(reject(
                        &entity.entity_id,
                        PipelineError::Validation(format!(
                            "keys {} do not belong to entity {:?}",
                            keys.pk, entity.entity_id
                        )),
                    ));
                }
                (keys, key_issues)
            }
            None => match self.deriver.derive_flagged(&entity) {
                Ok(derived) => derived,
                Err(e) => {
                    return Err(reject(
                        &entity.entity_id,
                        PipelineError::Validation(e.to_string()),
                    ));
                }
            },
        };

        let priority = self.rules.score(&entity);
        Ok(ScrapeJob {
            entity_id: entity.entity_id.clone(),
            keys,
            scrape_run_id: scrape_run_id.to_string(),
            priority,
            queued_at,
            entity,
            key_issues,
        })
    }

    /// Sends one batch and returns how many entries were accepted. Failed
    /// entries are appended to `failed_items`.
    async fn send_chunk(
        &self,
        batch_index: usize,
        chunk: &[ScrapeJob],
        failed_items: &mut Vec<FailedItem>,
    ) -> usize {
        // Entry ids only need to be unique per batch; map them back to entities.
        let mut entity_for_entry: Vec<(String, &str)> = Vec::with_capacity(chunk.len());
        let mut entries = Vec::with_capacity(chunk.len());

        for (index, job) in chunk.iter().enumerate() {
            let entry_id = index.to_string();
            match serde_json::to_string(job) {
                Ok(body) => {
                    entity_for_entry.push((entry_id.clone(), job.entity_id.as_str()));
                    entries.push(OutgoingMessage {
                        id: entry_id,
                        body,
                        priority: job.priority,
                    });
                }
                Err(e) => failed_items.push(FailedItem {
                    id: job.entity_id.clone(),
                    code: SERIALIZATION_ERROR_CODE.to_string(),
                    message: Some(e.to_string()),
                }),
            }
        }

        if entries.is_empty() {
            return 0;
        }

        let sent = tokio::time::timeout(self.send_timeout, self.queue.send_batch(entries)).await;
        let outcome = match sent {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(e)) => {
                tracing::error!("Batch {} rejected by queue: {}", batch_index, e);
                failed_items.extend(entity_for_entry.iter().map(|(_, id)| FailedItem {
                    id: id.to_string(),
                    code: e.code().to_string(),
                    message: Some(e.to_string()),
                }));
                return 0;
            }
            Err(_) => {
                tracing::error!(
                    "Batch {} timed out after {:?}",
                    batch_index,
                    self.send_timeout
                );
                failed_items.extend(entity_for_entry.iter().map(|(_, id)| FailedItem {
                    id: id.to_string(),
                    code: "Timeout".to_string(),
                    message: None,
                }));
                return 0;
            }
        };

        for failure in &outcome.failed {
            let id = entity_for_entry
                .iter()
                .find(|(entry_id, _)| *entry_id == failure.id)
                .map(|(_, id)| id.to_string())
                .unwrap_or_else(|| failure.id.clone());
            tracing::warn!("Job for {} not queued: {} ({})", id, failure.code, failure.message);
            failed_items.push(FailedItem {
                id,
                code: failure.code.clone(),
                message: Some(failure.message.clone()),
            });
        }

        tracing::debug!(
            "Batch {}: {} sent, {} failed",
            batch_index,
            outcome.successful.len(),
            outcome.failed.len()
        );
        outcome.successful.len()
    }
}
