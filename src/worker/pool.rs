use super::scraper::DetailScraper;
use super::types::*;
use crate::error::{ErrorClass, PipelineError, QueueError, ScrapeError, StoreError};
use crate::keys::normalize::normalize_style;
use crate::keys::types::entity_pk;
use crate::queue::{Queue, ReceivedMessage};
use crate::queueing::ScrapeJob;
use crate::storage::record::SCRAPE_RUN_ATTRIBUTE;
use crate::storage::{EntityRecord, Store, WriteCondition};
use crate::telemetry::{Metric, PipelineMetrics};

use chrono::Utc;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::Instrument;

/// Drives scrape jobs from the queue into the store.
pub struct ScrapeWorkerPool {
    queue: Arc<dyn Queue>,
    store: Arc<dyn Store>,
    scraper: Arc<dyn DetailScraper>,
    metrics: Arc<PipelineMetrics>,
    settings: WorkerSettings,
}

impl ScrapeWorkerPool {
    pub fn new(
        queue: Arc<dyn Queue>,
        store: Arc<dyn Store>,
        scraper: Arc<dyn DetailScraper>,
        metrics: Arc<PipelineMetrics>,
        settings: WorkerSettings,
    ) -> Arc<Self> {
        Arc::new(Self {
            queue,
            store,
            scraper,
            metrics,
            settings,
        })
    }

    /// Spawns `worker_count` independent workers. They stop after finishing the
    /// message in hand once `shutdown` flips to `true` or its sender is dropped.
    pub fn start(self: &Arc<Self>, shutdown: watch::Receiver<bool>) -> Vec<JoinHandle<()>> {
        tracing::info!("Starting {} scrape workers", self.settings.worker_count);

        (0..self.settings.worker_count)
            .map(|worker_id| {
                let pool = self.clone();
                let shutdown = shutdown.clone();
                tokio::spawn(async move {
                    pool.worker_loop(worker_id, shutdown).await;
                })
            })
            .collect()
    }

    async fn worker_loop(&self, worker_id: usize, mut shutdown: watch::Receiver<bool>) {
        tracing::info!("Worker {} started", worker_id);

        loop {
            if *shutdown.borrow() {
                break;
            }

            // Only the wait for messages is cancellable; a received batch is
            // always finished.
            let received = tokio::select! {
                _ = shutdown.changed() => break,
                received = self.receive() => received,
            };

            match received {
                Ok(messages) => {
                    if !messages.is_empty() {
                        tracing::debug!("Worker {} received {} jobs", worker_id, messages.len());
                    }
                    for message in messages {
                        self.handle_message(message).await;
                    }
                }
                Err(e) => {
                    tracing::warn!("Worker {} failed to poll: {}", worker_id, e);
                    tokio::time::sleep(self.settings.error_backoff).await;
                }
            }
        }

        tracing::info!("Worker {} stopped", worker_id);
    }

    /// One poll-and-process round. Returns the outcome of every message received.
    pub async fn poll_once(&self) -> Result<Vec<ScrapeOutcome>, QueueError> {
        let messages = self.receive().await?;
        let mut outcomes = Vec::with_capacity(messages.len());
        for message in messages {
            outcomes.push(self.handle_message(message).await);
        }
        Ok(outcomes)
    }

    async fn receive(&self) -> Result<Vec<ReceivedMessage>, QueueError> {
        let deadline = self.settings.poll_wait + self.settings.queue_timeout;
        tokio::time::timeout(
            deadline,
            self.queue
                .receive(self.settings.max_messages, self.settings.poll_wait),
        )
        .await
        .unwrap_or(Err(QueueError::Timeout))
    }

    /// Decodes, processes and settles one message with the queue.
    pub async fn handle_message(&self, message: ReceivedMessage) -> ScrapeOutcome {
        let job: ScrapeJob = match serde_json::from_str(&message.body) {
            Ok(job) => job,
            Err(e) => {
                let reason = format!("malformed job body: {}", e);
                tracing::error!(
                    "Dead-lettering message {} (receive {}): {}",
                    message.message_id,
                    message.receive_count,
                    reason
                );
                self.settle(&message, Settle::DeadLetter(&reason)).await;
                return ScrapeOutcome::failed(PipelineError::Malformed(e.to_string()));
            }
        };

        let outcome = self.process(&job).await;

        match &outcome {
            ScrapeOutcome::Committed | ScrapeOutcome::SkippedDuplicate => {
                self.settle(&message, Settle::Delete).await;
            }
            ScrapeOutcome::Failed { reason, class } if *class == ErrorClass::Transient => {
                tracing::warn!(
                    "Job {} ({}) failed transiently, releasing for redelivery: {}",
                    job.entity_id,
                    job.keys.pk,
                    reason
                );
                self.settle(&message, Settle::Release).await;
            }
            ScrapeOutcome::Failed { reason, class } => {
                let diagnostic = format!(
                    "operation=scrape pk={} sk={} scrapeRunId={} class={:?} cause={}",
                    job.keys.pk, job.keys.sk, job.scrape_run_id, class, reason
                );
                tracing::error!("Dead-lettering job {}: {}", job.entity_id, diagnostic);
                self.settle(&message, Settle::DeadLetter(&diagnostic)).await;
            }
        }

        outcome
    }

    /// Runs the scrape and the idempotent commit for one job.
    pub async fn process(&self, job: &ScrapeJob) -> ScrapeOutcome {
        let span = tracing::info_span!(
            "scrape_job",
            entity_id = %job.entity_id,
            scrape_run_id = %job.scrape_run_id
        );
        let outcome = self.process_inner(job).instrument(span).await;

        match &outcome {
            ScrapeOutcome::Committed => self.metrics.incr(Metric::Committed),
            ScrapeOutcome::SkippedDuplicate => self.metrics.incr(Metric::SkippedDuplicate),
            ScrapeOutcome::Failed { .. } => self.metrics.incr(Metric::ScrapeFailed),
        }
        outcome
    }

    async fn process_inner(&self, job: &ScrapeJob) -> ScrapeOutcome {
        if job.entity_id.trim().is_empty() || job.keys.pk != entity_pk(&job.entity_id) {
            return ScrapeOutcome::failed(PipelineError::Malformed(format!(
                "job keys {} do not belong to entity {:?}",
                job.keys.pk, job.entity_id
            )));
        }

        let details = match with_deadline(
            self.settings.scrape_timeout,
            self.scraper.scrape(job),
            ScrapeError::Timeout,
        )
        .await
        {
            Ok(details) => details,
            Err(e) => return ScrapeOutcome::failed(e),
        };

        let item = match build_record(job, details).to_item() {
            Ok(item) => item,
            Err(e) => return ScrapeOutcome::failed(e),
        };
        let condition = WriteCondition::AbsentOrDiffers {
            attribute: SCRAPE_RUN_ATTRIBUTE.to_string(),
            value: serde_json::Value::String(job.scrape_run_id.clone()),
        };

        match with_deadline(
            self.settings.store_timeout,
            self.store.put_item(item, condition),
            StoreError::Timeout,
        )
        .await
        {
            Ok(put) => {
                tracing::info!("Committed {} ({:?})", job.keys.pk, put);
                ScrapeOutcome::Committed
            }
            Err(StoreError::ConditionalCheckFailed { .. }) => {
                tracing::info!(
                    "Skipping {}: already written by run {}",
                    job.keys.pk,
                    job.scrape_run_id
                );
                ScrapeOutcome::SkippedDuplicate
            }
            Err(e) => ScrapeOutcome::failed(e),
        }
    }

    async fn settle(&self, message: &ReceivedMessage, settle: Settle<'_>) {
        let receipt = message.receipt_handle.as_str();
        let (action, result) = match settle {
            Settle::Delete => (
                "delete",
                with_deadline(
                    self.settings.queue_timeout,
                    self.queue.delete(receipt),
                    QueueError::Timeout,
                )
                .await,
            ),
            Settle::Release => (
                "release",
                with_deadline(
                    self.settings.queue_timeout,
                    self.queue.release(receipt),
                    QueueError::Timeout,
                )
                .await,
            ),
            Settle::DeadLetter(reason) => {
                let result = with_deadline(
                    self.settings.queue_timeout,
                    self.queue.dead_letter(receipt, reason),
                    QueueError::Timeout,
                )
                .await;
                if result.is_ok() {
                    self.metrics.incr(Metric::JobDeadLettered);
                }
                ("dead-letter", result)
            }
        };

        // The lease runs out on its own; redelivery then resolves through the store guard.
        if let Err(e) = result {
            tracing::warn!(
                "Could not {} message {}: {}",
                action,
                message.message_id,
                e
            );
        }
    }
}

enum Settle<'a> {
    Delete,
    Release,
    DeadLetter(&'a str),
}

/// Bounds `call` by `deadline`; an elapsed deadline becomes `on_timeout`.
async fn with_deadline<T, E, F>(deadline: Duration, call: F, on_timeout: E) -> Result<T, E>
where
    F: Future<Output = Result<T, E>>,
{
    tokio::time::timeout(deadline, call)
        .await
        .unwrap_or(Err(on_timeout))
}

fn build_record(job: &ScrapeJob, details: ScrapeDetails) -> EntityRecord {
    let mut entity = job.entity.clone();
    for style in details.styles.iter().map(|s| normalize_style(s)) {
        if !style.is_empty() && !entity.styles.contains(&style) {
            entity.styles.push(style);
        }
    }

    EntityRecord {
        keys: job.keys.clone(),
        entity,
        scrape_run_id: job.scrape_run_id.clone(),
        last_written_at: Utc::now(),
        portfolio: details.portfolio,
        bio: details.bio,
        website: details.website,
    }
}
