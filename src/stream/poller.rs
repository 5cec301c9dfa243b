use super::dead_letter::DeadLetterSink;
use super::processor::ChangeStreamProcessor;
use super::types::{DeadLetterEntry, EventFailure, PollSummary};
use crate::config::PipelineConfig;
use crate::error::StoreError;
use crate::storage::MutationStream;
use crate::telemetry::{Metric, PipelineMetrics};

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Tails one shard of the mutation stream.
///
/// The checkpoint only moves past a record once it is applied, filtered or
/// dead-lettered. A retryable failure holds the checkpoint and the record is
/// re-read on the next poll; after `max_retries` redeliveries it goes to the
/// dead-letter sink. Rejections by an open breaker do not use up retries.
pub struct ShardPoller {
    shard: u32,
    stream: Arc<dyn MutationStream>,
    processor: Arc<ChangeStreamProcessor>,
    dead_letters: Arc<dyn DeadLetterSink>,
    metrics: Arc<PipelineMetrics>,
    batch_size: usize,
    max_retries: u32,
    poll_interval: Duration,
    checkpoint: u64,
    /// Failed attempts of the record at the head of the shard.
    attempts: Option<(u64, u32)>,
}

impl ShardPoller {
    pub fn new(
        shard: u32,
        stream: Arc<dyn MutationStream>,
        processor: Arc<ChangeStreamProcessor>,
        dead_letters: Arc<dyn DeadLetterSink>,
        metrics: Arc<PipelineMetrics>,
    ) -> Self {
        Self {
            shard,
            stream,
            processor,
            dead_letters,
            metrics,
            batch_size: 100,
            max_retries: 3,
            poll_interval: DEFAULT_POLL_INTERVAL,
            checkpoint: 0,
            attempts: None,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn shard(&self) -> u32 {
        self.shard
    }

    /// Sequence of the last record this poller is done with.
    pub fn checkpoint(&self) -> u64 {
        self.checkpoint
    }

    pub async fn poll_once(&mut self) -> Result<PollSummary, StoreError> {
        let records = self
            .stream
            .read_records(self.shard, self.checkpoint, self.batch_size)
            .await?;

        let mut summary = PollSummary {
            read: records.len(),
            ..PollSummary::default()
        };
        if records.is_empty() {
            return Ok(summary);
        }

        let result = self.processor.process_batch(&records).await;
        summary.applied = result.applied;
        summary.skipped = result.skipped;

        if let Some(last_done) = result.processed().checked_sub(1) {
            self.advance(records[last_done].sequence);
        }

        let Some(failure) = result.failures.first() else {
            return Ok(summary);
        };

        if failure.is_circuit_open() {
            tracing::debug!(
                "Shard {} held at {}: circuit open",
                self.shard,
                failure.sequence
            );
            summary.circuit_open = true;
            return Ok(summary);
        }

        let attempts = match self.attempts {
            Some((sequence, attempts)) if sequence == failure.sequence => attempts + 1,
            _ => 1,
        };

        if failure.retryable && attempts <= self.max_retries {
            tracing::warn!(
                "Shard {} will redeliver {} (attempt {} of {}): {}",
                self.shard,
                failure.sequence,
                attempts,
                self.max_retries + 1,
                failure.diagnostic()
            );
            self.attempts = Some((failure.sequence, attempts));
            summary.retrying = true;
            return Ok(summary);
        }

        if self.dead_letter(failure, attempts).await {
            self.advance(failure.sequence);
            summary.dead_lettered = 1;
        } else {
            self.attempts = Some((failure.sequence, attempts));
            summary.retrying = true;
        }
        Ok(summary)
    }

    /// Polls until `shutdown` flips. Sleeps between polls only when there is
    /// nothing new or the head record is waiting for a retry.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        tracing::info!("Shard poller {} started", self.shard);

        loop {
            if *shutdown.borrow() {
                break;
            }

            let idle = match self.poll_once().await {
                Ok(summary) => summary.read == 0 || summary.retrying || summary.circuit_open,
                Err(e) => {
                    tracing::warn!("Shard {} read failed: {}", self.shard, e);
                    true
                }
            };

            if idle {
                tokio::select! {
                    _ = shutdown.changed() => break,
                    _ = tokio::time::sleep(self.poll_interval) => {}
                }
            }
        }

        tracing::info!(
            "Shard poller {} stopped at checkpoint {}",
            self.shard,
            self.checkpoint
        );
    }

    fn advance(&mut self, sequence: u64) {
        self.checkpoint = self.checkpoint.max(sequence);
        if matches!(self.attempts, Some((failed, _)) if failed <= self.checkpoint) {
            self.attempts = None;
        }
    }

    async fn dead_letter(&self, failure: &EventFailure, attempts: u32) -> bool {
        let entry = DeadLetterEntry::from_failure(self.shard, failure, attempts);
        match self.dead_letters.send(entry).await {
            Ok(()) => {
                self.metrics.incr(Metric::EventDeadLettered);
                true
            }
            Err(e) => {
                tracing::error!(
                    "Could not dead-letter shard {} record {}: {}",
                    self.shard,
                    failure.sequence,
                    e
                );
                false
            }
        }
    }
}

/// Starts one poller per stream shard.
pub fn spawn_pollers(
    stream: Arc<dyn MutationStream>,
    processor: Arc<ChangeStreamProcessor>,
    dead_letters: Arc<dyn DeadLetterSink>,
    metrics: Arc<PipelineMetrics>,
    config: &PipelineConfig,
    shutdown: watch::Receiver<bool>,
) -> Vec<JoinHandle<()>> {
    stream
        .shard_ids()
        .into_iter()
        .map(|shard| {
            let poller = ShardPoller::new(
                shard,
                stream.clone(),
                processor.clone(),
                dead_letters.clone(),
                metrics.clone(),
            )
            .with_batch_size(config.stream_batch_size)
            .with_max_retries(config.stream_max_retries);
            tokio::spawn(poller.run(shutdown.clone()))
        })
        .collect()
}
