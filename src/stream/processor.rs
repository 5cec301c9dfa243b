use super::breaker::CircuitBreaker;
use super::transform::{IndexAction, to_action};
use super::types::{EventFailure, EventOutcome, StreamBatchResult};
use crate::config::PipelineConfig;
use crate::error::{IndexError, PipelineError};
use crate::keys::METADATA_SK;
use crate::search::{DeleteOutcome, SearchIndex};
use crate::storage::StreamRecord;
use crate::telemetry::{Metric, PipelineMetrics};

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::Instrument;

/// Applies primary-store mutations to the search index.
pub struct ChangeStreamProcessor {
    index: Arc<dyn SearchIndex>,
    breaker: CircuitBreaker,
    metrics: Arc<PipelineMetrics>,
    index_timeout: Duration,
}

impl ChangeStreamProcessor {
    pub fn new(
        index: Arc<dyn SearchIndex>,
        breaker: CircuitBreaker,
        metrics: Arc<PipelineMetrics>,
        index_timeout: Duration,
    ) -> Self {
        Self {
            index,
            breaker,
            metrics,
            index_timeout,
        }
    }

    pub fn from_config(
        index: Arc<dyn SearchIndex>,
        metrics: Arc<PipelineMetrics>,
        config: &PipelineConfig,
    ) -> Self {
        Self::new(
            index,
            CircuitBreaker::new(
                config.circuit_breaker_threshold,
                config.circuit_breaker_cooldown,
            ),
            metrics,
            config.index_timeout,
        )
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    /// Filters, transforms and applies one event.
    pub async fn process_record(&self, record: &StreamRecord) -> Result<EventOutcome, EventFailure> {
        if record.keys.sk != METADATA_SK {
            tracing::debug!(
                "Skipping {} {} {}: not an entity row",
                record.event_name.as_str(),
                record.keys.pk,
                record.keys.sk
            );
            self.metrics.incr(Metric::EventFiltered);
            return Ok(EventOutcome::Filtered);
        }

        let span = tracing::info_span!(
            "stream_event",
            shard = record.shard,
            sequence = record.sequence,
            operation = record.event_name.as_str(),
            pk = %record.keys.pk
        );
        let result = self.apply(record).instrument(span).await;

        match &result {
            Ok(_) => self.metrics.incr(Metric::EventApplied),
            Err(failure) => {
                self.metrics.incr(Metric::EventFailed);
                tracing::warn!("Stream event failed: {}", failure.diagnostic());
            }
        }
        result
    }

    async fn apply(&self, record: &StreamRecord) -> Result<EventOutcome, EventFailure> {
        let fail = |error: PipelineError| {
            EventFailure::new(
                record.sequence,
                record.event_name,
                &record.keys.pk,
                &record.keys.sk,
                error,
            )
        };

        match to_action(record).map_err(fail)? {
            IndexAction::Upsert(document) => {
                let id = document.id.clone();
                self.guarded(self.index.upsert(document))
                    .await
                    .map_err(|e| fail(e.into()))?;
                tracing::debug!("Upserted search document {}", id);
                Ok(EventOutcome::Applied)
            }
            IndexAction::Delete(id) => {
                match self
                    .guarded(self.index.delete(&id))
                    .await
                    .map_err(|e| fail(e.into()))?
                {
                    DeleteOutcome::Deleted => {
                        tracing::debug!("Deleted search document {}", id);
                        Ok(EventOutcome::Applied)
                    }
                    DeleteOutcome::NotFound => {
                        tracing::debug!("Search document {} already absent", id);
                        Ok(EventOutcome::AlreadyAbsent)
                    }
                }
            }
        }
    }

    /// Breaker first, then the per-call deadline.
    async fn guarded<T, F>(&self, call: F) -> Result<T, IndexError>
    where
        F: Future<Output = Result<T, IndexError>>,
    {
        self.breaker
            .call(async {
                tokio::time::timeout(self.index_timeout, call)
                    .await
                    .unwrap_or(Err(IndexError::Timeout))
            })
            .await
    }

    /// Processes records in order and stops at the first failure, so events of
    /// one shard are never applied out of order.
    pub async fn process_batch(&self, records: &[StreamRecord]) -> StreamBatchResult {
        let mut result = StreamBatchResult::default();

        for (position, record) in records.iter().enumerate() {
            match self.process_record(record).await {
                Ok(EventOutcome::Applied | EventOutcome::AlreadyAbsent) => result.applied += 1,
                Ok(EventOutcome::Filtered) => result.skipped += 1,
                Err(failure) => {
                    tracing::warn!(
                        "Stopping batch at sequence {}: {} (breaker {:?}, {} consecutive failures)",
                        failure.sequence,
                        failure.error,
                        self.breaker.state(),
                        self.breaker.consecutive_failures()
                    );
                    result.failures.push(failure);
                    result.pending = records.len() - position - 1;
                    break;
                }
            }
        }

        result
    }
}
