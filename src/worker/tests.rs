//! Worker Module Tests
//!
//! ## Test Scopes
//! - **Idempotency**: delivering the same job 1x, 2x or Nx yields exactly one store transition.
//! - **Failure routing**: transient failures release the lease, permanent ones dead-letter.
//! - **Deadlines**: a slow scrape or store call is a transient failure, never a success.
//! - **Pool lifecycle**: workers drain the queue and stop on shutdown.

#[cfg(test)]
mod tests {
    use crate::discovery::types::{CandidateEntity, Source};
    use crate::error::{ErrorClass, ScrapeError, StoreError};
    use crate::keys::KeyDeriver;
    use crate::queue::{MemoryQueue, OutgoingMessage, Queue, QueueSettings};
    use crate::queueing::ScrapeJob;
    use crate::storage::{
        EntityRecord, Item, MemoryStore, MutationStream, PartitionManager, PutOutcome, Store,
        WriteCondition,
    };
    use crate::telemetry::{Metric, PipelineMetrics};
    use crate::worker::{ScrapeOutcome, ScrapeWorkerPool, StubDetailScraper, WorkerSettings};

    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;
    use tokio::sync::watch;

    /// Store wrapper that can be switched into an unavailable or slow mode.
    struct FlakyStore {
        inner: MemoryStore,
        unavailable: AtomicBool,
        stall: Option<Duration>,
    }

    impl FlakyStore {
        fn new(stall: Option<Duration>) -> Self {
            Self {
                inner: MemoryStore::new("artists", PartitionManager::new(2)),
                unavailable: AtomicBool::new(false),
                stall,
            }
        }
    }

    #[async_trait]
    impl Store for FlakyStore {
        async fn get_item(&self, pk: &str, sk: &str) -> Result<Option<Item>, StoreError> {
            self.inner.get_item(pk, sk).await
        }

        async fn put_item(
            &self,
            item: Item,
            condition: WriteCondition,
        ) -> Result<PutOutcome, StoreError> {
            if let Some(stall) = self.stall {
                tokio::time::sleep(stall).await;
            }
            if self.unavailable.load(Ordering::SeqCst) {
                return Err(StoreError::Unavailable("throttled".to_string()));
            }
            self.inner.put_item(item, condition).await
        }

        async fn delete_item(&self, pk: &str, sk: &str) -> Result<Option<Item>, StoreError> {
            self.inner.delete_item(pk, sk).await
        }
    }

    struct Harness {
        queue: Arc<MemoryQueue>,
        store: Arc<MemoryStore>,
        scraper: Arc<StubDetailScraper>,
        metrics: Arc<PipelineMetrics>,
        pool: Arc<ScrapeWorkerPool>,
    }

    fn settings() -> WorkerSettings {
        WorkerSettings {
            worker_count: 2,
            max_messages: 10,
            poll_wait: Duration::ZERO,
            scrape_timeout: Duration::from_secs(1),
            store_timeout: Duration::from_secs(1),
            queue_timeout: Duration::from_secs(1),
            error_backoff: Duration::from_millis(10),
        }
    }

    fn harness_with(scraper: StubDetailScraper, settings: WorkerSettings) -> Harness {
        let queue = Arc::new(MemoryQueue::new(
            "scrape-jobs",
            QueueSettings {
                visibility_timeout: Duration::from_secs(30),
                max_receive_count: 5,
            },
        ));
        let store = Arc::new(MemoryStore::new("artists", PartitionManager::new(2)));
        let scraper = Arc::new(scraper);
        let metrics = PipelineMetrics::new();
        let pool = ScrapeWorkerPool::new(
            queue.clone(),
            store.clone(),
            scraper.clone(),
            metrics.clone(),
            settings,
        );
        Harness {
            queue,
            store,
            scraper,
            metrics,
            pool,
        }
    }

    fn harness() -> Harness {
        harness_with(StubDetailScraper::new(), settings())
    }

    fn job(entity_id: &str, run: &str) -> ScrapeJob {
        let entity = CandidateEntity {
            entity_id: entity_id.to_string(),
            name: "Velvet Crown Tattoo".to_string(),
            studio_name: Some("Velvet Crown Studio".to_string()),
            source: Source::MapApi,
            location: "glasgow".to_string(),
            styles: vec!["japanese".to_string()],
            geohash: Some("gcuvz3".to_string()),
            latitude: Some(55.8642),
            longitude: Some(-4.2518),
            handle: Some("@velvetcrown".to_string()),
            confidence: 1.0,
            discovered_at: Utc::now(),
        };
        let keys = KeyDeriver::new(10).derive(&entity).unwrap();
        ScrapeJob {
            entity_id: entity_id.to_string(),
            keys,
            scrape_run_id: run.to_string(),
            priority: 9,
            queued_at: Utc::now(),
            entity,
            key_issues: Vec::new(),
        }
    }

    async fn send(queue: &MemoryQueue, jobs: &[ScrapeJob]) {
        let entries = jobs
            .iter()
            .enumerate()
            .map(|(i, job)| OutgoingMessage {
                id: i.to_string(),
                body: serde_json::to_string(job).unwrap(),
                priority: job.priority,
            })
            .collect();
        let outcome = queue.send_batch(entries).await.unwrap();
        assert!(outcome.failed.is_empty());
    }

    async fn stream_len(store: &MemoryStore) -> usize {
        let mut total = 0;
        for shard in store.shard_ids() {
            total += store.read_records(shard, 0, 1000).await.unwrap().len();
        }
        total
    }

    // ============================================================
    // TEST 1: Idempotency
    // ============================================================

    #[tokio::test]
    async fn test_same_job_delivered_n_times_commits_once() {
        for deliveries in [1usize, 2, 5] {
            // ARRANGE
            let h = harness();
            let job = job("artist-1", "run-1");

            // ACT
            let mut outcomes = Vec::new();
            for _ in 0..deliveries {
                outcomes.push(h.pool.process(&job).await);
            }

            // ASSERT
            assert_eq!(outcomes[0], ScrapeOutcome::Committed);
            assert!(outcomes[1..].iter().all(|o| *o == ScrapeOutcome::SkippedDuplicate));
            assert_eq!(stream_len(&h.store).await, 1);
            assert_eq!(h.metrics.get(Metric::Committed), 1);
            assert_eq!(h.metrics.get(Metric::SkippedDuplicate), deliveries as u64 - 1);
        }
    }

    #[tokio::test]
    async fn test_duplicate_messages_are_both_acknowledged() {
        // ARRANGE: the same job queued twice (at-least-once delivery)
        let h = harness();
        let job = job("artist-2", "run-1");
        send(&h.queue, &[job.clone(), job]).await;

        // ACT
        let outcomes = h.pool.poll_once().await.unwrap();

        // ASSERT
        assert_eq!(outcomes.len(), 2);
        assert!(outcomes.contains(&ScrapeOutcome::Committed));
        assert!(outcomes.contains(&ScrapeOutcome::SkippedDuplicate));
        assert_eq!(h.queue.stats().visible + h.queue.stats().in_flight, 0);
        assert_eq!(stream_len(&h.store).await, 1);
    }

    #[tokio::test]
    async fn test_new_scrape_run_updates_the_record() {
        let h = harness();

        assert_eq!(h.pool.process(&job("artist-3", "run-1")).await, ScrapeOutcome::Committed);
        assert_eq!(h.pool.process(&job("artist-3", "run-2")).await, ScrapeOutcome::Committed);

        let item = h
            .store
            .get_item("ENTITY#artist-3", "METADATA")
            .await
            .unwrap()
            .unwrap();
        let record = EntityRecord::from_item(&item).unwrap();
        assert_eq!(record.scrape_run_id, "run-2");
        assert_eq!(record.portfolio.len(), 3);
        assert_eq!(record.keys.gsi3pk.as_deref(), Some("HANDLE#velvetcrown"));
        assert_eq!(stream_len(&h.store).await, 2);
    }

    // ============================================================
    // TEST 2: Failure Routing
    // ============================================================

    #[tokio::test]
    async fn test_transient_scrape_failure_releases_for_redelivery() {
        // ARRANGE
        let h = harness();
        h.scraper
            .fail_for("artist-4", ScrapeError::Unavailable("502 from site".to_string()));
        send(&h.queue, &[job("artist-4", "run-1")]).await;

        // ACT
        let first = h.pool.poll_once().await.unwrap();

        // ASSERT: not acknowledged, visible again straight away
        assert!(matches!(
            &first[0],
            ScrapeOutcome::Failed { class: ErrorClass::Transient, .. }
        ));
        assert_eq!(h.queue.stats().visible, 1);
        assert_eq!(stream_len(&h.store).await, 0);

        // ACT: the site recovers
        h.scraper.clear_failure("artist-4");
        let second = h.pool.poll_once().await.unwrap();

        // ASSERT
        assert_eq!(second, vec![ScrapeOutcome::Committed]);
        assert_eq!(h.queue.stats().visible, 0);
        assert_eq!(h.scraper.call_count(), 2);
    }

    #[tokio::test]
    async fn test_permanent_scrape_failure_is_dead_lettered() {
        let h = harness();
        h.scraper
            .fail_for("artist-5", ScrapeError::Gone("artist-5".to_string()));
        send(&h.queue, &[job("artist-5", "run-1")]).await;

        let outcomes = h.pool.poll_once().await.unwrap();

        assert!(matches!(
            &outcomes[0],
            ScrapeOutcome::Failed { class: ErrorClass::Permanent, .. }
        ));
        let dead = h.queue.dead_letters();
        assert_eq!(dead.len(), 1);
        assert!(dead[0].reason.contains("pk=ENTITY#artist-5"));
        assert!(dead[0].reason.contains("scrapeRunId=run-1"));
        assert_eq!(h.metrics.get(Metric::JobDeadLettered), 1);
    }

    #[tokio::test]
    async fn test_malformed_body_is_dead_lettered() {
        // ARRANGE
        let h = harness();
        h.queue
            .send_batch(vec![OutgoingMessage {
                id: "0".to_string(),
                body: "{\"entityId\": 42".to_string(),
                priority: 5,
            }])
            .await
            .unwrap();

        // ACT
        let outcomes = h.pool.poll_once().await.unwrap();

        // ASSERT
        assert!(matches!(
            &outcomes[0],
            ScrapeOutcome::Failed { class: ErrorClass::Permanent, .. }
        ));
        assert_eq!(h.queue.dead_letter_count(), 1);
        assert!(h.queue.dead_letters()[0].reason.starts_with("malformed job body"));
        assert_eq!(h.scraper.call_count(), 0);
    }

    #[tokio::test]
    async fn test_keys_for_another_entity_are_rejected() {
        let h = harness();
        let mut job = job("artist-6", "run-1");
        job.keys.pk = "ENTITY#someone-else".to_string();

        let outcome = h.pool.process(&job).await;

        assert!(matches!(outcome, ScrapeOutcome::Failed { class: ErrorClass::Permanent, .. }));
        assert_eq!(stream_len(&h.store).await, 0);
    }

    #[tokio::test]
    async fn test_store_unavailable_is_transient() {
        // ARRANGE
        let queue = Arc::new(MemoryQueue::new("scrape-jobs", QueueSettings::default()));
        let store = Arc::new(FlakyStore::new(None));
        store.unavailable.store(true, Ordering::SeqCst);
        let pool = ScrapeWorkerPool::new(
            queue.clone(),
            store.clone(),
            Arc::new(StubDetailScraper::new()),
            PipelineMetrics::new(),
            settings(),
        );
        send(&queue, &[job("artist-7", "run-1")]).await;

        // ACT
        let outcomes = pool.poll_once().await.unwrap();

        // ASSERT
        assert!(matches!(
            &outcomes[0],
            ScrapeOutcome::Failed { class: ErrorClass::Transient, .. }
        ));
        assert_eq!(queue.stats().visible, 1);
        assert_eq!(queue.dead_letter_count(), 0);
    }

    // ============================================================
    // TEST 3: Deadlines
    // ============================================================

    #[tokio::test(start_paused = true)]
    async fn test_slow_scrape_times_out_as_transient() {
        // ARRANGE
        let h = harness_with(
            StubDetailScraper::new().with_delay(Duration::from_secs(5)),
            settings(),
        );

        // ACT
        let outcome = h.pool.process(&job("artist-8", "run-1")).await;

        // ASSERT
        assert_eq!(
            outcome,
            ScrapeOutcome::Failed {
                reason: "scrape timed out".to_string(),
                class: ErrorClass::Transient
            }
        );
        assert_eq!(stream_len(&h.store).await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_store_times_out_as_transient() {
        let store = Arc::new(FlakyStore::new(Some(Duration::from_secs(5))));
        let pool = ScrapeWorkerPool::new(
            Arc::new(MemoryQueue::new("scrape-jobs", QueueSettings::default())),
            store.clone(),
            Arc::new(StubDetailScraper::new()),
            PipelineMetrics::new(),
            settings(),
        );

        let outcome = pool.process(&job("artist-9", "run-1")).await;

        assert_eq!(
            outcome,
            ScrapeOutcome::Failed {
                reason: "store call timed out".to_string(),
                class: ErrorClass::Transient
            }
        );
    }

    // ============================================================
    // TEST 4: Pool Lifecycle
    // ============================================================

    #[tokio::test]
    async fn test_pool_drains_queue_and_stops_on_shutdown() {
        // ARRANGE
        let mut worker_settings = settings();
        worker_settings.poll_wait = Duration::from_millis(20);
        let h = harness_with(StubDetailScraper::new(), worker_settings);
        let jobs: Vec<_> = (0..6).map(|i| job(&format!("artist-{}", i), "run-1")).collect();
        send(&h.queue, &jobs).await;
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        // ACT
        let handles = h.pool.start(shutdown_rx);
        let drained = tokio::time::timeout(Duration::from_secs(5), async {
            while h.metrics.get(Metric::Committed) < 6 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await;
        shutdown_tx.send(true).unwrap();
        for handle in handles {
            tokio::time::timeout(Duration::from_secs(5), handle)
                .await
                .unwrap()
                .unwrap();
        }

        // ASSERT
        assert!(drained.is_ok());
        assert_eq!(h.store.item_count(), 6);
        assert_eq!(h.queue.stats().visible + h.queue.stats().in_flight, 0);
    }
}
