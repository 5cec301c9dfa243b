use axum::routing::{get, post};
use axum::{Extension, Json, Router};
use ink_pipeline::config::PipelineConfig;
use ink_pipeline::discovery::handlers::handle_discover;
use ink_pipeline::discovery::source::FixtureCandidateSource;
use ink_pipeline::discovery::types::Source;
use ink_pipeline::discovery::DiscoveryService;
use ink_pipeline::keys::KeyDeriver;
use ink_pipeline::queue::{MemoryQueue, QueueSettings};
use ink_pipeline::queueing::handlers::{handle_discover_and_enqueue, handle_enqueue};
use ink_pipeline::queueing::{PriorityRules, QueueingService};
use ink_pipeline::search::handlers::handle_search;
use ink_pipeline::search::{HttpSearchIndex, MemorySearchIndex, SearchIndex};
use ink_pipeline::storage::{MemoryStore, PartitionManager};
use ink_pipeline::stream::{ChangeStreamProcessor, MemoryDeadLetterSink, spawn_pollers};
use ink_pipeline::telemetry::{MetricsSnapshot, PipelineMetrics, init_tracing};
use ink_pipeline::worker::{ScrapeWorkerPool, StubDetailScraper, WorkerSettings};
use serde_json::json;
use std::sync::Arc;
use tokio::sync::watch;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = match PipelineConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("Invalid configuration: {}", e);
            return Err(e.into());
        }
    };

    tracing::info!(
        "Starting pipeline: queue={} table={} store={} partitions={} search={}",
        config.queue_url,
        config.table_name,
        config.store_endpoint,
        config.store_partitions,
        config.search_endpoint
    );

    let metrics = PipelineMetrics::new();
    let deriver = KeyDeriver::new(config.shard_count);

    // 1. Queue and primary store:
    let queue = Arc::new(MemoryQueue::new(
        config.queue_url.clone(),
        QueueSettings {
            visibility_timeout: config.visibility_timeout,
            max_receive_count: config.queue_max_receive_count,
        },
    ));
    let store = Arc::new(MemoryStore::new(
        config.table_name.clone(),
        PartitionManager::new(config.store_partitions),
    ));

    // 2. Search index:
    let memory_index = config
        .uses_memory_search()
        .then(|| Arc::new(MemorySearchIndex::new()));
    let index: Arc<dyn SearchIndex> = match &memory_index {
        Some(index) => index.clone(),
        None => Arc::new(HttpSearchIndex::new(
            &config.search_endpoint,
            &config.search_index,
            config.index_timeout,
        )?),
    };

    // 3. Services:
    let discovery = Arc::new(DiscoveryService::new(
        Arc::new(FixtureCandidateSource::synthetic(Source::MapApi, 5)),
        deriver,
        metrics.clone(),
    )
    .with_fetch_timeout(config.source_timeout));
    let queueing = Arc::new(QueueingService::new(
        queue.clone(),
        deriver,
        PriorityRules::from_config(&config),
        metrics.clone(),
    )
    .with_send_timeout(config.queue_timeout));

    // 4. Background workers and stream pollers:
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let pool = ScrapeWorkerPool::new(
        queue.clone(),
        store.clone(),
        Arc::new(StubDetailScraper::new()),
        metrics.clone(),
        WorkerSettings::from_config(&config),
    );
    let mut tasks = pool.start(shutdown_rx.clone());

    let processor = Arc::new(ChangeStreamProcessor::from_config(
        index,
        metrics.clone(),
        &config,
    ));
    tasks.extend(spawn_pollers(
        store.clone(),
        processor,
        Arc::new(MemoryDeadLetterSink::new()),
        metrics.clone(),
        &config,
        shutdown_rx,
    ));

    // 5. HTTP Router:
    let mut app = Router::new()
        .route("/discover", post(handle_discover))
        .route("/enqueue", post(handle_enqueue))
        .route("/discover-and-enqueue", post(handle_discover_and_enqueue))
        .route("/metrics", get(handle_metrics))
        .route("/health", get(|| async { Json(json!({ "status": "ok" })) }));
    if let Some(index) = memory_index {
        app = app
            .route("/search", get(handle_search))
            .layer(Extension(index));
    }
    let app = app
        .layer(Extension(discovery))
        .layer(Extension(queueing))
        .layer(Extension(metrics));

    // 6. Start HTTP server:
    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!("HTTP server listening on {}", config.bind_addr);
    tracing::info!("Press Ctrl+C to shutdown");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for Ctrl+C: {}", e);
            }
        })
        .await?;

    tracing::info!("Shutting down background tasks");
    let _ = shutdown_tx.send(true);
    for task in tasks {
        let _ = task.await;
    }
    Ok(())
}

async fn handle_metrics(Extension(metrics): Extension<Arc<PipelineMetrics>>) -> Json<MetricsSnapshot> {
    Json(metrics.snapshot())
}
