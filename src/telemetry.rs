//! Logging and Pipeline Counters
//!
//! Logging goes through `tracing`; the subscriber is installed once by the binary.
//! Counters are plain atomics shared by every component of one process and are
//! exposed as JSON on `/metrics`. Each increment is also emitted as a `tracing`
//! event carrying a `metric` field so log pipelines can aggregate them.

use axum::http::HeaderMap;
use rand::Rng;
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing_subscriber::EnvFilter;

pub const CORRELATION_HEADER: &str = "x-correlation-id";

/// Installs the global `fmt` subscriber. Honours `RUST_LOG`, defaults to `info`.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Returns the caller-supplied correlation id, or generates one of the form
/// `gen-<unix secs>-<9 random chars>`.
pub fn correlation_id(headers: &HeaderMap) -> String {
    headers
        .get(CORRELATION_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .unwrap_or_else(generate_correlation_id)
}

fn generate_correlation_id() -> String {
    const ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
    let mut rng = rand::thread_rng();
    let suffix: String = (0..9)
        .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
        .collect();
    format!("gen-{}-{}", chrono::Utc::now().timestamp(), suffix)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Metric {
    Discovered,
    DiscoveryRejected,
    Enqueued,
    EnqueueFailed,
    Committed,
    SkippedDuplicate,
    ScrapeFailed,
    JobDeadLettered,
    EventApplied,
    EventFiltered,
    EventFailed,
    EventDeadLettered,
}

impl Metric {
    pub fn name(self) -> &'static str {
        match self {
            Metric::Discovered => "discovery.items",
            Metric::DiscoveryRejected => "discovery.rejected",
            Metric::Enqueued => "queueing.sent",
            Metric::EnqueueFailed => "queueing.failed",
            Metric::Committed => "worker.committed",
            Metric::SkippedDuplicate => "worker.skipped_duplicate",
            Metric::ScrapeFailed => "worker.failed",
            Metric::JobDeadLettered => "worker.dead_lettered",
            Metric::EventApplied => "stream.applied",
            Metric::EventFiltered => "stream.filtered",
            Metric::EventFailed => "stream.failed",
            Metric::EventDeadLettered => "stream.dead_lettered",
        }
    }
}

#[derive(Debug, Default)]
pub struct PipelineMetrics {
    discovered: AtomicU64,
    discovery_rejected: AtomicU64,
    enqueued: AtomicU64,
    enqueue_failed: AtomicU64,
    committed: AtomicU64,
    skipped_duplicate: AtomicU64,
    scrape_failed: AtomicU64,
    job_dead_lettered: AtomicU64,
    event_applied: AtomicU64,
    event_filtered: AtomicU64,
    event_failed: AtomicU64,
    event_dead_lettered: AtomicU64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    pub discovered: u64,
    pub discovery_rejected: u64,
    pub enqueued: u64,
    pub enqueue_failed: u64,
    pub committed: u64,
    pub skipped_duplicate: u64,
    pub scrape_failed: u64,
    pub job_dead_lettered: u64,
    pub event_applied: u64,
    pub event_filtered: u64,
    pub event_failed: u64,
    pub event_dead_lettered: u64,
}

impl PipelineMetrics {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn incr(&self, metric: Metric) {
        self.add(metric, 1);
    }

    pub fn add(&self, metric: Metric, count: u64) {
        if count == 0 {
            return;
        }
        self.counter(metric).fetch_add(count, Ordering::Relaxed);
        tracing::debug!(metric = metric.name(), count, "metric");
    }

    pub fn get(&self, metric: Metric) -> u64 {
        self.counter(metric).load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            discovered: self.get(Metric::Discovered),
            discovery_rejected: self.get(Metric::DiscoveryRejected),
            enqueued: self.get(Metric::Enqueued),
            enqueue_failed: self.get(Metric::EnqueueFailed),
            committed: self.get(Metric::Committed),
            skipped_duplicate: self.get(Metric::SkippedDuplicate),
            scrape_failed: self.get(Metric::ScrapeFailed),
            job_dead_lettered: self.get(Metric::JobDeadLettered),
            event_applied: self.get(Metric::EventApplied),
            event_filtered: self.get(Metric::EventFiltered),
            event_failed: self.get(Metric::EventFailed),
            event_dead_lettered: self.get(Metric::EventDeadLettered),
        }
    }

    fn counter(&self, metric: Metric) -> &AtomicU64 {
        match metric {
            Metric::Discovered => &self.discovered,
            Metric::DiscoveryRejected => &self.discovery_rejected,
            Metric::Enqueued => &self.enqueued,
            Metric::EnqueueFailed => &self.enqueue_failed,
            Metric::Committed => &self.committed,
            Metric::SkippedDuplicate => &self.skipped_duplicate,
            Metric::ScrapeFailed => &self.scrape_failed,
            Metric::JobDeadLettered => &self.job_dead_lettered,
            Metric::EventApplied => &self.event_applied,
            Metric::EventFiltered => &self.event_filtered,
            Metric::EventFailed => &self.event_failed,
            Metric::EventDeadLettered => &self.event_dead_lettered,
        }
    }
}
