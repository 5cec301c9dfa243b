use super::types::ScrapeDetails;
use crate::error::ScrapeError;
use crate::keys::normalize::normalize_style;
use crate::queueing::ScrapeJob;

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Fetches the detail page of one entity. Network I/O lives behind this trait;
/// callers bound every call with their own deadline.
#[async_trait]
pub trait DetailScraper: Send + Sync {
    async fn scrape(&self, job: &ScrapeJob) -> Result<ScrapeDetails, ScrapeError>;
}

/// Deterministic stand-in for the real scraper. Supports an artificial delay and
/// per-entity failure injection.
#[derive(Default)]
pub struct StubDetailScraper {
    delay: Duration,
    failures: DashMap<String, ScrapeError>,
    calls: AtomicUsize,
}

impl StubDetailScraper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Every scrape of `entity_id` fails with `error` until cleared.
    pub fn fail_for(&self, entity_id: &str, error: ScrapeError) {
        self.failures.insert(entity_id.to_string(), error);
    }

    pub fn clear_failure(&self, entity_id: &str) {
        self.failures.remove(entity_id);
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DetailScraper for StubDetailScraper {
    async fn scrape(&self, job: &ScrapeJob) -> Result<ScrapeDetails, ScrapeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if let Some(error) = self.failures.get(&job.entity_id) {
            return Err(error.clone());
        }

        let entity = &job.entity;
        Ok(ScrapeDetails {
            styles: entity.styles.iter().map(|s| normalize_style(s)).collect(),
            portfolio: (1..=3)
                .map(|n| format!("https://portfolio.example/{}/{}.jpg", job.entity_id, n))
                .collect(),
            bio: Some(match &entity.studio_name {
                Some(studio) => format!("{} at {}, {}", entity.name, studio, entity.location),
                None => format!("{}, {}", entity.name, entity.location),
            }),
            website: None,
        })
    }
}
