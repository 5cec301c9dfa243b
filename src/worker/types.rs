use crate::config::PipelineConfig;
use crate::error::{Classify, ErrorClass, PipelineError};

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Fields resolved by the detail scrape.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScrapeDetails {
    #[serde(default)]
    pub styles: Vec<String>,
    #[serde(default)]
    pub portfolio: Vec<String>,
    #[serde(default)]
    pub bio: Option<String>,
    #[serde(default)]
    pub website: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ScrapeOutcome {
    /// The record was written under this job's scrape-run id.
    Committed,
    /// The stored record already carries this scrape-run id.
    SkippedDuplicate,
    Failed { reason: String, class: ErrorClass },
}

impl ScrapeOutcome {
    pub fn failed(error: impl Into<PipelineError>) -> Self {
        let error = error.into();
        ScrapeOutcome::Failed {
            reason: error.to_string(),
            class: error.class(),
        }
    }

    /// Whether the message should be removed from the queue.
    pub fn is_success(&self) -> bool {
        matches!(self, ScrapeOutcome::Committed | ScrapeOutcome::SkippedDuplicate)
    }
}

#[derive(Debug, Clone)]
pub struct WorkerSettings {
    pub worker_count: usize,
    pub max_messages: usize,
    pub poll_wait: Duration,
    pub scrape_timeout: Duration,
    pub store_timeout: Duration,
    pub queue_timeout: Duration,
    /// Pause after a failed receive before polling again.
    pub error_backoff: Duration,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            worker_count: 4,
            max_messages: 10,
            poll_wait: Duration::from_secs(20),
            scrape_timeout: Duration::from_secs(10),
            store_timeout: Duration::from_secs(2),
            queue_timeout: Duration::from_secs(5),
            error_backoff: Duration::from_secs(1),
        }
    }
}

impl WorkerSettings {
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            worker_count: config.worker_count,
            max_messages: config.max_messages_per_poll,
            poll_wait: config.poll_wait,
            scrape_timeout: config.scrape_timeout,
            store_timeout: config.store_timeout,
            queue_timeout: config.queue_timeout,
            ..Self::default()
        }
    }
}
