//! Error Taxonomy
//!
//! Every boundary in the pipeline (queue, store, search index, scraper, config)
//! has its own error enum. Each one maps onto an [`ErrorClass`], which is what
//! the components actually branch on:
//!
//! - **Validation**: the item is excluded locally and reported in the batch result.
//! - **Transient**: left for the caller's native redelivery (queue lease, stream retry).
//! - **Idempotency**: a duplicate scrape-run; treated as a successful no-op.
//! - **Permanent**: never retried; routed to a dead-letter destination.

use serde::Serialize;
use thiserror::Error;

/// How a failure should be handled by whoever observes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    Validation,
    Transient,
    Idempotency,
    Permanent,
}

/// Implemented by every error type that crosses a component boundary.
pub trait Classify {
    fn class(&self) -> ErrorClass;

    fn is_retryable(&self) -> bool {
        self.class() == ErrorClass::Transient
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required setting {0}")]
    Missing(&'static str),

    #[error("invalid value {value:?} for {key}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum QueueError {
    #[error("batch of {count} entries exceeds the maximum of {max}")]
    TooManyEntriesInBatchRequest { count: usize, max: usize },

    #[error("batch entry ids are not distinct")]
    BatchEntryIdsNotDistinct,

    #[error("receipt handle {0} is invalid or stale")]
    ReceiptHandleInvalid(String),

    #[error("queue unavailable: {0}")]
    Unavailable(String),

    #[error("queue call timed out")]
    Timeout,
}

impl QueueError {
    /// Short machine-readable code, reported per failed item.
    pub fn code(&self) -> &'static str {
        match self {
            QueueError::TooManyEntriesInBatchRequest { .. } => "TooManyEntriesInBatchRequest",
            QueueError::BatchEntryIdsNotDistinct => "BatchEntryIdsNotDistinct",
            QueueError::ReceiptHandleInvalid(_) => "ReceiptHandleIsInvalid",
            QueueError::Unavailable(_) => "ServiceUnavailable",
            QueueError::Timeout => "Timeout",
        }
    }
}

impl Classify for QueueError {
    fn class(&self) -> ErrorClass {
        match self {
            QueueError::Unavailable(_) | QueueError::Timeout => ErrorClass::Transient,
            _ => ErrorClass::Permanent,
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum StoreError {
    #[error("conditional check failed for {pk}/{sk}")]
    ConditionalCheckFailed { pk: String, sk: String },

    #[error("item is missing key attribute {0}")]
    MissingKeyAttribute(&'static str),

    #[error("item could not be encoded: {0}")]
    Serialization(String),

    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("store call timed out")]
    Timeout,
}

impl Classify for StoreError {
    fn class(&self) -> ErrorClass {
        match self {
            StoreError::ConditionalCheckFailed { .. } => ErrorClass::Idempotency,
            StoreError::MissingKeyAttribute(_) | StoreError::Serialization(_) => {
                ErrorClass::Permanent
            }
            StoreError::Unavailable(_) | StoreError::Timeout => ErrorClass::Transient,
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum IndexError {
    #[error("search index unavailable: {0}")]
    Unavailable(String),

    #[error("search index rejected the request ({status}): {body}")]
    Rejected { status: u16, body: String },

    #[error("search index call timed out")]
    Timeout,

    #[error("circuit breaker is open")]
    CircuitOpen,
}

impl Classify for IndexError {
    fn class(&self) -> ErrorClass {
        match self {
            IndexError::Rejected { .. } => ErrorClass::Permanent,
            IndexError::Unavailable(_) | IndexError::Timeout | IndexError::CircuitOpen => {
                ErrorClass::Transient
            }
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum ScrapeError {
    #[error("detail source unavailable: {0}")]
    Unavailable(String),

    #[error("detail page for {0} no longer exists")]
    Gone(String),

    #[error("scrape timed out")]
    Timeout,
}

impl Classify for ScrapeError {
    fn class(&self) -> ErrorClass {
        match self {
            ScrapeError::Gone(_) => ErrorClass::Permanent,
            ScrapeError::Unavailable(_) | ScrapeError::Timeout => ErrorClass::Transient,
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum SourceError {
    #[error("candidate source unavailable: {0}")]
    Unavailable(String),

    #[error("candidate source returned an unreadable response: {0}")]
    Malformed(String),
}

impl Classify for SourceError {
    fn class(&self) -> ErrorClass {
        match self {
            SourceError::Unavailable(_) => ErrorClass::Transient,
            SourceError::Malformed(_) => ErrorClass::Permanent,
        }
    }
}

/// Rejected discovery request parameters.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum ParamsError {
    #[error("at least one location is required")]
    NoLocations,

    #[error("maxResults must be greater than zero")]
    ZeroMaxResults,
}

/// Failure of a single pipeline step, wrapping whichever boundary produced it.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum PipelineError {
    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Index(#[from] IndexError),

    #[error(transparent)]
    Scrape(#[from] ScrapeError),

    #[error("malformed payload: {0}")]
    Malformed(String),

    #[error("validation failed: {0}")]
    Validation(String),
}

impl Classify for PipelineError {
    fn class(&self) -> ErrorClass {
        match self {
            PipelineError::Queue(e) => e.class(),
            PipelineError::Store(e) => e.class(),
            PipelineError::Index(e) => e.class(),
            PipelineError::Scrape(e) => e.class(),
            PipelineError::Malformed(_) => ErrorClass::Permanent,
            PipelineError::Validation(_) => ErrorClass::Validation,
        }
    }
}
