//! Search Index Module
//!
//! The query-side store fed by the change-stream processor.
//!
//! ## Responsibilities
//! - **Index contract**: `SearchIndex` is the narrow interface the stream processor
//!   writes through (upsert, delete, get).
//! - **Tokenization**: folding and splitting text into searchable tokens.
//! - **Ranking**: the in-memory index scores documents by matched query tokens.
//! - **Remote index**: `HttpSearchIndex` speaks the OpenSearch document API.
//!
//! ## Submodules
//! - **`memory`**: `MemorySearchIndex` with an inverted token index and query engine.
//! - **`http`**: `HttpSearchIndex`, a `reqwest` client with retry and status mapping.
//! - **`handlers`**: `GET /search`.
//! - **`tokenizer`**: text folding and token extraction.
//! - **`types`**: `SearchDocument` and response DTOs.

pub mod handlers;
pub mod http;
pub mod memory;
pub mod tokenizer;
pub mod types;

pub use http::HttpSearchIndex;
pub use memory::MemorySearchIndex;
pub use types::{DeleteOutcome, GeoPoint, SearchDocument};

use crate::error::IndexError;

use async_trait::async_trait;

#[async_trait]
pub trait SearchIndex: Send + Sync {
    /// Creates or fully replaces the document with `document.id`.
    async fn upsert(&self, document: SearchDocument) -> Result<(), IndexError>;

    async fn delete(&self, id: &str) -> Result<DeleteOutcome, IndexError>;

    async fn get(&self, id: &str) -> Result<Option<SearchDocument>, IndexError>;
}
