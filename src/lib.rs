//! Tattoo Artist Aggregation Pipeline Library
//!
//! This library crate defines the modules that make up the pipeline. The binary
//! (`main.rs`) wires them into one process behind a thin HTTP surface.
//!
//! ## Data Flow
//! `source -> discovery -> queueing -> queue -> worker -> storage -> stream -> search`
//!
//! ## Modules
//! - **`keys`**: deterministic primary and secondary key derivation for entity rows.
//! - **`discovery`**: turns raw candidate-source records into validated, keyed entities.
//! - **`queueing`**: priority scoring and batched dispatch of scrape jobs under one
//!   scrape-run id.
//! - **`queue`**: the lease-based job queue with redrive to a dead-letter list.
//! - **`worker`**: scrape workers that commit results through a conditional write,
//!   so redelivered jobs are applied exactly once.
//! - **`storage`**: the partitioned primary store and its per-shard mutation stream.
//! - **`stream`**: the change-stream processor feeding the search index through a
//!   circuit breaker.
//! - **`search`**: search documents, the in-memory index and the HTTP index client.
//! - **`config`**, **`error`**, **`telemetry`**: environment configuration, the error
//!   taxonomy, logging and counters.

pub mod config;
pub mod discovery;
pub mod error;
pub mod keys;
pub mod queue;
pub mod queueing;
pub mod search;
pub mod storage;
pub mod stream;
pub mod telemetry;
pub mod worker;
