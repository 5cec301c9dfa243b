//! Queueing Service Module
//!
//! Turns a discovery batch into scrape jobs on the durable queue.
//!
//! ## Workflow
//! 1. **Token**: one scrape-run id is generated per call and shared by every job it produces.
//! 2. **Prepare**: each item gets a priority score and a key set (derived here if absent).
//! 3. **Dispatch**: jobs are sent in batches of at most ten; per-item outcomes are
//!    accumulated so one failing batch never blocks the next.
//!
//! ## Submodules
//! - **`priority`**: additive priority scoring.
//! - **`service`**: `QueueingService::enqueue`.
//! - **`handlers`**: `/enqueue` and `/discover-and-enqueue`.
//! - **`types`**: job body and result types.

pub mod handlers;
pub mod priority;
pub mod service;
pub mod types;

pub use priority::PriorityRules;
pub use service::QueueingService;
pub use types::{EnqueueRequest, EnqueueResult, FailedItem, ScrapeJob};
