//! Change Stream Module
//!
//! Propagates primary-store mutations to the search index.
//!
//! ## Event Lifecycle
//! `Received -> Filtered | Transformed -> Applied | Failed -> (redelivered) -> DeadLettered`
//!
//! - **Filter**: only entity rows (`SK = METADATA`) reach the index.
//! - **Transform**: the post-image becomes a `SearchDocument`; coordinates are
//!   flattened into one geo-point and the keyword blob is rebuilt.
//! - **Apply**: INSERT/MODIFY upsert, REMOVE deletes. Deleting a document that is
//!   already gone counts as applied.
//! - **Circuit breaker**: every index call goes through a `CircuitBreaker`. While
//!   it is open, events are held at the shard checkpoint rather than dropped.
//! - **Dead letters**: events that fail permanently, or keep failing after the
//!   retry budget, are sent to a `DeadLetterSink` with operation, keys and cause.
//!
//! ## Submodules
//! - **`processor`**: `ChangeStreamProcessor`, per-event and per-batch processing.
//! - **`poller`**: `ShardPoller`, one per shard, owning the checkpoint and retry count.
//! - **`breaker`**: closed / open / half-open state machine.
//! - **`transform`**: stream record to index action.
//! - **`dead_letter`**: sink trait and the in-memory sink.

pub mod breaker;
pub mod dead_letter;
pub mod poller;
pub mod processor;
pub mod transform;
pub mod types;

pub use breaker::{BreakerState, CircuitBreaker};
pub use dead_letter::{DeadLetterSink, MemoryDeadLetterSink};
pub use poller::{ShardPoller, spawn_pollers};
pub use processor::ChangeStreamProcessor;
pub use types::*;
