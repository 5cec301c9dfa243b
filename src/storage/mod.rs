//! Primary Store Module
//!
//! Single-table store for authoritative entity rows, plus the mutation stream
//! the change-stream processor consumes.
//!
//! ## Core Concepts
//! - **Partitioning**: rows are spread over a fixed number of partitions by hashing
//!   their partition key. Each partition is also one shard of the mutation stream,
//!   so every row's mutations are ordered.
//! - **Compare-and-swap**: writes carry a `WriteCondition`; a failed condition is
//!   reported as `StoreError::ConditionalCheckFailed` and nothing is written.
//! - **Mutation stream**: every successful put or delete appends a `StreamRecord`
//!   with the old and new images to its partition's shard, atomically with the write.

pub mod memory;
pub mod partitioner;
pub mod record;
pub mod types;

pub use memory::MemoryStore;
pub use partitioner::PartitionManager;
pub use record::EntityRecord;
pub use types::*;

use crate::error::StoreError;

use async_trait::async_trait;

#[async_trait]
pub trait Store: Send + Sync {
    async fn get_item(&self, pk: &str, sk: &str) -> Result<Option<Item>, StoreError>;

    /// Writes `item` if `condition` holds against the current row.
    async fn put_item(&self, item: Item, condition: WriteCondition) -> Result<PutOutcome, StoreError>;

    /// Removes a row, returning it if it existed.
    async fn delete_item(&self, pk: &str, sk: &str) -> Result<Option<Item>, StoreError>;
}

#[async_trait]
pub trait MutationStream: Send + Sync {
    fn shard_ids(&self) -> Vec<u32>;

    /// Records of `shard` with a sequence number greater than `after_sequence`, oldest first.
    async fn read_records(
        &self,
        shard: u32,
        after_sequence: u64,
        limit: usize,
    ) -> Result<Vec<StreamRecord>, StoreError>;
}

#[cfg(test)]
mod tests;
