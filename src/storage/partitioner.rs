use crate::keys::shard::bucket_for;

/// Maps partition keys onto a fixed set of partitions. Stateless and seedless,
/// so every process agrees on placement.
#[derive(Debug, Clone, Copy)]
pub struct PartitionManager {
    num_partitions: u32,
}

impl PartitionManager {
    pub fn new(num_partitions: u32) -> Self {
        Self {
            num_partitions: num_partitions.max(1),
        }
    }

    pub fn num_partitions(&self) -> u32 {
        self.num_partitions
    }

    pub fn get_partition(&self, key: &str) -> u32 {
        bucket_for(key, self.num_partitions)
    }

    pub fn partitions(&self) -> impl Iterator<Item = u32> {
        0..self.num_partitions
    }
}
