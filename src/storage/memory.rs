use super::partitioner::PartitionManager;
use super::types::*;
use super::{MutationStream, Store};
use crate::error::StoreError;

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use std::collections::{HashMap, VecDeque};

/// Stream records kept per shard before the oldest are dropped.
pub const DEFAULT_STREAM_RETENTION: usize = 10_000;

#[derive(Debug, Default)]
struct Partition {
    rows: HashMap<(String, String), Item>,
    stream: VecDeque<StreamRecord>,
    last_sequence: u64,
}

impl Partition {
    fn append(&mut self, shard: u32, record: PendingRecord, retention: usize) -> u64 {
        self.last_sequence += 1;
        self.stream.push_back(StreamRecord {
            shard,
            sequence: self.last_sequence,
            event_name: record.event_name,
            keys: record.keys,
            new_image: record.new_image,
            old_image: record.old_image,
            approximate_created_at: Utc::now(),
        });
        while self.stream.len() > retention {
            self.stream.pop_front();
        }
        self.last_sequence
    }
}

struct PendingRecord {
    event_name: EventName,
    keys: StreamKeys,
    new_image: Option<Item>,
    old_image: Option<Item>,
}

/// In-memory single-table store.
///
/// Structure: `Partition ID -> (rows, stream shard)`. A write holds its
/// partition's entry for the condition check, the row update and the stream
/// append, so all three are atomic with respect to other writers.
pub struct MemoryStore {
    table_name: String,
    partitioner: PartitionManager,
    local_data: DashMap<u32, Partition>,
    stream_retention: usize,
}

impl MemoryStore {
    pub fn new(table_name: impl Into<String>, partitioner: PartitionManager) -> Self {
        let local_data = DashMap::new();
        for partition in partitioner.partitions() {
            local_data.insert(partition, Partition::default());
        }
        Self {
            table_name: table_name.into(),
            partitioner,
            local_data,
            stream_retention: DEFAULT_STREAM_RETENTION,
        }
    }

    pub fn with_stream_retention(mut self, retention: usize) -> Self {
        self.stream_retention = retention.max(1);
        self
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    pub fn partition_of(&self, pk: &str) -> u32 {
        self.partitioner.get_partition(pk)
    }

    pub fn item_count(&self) -> usize {
        self.local_data
            .iter()
            .map(|partition| partition.value().rows.len())
            .sum()
    }

    /// Total stream records currently retained across every shard.
    pub fn stream_len(&self) -> usize {
        self.local_data
            .iter()
            .map(|partition| partition.value().stream.len())
            .sum()
    }

    fn conditional_write(
        &self,
        pk: &str,
        sk: &str,
        new_item: Option<Item>,
        condition: &WriteCondition,
    ) -> Result<(Option<Item>, u64), StoreError> {
        let shard = self.partition_of(pk);
        let mut partition = self.local_data.entry(shard).or_default();
        let row_key = (pk.to_string(), sk.to_string());
        let existing = partition.rows.get(&row_key);

        let allowed = match condition {
            WriteCondition::Always => true,
            WriteCondition::NotExists => existing.is_none(),
            WriteCondition::AbsentOrDiffers { attribute, value } => {
                existing.is_none_or(|row| row.get(attribute) != Some(value))
            }
        };
        if !allowed {
            return Err(StoreError::ConditionalCheckFailed {
                pk: pk.to_string(),
                sk: sk.to_string(),
            });
        }

        let old_item = match &new_item {
            Some(item) => partition.rows.insert(row_key, item.clone()),
            None => partition.rows.remove(&row_key),
        };

        let event_name = match (&old_item, &new_item) {
            (None, Some(_)) => EventName::Insert,
            (Some(_), Some(_)) => EventName::Modify,
            (Some(_), None) => EventName::Remove,
            // Deleting an absent row is not a mutation.
            (None, None) => return Ok((None, partition.last_sequence)),
        };

        let sequence = partition.append(
            shard,
            PendingRecord {
                event_name,
                keys: StreamKeys {
                    pk: pk.to_string(),
                    sk: sk.to_string(),
                },
                new_image: new_item,
                old_image: old_item.clone(),
            },
            self.stream_retention,
        );
        tracing::debug!(
            "{} {} {}/{} at {}#{}",
            self.table_name,
            event_name.as_str(),
            pk,
            sk,
            shard,
            sequence
        );

        Ok((old_item, sequence))
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn get_item(&self, pk: &str, sk: &str) -> Result<Option<Item>, StoreError> {
        let shard = self.partition_of(pk);
        Ok(self.local_data.get(&shard).and_then(|partition| {
            partition
                .rows
                .get(&(pk.to_string(), sk.to_string()))
                .cloned()
        }))
    }

    async fn put_item(&self, item: Item, condition: WriteCondition) -> Result<PutOutcome, StoreError> {
        let pk = key_attribute(&item, PK_ATTRIBUTE)
            .ok_or(StoreError::MissingKeyAttribute(PK_ATTRIBUTE))?
            .to_string();
        let sk = key_attribute(&item, SK_ATTRIBUTE)
            .ok_or(StoreError::MissingKeyAttribute(SK_ATTRIBUTE))?
            .to_string();

        let (old_item, _) = self.conditional_write(&pk, &sk, Some(item), &condition)?;
        Ok(match old_item {
            None => PutOutcome::Created,
            Some(_) => PutOutcome::Replaced,
        })
    }

    async fn delete_item(&self, pk: &str, sk: &str) -> Result<Option<Item>, StoreError> {
        let (old_item, _) = self.conditional_write(pk, sk, None, &WriteCondition::Always)?;
        Ok(old_item)
    }
}

#[async_trait]
impl MutationStream for MemoryStore {
    fn shard_ids(&self) -> Vec<u32> {
        self.partitioner.partitions().collect()
    }

    async fn read_records(
        &self,
        shard: u32,
        after_sequence: u64,
        limit: usize,
    ) -> Result<Vec<StreamRecord>, StoreError> {
        let Some(partition) = self.local_data.get(&shard) else {
            return Ok(Vec::new());
        };

        if let Some(oldest) = partition.stream.front() {
            if oldest.sequence > after_sequence + 1 {
                tracing::warn!(
                    "Shard {} trimmed past checkpoint {} (oldest retained {})",
                    shard,
                    after_sequence,
                    oldest.sequence
                );
            }
        }

        Ok(partition
            .stream
            .iter()
            .filter(|record| record.sequence > after_sequence)
            .take(limit)
            .cloned()
            .collect())
    }
}
