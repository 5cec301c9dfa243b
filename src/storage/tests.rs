//! Storage Module Tests
//!
//! ## Test Scopes
//! - **Conditional writes**: create, replace, token guard, missing keys.
//! - **Mutation stream**: event types, images, per-shard ordering and retention.
//! - **EntityRecord**: flat item encoding.

#[cfg(test)]
mod tests {
    use crate::discovery::types::{CandidateEntity, Source};
    use crate::error::StoreError;
    use crate::keys::EntityKeySet;
    use crate::storage::record::SCRAPE_RUN_ATTRIBUTE;
    use crate::storage::{
        EntityRecord, EventName, Item, MemoryStore, MutationStream, PartitionManager, PutOutcome,
        Store, WriteCondition,
    };
    use chrono::Utc;
    use serde_json::json;

    fn store() -> MemoryStore {
        MemoryStore::new("artists", PartitionManager::new(4))
    }

    fn row(pk: &str, run: &str) -> Item {
        let value = json!({ "PK": pk, "SK": "METADATA", "scrapeRunId": run, "name": "Iron Rose" });
        value.as_object().cloned().unwrap()
    }

    fn guard(run: &str) -> WriteCondition {
        WriteCondition::AbsentOrDiffers {
            attribute: SCRAPE_RUN_ATTRIBUTE.to_string(),
            value: json!(run),
        }
    }

    async fn all_records(store: &MemoryStore) -> Vec<crate::storage::StreamRecord> {
        let mut records = Vec::new();
        for shard in store.shard_ids() {
            records.extend(store.read_records(shard, 0, 1000).await.unwrap());
        }
        records
    }

    // ============================================================
    // TEST 1: Conditional Writes
    // ============================================================

    #[tokio::test]
    async fn test_token_guard_blocks_same_run_and_allows_new_run() {
        // ARRANGE
        let store = store();

        // ACT
        let created = store.put_item(row("ENTITY#a", "run-1"), guard("run-1")).await;
        let duplicate = store.put_item(row("ENTITY#a", "run-1"), guard("run-1")).await;
        let replaced = store.put_item(row("ENTITY#a", "run-2"), guard("run-2")).await;

        // ASSERT
        assert_eq!(created.unwrap(), PutOutcome::Created);
        assert_eq!(
            duplicate.unwrap_err(),
            StoreError::ConditionalCheckFailed {
                pk: "ENTITY#a".to_string(),
                sk: "METADATA".to_string()
            }
        );
        assert_eq!(replaced.unwrap(), PutOutcome::Replaced);

        let stored = store.get_item("ENTITY#a", "METADATA").await.unwrap().unwrap();
        assert_eq!(stored["scrapeRunId"], "run-2");
        assert_eq!(store.item_count(), 1);
    }

    #[tokio::test]
    async fn test_not_exists_condition() {
        let store = store();

        store
            .put_item(row("ENTITY#b", "run-1"), WriteCondition::NotExists)
            .await
            .unwrap();
        let second = store
            .put_item(row("ENTITY#b", "run-2"), WriteCondition::NotExists)
            .await;

        assert!(matches!(second, Err(StoreError::ConditionalCheckFailed { .. })));
    }

    #[tokio::test]
    async fn test_item_without_keys_is_rejected() {
        let store = store();
        let mut item = row("ENTITY#c", "run-1");
        item.remove("SK");

        let result = store.put_item(item, WriteCondition::Always).await;

        assert_eq!(result.unwrap_err(), StoreError::MissingKeyAttribute("SK"));
        assert_eq!(store.stream_len(), 0);
    }

    // ============================================================
    // TEST 2: Mutation Stream
    // ============================================================

    #[tokio::test]
    async fn test_every_mutation_emits_one_record() {
        // ARRANGE
        let store = store();

        // ACT
        store.put_item(row("ENTITY#d", "run-1"), guard("run-1")).await.unwrap();
        let _ = store.put_item(row("ENTITY#d", "run-1"), guard("run-1")).await;
        store.put_item(row("ENTITY#d", "run-2"), guard("run-2")).await.unwrap();
        store.delete_item("ENTITY#d", "METADATA").await.unwrap();
        store.delete_item("ENTITY#d", "METADATA").await.unwrap();

        // ASSERT: failed condition and absent delete emit nothing
        let records = all_records(&store).await;
        let events: Vec<EventName> = records.iter().map(|r| r.event_name).collect();
        assert_eq!(events, vec![EventName::Insert, EventName::Modify, EventName::Remove]);

        let sequences: Vec<u64> = records.iter().map(|r| r.sequence).collect();
        assert_eq!(sequences, vec![1, 2, 3]);

        assert!(records[0].old_image.is_none());
        assert_eq!(records[1].old_image.as_ref().unwrap()["scrapeRunId"], "run-1");
        assert_eq!(records[1].new_image.as_ref().unwrap()["scrapeRunId"], "run-2");
        assert!(records[2].new_image.is_none());
        assert_eq!(records[2].keys.pk, "ENTITY#d");
        assert_eq!(records[2].keys.sk, "METADATA");
        assert_eq!(records[2].shard, store.partition_of("ENTITY#d"));
    }

    #[tokio::test]
    async fn test_read_after_checkpoint_and_limit() {
        let store = store();
        let shard = store.partition_of("ENTITY#e");
        for run in 1..=5 {
            let run = format!("run-{}", run);
            store.put_item(row("ENTITY#e", &run), guard(&run)).await.unwrap();
        }

        let page = store.read_records(shard, 2, 2).await.unwrap();

        let sequences: Vec<u64> = page.iter().map(|r| r.sequence).collect();
        assert_eq!(sequences, vec![3, 4]);
        assert!(store.read_records(shard, 5, 10).await.unwrap().is_empty());
        assert!(store.read_records(999, 0, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_stream_retention_drops_oldest() {
        let store = MemoryStore::new("artists", PartitionManager::new(1)).with_stream_retention(2);
        for run in 1..=4 {
            let run = format!("run-{}", run);
            store.put_item(row("ENTITY#f", &run), guard(&run)).await.unwrap();
        }

        let records = store.read_records(0, 0, 10).await.unwrap();

        let sequences: Vec<u64> = records.iter().map(|r| r.sequence).collect();
        assert_eq!(sequences, vec![3, 4]);
    }

    #[tokio::test]
    async fn test_shard_ids_cover_partitions() {
        let store = store();
        assert_eq!(store.shard_ids(), vec![0, 1, 2, 3]);
    }

    // ============================================================
    // TEST 3: EntityRecord Encoding
    // ============================================================

    #[test]
    fn test_entity_record_is_stored_flat() {
        // ARRANGE
        let mut keys = EntityKeySet::primary("artist-1");
        keys.gsi2pk = Some("NAME#iron-rose".to_string());
        let record = EntityRecord {
            keys,
            entity: CandidateEntity {
                entity_id: "artist-1".to_string(),
                name: "Iron Rose".to_string(),
                studio_name: Some("Iron Rose Studio".to_string()),
                source: Source::DirectorySite,
                location: "leeds".to_string(),
                styles: vec!["blackwork".to_string()],
                geohash: Some("gcwfhf".to_string()),
                latitude: Some(53.8008),
                longitude: Some(-1.5491),
                handle: None,
                confidence: 0.82,
                discovered_at: Utc::now(),
            },
            scrape_run_id: "run-1".to_string(),
            last_written_at: Utc::now(),
            portfolio: vec!["https://img.example/1.jpg".to_string()],
            bio: None,
            website: None,
        };

        // ACT
        let item = record.to_item().unwrap();
        let decoded = EntityRecord::from_item(&item).unwrap();

        // ASSERT
        assert_eq!(item["PK"], "ENTITY#artist-1");
        assert_eq!(item["SK"], "METADATA");
        assert_eq!(item["gsi2pk"], "NAME#iron-rose");
        assert_eq!(item["entityId"], "artist-1");
        assert_eq!(item["scrapeRunId"], "run-1");
        assert!(item.get("bio").is_none());
        assert_eq!(decoded, record);
    }

    #[test]
    fn test_entity_record_from_incomplete_item_fails() {
        let item = row("ENTITY#g", "run-1");
        assert!(matches!(
            EntityRecord::from_item(&item),
            Err(StoreError::Serialization(_))
        ));
    }
}
