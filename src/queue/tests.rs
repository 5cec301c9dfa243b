//! Queue Module Tests
//!
//! Exercises the in-memory queue against the behaviour workers rely on:
//! batch limits, priority admission, visibility leases, stale receipts and
//! redrive to the dead-letter list.

#[cfg(test)]
mod tests {
    use crate::error::QueueError;
    use crate::queue::{
        MAX_BATCH_ENTRIES, MAX_MESSAGE_BYTES, MemoryQueue, OutgoingMessage, Queue, QueueSettings,
    };
    use std::time::Duration;

    fn message(id: &str, priority: u8) -> OutgoingMessage {
        OutgoingMessage {
            id: id.to_string(),
            body: format!("{{\"entityId\":\"{}\"}}", id),
            priority,
        }
    }

    fn queue_with(visibility_secs: u64, max_receive_count: u32) -> MemoryQueue {
        MemoryQueue::new(
            "scrape-jobs",
            QueueSettings {
                visibility_timeout: Duration::from_secs(visibility_secs),
                max_receive_count,
            },
        )
    }

    // ============================================================
    // TEST 1: Batch Limits
    // ============================================================

    #[tokio::test]
    async fn test_send_batch_rejects_more_than_ten_entries() {
        // ARRANGE
        let queue = queue_with(30, 3);
        let entries: Vec<_> = (0..=MAX_BATCH_ENTRIES)
            .map(|i| message(&i.to_string(), 5))
            .collect();

        // ACT
        let result = queue.send_batch(entries).await;

        // ASSERT: whole call fails, nothing is stored
        assert_eq!(
            result.unwrap_err(),
            QueueError::TooManyEntriesInBatchRequest { count: 11, max: 10 }
        );
        assert_eq!(queue.stats().visible, 0);
    }

    #[tokio::test]
    async fn test_send_batch_rejects_duplicate_entry_ids() {
        let queue = queue_with(30, 3);

        let result = queue.send_batch(vec![message("a", 5), message("a", 6)]).await;

        assert_eq!(result.unwrap_err(), QueueError::BatchEntryIdsNotDistinct);
    }

    #[tokio::test]
    async fn test_oversized_entry_fails_alone() {
        // ARRANGE
        let queue = queue_with(30, 3);
        let mut oversized = message("big", 5);
        oversized.body = "x".repeat(MAX_MESSAGE_BYTES + 1);

        // ACT
        let outcome = queue
            .send_batch(vec![message("small", 5), oversized])
            .await
            .unwrap();

        // ASSERT: per-entry failure, the rest of the batch is accepted
        assert_eq!(outcome.successful.len(), 1);
        assert_eq!(outcome.successful[0].id, "small");
        assert_eq!(outcome.failed.len(), 1);
        assert_eq!(outcome.failed[0].id, "big");
        assert_eq!(outcome.failed[0].code, "MessageTooLong");
        assert!(outcome.failed[0].sender_fault);
    }

    // ============================================================
    // TEST 2: Priority Admission
    // ============================================================

    #[tokio::test]
    async fn test_receive_orders_by_priority_then_send_order() {
        // ARRANGE
        let queue = queue_with(30, 3);
        queue
            .send_batch(vec![message("low", 3), message("high-1", 9), message("mid", 6)])
            .await
            .unwrap();
        queue.send_batch(vec![message("high-2", 9)]).await.unwrap();

        // ACT
        let received = queue.receive(10, Duration::ZERO).await.unwrap();

        // ASSERT
        let priorities: Vec<u8> = received.iter().map(|m| m.priority).collect();
        assert_eq!(priorities, vec![9, 9, 6, 3]);
        assert!(received[0].body.contains("high-1"));
        assert!(received[1].body.contains("high-2"));
    }

    #[tokio::test]
    async fn test_receive_caps_at_requested_count() {
        let queue = queue_with(30, 3);
        let entries: Vec<_> = (0..5).map(|i| message(&i.to_string(), 5)).collect();
        queue.send_batch(entries).await.unwrap();

        let first = queue.receive(2, Duration::ZERO).await.unwrap();
        let second = queue.receive(10, Duration::ZERO).await.unwrap();

        assert_eq!(first.len(), 2);
        assert_eq!(second.len(), 3);
    }

    // ============================================================
    // TEST 3: Leases and Receipts
    // ============================================================

    #[tokio::test(start_paused = true)]
    async fn test_unacknowledged_message_is_redelivered_after_lease() {
        // ARRANGE
        let queue = queue_with(30, 3);
        queue.send_batch(vec![message("a", 5)]).await.unwrap();
        let first = queue.receive(1, Duration::ZERO).await.unwrap();

        // ASSERT: hidden while leased
        assert!(queue.receive(1, Duration::ZERO).await.unwrap().is_empty());

        // ACT: let the lease lapse
        tokio::time::advance(Duration::from_secs(31)).await;
        let second = queue.receive(1, Duration::ZERO).await.unwrap();

        // ASSERT: same message, new receipt, bumped counter
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].message_id, first[0].message_id);
        assert_ne!(second[0].receipt_handle, first[0].receipt_handle);
        assert_eq!(second[0].receive_count, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_receipt_cannot_delete() {
        // ARRANGE
        let queue = queue_with(30, 3);
        queue.send_batch(vec![message("a", 5)]).await.unwrap();
        let first = queue.receive(1, Duration::ZERO).await.unwrap();
        tokio::time::advance(Duration::from_secs(31)).await;
        let second = queue.receive(1, Duration::ZERO).await.unwrap();

        // ACT
        let stale = queue.delete(&first[0].receipt_handle).await;
        let current = queue.delete(&second[0].receipt_handle).await;

        // ASSERT
        assert!(matches!(stale, Err(QueueError::ReceiptHandleInvalid(_))));
        assert!(current.is_ok());
        assert_eq!(queue.stats().visible + queue.stats().in_flight, 0);
    }

    #[tokio::test]
    async fn test_release_makes_message_visible_immediately() {
        let queue = queue_with(300, 3);
        queue.send_batch(vec![message("a", 5)]).await.unwrap();
        let received = queue.receive(1, Duration::ZERO).await.unwrap();

        queue.release(&received[0].receipt_handle).await.unwrap();
        let again = queue.receive(1, Duration::ZERO).await.unwrap();

        assert_eq!(again.len(), 1);
        assert_eq!(again[0].message_id, received[0].message_id);
    }

    #[tokio::test]
    async fn test_deleted_message_is_never_redelivered() {
        let queue = queue_with(0, 3);
        queue.send_batch(vec![message("a", 5)]).await.unwrap();
        let received = queue.receive(1, Duration::ZERO).await.unwrap();

        queue.delete(&received[0].receipt_handle).await.unwrap();

        assert!(queue.receive(1, Duration::ZERO).await.unwrap().is_empty());
        assert!(queue.delete(&received[0].receipt_handle).await.is_err());
    }

    // ============================================================
    // TEST 4: Long Polling
    // ============================================================

    #[tokio::test(start_paused = true)]
    async fn test_long_poll_returns_empty_after_wait() {
        let queue = queue_with(30, 3);

        let started = tokio::time::Instant::now();
        let received = queue.receive(10, Duration::from_secs(2)).await.unwrap();

        assert!(received.is_empty());
        assert!(started.elapsed() >= Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_long_poll_wakes_when_message_arrives() {
        // ARRANGE
        let queue = std::sync::Arc::new(queue_with(30, 3));
        let producer = queue.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(500)).await;
            producer.send_batch(vec![message("late", 5)]).await.unwrap();
        });

        // ACT
        let received = queue.receive(10, Duration::from_secs(20)).await.unwrap();

        // ASSERT
        assert_eq!(received.len(), 1);
        assert!(received[0].body.contains("late"));
    }

    // ============================================================
    // TEST 5: Dead Letters
    // ============================================================

    #[tokio::test]
    async fn test_redrive_after_max_receive_count() {
        // ARRANGE: zero visibility so every receive is a fresh delivery
        let queue = queue_with(0, 2);
        queue.send_batch(vec![message("poison", 5)]).await.unwrap();

        // ACT
        let first = queue.receive(1, Duration::ZERO).await.unwrap();
        let second = queue.receive(1, Duration::ZERO).await.unwrap();
        let third = queue.receive(1, Duration::ZERO).await.unwrap();

        // ASSERT
        assert_eq!(first.len(), 1);
        assert_eq!(second.len(), 1);
        assert!(third.is_empty());
        let dead = queue.dead_letters();
        assert_eq!(dead.len(), 1);
        assert_eq!(dead[0].reason, "maxReceiveCount exceeded");
        assert_eq!(dead[0].receive_count, 2);
    }

    #[tokio::test]
    async fn test_explicit_dead_letter_keeps_reason() {
        let queue = queue_with(30, 3);
        queue.send_batch(vec![message("bad", 5)]).await.unwrap();
        let received = queue.receive(1, Duration::ZERO).await.unwrap();

        queue
            .dead_letter(&received[0].receipt_handle, "malformed job body")
            .await
            .unwrap();

        assert_eq!(queue.dead_letter_count(), 1);
        assert_eq!(queue.dead_letters()[0].reason, "malformed job body");
        assert_eq!(queue.stats().in_flight, 0);
    }
}
