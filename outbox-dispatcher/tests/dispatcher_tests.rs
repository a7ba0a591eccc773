//! Integration tests for the outbox dispatcher
//!
//! The bus is simulated with in-memory sinks so delivery, retry, and
//! terminal-failure behavior can be driven deterministically.

use async_trait::async_trait;
use chrono::Utc;
use ledger_core::{
    CommitUnit, Config, CustomerId, EventPayload, OutboxStatus, StagedEntry, Storage, TenantId,
    TransactionKind, TransactionRecord, TransactionStatus,
};
use message_bus::{EventSink, InMemorySink, Message};
use outbox_dispatcher::{DispatcherConfig, OutboxDispatcher};
use rust_decimal::Decimal;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use uuid::Uuid;

fn test_storage() -> Arc<Storage> {
    let mut config = Config::default();
    config.data_dir = tempfile::tempdir().unwrap().into_path();
    Arc::new(Storage::open(&config).unwrap())
}

fn issue_unit(customer: &str, amount: i64, key: &str) -> CommitUnit {
    let tenant_id = TenantId::new("t1");
    let customer_id = CustomerId::new(customer);
    let tx_id = Uuid::now_v7();

    CommitUnit {
        tenant_id: tenant_id.clone(),
        transaction: TransactionRecord {
            id: tx_id,
            tenant_id,
            customer_id: customer_id.clone(),
            kind: TransactionKind::Issue,
            amount: Decimal::from(amount),
            status: TransactionStatus::Completed,
            idempotency_key: key.to_string(),
            device_id: None,
            metadata: Default::default(),
            created_at: Utc::now(),
        },
        redemption: None,
        entry: StagedEntry {
            customer_id: customer_id.clone(),
            amount: Decimal::from(amount),
            idempotency_key: key.to_string(),
            operation: ledger_core::OperationType::Issue,
        },
        payload: EventPayload::PointsIssued {
            transaction_id: tx_id,
            customer_id,
            amount: Decimal::from(amount),
            balance_after: Decimal::ZERO,
            device_id: None,
            idempotency_key: key.to_string(),
        },
        min_balance: None,
    }
}

/// Sink that fails its first `failures` publish attempts, then delegates to
/// an in-memory sink
struct FlakySink {
    inner: InMemorySink,
    failures_remaining: AtomicU32,
}

impl FlakySink {
    fn failing(failures: u32) -> Self {
        Self {
            inner: InMemorySink::new(),
            failures_remaining: AtomicU32::new(failures),
        }
    }
}

#[async_trait]
impl EventSink for FlakySink {
    async fn publish(&self, message: &Message) -> message_bus::Result<()> {
        let remaining = self.failures_remaining.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures_remaining.store(remaining - 1, Ordering::SeqCst);
            return Err(message_bus::Error::Publish("simulated outage".to_string()));
        }
        self.inner.publish(message).await
    }
}

#[tokio::test]
async fn test_sweep_publishes_pending_oldest_first() {
    let storage = test_storage();
    for (i, amount) in [50i64, 60, 70].iter().enumerate() {
        storage
            .commit_unit(issue_unit(&format!("c{}", i), *amount, &format!("k{}", i)))
            .unwrap();
    }

    let event_ids: Vec<Uuid> = storage
        .fetch_pending_events(100)
        .unwrap()
        .iter()
        .map(|e| e.id)
        .collect();

    let sink = Arc::new(InMemorySink::new());
    let dispatcher = OutboxDispatcher::new(storage.clone(), sink.clone(), DispatcherConfig::default());

    let stats = dispatcher.sweep().await.unwrap();
    assert_eq!(stats.published, 3);
    assert_eq!(stats.retried, 0);
    assert_eq!(stats.failed, 0);

    // Published in creation order
    let messages = sink.messages();
    assert_eq!(messages.len(), 3);
    assert_eq!(messages[0].payload["amount"], "50");
    assert_eq!(messages[1].payload["amount"], "60");
    assert_eq!(messages[2].payload["amount"], "70");

    // Events transitioned to PUBLISHED and left the queue
    for id in event_ids {
        let event = storage.get_event(id).unwrap();
        assert_eq!(event.status, OutboxStatus::Published);
        assert!(event.published_at.is_some());
    }
    assert!(storage.fetch_pending_events(100).unwrap().is_empty());

    // Idle sweep is a no-op
    let stats = dispatcher.sweep().await.unwrap();
    assert_eq!(stats.published, 0);
}

#[tokio::test]
async fn test_eventual_delivery_within_retry_budget() {
    let storage = test_storage();
    storage.commit_unit(issue_unit("c1", 50, "k1")).unwrap();
    storage.commit_unit(issue_unit("c2", 60, "k2")).unwrap();

    // The bus fails the first 2 attempts, then recovers; with max_retries = 3
    // every event still makes it out
    let sink = Arc::new(FlakySink::failing(2));
    let dispatcher = OutboxDispatcher::new(storage.clone(), sink.clone(), DispatcherConfig::default());

    let first = dispatcher.sweep().await.unwrap();
    assert_eq!(first.retried, 2);

    let second = dispatcher.sweep().await.unwrap();
    assert_eq!(second.published, 2);

    assert_eq!(sink.inner.messages().len(), 2);
    assert!(storage.fetch_pending_events(100).unwrap().is_empty());
}

#[tokio::test]
async fn test_failed_after_retry_budget_exhausted() {
    let storage = test_storage();
    storage.commit_unit(issue_unit("c1", 50, "k1")).unwrap();

    let event_id = storage.fetch_pending_events(100).unwrap()[0].id;

    // Bus never recovers; budget of 2 means two sweeps then terminal FAILED
    let sink = Arc::new(FlakySink::failing(u32::MAX));
    let config = DispatcherConfig {
        max_retries: 2,
        ..Default::default()
    };
    let dispatcher = OutboxDispatcher::new(storage.clone(), sink.clone(), config);

    let first = dispatcher.sweep().await.unwrap();
    assert_eq!(first.retried, 1);
    assert_eq!(storage.get_event(event_id).unwrap().retry_count, 1);

    let second = dispatcher.sweep().await.unwrap();
    assert_eq!(second.failed, 1);

    let event = storage.get_event(event_id).unwrap();
    assert_eq!(event.status, OutboxStatus::Failed);
    assert_eq!(event.retry_count, 2);
    assert!(event.published_at.is_none());

    // Terminal: no further automatic retries
    assert!(storage.fetch_pending_events(100).unwrap().is_empty());
    let idle = dispatcher.sweep().await.unwrap();
    assert_eq!(idle.retried + idle.failed + idle.published, 0);
}

#[tokio::test]
async fn test_failure_does_not_block_rest_of_batch() {
    let storage = test_storage();
    storage.commit_unit(issue_unit("c1", 50, "k1")).unwrap();
    storage.commit_unit(issue_unit("c2", 60, "k2")).unwrap();

    // Exactly the first attempt of the sweep fails
    let sink = Arc::new(FlakySink::failing(1));
    let dispatcher = OutboxDispatcher::new(storage.clone(), sink.clone(), DispatcherConfig::default());

    let stats = dispatcher.sweep().await.unwrap();
    assert_eq!(stats.retried, 1);
    assert_eq!(stats.published, 1);
}

#[tokio::test]
async fn test_spawned_loop_drains_and_shuts_down() {
    let storage = test_storage();
    storage.commit_unit(issue_unit("c1", 50, "k1")).unwrap();

    let sink = Arc::new(InMemorySink::new());
    let config = DispatcherConfig {
        poll_interval_ms: 10,
        ..Default::default()
    };
    let handle = OutboxDispatcher::new(storage.clone(), sink.clone(), config).spawn();

    // Wait for the loop to pick the event up
    for _ in 0..50 {
        if storage.fetch_pending_events(100).unwrap().is_empty() {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }

    assert!(storage.fetch_pending_events(100).unwrap().is_empty());
    assert_eq!(sink.messages().len(), 1);

    handle.shutdown().await;
}
