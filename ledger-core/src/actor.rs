//! Actor-based concurrency for the ledger
//!
//! Single-writer pattern using Tokio actors: one logical writer task owns
//! every commit, so the check-then-write sequence inside a unit can never
//! interleave with another unit's. Request handlers stay fully concurrent;
//! only the durable write serializes.
//!
//! The storage layer's own write lock backstops direct `Storage` users; the
//! actor is the front door for everything going through `Ledger`.

use crate::types::{CommitOutcome, CommitUnit, TransactionMetadata};
use crate::{Error, Result, Storage};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

/// Message sent to the ledger actor
pub enum LedgerMessage {
    /// Commit one atomic unit
    Commit {
        /// The unit to commit
        unit: CommitUnit,
        /// Reply channel
        response: oneshot::Sender<Result<CommitOutcome>>,
    },

    /// Replace a transaction's metadata (reversal back-reference)
    SetTransactionMetadata {
        /// Transaction to annotate
        transaction_id: Uuid,
        /// New metadata
        metadata: TransactionMetadata,
        /// Reply channel
        response: oneshot::Sender<Result<()>>,
    },

    /// Shutdown actor
    Shutdown,
}

/// Actor that processes ledger write messages
pub struct LedgerActor {
    /// Storage backend
    storage: Arc<Storage>,

    /// Mailbox for incoming messages
    mailbox: mpsc::Receiver<LedgerMessage>,
}

impl LedgerActor {
    /// Create new actor
    pub fn new(storage: Arc<Storage>, mailbox: mpsc::Receiver<LedgerMessage>) -> Self {
        Self { storage, mailbox }
    }

    /// Run the actor event loop
    pub async fn run(mut self) {
        while let Some(msg) = self.mailbox.recv().await {
            match msg {
                LedgerMessage::Commit { unit, response } => {
                    let result = self.storage.commit_unit(unit);
                    let _ = response.send(result);
                }

                LedgerMessage::SetTransactionMetadata {
                    transaction_id,
                    metadata,
                    response,
                } => {
                    let result = self.storage.set_transaction_metadata(transaction_id, metadata);
                    let _ = response.send(result);
                }

                LedgerMessage::Shutdown => break,
            }
        }
    }
}

/// Handle for sending messages to the actor
#[derive(Clone)]
pub struct LedgerHandle {
    sender: mpsc::Sender<LedgerMessage>,
}

impl LedgerHandle {
    /// Create new handle
    pub fn new(sender: mpsc::Sender<LedgerMessage>) -> Self {
        Self { sender }
    }

    /// Commit an atomic unit
    pub async fn commit(&self, unit: CommitUnit) -> Result<CommitOutcome> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(LedgerMessage::Commit { unit, response: tx })
            .await
            .map_err(|_| Error::Concurrency("Actor mailbox closed".to_string()))?;

        rx.await
            .map_err(|_| Error::Concurrency("Response channel closed".to_string()))?
    }

    /// Replace a transaction's metadata
    pub async fn set_transaction_metadata(
        &self,
        transaction_id: Uuid,
        metadata: TransactionMetadata,
    ) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(LedgerMessage::SetTransactionMetadata {
                transaction_id,
                metadata,
                response: tx,
            })
            .await
            .map_err(|_| Error::Concurrency("Actor mailbox closed".to_string()))?;

        rx.await
            .map_err(|_| Error::Concurrency("Response channel closed".to_string()))?
    }

    /// Shutdown actor
    pub async fn shutdown(&self) -> Result<()> {
        self.sender
            .send(LedgerMessage::Shutdown)
            .await
            .map_err(|_| Error::Concurrency("Actor mailbox closed".to_string()))?;
        Ok(())
    }
}

/// Spawn the ledger actor
pub fn spawn_ledger_actor(storage: Arc<Storage>) -> LedgerHandle {
    let (tx, rx) = mpsc::channel(1000); // Bounded channel for backpressure
    let actor = LedgerActor::new(storage, rx);

    tokio::spawn(async move {
        actor.run().await;
    });

    LedgerHandle::new(tx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{
        CustomerId, EventPayload, OperationType, StagedEntry, TenantId, TransactionKind,
        TransactionRecord, TransactionStatus,
    };
    use crate::Config;
    use chrono::Utc;
    use rust_decimal::Decimal;

    fn test_unit(key: &str, amount: i64) -> CommitUnit {
        let tenant_id = TenantId::new("t1");
        let customer_id = CustomerId::new("c1");
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
                operation: OperationType::Issue,
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

    #[tokio::test]
    async fn test_actor_spawn_and_shutdown() {
        let temp_dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.data_dir = temp_dir.path().to_path_buf();

        let storage = Arc::new(Storage::open(&config).unwrap());
        let handle = spawn_ledger_actor(storage);

        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_actor_commit() {
        let temp_dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.data_dir = temp_dir.path().to_path_buf();

        let storage = Arc::new(Storage::open(&config).unwrap());
        let handle = spawn_ledger_actor(storage.clone());

        let outcome = handle.commit(test_unit("k1", 50)).await.unwrap();
        assert_eq!(outcome.balance_after(), Decimal::from(50));

        let replay = handle.commit(test_unit("k1", 50)).await.unwrap();
        assert!(replay.is_replay());

        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_concurrent_commits_converge() {
        let temp_dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.data_dir = temp_dir.path().to_path_buf();

        let storage = Arc::new(Storage::open(&config).unwrap());
        let handle = spawn_ledger_actor(storage.clone());

        // Ten concurrent commits with the same idempotency key: exactly one
        // applies, all see the same result
        let mut tasks = Vec::new();
        for _ in 0..10 {
            let handle = handle.clone();
            tasks.push(tokio::spawn(async move {
                handle.commit(test_unit("race", 50)).await.unwrap()
            }));
        }

        let mut outcomes = Vec::new();
        for task in tasks {
            outcomes.push(task.await.unwrap());
        }

        let applied = outcomes.iter().filter(|o| !o.is_replay()).count();
        assert_eq!(applied, 1);
        assert!(outcomes.iter().all(|o| o.entry_id() == outcomes[0].entry_id()));
        assert!(outcomes.iter().all(|o| o.balance_after() == Decimal::from(50)));

        let tenant = TenantId::new("t1");
        let customer = CustomerId::new("c1");
        assert_eq!(storage.customer_entries(&tenant, &customer).unwrap().len(), 1);

        handle.shutdown().await.unwrap();
    }
}
