//! Main ledger orchestration layer
//!
//! Ties storage, metrics, and the single-writer actor into a high-level API
//! for committing point movements and reading balances and history.
//!
//! # Example
//!
//! ```no_run
//! use ledger_core::{Config, Ledger};
//!
//! #[tokio::main]
//! async fn main() -> ledger_core::Result<()> {
//!     let config = Config::default();
//!     let ledger = Ledger::open(config).await?;
//!
//!     // let outcome = ledger.commit(unit).await?;
//!
//!     Ok(())
//! }
//! ```

use crate::{
    actor::{spawn_ledger_actor, LedgerHandle},
    metrics::Metrics,
    types::{
        CommitOutcome, CommitUnit, CustomerId, LedgerEntry, LedgerPage, Redemption, TenantId,
        TransactionRecord,
    },
    Config, Error, Result, Storage,
};
use chrono::Utc;
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

/// Main ledger interface
pub struct Ledger {
    /// Actor handle for writes
    handle: LedgerHandle,

    /// Direct storage access (for reads)
    storage: Arc<Storage>,

    /// Prometheus metrics
    metrics: Metrics,

    /// Configuration
    config: Config,
}

impl Ledger {
    /// Open ledger with configuration
    pub async fn open(config: Config) -> Result<Self> {
        let storage = Arc::new(Storage::open(&config)?);
        let handle = spawn_ledger_actor(storage.clone());
        let metrics = Metrics::new().map_err(|e| Error::Config(e.to_string()))?;

        Ok(Self {
            handle,
            storage,
            metrics,
            config,
        })
    }

    /// Commit one atomic unit (transaction + optional redemption + ledger
    /// entry + outbox event). Idempotent per the unit's entry key; see
    /// [`Storage::commit_unit`].
    pub async fn commit(&self, unit: CommitUnit) -> Result<CommitOutcome> {
        let start = Instant::now();
        let result = self.handle.commit(unit).await;
        self.metrics.record_commit_duration(start.elapsed().as_secs_f64());

        match &result {
            Ok(outcome) if outcome.is_replay() => self.metrics.record_replay(),
            Ok(_) => self.metrics.record_commit(),
            Err(Error::InsufficientBalance { .. }) => self.metrics.record_insufficient_balance(),
            Err(_) => {}
        }

        result
    }

    /// Authoritative balance: sum of all entry amounts for the customer
    pub fn balance(&self, tenant: &TenantId, customer: &CustomerId) -> Result<Decimal> {
        self.storage.balance(tenant, customer)
    }

    /// Recompute the balance from history and verify the cache agrees
    pub fn reconcile_balance(&self, tenant: &TenantId, customer: &CustomerId) -> Result<Decimal> {
        self.storage.reconcile_balance(tenant, customer)
    }

    /// All entries for a customer, creation order ascending
    pub fn customer_entries(&self, tenant: &TenantId, customer: &CustomerId) -> Result<Vec<LedgerEntry>> {
        self.storage.customer_entries(tenant, customer)
    }

    /// Paginated history, newest first
    pub fn ledger_history(
        &self,
        tenant: &TenantId,
        customer: &CustomerId,
        page: u32,
        limit: u32,
    ) -> Result<LedgerPage> {
        self.storage.ledger_history(tenant, customer, page, limit)
    }

    /// Get ledger entry by ID
    pub fn entry(&self, entry_id: Uuid) -> Result<LedgerEntry> {
        self.storage.get_entry(entry_id)
    }

    /// Get a tenant's transaction by ID. Cross-tenant ids resolve to
    /// TransactionNotFound.
    pub fn transaction(&self, tenant: &TenantId, transaction_id: Uuid) -> Result<TransactionRecord> {
        let tx = self.storage.get_transaction(transaction_id)?;
        if tx.tenant_id != *tenant {
            return Err(Error::TransactionNotFound(transaction_id.to_string()));
        }
        Ok(tx)
    }

    /// Find a transaction by its tenant-scoped idempotency key
    pub fn find_transaction_by_key(&self, tenant: &TenantId, key: &str) -> Result<Option<TransactionRecord>> {
        self.storage.find_transaction_by_key(tenant, key)
    }

    /// Find a redemption by its tenant-scoped idempotency key
    pub fn find_redemption_by_key(&self, tenant: &TenantId, key: &str) -> Result<Option<Redemption>> {
        self.storage.find_redemption_by_key(tenant, key)
    }

    /// Mark a transaction as reversed, with a back-reference to the reversal
    /// transaction. The only post-commit mutation a transaction ever sees.
    pub async fn mark_reversed(
        &self,
        tenant: &TenantId,
        transaction_id: Uuid,
        reversal_transaction_id: Uuid,
        reason: &str,
    ) -> Result<()> {
        let tx = self.transaction(tenant, transaction_id)?;

        let mut metadata = tx.metadata;
        metadata.reversed = true;
        metadata.reversal_transaction_id = Some(reversal_transaction_id);
        metadata.reversal_reason = Some(reason.to_string());
        metadata.reversed_at = Some(Utc::now());

        self.handle.set_transaction_metadata(transaction_id, metadata).await
    }

    /// Direct storage access, for the outbox dispatcher
    pub fn storage(&self) -> Arc<Storage> {
        self.storage.clone()
    }

    /// Metrics registry holder
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Configuration the ledger was opened with
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Shutdown ledger
    pub async fn shutdown(self) -> Result<()> {
        self.handle.shutdown().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{
        EventPayload, OperationType, StagedEntry, TransactionKind, TransactionMetadata,
        TransactionStatus,
    };

    async fn create_test_ledger() -> Ledger {
        let mut config = Config::default();
        // into_path keeps the directory alive for the duration of the test
        config.data_dir = tempfile::tempdir().unwrap().into_path();

        Ledger::open(config).await.unwrap()
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
                metadata: TransactionMetadata::default(),
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
    async fn test_commit_and_balance() {
        let ledger = create_test_ledger().await;
        let tenant = TenantId::new("t1");
        let customer = CustomerId::new("c1");

        ledger.commit(issue_unit("c1", 50, "k1")).await.unwrap();
        ledger.commit(issue_unit("c1", 60, "k2")).await.unwrap();

        assert_eq!(ledger.balance(&tenant, &customer).unwrap(), Decimal::from(110));
        assert_eq!(ledger.reconcile_balance(&tenant, &customer).unwrap(), Decimal::from(110));

        ledger.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_transaction_tenant_isolation() {
        let ledger = create_test_ledger().await;
        let unit = issue_unit("c1", 50, "k1");
        let tx_id = unit.transaction.id;
        ledger.commit(unit).await.unwrap();

        assert!(ledger.transaction(&TenantId::new("t1"), tx_id).is_ok());
        assert!(matches!(
            ledger.transaction(&TenantId::new("other"), tx_id),
            Err(Error::TransactionNotFound(_))
        ));

        ledger.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_mark_reversed() {
        let ledger = create_test_ledger().await;
        let tenant = TenantId::new("t1");

        let unit = issue_unit("c1", 50, "k1");
        let tx_id = unit.transaction.id;
        ledger.commit(unit).await.unwrap();

        let reversal_id = Uuid::now_v7();
        ledger.mark_reversed(&tenant, tx_id, reversal_id, "operator error").await.unwrap();

        let tx = ledger.transaction(&tenant, tx_id).unwrap();
        assert!(tx.metadata.reversed);
        assert_eq!(tx.metadata.reversal_transaction_id, Some(reversal_id));
        assert_eq!(tx.metadata.reversal_reason.as_deref(), Some("operator error"));
        assert!(tx.metadata.reversed_at.is_some());

        ledger.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_balance_matches_last_entry() {
        let ledger = create_test_ledger().await;
        let tenant = TenantId::new("t1");
        let customer = CustomerId::new("c1");

        for (i, amount) in [50i64, 60, -30].iter().enumerate() {
            let mut unit = issue_unit("c1", *amount, &format!("k{}", i));
            if *amount < 0 {
                unit.entry.operation = OperationType::ManualAdjustment;
                unit.transaction.kind = TransactionKind::Redeem;
                unit.transaction.amount = Decimal::from(amount.abs());
            }
            ledger.commit(unit).await.unwrap();
        }

        let entries = ledger.customer_entries(&tenant, &customer).unwrap();
        let last = entries.last().unwrap();
        assert_eq!(ledger.balance(&tenant, &customer).unwrap(), last.balance_after);
        assert_eq!(last.balance_after, Decimal::from(80));

        ledger.shutdown().await.unwrap();
    }
}
