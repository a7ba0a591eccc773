//! Storage layer using RocksDB
//!
//! # Column Families
//!
//! - `entries` - Append-only ledger entries (key: entry_id)
//! - `transactions` - Transaction records (key: transaction_id)
//! - `redemptions` - Redemption records (key: redemption_id)
//! - `outbox` - Outbox events, JSON-encoded (key: event_id)
//! - `indices` - Secondary indices (idempotency keys, customer order, pending queue)
//! - `balances` - Write-through running balance per (tenant, customer)
//!
//! The commit path holds a write lock across the idempotency check and the
//! batch write, so key uniqueness is enforced here rather than in application
//! logic: two racing commits for the same `(tenant, idempotency_key,
//! operation)` serialize, the loser observes the winner's index entry, and
//! the losing unit writes nothing.

use crate::{
    error::{Error, Result},
    types::{
        CommitOutcome, CommitUnit, CustomerId, LedgerEntry, LedgerPage, OperationType, OutboxEvent,
        OutboxStatus, Redemption, TenantId, TransactionMetadata, TransactionRecord,
        EVENT_SCHEMA_VERSION,
    },
    Config,
};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rocksdb::{ColumnFamily, ColumnFamilyDescriptor, DBCompactionStyle, IteratorMode, Options, WriteBatch, DB};
use rust_decimal::Decimal;
use std::sync::Arc;
use uuid::{ContextV7, Timestamp, Uuid};

/// Column family names
const CF_ENTRIES: &str = "entries";
const CF_TRANSACTIONS: &str = "transactions";
const CF_REDEMPTIONS: &str = "redemptions";
const CF_OUTBOX: &str = "outbox";
const CF_INDICES: &str = "indices";
const CF_BALANCES: &str = "balances";

/// Storage wrapper for RocksDB
pub struct Storage {
    db: Arc<DB>,

    /// Serializes the check-then-write critical section of `commit_unit` and
    /// metadata updates. The idempotency index is only ever read and written
    /// under this lock.
    write_lock: Mutex<()>,

    /// Monotonic UUIDv7 source. Entry and event ids double as creation-order
    /// sort keys, so same-millisecond commits must still sort correctly.
    uuid_ctx: ContextV7,
}

impl Storage {
    /// Open or create database
    pub fn open(config: &Config) -> Result<Self> {
        let path = &config.data_dir;

        std::fs::create_dir_all(path)?;

        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);

        db_opts.set_write_buffer_size(config.rocksdb.write_buffer_size_mb * 1024 * 1024);
        db_opts.set_max_write_buffer_number(config.rocksdb.max_write_buffer_number);
        db_opts.set_target_file_size_base(config.rocksdb.target_file_size_mb * 1024 * 1024);
        db_opts.set_max_background_jobs(config.rocksdb.max_background_jobs);

        // Universal compaction for the append-heavy workload
        db_opts.set_compaction_style(DBCompactionStyle::Universal);

        if config.rocksdb.enable_statistics {
            db_opts.enable_statistics();
        }

        let cf_descriptors = vec![
            ColumnFamilyDescriptor::new(CF_ENTRIES, Self::cf_options_records()),
            ColumnFamilyDescriptor::new(CF_TRANSACTIONS, Self::cf_options_records()),
            ColumnFamilyDescriptor::new(CF_REDEMPTIONS, Self::cf_options_records()),
            ColumnFamilyDescriptor::new(CF_OUTBOX, Self::cf_options_records()),
            ColumnFamilyDescriptor::new(CF_INDICES, Self::cf_options_indices()),
            ColumnFamilyDescriptor::new(CF_BALANCES, Self::cf_options_indices()),
        ];

        let db = DB::open_cf_descriptors(&db_opts, path, cf_descriptors)?;

        tracing::info!(path = %path.display(), "Opened ledger store");

        Ok(Self {
            db: Arc::new(db),
            write_lock: Mutex::new(()),
            uuid_ctx: ContextV7::new(),
        })
    }

    fn cf_options_records() -> Options {
        let mut opts = Options::default();
        opts.set_compression_type(rocksdb::DBCompressionType::Zstd);
        opts
    }

    fn cf_options_indices() -> Options {
        let mut opts = Options::default();
        // Indices are point-looked-up on the hot path, favor speed
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
        let mut block_opts = rocksdb::BlockBasedOptions::default();
        block_opts.set_bloom_filter(10.0, false);
        opts.set_block_based_table_factory(&block_opts);
        opts
    }

    fn cf_handle(&self, name: &str) -> Result<&ColumnFamily> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| Error::Storage(format!("Column family {} not found", name)))
    }

    // Index key helpers

    fn idem_key(tenant: &TenantId, key: &str, operation: OperationType) -> Vec<u8> {
        let mut k = b"idm|".to_vec();
        k.extend_from_slice(tenant.as_str().as_bytes());
        k.push(b'|');
        k.extend_from_slice(key.as_bytes());
        k.push(b'|');
        k.push(operation.code());
        k
    }

    fn tx_key_index(tenant: &TenantId, key: &str) -> Vec<u8> {
        let mut k = b"txk|".to_vec();
        k.extend_from_slice(tenant.as_str().as_bytes());
        k.push(b'|');
        k.extend_from_slice(key.as_bytes());
        k
    }

    fn redemption_key_index(tenant: &TenantId, key: &str) -> Vec<u8> {
        let mut k = b"rdk|".to_vec();
        k.extend_from_slice(tenant.as_str().as_bytes());
        k.push(b'|');
        k.extend_from_slice(key.as_bytes());
        k
    }

    fn customer_prefix(tenant: &TenantId, customer: &CustomerId) -> Vec<u8> {
        let mut k = b"cst|".to_vec();
        k.extend_from_slice(tenant.as_str().as_bytes());
        k.push(b'|');
        k.extend_from_slice(customer.as_str().as_bytes());
        k.push(b'|');
        k
    }

    fn customer_entry_key(tenant: &TenantId, customer: &CustomerId, entry_id: Uuid) -> Vec<u8> {
        // UUIDv7 entry ids sort by creation time, so a prefix scan yields the
        // customer's entries in creation order
        let mut k = Self::customer_prefix(tenant, customer);
        k.extend_from_slice(entry_id.as_bytes());
        k
    }

    fn pending_key(event_id: Uuid) -> Vec<u8> {
        let mut k = b"obp|".to_vec();
        k.extend_from_slice(event_id.as_bytes());
        k
    }

    fn balance_key(tenant: &TenantId, customer: &CustomerId) -> Vec<u8> {
        let mut k = tenant.as_str().as_bytes().to_vec();
        k.push(b'|');
        k.extend_from_slice(customer.as_str().as_bytes());
        k
    }

    // Commit path

    /// Commit one atomic unit: transaction + optional redemption + ledger
    /// entry + outbox event, all in a single write batch.
    ///
    /// Idempotent on `(tenant, entry.idempotency_key, entry.operation)`: a
    /// replay returns the winning entry's result and writes nothing. The
    /// optional `min_balance` precondition is evaluated against the balance
    /// derived inside the critical section, so concurrent units for the same
    /// customer cannot both pass a check only one of them can afford.
    pub fn commit_unit(&self, mut unit: CommitUnit) -> Result<CommitOutcome> {
        if unit.entry.amount.is_zero() {
            return Err(Error::Validation("Entry amount must be nonzero".to_string()));
        }

        let _guard = self.write_lock.lock();

        // Idempotency check: the index is the source of truth. A hit means a
        // prior (or concurrent) attempt already applied this unit.
        let idem_key = Self::idem_key(&unit.tenant_id, &unit.entry.idempotency_key, unit.entry.operation);
        let cf_indices = self.cf_handle(CF_INDICES)?;

        if let Some(existing_id) = self.db.get_cf(cf_indices, &idem_key)? {
            let entry = self.get_entry(Self::uuid_from_bytes(&existing_id)?)?;

            tracing::debug!(
                tenant_id = %unit.tenant_id,
                idempotency_key = %unit.entry.idempotency_key,
                entry_id = %entry.id,
                "Idempotent replay, returning existing entry"
            );

            return Ok(CommitOutcome::Replayed {
                entry_id: entry.id,
                balance_after: entry.balance_after,
            });
        }

        // Derive the balance from full history; the cached balance is never
        // trusted on the commit path.
        let current_balance = self.sum_customer_entries(&unit.tenant_id, &unit.entry.customer_id)?;

        if let Some(min_balance) = unit.min_balance {
            if current_balance < min_balance {
                return Err(Error::InsufficientBalance {
                    required: min_balance,
                    available: current_balance,
                });
            }
        }

        let now = Utc::now();
        let balance_after = current_balance + unit.entry.amount;

        let entry = LedgerEntry {
            id: Uuid::new_v7(Timestamp::now(&self.uuid_ctx)),
            tenant_id: unit.tenant_id.clone(),
            customer_id: unit.entry.customer_id.clone(),
            transaction_id: unit.transaction.id,
            amount: unit.entry.amount,
            balance_after,
            idempotency_key: unit.entry.idempotency_key.clone(),
            operation: unit.entry.operation,
            created_at: now,
        };

        unit.payload.set_balance_after(balance_after);

        let event = OutboxEvent {
            id: Uuid::new_v7(Timestamp::now(&self.uuid_ctx)),
            tenant_id: unit.tenant_id.clone(),
            kind: unit.payload.kind(),
            schema_version: EVENT_SCHEMA_VERSION,
            payload: unit.payload,
            status: OutboxStatus::Pending,
            retry_count: 0,
            created_at: now,
            published_at: None,
        };

        let mut batch = WriteBatch::default();
        self.append_entry(&mut batch, &entry, balance_after)?;
        self.put_transaction_in(&mut batch, &unit.transaction)?;
        if let Some(redemption) = &unit.redemption {
            self.put_redemption_in(&mut batch, redemption)?;
        }
        self.write_event(&mut batch, &event)?;

        self.db.write(batch)?;

        tracing::debug!(
            tenant_id = %entry.tenant_id,
            customer_id = %entry.customer_id,
            entry_id = %entry.id,
            amount = %entry.amount,
            balance_after = %entry.balance_after,
            event_id = %event.id,
            "Unit committed"
        );

        Ok(CommitOutcome::Applied {
            entry_id: entry.id,
            balance_after,
        })
    }

    /// Stage a ledger entry into the enclosing batch, with its idempotency
    /// index, customer-order index, and balance cache.
    fn append_entry(&self, batch: &mut WriteBatch, entry: &LedgerEntry, balance_after: Decimal) -> Result<()> {
        let cf_entries = self.cf_handle(CF_ENTRIES)?;
        batch.put_cf(cf_entries, entry.id.as_bytes(), bincode::serialize(entry)?);

        let cf_indices = self.cf_handle(CF_INDICES)?;
        batch.put_cf(
            cf_indices,
            Self::idem_key(&entry.tenant_id, &entry.idempotency_key, entry.operation),
            entry.id.as_bytes(),
        );
        batch.put_cf(
            cf_indices,
            Self::customer_entry_key(&entry.tenant_id, &entry.customer_id, entry.id),
            b"",
        );

        let cf_balances = self.cf_handle(CF_BALANCES)?;
        batch.put_cf(
            cf_balances,
            Self::balance_key(&entry.tenant_id, &entry.customer_id),
            bincode::serialize(&balance_after)?,
        );

        Ok(())
    }

    fn put_transaction_in(&self, batch: &mut WriteBatch, tx: &TransactionRecord) -> Result<()> {
        let cf = self.cf_handle(CF_TRANSACTIONS)?;
        batch.put_cf(cf, tx.id.as_bytes(), bincode::serialize(tx)?);

        let cf_indices = self.cf_handle(CF_INDICES)?;
        batch.put_cf(
            cf_indices,
            Self::tx_key_index(&tx.tenant_id, &tx.idempotency_key),
            tx.id.as_bytes(),
        );
        Ok(())
    }

    fn put_redemption_in(&self, batch: &mut WriteBatch, redemption: &Redemption) -> Result<()> {
        let cf = self.cf_handle(CF_REDEMPTIONS)?;
        batch.put_cf(cf, redemption.id.as_bytes(), bincode::serialize(redemption)?);

        let cf_indices = self.cf_handle(CF_INDICES)?;
        batch.put_cf(
            cf_indices,
            Self::redemption_key_index(&redemption.tenant_id, &redemption.idempotency_key),
            redemption.id.as_bytes(),
        );
        Ok(())
    }

    /// Stage an outbox event into the enclosing batch, with its pending-queue
    /// index. Must share the batch with the entry it reports on; a separate
    /// write would reintroduce the dual-write problem.
    fn write_event(&self, batch: &mut WriteBatch, event: &OutboxEvent) -> Result<()> {
        let cf_outbox = self.cf_handle(CF_OUTBOX)?;
        batch.put_cf(cf_outbox, event.id.as_bytes(), serde_json::to_vec(event)?);

        let cf_indices = self.cf_handle(CF_INDICES)?;
        batch.put_cf(cf_indices, Self::pending_key(event.id), b"");
        Ok(())
    }

    // Reads

    /// Get ledger entry by ID
    pub fn get_entry(&self, entry_id: Uuid) -> Result<LedgerEntry> {
        let cf = self.cf_handle(CF_ENTRIES)?;
        let value = self
            .db
            .get_cf(cf, entry_id.as_bytes())?
            .ok_or_else(|| Error::EntryNotFound(entry_id.to_string()))?;
        Ok(bincode::deserialize(&value)?)
    }

    /// Get transaction record by ID
    pub fn get_transaction(&self, transaction_id: Uuid) -> Result<TransactionRecord> {
        let cf = self.cf_handle(CF_TRANSACTIONS)?;
        let value = self
            .db
            .get_cf(cf, transaction_id.as_bytes())?
            .ok_or_else(|| Error::TransactionNotFound(transaction_id.to_string()))?;
        Ok(bincode::deserialize(&value)?)
    }

    /// Find a transaction by its tenant-scoped idempotency key
    pub fn find_transaction_by_key(&self, tenant: &TenantId, key: &str) -> Result<Option<TransactionRecord>> {
        let cf_indices = self.cf_handle(CF_INDICES)?;
        match self.db.get_cf(cf_indices, Self::tx_key_index(tenant, key))? {
            Some(id) => Ok(Some(self.get_transaction(Self::uuid_from_bytes(&id)?)?)),
            None => Ok(None),
        }
    }

    /// Get redemption record by ID
    pub fn get_redemption(&self, redemption_id: Uuid) -> Result<Redemption> {
        let cf = self.cf_handle(CF_REDEMPTIONS)?;
        let value = self
            .db
            .get_cf(cf, redemption_id.as_bytes())?
            .ok_or_else(|| Error::RedemptionNotFound(redemption_id.to_string()))?;
        Ok(bincode::deserialize(&value)?)
    }

    /// Find a redemption by its tenant-scoped idempotency key
    pub fn find_redemption_by_key(&self, tenant: &TenantId, key: &str) -> Result<Option<Redemption>> {
        let cf_indices = self.cf_handle(CF_INDICES)?;
        match self.db.get_cf(cf_indices, Self::redemption_key_index(tenant, key))? {
            Some(id) => Ok(Some(self.get_redemption(Self::uuid_from_bytes(&id)?)?)),
            None => Ok(None),
        }
    }

    /// All ledger entries for a customer, creation order ascending
    pub fn customer_entries(&self, tenant: &TenantId, customer: &CustomerId) -> Result<Vec<LedgerEntry>> {
        let ids = self.customer_entry_ids(tenant, customer)?;
        let mut entries = Vec::with_capacity(ids.len());
        for id in ids {
            entries.push(self.get_entry(id)?);
        }
        Ok(entries)
    }

    fn customer_entry_ids(&self, tenant: &TenantId, customer: &CustomerId) -> Result<Vec<Uuid>> {
        let cf_indices = self.cf_handle(CF_INDICES)?;
        let prefix = Self::customer_prefix(tenant, customer);

        let iter = self
            .db
            .iterator_cf(cf_indices, IteratorMode::From(&prefix, rocksdb::Direction::Forward));

        let mut ids = Vec::new();
        for item in iter {
            let (key, _) = item?;
            if !key.starts_with(&prefix) {
                break;
            }
            ids.push(Self::uuid_from_bytes(&key[prefix.len()..])?);
        }
        Ok(ids)
    }

    fn sum_customer_entries(&self, tenant: &TenantId, customer: &CustomerId) -> Result<Decimal> {
        let mut sum = Decimal::ZERO;
        for entry in self.customer_entries(tenant, customer)? {
            sum += entry.amount;
        }
        Ok(sum)
    }

    /// Authoritative balance: sum of all entry amounts for the customer
    pub fn balance(&self, tenant: &TenantId, customer: &CustomerId) -> Result<Decimal> {
        self.sum_customer_entries(tenant, customer)
    }

    /// Cached running balance, if any entry has ever been committed
    pub fn cached_balance(&self, tenant: &TenantId, customer: &CustomerId) -> Result<Option<Decimal>> {
        let cf = self.cf_handle(CF_BALANCES)?;
        match self.db.get_cf(cf, Self::balance_key(tenant, customer))? {
            Some(value) => Ok(Some(bincode::deserialize(&value)?)),
            None => Ok(None),
        }
    }

    /// Recompute the balance from full history and verify the cache agrees
    pub fn reconcile_balance(&self, tenant: &TenantId, customer: &CustomerId) -> Result<Decimal> {
        let derived = self.sum_customer_entries(tenant, customer)?;

        if let Some(cached) = self.cached_balance(tenant, customer)? {
            if cached != derived {
                return Err(Error::InvariantViolation(format!(
                    "Balance cache for {}/{} diverged: cached {}, derived {}",
                    tenant, customer, cached, derived
                )));
            }
        }

        Ok(derived)
    }

    /// Paginated ledger history, newest first
    pub fn ledger_history(
        &self,
        tenant: &TenantId,
        customer: &CustomerId,
        page: u32,
        limit: u32,
    ) -> Result<LedgerPage> {
        let page = page.max(1);
        let limit = limit.max(1);

        let ids = self.customer_entry_ids(tenant, customer)?;
        let total = ids.len() as u64;
        let total_pages = ((total + limit as u64 - 1) / limit as u64) as u32;

        let skip = (page as usize - 1) * limit as usize;
        let mut entries = Vec::new();
        for id in ids.iter().rev().skip(skip).take(limit as usize) {
            entries.push(self.get_entry(*id)?);
        }

        Ok(LedgerPage {
            entries,
            page,
            limit,
            total,
            total_pages,
        })
    }

    // Transaction metadata (reversal back-reference only)

    /// Replace a transaction's metadata. Ledger entries are immutable; this
    /// is the single sanctioned mutation, used to mark reversals.
    pub fn set_transaction_metadata(&self, transaction_id: Uuid, metadata: TransactionMetadata) -> Result<()> {
        let _guard = self.write_lock.lock();

        let mut tx = self.get_transaction(transaction_id)?;
        tx.metadata = metadata;

        let cf = self.cf_handle(CF_TRANSACTIONS)?;
        self.db.put_cf(cf, tx.id.as_bytes(), bincode::serialize(&tx)?)?;
        Ok(())
    }

    // Outbox queue (dispatcher-owned mutations)

    /// Get outbox event by ID
    pub fn get_event(&self, event_id: Uuid) -> Result<OutboxEvent> {
        let cf = self.cf_handle(CF_OUTBOX)?;
        let value = self
            .db
            .get_cf(cf, event_id.as_bytes())?
            .ok_or_else(|| Error::EventNotFound(event_id.to_string()))?;
        Ok(serde_json::from_slice(&value)?)
    }

    /// Up to `limit` PENDING events, oldest first
    pub fn fetch_pending_events(&self, limit: usize) -> Result<Vec<OutboxEvent>> {
        let cf_indices = self.cf_handle(CF_INDICES)?;
        let prefix = b"obp|".to_vec();

        let iter = self
            .db
            .iterator_cf(cf_indices, IteratorMode::From(&prefix, rocksdb::Direction::Forward));

        let mut events = Vec::new();
        for item in iter {
            let (key, _) = item?;
            if !key.starts_with(&prefix) || events.len() >= limit {
                break;
            }
            let event = self.get_event(Self::uuid_from_bytes(&key[prefix.len()..])?)?;
            if event.status == OutboxStatus::Pending {
                events.push(event);
            }
        }
        Ok(events)
    }

    /// Number of events still awaiting dispatch
    pub fn pending_event_count(&self) -> Result<u64> {
        let cf_indices = self.cf_handle(CF_INDICES)?;
        let prefix = b"obp|".to_vec();

        let iter = self
            .db
            .iterator_cf(cf_indices, IteratorMode::From(&prefix, rocksdb::Direction::Forward));

        let mut count = 0u64;
        for item in iter {
            let (key, _) = item?;
            if !key.starts_with(&prefix) {
                break;
            }
            count += 1;
        }
        Ok(count)
    }

    /// Transition an event PENDING -> PUBLISHED and remove it from the queue
    pub fn mark_event_published(&self, event_id: Uuid, published_at: DateTime<Utc>) -> Result<()> {
        let mut event = self.get_event(event_id)?;
        event.status = OutboxStatus::Published;
        event.published_at = Some(published_at);

        let mut batch = WriteBatch::default();
        let cf_outbox = self.cf_handle(CF_OUTBOX)?;
        batch.put_cf(cf_outbox, event.id.as_bytes(), serde_json::to_vec(&event)?);
        let cf_indices = self.cf_handle(CF_INDICES)?;
        batch.delete_cf(cf_indices, Self::pending_key(event.id));
        self.db.write(batch)?;

        Ok(())
    }

    /// Record a failed publish attempt: bump the retry count, and flip to
    /// FAILED (terminal) once the budget is exhausted. Returns the resulting
    /// status.
    pub fn record_event_failure(&self, event_id: Uuid, max_retries: u32) -> Result<OutboxStatus> {
        let mut event = self.get_event(event_id)?;
        event.retry_count += 1;

        let mut batch = WriteBatch::default();
        if event.retry_count >= max_retries {
            event.status = OutboxStatus::Failed;
            let cf_indices = self.cf_handle(CF_INDICES)?;
            batch.delete_cf(cf_indices, Self::pending_key(event.id));
        }

        let cf_outbox = self.cf_handle(CF_OUTBOX)?;
        batch.put_cf(cf_outbox, event.id.as_bytes(), serde_json::to_vec(&event)?);
        self.db.write(batch)?;

        Ok(event.status)
    }

    fn uuid_from_bytes(bytes: &[u8]) -> Result<Uuid> {
        let arr: [u8; 16] = bytes
            .try_into()
            .map_err(|_| Error::Storage("Malformed UUID in index".to_string()))?;
        Ok(Uuid::from_bytes(arr))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{EventPayload, StagedEntry, TransactionKind, TransactionStatus};
    use tempfile::TempDir;

    fn test_storage() -> (Storage, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let mut config = Config::default();
        config.data_dir = temp_dir.path().to_path_buf();
        (Storage::open(&config).unwrap(), temp_dir)
    }

    fn issue_unit(tenant: &str, customer: &str, amount: i64, key: &str) -> CommitUnit {
        let tenant_id = TenantId::new(tenant);
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

    #[test]
    fn test_commit_and_replay() {
        let (storage, _temp) = test_storage();

        let outcome = storage.commit_unit(issue_unit("t1", "c1", 50, "k1")).unwrap();
        assert!(!outcome.is_replay());
        assert_eq!(outcome.balance_after(), Decimal::from(50));

        // Same key replays without writing a second entry
        let replay = storage.commit_unit(issue_unit("t1", "c1", 50, "k1")).unwrap();
        assert!(replay.is_replay());
        assert_eq!(replay.entry_id(), outcome.entry_id());
        assert_eq!(replay.balance_after(), Decimal::from(50));

        let tenant = TenantId::new("t1");
        let customer = CustomerId::new("c1");
        assert_eq!(storage.customer_entries(&tenant, &customer).unwrap().len(), 1);
        assert_eq!(storage.balance(&tenant, &customer).unwrap(), Decimal::from(50));
    }

    #[test]
    fn test_idempotency_scoped_per_tenant_and_operation() {
        let (storage, _temp) = test_storage();

        // Same raw key, different tenants: both apply
        storage.commit_unit(issue_unit("t1", "c1", 10, "shared")).unwrap();
        let other = storage.commit_unit(issue_unit("t2", "c1", 10, "shared")).unwrap();
        assert!(!other.is_replay());

        // Same tenant + key, different operation: applies
        let mut unit = issue_unit("t1", "c1", -10, "shared");
        unit.entry.operation = OperationType::ManualAdjustment;
        unit.transaction.kind = TransactionKind::Redeem;
        let adjusted = storage.commit_unit(unit).unwrap();
        assert!(!adjusted.is_replay());
    }

    #[test]
    fn test_min_balance_aborts_whole_unit() {
        let (storage, _temp) = test_storage();
        storage.commit_unit(issue_unit("t1", "c1", 50, "k1")).unwrap();

        let mut unit = issue_unit("t1", "c1", -100, "k2");
        unit.entry.operation = OperationType::Redeem;
        unit.transaction.kind = TransactionKind::Redeem;
        unit.transaction.amount = Decimal::from(100);
        unit.min_balance = Some(Decimal::from(100));

        let err = storage.commit_unit(unit).unwrap_err();
        assert!(matches!(err, Error::InsufficientBalance { .. }));

        // Nothing was written: no entry, no transaction, no outbox event
        let tenant = TenantId::new("t1");
        let customer = CustomerId::new("c1");
        assert_eq!(storage.customer_entries(&tenant, &customer).unwrap().len(), 1);
        assert!(storage.find_transaction_by_key(&tenant, "k2").unwrap().is_none());
        assert_eq!(storage.fetch_pending_events(100).unwrap().len(), 1);
        assert_eq!(storage.balance(&tenant, &customer).unwrap(), Decimal::from(50));
    }

    #[test]
    fn test_zero_amount_rejected() {
        let (storage, _temp) = test_storage();
        let err = storage.commit_unit(issue_unit("t1", "c1", 0, "k1")).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn test_outbox_lifecycle() {
        let (storage, _temp) = test_storage();
        storage.commit_unit(issue_unit("t1", "c1", 50, "k1")).unwrap();
        storage.commit_unit(issue_unit("t1", "c2", 60, "k2")).unwrap();

        let pending = storage.fetch_pending_events(100).unwrap();
        assert_eq!(pending.len(), 2);
        // Oldest first
        assert!(pending[0].created_at <= pending[1].created_at);

        storage.mark_event_published(pending[0].id, Utc::now()).unwrap();
        let published = storage.get_event(pending[0].id).unwrap();
        assert_eq!(published.status, OutboxStatus::Published);
        assert!(published.published_at.is_some());
        assert_eq!(storage.fetch_pending_events(100).unwrap().len(), 1);

        // Failure accounting: PENDING until the budget, then FAILED
        let status = storage.record_event_failure(pending[1].id, 3).unwrap();
        assert_eq!(status, OutboxStatus::Pending);
        let status = storage.record_event_failure(pending[1].id, 3).unwrap();
        assert_eq!(status, OutboxStatus::Pending);
        let status = storage.record_event_failure(pending[1].id, 3).unwrap();
        assert_eq!(status, OutboxStatus::Failed);
        assert!(storage.fetch_pending_events(100).unwrap().is_empty());
    }

    #[test]
    fn test_ledger_history_pagination() {
        let (storage, _temp) = test_storage();
        for i in 0..5 {
            storage
                .commit_unit(issue_unit("t1", "c1", 10 + i, &format!("k{}", i)))
                .unwrap();
        }

        let tenant = TenantId::new("t1");
        let customer = CustomerId::new("c1");
        let page = storage.ledger_history(&tenant, &customer, 1, 2).unwrap();
        assert_eq!(page.total, 5);
        assert_eq!(page.total_pages, 3);
        assert_eq!(page.entries.len(), 2);
        // Newest first
        assert_eq!(page.entries[0].amount, Decimal::from(14));
        assert_eq!(page.entries[1].amount, Decimal::from(13));

        let last = storage.ledger_history(&tenant, &customer, 3, 2).unwrap();
        assert_eq!(last.entries.len(), 1);
        assert_eq!(last.entries[0].amount, Decimal::from(10));
    }

    #[test]
    fn test_balance_cache_reconciles() {
        let (storage, _temp) = test_storage();
        storage.commit_unit(issue_unit("t1", "c1", 50, "k1")).unwrap();
        storage.commit_unit(issue_unit("t1", "c1", 60, "k2")).unwrap();

        let tenant = TenantId::new("t1");
        let customer = CustomerId::new("c1");
        let reconciled = storage.reconcile_balance(&tenant, &customer).unwrap();
        assert_eq!(reconciled, Decimal::from(110));
        assert_eq!(storage.cached_balance(&tenant, &customer).unwrap(), Some(Decimal::from(110)));
    }

    #[test]
    fn test_transaction_metadata_update() {
        let (storage, _temp) = test_storage();
        let unit = issue_unit("t1", "c1", 50, "k1");
        let tx_id = unit.transaction.id;
        storage.commit_unit(unit).unwrap();

        let mut metadata = storage.get_transaction(tx_id).unwrap().metadata;
        metadata.reversed = true;
        metadata.reversal_transaction_id = Some(Uuid::now_v7());
        storage.set_transaction_metadata(tx_id, metadata).unwrap();

        let tx = storage.get_transaction(tx_id).unwrap();
        assert!(tx.metadata.reversed);
        assert!(tx.metadata.reversal_transaction_id.is_some());
    }
}
