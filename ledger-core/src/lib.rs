//! PointsRail Ledger Core
//!
//! Append-only, multi-tenant points ledger with idempotent commits and a
//! transactional outbox.
//!
//! # Architecture
//!
//! - **Append-only**: entries are immutable facts; reversals are new entries
//! - **Single writer**: one logical writer task eliminates race conditions
//! - **Idempotency at the storage layer**: key uniqueness is checked and
//!   written inside the commit critical section, not in application logic
//! - **Outbox co-location**: every entry and its event share one write batch
//!
//! # Invariants
//!
//! - One entry per (tenant, idempotency key, operation), under any
//!   interleaving of retries
//! - `balance_after` of the newest entry equals the sum of all amounts
//! - Balance never goes negative through a redemption (adjustments may)
//! - No entry without its outbox event, and vice versa

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

pub mod actor;
pub mod config;
pub mod error;
pub mod ledger;
pub mod metrics;
pub mod storage;
pub mod types;

// Re-exports
pub use config::Config;
pub use error::{Error, Result};
pub use ledger::Ledger;
pub use storage::Storage;
pub use types::{
    CommitOutcome, CommitUnit, CustomerId, EventKind, EventPayload, LedgerEntry, LedgerPage,
    OperationType, OutboxEvent, OutboxStatus, Redemption, RedemptionStatus, StagedEntry, TenantId,
    TransactionKind, TransactionMetadata, TransactionRecord, TransactionStatus,
};
