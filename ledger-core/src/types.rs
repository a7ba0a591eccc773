//! Core types for the points ledger
//!
//! All types are designed for:
//! - Deterministic serialization (bincode for records, JSON for outbox payloads)
//! - Exact arithmetic (Decimal for point amounts)
//! - Append-only history (ledger entries are never updated or deleted)

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Schema version stamped on every outbox event envelope so consumers can
/// evolve independently of producers.
pub const EVENT_SCHEMA_VERSION: u32 = 1;

/// Tenant identifier (opaque, supplied by the tenancy resolver)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TenantId(String);

impl TenantId {
    /// Create new tenant ID
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get as string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Customer identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CustomerId(String);

impl CustomerId {
    /// Create new customer ID
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get as string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CustomerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Kind of ledger movement an entry records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum OperationType {
    /// Generic transaction
    Transaction = 1,
    /// Privileged manual adjustment (signed, may drive balance negative)
    ManualAdjustment = 2,
    /// Reward redemption (negative amount)
    Redeem = 3,
    /// Point issuance (positive amount)
    Issue = 4,
}

impl OperationType {
    /// Stable single-byte code used in composite index keys
    pub(crate) fn code(&self) -> u8 {
        *self as u8
    }
}

/// One immutable, signed point-balance movement.
///
/// At most one entry exists per `(tenant_id, idempotency_key, operation)`;
/// `balance_after` equals the sum of all prior entries for the customer in
/// creation order plus this entry's amount.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// Unique entry ID (UUIDv7 for time-ordering)
    pub id: Uuid,

    /// Owning tenant
    pub tenant_id: TenantId,

    /// Customer whose balance moved
    pub customer_id: CustomerId,

    /// Transaction this entry belongs to
    pub transaction_id: Uuid,

    /// Signed movement (positive = issue, negative = redeem)
    pub amount: Decimal,

    /// Balance after applying this entry
    pub balance_after: Decimal,

    /// Client-supplied idempotency key
    pub idempotency_key: String,

    /// Movement kind
    pub operation: OperationType,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

/// Business-level transaction kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionKind {
    /// Points issued to a customer
    Issue,
    /// Points deducted from a customer
    Redeem,
}

/// Transaction outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionStatus {
    /// Applied and durable
    Completed,
    /// Terminal failure recorded by an operator
    Failed,
}

/// Adjustment provenance carried on manually adjusted transactions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdjustmentInfo {
    /// Operator-supplied reason
    pub reason: String,
    /// Acting user
    pub adjusted_by: String,
}

/// Mutable transaction annotations.
///
/// The only part of a transaction that is ever updated after commit: the
/// reversal back-reference written by `reverse_transaction`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TransactionMetadata {
    /// Present when the transaction was created by a manual adjustment
    pub adjustment: Option<AdjustmentInfo>,

    /// True once a reversal has been applied against this transaction
    pub reversed: bool,

    /// Transaction that reversed this one
    pub reversal_transaction_id: Option<Uuid>,

    /// Reason supplied with the reversal
    pub reversal_reason: Option<String>,

    /// When the reversal was applied
    pub reversed_at: Option<DateTime<Utc>>,
}

/// Business-level record of one mutation attempt.
///
/// Created and finalized atomically with its ledger entry; maps 1:1 to a
/// ledger entry via idempotency key + operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionRecord {
    /// Unique transaction ID
    pub id: Uuid,

    /// Owning tenant
    pub tenant_id: TenantId,

    /// Customer
    pub customer_id: CustomerId,

    /// Issue or redeem
    pub kind: TransactionKind,

    /// Unsigned magnitude of the movement
    pub amount: Decimal,

    /// Outcome
    pub status: TransactionStatus,

    /// Client-supplied idempotency key
    pub idempotency_key: String,

    /// Device that originated the request, if any
    pub device_id: Option<String>,

    /// Mutable annotations (adjustment provenance, reversal markers)
    pub metadata: TransactionMetadata,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

impl TransactionRecord {
    /// Signed amount: positive for issues, negative for redemptions
    pub fn signed_amount(&self) -> Decimal {
        match self.kind {
            TransactionKind::Issue => self.amount,
            TransactionKind::Redeem => -self.amount,
        }
    }
}

/// Redemption outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RedemptionStatus {
    /// Points deducted, reward owed
    Completed,
    /// Terminal failure
    Failed,
}

/// Record of a reward-redemption attempt, tied 1:1 to a Redeem transaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Redemption {
    /// Unique redemption ID
    pub id: Uuid,

    /// Owning tenant
    pub tenant_id: TenantId,

    /// Customer
    pub customer_id: CustomerId,

    /// Reward being redeemed
    pub reward_id: String,

    /// Points deducted (unsigned magnitude)
    pub points_deducted: Decimal,

    /// Outcome
    pub status: RedemptionStatus,

    /// Client-supplied idempotency key
    pub idempotency_key: String,

    /// When the redemption completed
    pub completed_at: Option<DateTime<Utc>>,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

/// Event kind, determining the publish topic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    /// Points were issued (or adjusted upward)
    PointsIssued,
    /// Points were redeemed (or adjusted downward)
    PointsRedeemed,
}

impl EventKind {
    /// Deterministic per-event-type topic
    pub fn topic(&self) -> &'static str {
        match self {
            EventKind::PointsIssued => "loyalty.points.issued",
            EventKind::PointsRedeemed => "loyalty.points.redeemed",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.topic())
    }
}

/// Typed outbox payload, one variant per event shape.
///
/// Serialized as the wire JSON consumers see: camelCase fields plus a `type`
/// discriminator tag.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventPayload {
    /// Published on `loyalty.points.issued`
    #[serde(rename_all = "camelCase")]
    PointsIssued {
        /// Transaction that issued the points
        transaction_id: Uuid,
        /// Customer credited
        customer_id: CustomerId,
        /// Points issued
        amount: Decimal,
        /// Balance after the issuance
        balance_after: Decimal,
        /// Originating device, if any
        device_id: Option<String>,
        /// Idempotency key of the originating request
        idempotency_key: String,
    },

    /// Published on `loyalty.points.redeemed`
    #[serde(rename_all = "camelCase")]
    PointsRedeemed {
        /// Redemption record
        redemption_id: Uuid,
        /// Transaction that deducted the points
        transaction_id: Uuid,
        /// Customer debited
        customer_id: CustomerId,
        /// Reward redeemed
        reward_id: String,
        /// Points deducted
        points_deducted: Decimal,
        /// Balance after the redemption
        balance_after: Decimal,
        /// Idempotency key of the originating request
        idempotency_key: String,
    },

    /// Published on the topic matching the adjustment's sign
    #[serde(rename_all = "camelCase")]
    ManualAdjustment {
        /// Adjustment transaction
        transaction_id: Uuid,
        /// Customer adjusted
        customer_id: CustomerId,
        /// Signed adjustment amount
        amount: Decimal,
        /// Balance after the adjustment
        balance_after: Decimal,
        /// Operator-supplied reason
        reason: String,
        /// Acting user
        adjusted_by: String,
        /// Idempotency key of the originating request
        idempotency_key: String,
    },
}

impl EventPayload {
    /// Topic the payload publishes under; adjustments route by sign
    pub fn kind(&self) -> EventKind {
        match self {
            EventPayload::PointsIssued { .. } => EventKind::PointsIssued,
            EventPayload::PointsRedeemed { .. } => EventKind::PointsRedeemed,
            EventPayload::ManualAdjustment { amount, .. } => {
                if amount.is_sign_positive() {
                    EventKind::PointsIssued
                } else {
                    EventKind::PointsRedeemed
                }
            }
        }
    }

    /// Patch the derived balance into the payload at commit time.
    ///
    /// The orchestrator stages the payload before the balance is known; the
    /// storage layer fills it in from the entry it just derived.
    pub(crate) fn set_balance_after(&mut self, balance: Decimal) {
        match self {
            EventPayload::PointsIssued { balance_after, .. }
            | EventPayload::PointsRedeemed { balance_after, .. }
            | EventPayload::ManualAdjustment { balance_after, .. } => {
                *balance_after = balance;
            }
        }
    }
}

/// Outbox delivery state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutboxStatus {
    /// Awaiting dispatch
    Pending,
    /// Delivered to the message bus (terminal)
    Published,
    /// Retry budget exhausted (terminal, operator concern)
    Failed,
}

/// Durable record of a domain fact to publish.
///
/// Created only inside a commit unit, alongside the ledger entry it reports
/// on; mutated only by the outbox dispatcher thereafter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboxEvent {
    /// Unique event ID (UUIDv7; the pending queue drains in id order)
    pub id: Uuid,

    /// Owning tenant
    pub tenant_id: TenantId,

    /// Publish topic selector
    pub kind: EventKind,

    /// Envelope schema version
    pub schema_version: u32,

    /// Typed payload
    pub payload: EventPayload,

    /// Delivery state
    pub status: OutboxStatus,

    /// Failed publish attempts so far
    pub retry_count: u32,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// When the event was published
    pub published_at: Option<DateTime<Utc>>,
}

/// Ledger entry staged for commit (id, balance and timestamp assigned by the
/// storage layer)
#[derive(Debug, Clone)]
pub struct StagedEntry {
    /// Customer whose balance moves
    pub customer_id: CustomerId,

    /// Signed movement
    pub amount: Decimal,

    /// Client-supplied idempotency key
    pub idempotency_key: String,

    /// Movement kind
    pub operation: OperationType,
}

/// One atomic unit: everything a business operation persists, committed in a
/// single write batch. If the commit succeeds the outbox event is durable; if
/// it aborts nothing exists.
#[derive(Debug, Clone)]
pub struct CommitUnit {
    /// Owning tenant
    pub tenant_id: TenantId,

    /// Transaction record to create
    pub transaction: TransactionRecord,

    /// Redemption record to create (redeem flow only)
    pub redemption: Option<Redemption>,

    /// Ledger entry to append
    pub entry: StagedEntry,

    /// Outbox payload to persist alongside the entry
    pub payload: EventPayload,

    /// Balance floor checked inside the unit: the commit aborts with
    /// InsufficientBalance when the current balance is below this
    pub min_balance: Option<Decimal>,
}

/// Result of committing a unit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
    /// The unit was written
    Applied {
        /// Ledger entry created
        entry_id: Uuid,
        /// Balance after the entry
        balance_after: Decimal,
    },
    /// An entry already existed for the idempotency key; nothing was written
    /// and the winning entry's result is returned
    Replayed {
        /// Pre-existing ledger entry
        entry_id: Uuid,
        /// Its recorded balance
        balance_after: Decimal,
    },
}

impl CommitOutcome {
    /// Ledger entry id, whether applied or replayed
    pub fn entry_id(&self) -> Uuid {
        match self {
            CommitOutcome::Applied { entry_id, .. } | CommitOutcome::Replayed { entry_id, .. } => {
                *entry_id
            }
        }
    }

    /// Balance after the entry, whether applied or replayed
    pub fn balance_after(&self) -> Decimal {
        match self {
            CommitOutcome::Applied { balance_after, .. }
            | CommitOutcome::Replayed { balance_after, .. } => *balance_after,
        }
    }

    /// True when the unit hit an existing entry instead of writing
    pub fn is_replay(&self) -> bool {
        matches!(self, CommitOutcome::Replayed { .. })
    }
}

/// One page of ledger history, newest first
#[derive(Debug, Clone, Serialize)]
pub struct LedgerPage {
    /// Entries on this page
    pub entries: Vec<LedgerEntry>,

    /// Page number (1-based)
    pub page: u32,

    /// Page size
    pub limit: u32,

    /// Total entries for the customer
    pub total: u64,

    /// Total pages at this limit
    pub total_pages: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signed_amount() {
        let mut tx = TransactionRecord {
            id: Uuid::now_v7(),
            tenant_id: TenantId::new("t1"),
            customer_id: CustomerId::new("c1"),
            kind: TransactionKind::Issue,
            amount: Decimal::from(50),
            status: TransactionStatus::Completed,
            idempotency_key: "k1".to_string(),
            device_id: None,
            metadata: TransactionMetadata::default(),
            created_at: Utc::now(),
        };

        assert_eq!(tx.signed_amount(), Decimal::from(50));

        tx.kind = TransactionKind::Redeem;
        assert_eq!(tx.signed_amount(), Decimal::from(-50));
    }

    #[test]
    fn test_adjustment_payload_routes_by_sign() {
        let payload = EventPayload::ManualAdjustment {
            transaction_id: Uuid::now_v7(),
            customer_id: CustomerId::new("c1"),
            amount: Decimal::from(-20),
            balance_after: Decimal::ZERO,
            reason: "damaged goods".to_string(),
            adjusted_by: "ops".to_string(),
            idempotency_key: "k1".to_string(),
        };
        assert_eq!(payload.kind(), EventKind::PointsRedeemed);

        let payload = EventPayload::ManualAdjustment {
            transaction_id: Uuid::now_v7(),
            customer_id: CustomerId::new("c1"),
            amount: Decimal::from(20),
            balance_after: Decimal::ZERO,
            reason: "goodwill".to_string(),
            adjusted_by: "ops".to_string(),
            idempotency_key: "k2".to_string(),
        };
        assert_eq!(payload.kind(), EventKind::PointsIssued);
    }

    #[test]
    fn test_payload_wire_shape() {
        let payload = EventPayload::PointsIssued {
            transaction_id: Uuid::now_v7(),
            customer_id: CustomerId::new("c1"),
            amount: Decimal::from(50),
            balance_after: Decimal::from(50),
            device_id: Some("d1".to_string()),
            idempotency_key: "k1".to_string(),
        };

        let value = serde_json::to_value(&payload).unwrap();
        assert_eq!(value["type"], "POINTS_ISSUED");
        assert!(value["transactionId"].is_string());
        assert_eq!(value["customerId"], "c1");
        assert_eq!(value["deviceId"], "d1");
    }

    #[test]
    fn test_event_kind_topics() {
        assert_eq!(EventKind::PointsIssued.topic(), "loyalty.points.issued");
        assert_eq!(EventKind::PointsRedeemed.topic(), "loyalty.points.redeemed");
    }
}
