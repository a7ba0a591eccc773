//! Request/response types for the transaction orchestrator

use ledger_core::{RedemptionStatus, TransactionKind, TransactionStatus};
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

/// Outcome of an issuance, definite whether fresh or replayed
#[derive(Debug, Clone, Serialize)]
pub struct IssueReceipt {
    /// Transaction ID
    pub id: Uuid,

    /// Transaction kind (always Issue for issuance)
    pub kind: TransactionKind,

    /// Points issued (magnitude)
    pub amount: Decimal,

    /// Transaction status
    pub status: TransactionStatus,

    /// Customer balance after the operation
    pub balance: Decimal,
}

/// Outcome of a redemption
#[derive(Debug, Clone, Serialize)]
pub struct RedemptionReceipt {
    /// Redemption ID
    pub id: Uuid,

    /// Redemption status
    pub status: RedemptionStatus,

    /// Points deducted (magnitude)
    pub points_deducted: Decimal,

    /// Customer balance after the operation
    pub balance: Decimal,
}

/// Outcome of a manual adjustment or reversal
#[derive(Debug, Clone, Serialize)]
pub struct AdjustmentReceipt {
    /// Adjustment transaction ID
    pub transaction_id: Uuid,

    /// Signed adjustment amount
    pub amount: Decimal,

    /// Customer balance after the adjustment
    pub balance_after: Decimal,
}
