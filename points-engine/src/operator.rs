//! Operator tools: manual adjustments and reversals
//!
//! Privileged operations (authorization is an external concern). Adjustments
//! may drive a balance negative; reversals are compensating entries with
//! inverted sign, never mutations of the original transaction.

use crate::{
    directory::ReferenceDirectory, hooks::AuditLog, types::AdjustmentReceipt, Error, Result,
};
use chrono::Utc;
use ledger_core::{
    CommitUnit, CustomerId, EventPayload, Ledger, OperationType, StagedEntry, TenantId,
    TransactionKind, TransactionMetadata, TransactionRecord, TransactionStatus,
};
use rust_decimal::Decimal;
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

/// Operator-facing orchestrator for privileged mutations
pub struct OperatorTools {
    ledger: Arc<Ledger>,
    directory: Arc<dyn ReferenceDirectory>,
    audit: Arc<dyn AuditLog>,
}

impl OperatorTools {
    /// Create new operator tools
    pub fn new(
        ledger: Arc<Ledger>,
        directory: Arc<dyn ReferenceDirectory>,
        audit: Arc<dyn AuditLog>,
    ) -> Self {
        Self {
            ledger,
            directory,
            audit,
        }
    }

    /// Manually credit or debit a customer.
    ///
    /// No balance floor applies: a negative adjustment may take the balance
    /// below zero.
    pub async fn manual_adjustment(
        &self,
        tenant: &TenantId,
        customer: &CustomerId,
        amount: Decimal,
        reason: &str,
        user_id: &str,
        idempotency_key: &str,
    ) -> Result<AdjustmentReceipt> {
        if amount.is_zero() {
            return Err(Error::Validation("Adjustment amount must be nonzero".to_string()));
        }

        self.directory
            .find_customer(tenant, customer)
            .await
            .ok_or_else(|| {
                Error::NotFound(format!("Customer {} not found for this tenant", customer))
            })?;

        let transaction = TransactionRecord {
            id: Uuid::now_v7(),
            tenant_id: tenant.clone(),
            customer_id: customer.clone(),
            kind: if amount > Decimal::ZERO {
                TransactionKind::Issue
            } else {
                TransactionKind::Redeem
            },
            amount: amount.abs(),
            status: TransactionStatus::Completed,
            idempotency_key: idempotency_key.to_string(),
            device_id: None,
            metadata: TransactionMetadata {
                adjustment: Some(ledger_core::types::AdjustmentInfo {
                    reason: reason.to_string(),
                    adjusted_by: user_id.to_string(),
                }),
                ..Default::default()
            },
            created_at: Utc::now(),
        };

        let unit = CommitUnit {
            tenant_id: tenant.clone(),
            payload: EventPayload::ManualAdjustment {
                transaction_id: transaction.id,
                customer_id: customer.clone(),
                amount,
                balance_after: Decimal::ZERO,
                reason: reason.to_string(),
                adjusted_by: user_id.to_string(),
                idempotency_key: idempotency_key.to_string(),
            },
            entry: StagedEntry {
                customer_id: customer.clone(),
                amount,
                idempotency_key: idempotency_key.to_string(),
                operation: OperationType::ManualAdjustment,
            },
            redemption: None,
            transaction,
            min_balance: None,
        };

        let outcome = self.ledger.commit(unit).await?;

        // On a replay the staged record lost the race; serve the winner's id
        let transaction_id = self
            .ledger
            .find_transaction_by_key(tenant, idempotency_key)?
            .ok_or_else(|| {
                Error::Ledger(ledger_core::Error::InvariantViolation(format!(
                    "Transaction missing after commit for key {}",
                    idempotency_key
                )))
            })?
            .id;

        tracing::info!(
            %tenant,
            %customer,
            %transaction_id,
            %amount,
            reason,
            adjusted_by = user_id,
            balance = %outcome.balance_after(),
            replay = outcome.is_replay(),
            "Manual adjustment applied"
        );

        self.audit_log(
            tenant,
            user_id,
            "MANUAL_ADJUSTMENT",
            "transaction",
            &transaction_id.to_string(),
            json!({
                "customerId": customer.as_str(),
                "amount": amount,
                "reason": reason,
            }),
        );

        Ok(AdjustmentReceipt {
            transaction_id,
            amount,
            balance_after: outcome.balance_after(),
        })
    }

    /// Reverse a transaction with a compensating adjustment.
    ///
    /// The idempotency key derives from the transaction id alone, so retrying
    /// the same reversal replays instead of double-reversing.
    pub async fn reverse_transaction(
        &self,
        tenant: &TenantId,
        transaction_id: Uuid,
        reason: &str,
        user_id: &str,
    ) -> Result<AdjustmentReceipt> {
        let original = match self.ledger.transaction(tenant, transaction_id) {
            Ok(tx) => tx,
            Err(ledger_core::Error::TransactionNotFound(_)) => {
                return Err(Error::NotFound(format!(
                    "Transaction {} not found",
                    transaction_id
                )));
            }
            Err(e) => return Err(e.into()),
        };

        if original.status == TransactionStatus::Failed {
            return Err(Error::InvalidState(
                "Cannot reverse a failed transaction".to_string(),
            ));
        }

        let reversal_amount = -original.signed_amount();
        let reversal_key = format!("reversal-{}", transaction_id);

        let receipt = self
            .manual_adjustment(
                tenant,
                &original.customer_id,
                reversal_amount,
                &format!("Reversal of {}: {}", transaction_id, reason),
                user_id,
                &reversal_key,
            )
            .await?;

        self.ledger
            .mark_reversed(tenant, transaction_id, receipt.transaction_id, reason)
            .await?;

        self.audit_log(
            tenant,
            user_id,
            "TRANSACTION_REVERSED",
            "transaction",
            &transaction_id.to_string(),
            json!({
                "reversalTransactionId": receipt.transaction_id,
                "reason": reason,
            }),
        );

        Ok(receipt)
    }

    /// Fire-and-forget audit record; a slow or failing audit sink never rolls
    /// back the business operation
    fn audit_log(
        &self,
        tenant: &TenantId,
        user_id: &str,
        action: &str,
        resource_type: &str,
        resource_id: &str,
        metadata: serde_json::Value,
    ) {
        let audit = self.audit.clone();
        let tenant = tenant.clone();
        let user_id = user_id.to_string();
        let action = action.to_string();
        let resource_type = resource_type.to_string();
        let resource_id = resource_id.to_string();

        tokio::spawn(async move {
            audit
                .log(&tenant, &user_id, &action, &resource_type, &resource_id, metadata)
                .await;
        });
    }
}
