//! Transaction orchestrator: issue and redeem
//!
//! Each operation is one atomic commit unit against the ledger: transaction
//! record, optional redemption, ledger entry, and outbox event stand or fall
//! together. Validation and idempotency short-circuits happen before the
//! unit is built, so a rejection never leaves partial state.

use crate::{
    directory::ReferenceDirectory,
    hooks::EngagementHooks,
    types::{IssueReceipt, RedemptionReceipt},
    Error, Result,
};
use chrono::Utc;
use ledger_core::{
    CommitUnit, CustomerId, EventPayload, Ledger, OperationType, Redemption, RedemptionStatus,
    StagedEntry, TenantId, TransactionKind, TransactionMetadata, TransactionRecord,
    TransactionStatus,
};
use rust_decimal::Decimal;
use std::sync::Arc;
use uuid::Uuid;

/// Milestone emitted on a customer's first issuance
pub const MILESTONE_FIRST_SCAN: &str = "first_scan";

/// Transaction orchestrator
pub struct PointsEngine {
    ledger: Arc<Ledger>,
    directory: Arc<dyn ReferenceDirectory>,
    hooks: Arc<dyn EngagementHooks>,
}

impl PointsEngine {
    /// Create new engine
    pub fn new(
        ledger: Arc<Ledger>,
        directory: Arc<dyn ReferenceDirectory>,
        hooks: Arc<dyn EngagementHooks>,
    ) -> Self {
        Self {
            ledger,
            directory,
            hooks,
        }
    }

    /// Issue points to a customer.
    ///
    /// Retrying with the same idempotency key returns the recorded outcome
    /// and current balance without issuing again.
    pub async fn issue_points(
        &self,
        tenant: &TenantId,
        customer: &CustomerId,
        amount: Decimal,
        device_id: Option<&str>,
        idempotency_key: &str,
    ) -> Result<IssueReceipt> {
        if amount <= Decimal::ZERO {
            return Err(Error::Validation(
                "Amount must be greater than 0".to_string(),
            ));
        }

        // Idempotency short-circuit
        if let Some(existing) = self.ledger.find_transaction_by_key(tenant, idempotency_key)? {
            let balance = self.ledger.balance(tenant, customer)?;
            return Ok(IssueReceipt {
                id: existing.id,
                kind: existing.kind,
                amount: existing.amount,
                status: existing.status,
                balance,
            });
        }

        // Reference validation, before any write
        self.directory
            .find_customer(tenant, customer)
            .await
            .ok_or_else(|| Error::NotFound(format!("Customer {} not found", customer)))?;

        if let Some(device_id) = device_id {
            self.directory
                .find_active_device(tenant, device_id)
                .await
                .ok_or_else(|| {
                    Error::NotFound(format!("Device {} not found or inactive", device_id))
                })?;
        }

        let first_scan = self.ledger.customer_entries(tenant, customer)?.is_empty();

        let transaction = TransactionRecord {
            id: Uuid::now_v7(),
            tenant_id: tenant.clone(),
            customer_id: customer.clone(),
            kind: TransactionKind::Issue,
            amount,
            status: TransactionStatus::Completed,
            idempotency_key: idempotency_key.to_string(),
            device_id: device_id.map(str::to_string),
            metadata: TransactionMetadata::default(),
            created_at: Utc::now(),
        };

        let unit = CommitUnit {
            tenant_id: tenant.clone(),
            payload: EventPayload::PointsIssued {
                transaction_id: transaction.id,
                customer_id: customer.clone(),
                amount,
                balance_after: Decimal::ZERO,
                device_id: device_id.map(str::to_string),
                idempotency_key: idempotency_key.to_string(),
            },
            entry: StagedEntry {
                customer_id: customer.clone(),
                amount,
                idempotency_key: idempotency_key.to_string(),
                operation: OperationType::Issue,
            },
            redemption: None,
            transaction,
            min_balance: None,
        };

        let outcome = self.ledger.commit(unit).await?;

        // A concurrent retry may have won the commit race; serve its record
        let transaction = self.recorded_transaction(tenant, idempotency_key)?;

        tracing::info!(
            %tenant,
            %customer,
            transaction_id = %transaction.id,
            %amount,
            balance = %outcome.balance_after(),
            replay = outcome.is_replay(),
            "Points issued"
        );

        if !outcome.is_replay() {
            self.track_issue(tenant, customer, device_id, first_scan);
        }

        Ok(IssueReceipt {
            id: transaction.id,
            kind: transaction.kind,
            amount: transaction.amount,
            status: transaction.status,
            balance: outcome.balance_after(),
        })
    }

    /// Redeem a reward.
    ///
    /// The balance check runs inside the atomic unit, so two concurrent
    /// redemptions cannot both succeed against a balance that only covers
    /// one.
    pub async fn redeem_points(
        &self,
        tenant: &TenantId,
        customer: &CustomerId,
        reward_id: &str,
        idempotency_key: &str,
    ) -> Result<RedemptionReceipt> {
        // Idempotency short-circuit on a completed redemption
        if let Some(existing) = self.ledger.find_redemption_by_key(tenant, idempotency_key)? {
            if existing.status == RedemptionStatus::Completed {
                let balance = self.ledger.balance(tenant, customer)?;
                return Ok(RedemptionReceipt {
                    id: existing.id,
                    status: existing.status,
                    points_deducted: existing.points_deducted,
                    balance,
                });
            }
        }

        let reward = self
            .directory
            .find_active_reward(tenant, reward_id)
            .await
            .ok_or_else(|| Error::NotFound(format!("Reward {} not found", reward_id)))?;

        let points_required = reward.points_required;
        let now = Utc::now();

        let redemption = Redemption {
            id: Uuid::now_v7(),
            tenant_id: tenant.clone(),
            customer_id: customer.clone(),
            reward_id: reward_id.to_string(),
            points_deducted: points_required,
            status: RedemptionStatus::Completed,
            idempotency_key: idempotency_key.to_string(),
            completed_at: Some(now),
            created_at: now,
        };

        // The transaction carries a derived key so the transaction-level and
        // redemption-level idempotency indexes stay disjoint
        let transaction = TransactionRecord {
            id: Uuid::now_v7(),
            tenant_id: tenant.clone(),
            customer_id: customer.clone(),
            kind: TransactionKind::Redeem,
            amount: points_required,
            status: TransactionStatus::Completed,
            idempotency_key: format!("{}-tx", idempotency_key),
            device_id: None,
            metadata: TransactionMetadata::default(),
            created_at: now,
        };

        let unit = CommitUnit {
            tenant_id: tenant.clone(),
            payload: EventPayload::PointsRedeemed {
                redemption_id: redemption.id,
                transaction_id: transaction.id,
                customer_id: customer.clone(),
                reward_id: reward_id.to_string(),
                points_deducted: points_required,
                balance_after: Decimal::ZERO,
                idempotency_key: idempotency_key.to_string(),
            },
            entry: StagedEntry {
                customer_id: customer.clone(),
                amount: -points_required,
                idempotency_key: idempotency_key.to_string(),
                operation: OperationType::Redeem,
            },
            redemption: Some(redemption),
            transaction,
            min_balance: Some(points_required),
        };

        let outcome = match self.ledger.commit(unit).await {
            Ok(outcome) => outcome,
            Err(err) => {
                if let ledger_core::Error::InsufficientBalance { .. } = err {
                    self.track_redemption(tenant, customer, false);
                }
                return Err(err.into());
            }
        };

        let redemption = self
            .ledger
            .find_redemption_by_key(tenant, idempotency_key)?
            .ok_or_else(|| {
                Error::Ledger(ledger_core::Error::InvariantViolation(format!(
                    "Redemption missing after commit for key {}",
                    idempotency_key
                )))
            })?;

        tracing::info!(
            %tenant,
            %customer,
            redemption_id = %redemption.id,
            reward_id,
            points_deducted = %redemption.points_deducted,
            balance = %outcome.balance_after(),
            replay = outcome.is_replay(),
            "Points redeemed"
        );

        if !outcome.is_replay() {
            self.track_redemption(tenant, customer, true);
        }

        Ok(RedemptionReceipt {
            id: redemption.id,
            status: redemption.status,
            points_deducted: redemption.points_deducted,
            balance: outcome.balance_after(),
        })
    }

    /// The ledger backing this engine
    pub fn ledger(&self) -> &Arc<Ledger> {
        &self.ledger
    }

    fn recorded_transaction(&self, tenant: &TenantId, key: &str) -> Result<ledger_core::TransactionRecord> {
        self.ledger
            .find_transaction_by_key(tenant, key)?
            .ok_or_else(|| {
                Error::Ledger(ledger_core::Error::InvariantViolation(format!(
                    "Transaction missing after commit for key {}",
                    key
                )))
            })
    }

    /// Post-commit trackers: best-effort, never block the response
    fn track_issue(
        &self,
        tenant: &TenantId,
        customer: &CustomerId,
        device_id: Option<&str>,
        first_scan: bool,
    ) {
        let hooks = self.hooks.clone();
        let tenant = tenant.clone();
        let customer = customer.clone();
        let device_id = device_id.map(str::to_string);

        tokio::spawn(async move {
            hooks
                .scan_recorded(&tenant, device_id.as_deref(), &customer)
                .await;
            if first_scan {
                hooks.milestone_reached(&tenant, MILESTONE_FIRST_SCAN).await;
            }
        });
    }

    fn track_redemption(&self, tenant: &TenantId, customer: &CustomerId, success: bool) {
        let hooks = self.hooks.clone();
        let tenant = tenant.clone();
        let customer = customer.clone();

        tokio::spawn(async move {
            hooks.redemption_recorded(&tenant, &customer, success).await;
        });
    }
}
