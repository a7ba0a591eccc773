//! Post-commit collaborator hooks
//!
//! Audit, fraud-signal, and milestone trackers run after the atomic unit has
//! committed: best-effort and fire-and-forget. A hook failure never rolls
//! back or delays the business operation.

use async_trait::async_trait;
use ledger_core::{CustomerId, TenantId};

/// Audit logger seam for privileged mutations
#[async_trait]
pub trait AuditLog: Send + Sync {
    /// Record one privileged action. Infallible from the caller's view.
    async fn log(
        &self,
        tenant: &TenantId,
        user_id: &str,
        action: &str,
        resource_type: &str,
        resource_id: &str,
        metadata: serde_json::Value,
    );
}

/// Fraud-signal and milestone tracker seam
#[async_trait]
pub trait EngagementHooks: Send + Sync {
    /// A device scan led to an issuance
    async fn scan_recorded(&self, tenant: &TenantId, device_id: Option<&str>, customer: &CustomerId);

    /// A redemption attempt finished (success or insufficient balance)
    async fn redemption_recorded(&self, tenant: &TenantId, customer: &CustomerId, success: bool);

    /// A tenant milestone was reached (e.g. first scan)
    async fn milestone_reached(&self, tenant: &TenantId, milestone: &str);
}

/// No-op implementation for embedding without trackers
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopHooks;

#[async_trait]
impl AuditLog for NoopHooks {
    async fn log(
        &self,
        tenant: &TenantId,
        user_id: &str,
        action: &str,
        _resource_type: &str,
        resource_id: &str,
        _metadata: serde_json::Value,
    ) {
        tracing::debug!(%tenant, user_id, action, resource_id, "Audit (noop)");
    }
}

#[async_trait]
impl EngagementHooks for NoopHooks {
    async fn scan_recorded(&self, _tenant: &TenantId, _device_id: Option<&str>, _customer: &CustomerId) {}

    async fn redemption_recorded(&self, _tenant: &TenantId, _customer: &CustomerId, _success: bool) {}

    async fn milestone_reached(&self, _tenant: &TenantId, _milestone: &str) {}
}
