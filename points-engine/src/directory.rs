//! Reference-data lookups
//!
//! Customers, devices, and rewards are owned by external collaborators; the
//! orchestrator only needs existence and activity checks. `None` from any
//! lookup is a terminal NotFound for the enclosing operation.

use async_trait::async_trait;
use ledger_core::{CustomerId, TenantId};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use std::collections::HashMap;

/// Customer reference
#[derive(Debug, Clone)]
pub struct CustomerRef {
    /// Customer ID
    pub id: CustomerId,
}

/// Device reference
#[derive(Debug, Clone)]
pub struct DeviceRef {
    /// Device ID
    pub id: String,

    /// Location the device is installed at
    pub location_id: Option<String>,

    /// Active flag; inactive devices cannot originate issuances
    pub is_active: bool,
}

/// Reward reference
#[derive(Debug, Clone)]
pub struct RewardRef {
    /// Reward ID
    pub id: String,

    /// Display name
    pub name: String,

    /// Points required to redeem
    pub points_required: Decimal,

    /// Active flag
    pub is_active: bool,
}

/// Reference-data collaborator seam
#[async_trait]
pub trait ReferenceDirectory: Send + Sync {
    /// Find a customer known to the tenant
    async fn find_customer(&self, tenant: &TenantId, customer: &CustomerId) -> Option<CustomerRef>;

    /// Find an active device belonging to the tenant
    async fn find_active_device(&self, tenant: &TenantId, device_id: &str) -> Option<DeviceRef>;

    /// Find an active reward belonging to the tenant
    async fn find_active_reward(&self, tenant: &TenantId, reward_id: &str) -> Option<RewardRef>;
}

/// In-memory directory for tests and embedded use
#[derive(Default)]
pub struct InMemoryDirectory {
    customers: Mutex<HashMap<(String, String), CustomerRef>>,
    devices: Mutex<HashMap<(String, String), DeviceRef>>,
    rewards: Mutex<HashMap<(String, String), RewardRef>>,
}

impl InMemoryDirectory {
    /// Create empty directory
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a customer with a tenant
    pub fn add_customer(&self, tenant: &TenantId, customer: &CustomerId) {
        self.customers.lock().insert(
            (tenant.as_str().to_string(), customer.as_str().to_string()),
            CustomerRef {
                id: customer.clone(),
            },
        );
    }

    /// Register a device with a tenant
    pub fn add_device(&self, tenant: &TenantId, device: DeviceRef) {
        self.devices
            .lock()
            .insert((tenant.as_str().to_string(), device.id.clone()), device);
    }

    /// Register a reward with a tenant
    pub fn add_reward(&self, tenant: &TenantId, reward: RewardRef) {
        self.rewards
            .lock()
            .insert((tenant.as_str().to_string(), reward.id.clone()), reward);
    }
}

#[async_trait]
impl ReferenceDirectory for InMemoryDirectory {
    async fn find_customer(&self, tenant: &TenantId, customer: &CustomerId) -> Option<CustomerRef> {
        self.customers
            .lock()
            .get(&(tenant.as_str().to_string(), customer.as_str().to_string()))
            .cloned()
    }

    async fn find_active_device(&self, tenant: &TenantId, device_id: &str) -> Option<DeviceRef> {
        self.devices
            .lock()
            .get(&(tenant.as_str().to_string(), device_id.to_string()))
            .filter(|d| d.is_active)
            .cloned()
    }

    async fn find_active_reward(&self, tenant: &TenantId, reward_id: &str) -> Option<RewardRef> {
        self.rewards
            .lock()
            .get(&(tenant.as_str().to_string(), reward_id.to_string()))
            .filter(|r| r.is_active)
            .cloned()
    }
}
