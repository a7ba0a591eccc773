//! NATS client with lazy connection

use crate::{Error, Result};
use tokio::sync::RwLock;

/// NATS connection configuration
#[derive(Debug, Clone)]
pub struct NatsConfig {
    /// Server URL
    pub url: String,
}

impl Default for NatsConfig {
    fn default() -> Self {
        Self {
            url: "nats://localhost:4222".to_string(),
        }
    }
}

impl NatsConfig {
    /// Load from environment (`NATS_URL`)
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(url) = std::env::var("NATS_URL") {
            config.url = url;
        }
        config
    }
}

/// NATS client wrapper. Connects on first use and reuses the connection.
pub struct NatsClient {
    config: NatsConfig,
    client: RwLock<Option<async_nats::Client>>,
}

impl NatsClient {
    /// Create new client (does not connect yet)
    pub fn new(config: NatsConfig) -> Self {
        Self {
            config,
            client: RwLock::new(None),
        }
    }

    /// Get the underlying connection, establishing it if needed
    pub async fn client(&self) -> Result<async_nats::Client> {
        if let Some(client) = self.client.read().await.as_ref() {
            return Ok(client.clone());
        }

        let mut guard = self.client.write().await;
        // Another task may have connected while we waited for the write lock
        if let Some(client) = guard.as_ref() {
            return Ok(client.clone());
        }

        let client = async_nats::connect(self.config.url.as_str())
            .await
            .map_err(|e| Error::Connection(e.to_string()))?;

        tracing::info!(url = %self.config.url, "Connected to NATS");

        *guard = Some(client.clone());
        Ok(client)
    }
}
