//! Configuration for the outbox dispatcher

use serde::{Deserialize, Serialize};

/// Dispatcher configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatcherConfig {
    /// Poll interval between outbox sweeps (milliseconds)
    pub poll_interval_ms: u64,

    /// Max events fetched per sweep
    pub batch_size: usize,

    /// Publish attempts before an event is marked FAILED (terminal)
    pub max_retries: u32,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 5000,
            batch_size: 100,
            max_retries: 3,
        }
    }
}

impl DispatcherConfig {
    /// Load from environment variables
    pub fn from_env() -> crate::Result<Self> {
        let mut config = Self::default();

        if let Ok(interval) = std::env::var("OUTBOX_POLL_INTERVAL_MS") {
            config.poll_interval_ms = interval
                .parse()
                .map_err(|e| crate::Error::Config(format!("OUTBOX_POLL_INTERVAL_MS: {}", e)))?;
        }
        if let Ok(batch) = std::env::var("OUTBOX_BATCH_SIZE") {
            config.batch_size = batch
                .parse()
                .map_err(|e| crate::Error::Config(format!("OUTBOX_BATCH_SIZE: {}", e)))?;
        }
        if let Ok(retries) = std::env::var("OUTBOX_MAX_RETRIES") {
            config.max_retries = retries
                .parse()
                .map_err(|e| crate::Error::Config(format!("OUTBOX_MAX_RETRIES: {}", e)))?;
        }

        Ok(config)
    }
}
