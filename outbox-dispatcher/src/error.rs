//! Error types for the outbox dispatcher

use thiserror::Error;

/// Result type for dispatcher operations
pub type Result<T> = std::result::Result<T, Error>;

/// Dispatcher errors
#[derive(Debug, Error)]
pub enum Error {
    /// Ledger store error
    #[error("Ledger error: {0}")]
    Ledger(#[from] ledger_core::Error),

    /// Message bus error
    #[error("Bus error: {0}")]
    Bus(#[from] message_bus::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}
