//! Error types for the transaction orchestrator
//!
//! Every rejection here happens before (or without) any durable write, so a
//! failed operation never needs compensation.

use rust_decimal::Decimal;
use thiserror::Error;

/// Result type for orchestrator operations
pub type Result<T> = std::result::Result<T, Error>;

/// Orchestrator errors
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed request (non-positive issue amount, zero adjustment, ...)
    #[error("Validation failure: {0}")]
    Validation(String),

    /// Customer, device, reward, or transaction absent
    #[error("Not found: {0}")]
    NotFound(String),

    /// Redemption balance check failed inside the atomic unit; no rows written
    #[error("Insufficient balance: required {required}, available {available}")]
    InsufficientBalance {
        /// Points the redemption required
        required: Decimal,
        /// Balance available at commit time
        available: Decimal,
    },

    /// Operation not applicable to the target's current state
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Underlying ledger failure
    #[error("Ledger error: {0}")]
    Ledger(ledger_core::Error),
}

impl From<ledger_core::Error> for Error {
    fn from(err: ledger_core::Error) -> Self {
        match err {
            ledger_core::Error::InsufficientBalance {
                required,
                available,
            } => Error::InsufficientBalance {
                required,
                available,
            },
            ledger_core::Error::Validation(msg) => Error::Validation(msg),
            other => Error::Ledger(other),
        }
    }
}
