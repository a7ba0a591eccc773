//! Error types for the ledger

use rust_decimal::Decimal;
use thiserror::Error;

/// Result type for ledger operations
pub type Result<T> = std::result::Result<T, Error>;

/// Ledger errors
#[derive(Error, Debug)]
pub enum Error {
    /// Storage error (RocksDB)
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization error (bincode-encoded records)
    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    /// Serialization error (JSON-encoded outbox events)
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Rejected before any write (zero amount, malformed unit)
    #[error("Validation failure: {0}")]
    Validation(String),

    /// Balance precondition failed inside the atomic unit; nothing written
    #[error("Insufficient balance: required {required}, available {available}")]
    InsufficientBalance {
        /// Minimum balance the operation required
        required: Decimal,
        /// Balance actually available at commit time
        available: Decimal,
    },

    /// Ledger entry not found
    #[error("Ledger entry not found: {0}")]
    EntryNotFound(String),

    /// Transaction record not found
    #[error("Transaction not found: {0}")]
    TransactionNotFound(String),

    /// Redemption record not found
    #[error("Redemption not found: {0}")]
    RedemptionNotFound(String),

    /// Outbox event not found
    #[error("Outbox event not found: {0}")]
    EventNotFound(String),

    /// Invariant violation (balance cache divergence, etc.)
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    /// Concurrency error (actor mailbox closed, etc.)
    #[error("Concurrency error: {0}")]
    Concurrency(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<rocksdb::Error> for Error {
    fn from(err: rocksdb::Error) -> Self {
        Error::Storage(err.to_string())
    }
}
