//! Outbox dispatcher for the points ledger
//!
//! Bridges the durable outbox written by the transaction orchestrator to the
//! message bus: polls PENDING events oldest-first, publishes them under
//! deterministic per-event-type topics, and tracks PENDING -> PUBLISHED /
//! FAILED delivery state with a bounded retry budget.

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms)]

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod metrics;

pub use config::DispatcherConfig;
pub use dispatcher::{DispatcherHandle, OutboxDispatcher, SweepStats};
pub use error::{Error, Result};
