//! PointsRail Transaction Orchestrator
//!
//! Converts client-initiated mutations (issue, redeem, adjust, reverse) into
//! atomic ledger commits with durable outbox events. Callers get a definite
//! success (transaction id + resulting balance) or a definite, specific
//! rejection; idempotency-key replay is the sanctioned way to discover the
//! outcome of an uncertain prior attempt.

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms)]

pub mod directory;
pub mod engine;
pub mod error;
pub mod hooks;
pub mod operator;
pub mod types;

pub use directory::{CustomerRef, DeviceRef, InMemoryDirectory, ReferenceDirectory, RewardRef};
pub use engine::{PointsEngine, MILESTONE_FIRST_SCAN};
pub use error::{Error, Result};
pub use hooks::{AuditLog, EngagementHooks, NoopHooks};
pub use operator::OperatorTools;
pub use types::{AdjustmentReceipt, IssueReceipt, RedemptionReceipt};
