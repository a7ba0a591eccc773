//! Prometheus metrics for the outbox dispatcher

use lazy_static::lazy_static;
use prometheus::{register_counter_vec, register_int_gauge, CounterVec, IntGauge};

lazy_static! {
    /// Dispatch outcomes per sweep: published, retried, failed
    pub static ref OUTBOX_DISPATCH_TOTAL: CounterVec = register_counter_vec!(
        "outbox_dispatch_total",
        "Outbox dispatch outcomes",
        &["status"]
    )
    .unwrap();

    /// Events still awaiting dispatch
    pub static ref OUTBOX_PENDING: IntGauge = register_int_gauge!(
        "outbox_pending_events",
        "Events still awaiting dispatch"
    )
    .unwrap();
}
