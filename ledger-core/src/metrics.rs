//! Metrics collection for observability
//!
//! # Metrics
//!
//! - `ledger_commits_total` - Units committed (applied)
//! - `ledger_replays_total` - Idempotent replays served
//! - `ledger_insufficient_balance_total` - Commits rejected by the balance floor
//! - `ledger_commit_duration_seconds` - Histogram of commit latencies

use prometheus::{Histogram, HistogramOpts, IntCounter, Opts, Registry};
use std::sync::Arc;

/// Metrics collector
///
/// Registered against an instance-local registry so multiple ledgers (e.g.
/// in tests) never collide on metric names.
#[derive(Clone)]
pub struct Metrics {
    /// Units committed
    pub commits_total: IntCounter,

    /// Idempotent replays
    pub replays_total: IntCounter,

    /// Balance-floor rejections
    pub insufficient_balance_total: IntCounter,

    /// Commit duration histogram
    pub commit_duration: Histogram,

    /// Prometheus registry
    pub registry: Arc<Registry>,
}

impl Metrics {
    /// Create new metrics collector
    pub fn new() -> prometheus::Result<Self> {
        let registry = Arc::new(Registry::new());

        let commits_total = IntCounter::with_opts(Opts::new(
            "ledger_commits_total",
            "Units committed (applied)",
        ))?;
        registry.register(Box::new(commits_total.clone()))?;

        let replays_total = IntCounter::with_opts(Opts::new(
            "ledger_replays_total",
            "Idempotent replays served",
        ))?;
        registry.register(Box::new(replays_total.clone()))?;

        let insufficient_balance_total = IntCounter::with_opts(Opts::new(
            "ledger_insufficient_balance_total",
            "Commits rejected by the balance floor",
        ))?;
        registry.register(Box::new(insufficient_balance_total.clone()))?;

        let commit_duration = Histogram::with_opts(
            HistogramOpts::new(
                "ledger_commit_duration_seconds",
                "Histogram of commit latencies",
            )
            .buckets(vec![0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.0]),
        )?;
        registry.register(Box::new(commit_duration.clone()))?;

        Ok(Self {
            commits_total,
            replays_total,
            insufficient_balance_total,
            commit_duration,
            registry,
        })
    }

    /// Record a committed unit
    pub fn record_commit(&self) {
        self.commits_total.inc();
    }

    /// Record an idempotent replay
    pub fn record_replay(&self) {
        self.replays_total.inc();
    }

    /// Record a balance-floor rejection
    pub fn record_insufficient_balance(&self) {
        self.insufficient_balance_total.inc();
    }

    /// Record commit duration
    pub fn record_commit_duration(&self, duration_seconds: f64) {
        self.commit_duration.observe(duration_seconds);
    }

    /// Get metrics registry
    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_creation() {
        let metrics = Metrics::new().unwrap();
        assert_eq!(metrics.commits_total.get(), 0);
        assert_eq!(metrics.replays_total.get(), 0);
    }

    #[test]
    fn test_record_commit_and_replay() {
        let metrics = Metrics::new().unwrap();
        metrics.record_commit();
        metrics.record_commit();
        metrics.record_replay();
        assert_eq!(metrics.commits_total.get(), 2);
        assert_eq!(metrics.replays_total.get(), 1);
    }

    #[test]
    fn test_multiple_instances_do_not_collide() {
        let a = Metrics::new().unwrap();
        let b = Metrics::new().unwrap();
        a.record_commit();
        assert_eq!(b.commits_total.get(), 0);
    }
}
