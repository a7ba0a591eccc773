//! Outbox dispatcher
//!
//! Single background loop draining the durable outbox: each sweep fetches up
//! to `batch_size` PENDING events oldest-first, publishes them to the bus
//! under their deterministic topics, and records delivery state. A publish
//! failure bumps the event's retry count; at `max_retries` the event flips to
//! FAILED (terminal, operator concern). The business operation that wrote the
//! event already succeeded, so failures never reach the original caller.
//!
//! State machine: PENDING -> PUBLISHED (terminal success)
//!                PENDING -> PENDING (retry, count++) -> FAILED (terminal)

use crate::{
    metrics::{OUTBOX_DISPATCH_TOTAL, OUTBOX_PENDING},
    DispatcherConfig, Result,
};
use chrono::Utc;
use ledger_core::{OutboxEvent, OutboxStatus, Storage};
use message_bus::{EventSink, Message, Topic};
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// Outcome counts for one sweep
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepStats {
    /// Events published this sweep
    pub published: usize,
    /// Events left PENDING for the next sweep
    pub retried: usize,
    /// Events that exhausted their retry budget this sweep
    pub failed: usize,
}

/// Background dispatcher for the transactional outbox
pub struct OutboxDispatcher {
    storage: Arc<Storage>,
    sink: Arc<dyn EventSink>,
    config: DispatcherConfig,
}

impl OutboxDispatcher {
    /// Create new dispatcher
    pub fn new(storage: Arc<Storage>, sink: Arc<dyn EventSink>, config: DispatcherConfig) -> Self {
        Self {
            storage,
            sink,
            config,
        }
    }

    /// Run the poll loop until shutdown is signalled
    pub async fn run(self, mut shutdown: oneshot::Receiver<()>) {
        info!(
            poll_interval_ms = self.config.poll_interval_ms,
            batch_size = self.config.batch_size,
            max_retries = self.config.max_retries,
            "Outbox dispatcher started"
        );

        let mut poll = interval(Duration::from_millis(self.config.poll_interval_ms));
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = poll.tick() => {
                    if let Err(e) = self.sweep().await {
                        warn!("Outbox sweep failed: {}", e);
                    }
                }

                _ = &mut shutdown => {
                    info!("Outbox dispatcher shutting down");
                    break;
                }
            }
        }
    }

    /// One sweep: fetch pending events oldest-first and dispatch each.
    ///
    /// Per-event errors are isolated; a failing event never blocks the rest
    /// of the batch.
    pub async fn sweep(&self) -> Result<SweepStats> {
        let events = self.storage.fetch_pending_events(self.config.batch_size)?;

        OUTBOX_PENDING.set(self.storage.pending_event_count()? as i64);

        if events.is_empty() {
            return Ok(SweepStats::default());
        }

        debug!("Processing {} outbox events", events.len());

        let mut stats = SweepStats::default();
        for event in events {
            match self.dispatch(&event).await {
                Ok(()) => {
                    self.storage.mark_event_published(event.id, Utc::now())?;
                    OUTBOX_DISPATCH_TOTAL.with_label_values(&["published"]).inc();
                    stats.published += 1;

                    debug!(
                        event_id = %event.id,
                        topic = event.kind.topic(),
                        "Published outbox event"
                    );
                }
                Err(e) => {
                    error!(event_id = %event.id, "Failed to publish outbox event: {}", e);

                    let status = self
                        .storage
                        .record_event_failure(event.id, self.config.max_retries)?;

                    if status == OutboxStatus::Failed {
                        warn!(
                            event_id = %event.id,
                            max_retries = self.config.max_retries,
                            "Outbox event marked FAILED, retries exhausted"
                        );
                        OUTBOX_DISPATCH_TOTAL.with_label_values(&["failed"]).inc();
                        stats.failed += 1;
                    } else {
                        OUTBOX_DISPATCH_TOTAL.with_label_values(&["retried"]).inc();
                        stats.retried += 1;
                    }
                }
            }
        }

        Ok(stats)
    }

    /// Publish one event to the bus under its deterministic topic
    async fn dispatch(&self, event: &OutboxEvent) -> Result<()> {
        let message = Message::new(
            event.tenant_id.as_str(),
            Topic::new(event.kind.topic()),
            event.schema_version,
            serde_json::to_value(&event.payload).map_err(ledger_core::Error::from)?,
        )
        .with_correlation_id(event.id.to_string());

        self.sink.publish(&message).await?;
        Ok(())
    }

    /// Spawn the dispatcher as a background task
    pub fn spawn(self) -> DispatcherHandle {
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let join = tokio::spawn(self.run(shutdown_rx));

        DispatcherHandle {
            shutdown: Some(shutdown_tx),
            join,
        }
    }
}

/// Handle to a running dispatcher
pub struct DispatcherHandle {
    shutdown: Option<oneshot::Sender<()>>,
    join: JoinHandle<()>,
}

impl DispatcherHandle {
    /// Signal shutdown and wait for the loop to exit
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        let _ = self.join.await;
    }
}
