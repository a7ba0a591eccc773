//! Outbox dispatcher binary
//!
//! Wires the ledger store to NATS and drains the outbox until interrupted.

use ledger_core::Storage;
use message_bus::{NatsClient, NatsConfig, NatsPublisher, PublisherConfig};
use outbox_dispatcher::{DispatcherConfig, OutboxDispatcher};
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    tracing::info!("Starting outbox dispatcher");

    let ledger_config = ledger_core::Config::from_env()?;
    let dispatcher_config = DispatcherConfig::from_env()?;
    let nats_config = NatsConfig::from_env();

    let storage = Arc::new(Storage::open(&ledger_config)?);

    let client = Arc::new(NatsClient::new(nats_config));
    let sink = Arc::new(NatsPublisher::new(client, PublisherConfig::default()));

    let dispatcher = OutboxDispatcher::new(storage, sink, dispatcher_config);
    let handle = dispatcher.spawn();

    tokio::signal::ctrl_c().await?;

    tracing::info!("Shutting down outbox dispatcher");
    handle.shutdown().await;

    Ok(())
}
