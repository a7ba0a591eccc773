//! Message bus with NATS support
//!
//! Provides the event-publishing side of the loyalty platform:
//! - Typed message envelope with an explicit schema version
//! - Deterministic per-event-type topics
//! - Publisher with bounded exponential-backoff retry
//! - Subscriber support for downstream read-model consumers
//! - In-memory sink for tests and local development
//! - Observability via Prometheus metrics

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms)]

pub mod client;
pub mod error;
pub mod message;
pub mod metrics;
pub mod publisher;
pub mod subscriber;
pub mod types;

pub use client::{NatsClient, NatsConfig};
pub use error::{Error, Result};
pub use message::Message;
pub use publisher::{EventSink, InMemorySink, NatsPublisher, PublisherConfig};
pub use subscriber::{MessageHandler, Subscriber, SubscriberConfig};
pub use types::Topic;
