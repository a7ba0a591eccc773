//! Message subscriber for downstream read-model consumers
//!
//! Consumer contract: a handler must only return `Ok` once the update is
//! applied to its own read model. A handler error means the message is not
//! acknowledged, and redelivery is expected on buses that support it, so
//! consumers treat their own updates as idempotent (e.g. upsert by
//! transaction id).

use crate::{
    client::NatsClient,
    message::Message,
    metrics::{MESSAGE_PROCESS_DURATION, MESSAGE_RECEIVE_TOTAL},
    types::Topic,
    Error, Result,
};
use async_trait::async_trait;
use futures::StreamExt;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info};

/// Message handler trait
#[async_trait]
pub trait MessageHandler: Send + Sync {
    /// Handle incoming message
    async fn handle(&self, message: Message) -> Result<()>;
}

/// Subscriber configuration
#[derive(Debug, Clone)]
pub struct SubscriberConfig {
    /// Queue group for load balancing across consumer instances
    pub queue_group: String,
}

impl Default for SubscriberConfig {
    fn default() -> Self {
        Self {
            queue_group: "loyalty-readmodels".to_string(),
        }
    }
}

/// Message subscriber
pub struct Subscriber {
    client: Arc<NatsClient>,
    config: SubscriberConfig,
    topic: Topic,
}

impl Subscriber {
    /// Create new subscriber
    pub fn new(client: Arc<NatsClient>, config: SubscriberConfig, topic: Topic) -> Self {
        Self {
            client,
            config,
            topic,
        }
    }

    /// Subscribe and process messages until the connection closes
    pub async fn run<H>(&self, handler: Arc<H>) -> Result<()>
    where
        H: MessageHandler + 'static,
    {
        let client = self.client.client().await?;
        let subject = self.topic.as_str().to_string();

        info!(
            "Subscribing to {} (queue group: {})",
            subject, self.config.queue_group
        );

        let mut subscriber = client
            .queue_subscribe(subject.clone(), self.config.queue_group.clone())
            .await
            .map_err(|e| Error::Subscribe(e.to_string()))?;

        while let Some(msg) = subscriber.next().await {
            match Message::from_bytes(&msg.payload) {
                Ok(message) => {
                    let start = Instant::now();

                    MESSAGE_RECEIVE_TOTAL
                        .with_label_values(&[&subject, "success"])
                        .inc();

                    if let Err(e) = handler.handle(message).await {
                        // Not acknowledged; the bus is expected to redeliver
                        error!("Error handling message on {}: {}", subject, e);
                        continue;
                    }

                    let duration = start.elapsed().as_secs_f64();
                    MESSAGE_PROCESS_DURATION
                        .with_label_values(&[&subject])
                        .observe(duration);
                }
                Err(e) => {
                    error!("Failed to parse message on {}: {}", subject, e);
                    MESSAGE_RECEIVE_TOTAL
                        .with_label_values(&[&subject, "parse_error"])
                        .inc();
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::NatsConfig;

    #[test]
    fn test_subscriber_config_default() {
        let config = SubscriberConfig::default();
        assert_eq!(config.queue_group, "loyalty-readmodels");
    }

    #[tokio::test]
    async fn test_subscriber_creation() {
        let client = Arc::new(NatsClient::new(NatsConfig::default()));
        let subscriber = Subscriber::new(
            client,
            SubscriberConfig::default(),
            Topic::new("loyalty.points.issued"),
        );
        assert_eq!(subscriber.topic.as_str(), "loyalty.points.issued");
    }
}
