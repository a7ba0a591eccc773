//! Message publisher with retry logic

use crate::{
    client::NatsClient,
    message::Message,
    metrics::{MESSAGE_PUBLISH_DURATION, MESSAGE_PUBLISH_TOTAL},
    types::Topic,
    Error, Result,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

/// The seam the outbox dispatcher publishes through. A sink either delivers
/// the message or returns an error; delivery state lives in the outbox, not
/// here.
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Publish one message
    async fn publish(&self, message: &Message) -> Result<()>;
}

/// Publisher configuration
#[derive(Debug, Clone)]
pub struct PublisherConfig {
    /// Publish timeout
    pub publish_timeout: Duration,

    /// Max retry attempts per publish call
    pub max_retry_attempts: u32,

    /// Initial retry delay
    pub initial_retry_delay: Duration,

    /// Max retry delay
    pub max_retry_delay: Duration,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            publish_timeout: Duration::from_secs(5),
            max_retry_attempts: 3,
            initial_retry_delay: Duration::from_millis(100),
            max_retry_delay: Duration::from_secs(2),
        }
    }
}

/// NATS message publisher
pub struct NatsPublisher {
    client: Arc<NatsClient>,
    config: PublisherConfig,
}

impl NatsPublisher {
    /// Create new publisher
    pub fn new(client: Arc<NatsClient>, config: PublisherConfig) -> Self {
        Self { client, config }
    }

    /// Publish message
    pub async fn publish(&self, message: &Message) -> Result<()> {
        let start = Instant::now();
        let subject = message.subject().to_string();

        let payload = message.to_bytes()?;

        let result = self.publish_with_retry(&subject, &payload).await;

        let duration = start.elapsed().as_secs_f64();
        MESSAGE_PUBLISH_DURATION
            .with_label_values(&[&subject])
            .observe(duration);

        let status = if result.is_ok() { "success" } else { "error" };
        MESSAGE_PUBLISH_TOTAL
            .with_label_values(&[&subject, status])
            .inc();

        result
    }

    /// Publish with exponential backoff retry
    async fn publish_with_retry(&self, subject: &str, payload: &[u8]) -> Result<()> {
        let mut attempts = 0;
        let mut delay = self.config.initial_retry_delay;

        loop {
            attempts += 1;

            match self.publish_once(subject, payload).await {
                Ok(_) => {
                    if attempts > 1 {
                        info!("Message published after {} attempts", attempts);
                    }
                    return Ok(());
                }
                Err(e) => {
                    if attempts >= self.config.max_retry_attempts {
                        error!("Failed to publish after {} attempts: {}", attempts, e);
                        return Err(e);
                    }

                    warn!(
                        "Publish failed (attempt {}), retrying in {:?}: {}",
                        attempts, delay, e
                    );
                    tokio::time::sleep(delay).await;

                    // Exponential backoff
                    delay = (delay * 2).min(self.config.max_retry_delay);
                }
            }
        }
    }

    /// Single publish attempt
    async fn publish_once(&self, subject: &str, payload: &[u8]) -> Result<()> {
        let publish = async {
            let client = self.client.client().await?;

            client
                .publish(subject.to_string(), payload.to_vec().into())
                .await
                .map_err(|e| Error::Publish(e.to_string()))?;

            // Flush to ensure the message left this process
            client
                .flush()
                .await
                .map_err(|e| Error::Publish(format!("Flush failed: {}", e)))?;

            Ok(())
        };

        tokio::time::timeout(self.config.publish_timeout, publish)
            .await
            .map_err(|_| Error::Timeout(self.config.publish_timeout.as_millis() as u64))?
    }
}

#[async_trait]
impl EventSink for NatsPublisher {
    async fn publish(&self, message: &Message) -> Result<()> {
        NatsPublisher::publish(self, message).await
    }
}

/// In-memory sink capturing published messages. Used by tests and local
/// development where no broker is running.
#[derive(Default)]
pub struct InMemorySink {
    messages: Mutex<Vec<Message>>,
}

impl InMemorySink {
    /// Create new sink
    pub fn new() -> Self {
        Self::default()
    }

    /// All captured messages, publish order
    pub fn messages(&self) -> Vec<Message> {
        self.messages.lock().clone()
    }

    /// Captured messages for one topic
    pub fn messages_for(&self, topic: &Topic) -> Vec<Message> {
        self.messages
            .lock()
            .iter()
            .filter(|m| m.topic == *topic)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl EventSink for InMemorySink {
    async fn publish(&self, message: &Message) -> Result<()> {
        self.messages.lock().push(message.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::NatsConfig;
    use serde_json::json;

    #[tokio::test]
    async fn test_publisher_creation() {
        let client = Arc::new(NatsClient::new(NatsConfig::default()));
        let publisher = NatsPublisher::new(client, PublisherConfig::default());
        assert_eq!(publisher.config.max_retry_attempts, 3);
    }

    #[test]
    fn test_publish_config_default() {
        let config = PublisherConfig::default();
        assert_eq!(config.max_retry_attempts, 3);
        assert_eq!(config.publish_timeout, Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_in_memory_sink_captures() {
        let sink = InMemorySink::new();
        let issued = Topic::new("loyalty.points.issued");
        let redeemed = Topic::new("loyalty.points.redeemed");

        sink.publish(&Message::new("t1", issued.clone(), 1, json!({"amount": 50})))
            .await
            .unwrap();
        sink.publish(&Message::new("t1", redeemed.clone(), 1, json!({"pointsDeducted": 100})))
            .await
            .unwrap();

        assert_eq!(sink.messages().len(), 2);
        assert_eq!(sink.messages_for(&issued).len(), 1);
        assert_eq!(sink.messages_for(&redeemed).len(), 1);
    }
}
