//! NATS-backed transport. Envelopes travel as JSON on subjects named after their topic.

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::envelope::Envelope;
use super::errors::TransportError;
use super::transport::{Transport, SUBSCRIPTION_BUFFER};

pub struct NatsTransport {
    client: async_nats::Client,
}

impl NatsTransport {
    pub fn new(client: async_nats::Client) -> Self {
        Self { client }
    }

    /// Connect to `url`, announcing `client_id` as the connection name.
    pub async fn connect(url: &str, client_id: &str) -> Result<Self, TransportError> {
        let client = async_nats::ConnectOptions::new()
            .name(client_id)
            .connect(url)
            .await
            .map_err(|e| TransportError(format!("connect {url}: {e}")))?;
        info!(%url, %client_id, "nats_connected");
        Ok(Self::new(client))
    }

    fn forward(topic: String, mut subscriber: async_nats::Subscriber) -> mpsc::Receiver<Envelope> {
        let (tx, rx) = mpsc::channel(SUBSCRIPTION_BUFFER);
        tokio::spawn(async move {
            while let Some(message) = subscriber.next().await {
                match serde_json::from_slice::<Envelope>(&message.payload) {
                    Ok(envelope) => {
                        if tx.send(envelope).await.is_err() {
                            debug!(%topic, "subscription receiver dropped");
                            break;
                        }
                    }
                    Err(e) => warn!(%topic, error = %e, "discarding undecodable message"),
                }
            }
        });
        rx
    }
}

#[async_trait]
impl Transport for NatsTransport {
    async fn publish(&self, envelope: Envelope) -> Result<(), TransportError> {
        let data = serde_json::to_vec(&envelope).map_err(|e| TransportError(e.to_string()))?;
        self.client
            .publish(envelope.topic.clone(), Bytes::from(data))
            .await
            .map_err(|e| TransportError(format!("publish {}: {e}", envelope.topic)))
    }

    async fn subscribe(&self, topic: &str) -> Result<mpsc::Receiver<Envelope>, TransportError> {
        let subscriber = self
            .client
            .subscribe(topic.to_string())
            .await
            .map_err(|e| TransportError(format!("subscribe {topic}: {e}")))?;
        Ok(Self::forward(topic.to_string(), subscriber))
    }

    async fn subscribe_group(&self, topic: &str, group: &str) -> Result<mpsc::Receiver<Envelope>, TransportError> {
        let subscriber = self
            .client
            .queue_subscribe(topic.to_string(), group.to_string())
            .await
            .map_err(|e| TransportError(format!("queue subscribe {topic} ({group}): {e}")))?;
        Ok(Self::forward(topic.to_string(), subscriber))
    }
}
