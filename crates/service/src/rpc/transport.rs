use async_trait::async_trait;
use tokio::sync::mpsc;

use super::envelope::Envelope;
use super::errors::TransportError;

/// Channel capacity for subscriptions handed out by transports.
pub const SUBSCRIPTION_BUFFER: usize = 1024;

/// One-way publish/subscribe transport. Implementations never correlate;
/// they deliver every envelope published on a topic to that topic's subscribers.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn publish(&self, envelope: Envelope) -> Result<(), TransportError>;

    /// Fan-out subscription: every subscriber receives every envelope.
    async fn subscribe(&self, topic: &str) -> Result<mpsc::Receiver<Envelope>, TransportError>;

    /// Load-balanced subscription shared by all members of `group`.
    /// Transports without consumer groups fall back to a plain subscription.
    async fn subscribe_group(&self, topic: &str, _group: &str) -> Result<mpsc::Receiver<Envelope>, TransportError> {
        self.subscribe(topic).await
    }
}
