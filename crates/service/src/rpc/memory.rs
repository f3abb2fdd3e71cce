//! In-process broker used by tests and `memory://` runs.
//!
//! Delivers each published envelope to every live subscriber of its topic. A broker built
//! with [`MemoryBroker::recording`] also keeps every published envelope so tests can
//! inspect traffic. Topics can be told to fail publishing to exercise error paths.

use std::collections::HashSet;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::trace;

use super::envelope::Envelope;
use super::errors::TransportError;
use super::transport::{Transport, SUBSCRIPTION_BUFFER};

#[derive(Default)]
struct BrokerInner {
    subscribers: DashMap<String, Vec<mpsc::Sender<Envelope>>>,
    recording: bool,
    published: RwLock<Vec<Envelope>>,
    failing: RwLock<HashSet<String>>,
}

/// Cheap to clone; clones share the same topics.
#[derive(Clone, Default)]
pub struct MemoryBroker {
    inner: Arc<BrokerInner>,
}

impl MemoryBroker {
    /// Keeps no log of published envelopes.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records every accepted publish for [`published`](Self::published) and friends.
    /// The log is never trimmed; meant for tests.
    pub fn recording() -> Self {
        Self { inner: Arc::new(BrokerInner { recording: true, ..Default::default() }) }
    }

    /// Make every publish on `topic` fail until [`MemoryBroker::heal`] is called.
    pub fn fail_publish_on(&self, topic: &str) {
        self.inner
            .failing
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(topic.to_string());
    }

    pub fn heal(&self, topic: &str) {
        self.inner
            .failing
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(topic);
    }

    /// All envelopes published so far, in order. Always empty unless recording.
    pub fn published(&self) -> Vec<Envelope> {
        self.inner
            .published
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn messages_for_topic(&self, topic: &str) -> Vec<Envelope> {
        self.inner
            .published
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|m| m.topic == topic)
            .cloned()
            .collect()
    }

    pub fn publish_count_for(&self, topic: &str) -> usize {
        self.inner
            .published
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|m| m.topic == topic)
            .count()
    }

    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.inner.subscribers.get(topic).map(|s| s.len()).unwrap_or(0)
    }

    fn is_failing(&self, topic: &str) -> bool {
        self.inner
            .failing
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .contains(topic)
    }
}

#[async_trait]
impl Transport for MemoryBroker {
    async fn publish(&self, envelope: Envelope) -> Result<(), TransportError> {
        if self.is_failing(&envelope.topic) {
            return Err(TransportError(format!("broker rejected publish on {}", envelope.topic)));
        }
        if self.inner.recording {
            self.inner
                .published
                .write()
                .unwrap_or_else(|e| e.into_inner())
                .push(envelope.clone());
        }

        // Snapshot senders so no map guard is held across an await.
        let senders: Vec<mpsc::Sender<Envelope>> = self
            .inner
            .subscribers
            .get(&envelope.topic)
            .map(|s| s.clone())
            .unwrap_or_default();
        trace!(topic = %envelope.topic, subscribers = senders.len(), "memory_publish");

        let mut closed = false;
        for tx in &senders {
            if tx.send(envelope.clone()).await.is_err() {
                closed = true;
            }
        }
        if closed {
            if let Some(mut subs) = self.inner.subscribers.get_mut(&envelope.topic) {
                subs.retain(|tx| !tx.is_closed());
            }
        }
        Ok(())
    }

    async fn subscribe(&self, topic: &str) -> Result<mpsc::Receiver<Envelope>, TransportError> {
        let (tx, rx) = mpsc::channel(SUBSCRIPTION_BUFFER);
        self.inner
            .subscribers
            .entry(topic.to_string())
            .or_default()
            .push(tx);
        Ok(rx)
    }
}
