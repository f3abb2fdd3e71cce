//! Correlation client: one awaitable call per outbound message.
//!
//! Usage follows a fixed order:
//! 1. declare every topic whose replies will be awaited with
//!    [`CorrelationClient::subscribe_to_response_of`];
//! 2. [`CorrelationClient::connect`] subscribes to the matching `<topic>.reply` topics;
//! 3. [`CorrelationClient::call`] / [`CorrelationClient::emit`].
//!
//! Calls made before step 2, or on a topic never declared, fail with [`RpcError::NotReady`].
//! Each call resolves exactly once: with its own reply, a transport failure, or a timeout.
//! The pending entry is removed in every case, so a late reply is counted and dropped.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use common::metrics::{RPC_CALLS_TOTAL, RPC_TIMEOUTS_TOTAL, RPC_UNMATCHED_REPLIES_TOTAL};
use common::topics::reply_topic;

use super::envelope::{CorrelationId, Envelope};
use super::errors::RpcError;
use super::transport::Transport;

/// Acknowledgement of a fire-and-forget publish.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ack {
    pub topic: String,
}

struct PendingCall {
    topic: String,
    created_at: Instant,
    resolve: oneshot::Sender<Envelope>,
}

type PendingCalls = DashMap<CorrelationId, PendingCall>;

/// Removes the pending entry when the awaiting call goes away for any reason.
struct PendingGuard<'a> {
    pending: &'a PendingCalls,
    correlation_id: CorrelationId,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.pending.remove(&self.correlation_id);
    }
}

pub struct CorrelationClient {
    transport: Arc<dyn Transport>,
    pending: Arc<PendingCalls>,
    // topic -> reply subscription established
    declared: DashMap<String, bool>,
    ready: AtomicBool,
    timeout: Option<Duration>,
    listeners: Mutex<Vec<JoinHandle<()>>>,
    // serializes connect so a topic is never subscribed twice
    connecting: tokio::sync::Mutex<()>,
}

impl CorrelationClient {
    /// `timeout` of `None` waits for a reply indefinitely.
    pub fn new(transport: Arc<dyn Transport>, timeout: Option<Duration>) -> Self {
        Self {
            transport,
            pending: Arc::new(DashMap::new()),
            declared: DashMap::new(),
            ready: AtomicBool::new(false),
            timeout,
            listeners: Mutex::new(Vec::new()),
            connecting: tokio::sync::Mutex::new(()),
        }
    }

    /// Declare interest in the replies of `topic`. Takes effect on the next [`connect`](Self::connect).
    pub fn subscribe_to_response_of(&self, topic: &str) {
        self.declared.entry(topic.to_string()).or_insert(false);
    }

    /// Subscribe to the reply topic of every declared topic not yet subscribed, then mark ready.
    /// Safe to call again after declaring more topics, and from concurrent tasks.
    pub async fn connect(&self) -> Result<(), RpcError> {
        let _connecting = self.connecting.lock().await;
        let todo: Vec<String> = self
            .declared
            .iter()
            .filter(|e| !*e.value())
            .map(|e| e.key().clone())
            .collect();

        for topic in todo {
            let reply = reply_topic(&topic);
            let rx = self
                .transport
                .subscribe(&reply)
                .await
                .map_err(|source| RpcError::Transport { topic: reply.clone(), source })?;
            let handle = tokio::spawn(route_replies(reply, rx, Arc::clone(&self.pending)));
            self.listeners
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .push(handle);
            self.declared.insert(topic, true);
        }

        self.ready.store(true, Ordering::Release);
        info!(topics = self.declared.len(), "correlation client ready");
        Ok(())
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    /// Number of calls still waiting for a reply.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    fn ensure_ready(&self, topic: &str) -> Result<(), RpcError> {
        if !self.is_ready() {
            return Err(RpcError::NotReady("client is not connected".into()));
        }
        match self.declared.get(topic).map(|e| *e.value()) {
            Some(true) => Ok(()),
            _ => Err(RpcError::NotReady(format!("responses of {topic} are not subscribed"))),
        }
    }

    /// Publish `payload` on `topic` and wait for the reply carrying the same correlation id.
    pub async fn call<Req, Res>(&self, topic: &str, payload: &Req) -> Result<Res, RpcError>
    where
        Req: Serialize + ?Sized,
        Res: DeserializeOwned,
    {
        self.ensure_ready(topic)?;
        let value = serde_json::to_value(payload).map_err(|e| RpcError::Codec {
            topic: topic.to_string(),
            message: e.to_string(),
        })?;

        let correlation_id = CorrelationId::new();
        let (resolve, reply_rx) = oneshot::channel();
        self.pending.insert(
            correlation_id,
            PendingCall { topic: topic.to_string(), created_at: Instant::now(), resolve },
        );
        let _guard = PendingGuard { pending: &self.pending, correlation_id };

        RPC_CALLS_TOTAL.with_label_values(&[topic]).inc();
        debug!(%topic, %correlation_id, "rpc_call");
        self.transport
            .publish(Envelope::request(topic, correlation_id, value))
            .await
            .map_err(|source| RpcError::Transport { topic: topic.to_string(), source })?;

        let received = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, reply_rx).await {
                Ok(r) => r,
                Err(_) => {
                    RPC_TIMEOUTS_TOTAL.with_label_values(&[topic]).inc();
                    warn!(%topic, %correlation_id, timeout_ms = limit.as_millis() as u64, "rpc_timeout");
                    return Err(RpcError::Timeout { topic: topic.to_string(), correlation_id, timeout: limit });
                }
            },
            None => reply_rx.await,
        };
        let reply = received.map_err(|_| RpcError::Abandoned { topic: topic.to_string(), correlation_id })?;

        if let Some(body) = reply.error {
            return Err(RpcError::Remote { topic: topic.to_string(), correlation_id, body });
        }
        serde_json::from_value(reply.payload).map_err(|e| RpcError::Codec {
            topic: topic.to_string(),
            message: e.to_string(),
        })
    }

    /// Publish an event that expects no reply; resolves once the transport accepted it.
    pub async fn emit<Req>(&self, topic: &str, payload: &Req) -> Result<Ack, RpcError>
    where
        Req: Serialize + ?Sized,
    {
        if !self.is_ready() {
            return Err(RpcError::NotReady("client is not connected".into()));
        }
        let value = serde_json::to_value(payload).map_err(|e| RpcError::Codec {
            topic: topic.to_string(),
            message: e.to_string(),
        })?;
        self.transport
            .publish(Envelope::event(topic, value))
            .await
            .map_err(|source| RpcError::Transport { topic: topic.to_string(), source })?;
        debug!(%topic, "rpc_emit");
        Ok(Ack { topic: topic.to_string() })
    }

    /// Stop routing replies. Calls still pending resolve with [`RpcError::Abandoned`].
    pub fn shutdown(&self) {
        self.ready.store(false, Ordering::Release);
        for handle in self.listeners.lock().unwrap_or_else(|e| e.into_inner()).drain(..) {
            handle.abort();
        }
        self.pending.clear();
        for mut entry in self.declared.iter_mut() {
            *entry.value_mut() = false;
        }
    }
}

impl Drop for CorrelationClient {
    fn drop(&mut self) {
        for handle in self.listeners.lock().unwrap_or_else(|e| e.into_inner()).drain(..) {
            handle.abort();
        }
    }
}

async fn route_replies(reply_topic: String, mut rx: mpsc::Receiver<Envelope>, pending: Arc<PendingCalls>) {
    while let Some(envelope) = rx.recv().await {
        let Some(correlation_id) = envelope.correlation_id else {
            RPC_UNMATCHED_REPLIES_TOTAL.inc();
            debug!(topic = %reply_topic, "reply without correlation id ignored");
            continue;
        };
        match pending.remove(&correlation_id) {
            Some((_, call)) => {
                debug!(
                    topic = %call.topic,
                    %correlation_id,
                    elapsed_ms = call.created_at.elapsed().as_millis() as u64,
                    "rpc_reply"
                );
                // The caller may have been cancelled between removal and send.
                let _ = call.resolve.send(envelope);
            }
            None => {
                RPC_UNMATCHED_REPLIES_TOTAL.inc();
                warn!(topic = %reply_topic, %correlation_id, "unmatched reply dropped");
            }
        }
    }
    debug!(topic = %reply_topic, "reply subscription closed");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::envelope::ErrorBody;
    use crate::rpc::memory::MemoryBroker;
    use serde_json::{json, Value};

    fn client(broker: &MemoryBroker, timeout: Option<Duration>) -> CorrelationClient {
        CorrelationClient::new(Arc::new(broker.clone()), timeout)
    }

    /// Answers requests on `topic` by echoing the `n` field, doubling it.
    async fn spawn_doubler(broker: &MemoryBroker, topic: &str) {
        let mut rx = broker.subscribe(topic).await.unwrap();
        let broker = broker.clone();
        tokio::spawn(async move {
            while let Some(req) = rx.recv().await {
                let n = req.payload["n"].as_i64().unwrap_or_default();
                broker.publish(req.reply_ok(json!({ "n": n * 2 }))).await.unwrap();
            }
        });
    }

    #[tokio::test]
    async fn call_before_connect_is_not_ready() {
        let broker = MemoryBroker::recording();
        let c = client(&broker, None);
        c.subscribe_to_response_of("user.create");
        let err = c.call::<_, Value>("user.create", &json!({})).await.unwrap_err();
        assert!(matches!(err, RpcError::NotReady(_)));
        assert_eq!(broker.publish_count_for("user.create"), 0);
    }

    #[tokio::test]
    async fn call_on_undeclared_topic_is_not_ready() {
        let broker = MemoryBroker::recording();
        let c = client(&broker, None);
        c.subscribe_to_response_of("user.create");
        c.connect().await.unwrap();
        let err = c.call::<_, Value>("user.update", &json!({})).await.unwrap_err();
        assert!(matches!(err, RpcError::NotReady(_)));
    }

    #[tokio::test]
    async fn concurrent_connects_subscribe_once() {
        let broker = MemoryBroker::recording();
        let c = client(&broker, Some(Duration::from_secs(1)));
        c.subscribe_to_response_of("user.create");
        let (a, b) = tokio::join!(c.connect(), c.connect());
        a.unwrap();
        b.unwrap();
        assert_eq!(broker.subscriber_count("user.create.reply"), 1);

        spawn_doubler(&broker, "user.create").await;
        let out: Value = c.call("user.create", &json!({ "n": 4 })).await.unwrap();
        assert_eq!(out, json!({ "n": 8 }));
    }

    #[tokio::test]
    async fn call_resolves_with_reply() {
        let broker = MemoryBroker::recording();
        spawn_doubler(&broker, "math.double").await;
        let c = client(&broker, Some(Duration::from_secs(2)));
        c.subscribe_to_response_of("math.double");
        c.connect().await.unwrap();

        let out: Value = c.call("math.double", &json!({"n": 21})).await.unwrap();
        assert_eq!(out["n"], 42);
        assert_eq!(c.pending_count(), 0);
        assert_eq!(broker.publish_count_for("math.double"), 1);
    }

    #[tokio::test]
    async fn concurrent_calls_resolve_with_their_own_reply_when_answered_out_of_order() {
        let broker = MemoryBroker::recording();
        let mut requests = broker.subscribe("user.findByEmail").await.unwrap();
        let c = Arc::new(client(&broker, Some(Duration::from_secs(2))));
        c.subscribe_to_response_of("user.findByEmail");
        c.connect().await.unwrap();

        let first = tokio::spawn({
            let c = Arc::clone(&c);
            async move { c.call::<_, Value>("user.findByEmail", &json!("a@x.com")).await }
        });
        let second = tokio::spawn({
            let c = Arc::clone(&c);
            async move { c.call::<_, Value>("user.findByEmail", &json!("b@x.com")).await }
        });

        let r1 = requests.recv().await.unwrap();
        let r2 = requests.recv().await.unwrap();
        // Answer in reverse arrival order.
        for req in [r2, r1] {
            let email = req.payload.as_str().unwrap().to_string();
            broker.publish(req.reply_ok(json!({ "email": email }))).await.unwrap();
        }

        assert_eq!(first.await.unwrap().unwrap()["email"], "a@x.com");
        assert_eq!(second.await.unwrap().unwrap()["email"], "b@x.com");
        assert_eq!(c.pending_count(), 0);
    }

    #[tokio::test]
    async fn timeout_removes_pending_call_and_late_reply_is_ignored() {
        let broker = MemoryBroker::recording();
        let mut requests = broker.subscribe("user.create").await.unwrap();
        let c = client(&broker, Some(Duration::from_millis(50)));
        c.subscribe_to_response_of("user.create");
        c.connect().await.unwrap();

        let err = c.call::<_, Value>("user.create", &json!({})).await.unwrap_err();
        let cid = match err {
            RpcError::Timeout { correlation_id, .. } => correlation_id,
            other => panic!("expected timeout, got {other:?}"),
        };
        assert_eq!(c.pending_count(), 0);

        let req = requests.recv().await.unwrap();
        assert_eq!(req.correlation_id, Some(cid));
        broker.publish(req.reply_ok(json!({"id": "late"}))).await.unwrap();
        tokio::task::yield_now().await;
        assert_eq!(c.pending_count(), 0);
    }

    #[tokio::test]
    async fn remote_error_is_surfaced_with_body() {
        let broker = MemoryBroker::recording();
        let mut requests = broker.subscribe("company.getByCode").await.unwrap();
        let c = client(&broker, Some(Duration::from_secs(2)));
        c.subscribe_to_response_of("company.getByCode");
        c.connect().await.unwrap();

        let responder = broker.clone();
        tokio::spawn(async move {
            let req = requests.recv().await.unwrap();
            let body = ErrorBody::new("repository", 1200, "db down");
            responder.publish(req.reply_err(body)).await.unwrap();
        });

        match c.call::<_, Value>("company.getByCode", &json!("AB1!")).await {
            Err(RpcError::Remote { topic, body, .. }) => {
                assert_eq!(topic, "company.getByCode");
                assert_eq!(body.message, "db down");
            }
            other => panic!("expected remote error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn transport_failure_fails_the_call_without_leaking_pending() {
        let broker = MemoryBroker::recording();
        broker.fail_publish_on("user.update");
        let c = client(&broker, None);
        c.subscribe_to_response_of("user.update");
        c.connect().await.unwrap();

        let err = c.call::<_, Value>("user.update", &json!({})).await.unwrap_err();
        assert!(matches!(err, RpcError::Transport { .. }));
        assert_eq!(c.pending_count(), 0);
    }

    #[tokio::test]
    async fn emit_publishes_one_event_and_acks() {
        let broker = MemoryBroker::recording();
        let c = client(&broker, None);
        assert!(matches!(c.emit("mail.send", &json!({})).await, Err(RpcError::NotReady(_))));

        c.connect().await.unwrap();
        let ack = c.emit("mail.send", &json!({"code": "0423"})).await.unwrap();
        assert_eq!(ack.topic, "mail.send");
        let sent = broker.messages_for_topic("mail.send");
        assert_eq!(sent.len(), 1);
        assert!(sent[0].correlation_id.is_none());
    }

    #[tokio::test]
    async fn shutdown_abandons_pending_calls() {
        let broker = MemoryBroker::recording();
        let _requests = broker.subscribe("user.create").await.unwrap();
        let c = Arc::new(client(&broker, None));
        c.subscribe_to_response_of("user.create");
        c.connect().await.unwrap();

        let call = tokio::spawn({
            let c = Arc::clone(&c);
            async move { c.call::<_, Value>("user.create", &json!({})).await }
        });
        while c.pending_count() == 0 {
            tokio::task::yield_now().await;
        }
        c.shutdown();
        assert!(matches!(call.await.unwrap(), Err(RpcError::Abandoned { .. })));
        assert!(!c.is_ready());
    }
}
