//! Command loop: consume every routed topic and answer each correlated command with exactly one reply.

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use common::metrics::{COMMANDS_TOTAL, COMMAND_FAILURES_TOTAL};
use service::auth::AuthService;
use service::rpc::{Envelope, Transport};

use crate::errors::{error_body, StartupError};
use crate::routes::CommandTable;

struct Shared {
    transport: Arc<dyn Transport>,
    service: Arc<AuthService>,
    table: CommandTable,
}

pub struct CommandServer {
    shared: Arc<Shared>,
    group: String,
}

impl CommandServer {
    pub fn new(transport: Arc<dyn Transport>, service: Arc<AuthService>, table: CommandTable, group: String) -> Self {
        Self { shared: Arc::new(Shared { transport, service, table }), group }
    }

    /// Subscribe to every routed topic in the consumer group and start consuming.
    /// Returns once all subscriptions are live.
    pub async fn start(self) -> Result<RunningServer, StartupError> {
        let mut consumers = Vec::new();
        for topic in self.shared.table.topics() {
            let rx = self
                .shared
                .transport
                .subscribe_group(topic, &self.group)
                .await
                .map_err(|e| StartupError::Transport(format!("subscribe {topic}: {e}")))?;
            consumers.push(tokio::spawn(consume(topic, rx, Arc::clone(&self.shared))));
        }
        info!(topics = consumers.len(), group = %self.group, "command_server_started");
        Ok(RunningServer { consumers })
    }
}

pub struct RunningServer {
    consumers: Vec<JoinHandle<()>>,
}

impl RunningServer {
    /// Resolves when every subscription has closed.
    pub async fn wait(self) {
        for result in futures::future::join_all(self.consumers).await {
            if let Err(e) = result {
                if !e.is_cancelled() {
                    error!(error = %e, "command consumer panicked");
                }
            }
        }
    }

    pub fn shutdown(&self) {
        for consumer in &self.consumers {
            consumer.abort();
        }
    }
}

async fn consume(topic: &'static str, mut rx: mpsc::Receiver<Envelope>, shared: Arc<Shared>) {
    while let Some(envelope) = rx.recv().await {
        tokio::spawn(handle(envelope, Arc::clone(&shared)));
    }
    debug!(%topic, "command subscription closed");
}

async fn handle(mut envelope: Envelope, shared: Arc<Shared>) {
    let topic = envelope.topic.clone();
    let started = Instant::now();
    COMMANDS_TOTAL.with_label_values(&[topic.as_str()]).inc();
    info!(%topic, correlation_id = ?envelope.correlation_id, "command_received");

    let payload = std::mem::take(&mut envelope.payload);
    let outcome = shared.table.dispatch(Arc::clone(&shared.service), &topic, payload).await;
    if envelope.correlation_id.is_none() {
        if let Err(err) = &outcome {
            COMMAND_FAILURES_TOTAL.with_label_values(&[topic.as_str(), err.kind()]).inc();
        }
        info!(%topic, ok = outcome.is_ok(), "event handled without reply");
        return;
    }

    let reply = match outcome {
        Ok(output) => envelope.reply_ok(output),
        Err(err) => {
            COMMAND_FAILURES_TOTAL.with_label_values(&[topic.as_str(), err.kind()]).inc();
            warn!(%topic, correlation_id = ?envelope.correlation_id, kind = err.kind(), error = %err, "command_failed");
            envelope.reply_err(error_body(&err))
        }
    };

    let failed = reply.error.is_some();
    let destination = reply.topic.clone();
    match shared.transport.publish(reply).await {
        Ok(()) => info!(
            %topic,
            reply_to = %destination,
            correlation_id = ?envelope.correlation_id,
            failed,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "reply_sent"
        ),
        Err(e) => error!(%topic, reply_to = %destination, error = %e, "reply_publish_failed"),
    }
}
