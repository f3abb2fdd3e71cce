use std::time::Duration;

use thiserror::Error;

use super::envelope::{CorrelationId, ErrorBody};

/// Failure reported by a transport implementation.
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct TransportError(pub String);

/// Errors returned by the correlation client
#[derive(Debug, Error)]
pub enum RpcError {
    #[error("correlation client not ready: {0}")]
    NotReady(String),
    #[error("no reply on {topic} within {timeout:?} (correlation {correlation_id})")]
    Timeout {
        topic: String,
        correlation_id: CorrelationId,
        timeout: Duration,
    },
    #[error("transport error on {topic}: {source}")]
    Transport {
        topic: String,
        #[source]
        source: TransportError,
    },
    #[error("{topic} replied with error {body} (correlation {correlation_id})")]
    Remote {
        topic: String,
        correlation_id: CorrelationId,
        body: ErrorBody,
    },
    #[error("payload codec error on {topic}: {message}")]
    Codec { topic: String, message: String },
    #[error("call on {topic} abandoned before a reply arrived (correlation {correlation_id})")]
    Abandoned {
        topic: String,
        correlation_id: CorrelationId,
    },
}

impl RpcError {
    /// Topic of the call that failed, when known.
    pub fn topic(&self) -> Option<&str> {
        match self {
            RpcError::NotReady(_) => None,
            RpcError::Timeout { topic, .. }
            | RpcError::Transport { topic, .. }
            | RpcError::Remote { topic, .. }
            | RpcError::Codec { topic, .. }
            | RpcError::Abandoned { topic, .. } => Some(topic),
        }
    }

    pub fn correlation_id(&self) -> Option<CorrelationId> {
        match self {
            RpcError::Timeout { correlation_id, .. }
            | RpcError::Remote { correlation_id, .. }
            | RpcError::Abandoned { correlation_id, .. } => Some(*correlation_id),
            _ => None,
        }
    }
}
