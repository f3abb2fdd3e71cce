use thiserror::Error;

use super::domain::RegistrationStep;
use super::registration::VerificationError;
use super::token::TokenError;
use crate::rpc::{CorrelationId, RpcError};

/// Business errors for auth workflows
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("{0} not found")]
    NotFound(String),
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("verification code is incorrect")]
    CodeMismatch,
    #[error("verification code has expired")]
    CodeExpired,
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    #[error("registration step {from:?} cannot advance to {to:?}")]
    InvalidTransition { from: RegistrationStep, to: RegistrationStep },
    #[error("not ready: {0}")]
    NotReady(String),
    #[error("no reply from {topic} in time (correlation {correlation_id})")]
    Timeout { topic: String, correlation_id: CorrelationId },
    #[error("upstream {topic} failed: {source}")]
    UpstreamFailure {
        topic: String,
        correlation_id: Option<CorrelationId>,
        #[source]
        source: RpcError,
    },
    #[error("hashing error: {0}")]
    HashError(String),
    #[error("token error: {0}")]
    TokenError(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl AuthError {
    /// Stable numeric code for external mapping/logging
    pub fn code(&self) -> u16 {
        match self {
            AuthError::Validation(_) => 1001,
            AuthError::NotFound(_) => 1003,
            AuthError::InvalidCredentials => 1004,
            AuthError::CodeMismatch => 1005,
            AuthError::CodeExpired => 1006,
            AuthError::Unauthorized(_) => 1007,
            AuthError::InvalidTransition { .. } => 1008,
            AuthError::HashError(_) => 1101,
            AuthError::TokenError(_) => 1102,
            AuthError::NotReady(_) => 1201,
            AuthError::Timeout { .. } => 1202,
            AuthError::UpstreamFailure { .. } => 1203,
            AuthError::Internal(_) => 1500,
        }
    }

    /// Stable machine-readable kind
    pub fn kind(&self) -> &'static str {
        match self {
            AuthError::Validation(_) => "validation_error",
            AuthError::NotFound(_) => "not_found",
            AuthError::InvalidCredentials => "invalid_credentials",
            AuthError::CodeMismatch => "code_mismatch",
            AuthError::CodeExpired => "code_expired",
            AuthError::Unauthorized(_) => "unauthorized",
            AuthError::InvalidTransition { .. } => "invalid_transition",
            AuthError::HashError(_) => "hash_error",
            AuthError::TokenError(_) => "token_error",
            AuthError::NotReady(_) => "not_ready",
            AuthError::Timeout { .. } => "timeout",
            AuthError::UpstreamFailure { .. } => "upstream_failure",
            AuthError::Internal(_) => "internal",
        }
    }

    /// Message safe to send across the service boundary: no transport internals.
    pub fn public_message(&self) -> String {
        match self {
            AuthError::UpstreamFailure { topic, .. } => format!("upstream {topic} failed"),
            AuthError::Timeout { topic, .. } => format!("upstream {topic} timed out"),
            AuthError::NotReady(_) => "service is starting".into(),
            AuthError::HashError(_) | AuthError::TokenError(_) | AuthError::Internal(_) => "internal error".into(),
            other => other.to_string(),
        }
    }
}

/// Collaborator failures keep topic and correlation id for observability.
impl From<RpcError> for AuthError {
    fn from(err: RpcError) -> Self {
        match err {
            RpcError::NotReady(msg) => AuthError::NotReady(msg),
            RpcError::Timeout { topic, correlation_id, .. } => AuthError::Timeout { topic, correlation_id },
            other => AuthError::UpstreamFailure {
                topic: other.topic().unwrap_or("unknown").to_string(),
                correlation_id: other.correlation_id(),
                source: other,
            },
        }
    }
}

impl From<VerificationError> for AuthError {
    fn from(err: VerificationError) -> Self {
        match err {
            VerificationError::CodeMismatch => AuthError::CodeMismatch,
            VerificationError::Expired => AuthError::CodeExpired,
        }
    }
}

impl From<TokenError> for AuthError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Signing(msg) => AuthError::TokenError(msg),
            other => AuthError::Unauthorized(other.to_string()),
        }
    }
}
