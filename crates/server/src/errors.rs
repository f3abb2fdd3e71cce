use service::auth::AuthError;
use service::rpc::ErrorBody;
use thiserror::Error;
use tracing::error;

/// Structured error object published on a command's reply topic.
pub fn error_body(err: &AuthError) -> ErrorBody {
    ErrorBody::new(err.kind(), err.code(), err.public_message())
}

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("transport unavailable: {0}")]
    Transport(String),
    #[error(transparent)]
    Any(#[from] anyhow::Error),
}

impl StartupError {
    pub fn log(&self) {
        error!(error = %self, "startup error");
    }
}
