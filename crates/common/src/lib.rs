//! Shared building blocks for the identity orchestrator crates.
//! - Topic names used on the message transport.
//! - Tracing initialisation helpers.
//! - Process-wide Prometheus metrics.

pub mod topics;
pub mod utils;
pub mod metrics;
