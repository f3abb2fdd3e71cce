//! Correlated request/reply over a publish/subscribe transport.
//!
//! A call publishes an [`Envelope`] on a topic with a fresh [`CorrelationId`] and waits
//! for the envelope carrying the same id on `<topic>.reply`. The matching is done by the
//! [`CorrelationClient`]; transports only move envelopes.

pub mod envelope;
pub mod errors;
pub mod transport;
pub mod memory;
pub mod nats;
pub mod client;

pub use client::{Ack, CorrelationClient};
pub use envelope::{CorrelationId, Envelope, ErrorBody};
pub use errors::{RpcError, TransportError};
pub use memory::MemoryBroker;
pub use transport::Transport;
