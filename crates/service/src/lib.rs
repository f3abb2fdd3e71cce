//! Service layer of the identity orchestrator.
//! - `rpc` turns one-way pub/sub messages into awaitable, correlated calls.
//! - `auth` holds the registration/verification flows built on top of it.
//! - Collaborators (user, company, mail services) are reached only through traits.

pub mod rpc;
pub mod auth;
