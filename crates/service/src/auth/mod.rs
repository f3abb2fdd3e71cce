//! Auth module: domain types, the registration state machine, credentials
//! (tokens and password hashing), collaborator ports and the orchestrating service.

pub mod domain;
pub mod errors;
pub mod password;
pub mod registration;
pub mod repository;
pub mod service;
pub mod token;
pub mod repo;

pub use domain::{RegistrationKind, RegistrationStep};
pub use errors::AuthError;
pub use service::{AuthPolicy, AuthService, Collaborators};
pub use token::TokenService;
