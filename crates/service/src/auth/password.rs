use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::{Algorithm, Argon2, Params, Version};
use rand::rngs::OsRng;

use super::errors::AuthError;

/// Hashed password as stored by the user service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HashedPassword {
    pub digest: String,
    pub salt: String,
}

/// Opaque password capability: hash with a fresh salt, compare against a stored digest.
pub trait PasswordCrypto: Send + Sync {
    fn hash(&self, password: &str) -> Result<HashedPassword, AuthError>;
    fn compare(&self, password: &str, salt: &str, digest: &str) -> Result<bool, AuthError>;
}

/// Argon2id with PHC-formatted digests.
#[derive(Clone, Default)]
pub struct Argon2Crypto {
    argon: Argon2<'static>,
}

impl Argon2Crypto {
    pub fn new() -> Self {
        Self::default()
    }

    /// Custom cost parameters (memory KiB, iterations, lanes).
    pub fn with_params(m_cost: u32, t_cost: u32, p_cost: u32) -> Result<Self, AuthError> {
        let params = Params::new(m_cost, t_cost, p_cost, None).map_err(|e| AuthError::HashError(e.to_string()))?;
        Ok(Self { argon: Argon2::new(Algorithm::Argon2id, Version::V0x13, params) })
    }
}

impl PasswordCrypto for Argon2Crypto {
    fn hash(&self, password: &str) -> Result<HashedPassword, AuthError> {
        let salt = SaltString::generate(&mut OsRng);
        let digest = self
            .argon
            .hash_password(password.trim().as_bytes(), &salt)
            .map_err(|e| AuthError::HashError(e.to_string()))?
            .to_string();
        Ok(HashedPassword { digest, salt: salt.as_str().to_string() })
    }

    /// Surrounding whitespace is ignored on both password and salt.
    fn compare(&self, password: &str, salt: &str, digest: &str) -> Result<bool, AuthError> {
        let parsed = PasswordHash::new(digest).map_err(|e| AuthError::HashError(e.to_string()))?;
        if parsed.salt.map(|s| s.as_str()) != Some(salt.trim()) {
            return Ok(false);
        }
        Ok(self.argon.verify_password(password.trim().as_bytes(), &parsed).is_ok())
    }
}
