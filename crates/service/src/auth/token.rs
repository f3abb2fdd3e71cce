use std::time::Duration;

use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::domain::{Identity, TokenPair};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

/// Minimal identity payload; enough to re-resolve the identity by email.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// identity id
    pub sub: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    pub kind: TokenKind,
    pub iat: u64,
    pub exp: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenError {
    #[error("token expired")]
    Expired,
    #[error("invalid token: {0}")]
    Invalid(String),
    #[error("expected a {expected:?} token")]
    WrongKind { expected: TokenKind },
    #[error("signing failed: {0}")]
    Signing(String),
}

/// Issues and checks HS256 access/refresh pairs signed with one process-wide secret.
#[derive(Clone)]
pub struct TokenService {
    encoding: EncodingKey,
    decoding: DecodingKey,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl TokenService {
    pub fn new(secret: &str, access_ttl: Duration, refresh_ttl: Duration) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            access_ttl,
            refresh_ttl,
        }
    }

    pub fn issue(&self, identity: &Identity) -> Result<TokenPair, TokenError> {
        let now = chrono::Utc::now().timestamp().max(0) as u64;
        Ok(TokenPair {
            access_token: self.sign(identity, TokenKind::Access, now, self.access_ttl)?,
            refresh_token: self.sign(identity, TokenKind::Refresh, now, self.refresh_ttl)?,
        })
    }

    fn sign(&self, identity: &Identity, kind: TokenKind, now: u64, ttl: Duration) -> Result<String, TokenError> {
        let claims = Claims {
            sub: identity.id.clone(),
            email: identity.email.clone(),
            phone: identity.phone.clone(),
            kind,
            iat: now,
            exp: now.saturating_add(ttl.as_secs()),
        };
        encode(&Header::default(), &claims, &self.encoding).map_err(|e| TokenError::Signing(e.to_string()))
    }

    /// Verify signature and expiry. Fails closed on anything malformed.
    pub fn validate(&self, token: &str) -> Result<Claims, TokenError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        decode::<Claims>(token, &self.decoding, &validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => TokenError::Expired,
                _ => TokenError::Invalid(e.to_string()),
            })
    }

    /// [`validate`](Self::validate) plus a check that the token is a refresh token.
    pub fn validate_refresh(&self, token: &str) -> Result<Claims, TokenError> {
        let claims = self.validate(token)?;
        if claims.kind != TokenKind::Refresh {
            return Err(TokenError::WrongKind { expected: TokenKind::Refresh });
        }
        Ok(claims)
    }

    pub fn is_valid(&self, token: &str) -> bool {
        self.validate(token).is_ok()
    }

    /// Structural decode without signature or expiry checks.
    /// Only for tokens that already passed [`TokenService::validate`] in the same flow.
    pub fn decode(&self, token: &str) -> Result<Claims, TokenError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.insecure_disable_signature_validation();
        validation.validate_exp = false;
        validation.required_spec_claims.clear();
        decode::<Claims>(token, &DecodingKey::from_secret(&[]), &validation)
            .map(|data| data.claims)
            .map_err(|e| TokenError::Invalid(e.to_string()))
    }
}
