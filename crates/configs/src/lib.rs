use std::time::Duration;

use anyhow::{anyhow, Result};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub transport: TransportConfig,
    #[serde(default)]
    pub runtime: RuntimeConfig,
}

/// Token signing and verification-code policy.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    #[serde(default)]
    pub jwt_secret: String,
    #[serde(default = "default_access_ttl")]
    pub access_token_ttl_secs: u64,
    #[serde(default = "default_refresh_ttl")]
    pub refresh_token_ttl_secs: u64,
    #[serde(default = "default_code_length")]
    pub verification_code_length: usize,
    #[serde(default = "default_code_length")]
    pub invite_code_length: usize,
    /// Unset means verification codes never expire.
    #[serde(default)]
    pub verification_code_ttl_secs: Option<u64>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: String::new(),
            access_token_ttl_secs: default_access_ttl(),
            refresh_token_ttl_secs: default_refresh_ttl(),
            verification_code_length: default_code_length(),
            invite_code_length: default_code_length(),
            verification_code_ttl_secs: None,
        }
    }
}

/// Message transport endpoint and correlation settings.
#[derive(Debug, Clone, Deserialize)]
pub struct TransportConfig {
    #[serde(default = "default_transport_url")]
    pub url: String,
    #[serde(default = "default_client_id")]
    pub client_id: String,
    #[serde(default)]
    pub group_id: String,
    /// 0 disables the per-call timeout.
    #[serde(default = "default_rpc_timeout")]
    pub rpc_timeout_ms: u64,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            url: default_transport_url(),
            client_id: default_client_id(),
            group_id: String::new(),
            rpc_timeout_ms: default_rpc_timeout(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct RuntimeConfig {
    #[serde(default)]
    pub worker_threads: Option<usize>,
}

const DEV_SECRET: &str = "dev-secret-change-me";
/// Ten years; longer token lifetimes are rejected.
pub const MAX_TOKEN_TTL_SECS: u64 = 10 * 365 * 24 * 3600;

fn default_access_ttl() -> u64 { 900 }
fn default_refresh_ttl() -> u64 { 86_400 }
fn default_code_length() -> usize { 4 }
fn default_transport_url() -> String { "nats://127.0.0.1:4222".into() }
fn default_client_id() -> String { "auth-service".into() }
fn default_rpc_timeout() -> u64 { 10_000 }

pub fn load_default() -> Result<AppConfig> {
    let path = std::env::var("CONFIG_PATH").unwrap_or_else(|_| "config.toml".to_string());
    load_from_file(&path)
}

pub fn load_from_file(path: &str) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path)?;
    parse(&content)
}

pub fn parse(content: &str) -> Result<AppConfig> {
    let cfg: AppConfig = toml::from_str(content)?;
    Ok(cfg)
}

impl AppConfig {
    /// Load `config.toml` if present (defaults otherwise), apply env overrides, validate.
    pub fn load_and_validate() -> Result<Self> {
        let mut cfg = match load_default() {
            Ok(cfg) => cfg,
            Err(e) if is_missing_file(&e) => AppConfig::default(),
            Err(e) => return Err(e),
        };
        cfg.apply_env(|key| std::env::var(key).ok())?;
        cfg.normalize_and_validate()?;
        Ok(cfg)
    }

    /// Overlay values from the environment. `lookup` is injected so tests need not touch process env.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("JWT_SECRET") { self.auth.jwt_secret = v; }
        if let Some(v) = lookup("JWT_ACCESS_EXPIRE_SECS") { self.auth.access_token_ttl_secs = parse_num("JWT_ACCESS_EXPIRE_SECS", &v)?; }
        if let Some(v) = lookup("JWT_REFRESH_EXPIRE_SECS") { self.auth.refresh_token_ttl_secs = parse_num("JWT_REFRESH_EXPIRE_SECS", &v)?; }
        if let Some(v) = lookup("VERIFICATION_CODE_LENGTH") { self.auth.verification_code_length = parse_num("VERIFICATION_CODE_LENGTH", &v)?; }
        if let Some(v) = lookup("INVITE_CODE_LENGTH") { self.auth.invite_code_length = parse_num("INVITE_CODE_LENGTH", &v)?; }
        if let Some(v) = lookup("VERIFICATION_CODE_TTL_SECS") { self.auth.verification_code_ttl_secs = Some(parse_num("VERIFICATION_CODE_TTL_SECS", &v)?); }
        if let Some(v) = lookup("TRANSPORT_URL") { self.transport.url = v; }
        if let Some(v) = lookup("TRANSPORT_CLIENT_ID") { self.transport.client_id = v; }
        if let Some(v) = lookup("TRANSPORT_GROUP_ID") { self.transport.group_id = v; }
        if let Some(v) = lookup("RPC_TIMEOUT_MS") { self.transport.rpc_timeout_ms = parse_num("RPC_TIMEOUT_MS", &v)?; }
        if let Some(v) = lookup("TOKIO_WORKER_THREADS") { self.runtime.worker_threads = Some(parse_num("TOKIO_WORKER_THREADS", &v)?); }
        Ok(())
    }

    pub fn normalize_and_validate(&mut self) -> Result<()> {
        self.auth.normalize();
        self.auth.validate()?;
        self.transport.normalize();
        self.transport.validate()?;
        if self.runtime.worker_threads == Some(0) {
            self.runtime.worker_threads = None;
        }
        Ok(())
    }
}

impl AuthConfig {
    fn normalize(&mut self) {
        if self.jwt_secret.trim().is_empty() {
            self.jwt_secret = DEV_SECRET.to_string();
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.access_token_ttl_secs == 0 || self.refresh_token_ttl_secs == 0 {
            return Err(anyhow!("token lifetimes must be positive seconds"));
        }
        if self.access_token_ttl_secs > MAX_TOKEN_TTL_SECS || self.refresh_token_ttl_secs > MAX_TOKEN_TTL_SECS {
            return Err(anyhow!("token lifetimes must not exceed {MAX_TOKEN_TTL_SECS} seconds"));
        }
        if self.refresh_token_ttl_secs < self.access_token_ttl_secs {
            return Err(anyhow!("refresh token lifetime must be >= access token lifetime"));
        }
        if self.verification_code_length == 0 || self.invite_code_length == 0 {
            return Err(anyhow!("code lengths must be >= 1"));
        }
        Ok(())
    }

    pub fn uses_dev_secret(&self) -> bool {
        self.jwt_secret == DEV_SECRET
    }

    pub fn access_token_ttl(&self) -> Duration { Duration::from_secs(self.access_token_ttl_secs) }
    pub fn refresh_token_ttl(&self) -> Duration { Duration::from_secs(self.refresh_token_ttl_secs) }
    pub fn verification_code_ttl(&self) -> Option<Duration> { self.verification_code_ttl_secs.map(Duration::from_secs) }
}

impl TransportConfig {
    fn normalize(&mut self) {
        if self.client_id.trim().is_empty() {
            self.client_id = default_client_id();
        }
        // A fresh group per process unless pinned, so every instance sees its own replies.
        if self.group_id.trim().is_empty() {
            self.group_id = format!("auth-consumer-{}", uuid::Uuid::new_v4());
        }
    }

    pub fn validate(&self) -> Result<()> {
        let lower = self.url.to_lowercase();
        if !(lower.starts_with("nats://") || lower.starts_with("memory://")) {
            return Err(anyhow!("transport.url must start with nats:// or memory://"));
        }
        Ok(())
    }

    pub fn rpc_timeout(&self) -> Option<Duration> {
        (self.rpc_timeout_ms > 0).then(|| Duration::from_millis(self.rpc_timeout_ms))
    }

    pub fn is_memory(&self) -> bool {
        self.url.to_lowercase().starts_with("memory://")
    }
}

fn parse_num<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value.trim().parse::<T>().map_err(|_| anyhow!("{key} must be a non-negative integer, got {value:?}"))
}

fn is_missing_file(e: &anyhow::Error) -> bool {
    e.downcast_ref::<std::io::Error>()
        .map(|io| io.kind() == std::io::ErrorKind::NotFound)
        .unwrap_or(false)
}
