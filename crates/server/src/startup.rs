use std::sync::Arc;

use configs::{AppConfig, AuthConfig, TransportConfig};
use tracing::{info, warn};

use service::auth::password::{Argon2Crypto, PasswordCrypto};
use service::auth::repo::rpc::{declare_topics, RpcCompanyDirectory, RpcMailer, RpcUserDirectory};
use service::auth::{AuthPolicy, AuthService, Collaborators, TokenService};
use service::rpc::nats::NatsTransport;
use service::rpc::{CorrelationClient, MemoryBroker, Transport};

use crate::commands::{CommandServer, RunningServer};
use crate::errors::StartupError;
use crate::routes::CommandTable;

/// Pick the transport named by `transport.url`.
pub async fn build_transport(cfg: &TransportConfig) -> Result<Arc<dyn Transport>, StartupError> {
    if cfg.is_memory() {
        info!("using in-process memory transport");
        return Ok(Arc::new(MemoryBroker::new()));
    }
    let nats = NatsTransport::connect(&cfg.url, &cfg.client_id)
        .await
        .map_err(|e| StartupError::Transport(e.to_string()))?;
    Ok(Arc::new(nats))
}

pub fn auth_policy(cfg: &AuthConfig) -> AuthPolicy {
    AuthPolicy {
        verification_code_length: cfg.verification_code_length,
        invite_code_length: cfg.invite_code_length,
        verification_code_ttl: cfg.verification_code_ttl(),
        ..AuthPolicy::default()
    }
}

/// Wire the orchestrator to RPC-backed collaborators sharing one correlation client.
pub fn build_service(cfg: &AuthConfig, client: Arc<CorrelationClient>) -> AuthService {
    let crypto: Arc<dyn PasswordCrypto> = Arc::new(Argon2Crypto::new());
    let collaborators = Collaborators {
        users: Arc::new(RpcUserDirectory { client: Arc::clone(&client) }),
        companies: Arc::new(RpcCompanyDirectory { client: Arc::clone(&client) }),
        mailer: Arc::new(RpcMailer { client }),
    };
    let tokens = TokenService::new(&cfg.jwt_secret, cfg.access_token_ttl(), cfg.refresh_token_ttl());
    AuthService::new(collaborators, tokens, crypto, auth_policy(cfg))
}

/// Connect the correlation client, then start consuming commands on `transport`.
pub async fn start(cfg: &AppConfig, transport: Arc<dyn Transport>) -> Result<RunningServer, StartupError> {
    let client = Arc::new(CorrelationClient::new(Arc::clone(&transport), cfg.transport.rpc_timeout()));
    declare_topics(&client);
    client.connect().await.map_err(|e| StartupError::Transport(e.to_string()))?;

    let service = Arc::new(build_service(&cfg.auth, client));
    CommandServer::new(transport, service, CommandTable::auth(), cfg.transport.group_id.clone())
        .start()
        .await
}

/// Public entry: build everything from `cfg` and serve until the transport closes.
pub async fn run(cfg: AppConfig) -> anyhow::Result<()> {
    if cfg.auth.uses_dev_secret() {
        warn!("JWT_SECRET is not set; using the development secret");
    }
    let transport = build_transport(&cfg.transport).await?;
    let server = start(&cfg, transport).await?;
    info!(
        client_id = %cfg.transport.client_id,
        group = %cfg.transport.group_id,
        url = %cfg.transport.url,
        "auth service listening"
    );
    server.wait().await;
    Ok(())
}
