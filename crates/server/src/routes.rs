//! Inbound command table: topic name -> handler.
//!
//! Handlers decode the JSON payload into the flow's input type, run the flow on the
//! [`AuthService`] and encode the (redacted) output as the reply payload.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use futures::future::{self, BoxFuture, FutureExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use common::topics;
use service::auth::domain::{
    Account, AuthSession, ChangePasswordInput, CompleteDetailsInput, Identity, InviteRegistrationInput, LoginInput,
    RegisterInput, VerifyInput,
};
use service::auth::{AuthError, AuthService};

pub type CommandFuture = BoxFuture<'static, Result<Value, AuthError>>;
pub type Handler = Arc<dyn Fn(Arc<AuthService>, Value) -> CommandFuture + Send + Sync>;

#[derive(Clone, Default)]
pub struct CommandTable {
    routes: HashMap<&'static str, Handler>,
}

impl CommandTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `flow` under `topic`. A payload that does not decode into `I` is a validation error.
    pub fn route<I, O, F, Fut>(mut self, topic: &'static str, flow: F) -> Self
    where
        I: DeserializeOwned + Send + 'static,
        O: Serialize + 'static,
        F: Fn(Arc<AuthService>, I) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<O, AuthError>> + Send + 'static,
    {
        let handler: Handler = Arc::new(move |svc: Arc<AuthService>, payload: Value| -> CommandFuture {
            let input = match serde_json::from_value::<I>(payload) {
                Ok(input) => input,
                Err(e) => {
                    return future::ready(Err(AuthError::Validation(format!("malformed {topic} payload: {e}")))).boxed()
                }
            };
            let fut = flow(svc, input);
            async move {
                let output = fut.await?;
                serde_json::to_value(output).map_err(|e| AuthError::Internal(e.to_string()))
            }
            .boxed()
        });
        self.routes.insert(topic, handler);
        self
    }

    /// Every inbound auth command.
    pub fn auth() -> Self {
        Self::new()
            .route(topics::AUTH_REGISTER, |svc, input: RegisterInput| async move {
                svc.register(input).await.map(AuthSession::redacted)
            })
            .route(topics::AUTH_LOGIN, |svc, input: LoginInput| async move {
                svc.login(input).await.map(AuthSession::redacted)
            })
            .route(topics::AUTH_VERIFY_TOKEN, |svc, token: String| async move {
                Ok::<_, AuthError>(svc.verify_token(&token))
            })
            .route(topics::AUTH_VERIFICATION, verify)
            .route(topics::AUTH_VERIFICATION_CONNECT, verify)
            .route(topics::AUTH_VERIFICATION_RESEND, |svc, email: String| async move {
                svc.resend_code(&email).await.map(Identity::redacted)
            })
            .route(topics::AUTH_REFRESH, |svc, refresh_token: String| async move {
                svc.refresh(&refresh_token).await.map(AuthSession::redacted)
            })
            .route(topics::AUTH_DETAILS, |svc, input: CompleteDetailsInput| async move {
                svc.complete_details(input).await.map(Account::redacted)
            })
            .route(topics::AUTH_REGISTER_BY_CODE, |svc, code: String| async move {
                svc.resolve_company_by_code(&code).await
            })
            .route(topics::AUTH_DETAILS_BY_CODE_COMPANY, |svc, input: InviteRegistrationInput| async move {
                svc.register_by_invite_code(input).await.map(AuthSession::redacted)
            })
            .route(topics::AUTH_CHANGE_PASSWORD, |svc, input: ChangePasswordInput| async move {
                svc.change_password(input).await.map(Identity::redacted)
            })
    }

    pub fn topics(&self) -> Vec<&'static str> {
        let mut topics: Vec<_> = self.routes.keys().copied().collect();
        topics.sort_unstable();
        topics
    }

    pub fn contains(&self, topic: &str) -> bool {
        self.routes.contains_key(topic)
    }

    pub fn dispatch(&self, svc: Arc<AuthService>, topic: &str, payload: Value) -> CommandFuture {
        match self.routes.get(topic) {
            Some(handler) => handler(svc, payload),
            None => future::ready(Err(AuthError::Validation(format!("unknown command {topic}")))).boxed(),
        }
    }
}

async fn verify(svc: Arc<AuthService>, input: VerifyInput) -> Result<Identity, AuthError> {
    svc.verify(input).await.map(Identity::redacted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use serde_json::json;
    use service::auth::password::Argon2Crypto;
    use service::auth::repository::mock::{MockCompanyDirectory, MockMailer, MockUserDirectory};
    use service::auth::{AuthPolicy, Collaborators, TokenService};

    fn service() -> Arc<AuthService> {
        Arc::new(AuthService::new(
            Collaborators {
                users: Arc::new(MockUserDirectory::default()),
                companies: Arc::new(MockCompanyDirectory::default()),
                mailer: Arc::new(MockMailer::default()),
            },
            TokenService::new("test-secret", Duration::from_secs(60), Duration::from_secs(3600)),
            Arc::new(Argon2Crypto::new()),
            AuthPolicy::default(),
        ))
    }

    #[test]
    fn every_auth_topic_is_routed() {
        let table = CommandTable::auth();
        for topic in [
            topics::AUTH_REGISTER,
            topics::AUTH_LOGIN,
            topics::AUTH_VERIFY_TOKEN,
            topics::AUTH_VERIFICATION,
            topics::AUTH_VERIFICATION_CONNECT,
            topics::AUTH_VERIFICATION_RESEND,
            topics::AUTH_REFRESH,
            topics::AUTH_DETAILS,
            topics::AUTH_REGISTER_BY_CODE,
            topics::AUTH_DETAILS_BY_CODE_COMPANY,
            topics::AUTH_CHANGE_PASSWORD,
        ] {
            assert!(table.contains(topic), "{topic}");
        }
        assert_eq!(table.topics().len(), 11);
    }

    #[tokio::test]
    async fn register_reply_is_redacted() {
        let table = CommandTable::auth();
        let reply = table
            .dispatch(service(), topics::AUTH_REGISTER, json!({"email": "a@x.com", "phone": "5551234"}))
            .await
            .unwrap();
        assert_eq!(reply["identity"]["registrationStep"], "PENDING_VERIFICATION");
        assert!(reply["identity"].get("verificationCode").is_none());
        assert!(reply["tokens"]["accessToken"].is_string());
    }

    #[tokio::test]
    async fn malformed_payload_is_a_validation_error() {
        let table = CommandTable::auth();
        let err = table.dispatch(service(), topics::AUTH_LOGIN, json!({"password": 42})).await.unwrap_err();
        assert!(matches!(err, AuthError::Validation(_)));

        let err = table.dispatch(service(), "auth.unknown", Value::Null).await.unwrap_err();
        assert!(matches!(err, AuthError::Validation(_)));
    }

    #[tokio::test]
    async fn verify_token_replies_with_a_bool() {
        let table = CommandTable::auth();
        let reply = table.dispatch(service(), topics::AUTH_VERIFY_TOKEN, json!("garbage")).await.unwrap();
        assert_eq!(reply, json!(false));
    }
}
