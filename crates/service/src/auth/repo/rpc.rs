//! Collaborators reached through the correlation client.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use common::topics;

use crate::auth::domain::{Company, Identity, IdentityPatch, NewCompany, NewIdentity};
use crate::auth::errors::AuthError;
use crate::auth::repository::{CompanyDirectory, Mailer, UserDirectory};
use crate::rpc::CorrelationClient;

/// Payload of `user.checkPassword`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PasswordCheck {
    pub id: String,
    pub password: String,
}

/// Payload of `mail.send`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodeMail {
    pub email: String,
    pub code: String,
}

/// Declare every reply topic the RPC collaborators await. Call before `connect`.
pub fn declare_topics(client: &CorrelationClient) {
    for topic in topics::USER_TOPICS.iter().chain(topics::COMPANY_TOPICS.iter()) {
        client.subscribe_to_response_of(topic);
    }
}

pub struct RpcUserDirectory {
    pub client: Arc<CorrelationClient>,
}

#[async_trait]
impl UserDirectory for RpcUserDirectory {
    async fn create_identity(&self, new: NewIdentity) -> Result<Identity, AuthError> {
        Ok(self.client.call(topics::USER_CREATE, &new).await?)
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<Identity>, AuthError> {
        Ok(self.client.call(topics::USER_FIND_BY_EMAIL, email).await?)
    }

    async fn find_by_email_or_phone(&self, login: &str) -> Result<Option<Identity>, AuthError> {
        Ok(self.client.call(topics::USER_FIND_BY_EMAIL_OR_PHONE, login).await?)
    }

    async fn update_identity(&self, patch: IdentityPatch) -> Result<Identity, AuthError> {
        Ok(self.client.call(topics::USER_UPDATE, &patch).await?)
    }

    async fn check_password(&self, id: &str, password: &str) -> Result<bool, AuthError> {
        let check = PasswordCheck { id: id.to_string(), password: password.to_string() };
        Ok(self.client.call(topics::USER_CHECK_PASSWORD, &check).await?)
    }
}

pub struct RpcCompanyDirectory {
    pub client: Arc<CorrelationClient>,
}

#[async_trait]
impl CompanyDirectory for RpcCompanyDirectory {
    async fn create_company(&self, new: NewCompany) -> Result<Company, AuthError> {
        Ok(self.client.call(topics::COMPANY_CREATE, &new).await?)
    }

    async fn get_by_id(&self, id: &str) -> Result<Option<Company>, AuthError> {
        Ok(self.client.call(topics::COMPANY_GET_BY_ID, id).await?)
    }

    async fn get_by_code(&self, code: &str) -> Result<Option<Company>, AuthError> {
        Ok(self.client.call(topics::COMPANY_GET_BY_CODE, code).await?)
    }

    async fn update_company(&self, company: Company) -> Result<Company, AuthError> {
        Ok(self.client.call(topics::COMPANY_UPDATE, &company).await?)
    }
}

pub struct RpcMailer {
    pub client: Arc<CorrelationClient>,
}

#[async_trait]
impl Mailer for RpcMailer {
    async fn send_code(&self, email: &str, code: &str) -> Result<(), AuthError> {
        let mail = CodeMail { email: email.to_string(), code: code.to_string() };
        self.client.emit(topics::MAILER_SEND, &mail).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::domain::{RegistrationKind, RegistrationStep};
    use crate::rpc::{ErrorBody, MemoryBroker, Transport};
    use serde_json::{json, Value};
    use std::time::Duration;

    async fn connected(broker: &MemoryBroker) -> Arc<CorrelationClient> {
        let client = Arc::new(CorrelationClient::new(Arc::new(broker.clone()), Some(Duration::from_secs(2))));
        declare_topics(&client);
        client.connect().await.unwrap();
        client
    }

    /// Reply to every request on `topic` with `f(payload)`.
    async fn respond<F>(broker: &MemoryBroker, topic: &str, f: F)
    where
        F: Fn(Value) -> Result<Value, ErrorBody> + Send + 'static,
    {
        let mut rx = broker.subscribe(topic).await.unwrap();
        let broker = broker.clone();
        tokio::spawn(async move {
            while let Some(req) = rx.recv().await {
                let reply = match f(req.payload.clone()) {
                    Ok(v) => req.reply_ok(v),
                    Err(body) => req.reply_err(body),
                };
                broker.publish(reply).await.unwrap();
            }
        });
    }

    #[tokio::test]
    async fn user_lookup_miss_is_none() {
        let broker = MemoryBroker::recording();
        respond(&broker, topics::USER_FIND_BY_EMAIL, |_| Ok(Value::Null)).await;
        let users = RpcUserDirectory { client: connected(&broker).await };
        assert!(users.find_by_email("nobody@x.com").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn create_identity_round_trips_through_the_user_topic() {
        let broker = MemoryBroker::recording();
        respond(&broker, topics::USER_CREATE, |payload| {
            let new: NewIdentity = serde_json::from_value(payload).unwrap();
            Ok(serde_json::to_value(new.into_identity("u-42".into())).unwrap())
        })
        .await;
        let users = RpcUserDirectory { client: connected(&broker).await };

        let created = users
            .create_identity(NewIdentity {
                email: "a@x.com".into(),
                phone: None,
                verification_code: "0423".into(),
                verification_code_issued_at: chrono::Utc::now(),
                registration_step: RegistrationStep::PendingVerification,
                registration_kind: RegistrationKind::Direct,
                current_company: None,
            })
            .await
            .unwrap();
        assert_eq!(created.id, "u-42");
        assert_eq!(created.verification_code.as_deref(), Some("0423"));
    }

    #[tokio::test]
    async fn collaborator_error_is_upstream_failure() {
        let broker = MemoryBroker::recording();
        respond(&broker, topics::COMPANY_GET_BY_CODE, |_| {
            Err(ErrorBody::new("repository", 1200, "db down"))
        })
        .await;
        let companies = RpcCompanyDirectory { client: connected(&broker).await };
        match companies.get_by_code("AB1!").await {
            Err(AuthError::UpstreamFailure { topic, correlation_id, .. }) => {
                assert_eq!(topic, topics::COMPANY_GET_BY_CODE);
                assert!(correlation_id.is_some());
            }
            other => panic!("expected upstream failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn mail_is_emitted_as_event() {
        let broker = MemoryBroker::recording();
        let mailer = RpcMailer { client: connected(&broker).await };
        mailer.send_code("a@x.com", "0423").await.unwrap();
        let sent = broker.messages_for_topic(topics::MAILER_SEND);
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].payload, json!({"email": "a@x.com", "code": "0423"}));
    }
}
