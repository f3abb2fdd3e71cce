use async_trait::async_trait;

use super::domain::{Company, Identity, IdentityPatch, NewCompany, NewIdentity};
use super::errors::AuthError;

/// User-storage collaborator.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn create_identity(&self, new: NewIdentity) -> Result<Identity, AuthError>;
    async fn find_by_email(&self, email: &str) -> Result<Option<Identity>, AuthError>;
    async fn find_by_email_or_phone(&self, login: &str) -> Result<Option<Identity>, AuthError>;
    async fn update_identity(&self, patch: IdentityPatch) -> Result<Identity, AuthError>;
    /// Password check performed by the user service itself.
    async fn check_password(&self, id: &str, password: &str) -> Result<bool, AuthError>;
}

/// Company-storage collaborator.
#[async_trait]
pub trait CompanyDirectory: Send + Sync {
    async fn create_company(&self, new: NewCompany) -> Result<Company, AuthError>;
    async fn get_by_id(&self, id: &str) -> Result<Option<Company>, AuthError>;
    async fn get_by_code(&self, code: &str) -> Result<Option<Company>, AuthError>;
    async fn update_company(&self, company: Company) -> Result<Company, AuthError>;
}

/// Mail delivery collaborator; sending is fire-and-forget.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send_code(&self, email: &str, code: &str) -> Result<(), AuthError>;
}

/// Simple in-memory mock collaborators for tests and doc examples
pub mod mock {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    use crate::auth::password::PasswordCrypto;
    use crate::rpc::{ErrorBody, CorrelationId, RpcError};

    fn upstream(topic: &str, message: &str) -> AuthError {
        RpcError::Remote {
            topic: topic.to_string(),
            correlation_id: CorrelationId::new(),
            body: ErrorBody::new("repository", 1200, message),
        }
        .into()
    }

    #[derive(Default)]
    pub struct MockUserDirectory {
        users: Mutex<HashMap<String, Identity>>, // key: id
        next_id: AtomicUsize,
        lookups: AtomicUsize,
        fail_create: AtomicBool,
        crypto: Option<Arc<dyn PasswordCrypto>>,
    }

    impl MockUserDirectory {
        /// `check_password` compares with `crypto` against the stored digest.
        pub fn with_crypto(crypto: Arc<dyn PasswordCrypto>) -> Self {
            Self { crypto: Some(crypto), ..Default::default() }
        }

        pub fn fail_create(&self, fail: bool) {
            self.fail_create.store(fail, Ordering::SeqCst);
        }

        /// Number of find/check calls served.
        pub fn lookups(&self) -> usize {
            self.lookups.load(Ordering::SeqCst)
        }

        pub fn get(&self, id: &str) -> Option<Identity> {
            self.users.lock().unwrap().get(id).cloned()
        }

        pub fn insert(&self, identity: Identity) {
            self.users.lock().unwrap().insert(identity.id.clone(), identity);
        }
    }

    #[async_trait]
    impl UserDirectory for MockUserDirectory {
        async fn create_identity(&self, new: NewIdentity) -> Result<Identity, AuthError> {
            if self.fail_create.load(Ordering::SeqCst) {
                return Err(upstream("user.create", "insert failed"));
            }
            let mut users = self.users.lock().unwrap();
            if users.values().any(|u| u.email == new.email) {
                return Err(upstream("user.create", "email already registered"));
            }
            let id = format!("user-{}", self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
            let identity = new.into_identity(id.clone());
            users.insert(id, identity.clone());
            Ok(identity)
        }

        async fn find_by_email(&self, email: &str) -> Result<Option<Identity>, AuthError> {
            self.lookups.fetch_add(1, Ordering::SeqCst);
            let users = self.users.lock().unwrap();
            Ok(users.values().find(|u| u.email == email).cloned())
        }

        async fn find_by_email_or_phone(&self, login: &str) -> Result<Option<Identity>, AuthError> {
            self.lookups.fetch_add(1, Ordering::SeqCst);
            let users = self.users.lock().unwrap();
            Ok(users
                .values()
                .find(|u| u.email == login || u.phone.as_deref() == Some(login))
                .cloned())
        }

        async fn update_identity(&self, patch: IdentityPatch) -> Result<Identity, AuthError> {
            let mut users = self.users.lock().unwrap();
            let identity = users
                .get_mut(&patch.id)
                .ok_or_else(|| upstream("user.update", "no such user"))?;
            identity.apply(&patch);
            Ok(identity.clone())
        }

        async fn check_password(&self, id: &str, password: &str) -> Result<bool, AuthError> {
            self.lookups.fetch_add(1, Ordering::SeqCst);
            let Some(identity) = self.get(id) else { return Ok(false) };
            match (&self.crypto, identity.password_salt, identity.password_digest) {
                (Some(crypto), Some(salt), Some(digest)) => crypto.compare(password, &salt, &digest),
                _ => Ok(false),
            }
        }
    }

    #[derive(Default)]
    pub struct MockCompanyDirectory {
        companies: Mutex<HashMap<String, Company>>, // key: id
        next_id: AtomicUsize,
        fail_create: AtomicBool,
    }

    impl MockCompanyDirectory {
        pub fn fail_create(&self, fail: bool) {
            self.fail_create.store(fail, Ordering::SeqCst);
        }

        pub fn get(&self, id: &str) -> Option<Company> {
            self.companies.lock().unwrap().get(id).cloned()
        }

        pub fn count(&self) -> usize {
            self.companies.lock().unwrap().len()
        }

        pub fn insert(&self, company: Company) {
            self.companies.lock().unwrap().insert(company.id.clone(), company);
        }
    }

    #[async_trait]
    impl CompanyDirectory for MockCompanyDirectory {
        async fn create_company(&self, new: NewCompany) -> Result<Company, AuthError> {
            if self.fail_create.load(Ordering::SeqCst) {
                return Err(upstream("company.create", "insert failed"));
            }
            let id = format!("company-{}", self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
            let company = new.into_company(id.clone());
            self.companies.lock().unwrap().insert(id, company.clone());
            Ok(company)
        }

        async fn get_by_id(&self, id: &str) -> Result<Option<Company>, AuthError> {
            Ok(self.get(id))
        }

        async fn get_by_code(&self, code: &str) -> Result<Option<Company>, AuthError> {
            let companies = self.companies.lock().unwrap();
            Ok(companies.values().find(|c| c.invite_code == code).cloned())
        }

        async fn update_company(&self, company: Company) -> Result<Company, AuthError> {
            let mut companies = self.companies.lock().unwrap();
            if !companies.contains_key(&company.id) {
                return Err(upstream("company.update", "no such company"));
            }
            companies.insert(company.id.clone(), company.clone());
            Ok(company)
        }
    }

    /// Records every code "sent".
    #[derive(Default)]
    pub struct MockMailer {
        sent: Mutex<Vec<(String, String)>>, // (email, code)
    }

    impl MockMailer {
        pub fn sent(&self) -> Vec<(String, String)> {
            self.sent.lock().unwrap().clone()
        }

        pub fn last_code_for(&self, email: &str) -> Option<String> {
            self.sent
                .lock()
                .unwrap()
                .iter()
                .rev()
                .find(|(to, _)| to == email)
                .map(|(_, code)| code.clone())
        }
    }

    #[async_trait]
    impl Mailer for MockMailer {
        async fn send_code(&self, email: &str, code: &str) -> Result<(), AuthError> {
            self.sent.lock().unwrap().push((email.to_string(), code.to_string()));
            Ok(())
        }
    }
}
