use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, info, instrument, warn};

use super::domain::{
    Account, AuthSession, ChangePasswordInput, Company, CompleteDetailsInput, Identity, IdentityPatch,
    InviteRegistrationInput, LoginInput, NewCompany, NewIdentity, RegisterInput, RegistrationKind,
    RegistrationStep, VerifyInput,
};
use super::errors::AuthError;
use super::password::PasswordCrypto;
use super::registration::{self, generate_invite_code, generate_numeric_code};
use super::repository::{CompanyDirectory, Mailer, UserDirectory};
use super::token::TokenService;

/// Registration policy knobs
#[derive(Debug, Clone)]
pub struct AuthPolicy {
    pub verification_code_length: usize,
    pub invite_code_length: usize,
    /// `None` disables code expiry.
    pub verification_code_ttl: Option<Duration>,
    /// Mail the new code on resend.
    pub notify_on_resend: bool,
}

impl Default for AuthPolicy {
    fn default() -> Self {
        Self {
            verification_code_length: 4,
            invite_code_length: 4,
            verification_code_ttl: None,
            notify_on_resend: true,
        }
    }
}

/// Collaborators the orchestrator talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub users: Arc<dyn UserDirectory>,
    pub companies: Arc<dyn CompanyDirectory>,
    pub mailer: Arc<dyn Mailer>,
}

/// Auth use-case layer: sequences collaborator calls, applies the registration
/// state machine and mints tokens. Independent of transport and wire format.
pub struct AuthService {
    users: Arc<dyn UserDirectory>,
    companies: Arc<dyn CompanyDirectory>,
    mailer: Arc<dyn Mailer>,
    tokens: TokenService,
    crypto: Arc<dyn PasswordCrypto>,
    policy: AuthPolicy,
}

impl AuthService {
    pub fn new(
        collaborators: Collaborators,
        tokens: TokenService,
        crypto: Arc<dyn PasswordCrypto>,
        policy: AuthPolicy,
    ) -> Self {
        Self {
            users: collaborators.users,
            companies: collaborators.companies,
            mailer: collaborators.mailer,
            tokens,
            crypto,
            policy,
        }
    }

    /// Direct sign-up: the identity starts awaiting e-mail verification.
    ///
    /// # Examples
    /// ```
    /// use std::{sync::Arc, time::Duration};
    /// use service::auth::{AuthService, AuthPolicy, Collaborators, TokenService, RegistrationStep};
    /// use service::auth::domain::RegisterInput;
    /// use service::auth::password::Argon2Crypto;
    /// use service::auth::repository::mock::{MockCompanyDirectory, MockMailer, MockUserDirectory};
    /// let svc = AuthService::new(
    ///     Collaborators {
    ///         users: Arc::new(MockUserDirectory::default()),
    ///         companies: Arc::new(MockCompanyDirectory::default()),
    ///         mailer: Arc::new(MockMailer::default()),
    ///     },
    ///     TokenService::new("secret", Duration::from_secs(60), Duration::from_secs(3600)),
    ///     Arc::new(Argon2Crypto::new()),
    ///     AuthPolicy::default(),
    /// );
    /// let input = RegisterInput { email: "a@x.com".into(), phone: Some("5551234".into()) };
    /// let session = tokio_test::block_on(svc.register(input)).unwrap();
    /// assert_eq!(session.identity.registration_step, RegistrationStep::PendingVerification);
    /// ```
    #[instrument(skip(self, input), fields(email = %input.email))]
    pub async fn register(&self, input: RegisterInput) -> Result<AuthSession, AuthError> {
        require_non_empty("email", &input.email)?;
        let code = generate_numeric_code(self.policy.verification_code_length);
        let identity = self
            .users
            .create_identity(NewIdentity {
                email: input.email,
                phone: input.phone,
                verification_code: code.clone(),
                verification_code_issued_at: Utc::now(),
                registration_step: registration::initial_step(RegistrationKind::Direct),
                registration_kind: RegistrationKind::Direct,
                current_company: None,
            })
            .await?;
        self.mailer.send_code(&identity.email, &code).await?;
        let tokens = self.tokens.issue(&identity)?;
        info!(user_id = %identity.id, "user_registered");
        Ok(AuthSession { identity, company: None, tokens })
    }

    #[instrument(skip(self, input), fields(login = %input.login))]
    pub async fn login(&self, input: LoginInput) -> Result<AuthSession, AuthError> {
        let identity = self
            .users
            .find_by_email_or_phone(&input.login)
            .await?
            .ok_or_else(|| AuthError::NotFound("user".into()))?;

        let (Some(salt), Some(digest)) = (&identity.password_salt, &identity.password_digest) else {
            debug!(user_id = %identity.id, "no password set");
            return Err(AuthError::InvalidCredentials);
        };
        if !self.crypto.compare(&input.password, salt, digest)? {
            return Err(AuthError::InvalidCredentials);
        }

        let company = self.resolve_company(&identity).await?;
        let tokens = self.tokens.issue(&identity)?;
        info!(user_id = %identity.id, "user_logged_in");
        Ok(AuthSession { identity, company, tokens })
    }

    /// Fails closed: any malformed, forged or expired token is `false`.
    pub fn verify_token(&self, token: &str) -> bool {
        self.tokens.is_valid(token)
    }

    /// Check the e-mailed code and move the identity one step forward in its sequence.
    #[instrument(skip(self, input), fields(email = %input.email))]
    pub async fn verify(&self, input: VerifyInput) -> Result<Identity, AuthError> {
        let identity = self.find_by_email(&input.email).await?;
        registration::check_verification_code_at(
            &identity,
            &input.email_code,
            self.policy.verification_code_ttl,
            Utc::now(),
        )?;

        let (from, to) = registration::verification_transition(identity.registration_kind);
        if identity.registration_step != from {
            return Err(AuthError::InvalidTransition { from: identity.registration_step, to });
        }
        let updated = self.advance(&identity, to).await?;
        info!(user_id = %updated.id, step = ?updated.registration_step, "user_verified");
        Ok(updated)
    }

    /// Replace the verification code and its issue time.
    #[instrument(skip(self))]
    pub async fn resend_code(&self, email: &str) -> Result<Identity, AuthError> {
        let identity = self.find_by_email(email).await?;
        let code = generate_numeric_code(self.policy.verification_code_length);
        let mut patch = IdentityPatch::for_identity(&identity.id);
        patch.verification_code = Some(code.clone());
        patch.verification_code_issued_at = Some(Utc::now());
        let updated = self.users.update_identity(patch).await?;
        if self.policy.notify_on_resend {
            self.mailer.send_code(&updated.email, &code).await?;
        }
        info!(user_id = %updated.id, "verification_code_reissued");
        Ok(updated)
    }

    #[instrument(skip(self, refresh_token))]
    pub async fn refresh(&self, refresh_token: &str) -> Result<AuthSession, AuthError> {
        if let Err(e) = self.tokens.validate_refresh(refresh_token) {
            debug!(error = %e, "refresh token rejected");
            return Err(e.into());
        }
        let claims = self.tokens.decode(refresh_token)?;

        let identity = self.find_by_email(&claims.email).await?;
        let company = self.resolve_company(&identity).await?;
        let tokens = self.tokens.issue(&identity)?;
        info!(user_id = %identity.id, "tokens_refreshed");
        Ok(AuthSession { identity, company, tokens })
    }

    /// Create the identity's company, set its password and finish a direct registration.
    ///
    /// The password is hashed before anything is written. A failure after the company
    /// is created leaves that company in place.
    #[instrument(skip(self, input), fields(email = %input.identity.email, company = %input.company.name))]
    pub async fn complete_details(&self, input: CompleteDetailsInput) -> Result<Account, AuthError> {
        let CompleteDetailsInput { identity: details, company: profile } = input;
        require_non_empty("password", &details.password)?;
        require_non_empty("company name", &profile.name)?;

        let identity = self.find_by_email(&details.email).await?;
        let to = RegistrationStep::Complete;
        if !registration::can_advance(identity.registration_step, to, identity.registration_kind) {
            return Err(AuthError::InvalidTransition { from: identity.registration_step, to });
        }

        let hashed = self.crypto.hash(&details.password)?;
        let company = self
            .companies
            .create_company(NewCompany {
                name: profile.name,
                employee_count_band: profile.employee_count_band,
                owner_user_id: identity.id.clone(),
                member_user_ids: vec![identity.id.clone()],
                invite_code: generate_invite_code(self.policy.invite_code_length),
            })
            .await?;

        let mut patch = IdentityPatch::for_identity(&identity.id);
        patch.phone = details.phone;
        patch.password_digest = Some(hashed.digest);
        patch.password_salt = Some(hashed.salt);
        patch.registration_step = Some(to);
        patch.current_company = Some(company.id.clone());
        let updated = self.users.update_identity(patch).await?;
        info!(user_id = %updated.id, company_id = %company.id, "registration_completed");
        Ok(Account { identity: updated, company: Some(company) })
    }

    /// Sign up an identity that joins an existing company.
    #[instrument(skip(self, input), fields(email = %input.email, company_id = %input.company_id))]
    pub async fn register_by_invite_code(&self, input: InviteRegistrationInput) -> Result<AuthSession, AuthError> {
        require_non_empty("email", &input.email)?;
        require_non_empty("company_id", &input.company_id)?;
        let code = generate_numeric_code(self.policy.verification_code_length);
        let kind = RegistrationKind::ByInviteCode;
        let identity = self
            .users
            .create_identity(NewIdentity {
                email: input.email,
                phone: input.phone,
                verification_code: code.clone(),
                verification_code_issued_at: Utc::now(),
                registration_step: registration::initial_step(kind),
                registration_kind: kind,
                current_company: Some(input.company_id),
            })
            .await?;
        self.mailer.send_code(&identity.email, &code).await?;

        let company_id = identity
            .current_company
            .clone()
            .ok_or_else(|| AuthError::Validation("identity has no company".into()))?;
        let mut company = self
            .companies
            .get_by_id(&company_id)
            .await?
            .ok_or_else(|| AuthError::NotFound("company".into()))?;
        if company.add_member(&identity.id) {
            company = self.companies.update_company(company).await?;
        }

        let tokens = self.tokens.issue(&identity)?;
        info!(user_id = %identity.id, company_id = %company.id, "user_registered_by_invite");
        Ok(AuthSession { identity, company: Some(company), tokens })
    }

    /// Company id behind an invite code.
    #[instrument(skip(self, code))]
    pub async fn resolve_company_by_code(&self, code: &str) -> Result<String, AuthError> {
        let company = self
            .companies
            .get_by_code(code)
            .await?
            .ok_or_else(|| AuthError::NotFound("company".into()))?;
        Ok(company.id)
    }

    /// The old password is checked by the user service; the new one is hashed here.
    #[instrument(skip(self, input), fields(email = %input.email, user_id = %input.id))]
    pub async fn change_password(&self, input: ChangePasswordInput) -> Result<Identity, AuthError> {
        require_non_empty("new_password", &input.new_password)?;
        let identity = self.find_by_email(&input.email).await?;
        if identity.id != input.id {
            return Err(AuthError::InvalidCredentials);
        }
        if !self.users.check_password(&identity.id, &input.password).await? {
            return Err(AuthError::InvalidCredentials);
        }
        let hashed = self.crypto.hash(&input.new_password)?;
        let mut patch = IdentityPatch::for_identity(&identity.id);
        patch.password_digest = Some(hashed.digest);
        patch.password_salt = Some(hashed.salt);
        let updated = self.users.update_identity(patch).await?;
        info!(user_id = %updated.id, "password_changed");
        Ok(updated)
    }

    async fn find_by_email(&self, email: &str) -> Result<Identity, AuthError> {
        self.users
            .find_by_email(email)
            .await?
            .ok_or_else(|| AuthError::NotFound("user".into()))
    }

    async fn advance(&self, identity: &Identity, to: RegistrationStep) -> Result<Identity, AuthError> {
        let from = identity.registration_step;
        if !registration::can_advance(from, to, identity.registration_kind) {
            return Err(AuthError::InvalidTransition { from, to });
        }
        let mut patch = IdentityPatch::for_identity(&identity.id);
        patch.registration_step = Some(to);
        self.users.update_identity(patch).await
    }

    /// A dangling company reference is logged and left unresolved.
    async fn resolve_company(&self, identity: &Identity) -> Result<Option<Company>, AuthError> {
        let Some(company_id) = identity.current_company.as_deref() else { return Ok(None) };
        let company = self.companies.get_by_id(company_id).await?;
        if company.is_none() {
            warn!(user_id = %identity.id, %company_id, "current company not found");
        }
        Ok(company)
    }
}

fn require_non_empty(field: &str, value: &str) -> Result<(), AuthError> {
    if value.trim().is_empty() {
        return Err(AuthError::Validation(format!("{field} is required")));
    }
    Ok(())
}
