use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Position of an identity within its onboarding sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RegistrationStep {
    Created,
    PendingVerification,
    PendingDetails,
    Complete,
    PendingConnectVerification,
    ConnectComplete,
}

/// Which onboarding sequence applies to an identity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RegistrationKind {
    #[default]
    Direct,
    ByInviteCode,
}

/// One registrant/account as stored by the user service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    pub id: String,
    pub email: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password_digest: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password_salt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verification_code: Option<String>,
    #[serde(default)]
    pub verification_code_issued_at: Option<DateTime<Utc>>,
    pub registration_step: RegistrationStep,
    #[serde(default)]
    pub registration_kind: RegistrationKind,
    /// Company id; resolved to a full [`Company`] on read.
    #[serde(default)]
    pub current_company: Option<String>,
}

impl Identity {
    /// Copy safe to hand back to callers: no password material, no verification code.
    pub fn redacted(mut self) -> Self {
        self.password_digest = None;
        self.password_salt = None;
        self.verification_code = None;
        self
    }

    /// Apply a partial update; `id` is never changed.
    pub fn apply(&mut self, patch: &IdentityPatch) {
        if let Some(v) = &patch.phone { self.phone = Some(v.clone()); }
        if let Some(v) = &patch.password_digest { self.password_digest = Some(v.clone()); }
        if let Some(v) = &patch.password_salt { self.password_salt = Some(v.clone()); }
        if let Some(v) = &patch.verification_code { self.verification_code = Some(v.clone()); }
        if let Some(v) = patch.verification_code_issued_at { self.verification_code_issued_at = Some(v); }
        if let Some(v) = patch.registration_step { self.registration_step = v; }
        if let Some(v) = &patch.current_company { self.current_company = Some(v.clone()); }
    }
}

/// Payload of `user.create`; the user service assigns the id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewIdentity {
    pub email: String,
    pub phone: Option<String>,
    pub verification_code: String,
    pub verification_code_issued_at: DateTime<Utc>,
    pub registration_step: RegistrationStep,
    pub registration_kind: RegistrationKind,
    pub current_company: Option<String>,
}

impl NewIdentity {
    pub fn into_identity(self, id: String) -> Identity {
        Identity {
            id,
            email: self.email,
            phone: self.phone,
            password_digest: None,
            password_salt: None,
            verification_code: Some(self.verification_code),
            verification_code_issued_at: Some(self.verification_code_issued_at),
            registration_step: self.registration_step,
            registration_kind: self.registration_kind,
            current_company: self.current_company,
        }
    }
}

/// Payload of `user.update`: only the fields set are changed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentityPatch {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password_digest: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password_salt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verification_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verification_code_issued_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registration_step: Option<RegistrationStep>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_company: Option<String>,
}

impl IdentityPatch {
    pub fn for_identity(id: &str) -> Self {
        Self { id: id.to_string(), ..Default::default() }
    }
}

/// Organization associated with one or more identities.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Company {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub employee_count_band: Option<String>,
    pub owner_user_id: String,
    #[serde(default)]
    pub member_user_ids: Vec<String>,
    pub invite_code: String,
}

impl Company {
    /// Add a member; returns false when already present. Members are never removed here.
    pub fn add_member(&mut self, user_id: &str) -> bool {
        if self.member_user_ids.iter().any(|m| m == user_id) {
            return false;
        }
        self.member_user_ids.push(user_id.to_string());
        true
    }
}

/// Payload of `company.create`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewCompany {
    pub name: String,
    pub employee_count_band: Option<String>,
    pub owner_user_id: String,
    pub member_user_ids: Vec<String>,
    pub invite_code: String,
}

impl NewCompany {
    pub fn into_company(self, id: String) -> Company {
        Company {
            id,
            name: self.name,
            employee_count_band: self.employee_count_band,
            owner_user_id: self.owner_user_id,
            member_user_ids: self.member_user_ids,
            invite_code: self.invite_code,
        }
    }
}

/// Signed access/refresh credential pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

/// Identity with its company resolved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub identity: Identity,
    pub company: Option<Company>,
}

impl Account {
    pub fn redacted(self) -> Self {
        Self { identity: self.identity.redacted(), company: self.company }
    }
}

/// Result of register/login/refresh flows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthSession {
    pub identity: Identity,
    pub company: Option<Company>,
    pub tokens: TokenPair,
}

impl AuthSession {
    pub fn redacted(self) -> Self {
        Self { identity: self.identity.redacted(), company: self.company, tokens: self.tokens }
    }
}

/// Registration input
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterInput {
    pub email: String,
    #[serde(default)]
    pub phone: Option<String>,
}

/// Login input; `login` is an email or a phone number.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginInput {
    #[serde(alias = "email")]
    pub login: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyInput {
    pub email: String,
    pub email_code: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetailsIdentityInput {
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub phone: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompanyProfileInput {
    pub name: String,
    #[serde(default)]
    pub employee_count_band: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompleteDetailsInput {
    pub identity: DetailsIdentityInput,
    pub company: CompanyProfileInput,
}

/// Sign-up of a new identity joining an existing company found via its invite code.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InviteRegistrationInput {
    pub email: String,
    #[serde(default)]
    pub phone: Option<String>,
    pub company_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordInput {
    pub id: String,
    pub email: String,
    pub password: String,
    pub new_password: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity() -> Identity {
        NewIdentity {
            email: "a@x.com".into(),
            phone: Some("5551234".into()),
            verification_code: "0423".into(),
            verification_code_issued_at: Utc::now(),
            registration_step: RegistrationStep::PendingVerification,
            registration_kind: RegistrationKind::Direct,
            current_company: None,
        }
        .into_identity("u1".into())
    }

    #[test]
    fn patch_only_touches_set_fields() {
        let mut id = identity();
        let mut patch = IdentityPatch::for_identity("ignored");
        patch.registration_step = Some(RegistrationStep::PendingDetails);
        id.apply(&patch);
        assert_eq!(id.id, "u1");
        assert_eq!(id.registration_step, RegistrationStep::PendingDetails);
        assert_eq!(id.verification_code.as_deref(), Some("0423"));
        assert_eq!(id.phone.as_deref(), Some("5551234"));
    }

    #[test]
    fn redaction_strips_secrets_from_the_wire() {
        let mut id = identity();
        id.password_digest = Some("digest".into());
        id.password_salt = Some("salt".into());
        let wire = serde_json::to_value(id.redacted()).unwrap();
        assert!(wire.get("passwordDigest").is_none());
        assert!(wire.get("passwordSalt").is_none());
        assert!(wire.get("verificationCode").is_none());
        assert_eq!(wire["registrationStep"], "PENDING_VERIFICATION");
    }

    #[test]
    fn login_accepts_email_alias() {
        let input: LoginInput = serde_json::from_str(r#"{"email":"a@x.com","password":"pw"}"#).unwrap();
        assert_eq!(input.login, "a@x.com");
    }

    #[test]
    fn members_only_grow_once_per_user() {
        let mut company = NewCompany {
            name: "Acme".into(),
            employee_count_band: None,
            owner_user_id: "u1".into(),
            member_user_ids: vec!["u1".into()],
            invite_code: "AB1!".into(),
        }
        .into_company("c1".into());
        assert!(!company.add_member("u1"));
        assert!(company.add_member("u2"));
        assert_eq!(company.member_user_ids, vec!["u1".to_string(), "u2".to_string()]);
    }
}
