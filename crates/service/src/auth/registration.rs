//! Registration state machine and code generation. Pure logic, no I/O.
//!
//! Step sequences per kind:
//! - `Direct`: `Created -> PendingVerification -> PendingDetails -> Complete`
//! - `ByInviteCode`: `Created -> PendingConnectVerification -> ConnectComplete`

use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::Rng;
use thiserror::Error;

use super::domain::{Identity, RegistrationKind, RegistrationStep};

use super::domain::RegistrationStep::*;

const DIRECT_SEQUENCE: [RegistrationStep; 4] = [Created, PendingVerification, PendingDetails, Complete];
const INVITE_SEQUENCE: [RegistrationStep; 3] = [Created, PendingConnectVerification, ConnectComplete];

/// Digits drawn per random sample; 10^11 stays well inside u64.
const DIGITS_PER_DRAW: usize = 11;

const INVITE_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789!@#$%^&*";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum VerificationError {
    #[error("verification code mismatch")]
    CodeMismatch,
    #[error("verification code expired")]
    Expired,
}

pub fn sequence(kind: RegistrationKind) -> &'static [RegistrationStep] {
    match kind {
        RegistrationKind::Direct => &DIRECT_SEQUENCE,
        RegistrationKind::ByInviteCode => &INVITE_SEQUENCE,
    }
}

/// Immediate successor of `step` within `kind`'s sequence.
pub fn next_step(kind: RegistrationKind, step: RegistrationStep) -> Option<RegistrationStep> {
    let seq = sequence(kind);
    let pos = seq.iter().position(|s| *s == step)?;
    seq.get(pos + 1).copied()
}

/// Step a freshly created identity of `kind` is stored with.
pub fn initial_step(kind: RegistrationKind) -> RegistrationStep {
    // Every sequence has at least two steps.
    next_step(kind, Created).unwrap_or(Created)
}

/// Transition performed by a successful code verification for `kind`.
pub fn verification_transition(kind: RegistrationKind) -> (RegistrationStep, RegistrationStep) {
    match kind {
        RegistrationKind::Direct => (PendingVerification, PendingDetails),
        RegistrationKind::ByInviteCode => (PendingConnectVerification, ConnectComplete),
    }
}

/// True only if `to` immediately follows `from` in `kind`'s sequence.
pub fn can_advance(from: RegistrationStep, to: RegistrationStep, kind: RegistrationKind) -> bool {
    next_step(kind, from) == Some(to)
}

/// Exact, case-sensitive comparison against the stored code. A missing code never matches.
pub fn check_verification_code(identity: &Identity, supplied: &str) -> Result<(), VerificationError> {
    match identity.verification_code.as_deref() {
        Some(code) if code == supplied => Ok(()),
        _ => Err(VerificationError::CodeMismatch),
    }
}

/// [`check_verification_code`] plus an optional age limit. With a limit set, a code whose
/// issue time is unknown counts as expired.
pub fn check_verification_code_at(
    identity: &Identity,
    supplied: &str,
    ttl: Option<Duration>,
    now: DateTime<Utc>,
) -> Result<(), VerificationError> {
    check_verification_code(identity, supplied)?;
    let Some(ttl) = ttl else { return Ok(()) };
    let issued_at = identity.verification_code_issued_at.ok_or(VerificationError::Expired)?;
    let age = now.signed_duration_since(issued_at);
    match chrono::Duration::from_std(ttl) {
        Ok(limit) if age <= limit => Ok(()),
        Ok(_) => Err(VerificationError::Expired),
        // ttl too large to represent: effectively never expires
        Err(_) => Ok(()),
    }
}

/// Zero-padded decimal code of exactly `length` digits, uniform over `0..10^length`.
/// Long codes are built from independent chunks of at most [`DIGITS_PER_DRAW`] digits.
pub fn generate_numeric_code(length: usize) -> String {
    let mut rng = rand::thread_rng();
    let mut code = String::with_capacity(length);
    let mut remaining = length;
    while remaining > 0 {
        let width = remaining.min(DIGITS_PER_DRAW);
        let bound = 10u64.pow(width as u32);
        let n: u64 = rng.gen_range(0..bound);
        code.push_str(&format!("{n:0width$}"));
        remaining -= width;
    }
    code
}

/// `length` characters drawn uniformly from letters, digits and `!@#$%^&*`.
/// Uniqueness is left to the company service.
pub fn generate_invite_code(length: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..length)
        .map(|_| INVITE_ALPHABET[rng.gen_range(0..INVITE_ALPHABET.len())] as char)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::domain::NewIdentity;

    fn identity_with_code(code: Option<&str>, issued_at: Option<DateTime<Utc>>) -> Identity {
        let mut id = NewIdentity {
            email: "a@x.com".into(),
            phone: None,
            verification_code: String::new(),
            verification_code_issued_at: Utc::now(),
            registration_step: PendingVerification,
            registration_kind: RegistrationKind::Direct,
            current_company: None,
        }
        .into_identity("u1".into());
        id.verification_code = code.map(str::to_string);
        id.verification_code_issued_at = issued_at;
        id
    }

    #[test]
    fn numeric_code_has_exact_length_and_only_digits() {
        for length in [1, 2, 4, 6, 11, 12, 23, 40] {
            for _ in 0..50 {
                let code = generate_numeric_code(length);
                assert_eq!(code.len(), length, "length {length}: {code}");
                assert!(code.bytes().all(|b| b.is_ascii_digit()), "{code}");
            }
        }
        assert_eq!(generate_numeric_code(0), "");
    }

    #[test]
    fn numeric_code_keeps_leading_zeros() {
        // With 1-digit codes a zero shows up quickly if padding works.
        let saw_zero = (0..500).any(|_| generate_numeric_code(1) == "0");
        assert!(saw_zero);
    }

    #[test]
    fn invite_code_uses_alphabet() {
        let code = generate_invite_code(32);
        assert_eq!(code.chars().count(), 32);
        assert!(code.bytes().all(|b| INVITE_ALPHABET.contains(&b)));
    }

    #[test]
    fn direct_sequence_only_allows_immediate_successors() {
        let k = RegistrationKind::Direct;
        assert!(can_advance(Created, PendingVerification, k));
        assert!(can_advance(PendingVerification, PendingDetails, k));
        assert!(can_advance(PendingDetails, Complete, k));

        assert!(!can_advance(PendingVerification, Complete, k), "skip");
        assert!(!can_advance(PendingDetails, PendingVerification, k), "regress");
        assert!(!can_advance(Complete, Complete, k));
        assert!(!can_advance(PendingVerification, ConnectComplete, k), "foreign step");
    }

    #[test]
    fn invite_sequence_is_separate() {
        let k = RegistrationKind::ByInviteCode;
        assert!(can_advance(Created, PendingConnectVerification, k));
        assert!(can_advance(PendingConnectVerification, ConnectComplete, k));
        assert!(!can_advance(PendingVerification, PendingDetails, k));
        assert_eq!(next_step(k, ConnectComplete), None);
    }

    #[test]
    fn initial_and_verification_steps_follow_the_sequences() {
        assert_eq!(initial_step(RegistrationKind::Direct), PendingVerification);
        assert_eq!(initial_step(RegistrationKind::ByInviteCode), PendingConnectVerification);
        for kind in [RegistrationKind::Direct, RegistrationKind::ByInviteCode] {
            let (from, to) = verification_transition(kind);
            assert_eq!(from, initial_step(kind));
            assert!(can_advance(from, to, kind));
        }
    }

    #[test]
    fn code_check_is_exact() {
        let id = identity_with_code(Some("0423"), Some(Utc::now()));
        assert!(check_verification_code(&id, "0423").is_ok());
        assert_eq!(check_verification_code(&id, "423"), Err(VerificationError::CodeMismatch));
        assert_eq!(check_verification_code(&id, "0423 "), Err(VerificationError::CodeMismatch));

        let missing = identity_with_code(None, None);
        assert_eq!(check_verification_code(&missing, ""), Err(VerificationError::CodeMismatch));
    }

    #[test]
    fn code_expiry_is_optional() {
        let now = Utc::now();
        let old = identity_with_code(Some("1111"), Some(now - chrono::Duration::seconds(120)));
        assert!(check_verification_code_at(&old, "1111", None, now).is_ok());
        assert!(check_verification_code_at(&old, "1111", Some(Duration::from_secs(300)), now).is_ok());
        assert_eq!(
            check_verification_code_at(&old, "1111", Some(Duration::from_secs(30)), now),
            Err(VerificationError::Expired)
        );

        let undated = identity_with_code(Some("1111"), None);
        assert_eq!(
            check_verification_code_at(&undated, "1111", Some(Duration::from_secs(30)), now),
            Err(VerificationError::Expired)
        );
        // mismatch wins over expiry
        assert_eq!(
            check_verification_code_at(&old, "2222", Some(Duration::from_secs(30)), now),
            Err(VerificationError::CodeMismatch)
        );
    }
}
