//! Data model for the authentication core.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A registered account handle.
///
/// The password verifier itself lives in the identity store and is never
/// carried on this type.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub id: Uuid,
    pub username: String,
}

/// Per-identity authentication state: biometric template, key pair, and the
/// lockout counters.
///
/// Mutated only by the lockout policy and the engine; `locked == true`
/// implies `last_failure_at` is set, and `failed_attempts` drops back to 0
/// whenever the lock clears.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AuthProfile {
    pub identity_id: Uuid,
    pub face_template: Option<Vec<u8>>,
    pub public_key: Option<Vec<u8>>,
    // Raw key bytes at rest, like the rest of the profile. Hardening the
    // private key storage is an operational concern outside this crate.
    pub private_key: Option<Vec<u8>>,
    pub failed_attempts: u32,
    pub last_failure_at: Option<DateTime<Utc>>,
    pub locked: bool,
}

impl AuthProfile {
    #[must_use]
    pub fn new(identity_id: Uuid) -> Self {
        Self {
            identity_id,
            face_template: None,
            public_key: None,
            private_key: None,
            failed_attempts: 0,
            last_failure_at: None,
            locked: false,
        }
    }

    /// A present template means the biometric factor is required at login.
    #[must_use]
    pub fn has_face_template(&self) -> bool {
        self.face_template.is_some()
    }

    #[must_use]
    pub fn has_key_pair(&self) -> bool {
        self.public_key.is_some() && self.private_key.is_some()
    }
}

/// A short-lived signed assertion minted on successful authentication.
///
/// Immutable once stored except for the one-way `consumed` flip; expired or
/// consumed challenges never validate.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Challenge {
    pub token: Uuid,
    pub identity_id: Uuid,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub signature: Vec<u8>,
    pub consumed: bool,
}

/// One row of the append-only attempt log.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AttemptRecord {
    pub identity_id: Uuid,
    pub attempted_at: DateTime<Utc>,
    pub succeeded: bool,
    pub source_address: Option<String>,
    pub client_agent: Option<String>,
    pub face_score: Option<f64>,
    pub signature_verified: Option<bool>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_profile_is_unlocked_with_no_history() {
        let profile = AuthProfile::new(Uuid::new_v4());
        assert_eq!(profile.failed_attempts, 0);
        assert!(!profile.locked);
        assert!(profile.last_failure_at.is_none());
        assert!(!profile.has_face_template());
        assert!(!profile.has_key_pair());
    }

    #[test]
    fn key_pair_requires_both_halves() {
        let mut profile = AuthProfile::new(Uuid::new_v4());
        profile.public_key = Some(vec![1; 32]);
        assert!(!profile.has_key_pair());
        profile.private_key = Some(vec![2; 32]);
        assert!(profile.has_key_pair());
    }
}
