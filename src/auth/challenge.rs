//! Challenge issuance and Ed25519 signing for the login assertion.
//!
//! A challenge is a random token minted on successful authentication and
//! signed with the account's private key; presenting the token plus a valid
//! signature before expiry proves the login happened here.

use chrono::{DateTime, Duration, Utc};
use ed25519_dalek::{
    Signature, Signer, SigningKey, Verifier, VerifyingKey, PUBLIC_KEY_LENGTH, SECRET_KEY_LENGTH,
};
use rand::rngs::OsRng;
use thiserror::Error;
use uuid::Uuid;

/// Challenges expire a fixed five minutes after issuance, used or not.
pub const CHALLENGE_TTL_MINUTES: i64 = 5;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SignError {
    #[error("no private key available for signing")]
    MissingKey,
    #[error("private key material is malformed")]
    MalformedKey,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum VerifyError {
    #[error("public key material is malformed")]
    MalformedKey,
}

/// Raw Ed25519 key material as stored on the profile.
#[derive(Clone, Debug)]
pub struct KeyPair {
    pub public: Vec<u8>,
    pub private: Vec<u8>,
}

/// Generate a fresh key pair. Done once at profile creation; the engine only
/// regenerates as an explicit repair path for profiles found without keys.
#[must_use]
pub fn generate_key_pair() -> KeyPair {
    let signing = SigningKey::generate(&mut OsRng);
    KeyPair {
        public: signing.verifying_key().to_bytes().to_vec(),
        private: signing.to_bytes().to_vec(),
    }
}

/// An unsigned, unpersisted challenge. The caller signs and stores it.
#[derive(Clone, Copy, Debug)]
pub struct IssuedChallenge {
    pub token: Uuid,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

#[must_use]
pub fn issue(now: DateTime<Utc>) -> IssuedChallenge {
    IssuedChallenge {
        token: Uuid::new_v4(),
        issued_at: now,
        expires_at: now + Duration::minutes(CHALLENGE_TTL_MINUTES),
    }
}

/// Sign the token's canonical string form with the profile's private key.
/// Deterministic for a given key and token.
pub fn sign(private_key: Option<&[u8]>, token: Uuid) -> Result<Vec<u8>, SignError> {
    let key = private_key.ok_or(SignError::MissingKey)?;
    let bytes: [u8; SECRET_KEY_LENGTH] = key.try_into().map_err(|_| SignError::MalformedKey)?;
    let signing = SigningKey::from_bytes(&bytes);
    let signature = signing.sign(token.to_string().as_bytes());
    Ok(signature.to_bytes().to_vec())
}

/// Verify a signature over the token.
///
/// Any malformed or mismatching signature is a `false` outcome, not an
/// error; only malformed key material fails.
pub fn verify(public_key: &[u8], token: Uuid, signature: &[u8]) -> Result<bool, VerifyError> {
    let bytes: [u8; PUBLIC_KEY_LENGTH] = public_key
        .try_into()
        .map_err(|_| VerifyError::MalformedKey)?;
    let verifying = VerifyingKey::from_bytes(&bytes).map_err(|_| VerifyError::MalformedKey)?;

    let Ok(signature) = Signature::from_slice(signature) else {
        return Ok(false);
    };

    Ok(verifying
        .verify(token.to_string().as_bytes(), &signature)
        .is_ok())
}
