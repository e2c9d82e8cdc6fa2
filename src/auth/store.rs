//! Collaborator interfaces required by the authentication engine.
//!
//! The engine only ever sees these traits; the Postgres implementations live
//! in `crate::storage`.

use crate::auth::models::{AttemptRecord, AuthProfile, Challenge, Identity};
use anyhow::Result;
use async_trait::async_trait;
use secrecy::SecretString;
use uuid::Uuid;

/// Outcome when creating a new identity (usernames are unique).
#[derive(Debug)]
pub enum CreatedIdentity {
    Created(Identity),
    Conflict,
}

#[async_trait]
pub trait IdentityStore: Send + Sync {
    async fn lookup(&self, username: &str) -> Result<Option<Identity>>;

    /// Check a password against the stored verifier. A wrong password is
    /// `Ok(false)`; only store faults are errors.
    async fn verify_password(&self, identity: &Identity, password: &SecretString) -> Result<bool>;

    async fn create(&self, username: &str, password: &SecretString) -> Result<CreatedIdentity>;
}

#[async_trait]
pub trait ProfileStore: Send + Sync {
    async fn get(&self, identity_id: Uuid) -> Result<Option<AuthProfile>>;

    /// Create an empty profile for the identity.
    async fn create(&self, identity_id: Uuid) -> Result<AuthProfile>;

    async fn save(&self, profile: &AuthProfile) -> Result<()>;
}

#[async_trait]
pub trait AttemptLog: Send + Sync {
    /// Append one record; the log is append-only.
    async fn append(&self, record: &AttemptRecord) -> Result<()>;

    /// Most recent records for an identity, newest first.
    async fn recent_for(&self, identity_id: Uuid, limit: i64) -> Result<Vec<AttemptRecord>>;
}

#[async_trait]
pub trait ChallengeStore: Send + Sync {
    async fn save(&self, challenge: &Challenge) -> Result<()>;

    async fn get(&self, token: Uuid) -> Result<Option<Challenge>>;

    /// Flip the one-way `consumed` flag.
    async fn mark_consumed(&self, token: Uuid) -> Result<()>;
}
