//! Postgres-backed collaborators for the authentication core.

use anyhow::{anyhow, Context, Result};
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use sqlx::{PgPool, Row};
use tracing::Instrument;
use uuid::Uuid;

use crate::auth::models::{AttemptRecord, AuthProfile, Challenge, Identity};
use crate::auth::store::{
    AttemptLog, ChallengeStore, CreatedIdentity, IdentityStore, ProfileStore,
};

/// Hash a password for storage; only the PHC string ever reaches the
/// database.
fn hash_password(password: &SecretString) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.expose_secret().as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|err| anyhow!("failed to hash password: {err}"))
}

fn password_matches(stored: &str, password: &SecretString) -> bool {
    PasswordHash::new(stored).is_ok_and(|parsed| {
        Argon2::default()
            .verify_password(password.expose_secret().as_bytes(), &parsed)
            .is_ok()
    })
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().is_some_and(|code| code.as_ref() == "23505"),
        _ => false,
    }
}

#[derive(Clone)]
pub struct PgIdentityStore {
    pool: PgPool,
}

impl PgIdentityStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl IdentityStore for PgIdentityStore {
    async fn lookup(&self, username: &str) -> Result<Option<Identity>> {
        let query = "SELECT id, username FROM identities WHERE username = $1";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(username)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to lookup identity")?;

        Ok(row.map(|row| Identity {
            id: row.get("id"),
            username: row.get("username"),
        }))
    }

    async fn verify_password(&self, identity: &Identity, password: &SecretString) -> Result<bool> {
        let query = "SELECT password_hash FROM identities WHERE id = $1";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(identity.id)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to fetch password verifier")?;

        let Some(row) = row else {
            return Ok(false);
        };
        let stored: String = row.get("password_hash");
        Ok(password_matches(&stored, password))
    }

    async fn create(&self, username: &str, password: &SecretString) -> Result<CreatedIdentity> {
        let password_hash = hash_password(password)?;

        let query = "INSERT INTO identities (username, password_hash) VALUES ($1, $2) RETURNING id";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(username)
            .bind(&password_hash)
            .fetch_one(&self.pool)
            .instrument(span)
            .await;

        match row {
            Ok(row) => Ok(CreatedIdentity::Created(Identity {
                id: row.get("id"),
                username: username.to_string(),
            })),
            Err(err) if is_unique_violation(&err) => Ok(CreatedIdentity::Conflict),
            Err(err) => Err(err).context("failed to insert identity"),
        }
    }
}

#[derive(Clone)]
pub struct PgProfileStore {
    pool: PgPool,
}

impl PgProfileStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ProfileStore for PgProfileStore {
    async fn get(&self, identity_id: Uuid) -> Result<Option<AuthProfile>> {
        let query = r"
            SELECT face_template, public_key, private_key,
                   failed_attempts, last_failure_at, locked
            FROM auth_profiles
            WHERE identity_id = $1
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(identity_id)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to fetch auth profile")?;

        Ok(row.map(|row| {
            let failed_attempts: i32 = row.get("failed_attempts");
            AuthProfile {
                identity_id,
                face_template: row.get("face_template"),
                public_key: row.get("public_key"),
                private_key: row.get("private_key"),
                failed_attempts: u32::try_from(failed_attempts).unwrap_or(0),
                last_failure_at: row.get("last_failure_at"),
                locked: row.get("locked"),
            }
        }))
    }

    async fn create(&self, identity_id: Uuid) -> Result<AuthProfile> {
        // Idempotent: a concurrent create for the same identity wins or
        // loses harmlessly, and the canonical row is read back either way.
        let query = r"
            INSERT INTO auth_profiles (identity_id)
            VALUES ($1)
            ON CONFLICT (identity_id) DO NOTHING
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        sqlx::query(query)
            .bind(identity_id)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to insert auth profile")?;

        self.get(identity_id)
            .await?
            .context("auth profile missing after create")
    }

    async fn save(&self, profile: &AuthProfile) -> Result<()> {
        let query = r"
            UPDATE auth_profiles
            SET face_template = $2,
                public_key = $3,
                private_key = $4,
                failed_attempts = $5,
                last_failure_at = $6,
                locked = $7,
                updated_at = NOW()
            WHERE identity_id = $1
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        sqlx::query(query)
            .bind(profile.identity_id)
            .bind(profile.face_template.as_deref())
            .bind(profile.public_key.as_deref())
            .bind(profile.private_key.as_deref())
            .bind(i32::try_from(profile.failed_attempts).unwrap_or(i32::MAX))
            .bind(profile.last_failure_at)
            .bind(profile.locked)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to save auth profile")?;
        Ok(())
    }
}

#[derive(Clone)]
pub struct PgAttemptLog {
    pool: PgPool,
}

impl PgAttemptLog {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AttemptLog for PgAttemptLog {
    async fn append(&self, record: &AttemptRecord) -> Result<()> {
        let query = r"
            INSERT INTO login_attempts
                (identity_id, attempted_at, succeeded, source_address,
                 client_agent, face_score, signature_verified)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        sqlx::query(query)
            .bind(record.identity_id)
            .bind(record.attempted_at)
            .bind(record.succeeded)
            .bind(record.source_address.as_deref())
            .bind(record.client_agent.as_deref())
            .bind(record.face_score)
            .bind(record.signature_verified)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to append attempt record")?;
        Ok(())
    }

    async fn recent_for(&self, identity_id: Uuid, limit: i64) -> Result<Vec<AttemptRecord>> {
        let query = r"
            SELECT attempted_at, succeeded, source_address, client_agent,
                   face_score, signature_verified
            FROM login_attempts
            WHERE identity_id = $1
            ORDER BY attempted_at DESC, id DESC
            LIMIT $2
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let rows = sqlx::query(query)
            .bind(identity_id)
            .bind(limit)
            .fetch_all(&self.pool)
            .instrument(span)
            .await
            .context("failed to fetch recent attempts")?;

        Ok(rows
            .into_iter()
            .map(|row| AttemptRecord {
                identity_id,
                attempted_at: row.get("attempted_at"),
                succeeded: row.get("succeeded"),
                source_address: row.get("source_address"),
                client_agent: row.get("client_agent"),
                face_score: row.get("face_score"),
                signature_verified: row.get("signature_verified"),
            })
            .collect())
    }
}

#[derive(Clone)]
pub struct PgChallengeStore {
    pool: PgPool,
}

impl PgChallengeStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ChallengeStore for PgChallengeStore {
    async fn save(&self, challenge: &Challenge) -> Result<()> {
        let query = r"
            INSERT INTO challenges
                (token, identity_id, issued_at, expires_at, signature, consumed)
            VALUES ($1, $2, $3, $4, $5, $6)
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        sqlx::query(query)
            .bind(challenge.token)
            .bind(challenge.identity_id)
            .bind(challenge.issued_at)
            .bind(challenge.expires_at)
            .bind(challenge.signature.as_slice())
            .bind(challenge.consumed)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to save challenge")?;
        Ok(())
    }

    async fn get(&self, token: Uuid) -> Result<Option<Challenge>> {
        let query = r"
            SELECT identity_id, issued_at, expires_at, signature, consumed
            FROM challenges
            WHERE token = $1
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(token)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to fetch challenge")?;

        Ok(row.map(|row| Challenge {
            token,
            identity_id: row.get("identity_id"),
            issued_at: row.get("issued_at"),
            expires_at: row.get("expires_at"),
            signature: row.get("signature"),
            consumed: row.get("consumed"),
        }))
    }

    async fn mark_consumed(&self, token: Uuid) -> Result<()> {
        let query = "UPDATE challenges SET consumed = TRUE WHERE token = $1";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        sqlx::query(query)
            .bind(token)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to mark challenge consumed")?;
        Ok(())
    }
}
