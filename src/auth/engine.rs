//! The authentication decision engine.
//!
//! One login attempt runs a fixed sequence: lockout gate, password check,
//! face check (when a template is enrolled), then challenge issuance and
//! signing. The order never changes — a locked account's password is never
//! examined, and a face is never compared for an unauthenticated password.
//! Every terminal credential outcome appends exactly one attempt record.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use secrecy::SecretString;
use tokio::sync::Mutex;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::auth::challenge;
use crate::auth::face::{EnrollResult, FaceMatcher, FaceOracle, MatchResult, DEFAULT_TOLERANCE};
use crate::auth::lockout::{self, Gate};
use crate::auth::models::{AttemptRecord, AuthProfile, Challenge, Identity};
use crate::auth::store::{
    AttemptLog, ChallengeStore, CreatedIdentity, IdentityStore, ProfileStore,
};

const DEFAULT_MAX_ATTEMPTS: u32 = 5;
const DEFAULT_LOCKOUT_MINUTES: i64 = 15;

#[derive(Clone, Debug)]
pub struct AuthConfig {
    max_attempts: u32,
    lockout_minutes: i64,
    face_tolerance: f64,
}

impl AuthConfig {
    #[must_use]
    pub fn new() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            lockout_minutes: DEFAULT_LOCKOUT_MINUTES,
            face_tolerance: DEFAULT_TOLERANCE,
        }
    }

    #[must_use]
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    #[must_use]
    pub fn with_lockout_minutes(mut self, minutes: i64) -> Self {
        self.lockout_minutes = minutes.max(1);
        self
    }

    #[must_use]
    pub fn with_face_tolerance(mut self, tolerance: f64) -> Self {
        self.face_tolerance = tolerance.clamp(0.0, 1.0);
        self
    }

    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    #[must_use]
    pub fn lockout_minutes(&self) -> i64 {
        self.lockout_minutes
    }

    #[must_use]
    pub fn lockout(&self) -> Duration {
        Duration::minutes(self.lockout_minutes)
    }

    #[must_use]
    pub fn face_tolerance(&self) -> f64 {
        self.face_tolerance
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// One login submission. The face sample is raw image bytes, already decoded
/// from its transport encoding.
#[derive(Clone)]
pub struct LoginAttempt {
    pub username: String,
    pub password: SecretString,
    pub face_sample: Option<Vec<u8>>,
    pub source_address: Option<String>,
    pub client_agent: Option<String>,
}

/// Terminal outcome of a login attempt.
#[derive(Debug)]
pub enum LoginOutcome {
    Success {
        challenge: Challenge,
        face_score: Option<f64>,
    },
    InvalidCredentials,
    AccountLocked {
        retry_after_minutes: i64,
    },
    FaceRequired,
    FaceMismatch {
        score: f64,
    },
    FaceOracleError {
        reason: String,
    },
    SignatureError,
}

/// Verdict on a presented challenge token + signature.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChallengeVerdict {
    Verified,
    Expired,
    Consumed,
    BadSignature,
    Unknown,
}

/// Outcome of account registration.
#[derive(Debug)]
pub enum RegisterOutcome {
    Created {
        identity: Identity,
        face_enrolled: bool,
        face_error: Option<String>,
    },
    UsernameTaken,
}

/// Outcome of a pre-login face probe.
#[derive(Debug)]
pub enum FaceProbe {
    UnknownUser,
    NotEnrolled,
    Result(MatchResult),
}

enum PasswordPhase {
    Rejected(LoginOutcome),
    Accepted { face_template: Option<Vec<u8>> },
}

pub struct AuthEngine {
    identities: Arc<dyn IdentityStore>,
    profiles: Arc<dyn ProfileStore>,
    attempts: Arc<dyn AttemptLog>,
    challenges: Arc<dyn ChallengeStore>,
    matcher: FaceMatcher,
    config: AuthConfig,
    // Serializes profile read-modify-write per identity. Never held across
    // the face comparison or the oracle round trip.
    attempt_locks: Mutex<HashMap<Uuid, Arc<Mutex<()>>>>,
}

impl AuthEngine {
    #[must_use]
    pub fn new(
        identities: Arc<dyn IdentityStore>,
        profiles: Arc<dyn ProfileStore>,
        attempts: Arc<dyn AttemptLog>,
        challenges: Arc<dyn ChallengeStore>,
        oracle: Arc<dyn FaceOracle>,
        config: AuthConfig,
    ) -> Self {
        let matcher = FaceMatcher::new(oracle, config.face_tolerance());
        Self {
            identities,
            profiles,
            attempts,
            challenges,
            matcher,
            config,
            attempt_locks: Mutex::new(HashMap::new()),
        }
    }

    #[must_use]
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    /// Run one login attempt to a terminal outcome.
    ///
    /// # Errors
    /// Returns an error only for store faults before challenge issuance;
    /// faults during issuance map to [`LoginOutcome::SignatureError`].
    pub async fn login(&self, attempt: &LoginAttempt) -> Result<LoginOutcome> {
        let now = Utc::now();

        let Some(identity) = self.identities.lookup(&attempt.username).await? else {
            // Unknown users get the same outcome as a wrong password, with
            // no profile state to touch.
            return Ok(LoginOutcome::InvalidCredentials);
        };

        let lock = self.identity_lock(identity.id).await;

        // Lockout gate, password check, and failure bookkeeping run under
        // the identity lock.
        let face_template = {
            let _guard = lock.lock().await;
            match self.password_phase(&identity, attempt, now).await? {
                PasswordPhase::Rejected(outcome) => return Ok(outcome),
                PasswordPhase::Accepted { face_template } => face_template,
            }
        };

        let mut face_score = None;
        if let Some(template) = face_template {
            let Some(sample) = attempt.face_sample.as_deref() else {
                // The caller must resubmit with a sample; this is not
                // authentication evidence, so nothing is recorded.
                return Ok(LoginOutcome::FaceRequired);
            };

            match self.matcher.match_sample(&template, sample).await {
                MatchResult::Matched { score } => face_score = Some(score),
                MatchResult::NotMatched { score } => {
                    let _guard = lock.lock().await;
                    return self.face_mismatch(&identity, attempt, now, score).await;
                }
                MatchResult::NoFaceDetected => {
                    return Ok(LoginOutcome::FaceOracleError {
                        reason: "No face detected in the provided image.".to_string(),
                    });
                }
                MatchResult::MultipleFacesDetected => {
                    return Ok(LoginOutcome::FaceOracleError {
                        reason: "Multiple faces detected in the provided image.".to_string(),
                    });
                }
                MatchResult::OracleError { reason } => {
                    warn!(username = %identity.username, %reason, "face oracle failure");
                    return Ok(LoginOutcome::FaceOracleError { reason });
                }
            }
        }

        let _guard = lock.lock().await;
        match self.complete_login(&identity, attempt, now, face_score).await {
            Ok(outcome) => Ok(outcome),
            Err(err) => {
                // Faults past the credential checks are infrastructure
                // problems, not authentication evidence: no lockout
                // mutation, no failure record, never a Success.
                error!(username = %identity.username, "challenge issuance failed: {err:#}");
                Ok(LoginOutcome::SignatureError)
            }
        }
    }

    /// Check a presented token + signature against the stored challenge.
    /// A `Verified` verdict consumes the challenge.
    ///
    /// # Errors
    /// Returns an error on store faults or corrupted key material.
    pub async fn verify_challenge(
        &self,
        token: Uuid,
        signature: &[u8],
        now: DateTime<Utc>,
    ) -> Result<ChallengeVerdict> {
        let Some(challenge) = self.challenges.get(token).await? else {
            return Ok(ChallengeVerdict::Unknown);
        };
        if challenge.consumed {
            return Ok(ChallengeVerdict::Consumed);
        }
        // Expiry comes before any signature work; a valid signature cannot
        // resurrect an expired challenge.
        if now >= challenge.expires_at {
            return Ok(ChallengeVerdict::Expired);
        }

        let Some(profile) = self.profiles.get(challenge.identity_id).await? else {
            return Ok(ChallengeVerdict::BadSignature);
        };
        let Some(public_key) = profile.public_key.as_deref() else {
            return Ok(ChallengeVerdict::BadSignature);
        };

        let verified = challenge::verify(public_key, token, signature)
            .context("stored public key is malformed")?;
        if !verified {
            return Ok(ChallengeVerdict::BadSignature);
        }

        self.challenges.mark_consumed(token).await?;
        Ok(ChallengeVerdict::Verified)
    }

    /// Create an identity with an eagerly generated key pair and, when a
    /// sample is supplied, an enrolled face template. Enrollment problems
    /// degrade to a warning; the account is still created.
    ///
    /// # Errors
    /// Returns an error on store faults.
    pub async fn register(
        &self,
        username: &str,
        password: &SecretString,
        face_sample: Option<&[u8]>,
    ) -> Result<RegisterOutcome> {
        let identity = match self.identities.create(username, password).await? {
            CreatedIdentity::Created(identity) => identity,
            CreatedIdentity::Conflict => return Ok(RegisterOutcome::UsernameTaken),
        };

        let mut profile = self.profiles.create(identity.id).await?;
        let pair = challenge::generate_key_pair();
        profile.public_key = Some(pair.public);
        profile.private_key = Some(pair.private);

        let mut face_error = None;
        if let Some(sample) = face_sample {
            match self.matcher.enroll(sample).await {
                EnrollResult::Enrolled { template } => profile.face_template = Some(template),
                other => {
                    face_error = other.message().map(str::to_string);
                    warn!(
                        username,
                        reason = face_error.as_deref().unwrap_or("unknown"),
                        "face enrollment failed"
                    );
                }
            }
        }

        self.profiles.save(&profile).await?;
        info!(username, user_id = %identity.id, "registered new identity");

        Ok(RegisterOutcome::Created {
            face_enrolled: profile.face_template.is_some(),
            face_error,
            identity,
        })
    }

    /// Pre-login face probe. Never mutates lockout state or the attempt log.
    ///
    /// # Errors
    /// Returns an error on store faults.
    pub async fn probe_face(&self, username: &str, sample: &[u8]) -> Result<FaceProbe> {
        let Some(identity) = self.identities.lookup(username).await? else {
            return Ok(FaceProbe::UnknownUser);
        };
        let Some(profile) = self.profiles.get(identity.id).await? else {
            return Ok(FaceProbe::NotEnrolled);
        };
        let Some(template) = profile.face_template.as_deref() else {
            return Ok(FaceProbe::NotEnrolled);
        };
        Ok(FaceProbe::Result(
            self.matcher.match_sample(template, sample).await,
        ))
    }

    /// Recent attempts for an account, newest first. `None` for unknown
    /// usernames.
    ///
    /// # Errors
    /// Returns an error on store faults.
    pub async fn recent_attempts(
        &self,
        username: &str,
        limit: i64,
    ) -> Result<Option<Vec<AttemptRecord>>> {
        let Some(identity) = self.identities.lookup(username).await? else {
            return Ok(None);
        };
        Ok(Some(self.attempts.recent_for(identity.id, limit).await?))
    }

    async fn identity_lock(&self, identity_id: Uuid) -> Arc<Mutex<()>> {
        let mut locks = self.attempt_locks.lock().await;
        locks
            .entry(identity_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Fetch the profile, creating an empty one when missing. Explicit
    /// self-healing; a missing profile is not an error.
    async fn ensure_profile(&self, identity: &Identity) -> Result<AuthProfile> {
        if let Some(profile) = self.profiles.get(identity.id).await? {
            return Ok(profile);
        }
        let profile = self.profiles.create(identity.id).await?;
        info!(username = %identity.username, "created missing auth profile");
        Ok(profile)
    }

    async fn password_phase(
        &self,
        identity: &Identity,
        attempt: &LoginAttempt,
        now: DateTime<Utc>,
    ) -> Result<PasswordPhase> {
        let mut profile = self.ensure_profile(identity).await?;

        let was_locked = profile.locked;
        match lockout::evaluate_before_attempt(&mut profile, now, self.config.lockout()) {
            Gate::Locked { remaining } => {
                // Rejected-while-locked attempts are not appended to the
                // log; they would let an attacker flood the recent-attempts
                // view.
                return Ok(PasswordPhase::Rejected(LoginOutcome::AccountLocked {
                    retry_after_minutes: lockout::ceil_minutes(remaining),
                }));
            }
            Gate::Proceed => {
                if was_locked {
                    self.profiles.save(&profile).await?;
                    info!(username = %identity.username, "lockout window elapsed, lock cleared");
                }
            }
        }

        if self
            .identities
            .verify_password(identity, &attempt.password)
            .await?
        {
            return Ok(PasswordPhase::Accepted {
                face_template: profile.face_template,
            });
        }

        let locked_now = lockout::record_failure(&mut profile, now, self.config.max_attempts());
        self.profiles.save(&profile).await?;
        self.attempts
            .append(&self.attempt_record(identity, attempt, now, false, None, None))
            .await?;

        if locked_now {
            warn!(
                username = %identity.username,
                attempts = profile.failed_attempts,
                "account locked after repeated failures"
            );
            Ok(PasswordPhase::Rejected(LoginOutcome::AccountLocked {
                retry_after_minutes: self.config.lockout_minutes(),
            }))
        } else {
            Ok(PasswordPhase::Rejected(LoginOutcome::InvalidCredentials))
        }
    }

    /// A face mismatch counts exactly like a wrong password: both factors
    /// share the lockout counter.
    async fn face_mismatch(
        &self,
        identity: &Identity,
        attempt: &LoginAttempt,
        now: DateTime<Utc>,
        score: f64,
    ) -> Result<LoginOutcome> {
        // Re-read: another attempt may have moved the counters while the
        // lock was released for the comparison.
        let mut profile = self.ensure_profile(identity).await?;
        let locked_now = lockout::record_failure(&mut profile, now, self.config.max_attempts());
        self.profiles.save(&profile).await?;
        self.attempts
            .append(&self.attempt_record(identity, attempt, now, false, Some(score), None))
            .await?;

        if locked_now {
            warn!(
                username = %identity.username,
                attempts = profile.failed_attempts,
                "account locked after repeated failures"
            );
            Ok(LoginOutcome::AccountLocked {
                retry_after_minutes: self.config.lockout_minutes(),
            })
        } else {
            Ok(LoginOutcome::FaceMismatch { score })
        }
    }

    async fn complete_login(
        &self,
        identity: &Identity,
        attempt: &LoginAttempt,
        now: DateTime<Utc>,
        face_score: Option<f64>,
    ) -> Result<LoginOutcome> {
        let mut profile = self.ensure_profile(identity).await?;

        if !profile.has_key_pair() {
            // Self-healing: profiles predating key issuance get a pair now.
            let pair = challenge::generate_key_pair();
            profile.public_key = Some(pair.public);
            profile.private_key = Some(pair.private);
            self.profiles
                .save(&profile)
                .await
                .context("failed to store regenerated key pair")?;
            info!(username = %identity.username, "generated key pair for profile without one");
        }

        let issued = challenge::issue(now);
        let signature = challenge::sign(profile.private_key.as_deref(), issued.token)
            .context("challenge signing failed")?;

        let challenge = Challenge {
            token: issued.token,
            identity_id: identity.id,
            issued_at: issued.issued_at,
            expires_at: issued.expires_at,
            signature,
            consumed: false,
        };
        self.challenges
            .save(&challenge)
            .await
            .context("failed to store challenge")?;

        lockout::record_success(&mut profile);
        self.profiles.save(&profile).await?;
        self.attempts
            .append(&self.attempt_record(identity, attempt, now, true, face_score, Some(true)))
            .await?;
        info!(username = %identity.username, token = %challenge.token, "login succeeded");

        Ok(LoginOutcome::Success {
            challenge,
            face_score,
        })
    }

    fn attempt_record(
        &self,
        identity: &Identity,
        attempt: &LoginAttempt,
        now: DateTime<Utc>,
        succeeded: bool,
        face_score: Option<f64>,
        signature_verified: Option<bool>,
    ) -> AttemptRecord {
        AttemptRecord {
            identity_id: identity.id,
            attempted_at: now,
            succeeded,
            source_address: attempt.source_address.clone(),
            client_agent: attempt.client_agent.clone(),
            face_score,
            signature_verified,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::test_support::{harness, Harness, ScriptedOracle};
    use std::sync::atomic::Ordering;

    fn attempt(username: &str, password: &str, sample: Option<&[u8]>) -> LoginAttempt {
        LoginAttempt {
            username: username.to_string(),
            password: SecretString::from(password.to_string()),
            face_sample: sample.map(<[u8]>::to_vec),
            source_address: Some("203.0.113.9".to_string()),
            client_agent: Some("cerberus-tests".to_string()),
        }
    }

    async fn seed_user(fixture: &Harness, username: &str, password: &str) -> Identity {
        let identity = fixture.identities.seed(username, password).await;
        fixture
            .profiles
            .create(identity.id)
            .await
            .expect("profile creation");
        identity
    }

    #[tokio::test]
    async fn password_only_login_succeeds() -> Result<()> {
        let fixture = harness(AuthConfig::new(), ScriptedOracle::single_face(0.0));
        seed_user(&fixture, "alice", "hunter2!").await;

        let outcome = fixture.engine.login(&attempt("alice", "hunter2!", None)).await?;
        match outcome {
            LoginOutcome::Success {
                challenge,
                face_score,
            } => {
                assert!(face_score.is_none());
                assert!(!challenge.consumed);
                assert!(fixture.challenges.get(challenge.token).await?.is_some());
            }
            other => panic!("expected success, got {other:?}"),
        }

        let records = fixture.attempts.all().await;
        assert_eq!(records.len(), 1);
        assert!(records[0].succeeded);
        assert!(records[0].face_score.is_none());
        assert_eq!(records[0].signature_verified, Some(true));
        Ok(())
    }

    #[tokio::test]
    async fn third_wrong_password_locks_the_account() -> Result<()> {
        let config = AuthConfig::new().with_max_attempts(3);
        let fixture = harness(config, ScriptedOracle::single_face(0.0));
        let identity = seed_user(&fixture, "bob", "correct").await;

        let bad = attempt("bob", "wrong", None);
        assert!(matches!(
            fixture.engine.login(&bad).await?,
            LoginOutcome::InvalidCredentials
        ));
        assert!(matches!(
            fixture.engine.login(&bad).await?,
            LoginOutcome::InvalidCredentials
        ));
        assert!(matches!(
            fixture.engine.login(&bad).await?,
            LoginOutcome::AccountLocked { .. }
        ));

        let profile = fixture.profiles.get(identity.id).await?.expect("profile");
        assert!(profile.locked);
        assert_eq!(profile.failed_attempts, 3);
        assert_eq!(fixture.attempts.all().await.len(), 3);
        Ok(())
    }

    #[tokio::test]
    async fn locked_account_is_rejected_without_a_password_check() -> Result<()> {
        let config = AuthConfig::new().with_max_attempts(1).with_lockout_minutes(15);
        let fixture = harness(config, ScriptedOracle::single_face(0.0));
        seed_user(&fixture, "carol", "correct").await;

        assert!(matches!(
            fixture.engine.login(&attempt("carol", "wrong", None)).await?,
            LoginOutcome::AccountLocked { .. }
        ));

        let verify_calls = fixture.identities.verify_calls.load(Ordering::SeqCst);
        let records_before = fixture.attempts.all().await.len();

        let outcome = fixture
            .engine
            .login(&attempt("carol", "correct", None))
            .await?;
        match outcome {
            LoginOutcome::AccountLocked {
                retry_after_minutes,
            } => assert!(retry_after_minutes >= 1 && retry_after_minutes <= 15),
            other => panic!("expected a lockout rejection, got {other:?}"),
        }

        // No password-oracle call and no attempt record for the rejection.
        assert_eq!(
            fixture.identities.verify_calls.load(Ordering::SeqCst),
            verify_calls
        );
        assert_eq!(fixture.attempts.all().await.len(), records_before);
        Ok(())
    }

    #[tokio::test]
    async fn lockout_remaining_time_shrinks_as_the_window_ages() -> Result<()> {
        let config = AuthConfig::new().with_max_attempts(1).with_lockout_minutes(15);
        let fixture = harness(config, ScriptedOracle::single_face(0.0));
        let identity = seed_user(&fixture, "dave", "correct").await;

        fixture.engine.login(&attempt("dave", "wrong", None)).await?;

        let first = match fixture.engine.login(&attempt("dave", "correct", None)).await? {
            LoginOutcome::AccountLocked {
                retry_after_minutes,
            } => retry_after_minutes,
            other => panic!("expected a lockout rejection, got {other:?}"),
        };

        // Age the failure timestamp by five minutes and check again.
        fixture
            .profiles
            .rewind_last_failure(identity.id, Duration::minutes(5))
            .await;
        let second = match fixture.engine.login(&attempt("dave", "correct", None)).await? {
            LoginOutcome::AccountLocked {
                retry_after_minutes,
            } => retry_after_minutes,
            other => panic!("expected a lockout rejection, got {other:?}"),
        };

        assert!(second < first);
        Ok(())
    }

    #[tokio::test]
    async fn elapsed_lockout_clears_on_the_next_attempt() -> Result<()> {
        let config = AuthConfig::new().with_max_attempts(1).with_lockout_minutes(15);
        let fixture = harness(config, ScriptedOracle::single_face(0.0));
        let identity = seed_user(&fixture, "erin", "correct").await;

        fixture.engine.login(&attempt("erin", "wrong", None)).await?;
        fixture
            .profiles
            .rewind_last_failure(identity.id, Duration::minutes(20))
            .await;

        assert!(matches!(
            fixture.engine.login(&attempt("erin", "correct", None)).await?,
            LoginOutcome::Success { .. }
        ));

        let profile = fixture.profiles.get(identity.id).await?.expect("profile");
        assert!(!profile.locked);
        assert_eq!(profile.failed_attempts, 0);
        Ok(())
    }

    #[tokio::test]
    async fn face_mismatch_counts_like_a_wrong_password() -> Result<()> {
        // Oracle distance 0.8 against tolerance 0.6 -> score 0.2 mismatch.
        let fixture = harness(AuthConfig::new(), ScriptedOracle::single_face(0.8));
        let identity = seed_user(&fixture, "frank", "correct").await;
        fixture.profiles.set_template(identity.id, b"template").await;

        let outcome = fixture
            .engine
            .login(&attempt("frank", "correct", Some(b"sample")))
            .await?;
        match outcome {
            LoginOutcome::FaceMismatch { score } => assert!((score - 0.2).abs() < 1e-9),
            other => panic!("expected a face mismatch, got {other:?}"),
        }

        let profile = fixture.profiles.get(identity.id).await?.expect("profile");
        assert_eq!(profile.failed_attempts, 1);

        let records = fixture.attempts.all().await;
        assert_eq!(records.len(), 1);
        assert!(!records[0].succeeded);
        let score = records[0].face_score.expect("face score recorded");
        assert!((score - 0.2).abs() < 1e-9);
        Ok(())
    }

    #[tokio::test]
    async fn face_match_carries_the_score_into_the_success_record() -> Result<()> {
        let fixture = harness(AuthConfig::new(), ScriptedOracle::single_face(0.4));
        let identity = seed_user(&fixture, "grace", "correct").await;
        fixture.profiles.set_template(identity.id, b"template").await;

        let outcome = fixture
            .engine
            .login(&attempt("grace", "correct", Some(b"sample")))
            .await?;
        match outcome {
            LoginOutcome::Success { face_score, .. } => {
                let score = face_score.expect("score carried forward");
                assert!((score - 0.6).abs() < 1e-9);
            }
            other => panic!("expected success, got {other:?}"),
        }

        let records = fixture.attempts.all().await;
        assert_eq!(records.len(), 1);
        assert!((records[0].face_score.expect("score") - 0.6).abs() < 1e-9);
        Ok(())
    }

    #[tokio::test]
    async fn enrolled_template_demands_a_sample() -> Result<()> {
        let fixture = harness(AuthConfig::new(), ScriptedOracle::single_face(0.0));
        let identity = seed_user(&fixture, "heidi", "correct").await;
        fixture.profiles.set_template(identity.id, b"template").await;

        assert!(matches!(
            fixture.engine.login(&attempt("heidi", "correct", None)).await?,
            LoginOutcome::FaceRequired
        ));

        // Not authentication evidence: no record, no counter movement.
        assert!(fixture.attempts.all().await.is_empty());
        let profile = fixture.profiles.get(identity.id).await?.expect("profile");
        assert_eq!(profile.failed_attempts, 0);
        Ok(())
    }

    #[tokio::test]
    async fn oracle_trouble_never_mutates_lockout_state() -> Result<()> {
        for oracle in [
            ScriptedOracle::face_count(0),
            ScriptedOracle::face_count(2),
            ScriptedOracle::failing("oracle offline"),
        ] {
            let fixture = harness(AuthConfig::new(), oracle);
            let identity = seed_user(&fixture, "ivan", "correct").await;
            fixture.profiles.set_template(identity.id, b"template").await;

            assert!(matches!(
                fixture
                    .engine
                    .login(&attempt("ivan", "correct", Some(b"sample")))
                    .await?,
                LoginOutcome::FaceOracleError { .. }
            ));

            let profile = fixture.profiles.get(identity.id).await?.expect("profile");
            assert_eq!(profile.failed_attempts, 0);
            assert!(!profile.locked);
            assert!(fixture.attempts.all().await.is_empty());
        }
        Ok(())
    }

    #[tokio::test]
    async fn missing_profile_is_created_on_the_fly() -> Result<()> {
        let fixture = harness(AuthConfig::new(), ScriptedOracle::single_face(0.0));
        // Identity exists, profile does not.
        fixture.identities.seed("judy", "correct").await;

        assert!(matches!(
            fixture.engine.login(&attempt("judy", "correct", None)).await?,
            LoginOutcome::Success { .. }
        ));
        Ok(())
    }

    #[tokio::test]
    async fn missing_key_pair_is_regenerated_before_signing() -> Result<()> {
        let fixture = harness(AuthConfig::new(), ScriptedOracle::single_face(0.0));
        let identity = seed_user(&fixture, "kate", "correct").await;

        let outcome = fixture.engine.login(&attempt("kate", "correct", None)).await?;
        let LoginOutcome::Success { challenge, .. } = outcome else {
            panic!("expected success");
        };

        let profile = fixture.profiles.get(identity.id).await?.expect("profile");
        assert!(profile.has_key_pair());

        // The healed key pair round-trips through verification.
        assert_eq!(
            fixture
                .engine
                .verify_challenge(challenge.token, &challenge.signature, Utc::now())
                .await?,
            ChallengeVerdict::Verified
        );
        Ok(())
    }

    #[tokio::test]
    async fn challenge_store_fault_maps_to_signature_error() -> Result<()> {
        let fixture = harness(AuthConfig::new(), ScriptedOracle::single_face(0.0));
        let identity = seed_user(&fixture, "leo", "correct").await;
        fixture.challenges.fail_saves();

        assert!(matches!(
            fixture.engine.login(&attempt("leo", "correct", None)).await?,
            LoginOutcome::SignatureError
        ));

        // Infrastructure faults leave the lockout counters alone and write
        // no failure record.
        let profile = fixture.profiles.get(identity.id).await?.expect("profile");
        assert_eq!(profile.failed_attempts, 0);
        assert!(fixture.attempts.all().await.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn expired_challenge_never_verifies() -> Result<()> {
        let fixture = harness(AuthConfig::new(), ScriptedOracle::single_face(0.0));
        seed_user(&fixture, "mallory", "correct").await;

        let LoginOutcome::Success { challenge, .. } =
            fixture.engine.login(&attempt("mallory", "correct", None)).await?
        else {
            panic!("expected success");
        };

        // One second past the five-minute window, with a valid signature.
        let late = challenge.expires_at + Duration::seconds(1);
        assert_eq!(
            fixture
                .engine
                .verify_challenge(challenge.token, &challenge.signature, late)
                .await?,
            ChallengeVerdict::Expired
        );
        Ok(())
    }

    #[tokio::test]
    async fn verification_consumes_the_challenge_once() -> Result<()> {
        let fixture = harness(AuthConfig::new(), ScriptedOracle::single_face(0.0));
        seed_user(&fixture, "nina", "correct").await;

        let LoginOutcome::Success { challenge, .. } =
            fixture.engine.login(&attempt("nina", "correct", None)).await?
        else {
            panic!("expected success");
        };

        let now = Utc::now();
        assert_eq!(
            fixture
                .engine
                .verify_challenge(challenge.token, &challenge.signature, now)
                .await?,
            ChallengeVerdict::Verified
        );
        assert_eq!(
            fixture
                .engine
                .verify_challenge(challenge.token, &challenge.signature, now)
                .await?,
            ChallengeVerdict::Consumed
        );
        Ok(())
    }

    #[tokio::test]
    async fn tampered_signature_is_a_bad_signature_verdict() -> Result<()> {
        let fixture = harness(AuthConfig::new(), ScriptedOracle::single_face(0.0));
        seed_user(&fixture, "oscar", "correct").await;

        let LoginOutcome::Success { challenge, .. } =
            fixture.engine.login(&attempt("oscar", "correct", None)).await?
        else {
            panic!("expected success");
        };

        let mut signature = challenge.signature.clone();
        signature[3] ^= 0x40;
        assert_eq!(
            fixture
                .engine
                .verify_challenge(challenge.token, &signature, Utc::now())
                .await?,
            ChallengeVerdict::BadSignature
        );
        // A failed verification does not consume the challenge.
        assert_eq!(
            fixture
                .engine
                .verify_challenge(challenge.token, &challenge.signature, Utc::now())
                .await?,
            ChallengeVerdict::Verified
        );
        Ok(())
    }

    #[tokio::test]
    async fn unknown_token_is_unknown() -> Result<()> {
        let fixture = harness(AuthConfig::new(), ScriptedOracle::single_face(0.0));
        assert_eq!(
            fixture
                .engine
                .verify_challenge(Uuid::new_v4(), &[0u8; 64], Utc::now())
                .await?,
            ChallengeVerdict::Unknown
        );
        Ok(())
    }

    #[tokio::test]
    async fn unknown_user_reads_as_invalid_credentials() -> Result<()> {
        let fixture = harness(AuthConfig::new(), ScriptedOracle::single_face(0.0));
        assert!(matches!(
            fixture.engine.login(&attempt("nobody", "whatever", None)).await?,
            LoginOutcome::InvalidCredentials
        ));
        assert!(fixture.attempts.all().await.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn registration_enrolls_keys_and_template() -> Result<()> {
        let fixture = harness(AuthConfig::new(), ScriptedOracle::single_face(0.0));
        let password = SecretString::from("hunter2!".to_string());

        let outcome = fixture
            .engine
            .register("peggy", &password, Some(b"sample"))
            .await?;
        let RegisterOutcome::Created {
            identity,
            face_enrolled,
            face_error,
        } = outcome
        else {
            panic!("expected creation");
        };
        assert!(face_enrolled);
        assert!(face_error.is_none());

        let profile = fixture.profiles.get(identity.id).await?.expect("profile");
        assert!(profile.has_key_pair());
        assert!(profile.has_face_template());

        // Second registration under the same name collides.
        assert!(matches!(
            fixture.engine.register("peggy", &password, None).await?,
            RegisterOutcome::UsernameTaken
        ));
        Ok(())
    }

    #[tokio::test]
    async fn registration_survives_a_failed_enrollment() -> Result<()> {
        let fixture = harness(AuthConfig::new(), ScriptedOracle::face_count(0));
        let password = SecretString::from("hunter2!".to_string());

        let outcome = fixture
            .engine
            .register("quinn", &password, Some(b"sample"))
            .await?;
        let RegisterOutcome::Created {
            face_enrolled,
            face_error,
            ..
        } = outcome
        else {
            panic!("expected creation");
        };
        assert!(!face_enrolled);
        assert!(face_error.expect("warning message").contains("No face"));
        Ok(())
    }

    #[tokio::test]
    async fn face_probe_reports_enrollment_state() -> Result<()> {
        let fixture = harness(AuthConfig::new(), ScriptedOracle::single_face(0.1));
        let identity = seed_user(&fixture, "ruth", "correct").await;

        assert!(matches!(
            fixture.engine.probe_face("ghost", b"sample").await?,
            FaceProbe::UnknownUser
        ));
        assert!(matches!(
            fixture.engine.probe_face("ruth", b"sample").await?,
            FaceProbe::NotEnrolled
        ));

        fixture.profiles.set_template(identity.id, b"template").await;
        match fixture.engine.probe_face("ruth", b"sample").await? {
            FaceProbe::Result(MatchResult::Matched { score }) => {
                assert!((score - 0.9).abs() < 1e-9);
            }
            other => panic!("expected a match, got {other:?}"),
        }
        Ok(())
    }

    #[tokio::test]
    async fn recent_attempts_come_back_newest_first() -> Result<()> {
        let fixture = harness(AuthConfig::new(), ScriptedOracle::single_face(0.0));
        seed_user(&fixture, "sybil", "correct").await;

        fixture.engine.login(&attempt("sybil", "wrong", None)).await?;
        fixture.engine.login(&attempt("sybil", "correct", None)).await?;

        let records = fixture
            .engine
            .recent_attempts("sybil", 5)
            .await?
            .expect("known user");
        assert_eq!(records.len(), 2);
        assert!(records[0].succeeded);
        assert!(!records[1].succeeded);
        assert!(records[0].attempted_at >= records[1].attempted_at);

        assert!(fixture.engine.recent_attempts("ghost", 5).await?.is_none());
        Ok(())
    }
}
