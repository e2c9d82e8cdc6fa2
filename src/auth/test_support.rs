//! Shared in-memory fixtures for engine tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::Duration;
use secrecy::{ExposeSecret, SecretString};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::auth::engine::{AuthConfig, AuthEngine};
use crate::auth::face::{EnrollScan, FaceOracle, FaceScan};
use crate::auth::models::{AttemptRecord, AuthProfile, Challenge, Identity};
use crate::auth::store::{
    AttemptLog, ChallengeStore, CreatedIdentity, IdentityStore, ProfileStore,
};

pub(crate) struct MemoryIdentityStore {
    users: Mutex<HashMap<String, (Identity, String)>>,
    pub(crate) verify_calls: AtomicUsize,
}

impl MemoryIdentityStore {
    pub(crate) fn new() -> Self {
        Self {
            users: Mutex::new(HashMap::new()),
            verify_calls: AtomicUsize::new(0),
        }
    }

    pub(crate) async fn seed(&self, username: &str, password: &str) -> Identity {
        let identity = Identity {
            id: Uuid::new_v4(),
            username: username.to_string(),
        };
        self.users.lock().await.insert(
            username.to_string(),
            (identity.clone(), password.to_string()),
        );
        identity
    }
}

#[async_trait]
impl IdentityStore for MemoryIdentityStore {
    async fn lookup(&self, username: &str) -> Result<Option<Identity>> {
        Ok(self
            .users
            .lock()
            .await
            .get(username)
            .map(|(identity, _)| identity.clone()))
    }

    async fn verify_password(&self, identity: &Identity, password: &SecretString) -> Result<bool> {
        self.verify_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .users
            .lock()
            .await
            .get(&identity.username)
            .is_some_and(|(_, stored)| stored == password.expose_secret()))
    }

    async fn create(&self, username: &str, password: &SecretString) -> Result<CreatedIdentity> {
        let mut users = self.users.lock().await;
        if users.contains_key(username) {
            return Ok(CreatedIdentity::Conflict);
        }
        let identity = Identity {
            id: Uuid::new_v4(),
            username: username.to_string(),
        };
        users.insert(
            username.to_string(),
            (identity.clone(), password.expose_secret().to_string()),
        );
        Ok(CreatedIdentity::Created(identity))
    }
}

pub(crate) struct MemoryProfileStore {
    profiles: Mutex<HashMap<Uuid, AuthProfile>>,
}

impl MemoryProfileStore {
    pub(crate) fn new() -> Self {
        Self {
            profiles: Mutex::new(HashMap::new()),
        }
    }

    pub(crate) async fn set_template(&self, identity_id: Uuid, template: &[u8]) {
        if let Some(profile) = self.profiles.lock().await.get_mut(&identity_id) {
            profile.face_template = Some(template.to_vec());
        }
    }

    /// Shift `last_failure_at` into the past to simulate an aged lockout.
    pub(crate) async fn rewind_last_failure(&self, identity_id: Uuid, by: Duration) {
        if let Some(profile) = self.profiles.lock().await.get_mut(&identity_id) {
            profile.last_failure_at = profile.last_failure_at.map(|at| at - by);
        }
    }
}

#[async_trait]
impl ProfileStore for MemoryProfileStore {
    async fn get(&self, identity_id: Uuid) -> Result<Option<AuthProfile>> {
        Ok(self.profiles.lock().await.get(&identity_id).cloned())
    }

    async fn create(&self, identity_id: Uuid) -> Result<AuthProfile> {
        let profile = AuthProfile::new(identity_id);
        self.profiles
            .lock()
            .await
            .insert(identity_id, profile.clone());
        Ok(profile)
    }

    async fn save(&self, profile: &AuthProfile) -> Result<()> {
        self.profiles
            .lock()
            .await
            .insert(profile.identity_id, profile.clone());
        Ok(())
    }
}

pub(crate) struct MemoryAttemptLog {
    records: Mutex<Vec<AttemptRecord>>,
}

impl MemoryAttemptLog {
    pub(crate) fn new() -> Self {
        Self {
            records: Mutex::new(Vec::new()),
        }
    }

    pub(crate) async fn all(&self) -> Vec<AttemptRecord> {
        self.records.lock().await.clone()
    }
}

#[async_trait]
impl AttemptLog for MemoryAttemptLog {
    async fn append(&self, record: &AttemptRecord) -> Result<()> {
        self.records.lock().await.push(record.clone());
        Ok(())
    }

    async fn recent_for(&self, identity_id: Uuid, limit: i64) -> Result<Vec<AttemptRecord>> {
        let records = self.records.lock().await;
        Ok(records
            .iter()
            .rev()
            .filter(|record| record.identity_id == identity_id)
            .take(usize::try_from(limit).unwrap_or(usize::MAX))
            .cloned()
            .collect())
    }
}

pub(crate) struct MemoryChallengeStore {
    challenges: Mutex<HashMap<Uuid, Challenge>>,
    fail_saves: AtomicBool,
}

impl MemoryChallengeStore {
    pub(crate) fn new() -> Self {
        Self {
            challenges: Mutex::new(HashMap::new()),
            fail_saves: AtomicBool::new(false),
        }
    }

    pub(crate) fn fail_saves(&self) {
        self.fail_saves.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl ChallengeStore for MemoryChallengeStore {
    async fn save(&self, challenge: &Challenge) -> Result<()> {
        if self.fail_saves.load(Ordering::SeqCst) {
            bail!("challenge store unavailable");
        }
        self.challenges
            .lock()
            .await
            .insert(challenge.token, challenge.clone());
        Ok(())
    }

    async fn get(&self, token: Uuid) -> Result<Option<Challenge>> {
        Ok(self.challenges.lock().await.get(&token).cloned())
    }

    async fn mark_consumed(&self, token: Uuid) -> Result<()> {
        if let Some(challenge) = self.challenges.lock().await.get_mut(&token) {
            challenge.consumed = true;
        }
        Ok(())
    }
}

/// Oracle with a fixed, scripted reading.
pub(crate) struct ScriptedOracle {
    faces: usize,
    distance: f64,
    failure: Option<String>,
}

impl ScriptedOracle {
    pub(crate) fn single_face(distance: f64) -> Self {
        Self {
            faces: 1,
            distance,
            failure: None,
        }
    }

    pub(crate) fn face_count(faces: usize) -> Self {
        Self {
            faces,
            distance: 0.0,
            failure: None,
        }
    }

    pub(crate) fn failing(reason: &str) -> Self {
        Self {
            faces: 0,
            distance: 0.0,
            failure: Some(reason.to_string()),
        }
    }
}

#[async_trait]
impl FaceOracle for ScriptedOracle {
    async fn scan(&self, _template: &[u8], _sample: &[u8]) -> Result<FaceScan> {
        if let Some(reason) = &self.failure {
            bail!("{reason}");
        }
        Ok(FaceScan {
            faces: self.faces,
            distance: self.distance,
        })
    }

    async fn enroll(&self, _sample: &[u8]) -> Result<EnrollScan> {
        if let Some(reason) = &self.failure {
            bail!("{reason}");
        }
        Ok(EnrollScan {
            faces: self.faces,
            template: (self.faces == 1).then(|| b"scripted-template".to_vec()),
        })
    }
}

pub(crate) struct Harness {
    pub(crate) engine: AuthEngine,
    pub(crate) identities: Arc<MemoryIdentityStore>,
    pub(crate) profiles: Arc<MemoryProfileStore>,
    pub(crate) attempts: Arc<MemoryAttemptLog>,
    pub(crate) challenges: Arc<MemoryChallengeStore>,
}

pub(crate) fn harness(config: AuthConfig, oracle: ScriptedOracle) -> Harness {
    let identities = Arc::new(MemoryIdentityStore::new());
    let profiles = Arc::new(MemoryProfileStore::new());
    let attempts = Arc::new(MemoryAttemptLog::new());
    let challenges = Arc::new(MemoryChallengeStore::new());

    let engine = AuthEngine::new(
        identities.clone(),
        profiles.clone(),
        attempts.clone(),
        challenges.clone(),
        Arc::new(oracle),
        config,
    );

    Harness {
        engine,
        identities,
        profiles,
        attempts,
        challenges,
    }
}
