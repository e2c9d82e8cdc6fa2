pub mod health;
pub use self::health::health;

pub mod register;
pub use self::register::register;

pub mod login;
pub use self::login::login;

pub mod face;
pub use self::face::verify_face;

pub mod challenge;
pub use self::challenge::verify_challenge;

pub mod attempts;
pub use self::attempts::attempts;

// common functions for the handlers
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use regex::Regex;

pub(crate) fn valid_username(username: &str) -> bool {
    Regex::new(r"^[A-Za-z0-9_.-]{3,32}$").is_ok_and(|re| re.is_match(username))
}

/// Minimal strength gate; anything stricter belongs in a password policy
/// service, not here.
pub(crate) fn valid_password(password: &str) -> bool {
    password.chars().count() >= 8
}

/// Decode a webcam capture submitted as a base64 data URL. Raw base64 is
/// accepted too.
pub(crate) fn decode_face_data(value: &str) -> Result<Vec<u8>, String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err("Missing face data".to_string());
    }
    let encoded = match trimmed.split_once(";base64,") {
        Some((_, rest)) => rest,
        None => trimmed,
    };
    STANDARD
        .decode(encoded)
        .map_err(|_| "Invalid face data encoding".to_string())
}

/// Extract a client IP for the attempt log from common proxy headers.
pub(crate) fn extract_client_ip(headers: &axum::http::HeaderMap) -> Option<String> {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|value| !value.is_empty());
    if forwarded.is_some() {
        return forwarded.map(str::to_string);
    }
    headers
        .get("x-real-ip")
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
pub(crate) fn test_engine() -> anyhow::Result<std::sync::Arc<crate::auth::engine::AuthEngine>> {
    use crate::auth::engine::{AuthConfig, AuthEngine};
    use crate::auth::face::HttpFaceOracle;
    use crate::storage::postgres::{
        PgAttemptLog, PgChallengeStore, PgIdentityStore, PgProfileStore,
    };
    use sqlx::postgres::PgPoolOptions;
    use std::sync::Arc;

    let pool = PgPoolOptions::new().connect_lazy("postgres://postgres@localhost/postgres")?;
    Ok(Arc::new(AuthEngine::new(
        Arc::new(PgIdentityStore::new(pool.clone())),
        Arc::new(PgProfileStore::new(pool.clone())),
        Arc::new(PgAttemptLog::new(pool.clone())),
        Arc::new(PgChallengeStore::new(pool)),
        Arc::new(HttpFaceOracle::new("http://localhost:9")?),
        AuthConfig::new(),
    )))
}
