//! Challenge verification endpoint. A verified challenge is consumed and
//! cannot be presented again.

use crate::auth::engine::{AuthEngine, ChallengeVerdict};
use axum::{extract::Extension, http::StatusCode, response::IntoResponse, Json};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::error;
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct ChallengeVerifyRequest {
    pub token: Uuid,
    /// Base64-encoded signature handed out at login.
    pub signature: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct ChallengeVerifyResponse {
    pub verdict: String,
}

fn verdict_response(status: StatusCode, verdict: &str) -> axum::response::Response {
    (
        status,
        Json(ChallengeVerifyResponse {
            verdict: verdict.to_string(),
        }),
    )
        .into_response()
}

#[utoipa::path(
    post,
    path = "/v1/auth/challenge/verify",
    request_body = ChallengeVerifyRequest,
    responses(
        (status = 200, description = "Challenge verified and consumed", body = ChallengeVerifyResponse),
        (status = 400, description = "Validation error", body = String),
        (status = 401, description = "Signature does not verify", body = ChallengeVerifyResponse),
        (status = 404, description = "Unknown token", body = ChallengeVerifyResponse),
        (status = 410, description = "Challenge expired or already consumed", body = ChallengeVerifyResponse)
    ),
    tag = "auth"
)]
pub async fn verify_challenge(
    engine: Extension<Arc<AuthEngine>>,
    payload: Option<Json<ChallengeVerifyRequest>>,
) -> impl IntoResponse {
    let request: ChallengeVerifyRequest = match payload {
        Some(Json(payload)) => payload,
        None => return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response(),
    };

    let Ok(signature) = STANDARD.decode(request.signature.trim()) else {
        return (
            StatusCode::BAD_REQUEST,
            "Invalid signature encoding".to_string(),
        )
            .into_response();
    };

    let verdict = match engine
        .verify_challenge(request.token, &signature, Utc::now())
        .await
    {
        Ok(verdict) => verdict,
        Err(err) => {
            error!("Challenge verification failed: {err:#}");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Challenge verification failed".to_string(),
            )
                .into_response();
        }
    };

    match verdict {
        ChallengeVerdict::Verified => verdict_response(StatusCode::OK, "verified"),
        ChallengeVerdict::Expired => verdict_response(StatusCode::GONE, "expired"),
        ChallengeVerdict::Consumed => verdict_response(StatusCode::GONE, "consumed"),
        ChallengeVerdict::BadSignature => {
            verdict_response(StatusCode::UNAUTHORIZED, "bad_signature")
        }
        ChallengeVerdict::Unknown => verdict_response(StatusCode::NOT_FOUND, "unknown"),
    }
}

#[cfg(test)]
mod tests {
    use super::verify_challenge;
    use crate::api::handlers::test_engine;
    use anyhow::Result;
    use axum::{extract::Extension, http::StatusCode, response::IntoResponse, Json};
    use serde_json::json;
    use uuid::Uuid;

    #[tokio::test]
    async fn verify_challenge_missing_payload() -> Result<()> {
        let response = verify_challenge(Extension(test_engine()?), None)
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        Ok(())
    }

    #[tokio::test]
    async fn verify_challenge_rejects_bad_signature_encoding() -> Result<()> {
        let request = serde_json::from_value(json!({
            "token": Uuid::new_v4(),
            "signature": "not base64!!!"
        }))?;
        let response = verify_challenge(Extension(test_engine()?), Some(Json(request)))
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        Ok(())
    }
}
