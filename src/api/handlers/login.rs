//! Login endpoint: password, optional face sample, signed challenge.

use crate::api::handlers::{decode_face_data, extract_client_ip};
use crate::auth::engine::{AuthEngine, LoginAttempt, LoginOutcome};
use axum::{
    extract::Extension,
    http::{header::USER_AGENT, HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, Utc};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::error;
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(ToSchema, Deserialize, Debug)]
pub struct LoginRequest {
    pub username: String,
    #[schema(value_type = String)]
    pub password: SecretString,
    /// Webcam capture as a base64 data URL.
    pub face_data: Option<String>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct LoginResponse {
    pub token: Uuid,
    pub signature: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub face_score: Option<f64>,
}

#[utoipa::path(
    post,
    path = "/v1/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = LoginResponse),
        (status = 400, description = "Validation error", body = String),
        (status = 401, description = "Invalid credentials or face mismatch", body = String),
        (status = 422, description = "Face sample unusable", body = String),
        (status = 423, description = "Account locked", body = String),
        (status = 428, description = "Face verification required", body = String)
    ),
    tag = "auth"
)]
pub async fn login(
    headers: HeaderMap,
    engine: Extension<Arc<AuthEngine>>,
    payload: Option<Json<LoginRequest>>,
) -> impl IntoResponse {
    let request: LoginRequest = match payload {
        Some(Json(payload)) => payload,
        None => return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response(),
    };

    let username = request.username.trim().to_string();
    if username.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            "Please provide username and password.".to_string(),
        )
            .into_response();
    }

    // Decode the sample at the edge; the engine only ever sees raw bytes.
    let face_sample = match request.face_data.as_deref() {
        Some(data) => match decode_face_data(data) {
            Ok(bytes) => Some(bytes),
            Err(err) => return (StatusCode::BAD_REQUEST, err).into_response(),
        },
        None => None,
    };

    let attempt = LoginAttempt {
        username,
        password: request.password,
        face_sample,
        source_address: extract_client_ip(&headers),
        client_agent: headers
            .get(USER_AGENT)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string),
    };

    let outcome = match engine.login(&attempt).await {
        Ok(outcome) => outcome,
        Err(err) => {
            error!("Login failed: {err:#}");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Login failed".to_string(),
            )
                .into_response();
        }
    };

    match outcome {
        LoginOutcome::Success {
            challenge,
            face_score,
        } => (
            StatusCode::OK,
            Json(LoginResponse {
                token: challenge.token,
                signature: STANDARD.encode(&challenge.signature),
                issued_at: challenge.issued_at,
                expires_at: challenge.expires_at,
                face_score,
            }),
        )
            .into_response(),
        LoginOutcome::InvalidCredentials => (
            StatusCode::UNAUTHORIZED,
            "Invalid username or password.".to_string(),
        )
            .into_response(),
        LoginOutcome::FaceMismatch { .. } => (
            StatusCode::UNAUTHORIZED,
            "Face verification failed. Please try again.".to_string(),
        )
            .into_response(),
        LoginOutcome::AccountLocked {
            retry_after_minutes,
        } => (
            StatusCode::LOCKED,
            format!(
                "Account is locked due to multiple failed attempts. Try again in {retry_after_minutes} minutes."
            ),
        )
            .into_response(),
        LoginOutcome::FaceRequired => (
            StatusCode::PRECONDITION_REQUIRED,
            "Face verification required. Please provide a camera capture.".to_string(),
        )
            .into_response(),
        LoginOutcome::FaceOracleError { reason } => {
            (StatusCode::UNPROCESSABLE_ENTITY, reason).into_response()
        }
        LoginOutcome::SignatureError => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Error during login process. Please try again.".to_string(),
        )
            .into_response(),
    }
}
