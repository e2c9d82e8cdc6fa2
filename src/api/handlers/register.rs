//! Registration endpoint: identity, eager key pair, optional face template.

use crate::api::handlers::{decode_face_data, valid_password, valid_username};
use crate::auth::engine::{AuthEngine, RegisterOutcome};
use axum::{extract::Extension, http::StatusCode, response::IntoResponse, Json};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::error;
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(ToSchema, Deserialize, Debug)]
pub struct RegisterRequest {
    pub username: String,
    #[schema(value_type = String)]
    pub password: SecretString,
    /// Optional webcam capture as a base64 data URL; enrolls the face
    /// factor for this account.
    pub face_data: Option<String>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct RegisterResponse {
    pub user_id: Uuid,
    pub username: String,
    pub face_enrolled: bool,
    /// Present when the account was created but face enrollment failed.
    pub warning: Option<String>,
}

#[utoipa::path(
    post,
    path = "/v1/auth/register",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Registration successful", body = RegisterResponse),
        (status = 400, description = "Validation error", body = String),
        (status = 409, description = "User with the specified username already exists", body = String)
    ),
    tag = "auth"
)]
pub async fn register(
    engine: Extension<Arc<AuthEngine>>,
    payload: Option<Json<RegisterRequest>>,
) -> impl IntoResponse {
    let request: RegisterRequest = match payload {
        Some(Json(payload)) => payload,
        None => return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response(),
    };

    let username = request.username.trim().to_string();
    if !valid_username(&username) {
        return (StatusCode::BAD_REQUEST, "Invalid username".to_string()).into_response();
    }
    if !valid_password(request.password.expose_secret()) {
        return (
            StatusCode::BAD_REQUEST,
            "Password must be at least 8 characters".to_string(),
        )
            .into_response();
    }

    let face_sample = match request.face_data.as_deref() {
        Some(data) => match decode_face_data(data) {
            Ok(bytes) => Some(bytes),
            Err(err) => return (StatusCode::BAD_REQUEST, err).into_response(),
        },
        None => None,
    };

    let outcome = match engine
        .register(&username, &request.password, face_sample.as_deref())
        .await
    {
        Ok(outcome) => outcome,
        Err(err) => {
            error!("Registration failed: {err:#}");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Registration failed".to_string(),
            )
                .into_response();
        }
    };

    match outcome {
        RegisterOutcome::Created {
            identity,
            face_enrolled,
            face_error,
        } => (
            StatusCode::CREATED,
            Json(RegisterResponse {
                user_id: identity.id,
                username: identity.username,
                face_enrolled,
                warning: face_error,
            }),
        )
            .into_response(),
        RegisterOutcome::UsernameTaken => (
            StatusCode::CONFLICT,
            "User with the specified username already exists".to_string(),
        )
            .into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::register;
    use crate::api::handlers::test_engine;
    use anyhow::Result;
    use axum::{extract::Extension, http::StatusCode, response::IntoResponse, Json};
    use serde_json::json;

    #[tokio::test]
    async fn register_missing_payload() -> Result<()> {
        let response = register(Extension(test_engine()?), None)
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        Ok(())
    }

    #[tokio::test]
    async fn register_rejects_invalid_username() -> Result<()> {
        let request = serde_json::from_value(json!({
            "username": "a b",
            "password": "hunter2!"
        }))?;
        let response = register(Extension(test_engine()?), Some(Json(request)))
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        Ok(())
    }

    #[tokio::test]
    async fn register_rejects_short_password() -> Result<()> {
        let request = serde_json::from_value(json!({
            "username": "alice",
            "password": "short"
        }))?;
        let response = register(Extension(test_engine()?), Some(Json(request)))
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        Ok(())
    }
}
