//! Pre-login face probe. Lets the client check its capture before
//! submitting the full login form; never mutates lockout state.

use crate::api::handlers::decode_face_data;
use crate::auth::engine::{AuthEngine, FaceProbe};
use crate::auth::face::MatchResult;
use axum::{extract::Extension, http::StatusCode, response::IntoResponse, Json};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::error;
use utoipa::ToSchema;

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct FaceVerifyRequest {
    pub username: String,
    /// Webcam capture as a base64 data URL.
    pub face_data: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct FaceVerifyResponse {
    pub success: bool,
    /// Match score as a percentage, two decimal places.
    pub score: Option<f64>,
    pub error: Option<String>,
}

fn probe_response(success: bool, score: Option<f64>, error: Option<&str>) -> FaceVerifyResponse {
    FaceVerifyResponse {
        success,
        score: score.map(as_percent),
        error: error.map(str::to_string),
    }
}

fn as_percent(score: f64) -> f64 {
    (score * 10_000.0).round() / 100.0
}

#[utoipa::path(
    post,
    path = "/v1/auth/face/verify",
    request_body = FaceVerifyRequest,
    responses(
        (status = 200, description = "Probe result", body = FaceVerifyResponse),
        (status = 400, description = "Validation error", body = String)
    ),
    tag = "auth"
)]
pub async fn verify_face(
    engine: Extension<Arc<AuthEngine>>,
    payload: Option<Json<FaceVerifyRequest>>,
) -> impl IntoResponse {
    let request: FaceVerifyRequest = match payload {
        Some(Json(payload)) => payload,
        None => return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response(),
    };

    let sample = match decode_face_data(&request.face_data) {
        Ok(bytes) => bytes,
        Err(err) => return (StatusCode::BAD_REQUEST, err).into_response(),
    };

    let probe = match engine.probe_face(request.username.trim(), &sample).await {
        Ok(probe) => probe,
        Err(err) => {
            error!("Face probe failed: {err:#}");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Face verification failed".to_string(),
            )
                .into_response();
        }
    };

    let body = match probe {
        FaceProbe::UnknownUser => probe_response(false, None, Some("User not found")),
        FaceProbe::NotEnrolled => {
            probe_response(false, None, Some("No face data registered for this user"))
        }
        FaceProbe::Result(MatchResult::Matched { score }) => {
            probe_response(true, Some(score), None)
        }
        FaceProbe::Result(MatchResult::NotMatched { score }) => {
            probe_response(false, Some(score), Some("Face verification failed"))
        }
        FaceProbe::Result(MatchResult::NoFaceDetected) => {
            probe_response(false, None, Some("No face detected in the provided image."))
        }
        FaceProbe::Result(MatchResult::MultipleFacesDetected) => probe_response(
            false,
            None,
            Some("Multiple faces detected in the provided image."),
        ),
        FaceProbe::Result(MatchResult::OracleError { reason }) => {
            probe_response(false, None, Some(&reason))
        }
    };

    (StatusCode::OK, Json(body)).into_response()
}
