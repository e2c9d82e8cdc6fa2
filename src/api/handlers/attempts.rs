//! Recent login attempts read model (dashboard and admin listings).

use crate::auth::engine::AuthEngine;
use crate::auth::models::AttemptRecord;
use axum::{
    extract::{Extension, Query},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::error;
use utoipa::ToSchema;

const DEFAULT_LIMIT: i64 = 5;
const MAX_LIMIT: i64 = 50;

#[derive(Deserialize, Debug)]
pub struct AttemptsParams {
    pub username: String,
    pub limit: Option<i64>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct AttemptView {
    pub attempted_at: DateTime<Utc>,
    pub succeeded: bool,
    pub source_address: Option<String>,
    pub client_agent: Option<String>,
    pub face_score: Option<f64>,
    pub signature_verified: Option<bool>,
}

impl From<AttemptRecord> for AttemptView {
    fn from(record: AttemptRecord) -> Self {
        Self {
            attempted_at: record.attempted_at,
            succeeded: record.succeeded,
            source_address: record.source_address,
            client_agent: record.client_agent,
            face_score: record.face_score,
            signature_verified: record.signature_verified,
        }
    }
}

#[utoipa::path(
    get,
    path = "/v1/auth/attempts",
    params(
        ("username" = String, Query, description = "Account to list attempts for"),
        ("limit" = Option<i64>, Query, description = "Maximum records, newest first (default 5)")
    ),
    responses(
        (status = 200, description = "Recent attempts, newest first", body = [AttemptView]),
        (status = 404, description = "Unknown user", body = String)
    ),
    tag = "auth"
)]
pub async fn attempts(
    engine: Extension<Arc<AuthEngine>>,
    Query(params): Query<AttemptsParams>,
) -> impl IntoResponse {
    let limit = params.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);

    match engine.recent_attempts(params.username.trim(), limit).await {
        Ok(Some(records)) => {
            let views: Vec<AttemptView> = records.into_iter().map(AttemptView::from).collect();
            (StatusCode::OK, Json(views)).into_response()
        }
        Ok(None) => (StatusCode::NOT_FOUND, "User not found".to_string()).into_response(),
        Err(err) => {
            error!("Attempt listing failed: {err:#}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Attempt listing failed".to_string(),
            )
                .into_response()
        }
    }
}
