//! Generated `OpenAPI` document for the authentication endpoints.
//!
//! `/health` is intentionally left undocumented; it is an operational probe,
//! not part of the public contract.

use crate::api::handlers;
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::register::register,
        handlers::login::login,
        handlers::face::verify_face,
        handlers::challenge::verify_challenge,
        handlers::attempts::attempts,
    ),
    components(schemas(
        handlers::register::RegisterRequest,
        handlers::register::RegisterResponse,
        handlers::login::LoginRequest,
        handlers::login::LoginResponse,
        handlers::face::FaceVerifyRequest,
        handlers::face::FaceVerifyResponse,
        handlers::challenge::ChallengeVerifyRequest,
        handlers::challenge::ChallengeVerifyResponse,
        handlers::attempts::AttemptView,
    )),
    tags(
        (name = "auth", description = "Password, face, and signed-challenge authentication")
    )
)]
struct ApiDoc;

#[must_use]
pub fn openapi() -> utoipa::openapi::OpenApi {
    ApiDoc::openapi()
}
