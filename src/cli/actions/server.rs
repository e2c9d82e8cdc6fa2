use crate::api;
use crate::auth::engine::AuthConfig;
use crate::cli::actions::Action;
use anyhow::Result;

/// Handle the server action
/// # Errors
/// Returns an error if the server fails to start.
pub async fn handle(action: Action) -> Result<()> {
    match action {
        Action::Server {
            port,
            dsn,
            face_oracle_url,
            face_tolerance,
            max_attempts,
            lockout_minutes,
        } => {
            let config = AuthConfig::new()
                .with_max_attempts(max_attempts)
                .with_lockout_minutes(lockout_minutes)
                .with_face_tolerance(face_tolerance);

            api::new(port, dsn, face_oracle_url, config).await?;
        }
    }

    Ok(())
}
