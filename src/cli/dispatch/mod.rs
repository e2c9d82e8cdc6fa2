//! Command-line argument dispatch.
//!
//! Maps validated CLI arguments to the appropriate action, such as starting
//! the API server with its full configuration.

use crate::cli::actions::Action;
use anyhow::{Context, Result};
use url::Url;

/// Map validated CLI matches to a server action.
///
/// # Errors
/// Returns an error if required arguments are missing or malformed.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let port = matches.get_one::<u16>("port").copied().unwrap_or(8080);
    let dsn = matches
        .get_one::<String>("dsn")
        .cloned()
        .context("missing required argument: --dsn")?;

    let face_oracle_url = matches
        .get_one::<String>("face-oracle-url")
        .cloned()
        .context("missing required argument: --face-oracle-url")?;
    Url::parse(&face_oracle_url).context("invalid CERBERUS_FACE_ORACLE_URL")?;

    Ok(Action::Server {
        port,
        dsn,
        face_oracle_url,
        face_tolerance: matches
            .get_one::<f64>("face-tolerance")
            .copied()
            .unwrap_or(0.6),
        max_attempts: matches
            .get_one::<u32>("max-attempts")
            .copied()
            .unwrap_or(5),
        lockout_minutes: matches
            .get_one::<i64>("lockout-minutes")
            .copied()
            .unwrap_or(15),
    })
}
