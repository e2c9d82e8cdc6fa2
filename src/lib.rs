//! # Cerberus (Multi-factor Authentication Service)
//!
//! `cerberus` authenticates a user through three combined factors: a
//! password, an optional facial-similarity check, and a server-issued signed
//! challenge bound to the account's key pair.
//!
//! ## Login sequence
//!
//! Every attempt runs the same fixed sequence: lockout gate, password check,
//! face check (when a template is enrolled), then challenge issuance and
//! Ed25519 signing. A locked account's password is never examined, and a face
//! is never compared before the password passes.
//!
//! - **Lockout:** failed password checks and face mismatches share one
//!   counter; crossing the threshold locks the account for a fixed window.
//!   Expiry is evaluated lazily on the next attempt, not by a timer.
//! - **Challenges:** a successful login mints a random token signed with the
//!   account's private key, valid for five minutes and consumed on first
//!   verification.
//! - **Audit:** each credential outcome appends exactly one attempt record;
//!   rejected-while-locked attempts and unusable face samples are not
//!   authentication evidence and are not recorded.
//!
//! Face comparison itself is delegated to an external similarity oracle over
//! HTTP; this crate only applies the match decision rule to its readings.

pub mod api;
pub mod auth;
pub mod cli;
pub mod storage;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);
