//! Account lockout state machine.
//!
//! Pure functions over [`AuthProfile`]. Lock expiry is evaluated lazily on
//! the next attempt rather than by a background timer, so a locked profile
//! with no further attempts keeps its `locked` flag in storage until someone
//! tries again.

use crate::auth::models::AuthProfile;
use chrono::{DateTime, Duration, Utc};

/// Gate decision for an attempt about to run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Gate {
    Proceed,
    Locked { remaining: Duration },
}

/// Check the lock before any credential is examined.
///
/// An elapsed lockout window clears the lock in place (and resets the
/// counter) as a side effect; the caller is responsible for persisting the
/// cleared profile.
pub fn evaluate_before_attempt(
    profile: &mut AuthProfile,
    now: DateTime<Utc>,
    lockout: Duration,
) -> Gate {
    if !profile.locked {
        return Gate::Proceed;
    }

    let Some(last_failure) = profile.last_failure_at else {
        // A lock without a failure timestamp violates the profile invariant;
        // clearing it beats locking the account out forever.
        clear(profile);
        return Gate::Proceed;
    };

    let unlock_at = last_failure + lockout;
    if now < unlock_at {
        Gate::Locked {
            remaining: unlock_at - now,
        }
    } else {
        clear(profile);
        Gate::Proceed
    }
}

/// Record a failed credential check (wrong password or face mismatch — both
/// factors share the counter). Returns whether this failure engaged the lock.
pub fn record_failure(profile: &mut AuthProfile, now: DateTime<Utc>, max_attempts: u32) -> bool {
    profile.failed_attempts += 1;
    profile.last_failure_at = Some(now);
    if profile.failed_attempts >= max_attempts {
        profile.locked = true;
    }
    profile.locked
}

/// Reset the counter and lock after a fully successful authentication.
pub fn record_success(profile: &mut AuthProfile) {
    clear(profile);
}

fn clear(profile: &mut AuthProfile) {
    profile.locked = false;
    profile.failed_attempts = 0;
}

/// Remaining lock time ceiled to whole minutes for user messaging.
#[must_use]
pub fn ceil_minutes(remaining: Duration) -> i64 {
    let seconds = remaining.num_seconds().max(0);
    (seconds as u64).div_ceil(60) as i64
}
