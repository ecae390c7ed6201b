//! Repository trait for brute force protection.
//!
//! Failed attempts are an append-only log; lockout state is derived by
//! counting recent rows.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{
    Error,
    brute_force::{AttemptStats, FailedLoginAttempt},
};

/// Repository for brute force protection data.
///
/// Failed attempts are recorded for every email, existing or not, so the
/// response never reveals whether an account exists.
#[async_trait]
pub trait BruteForceProtectionRepository: Send + Sync + 'static {
    /// Record a failed login attempt.
    async fn record_failed_attempt(
        &self,
        email: &str,
        ip_address: Option<&str>,
        user_agent: Option<&str>,
    ) -> Result<FailedLoginAttempt, Error>;

    /// Count of failed attempts for `email` at or after `since`, and the latest one.
    async fn get_attempt_stats(
        &self,
        email: &str,
        since: DateTime<Utc>,
    ) -> Result<AttemptStats, Error>;

    /// Delete all attempts for an email address, returning the number removed.
    async fn clear_attempts(&self, email: &str) -> Result<u64, Error>;

    /// Delete attempts older than `before`, returning the number removed.
    async fn cleanup_old_attempts(&self, before: DateTime<Utc>) -> Result<u64, Error>;
}
