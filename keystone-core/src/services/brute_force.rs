//! Brute force protection service for account-based lockout.
//!
//! Tracks failed logins per email and derives two penalties from the failures
//! inside the observation window:
//!
//! - a progressive delay applied before the next credential check
//! - an exponentially growing lockout once the failure threshold is reached
//!
//! Failures are recorded for unknown emails as well, so the responses never
//! reveal whether an account exists.
//!
//! # Example
//!
//! ```rust,ignore
//! use keystone_core::services::BruteForceProtectionService;
//! use keystone_core::BruteForceProtectionConfig;
//!
//! let service = BruteForceProtectionService::new(
//!     repository,
//!     BruteForceProtectionConfig::default(),
//! );
//!
//! let status = service.check("user@example.com").await?;
//! if !status.allowed {
//!     // account locked until status.locked_until
//! }
//! tokio::time::sleep(status.delay).await;
//! ```

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::{
    Error,
    brute_force::{AttemptStats, BruteForceProtectionConfig, BruteForceStatus},
    repositories::BruteForceProtectionRepository,
};

/// Cleanup runs hourly
const CLEANUP_INTERVAL: std::time::Duration = std::time::Duration::from_secs(3600);

/// Service for managing brute force protection.
///
/// Stateless apart from its configuration; safe to share across tasks.
pub struct BruteForceProtectionService<R: BruteForceProtectionRepository> {
    repository: Arc<R>,
    config: BruteForceProtectionConfig,
}

impl<R: BruteForceProtectionRepository> BruteForceProtectionService<R> {
    pub fn new(repository: Arc<R>, config: BruteForceProtectionConfig) -> Self {
        Self { repository, config }
    }

    /// Get the current configuration.
    pub fn config(&self) -> &BruteForceProtectionConfig {
        &self.config
    }

    /// Current status for an email: whether a login may be attempted, and after what delay.
    pub async fn check(&self, email: &str) -> Result<BruteForceStatus, Error> {
        if !self.config.enabled {
            return Ok(BruteForceStatus::unrestricted(
                email,
                self.config.max_failed_attempts,
            ));
        }

        let now = Utc::now();
        let window_start = now - self.config.observation_window;
        let stats = self
            .repository
            .get_attempt_stats(email, window_start)
            .await?;

        Ok(self.compute_status(email, &stats, now))
    }

    /// Record a failed login attempt and return the updated status.
    ///
    /// A no-op returning an unrestricted status when protection is disabled.
    pub async fn record_failed_attempt(
        &self,
        email: &str,
        ip_address: Option<&str>,
        user_agent: Option<&str>,
    ) -> Result<BruteForceStatus, Error> {
        if !self.config.enabled {
            return Ok(BruteForceStatus::unrestricted(
                email,
                self.config.max_failed_attempts,
            ));
        }

        self.repository
            .record_failed_attempt(email, ip_address, user_agent)
            .await?;

        let status = self.check(email).await?;

        if status.is_locked() {
            tracing::warn!(
                email = %email,
                failed_attempts = status.failed_attempts,
                locked_until = ?status.locked_until,
                "Account locked after repeated login failures"
            );
        } else {
            tracing::debug!(
                email = %email,
                failed_attempts = status.failed_attempts,
                "Recorded failed login attempt"
            );
        }

        Ok(status)
    }

    /// Clear all attempts for an email address on successful login.
    pub async fn reset_attempts(&self, email: &str) -> Result<(), Error> {
        self.repository.clear_attempts(email).await?;
        Ok(())
    }

    /// Unlock an account regardless of its state.
    ///
    /// Returns `true` if the account was locked.
    pub async fn unlock_account(&self, email: &str) -> Result<bool, Error> {
        let was_locked = self.check(email).await?.is_locked();
        self.repository.clear_attempts(email).await?;
        if was_locked {
            tracing::info!(email = %email, "Account unlocked");
        }
        Ok(was_locked)
    }

    /// Delete attempts older than the retention period.
    pub async fn cleanup_old_attempts(&self) -> Result<u64, Error> {
        let before = Utc::now() - self.config.retention_period;
        self.repository.cleanup_old_attempts(before).await
    }

    /// Start the background cleanup task.
    ///
    /// Runs hourly until `shutdown` changes.
    pub fn start_cleanup_task(
        &self,
        mut shutdown: tokio::sync::watch::Receiver<bool>,
    ) -> tokio::task::JoinHandle<()> {
        let repository = Arc::clone(&self.repository);
        let retention = self.config.retention_period;

        tokio::spawn(async move {
            let mut interval_timer = tokio::time::interval(CLEANUP_INTERVAL);

            loop {
                tokio::select! {
                    _ = interval_timer.tick() => {
                        let before = Utc::now() - retention;
                        match repository.cleanup_old_attempts(before).await {
                            Ok(count) if count > 0 => {
                                tracing::info!(
                                    count = count,
                                    "Cleaned up old failed login attempt records"
                                );
                            }
                            Err(e) => {
                                tracing::warn!(
                                    error = %e,
                                    "Failed to cleanup failed login attempt records"
                                );
                            }
                            _ => {}
                        }
                    }
                    _ = shutdown.changed() => {
                        tracing::info!("Shutting down brute force protection cleanup task");
                        break;
                    }
                }
            }
        })
    }

    fn compute_status(
        &self,
        email: &str,
        stats: &AttemptStats,
        now: DateTime<Utc>,
    ) -> BruteForceStatus {
        let failures = stats.count;

        // lockout runs from the latest failure
        let locked_until = self
            .config
            .lockout_duration(failures)
            .zip(stats.latest_at)
            .map(|(lockout, latest)| latest + lockout)
            .filter(|until| *until > now);

        let allowed = locked_until.is_none();

        BruteForceStatus {
            email: email.to_string(),
            allowed,
            failed_attempts: failures,
            attempts_remaining: self.config.max_failed_attempts.saturating_sub(failures),
            delay: if allowed {
                self.config.delay_for(failures)
            } else {
                std::time::Duration::ZERO
            },
            locked_until,
        }
    }
}
