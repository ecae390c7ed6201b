//! Per-account brute-force protection types
//!
//! Failures are kept as an append-only log; the lockout and delay for an
//! account are computed from the failures inside the observation window.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Lockout and progressive-delay policy
#[derive(Debug, Clone)]
pub struct BruteForceProtectionConfig {
    /// When false, every check allows and nothing is recorded.
    pub enabled: bool,
    /// Failures that lock the account.
    pub max_failed_attempts: u32,
    /// Failures older than this are ignored.
    pub observation_window: Duration,
    /// Lockout after exactly `max_failed_attempts`; doubles with every further failure.
    pub base_lockout: Duration,
    pub max_lockout: Duration,
    /// Failures after which each credential check is delayed.
    pub delay_after: u32,
    /// Delay at `delay_after` failures; doubles with every further failure.
    pub base_delay: std::time::Duration,
    pub max_delay: std::time::Duration,
    /// How long failed attempts are kept for auditing.
    pub retention_period: Duration,
}

impl Default for BruteForceProtectionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_failed_attempts: 5,
            observation_window: Duration::hours(1),
            base_lockout: Duration::minutes(15),
            max_lockout: Duration::hours(1),
            delay_after: 3,
            base_delay: std::time::Duration::from_secs(1),
            max_delay: std::time::Duration::from_secs(8),
            retention_period: Duration::days(7),
        }
    }
}

impl BruteForceProtectionConfig {
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Default::default()
        }
    }

    pub fn max_failed_attempts(mut self, max_failed_attempts: u32) -> Self {
        self.max_failed_attempts = max_failed_attempts;
        self
    }

    pub fn base_delay(mut self, base_delay: std::time::Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    pub fn retention_period(mut self, retention_period: Duration) -> Self {
        self.retention_period = retention_period;
        self
    }

    /// Lockout length after `failures` failures, or `None` below the threshold.
    pub fn lockout_duration(&self, failures: u32) -> Option<Duration> {
        if failures < self.max_failed_attempts {
            return None;
        }
        let doublings = (failures - self.max_failed_attempts).min(16);
        let lockout = self.base_lockout * 2i32.pow(doublings);
        Some(lockout.min(self.max_lockout))
    }

    /// Delay to apply before the next credential check after `failures` failures.
    pub fn delay_for(&self, failures: u32) -> std::time::Duration {
        if failures < self.delay_after {
            return std::time::Duration::ZERO;
        }
        let doublings = (failures - self.delay_after).min(16);
        self.base_delay
            .saturating_mul(2u32.pow(doublings))
            .min(self.max_delay)
    }
}

/// Current brute-force state of one account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BruteForceStatus {
    pub email: String,
    pub allowed: bool,
    pub failed_attempts: u32,
    pub attempts_remaining: u32,
    pub delay: std::time::Duration,
    pub locked_until: Option<DateTime<Utc>>,
}

impl BruteForceStatus {
    pub fn unrestricted(email: &str, max_failed_attempts: u32) -> Self {
        Self {
            email: email.to_string(),
            allowed: true,
            failed_attempts: 0,
            attempts_remaining: max_failed_attempts,
            delay: std::time::Duration::ZERO,
            locked_until: None,
        }
    }

    pub fn is_locked(&self) -> bool {
        !self.allowed
    }
}

/// One row of the failed attempt log
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailedLoginAttempt {
    pub id: i64,
    pub email: String,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub attempted_at: DateTime<Utc>,
}

/// Failed attempts for one email within a window
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttemptStats {
    pub count: u32,
    pub latest_at: Option<DateTime<Utc>>,
}
