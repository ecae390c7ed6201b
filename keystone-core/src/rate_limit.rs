//! Fixed-window rate limiting with lockout
//!
//! Each `(action, subject)` pair owns one [`RateLimitRecord`]. The transition
//! applied on every attempt is [`RateLimitRecord::apply_attempt`]; storage
//! backends must perform the same transition atomically.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitPolicy {
    pub window: Duration,
    pub max_attempts: u32,
    pub lockout: Duration,
}

pub const LOGIN_POLICY: RateLimitPolicy = RateLimitPolicy {
    window: Duration::minutes(15),
    max_attempts: 5,
    lockout: Duration::minutes(15),
};

pub const REGISTER_POLICY: RateLimitPolicy = RateLimitPolicy {
    window: Duration::hours(1),
    max_attempts: 3,
    lockout: Duration::hours(1),
};

pub const TWO_FACTOR_POLICY: RateLimitPolicy = RateLimitPolicy {
    window: Duration::minutes(15),
    max_attempts: 5,
    lockout: Duration::minutes(15),
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RateLimitAction {
    Login,
    Register,
    TwoFactor,
}

impl RateLimitAction {
    pub const ALL: [RateLimitAction; 3] = [
        RateLimitAction::Login,
        RateLimitAction::Register,
        RateLimitAction::TwoFactor,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RateLimitAction::Login => "login",
            RateLimitAction::Register => "register",
            RateLimitAction::TwoFactor => "two_factor",
        }
    }

    pub fn policy(&self) -> RateLimitPolicy {
        match self {
            RateLimitAction::Login => LOGIN_POLICY,
            RateLimitAction::Register => REGISTER_POLICY,
            RateLimitAction::TwoFactor => TWO_FACTOR_POLICY,
        }
    }

    /// Storage key for `subject` under this action, e.g. `login:203.0.113.7`.
    pub fn key(&self, subject: &str) -> String {
        format!("{}:{}", self.as_str(), subject)
    }

    /// Longest window or lockout across all policies.
    pub fn longest_retention() -> Duration {
        Self::ALL
            .iter()
            .map(|action| {
                let policy = action.policy();
                policy.window.max(policy.lockout)
            })
            .max()
            .unwrap_or_else(|| Duration::hours(1))
    }
}

impl std::fmt::Display for RateLimitAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitRecord {
    pub identifier: String,
    pub count: u32,
    pub window_start: DateTime<Utc>,
    pub lock_until: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl RateLimitRecord {
    /// A fresh window holding one attempt.
    pub fn first_attempt(identifier: &str, now: DateTime<Utc>) -> Self {
        Self {
            identifier: identifier.to_string(),
            count: 1,
            window_start: now,
            lock_until: None,
            updated_at: now,
        }
    }

    pub fn is_locked_at(&self, now: DateTime<Utc>) -> bool {
        self.lock_until.is_some_and(|until| now <= until)
    }

    /// The record after one more attempt at `now`.
    ///
    /// - an active lock freezes the record
    /// - an expired window or an expired lock starts a new window with one attempt
    /// - otherwise the count grows, and passing `max_attempts` sets the lock
    pub fn apply_attempt(
        existing: Option<&RateLimitRecord>,
        identifier: &str,
        policy: &RateLimitPolicy,
        now: DateTime<Utc>,
    ) -> RateLimitRecord {
        let Some(record) = existing else {
            return Self::first_attempt(identifier, now);
        };

        if record.is_locked_at(now) {
            return record.clone();
        }

        let window_expired = now - record.window_start > policy.window;
        let lock_expired = record.lock_until.is_some_and(|until| now > until);
        if window_expired || lock_expired {
            return Self::first_attempt(identifier, now);
        }

        let count = record.count.saturating_add(1);
        let lock_until = (count > policy.max_attempts).then(|| now + policy.lockout);

        RateLimitRecord {
            identifier: identifier.to_string(),
            count,
            window_start: record.window_start,
            lock_until,
            updated_at: now,
        }
    }
}

/// Outcome of one rate-limit check
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    pub reset_at: DateTime<Utc>,
    pub locked_until: Option<DateTime<Utc>>,
}

impl RateLimitDecision {
    /// Read the decision off the record produced by an attempt.
    pub fn from_record(
        record: &RateLimitRecord,
        policy: &RateLimitPolicy,
        now: DateTime<Utc>,
    ) -> Self {
        match record.lock_until {
            Some(until) if now <= until => Self {
                allowed: false,
                limit: policy.max_attempts,
                remaining: 0,
                reset_at: until,
                locked_until: Some(until),
            },
            _ => Self {
                allowed: true,
                limit: policy.max_attempts,
                remaining: policy.max_attempts.saturating_sub(record.count),
                reset_at: record.window_start + policy.window,
                locked_until: None,
            },
        }
    }

    /// Decision used when the store is unavailable and the limiter fails open.
    pub fn fail_open(policy: &RateLimitPolicy, now: DateTime<Utc>) -> Self {
        Self {
            allowed: true,
            limit: policy.max_attempts,
            remaining: policy.max_attempts,
            reset_at: now + policy.window,
            locked_until: None,
        }
    }

    /// Seconds until the client may retry, never negative.
    pub fn retry_after_secs(&self, now: DateTime<Utc>) -> i64 {
        (self.reset_at - now).num_seconds().max(0)
    }
}
