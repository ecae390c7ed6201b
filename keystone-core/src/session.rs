//! Authentication sessions
//!
//! An authentication session is what the identity platform hands out after a
//! completed login. The token is an opaque 256-bit random value; only its
//! SHA-256 hash is ever persisted.
//!
//! | Field        | Type             | Description                                            |
//! | ------------ | ---------------- | ------------------------------------------------------ |
//! | `token`      | `SessionToken`   | The bearer token presented by the client.              |
//! | `user_id`    | `UserId`         | The unique identifier for the user.                    |
//! | `user_agent` | `Option<String>` | The user agent of the client that created the session. |
//! | `ip_address` | `Option<String>` | The IP address of the client that created the session. |
//! | `created_at` | `DateTime`       | The timestamp when the session was created.            |
//! | `updated_at` | `DateTime`       | The timestamp when the session was last updated.       |
//! | `expires_at` | `DateTime`       | The timestamp when the session will expire.            |
//! | `device_session_id` | `Option<DeviceSessionId>` | The device entry the login was recorded under. |
//!
//! Accounts with two-factor authentication get a [`TwoFactorChallenge`]
//! instead of a session after the password step. It is short lived and can
//! be redeemed once.
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    crypto::{generate_secure_token, hash_token},
    device_session::DeviceSessionId,
    user::UserId,
};

/// Opaque bearer token for an authentication session
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionToken(String);

impl SessionToken {
    pub fn new(token: &str) -> Self {
        Self(token.to_string())
    }

    pub fn new_random() -> Self {
        Self(generate_secure_token())
    }

    /// The value stored in place of the token.
    pub fn hash(&self) -> String {
        hash_token(&self.0)
    }

    pub fn into_inner(self) -> String {
        self.0
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SessionToken {
    fn default() -> Self {
        Self::new_random()
    }
}

impl From<String> for SessionToken {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for SessionToken {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl std::fmt::Display for SessionToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    /// The bearer token. Only the hash is stored.
    pub token: SessionToken,

    /// The unique identifier for the user.
    pub user_id: UserId,

    /// The user agent of the client that created the session.
    pub user_agent: Option<String>,

    /// The IP address of the client that created the session.
    pub ip_address: Option<String>,

    /// The timestamp when the session was created.
    pub created_at: DateTime<Utc>,

    /// The timestamp when the session was last updated.
    pub updated_at: DateTime<Utc>,

    /// The timestamp when the session will expire.
    pub expires_at: DateTime<Utc>,

    /// Revoking this device session ends the authentication session too.
    pub device_session_id: Option<DeviceSessionId>,
}

impl Session {
    pub fn is_expired(&self) -> bool {
        self.expires_at <= Utc::now()
    }
}

/// Pending second factor for a login whose password was accepted
#[derive(Debug, Clone)]
pub struct TwoFactorChallenge {
    /// Handed to the client. Only the hash is stored.
    pub token: SessionToken,
    pub user_id: UserId,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl TwoFactorChallenge {
    pub fn new(user_id: &UserId, expires_in: Duration) -> Self {
        let now = Utc::now();
        Self {
            token: SessionToken::new_random(),
            user_id: user_id.clone(),
            created_at: now,
            expires_at: now + expires_in,
        }
    }

    pub fn is_expired(&self) -> bool {
        self.expires_at <= Utc::now()
    }
}

/// Lifetime of newly issued sessions and two-factor challenges
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub expires_in: Duration,
    pub challenge_expires_in: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            expires_in: Duration::days(30),
            challenge_expires_in: Duration::minutes(5),
        }
    }
}

impl SessionConfig {
    pub fn expires_in(mut self, expires_in: Duration) -> Self {
        self.expires_in = expires_in;
        self
    }

    pub fn challenge_expires_in(mut self, expires_in: Duration) -> Self {
        self.challenge_expires_in = expires_in;
        self
    }
}
