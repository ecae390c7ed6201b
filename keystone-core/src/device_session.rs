//! Device sessions
//!
//! One row per device a user is signed in from, shown in the account's
//! session list and revocable from there. Separate from the authentication
//! session, which carries the bearer token.
//!
//! | Field            | Type               | Description                                  |
//! | ---------------- | ------------------ | -------------------------------------------- |
//! | `id`             | `DeviceSessionId`  | `ses_` prefixed identifier.                  |
//! | `user_id`        | `UserId`           | Owner.                                       |
//! | `device_name`    | `String`           | Derived from the user agent, e.g. `iPhone`.  |
//! | `browser`        | `String`           | Derived from the user agent.                 |
//! | `os`             | `String`           | Derived from the user agent.                 |
//! | `ip_address`     | `Option<String>`   | Last address seen.                           |
//! | `last_active_at` | `DateTime`         | Last heartbeat.                              |
//! | `is_current`     | `bool`             | The user's most recently active device.      |
//! | `revoked_at`     | `Option<DateTime>` | Set on revocation; revoked rows are hidden.  |
//! | `created_at`     | `DateTime`         | First seen.                                  |
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    id::{generate_prefixed_id, validate_prefixed_id},
    user::UserId,
    user_agent::DeviceInfo,
};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceSessionId(String);

impl DeviceSessionId {
    pub fn new(id: &str) -> Self {
        Self(id.to_string())
    }

    pub fn new_random() -> Self {
        Self(generate_prefixed_id("ses"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_valid(&self) -> bool {
        validate_prefixed_id(&self.0, "ses")
    }
}

impl From<String> for DeviceSessionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl std::fmt::Display for DeviceSessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceSession {
    pub id: DeviceSessionId,
    pub user_id: UserId,
    pub device_name: String,
    pub browser: String,
    pub os: String,
    pub ip_address: Option<String>,
    pub last_active_at: DateTime<Utc>,
    pub is_current: bool,
    pub revoked_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl DeviceSession {
    pub fn new(user_id: &UserId, device: DeviceInfo, ip_address: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            id: DeviceSessionId::new_random(),
            user_id: user_id.clone(),
            device_name: device.device_name,
            browser: device.browser,
            os: device.os,
            ip_address,
            last_active_at: now,
            is_current: true,
            revoked_at: None,
            created_at: now,
        }
    }

    pub fn is_revoked(&self) -> bool {
        self.revoked_at.is_some()
    }

    /// Same device and address as `device` seen from `ip_address`.
    pub fn matches(&self, device: &DeviceInfo, ip_address: Option<&str>) -> bool {
        self.device_name == device.device_name
            && self.browser == device.browser
            && self.os == device.os
            && self.ip_address.as_deref() == ip_address
    }
}
