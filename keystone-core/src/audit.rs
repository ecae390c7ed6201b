//! Authentication audit trail
//!
//! Every security-relevant outcome is appended to the audit log. Records are
//! never updated or deleted by this crate.
//!
//! | Field           | Type             | Description                                   |
//! | --------------- | ---------------- | --------------------------------------------- |
//! | `id`            | `i64`            | Storage-assigned identifier.                  |
//! | `user_id`       | `Option<UserId>` | Known user, if identity was established.      |
//! | `email`         | `String`         | Email the event concerns.                     |
//! | `event_type`    | `AuditEventType` | What happened.                                |
//! | `success`       | `bool`           | Outcome.                                      |
//! | `ip_address`    | `Option<String>` | Client address.                               |
//! | `user_agent`    | `Option<String>` | Client user agent.                            |
//! | `error_message` | `Option<String>` | Failure detail.                               |
//! | `metadata`      | `Value`          | JSON object with event-specific detail.       |
//! | `created_at`    | `DateTime`       | When the event was recorded.                  |
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{RequestContext, UserId, error::ValidationError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventType {
    LoginFailed,
    LoginSucceeded,
    Logout,
    Registration,
    EmailChanged,
    OauthConnected,
    TwoFactorEnabled,
    TwoFactorDisabled,
    TwoFactorVerified,
    TwoFactorFailed,
    BackupCodesRegenerated,
    SessionRevoked,
}

impl AuditEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditEventType::LoginFailed => "login_failed",
            AuditEventType::LoginSucceeded => "login_succeeded",
            AuditEventType::Logout => "logout",
            AuditEventType::Registration => "registration",
            AuditEventType::EmailChanged => "email_changed",
            AuditEventType::OauthConnected => "oauth_connected",
            AuditEventType::TwoFactorEnabled => "two_factor_enabled",
            AuditEventType::TwoFactorDisabled => "two_factor_disabled",
            AuditEventType::TwoFactorVerified => "two_factor_verified",
            AuditEventType::TwoFactorFailed => "two_factor_failed",
            AuditEventType::BackupCodesRegenerated => "backup_codes_regenerated",
            AuditEventType::SessionRevoked => "session_revoked",
        }
    }
}

impl std::fmt::Display for AuditEventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuditEventType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "login_failed" => Ok(AuditEventType::LoginFailed),
            "login_succeeded" => Ok(AuditEventType::LoginSucceeded),
            "logout" => Ok(AuditEventType::Logout),
            "registration" => Ok(AuditEventType::Registration),
            "email_changed" => Ok(AuditEventType::EmailChanged),
            "oauth_connected" => Ok(AuditEventType::OauthConnected),
            "two_factor_enabled" => Ok(AuditEventType::TwoFactorEnabled),
            "two_factor_disabled" => Ok(AuditEventType::TwoFactorDisabled),
            "two_factor_verified" => Ok(AuditEventType::TwoFactorVerified),
            "two_factor_failed" => Ok(AuditEventType::TwoFactorFailed),
            "backup_codes_regenerated" => Ok(AuditEventType::BackupCodesRegenerated),
            "session_revoked" => Ok(AuditEventType::SessionRevoked),
            other => Err(ValidationError::InvalidField(format!(
                "Unknown audit event type: {other}"
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub id: i64,
    pub user_id: Option<UserId>,
    pub email: String,
    pub event_type: AuditEventType,
    pub success: bool,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub error_message: Option<String>,
    pub metadata: Value,
    pub created_at: DateTime<Utc>,
}

impl AuditEvent {
    /// The `reason` metadata entry, if present.
    pub fn reason(&self) -> Option<&str> {
        self.metadata.get("reason").and_then(Value::as_str)
    }
}

/// An audit event waiting to be written
#[derive(Debug, Clone)]
pub struct NewAuditEvent {
    pub user_id: Option<UserId>,
    pub email: String,
    pub event_type: AuditEventType,
    pub success: bool,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub error_message: Option<String>,
    pub metadata: Map<String, Value>,
}

impl NewAuditEvent {
    pub fn new(email: &str, event_type: AuditEventType, success: bool) -> Self {
        Self {
            user_id: None,
            email: email.to_string(),
            event_type,
            success,
            ip_address: None,
            user_agent: None,
            error_message: None,
            metadata: Map::new(),
        }
    }

    pub fn user_id(mut self, user_id: &UserId) -> Self {
        self.user_id = Some(user_id.clone());
        self
    }

    pub fn ip_address(mut self, ip_address: Option<String>) -> Self {
        self.ip_address = ip_address;
        self
    }

    pub fn user_agent(mut self, user_agent: Option<String>) -> Self {
        self.user_agent = user_agent;
        self
    }

    /// Copy the client address and user agent from a request.
    pub fn context(self, ctx: &RequestContext) -> Self {
        self.ip_address(ctx.ip_address.clone())
            .user_agent(ctx.user_agent.clone())
    }

    pub fn error_message(mut self, message: impl Into<String>) -> Self {
        self.error_message = Some(message.into());
        self
    }

    pub fn metadata(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }

    /// Shorthand for the `reason` metadata entry.
    pub fn reason(self, reason: &str) -> Self {
        self.metadata("reason", reason)
    }
}
