//! User profile
//!
//! The profile is owned by the identity platform; this core only reads it and
//! writes the two-factor fields.
//!
//! | Field                | Type               | Description                                        |
//! | -------------------- | ------------------ | -------------------------------------------------- |
//! | `id`                 | `UserId`           | Stable identifier, `usr_` prefixed.                |
//! | `email`              | `String`           | Login email, unique.                               |
//! | `name`               | `Option<String>`   | Display name.                                      |
//! | `email_verified_at`  | `Option<DateTime>` | When the email was verified.                       |
//! | `two_factor_enabled` | `bool`             | Whether login requires a second factor.            |
//! | `two_factor_secret`  | `Option<String>`   | Base32 TOTP secret, never serialized.              |
//! | `backup_codes`       | `Vec<String>`      | SHA-256 hashes of unused codes, never serialized.  |
//! | `created_at`         | `DateTime`         | Creation timestamp.                                |
//! | `updated_at`         | `DateTime`         | Last update timestamp.                             |
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    Error,
    error::ValidationError,
    id::{generate_prefixed_id, validate_prefixed_id},
};

/// A unique, stable identifier for a specific user
///
/// Treat the value as opaque.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Hash)]
pub struct UserId(String);

impl UserId {
    pub fn new(id: &str) -> Self {
        UserId(id.to_string())
    }

    pub fn new_random() -> Self {
        UserId(generate_prefixed_id("usr"))
    }

    pub fn into_inner(self) -> String {
        self.0
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_valid(&self) -> bool {
        validate_prefixed_id(&self.0, "usr")
    }
}

impl Default for UserId {
    fn default() -> Self {
        Self::new_random()
    }
}

impl From<String> for UserId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for UserId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub name: Option<String>,
    pub email: String,
    pub email_verified_at: Option<DateTime<Utc>>,

    pub two_factor_enabled: bool,

    #[serde(default, skip_serializing)]
    pub two_factor_secret: Option<String>,

    #[serde(default, skip_serializing)]
    pub backup_codes: Vec<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn builder() -> UserBuilder {
        UserBuilder::default()
    }

    pub fn is_email_verified(&self) -> bool {
        self.email_verified_at.is_some()
    }

    /// The persisted two-factor state of this user.
    pub fn two_factor(&self) -> TwoFactorCredential {
        TwoFactorCredential {
            enabled: self.two_factor_enabled,
            secret: self.two_factor_secret.clone(),
            backup_codes: self.backup_codes.clone(),
        }
    }
}

/// Two-factor fields as they are written back to the profile.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TwoFactorCredential {
    pub enabled: bool,
    pub secret: Option<String>,
    /// SHA-256 hex digests, in issue order
    pub backup_codes: Vec<String>,
}

impl TwoFactorCredential {
    /// The cleared state written on disable.
    pub fn disabled() -> Self {
        Self::default()
    }
}

#[derive(Default)]
pub struct UserBuilder {
    id: Option<UserId>,
    name: Option<String>,
    email: Option<String>,
    email_verified_at: Option<DateTime<Utc>>,
    two_factor: TwoFactorCredential,
    created_at: Option<DateTime<Utc>>,
    updated_at: Option<DateTime<Utc>>,
}

impl UserBuilder {
    pub fn id(mut self, id: UserId) -> Self {
        self.id = Some(id);
        self
    }

    pub fn name(mut self, name: Option<String>) -> Self {
        self.name = name;
        self
    }

    pub fn email(mut self, email: String) -> Self {
        self.email = Some(email);
        self
    }

    pub fn email_verified_at(mut self, email_verified_at: Option<DateTime<Utc>>) -> Self {
        self.email_verified_at = email_verified_at;
        self
    }

    pub fn two_factor(mut self, two_factor: TwoFactorCredential) -> Self {
        self.two_factor = two_factor;
        self
    }

    pub fn created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = Some(created_at);
        self
    }

    pub fn updated_at(mut self, updated_at: DateTime<Utc>) -> Self {
        self.updated_at = Some(updated_at);
        self
    }

    pub fn build(self) -> Result<User, Error> {
        let now = Utc::now();
        Ok(User {
            id: self.id.unwrap_or_default(),
            name: self.name,
            email: self
                .email
                .ok_or(ValidationError::MissingField("email".to_string()))?,
            email_verified_at: self.email_verified_at,
            two_factor_enabled: self.two_factor.enabled,
            two_factor_secret: self.two_factor.secret,
            backup_codes: self.two_factor.backup_codes,
            created_at: self.created_at.unwrap_or(now),
            updated_at: self.updated_at.unwrap_or(now),
        })
    }
}

/// Data needed to create a profile
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewUser {
    pub id: UserId,
    pub email: String,
    pub name: Option<String>,
}

impl NewUser {
    pub fn new(email: &str) -> Self {
        Self {
            id: UserId::new_random(),
            email: email.to_string(),
            name: None,
        }
    }

    pub fn with_name(mut self, name: Option<String>) -> Self {
        self.name = name;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_id_is_prefixed() {
        let id = UserId::new_random();
        assert!(id.as_str().starts_with("usr_"));
        assert!(id.is_valid());
        assert!(!UserId::new("not-a-user").is_valid());
    }

    #[test]
    fn test_builder_requires_email() {
        assert!(User::builder().build().is_err());

        let user = User::builder()
            .email("alice@example.com".to_string())
            .build()
            .unwrap();
        assert!(!user.two_factor_enabled);
        assert!(user.backup_codes.is_empty());
        assert!(!user.is_email_verified());
    }

    #[test]
    fn test_two_factor_fields_are_not_serialized() {
        let user = User::builder()
            .email("alice@example.com".to_string())
            .two_factor(TwoFactorCredential {
                enabled: true,
                secret: Some("JBSWY3DPEHPK3PXP".to_string()),
                backup_codes: vec!["abc".to_string()],
            })
            .build()
            .unwrap();

        let json = serde_json::to_value(&user).unwrap();
        assert_eq!(json["two_factor_enabled"], true);
        assert!(json.get("two_factor_secret").is_none());
        assert!(json.get("backup_codes").is_none());
    }

    #[test]
    fn test_two_factor_round_trips_through_builder() {
        let credential = TwoFactorCredential {
            enabled: true,
            secret: Some("JBSWY3DPEHPK3PXP".to_string()),
            backup_codes: vec!["a".to_string(), "b".to_string()],
        };
        let user = User::builder()
            .email("alice@example.com".to_string())
            .two_factor(credential.clone())
            .build()
            .unwrap();
        assert_eq!(user.two_factor(), credential);
    }
}
