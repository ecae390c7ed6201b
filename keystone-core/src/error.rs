use chrono::{DateTime, Utc};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Authentication error: {0}")]
    Auth(#[from] AuthError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    #[error("Throttled: {0}")]
    Throttle(#[from] ThrottleError),

    #[error("Two-factor error: {0}")]
    TwoFactor(#[from] TwoFactorError),
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Invalid email or password")]
    InvalidCredentials,

    /// A login attempt failed; carries what the caller may show about remaining attempts.
    #[error("Invalid email or password")]
    LoginFailed { attempts_remaining: u32 },

    #[error("User not found")]
    UserNotFound,

    #[error("User already exists")]
    UserAlreadyExists,

    #[error("Password hash error: {0}")]
    PasswordHashError(String),
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Session not found")]
    NotFound,

    #[error("Session expired")]
    Expired,

    #[error("Invalid token: {0}")]
    InvalidToken(String),
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Migration error: {0}")]
    Migration(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Record not found")]
    NotFound,

    #[error("Constraint violation: {0}")]
    Constraint(String),
}

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Invalid email format: {0}")]
    InvalidEmail(String),

    #[error("Invalid password: {0}")]
    InvalidPassword(String),

    #[error("Weak password: {0}")]
    WeakPassword(String),

    #[error("Invalid field: {0}")]
    InvalidField(String),

    #[error("Missing required field: {0}")]
    MissingField(String),
}

/// Denials produced by the rate limiter and the brute-force guard.
#[derive(Debug, Error)]
pub enum ThrottleError {
    #[error("Too many attempts, retry in {retry_after_secs}s")]
    RateLimited {
        limit: u32,
        retry_after_secs: i64,
        locked_until: DateTime<Utc>,
    },

    #[error("Account locked until {locked_until}")]
    AccountLocked { locked_until: DateTime<Utc> },
}

#[derive(Debug, Error)]
pub enum TwoFactorError {
    #[error("Invalid password")]
    InvalidPassword,

    #[error("Invalid or expired token")]
    InvalidToken,

    #[error("Two-factor challenge is missing or expired")]
    InvalidChallenge,

    #[error("Two-factor authentication is already enabled")]
    AlreadyEnabled,

    #[error("Two-factor authentication is not enabled")]
    NotEnabled,

    #[error("TOTP error: {0}")]
    Totp(String),
}

impl ThrottleError {
    /// Whole minutes until the denial lifts, rounded up, never below one.
    pub fn minutes_remaining(&self) -> i64 {
        let until = match self {
            ThrottleError::RateLimited { locked_until, .. } => *locked_until,
            ThrottleError::AccountLocked { locked_until } => *locked_until,
        };
        let secs = (until - Utc::now()).num_seconds().max(0);
        ((secs + 59) / 60).max(1)
    }
}

impl Error {
    pub fn is_auth_error(&self) -> bool {
        matches!(
            self,
            Error::Auth(AuthError::InvalidCredentials)
                | Error::Auth(AuthError::LoginFailed { .. })
                | Error::Auth(AuthError::UserNotFound)
                | Error::Auth(AuthError::UserAlreadyExists)
        )
    }

    pub fn is_validation_error(&self) -> bool {
        matches!(self, Error::Validation(_))
    }

    pub fn is_storage_error(&self) -> bool {
        matches!(self, Error::Storage(_))
    }

    pub fn is_session_error(&self) -> bool {
        matches!(self, Error::Session(_))
    }

    pub fn is_throttle_error(&self) -> bool {
        matches!(self, Error::Throttle(_))
    }
}
