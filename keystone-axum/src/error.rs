use axum::{
    Json,
    http::{HeaderName, StatusCode, header},
    response::{IntoResponse, Response},
};
use keystone::{AuthError, Error, ThrottleError, TwoFactorError};
use serde_json::json;

const INVALID_CREDENTIALS: &str = "Invalid email or password";

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Keystone(#[from] Error),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),
}

impl From<keystone::ValidationError> for ApiError {
    fn from(err: keystone::ValidationError) -> Self {
        ApiError::Keystone(err.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Keystone(err) => keystone_error_response(err),
            ApiError::Unauthorized => error_response(StatusCode::UNAUTHORIZED, "Unauthorized"),
            ApiError::BadRequest(msg) => error_response(StatusCode::BAD_REQUEST, &msg),
            ApiError::NotFound(msg) => error_response(StatusCode::NOT_FOUND, &msg),
        }
    }
}

fn keystone_error_response(err: Error) -> Response {
    match err {
        Error::Validation(e) => error_response(StatusCode::BAD_REQUEST, &e.to_string()),
        Error::Throttle(throttle) => throttle_response(&throttle),
        Error::Auth(AuthError::LoginFailed { attempts_remaining }) => (
            StatusCode::UNAUTHORIZED,
            Json(json!({
                "error": INVALID_CREDENTIALS,
                "attemptsRemaining": attempts_remaining,
            })),
        )
            .into_response(),
        Error::Auth(AuthError::InvalidCredentials) => {
            error_response(StatusCode::UNAUTHORIZED, INVALID_CREDENTIALS)
        }
        Error::Auth(AuthError::UserAlreadyExists) => {
            error_response(StatusCode::BAD_REQUEST, "Unable to register with this email")
        }
        Error::Auth(AuthError::UserNotFound) => {
            error_response(StatusCode::NOT_FOUND, "User not found")
        }
        Error::TwoFactor(TwoFactorError::InvalidToken) => {
            error_response(StatusCode::UNAUTHORIZED, "Invalid verification code")
        }
        Error::TwoFactor(TwoFactorError::InvalidChallenge) => error_response(
            StatusCode::UNAUTHORIZED,
            "Verification expired. Please sign in again.",
        ),
        Error::TwoFactor(
            e @ (TwoFactorError::AlreadyEnabled
            | TwoFactorError::NotEnabled
            | TwoFactorError::InvalidPassword),
        ) => error_response(StatusCode::BAD_REQUEST, &e.to_string()),
        Error::Session(_) => error_response(StatusCode::UNAUTHORIZED, "Unauthorized"),
        other => internal_error(&other),
    }
}

fn throttle_response(err: &ThrottleError) -> Response {
    let minutes = err.minutes_remaining();
    let unit = if minutes == 1 { "minute" } else { "minutes" };

    match err {
        ThrottleError::RateLimited {
            limit,
            retry_after_secs,
            locked_until,
        } => {
            let headers = [
                (header::RETRY_AFTER, retry_after_secs.to_string()),
                (
                    HeaderName::from_static("x-ratelimit-limit"),
                    limit.to_string(),
                ),
                (
                    HeaderName::from_static("x-ratelimit-remaining"),
                    "0".to_string(),
                ),
                (
                    HeaderName::from_static("x-ratelimit-reset"),
                    locked_until.timestamp().to_string(),
                ),
            ];

            (
                StatusCode::TOO_MANY_REQUESTS,
                headers,
                Json(json!({
                    "error": format!("Too many attempts. Please try again in {minutes} {unit}."),
                    "retryAfter": retry_after_secs,
                    "lockedUntil": locked_until,
                })),
            )
                .into_response()
        }
        ThrottleError::AccountLocked { locked_until } => (
            StatusCode::LOCKED,
            Json(json!({
                "error": format!(
                    "Account temporarily locked due to too many failed login attempts. Please try again in {minutes} {unit}."
                ),
                "accountLocked": true,
                "lockedUntil": locked_until,
            })),
        )
            .into_response(),
    }
}

fn internal_error(err: &Error) -> Response {
    tracing::error!(error = %err, "Request failed");

    let message = if cfg!(debug_assertions) {
        err.to_string()
    } else {
        "Internal server error".to_string()
    };

    error_response(StatusCode::INTERNAL_SERVER_ERROR, &message)
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}

pub type Result<T> = std::result::Result<T, ApiError>;
