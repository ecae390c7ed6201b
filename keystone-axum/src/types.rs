use axum_extra::extract::cookie::{Cookie, SameSite};
use chrono::{DateTime, Utc};
use keystone::{
    DeviceSession, Session, SessionToken, TwoFactorChallenge, TwoFactorSetup, User, UserId,
};
use serde::{Deserialize, Serialize};

// Missing fields deserialize as empty strings so the services can name them
// in a 400 instead of axum rejecting the body.

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EnableTwoFactorRequest {
    pub secret: String,
    pub token: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct VerifyTwoFactorRequest {
    pub user_id: String,
    /// Handed out with the `requires2FA` response.
    pub challenge: String,
    pub token: String,
}

/// Body of the password-gated 2FA endpoints.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PasswordRequest {
    pub password: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RevokeSessionRequest {
    pub session_id: String,
}

/// Public view of a user.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserView {
    pub id: String,
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub email_verified: bool,
    pub two_factor_enabled: bool,
    pub created_at: DateTime<Utc>,
}

impl From<&User> for UserView {
    fn from(user: &User) -> Self {
        Self {
            id: user.id.to_string(),
            email: user.email.clone(),
            name: user.name.clone(),
            email_verified: user.is_email_verified(),
            two_factor_enabled: user.two_factor_enabled,
            created_at: user.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionView {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

impl From<&Session> for SessionView {
    fn from(session: &Session) -> Self {
        Self {
            token: session.token.to_string(),
            expires_at: session.expires_at,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceSessionView {
    pub id: String,
    pub device_name: String,
    pub browser: String,
    pub os: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
    pub last_active_at: DateTime<Utc>,
    pub is_current: bool,
    pub created_at: DateTime<Utc>,
}

impl From<&DeviceSession> for DeviceSessionView {
    fn from(session: &DeviceSession) -> Self {
        Self {
            id: session.id.to_string(),
            device_name: session.device_name.clone(),
            browser: session.browser.clone(),
            os: session.os.clone(),
            ip_address: session.ip_address.clone(),
            last_active_at: session.last_active_at,
            is_current: session.is_current,
            created_at: session.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AuthResponse {
    pub success: bool,
    pub user: UserView,
    pub session: SessionView,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TwoFactorRequiredResponse {
    #[serde(rename = "requires2FA")]
    pub requires_two_factor: bool,
    pub user_id: String,
    pub challenge: String,
    pub expires_at: DateTime<Utc>,
}

impl From<(UserId, TwoFactorChallenge)> for TwoFactorRequiredResponse {
    fn from((user_id, challenge): (UserId, TwoFactorChallenge)) -> Self {
        Self {
            requires_two_factor: true,
            user_id: user_id.to_string(),
            challenge: challenge.token.into_inner(),
            expires_at: challenge.expires_at,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RegisterResponse {
    pub success: bool,
    pub user: UserView,
}

#[derive(Debug, Clone, Serialize)]
pub struct AuthStatusResponse {
    pub authenticated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<UserView>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TwoFactorSetupResponse {
    pub secret: String,
    pub qr_code: String,
    pub manual_entry_key: String,
    pub otpauth_url: String,
}

impl From<TwoFactorSetup> for TwoFactorSetupResponse {
    fn from(setup: TwoFactorSetup) -> Self {
        Self {
            secret: setup.secret,
            qr_code: setup.qr_code_data_url,
            manual_entry_key: setup.manual_entry_key,
            otpauth_url: setup.otpauth_url,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupCodesResponse {
    pub success: bool,
    pub backup_codes: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyTwoFactorResponse {
    pub success: bool,
    pub user: UserView,
    pub session: SessionView,
    pub used_backup_code: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remaining_backup_codes: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupCodeStatusResponse {
    pub enabled: bool,
    pub remaining_codes: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct SuccessResponse {
    pub success: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionsResponse {
    pub sessions: Vec<DeviceSessionView>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DeviceSessionResponse {
    pub session: DeviceSessionView,
}

#[derive(Debug, Clone, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Caller address and user agent of a request.
#[derive(Debug, Clone, Default)]
pub struct ConnectionInfo {
    pub ip: Option<String>,
    pub user_agent: Option<String>,
}

impl From<ConnectionInfo> for keystone::RequestContext {
    fn from(info: ConnectionInfo) -> Self {
        keystone::RequestContext::new(info.ip, info.user_agent)
    }
}

#[derive(Debug, Clone)]
pub struct CookieConfig {
    pub name: String,
    pub http_only: bool,
    pub secure: bool,
    pub same_site: CookieSameSite,
    pub path: String,
}

impl Default for CookieConfig {
    fn default() -> Self {
        Self::new("session_id")
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub enum CookieSameSite {
    Strict,
    #[default]
    Lax,
    None,
}

impl From<CookieSameSite> for SameSite {
    fn from(same_site: CookieSameSite) -> Self {
        match same_site {
            CookieSameSite::Strict => SameSite::Strict,
            CookieSameSite::Lax => SameSite::Lax,
            CookieSameSite::None => SameSite::None,
        }
    }
}

impl CookieConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            http_only: true,
            secure: true,
            same_site: CookieSameSite::Lax,
            path: "/".to_string(),
        }
    }

    /// Same as the default but without the `Secure` flag, for plain-HTTP
    /// local development.
    pub fn development() -> Self {
        Self {
            secure: false,
            ..Self::default()
        }
    }

    pub fn session_cookie(&self, token: &SessionToken) -> Cookie<'static> {
        Cookie::build((self.name.clone(), token.to_string()))
            .path(self.path.clone())
            .http_only(self.http_only)
            .secure(self.secure)
            .same_site(self.same_site.into())
            .build()
    }

    /// An expired cookie that clears the session cookie in the browser.
    pub fn removal_cookie(&self) -> Cookie<'static> {
        let mut cookie = Cookie::build((self.name.clone(), ""))
            .path(self.path.clone())
            .http_only(self.http_only)
            .secure(self.secure)
            .same_site(self.same_site.into())
            .build();
        cookie.make_removal();
        cookie
    }
}
