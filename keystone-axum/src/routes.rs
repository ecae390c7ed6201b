use std::sync::Arc;

use axum::{
    Extension, Json, Router,
    extract::State,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use keystone::{
    DeviceSessionId, Error, Keystone, LoginOutcome, RepositoryProvider, RequestContext,
    SessionError, SessionToken, TwoFactorError, UserId, ValidationError,
};

use crate::{
    error::{ApiError, Result},
    extractors::{AuthUser, OptionalAuthUser, SessionTokenFromRequest},
    middleware::{AuthState, auth_middleware},
    types::*,
};

pub fn create_router<R>(keystone: Arc<Keystone<R>>, cookie_config: CookieConfig) -> Router
where
    R: RepositoryProvider + 'static,
{
    let state = AuthState { keystone };

    Router::new()
        .route("/health", get(health_handler))
        .route("/register", post(register_handler))
        .route("/login", post(login_handler).get(auth_status_handler))
        .route("/logout", post(logout_handler))
        .merge(two_factor_routes())
        .merge(session_routes())
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            auth_middleware::<R>,
        ))
        .with_state(state)
        .layer(Extension(cookie_config))
}

fn two_factor_routes<R>() -> Router<AuthState<R>>
where
    R: RepositoryProvider + 'static,
{
    Router::new()
        .route(
            "/2fa/setup",
            post(two_factor_setup_handler).put(enable_two_factor_handler),
        )
        .route("/2fa/verify", post(verify_two_factor_handler))
        .route("/2fa/disable", post(disable_two_factor_handler))
        .route(
            "/2fa/backup-codes",
            post(regenerate_backup_codes_handler).get(backup_code_status_handler),
        )
}

fn session_routes<R>() -> Router<AuthState<R>>
where
    R: RepositoryProvider + 'static,
{
    Router::new().route(
        "/sessions",
        get(list_sessions_handler)
            .post(touch_session_handler)
            .delete(revoke_session_handler),
    )
}

fn require_field(value: &str, name: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(ValidationError::MissingField(name.to_string()).into());
    }
    Ok(())
}

fn low_backup_code_warning(remaining: usize) -> String {
    match remaining {
        0 => "You have no backup codes left. Generate new ones to keep access to your account."
            .to_string(),
        1 => "You have 1 backup code left. Consider generating new ones.".to_string(),
        n => format!("You have {n} backup codes left. Consider generating new ones."),
    }
}

async fn health_handler<R>(State(state): State<AuthState<R>>) -> Result<impl IntoResponse>
where
    R: RepositoryProvider,
{
    state.keystone.health_check().await?;

    Ok(Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    }))
}

async fn register_handler<R>(
    State(state): State<AuthState<R>>,
    connection_info: ConnectionInfo,
    Json(payload): Json<RegisterRequest>,
) -> Result<impl IntoResponse>
where
    R: RepositoryProvider,
{
    let ctx = RequestContext::from(connection_info);
    let user = state
        .keystone
        .register(&payload.email, &payload.password, &ctx)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            success: true,
            user: UserView::from(&user),
        }),
    ))
}

async fn login_handler<R>(
    State(state): State<AuthState<R>>,
    Extension(cookie_config): Extension<CookieConfig>,
    connection_info: ConnectionInfo,
    Json(payload): Json<LoginRequest>,
) -> Result<Response>
where
    R: RepositoryProvider,
{
    let ctx = RequestContext::from(connection_info);
    let outcome = state
        .keystone
        .login(&payload.email, &payload.password, &ctx)
        .await?;

    match outcome {
        LoginOutcome::Authenticated { user, session, .. } => {
            let cookie = cookie_config.session_cookie(&session.token);

            Ok((
                StatusCode::OK,
                [(header::SET_COOKIE, cookie.to_string())],
                Json(AuthResponse {
                    success: true,
                    user: UserView::from(&user),
                    session: SessionView::from(&session),
                }),
            )
                .into_response())
        }
        LoginOutcome::TwoFactorRequired { user_id, challenge } => {
            Ok(Json(TwoFactorRequiredResponse::from((user_id, challenge))).into_response())
        }
    }
}

async fn auth_status_handler(OptionalAuthUser(user): OptionalAuthUser) -> Response {
    match user {
        Some(user) => Json(AuthStatusResponse {
            authenticated: true,
            user: Some(UserView::from(&user)),
        })
        .into_response(),
        None => (
            StatusCode::UNAUTHORIZED,
            Json(AuthStatusResponse {
                authenticated: false,
                user: None,
            }),
        )
            .into_response(),
    }
}

async fn logout_handler<R>(
    State(state): State<AuthState<R>>,
    Extension(cookie_config): Extension<CookieConfig>,
    connection_info: ConnectionInfo,
    SessionTokenFromRequest(token): SessionTokenFromRequest,
) -> Result<impl IntoResponse>
where
    R: RepositoryProvider,
{
    if let Some(token) = token {
        let ctx = RequestContext::from(connection_info);
        state.keystone.logout(&token, &ctx).await?;
    }

    Ok((
        [(header::SET_COOKIE, cookie_config.removal_cookie().to_string())],
        Json(MessageResponse {
            message: "Successfully logged out".to_string(),
        }),
    ))
}

async fn two_factor_setup_handler<R>(
    State(state): State<AuthState<R>>,
    AuthUser(user): AuthUser,
) -> Result<impl IntoResponse>
where
    R: RepositoryProvider,
{
    let setup = state.keystone.generate_two_factor_secret(&user).await?;

    Ok(Json(TwoFactorSetupResponse::from(setup)))
}

async fn enable_two_factor_handler<R>(
    State(state): State<AuthState<R>>,
    AuthUser(user): AuthUser,
    connection_info: ConnectionInfo,
    Json(payload): Json<EnableTwoFactorRequest>,
) -> Result<impl IntoResponse>
where
    R: RepositoryProvider,
{
    require_field(&payload.secret, "secret")?;
    require_field(&payload.token, "token")?;

    let ctx = RequestContext::from(connection_info);
    let backup_codes = state
        .keystone
        .enable_two_factor(&user, &payload.secret, &payload.token, &ctx)
        .await
        .map_err(|e| match e {
            // enrolment reports a wrong code as 400
            Error::TwoFactor(TwoFactorError::InvalidToken) => {
                ApiError::BadRequest("Invalid verification code".to_string())
            }
            other => other.into(),
        })?;

    Ok(Json(BackupCodesResponse {
        success: true,
        backup_codes,
    }))
}

async fn verify_two_factor_handler<R>(
    State(state): State<AuthState<R>>,
    Extension(cookie_config): Extension<CookieConfig>,
    connection_info: ConnectionInfo,
    Json(payload): Json<VerifyTwoFactorRequest>,
) -> Result<impl IntoResponse>
where
    R: RepositoryProvider,
{
    require_field(&payload.user_id, "userId")?;
    require_field(&payload.challenge, "challenge")?;
    require_field(&payload.token, "token")?;

    let ctx = RequestContext::from(connection_info);
    let login = state
        .keystone
        .complete_two_factor_login(
            &UserId::new(&payload.user_id),
            &SessionToken::new(&payload.challenge),
            &payload.token,
            &ctx,
        )
        .await?;

    let (remaining_backup_codes, warning) = if login.used_backup_code {
        let remaining = login.remaining_backup_codes;
        let warning = state
            .keystone
            .backup_codes_running_low(remaining)
            .then(|| low_backup_code_warning(remaining));
        (Some(remaining), warning)
    } else {
        (None, None)
    };

    let cookie = cookie_config.session_cookie(&login.session.token);

    Ok((
        [(header::SET_COOKIE, cookie.to_string())],
        Json(VerifyTwoFactorResponse {
            success: true,
            user: UserView::from(&login.user),
            session: SessionView::from(&login.session),
            used_backup_code: login.used_backup_code,
            remaining_backup_codes,
            warning,
        }),
    ))
}

async fn disable_two_factor_handler<R>(
    State(state): State<AuthState<R>>,
    AuthUser(user): AuthUser,
    connection_info: ConnectionInfo,
    Json(payload): Json<PasswordRequest>,
) -> Result<impl IntoResponse>
where
    R: RepositoryProvider,
{
    require_field(&payload.password, "password")?;

    let ctx = RequestContext::from(connection_info);
    state
        .keystone
        .disable_two_factor(&user, &payload.password, &ctx)
        .await?;

    Ok(Json(SuccessResponse { success: true }))
}

async fn regenerate_backup_codes_handler<R>(
    State(state): State<AuthState<R>>,
    AuthUser(user): AuthUser,
    connection_info: ConnectionInfo,
    Json(payload): Json<PasswordRequest>,
) -> Result<impl IntoResponse>
where
    R: RepositoryProvider,
{
    require_field(&payload.password, "password")?;

    let ctx = RequestContext::from(connection_info);
    let backup_codes = state
        .keystone
        .regenerate_backup_codes(&user, &payload.password, &ctx)
        .await?;

    Ok(Json(BackupCodesResponse {
        success: true,
        backup_codes,
    }))
}

async fn backup_code_status_handler<R>(
    State(state): State<AuthState<R>>,
    AuthUser(user): AuthUser,
) -> Result<impl IntoResponse>
where
    R: RepositoryProvider,
{
    let status = state.keystone.backup_code_status(&user.id).await?;

    Ok(Json(BackupCodeStatusResponse {
        enabled: status.enabled,
        remaining_codes: status.remaining_codes,
    }))
}

async fn list_sessions_handler<R>(
    State(state): State<AuthState<R>>,
    AuthUser(user): AuthUser,
) -> Result<impl IntoResponse>
where
    R: RepositoryProvider,
{
    let sessions = state.keystone.list_device_sessions(&user.id).await?;

    Ok(Json(SessionsResponse {
        sessions: sessions.iter().map(DeviceSessionView::from).collect(),
    }))
}

async fn touch_session_handler<R>(
    State(state): State<AuthState<R>>,
    AuthUser(user): AuthUser,
    connection_info: ConnectionInfo,
) -> Result<impl IntoResponse>
where
    R: RepositoryProvider,
{
    let ctx = RequestContext::from(connection_info);
    let session = state.keystone.touch_device_session(&user.id, &ctx).await?;

    Ok(Json(DeviceSessionResponse {
        session: DeviceSessionView::from(&session),
    }))
}

async fn revoke_session_handler<R>(
    State(state): State<AuthState<R>>,
    AuthUser(user): AuthUser,
    connection_info: ConnectionInfo,
    Json(payload): Json<RevokeSessionRequest>,
) -> Result<impl IntoResponse>
where
    R: RepositoryProvider,
{
    require_field(&payload.session_id, "sessionId")?;

    let ctx = RequestContext::from(connection_info);
    state
        .keystone
        .revoke_device_session(&user, &DeviceSessionId::new(&payload.session_id), &ctx)
        .await
        .map_err(|e| match e {
            Error::Session(SessionError::NotFound) => {
                ApiError::NotFound("Session not found".to_string())
            }
            other => other.into(),
        })?;

    Ok(Json(SuccessResponse { success: true }))
}
