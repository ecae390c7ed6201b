use std::sync::Arc;

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use axum_extra::extract::CookieJar;
use keystone::{Keystone, RepositoryProvider};

use crate::{error::ApiError, extractors::session_token, types::CookieConfig};

pub struct AuthState<R: RepositoryProvider> {
    pub keystone: Arc<Keystone<R>>,
}

impl<R: RepositoryProvider> Clone for AuthState<R> {
    fn clone(&self) -> Self {
        Self {
            keystone: self.keystone.clone(),
        }
    }
}

fn cookie_name(request: &Request) -> String {
    request
        .extensions()
        .get::<CookieConfig>()
        .map(|config| config.name.clone())
        .unwrap_or_else(|| CookieConfig::default().name)
}

/// Resolve the caller's session, if any, and make the user available to
/// [`AuthUser`](crate::AuthUser) and [`OptionalAuthUser`](crate::OptionalAuthUser).
pub async fn auth_middleware<R>(
    State(state): State<AuthState<R>>,
    jar: CookieJar,
    mut request: Request,
    next: Next,
) -> Response
where
    R: RepositoryProvider,
{
    let token = session_token(request.headers(), &jar, &cookie_name(&request));

    if let Some(token) = token {
        match state.keystone.authenticate(&token).await {
            Ok((user, session)) => {
                request.extensions_mut().insert(user);
                request.extensions_mut().insert(session);
            }
            Err(e) if e.is_session_error() => {
                tracing::debug!(error = %e, "Ignoring invalid session token");
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to resolve session");
            }
        }
    }

    next.run(request).await
}

/// Reject requests without a valid session before they reach the handler.
pub async fn require_auth<R>(
    State(state): State<AuthState<R>>,
    jar: CookieJar,
    request: Request,
    next: Next,
) -> Result<Response, ApiError>
where
    R: RepositoryProvider,
{
    let token = session_token(request.headers(), &jar, &cookie_name(&request))
        .ok_or(ApiError::Unauthorized)?;

    state
        .keystone
        .authenticate(&token)
        .await
        .map_err(|_| ApiError::Unauthorized)?;

    Ok(next.run(request).await)
}
