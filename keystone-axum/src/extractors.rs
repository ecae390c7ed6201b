use std::net::SocketAddr;

use axum::{
    Extension, RequestPartsExt,
    extract::{ConnectInfo, FromRequestParts},
    http::{HeaderMap, StatusCode, request::Parts},
};
use axum_extra::{TypedHeader, extract::CookieJar, headers::UserAgent};
use keystone::{Session, SessionToken, User};

use crate::{
    error::ApiError,
    types::{ConnectionInfo, CookieConfig},
};

/// Bearer token first, then the session cookie.
pub(crate) fn session_token(
    headers: &HeaderMap,
    jar: &CookieJar,
    cookie_name: &str,
) -> Option<SessionToken> {
    let bearer = headers
        .get("Authorization")
        .and_then(|header| header.to_str().ok())
        .and_then(|header| header.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty());

    if let Some(token) = bearer {
        return Some(SessionToken::new(token));
    }

    jar.get(cookie_name)
        .map(|cookie| cookie.value())
        .filter(|value| !value.is_empty())
        .map(SessionToken::new)
}

/// First hop of `X-Forwarded-For`, then `X-Real-IP`.
pub(crate) fn forwarded_ip(headers: &HeaderMap) -> Option<String> {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|value| !value.is_empty());

    if let Some(ip) = forwarded {
        return Some(ip.to_string());
    }

    headers
        .get("x-real-ip")
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

impl<S> FromRequestParts<S> for ConnectionInfo
where
    S: Send + Sync,
{
    type Rejection = (StatusCode, &'static str);

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_agent = parts
            .extract::<Option<TypedHeader<UserAgent>>>()
            .await
            .map_err(|_| (StatusCode::BAD_REQUEST, "Invalid user agent header"))?
            .map(|ua| ua.to_string());

        let ip = match forwarded_ip(&parts.headers) {
            Some(ip) => Some(ip),
            None => parts
                .extract::<ConnectInfo<SocketAddr>>()
                .await
                .ok()
                .map(|addr| addr.ip().to_string()),
        };

        Ok(ConnectionInfo { ip, user_agent })
    }
}

pub struct AuthUser(pub User);

impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let Extension(user): Extension<User> =
            parts.extract().await.map_err(|_| ApiError::Unauthorized)?;

        Ok(AuthUser(user))
    }
}

pub struct OptionalAuthUser(pub Option<User>);

impl<S> FromRequestParts<S> for OptionalAuthUser
where
    S: Send + Sync,
{
    type Rejection = (StatusCode, &'static str);

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(OptionalAuthUser(parts.extensions.get::<User>().cloned()))
    }
}

/// The authentication session resolved by the middleware.
pub struct AuthSession(pub Session);

impl<S> FromRequestParts<S> for AuthSession
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Session>()
            .cloned()
            .map(AuthSession)
            .ok_or(ApiError::Unauthorized)
    }
}

/// The raw session token from the request, whether or not it is still valid.
pub struct SessionTokenFromRequest(pub Option<SessionToken>);

impl<S> FromRequestParts<S> for SessionTokenFromRequest
where
    S: Send + Sync,
{
    type Rejection = (StatusCode, &'static str);

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let jar = parts
            .extract::<CookieJar>()
            .await
            .map_err(|_| (StatusCode::BAD_REQUEST, "Invalid cookie header"))?;

        let cookie_name = parts
            .extensions
            .get::<CookieConfig>()
            .map(|config| config.name.clone())
            .unwrap_or_else(|| CookieConfig::default().name);

        Ok(SessionTokenFromRequest(session_token(
            &parts.headers,
            &jar,
            &cookie_name,
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use axum_extra::extract::cookie::Cookie;

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut headers = HeaderMap::new();
        for (name, value) in pairs {
            headers.insert(*name, HeaderValue::from_static(value));
        }
        headers
    }

    #[test]
    fn test_forwarded_for_wins() {
        let headers = headers(&[
            ("x-forwarded-for", " 203.0.113.5 , 10.0.0.1"),
            ("x-real-ip", "198.51.100.7"),
        ]);
        assert_eq!(forwarded_ip(&headers).as_deref(), Some("203.0.113.5"));
    }

    #[test]
    fn test_real_ip_fallback() {
        let headers = headers(&[("x-forwarded-for", " "), ("x-real-ip", "198.51.100.7")]);
        assert_eq!(forwarded_ip(&headers).as_deref(), Some("198.51.100.7"));
        assert_eq!(forwarded_ip(&HeaderMap::new()), None);
    }

    #[test]
    fn test_bearer_before_cookie() {
        let jar = CookieJar::new().add(Cookie::new("session_id", "from-cookie"));

        let with_bearer = headers(&[("authorization", "Bearer from-header")]);
        assert_eq!(
            session_token(&with_bearer, &jar, "session_id").map(|t| t.to_string()),
            Some("from-header".to_string())
        );

        assert_eq!(
            session_token(&HeaderMap::new(), &jar, "session_id").map(|t| t.to_string()),
            Some("from-cookie".to_string())
        );
        assert!(session_token(&HeaderMap::new(), &jar, "other").is_none());
    }
}
