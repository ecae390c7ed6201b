//! # Keystone Axum Integration
//!
//! Axum routes, extractors and middleware for Keystone.
//!
//! ## Routes
//!
//! | route | purpose |
//! |---|---|
//! | `POST /login`, `GET /login` | password login, authentication status |
//! | `POST /logout` | end the current session |
//! | `POST /register` | create an account |
//! | `POST/PUT /2fa/setup` | start and confirm TOTP enrolment |
//! | `POST /2fa/verify` | finish a login with a TOTP or backup code |
//! | `POST /2fa/disable` | turn 2FA off (password required) |
//! | `POST/GET /2fa/backup-codes` | regenerate codes, count remaining |
//! | `GET/POST/DELETE /sessions` | list, heartbeat and revoke device sessions |
//! | `GET /health` | storage health |
//!
//! Session tokens are read from `Authorization: Bearer` and then from the
//! session cookie.
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use std::{net::SocketAddr, sync::Arc};
//! use axum::Router;
//! use keystone::KeystoneBuilder;
//! use keystone_axum::{CookieConfig, routes};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let keystone = KeystoneBuilder::new()
//!         .with_sqlite("sqlite://keystone.db")
//!         .await?
//!         .apply_migrations(true)
//!         .build()
//!         .await?;
//!
//!     let auth_routes = routes(Arc::new(keystone))
//!         .with_cookie_config(CookieConfig::development())
//!         .build();
//!
//!     let app = Router::new().nest("/auth", auth_routes);
//!
//!     let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await?;
//!     axum::serve(
//!         listener,
//!         app.into_make_service_with_connect_info::<SocketAddr>(),
//!     )
//!     .await?;
//!     Ok(())
//! }
//! ```

mod error;
mod extractors;
mod middleware;
mod routes;
mod types;

pub use error::{ApiError, Result};
pub use extractors::{AuthSession, AuthUser, OptionalAuthUser, SessionTokenFromRequest};
pub use middleware::{AuthState, auth_middleware, require_auth};
pub use routes::create_router;
pub use types::{
    AuthResponse, AuthStatusResponse, BackupCodeStatusResponse, BackupCodesResponse,
    ConnectionInfo, CookieConfig, CookieSameSite, DeviceSessionResponse, DeviceSessionView,
    EnableTwoFactorRequest, HealthResponse, LoginRequest, MessageResponse, PasswordRequest,
    RegisterRequest, RegisterResponse, RevokeSessionRequest, SessionView, SessionsResponse,
    SuccessResponse, TwoFactorRequiredResponse, TwoFactorSetupResponse, UserView,
    VerifyTwoFactorRequest, VerifyTwoFactorResponse,
};

use std::sync::Arc;

use axum::Router;
use keystone::{Keystone, RepositoryProvider};

/// Create the authentication routes.
///
/// The returned builder converts into a [`Router`] that can be nested at any
/// path, usually `/auth`. Serve it with
/// `into_make_service_with_connect_info::<SocketAddr>()` so requests without
/// proxy headers still get a client address.
pub fn routes<R>(keystone: Arc<Keystone<R>>) -> AuthRouterBuilder<R>
where
    R: RepositoryProvider + 'static,
{
    AuthRouterBuilder {
        keystone,
        cookie_config: CookieConfig::default(),
    }
}

/// Builder for configuring authentication routes
pub struct AuthRouterBuilder<R: RepositoryProvider> {
    keystone: Arc<Keystone<R>>,
    cookie_config: CookieConfig,
}

impl<R: RepositoryProvider + 'static> AuthRouterBuilder<R> {
    pub fn with_cookie_config(mut self, config: CookieConfig) -> Self {
        self.cookie_config = config;
        self
    }

    pub fn build(self) -> Router {
        create_router(self.keystone, self.cookie_config)
    }
}

impl<R: RepositoryProvider + 'static> From<AuthRouterBuilder<R>> for Router {
    fn from(builder: AuthRouterBuilder<R>) -> Self {
        builder.build()
    }
}
