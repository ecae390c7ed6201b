//! Login orchestration
//!
//! [`LoginService`] layers the security checks in a fixed order: the
//! per-client rate limit, then the per-account brute-force guard and its
//! progressive delay, then the credential check through the identity
//! platform, and finally the second factor when the account has one.

use std::sync::Arc;

use crate::{
    AuditEventType, DeviceSession, Error, IdentityProvider, NewAuditEvent, RateLimitAction,
    RequestContext, Session, User, UserId,
    error::{AuthError, ThrottleError, TwoFactorError, ValidationError},
    repositories::{
        AuditRepositoryAdapter, BruteForceProtectionRepositoryAdapter,
        DeviceSessionRepositoryAdapter, RateLimitRepositoryAdapter, RepositoryProvider,
        SessionRepositoryAdapter, UserRepositoryAdapter,
    },
    services::{
        AuditLogger, BruteForceProtectionService, RateLimiterService, SessionRegistryService,
        SessionService, TwoFactorService, UserService,
    },
    session::{SessionToken, TwoFactorChallenge},
    validation::normalize_email,
};

/// Result of a password login
#[derive(Debug, Clone)]
pub enum LoginOutcome {
    /// Credentials accepted and no second factor configured.
    Authenticated {
        user: User,
        session: Session,
        device_session: DeviceSession,
    },
    /// Credentials accepted; the login must be finished with
    /// [`LoginService::complete_two_factor_login`] presenting `challenge`.
    TwoFactorRequired {
        user_id: UserId,
        challenge: TwoFactorChallenge,
    },
}

/// Result of finishing a login with a second factor
#[derive(Debug, Clone)]
pub struct TwoFactorLogin {
    pub user: User,
    pub session: Session,
    pub device_session: DeviceSession,
    pub used_backup_code: bool,
    pub remaining_backup_codes: usize,
}

type Users<R> = UserRepositoryAdapter<R>;
type Audit<R> = AuditRepositoryAdapter<R>;

pub struct LoginService<R: RepositoryProvider> {
    identity: Arc<dyn IdentityProvider>,
    users: Arc<UserService<Users<R>>>,
    rate_limiter: Arc<RateLimiterService<RateLimitRepositoryAdapter<R>>>,
    brute_force: Arc<BruteForceProtectionService<BruteForceProtectionRepositoryAdapter<R>>>,
    two_factor: Arc<TwoFactorService<Users<R>, Audit<R>>>,
    sessions: Arc<SessionService<SessionRepositoryAdapter<R>>>,
    registry: Arc<SessionRegistryService<DeviceSessionRepositoryAdapter<R>, Audit<R>>>,
    audit: Arc<AuditLogger<Audit<R>>>,
}

impl<R: RepositoryProvider> LoginService<R> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        identity: Arc<dyn IdentityProvider>,
        users: Arc<UserService<Users<R>>>,
        rate_limiter: Arc<RateLimiterService<RateLimitRepositoryAdapter<R>>>,
        brute_force: Arc<BruteForceProtectionService<BruteForceProtectionRepositoryAdapter<R>>>,
        two_factor: Arc<TwoFactorService<Users<R>, Audit<R>>>,
        sessions: Arc<SessionService<SessionRepositoryAdapter<R>>>,
        registry: Arc<SessionRegistryService<DeviceSessionRepositoryAdapter<R>, Audit<R>>>,
        audit: Arc<AuditLogger<Audit<R>>>,
    ) -> Self {
        Self {
            identity,
            users,
            rate_limiter,
            brute_force,
            two_factor,
            sessions,
            registry,
            audit,
        }
    }

    /// Authenticate with email and password.
    pub async fn login(
        &self,
        email: &str,
        password: &str,
        ctx: &RequestContext,
    ) -> Result<LoginOutcome, Error> {
        let email = normalize_email(email);
        if email.is_empty() {
            return Err(ValidationError::MissingField("email".to_string()).into());
        }
        if password.is_empty() {
            return Err(ValidationError::MissingField("password".to_string()).into());
        }

        let subject = rate_limit_subject(ctx, &email);
        if let Err(e) = self.rate_limiter.enforce(subject, RateLimitAction::Login).await {
            if matches!(e, Error::Throttle(_)) {
                self.log_login_failure(&email, None, ctx, "rate_limited", "Too many login attempts");
            }
            return Err(e);
        }

        self.guard_account(&email, None, ctx).await?;

        let user = match self.identity.verify_credentials(&email, password).await {
            Ok(user) => user,
            Err(e) => {
                if !matches!(e, Error::Auth(AuthError::InvalidCredentials)) {
                    tracing::warn!(error = %e, email = %email, "Credential check failed");
                }
                let status = self
                    .brute_force
                    .record_failed_attempt(&email, ctx.ip_address(), ctx.user_agent())
                    .await?;
                self.log_login_failure(
                    &email,
                    None,
                    ctx,
                    "invalid_credentials",
                    "Invalid email or password",
                );
                return Err(AuthError::LoginFailed {
                    attempts_remaining: status.attempts_remaining,
                }
                .into());
            }
        };

        if user.two_factor_enabled {
            let challenge = self.sessions.create_challenge(&user.id).await?;
            tracing::debug!(user_id = %user.id, "Password accepted, second factor required");
            return Ok(LoginOutcome::TwoFactorRequired {
                user_id: user.id,
                challenge,
            });
        }

        let (session, device_session) = self.complete_login(&user, ctx, "password").await?;

        Ok(LoginOutcome::Authenticated {
            user,
            session,
            device_session,
        })
    }

    /// Finish a login for an account with two-factor authentication.
    ///
    /// `challenge` is the one handed out by [`login`](Self::login) for the
    /// same user. It stays valid across wrong codes until it expires and is
    /// spent by the first accepted code. Rejected codes count as failed login
    /// attempts for the account.
    pub async fn complete_two_factor_login(
        &self,
        user_id: &UserId,
        challenge: &SessionToken,
        token: &str,
        ctx: &RequestContext,
    ) -> Result<TwoFactorLogin, Error> {
        if challenge.as_str().trim().is_empty() {
            return Err(ValidationError::MissingField("challenge".to_string()).into());
        }
        if token.trim().is_empty() {
            return Err(ValidationError::MissingField("token".to_string()).into());
        }

        let user = self.users.get_user(user_id).await?;

        if let Err(e) = self
            .rate_limiter
            .enforce(user_id.as_str(), RateLimitAction::TwoFactor)
            .await
        {
            if matches!(e, Error::Throttle(_)) {
                let email = user.as_ref().map(|u| u.email.as_str()).unwrap_or_default();
                self.log_login_failure(
                    email,
                    Some(user_id),
                    ctx,
                    "rate_limited",
                    "Too many verification attempts",
                );
            }
            return Err(e);
        }

        // unknown ids look exactly like a wrong code
        let Some(user) = user else {
            return Err(TwoFactorError::InvalidToken.into());
        };

        let pending = self.sessions.get_challenge(challenge).await?;
        if !pending.is_some_and(|c| c.user_id == user.id) {
            self.log_login_failure(
                &user.email,
                Some(&user.id),
                ctx,
                "invalid_challenge",
                "Two-factor challenge missing or expired",
            );
            return Err(TwoFactorError::InvalidChallenge.into());
        }

        self.guard_account(&user.email, Some(&user.id), ctx).await?;

        let verification = match self
            .two_factor
            .verify_for_login(&user.id, &user.email, token, ctx)
            .await
        {
            Ok(verification) => verification,
            Err(Error::TwoFactor(TwoFactorError::InvalidToken | TwoFactorError::NotEnabled)) => {
                self.brute_force
                    .record_failed_attempt(&user.email, ctx.ip_address(), ctx.user_agent())
                    .await?;
                return Err(TwoFactorError::InvalidToken.into());
            }
            Err(e) => return Err(e),
        };

        if !self.sessions.consume_challenge(challenge).await? {
            return Err(TwoFactorError::InvalidChallenge.into());
        }

        let method = if verification.used_backup_code {
            "backup_code"
        } else {
            "totp"
        };
        let (session, device_session) = self.complete_login(&user, ctx, method).await?;
        self.rate_limiter
            .reset(user.id.as_str(), RateLimitAction::TwoFactor)
            .await?;

        Ok(TwoFactorLogin {
            user,
            session,
            device_session,
            used_backup_code: verification.used_backup_code,
            remaining_backup_codes: verification.remaining_backup_codes,
        })
    }

    /// End an authentication session.
    pub async fn logout(&self, token: &SessionToken, ctx: &RequestContext) -> Result<(), Error> {
        let Some(session) = self.sessions.get_session(token).await? else {
            return Ok(());
        };

        self.sessions.delete_session(token).await?;

        let email = self
            .users
            .get_user(&session.user_id)
            .await?
            .map(|u| u.email)
            .unwrap_or_default();

        tracing::debug!(user_id = %session.user_id, "Logged out");
        self.audit.log_auth_event(
            NewAuditEvent::new(&email, AuditEventType::Logout, true)
                .user_id(&session.user_id)
                .context(ctx),
        );

        Ok(())
    }

    /// Deny locked accounts and apply the progressive delay.
    async fn guard_account(
        &self,
        email: &str,
        user_id: Option<&UserId>,
        ctx: &RequestContext,
    ) -> Result<(), Error> {
        let status = self.brute_force.check(email).await?;

        if let (false, Some(locked_until)) = (status.allowed, status.locked_until) {
            self.log_login_failure(
                email,
                user_id,
                ctx,
                "brute_force_protection",
                "Account temporarily locked",
            );
            return Err(ThrottleError::AccountLocked { locked_until }.into());
        }

        if !status.delay.is_zero() {
            tracing::debug!(
                email = %email,
                delay_ms = status.delay.as_millis() as u64,
                "Delaying login attempt"
            );
            tokio::time::sleep(status.delay).await;
        }

        Ok(())
    }

    /// Record a successful login and issue the sessions.
    async fn complete_login(
        &self,
        user: &User,
        ctx: &RequestContext,
        method: &str,
    ) -> Result<(Session, DeviceSession), Error> {
        self.brute_force.reset_attempts(&user.email).await?;

        self.audit.log_auth_event(
            NewAuditEvent::new(&user.email, AuditEventType::LoginSucceeded, true)
                .user_id(&user.id)
                .context(ctx)
                .metadata("method", method),
        );

        self.rate_limiter
            .reset(rate_limit_subject(ctx, &user.email), RateLimitAction::Login)
            .await?;

        let device_session = self
            .registry
            .upsert_session(&user.id, ctx.user_agent(), ctx.ip_address())
            .await?;
        let session = self
            .sessions
            .create_session(&user.id, Some(&device_session.id), ctx)
            .await?;

        tracing::info!(user_id = %user.id, method = %method, "User logged in");

        Ok((session, device_session))
    }

    fn log_login_failure(
        &self,
        email: &str,
        user_id: Option<&UserId>,
        ctx: &RequestContext,
        reason: &str,
        message: &str,
    ) {
        let mut event = NewAuditEvent::new(email, AuditEventType::LoginFailed, false)
            .context(ctx)
            .error_message(message)
            .reason(reason);
        if let Some(user_id) = user_id {
            event = event.user_id(user_id);
        }
        self.audit.log_auth_event(event);
    }
}

/// Client IP when known, otherwise the email.
pub(crate) fn rate_limit_subject<'a>(ctx: &'a RequestContext, email: &'a str) -> &'a str {
    ctx.ip_address().unwrap_or(email)
}
