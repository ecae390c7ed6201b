use std::sync::Arc;

use crate::{
    AuditEventType, Error, IdentityProvider, NewAuditEvent, RateLimitAction, RequestContext, User,
    repositories::{AuditRepositoryAdapter, RateLimitRepositoryAdapter, RepositoryProvider},
    services::{AuditLogger, RateLimiterService, login::rate_limit_subject},
    validation::{normalize_email, validate_email, validate_password},
};

/// Account sign-up behind the `register` rate limit
pub struct RegistrationService<R: RepositoryProvider> {
    identity: Arc<dyn IdentityProvider>,
    rate_limiter: Arc<RateLimiterService<RateLimitRepositoryAdapter<R>>>,
    audit: Arc<AuditLogger<AuditRepositoryAdapter<R>>>,
}

impl<R: RepositoryProvider> RegistrationService<R> {
    pub fn new(
        identity: Arc<dyn IdentityProvider>,
        rate_limiter: Arc<RateLimiterService<RateLimitRepositoryAdapter<R>>>,
        audit: Arc<AuditLogger<AuditRepositoryAdapter<R>>>,
    ) -> Self {
        Self {
            identity,
            rate_limiter,
            audit,
        }
    }

    /// Create an account with a password.
    pub async fn register(
        &self,
        email: &str,
        password: &str,
        ctx: &RequestContext,
    ) -> Result<User, Error> {
        let email = normalize_email(email);

        self.rate_limiter
            .enforce(rate_limit_subject(ctx, &email), RateLimitAction::Register)
            .await
            .inspect_err(|e| self.log_failure(&email, ctx, e, "rate_limited"))?;

        validate_email(&email)
            .inspect_err(|e| self.log_failure(&email, ctx, e, "invalid_email"))?;
        validate_password(password)
            .inspect_err(|e| self.log_failure(&email, ctx, e, "invalid_password"))?;

        let user = self
            .identity
            .register(&email, password)
            .await
            .inspect_err(|e| self.log_failure(&email, ctx, e, "registration_failed"))?;

        self.audit.log_auth_event(
            NewAuditEvent::new(&email, AuditEventType::Registration, true)
                .user_id(&user.id)
                .context(ctx),
        );

        Ok(user)
    }

    fn log_failure(
        &self,
        email: &str,
        ctx: &RequestContext,
        error: &impl std::fmt::Display,
        reason: &str,
    ) {
        tracing::debug!(email = %email, error = %error, "Registration rejected");
        self.audit.log_auth_event(
            NewAuditEvent::new(email, AuditEventType::Registration, false)
                .context(ctx)
                .error_message(error.to_string())
                .reason(reason),
        );
    }
}
