//! # Keystone
//!
//! Keystone is the account-security layer of a construction-management
//! application. It decides whether a login, registration or second-factor
//! attempt may proceed and records what happened:
//!
//! - per-client rate limiting backed by atomic counters in the store
//! - per-account brute-force lockout with a progressive delay
//! - TOTP two-factor authentication with single-use backup codes
//! - an append-only audit trail
//! - a registry of the devices each user is signed in from
//!
//! [`Keystone`] wires all of this from one [`RepositoryProvider`].
//!
//! ## Example
//!
//! ```rust,no_run
//! use keystone::{KeystoneBuilder, LoginOutcome, RequestContext};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let keystone = KeystoneBuilder::new()
//!         .with_sqlite("sqlite::memory:")
//!         .await?
//!         .apply_migrations(true)
//!         .build()
//!         .await?;
//!
//!     let ctx = RequestContext::new(Some("203.0.113.7".to_string()), None);
//!     keystone.register("alice@example.com", "Secure123", &ctx).await?;
//!
//!     match keystone.login("alice@example.com", "Secure123", &ctx).await? {
//!         LoginOutcome::Authenticated { session, .. } => println!("token: {}", session.token),
//!         LoginOutcome::TwoFactorRequired { user_id, challenge } => {
//!             println!("2FA needed for {user_id}, challenge {}", challenge.token)
//!         }
//!     }
//!
//!     Ok(())
//! }
//! ```
mod builder;

use std::sync::Arc;

use keystone_core::{
    repositories::{
        AuditRepositoryAdapter, BruteForceProtectionRepositoryAdapter,
        DeviceSessionRepositoryAdapter, PasswordRepositoryAdapter, RateLimitRepositoryAdapter,
        SessionRepositoryAdapter, UserRepositoryAdapter,
    },
    services::{
        AuditLogger, BruteForceProtectionService, LoginService, PasswordIdentityProvider,
        RateLimiterService, RegistrationService, SessionRegistryService, SessionService,
        TwoFactorService, UserService,
    },
};

pub use builder::{KeystoneBuilder, KeystoneBuilderError, NoStorage, WithStorage};

/// Re-export core types from keystone_core
///
/// These types are commonly used when working with the Keystone API.
pub use keystone_core::{
    AuditEvent, AuditEventType, BackupCodeStatus, BruteForceProtectionConfig, BruteForceStatus,
    DeviceInfo, DeviceSession, DeviceSessionId, Error, IdentityProvider, RateLimitAction, RateLimitDecision,
    RequestContext, Session, SessionConfig, SessionToken, TotpConfig, TwoFactorChallenge,
    TwoFactorSetup, User, UserId,
    error::{
        AuthError, SessionError, StorageError, ThrottleError, TwoFactorError, ValidationError,
    },
    repositories::RepositoryProvider,
    services::{FailurePolicy, LoginOutcome, TwoFactorLogin},
};

/// Re-export storage backends
///
/// These storage implementations are available when the corresponding feature is enabled.
#[cfg(feature = "sqlite")]
pub use keystone_storage_sqlite::SqliteRepositoryProvider;

/// How often the background cleanup runs
const CLEANUP_INTERVAL: std::time::Duration = std::time::Duration::from_secs(60 * 60);

/// Settings for every service [`Keystone`] builds.
///
/// # Example
///
/// ```rust
/// use keystone::{BruteForceProtectionConfig, FailurePolicy, KeystoneConfig};
///
/// let config = KeystoneConfig::default()
///     .brute_force(BruteForceProtectionConfig::default().max_failed_attempts(10))
///     .failure_policy(FailurePolicy::FailClosed);
/// ```
#[derive(Debug, Clone, Default)]
pub struct KeystoneConfig {
    pub session: SessionConfig,
    pub brute_force: BruteForceProtectionConfig,
    pub totp: TotpConfig,
    /// What the rate limiter does when its store is unreachable.
    pub failure_policy: FailurePolicy,
}

impl KeystoneConfig {
    pub fn session(mut self, session: SessionConfig) -> Self {
        self.session = session;
        self
    }

    pub fn brute_force(mut self, brute_force: BruteForceProtectionConfig) -> Self {
        self.brute_force = brute_force;
        self
    }

    pub fn totp(mut self, totp: TotpConfig) -> Self {
        self.totp = totp;
        self
    }

    pub fn failure_policy(mut self, failure_policy: FailurePolicy) -> Self {
        self.failure_policy = failure_policy;
        self
    }
}

/// Rows removed by one cleanup run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanupReport {
    pub failed_attempts: u64,
    pub rate_limits: u64,
    pub sessions: u64,
}

type Users<R> = UserRepositoryAdapter<R>;
type Audit<R> = AuditRepositoryAdapter<R>;

/// The account-security coordinator.
///
/// Every method that takes a [`RequestContext`] may feed the rate limiter,
/// the brute-force guard and the audit trail; callers pass the client
/// address and user agent through unchanged.
pub struct Keystone<R: RepositoryProvider> {
    repositories: Arc<R>,
    user_service: Arc<UserService<Users<R>>>,
    session_service: Arc<SessionService<SessionRepositoryAdapter<R>>>,
    rate_limiter: Arc<RateLimiterService<RateLimitRepositoryAdapter<R>>>,
    brute_force: Arc<BruteForceProtectionService<BruteForceProtectionRepositoryAdapter<R>>>,
    audit: Arc<AuditLogger<Audit<R>>>,
    two_factor: Arc<TwoFactorService<Users<R>, Audit<R>>>,
    registry: Arc<SessionRegistryService<DeviceSessionRepositoryAdapter<R>, Audit<R>>>,
    login_service: LoginService<R>,
    registration_service: RegistrationService<R>,
}

impl<R: RepositoryProvider> Keystone<R> {
    /// Create a Keystone instance with the default configuration.
    pub fn new(repositories: Arc<R>) -> Self {
        Self::with_config(repositories, KeystoneConfig::default())
    }

    /// Create a Keystone instance whose passwords live in the same store.
    pub fn with_config(repositories: Arc<R>, config: KeystoneConfig) -> Self {
        let identity: Arc<dyn IdentityProvider> = Arc::new(PasswordIdentityProvider::new(
            Arc::new(UserRepositoryAdapter::new(repositories.clone())),
            Arc::new(PasswordRepositoryAdapter::new(repositories.clone())),
        ));
        Self::with_identity_provider(repositories, config, identity)
    }

    /// Create a Keystone instance that checks credentials with `identity`.
    pub fn with_identity_provider(
        repositories: Arc<R>,
        config: KeystoneConfig,
        identity: Arc<dyn IdentityProvider>,
    ) -> Self {
        let user_repo = Arc::new(UserRepositoryAdapter::new(repositories.clone()));
        let audit = Arc::new(AuditLogger::new(Arc::new(AuditRepositoryAdapter::new(
            repositories.clone(),
        ))));

        let user_service = Arc::new(UserService::new(user_repo.clone()));
        let session_service = Arc::new(SessionService::new(
            Arc::new(SessionRepositoryAdapter::new(repositories.clone())),
            config.session,
        ));
        let rate_limiter = Arc::new(
            RateLimiterService::new(Arc::new(RateLimitRepositoryAdapter::new(
                repositories.clone(),
            )))
            .with_failure_policy(config.failure_policy),
        );
        let brute_force = Arc::new(BruteForceProtectionService::new(
            Arc::new(BruteForceProtectionRepositoryAdapter::new(
                repositories.clone(),
            )),
            config.brute_force,
        ));
        let two_factor = Arc::new(TwoFactorService::new(
            user_repo,
            identity.clone(),
            audit.clone(),
            config.totp,
        ));
        let registry = Arc::new(SessionRegistryService::new(
            Arc::new(DeviceSessionRepositoryAdapter::new(repositories.clone())),
            audit.clone(),
        ));

        let login_service = LoginService::new(
            identity.clone(),
            user_service.clone(),
            rate_limiter.clone(),
            brute_force.clone(),
            two_factor.clone(),
            session_service.clone(),
            registry.clone(),
            audit.clone(),
        );
        let registration_service =
            RegistrationService::new(identity, rate_limiter.clone(), audit.clone());

        Self {
            repositories,
            user_service,
            session_service,
            rate_limiter,
            brute_force,
            audit,
            two_factor,
            registry,
            login_service,
            registration_service,
        }
    }

    /// Run migrations for all repositories
    pub async fn migrate(&self) -> Result<(), Error> {
        self.repositories.migrate().await
    }

    /// Health check for all repositories
    pub async fn health_check(&self) -> Result<(), Error> {
        self.repositories.health_check().await
    }

    /// Create an account behind the `register` rate limit.
    pub async fn register(
        &self,
        email: &str,
        password: &str,
        ctx: &RequestContext,
    ) -> Result<User, Error> {
        self.registration_service.register(email, password, ctx).await
    }

    /// Authenticate with email and password.
    ///
    /// Accounts with two-factor authentication come back as
    /// [`LoginOutcome::TwoFactorRequired`] and have to be finished with
    /// [`complete_two_factor_login`](Self::complete_two_factor_login).
    pub async fn login(
        &self,
        email: &str,
        password: &str,
        ctx: &RequestContext,
    ) -> Result<LoginOutcome, Error> {
        self.login_service.login(email, password, ctx).await
    }

    /// Finish a login with a TOTP code or a backup code.
    ///
    /// `challenge` is the token from [`LoginOutcome::TwoFactorRequired`]; a
    /// code without it never signs anyone in.
    pub async fn complete_two_factor_login(
        &self,
        user_id: &UserId,
        challenge: &SessionToken,
        token: &str,
        ctx: &RequestContext,
    ) -> Result<TwoFactorLogin, Error> {
        self.login_service
            .complete_two_factor_login(user_id, challenge, token, ctx)
            .await
    }

    /// End an authentication session. Unknown tokens are ignored.
    pub async fn logout(&self, token: &SessionToken, ctx: &RequestContext) -> Result<(), Error> {
        self.login_service.logout(token, ctx).await
    }

    /// Resolve a bearer token to its user.
    ///
    /// Unknown and expired tokens fail with `SessionError::NotFound`.
    pub async fn authenticate(&self, token: &SessionToken) -> Result<(User, Session), Error> {
        let session = self
            .session_service
            .get_session(token)
            .await?
            .ok_or(SessionError::NotFound)?;

        let user = self
            .user_service
            .get_user(&session.user_id)
            .await?
            .ok_or(SessionError::NotFound)?;

        Ok((user, session))
    }

    /// Get a user by their ID
    pub async fn get_user(&self, user_id: &UserId) -> Result<Option<User>, Error> {
        self.user_service.get_user(user_id).await
    }

    /// Issue a TOTP secret for `user` to confirm. Nothing is stored yet.
    pub async fn generate_two_factor_secret(&self, user: &User) -> Result<TwoFactorSetup, Error> {
        self.two_factor.generate_secret(&user.id, &user.email).await
    }

    /// Confirm a secret with a current code and turn two-factor on.
    ///
    /// Returns the plaintext backup codes; they cannot be shown again.
    pub async fn enable_two_factor(
        &self,
        user: &User,
        secret: &str,
        token: &str,
        ctx: &RequestContext,
    ) -> Result<Vec<String>, Error> {
        self.two_factor
            .enable(&user.id, &user.email, secret, token, ctx)
            .await
    }

    pub async fn disable_two_factor(
        &self,
        user: &User,
        password: &str,
        ctx: &RequestContext,
    ) -> Result<(), Error> {
        self.two_factor
            .disable(&user.id, &user.email, password, ctx)
            .await
    }

    pub async fn regenerate_backup_codes(
        &self,
        user: &User,
        password: &str,
        ctx: &RequestContext,
    ) -> Result<Vec<String>, Error> {
        self.two_factor
            .regenerate_backup_codes(&user.id, &user.email, password, ctx)
            .await
    }

    pub async fn backup_code_status(&self, user_id: &UserId) -> Result<BackupCodeStatus, Error> {
        self.two_factor.backup_code_status(user_id).await
    }

    /// Whether `remaining` backup codes warrants a warning.
    pub fn backup_codes_running_low(&self, remaining: usize) -> bool {
        self.two_factor.is_running_low(remaining)
    }

    pub fn two_factor_config(&self) -> &TotpConfig {
        self.two_factor.config()
    }

    /// Record activity from the caller's device and make it the current session.
    pub async fn touch_device_session(
        &self,
        user_id: &UserId,
        ctx: &RequestContext,
    ) -> Result<DeviceSession, Error> {
        self.registry
            .upsert_session(user_id, ctx.user_agent(), ctx.ip_address())
            .await
    }

    pub async fn list_device_sessions(&self, user_id: &UserId) -> Result<Vec<DeviceSession>, Error> {
        self.registry.list_active_sessions(user_id).await
    }

    /// Revoke one of `user`'s device sessions and sign that device out.
    pub async fn revoke_device_session(
        &self,
        user: &User,
        session_id: &DeviceSessionId,
        ctx: &RequestContext,
    ) -> Result<(), Error> {
        self.registry.revoke_session(user, session_id, ctx).await?;

        let ended = self.session_service.delete_device_sessions(session_id).await?;
        tracing::debug!(
            user_id = %user.id,
            session_id = %session_id,
            ended,
            "Signed out revoked device"
        );

        Ok(())
    }

    /// Most recent audit events for a user, newest first.
    pub async fn audit_events_for_user(
        &self,
        user_id: &UserId,
        limit: u32,
    ) -> Result<Vec<AuditEvent>, Error> {
        self.audit.list_for_user(user_id, limit).await
    }

    /// Most recent audit events for an email, newest first.
    pub async fn audit_events_for_email(
        &self,
        email: &str,
        limit: u32,
    ) -> Result<Vec<AuditEvent>, Error> {
        self.audit.list_for_email(email, limit).await
    }

    /// Current lockout state of an account.
    pub async fn brute_force_status(&self, email: &str) -> Result<BruteForceStatus, Error> {
        self.brute_force.check(email).await
    }

    /// Lift a lockout. Returns whether the account was locked.
    pub async fn unlock_account(&self, email: &str) -> Result<bool, Error> {
        self.brute_force.unlock_account(email).await
    }

    /// Purge old failed attempts, stale rate-limit counters and expired sessions once.
    pub async fn run_cleanup(&self) -> Result<CleanupReport, Error> {
        run_cleanup(&self.brute_force, &self.rate_limiter, &self.session_service).await
    }

    /// Start the hourly cleanup in the background.
    ///
    /// Runs until `shutdown` changes.
    pub fn start_cleanup_task(
        &self,
        mut shutdown: tokio::sync::watch::Receiver<bool>,
    ) -> tokio::task::JoinHandle<()> {
        let brute_force = Arc::clone(&self.brute_force);
        let rate_limiter = Arc::clone(&self.rate_limiter);
        let sessions = Arc::clone(&self.session_service);

        tokio::spawn(async move {
            let mut interval_timer = tokio::time::interval(CLEANUP_INTERVAL);

            loop {
                tokio::select! {
                    _ = interval_timer.tick() => {
                        match run_cleanup(&brute_force, &rate_limiter, &sessions).await {
                            Ok(report) if report != CleanupReport::default() => {
                                tracing::info!(
                                    failed_attempts = report.failed_attempts,
                                    rate_limits = report.rate_limits,
                                    sessions = report.sessions,
                                    "Cleaned up expired security records"
                                );
                            }
                            Err(e) => {
                                tracing::warn!(error = %e, "Failed to clean up expired security records");
                            }
                            _ => {}
                        }
                    }
                    _ = shutdown.changed() => {
                        tracing::info!("Shutting down cleanup task");
                        break;
                    }
                }
            }
        })
    }
}

async fn run_cleanup<R: RepositoryProvider>(
    brute_force: &BruteForceProtectionService<BruteForceProtectionRepositoryAdapter<R>>,
    rate_limiter: &RateLimiterService<RateLimitRepositoryAdapter<R>>,
    sessions: &SessionService<SessionRepositoryAdapter<R>>,
) -> Result<CleanupReport, Error> {
    Ok(CleanupReport {
        failed_attempts: brute_force.cleanup_old_attempts().await?,
        rate_limits: rate_limiter.purge_stale().await?,
        sessions: sessions.cleanup_expired_sessions().await?,
    })
}
