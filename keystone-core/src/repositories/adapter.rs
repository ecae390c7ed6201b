use crate::{
    AuditEvent, DeviceInfo, DeviceSession, DeviceSessionId, Error, NewAuditEvent, NewUser,
    RateLimitPolicy, RateLimitRecord, Session, TwoFactorCredential, User, UserId,
    brute_force::{AttemptStats, FailedLoginAttempt},
    repositories::{
        AuditRepository, BruteForceProtectionRepository, DeviceSessionRepository,
        PasswordRepository, RateLimitRepository, RepositoryProvider, SessionRepository,
        UserRepository,
    },
    session::{SessionToken, TwoFactorChallenge},
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Adapter that wraps a RepositoryProvider and implements UserRepository
pub struct UserRepositoryAdapter<R: RepositoryProvider> {
    provider: Arc<R>,
}

impl<R: RepositoryProvider> UserRepositoryAdapter<R> {
    pub fn new(provider: Arc<R>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl<R: RepositoryProvider> UserRepository for UserRepositoryAdapter<R> {
    async fn create(&self, user: NewUser) -> Result<User, Error> {
        self.provider.user().create(user).await
    }

    async fn find_by_id(&self, id: &UserId) -> Result<Option<User>, Error> {
        self.provider.user().find_by_id(id).await
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, Error> {
        self.provider.user().find_by_email(email).await
    }

    async fn delete(&self, id: &UserId) -> Result<(), Error> {
        self.provider.user().delete(id).await
    }

    async fn set_two_factor(
        &self,
        user_id: &UserId,
        credential: &TwoFactorCredential,
    ) -> Result<(), Error> {
        self.provider
            .user()
            .set_two_factor(user_id, credential)
            .await
    }

    async fn replace_backup_codes(
        &self,
        user_id: &UserId,
        expected: &[String],
        replacement: &[String],
    ) -> Result<bool, Error> {
        self.provider
            .user()
            .replace_backup_codes(user_id, expected, replacement)
            .await
    }
}

pub struct PasswordRepositoryAdapter<R: RepositoryProvider> {
    provider: Arc<R>,
}

impl<R: RepositoryProvider> PasswordRepositoryAdapter<R> {
    pub fn new(provider: Arc<R>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl<R: RepositoryProvider> PasswordRepository for PasswordRepositoryAdapter<R> {
    async fn set_password_hash(&self, user_id: &UserId, hash: &str) -> Result<(), Error> {
        self.provider
            .password()
            .set_password_hash(user_id, hash)
            .await
    }

    async fn get_password_hash(&self, user_id: &UserId) -> Result<Option<String>, Error> {
        self.provider.password().get_password_hash(user_id).await
    }
}

pub struct SessionRepositoryAdapter<R: RepositoryProvider> {
    provider: Arc<R>,
}

impl<R: RepositoryProvider> SessionRepositoryAdapter<R> {
    pub fn new(provider: Arc<R>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl<R: RepositoryProvider> SessionRepository for SessionRepositoryAdapter<R> {
    async fn create(&self, session: Session) -> Result<Session, Error> {
        self.provider.session().create(session).await
    }

    async fn find_by_token(&self, token: &SessionToken) -> Result<Option<Session>, Error> {
        self.provider.session().find_by_token(token).await
    }

    async fn delete(&self, token: &SessionToken) -> Result<(), Error> {
        self.provider.session().delete(token).await
    }

    async fn delete_by_user_id(&self, user_id: &UserId) -> Result<(), Error> {
        self.provider.session().delete_by_user_id(user_id).await
    }

    async fn delete_by_device_session(&self, id: &DeviceSessionId) -> Result<u64, Error> {
        self.provider.session().delete_by_device_session(id).await
    }

    async fn create_challenge(
        &self,
        challenge: TwoFactorChallenge,
    ) -> Result<TwoFactorChallenge, Error> {
        self.provider.session().create_challenge(challenge).await
    }

    async fn find_challenge(
        &self,
        token: &SessionToken,
    ) -> Result<Option<TwoFactorChallenge>, Error> {
        self.provider.session().find_challenge(token).await
    }

    async fn consume_challenge(&self, token: &SessionToken) -> Result<bool, Error> {
        self.provider.session().consume_challenge(token).await
    }

    async fn cleanup_expired(&self) -> Result<u64, Error> {
        self.provider.session().cleanup_expired().await
    }
}

pub struct RateLimitRepositoryAdapter<R: RepositoryProvider> {
    provider: Arc<R>,
}

impl<R: RepositoryProvider> RateLimitRepositoryAdapter<R> {
    pub fn new(provider: Arc<R>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl<R: RepositoryProvider> RateLimitRepository for RateLimitRepositoryAdapter<R> {
    async fn hit(
        &self,
        identifier: &str,
        policy: &RateLimitPolicy,
        now: DateTime<Utc>,
    ) -> Result<RateLimitRecord, Error> {
        self.provider.rate_limit().hit(identifier, policy, now).await
    }

    async fn find(&self, identifier: &str) -> Result<Option<RateLimitRecord>, Error> {
        self.provider.rate_limit().find(identifier).await
    }

    async fn delete(&self, identifier: &str) -> Result<(), Error> {
        self.provider.rate_limit().delete(identifier).await
    }

    async fn purge_stale(&self, before: DateTime<Utc>) -> Result<u64, Error> {
        self.provider.rate_limit().purge_stale(before).await
    }
}

pub struct BruteForceProtectionRepositoryAdapter<R: RepositoryProvider> {
    provider: Arc<R>,
}

impl<R: RepositoryProvider> BruteForceProtectionRepositoryAdapter<R> {
    pub fn new(provider: Arc<R>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl<R: RepositoryProvider> BruteForceProtectionRepository
    for BruteForceProtectionRepositoryAdapter<R>
{
    async fn record_failed_attempt(
        &self,
        email: &str,
        ip_address: Option<&str>,
        user_agent: Option<&str>,
    ) -> Result<FailedLoginAttempt, Error> {
        self.provider
            .brute_force()
            .record_failed_attempt(email, ip_address, user_agent)
            .await
    }

    async fn get_attempt_stats(
        &self,
        email: &str,
        since: DateTime<Utc>,
    ) -> Result<AttemptStats, Error> {
        self.provider
            .brute_force()
            .get_attempt_stats(email, since)
            .await
    }

    async fn clear_attempts(&self, email: &str) -> Result<u64, Error> {
        self.provider.brute_force().clear_attempts(email).await
    }

    async fn cleanup_old_attempts(&self, before: DateTime<Utc>) -> Result<u64, Error> {
        self.provider.brute_force().cleanup_old_attempts(before).await
    }
}

pub struct AuditRepositoryAdapter<R: RepositoryProvider> {
    provider: Arc<R>,
}

impl<R: RepositoryProvider> AuditRepositoryAdapter<R> {
    pub fn new(provider: Arc<R>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl<R: RepositoryProvider> AuditRepository for AuditRepositoryAdapter<R> {
    async fn append(&self, event: NewAuditEvent) -> Result<AuditEvent, Error> {
        self.provider.audit().append(event).await
    }

    async fn list_for_user(&self, user_id: &UserId, limit: u32) -> Result<Vec<AuditEvent>, Error> {
        self.provider.audit().list_for_user(user_id, limit).await
    }

    async fn list_for_email(&self, email: &str, limit: u32) -> Result<Vec<AuditEvent>, Error> {
        self.provider.audit().list_for_email(email, limit).await
    }
}

pub struct DeviceSessionRepositoryAdapter<R: RepositoryProvider> {
    provider: Arc<R>,
}

impl<R: RepositoryProvider> DeviceSessionRepositoryAdapter<R> {
    pub fn new(provider: Arc<R>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl<R: RepositoryProvider> DeviceSessionRepository for DeviceSessionRepositoryAdapter<R> {
    async fn create(&self, session: DeviceSession) -> Result<DeviceSession, Error> {
        self.provider.device_session().create(session).await
    }

    async fn find_by_id(&self, id: &DeviceSessionId) -> Result<Option<DeviceSession>, Error> {
        self.provider.device_session().find_by_id(id).await
    }

    async fn find_active_for_device(
        &self,
        user_id: &UserId,
        device: &DeviceInfo,
        ip_address: Option<&str>,
    ) -> Result<Option<DeviceSession>, Error> {
        self.provider
            .device_session()
            .find_active_for_device(user_id, device, ip_address)
            .await
    }

    async fn touch(&self, id: &DeviceSessionId, at: DateTime<Utc>) -> Result<(), Error> {
        self.provider.device_session().touch(id, at).await
    }

    async fn mark_current(&self, user_id: &UserId, id: &DeviceSessionId) -> Result<(), Error> {
        self.provider.device_session().mark_current(user_id, id).await
    }

    async fn list_active(&self, user_id: &UserId) -> Result<Vec<DeviceSession>, Error> {
        self.provider.device_session().list_active(user_id).await
    }

    async fn revoke(
        &self,
        user_id: &UserId,
        id: &DeviceSessionId,
        at: DateTime<Utc>,
    ) -> Result<bool, Error> {
        self.provider.device_session().revoke(user_id, id, at).await
    }
}
