//! In-memory repositories shared by the service tests.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::{
    AuditEvent, DeviceInfo, DeviceSession, DeviceSessionId, Error, NewAuditEvent, NewUser,
    RateLimitPolicy, RateLimitRecord, Session, TwoFactorCredential, User, UserId,
    brute_force::{AttemptStats, FailedLoginAttempt},
    error::StorageError,
    repositories::*,
    session::{SessionToken, TwoFactorChallenge},
};

#[derive(Default)]
pub(crate) struct MockUserRepository {
    pub users: Mutex<HashMap<UserId, User>>,
}

#[async_trait]
impl UserRepository for MockUserRepository {
    async fn create(&self, new_user: NewUser) -> Result<User, Error> {
        let mut users = self.users.lock().unwrap();
        if users.values().any(|u| u.email == new_user.email) {
            return Err(StorageError::Constraint("users.email".to_string()).into());
        }
        let user = User::builder()
            .id(new_user.id.clone())
            .email(new_user.email)
            .name(new_user.name)
            .build()?;
        users.insert(new_user.id, user.clone());
        Ok(user)
    }

    async fn find_by_id(&self, id: &UserId) -> Result<Option<User>, Error> {
        Ok(self.users.lock().unwrap().get(id).cloned())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, Error> {
        Ok(self
            .users
            .lock()
            .unwrap()
            .values()
            .find(|u| u.email == email)
            .cloned())
    }

    async fn delete(&self, id: &UserId) -> Result<(), Error> {
        self.users.lock().unwrap().remove(id);
        Ok(())
    }

    async fn set_two_factor(
        &self,
        user_id: &UserId,
        credential: &TwoFactorCredential,
    ) -> Result<(), Error> {
        let mut users = self.users.lock().unwrap();
        let user = users.get_mut(user_id).ok_or(StorageError::NotFound)?;
        user.two_factor_enabled = credential.enabled;
        user.two_factor_secret = credential.secret.clone();
        user.backup_codes = credential.backup_codes.clone();
        Ok(())
    }

    async fn replace_backup_codes(
        &self,
        user_id: &UserId,
        expected: &[String],
        replacement: &[String],
    ) -> Result<bool, Error> {
        let mut users = self.users.lock().unwrap();
        let user = users.get_mut(user_id).ok_or(StorageError::NotFound)?;
        if user.backup_codes != expected {
            return Ok(false);
        }
        user.backup_codes = replacement.to_vec();
        Ok(true)
    }
}

#[derive(Default)]
pub(crate) struct MockPasswordRepository {
    pub hashes: Mutex<HashMap<UserId, String>>,
}

#[async_trait]
impl PasswordRepository for MockPasswordRepository {
    async fn set_password_hash(&self, user_id: &UserId, hash: &str) -> Result<(), Error> {
        self.hashes
            .lock()
            .unwrap()
            .insert(user_id.clone(), hash.to_string());
        Ok(())
    }

    async fn get_password_hash(&self, user_id: &UserId) -> Result<Option<String>, Error> {
        Ok(self.hashes.lock().unwrap().get(user_id).cloned())
    }
}

#[derive(Default)]
pub(crate) struct MockSessionRepository {
    pub sessions: Mutex<HashMap<String, Session>>,
    pub challenges: Mutex<HashMap<String, TwoFactorChallenge>>,
}

#[async_trait]
impl SessionRepository for MockSessionRepository {
    async fn create(&self, session: Session) -> Result<Session, Error> {
        self.sessions
            .lock()
            .unwrap()
            .insert(session.token.hash(), session.clone());
        Ok(session)
    }

    async fn find_by_token(&self, token: &SessionToken) -> Result<Option<Session>, Error> {
        Ok(self.sessions.lock().unwrap().get(&token.hash()).cloned())
    }

    async fn delete(&self, token: &SessionToken) -> Result<(), Error> {
        self.sessions.lock().unwrap().remove(&token.hash());
        Ok(())
    }

    async fn delete_by_user_id(&self, user_id: &UserId) -> Result<(), Error> {
        self.sessions
            .lock()
            .unwrap()
            .retain(|_, s| &s.user_id != user_id);
        Ok(())
    }

    async fn delete_by_device_session(&self, id: &DeviceSessionId) -> Result<u64, Error> {
        let mut sessions = self.sessions.lock().unwrap();
        let before = sessions.len();
        sessions.retain(|_, s| s.device_session_id.as_ref() != Some(id));
        Ok((before - sessions.len()) as u64)
    }

    async fn create_challenge(
        &self,
        challenge: TwoFactorChallenge,
    ) -> Result<TwoFactorChallenge, Error> {
        self.challenges
            .lock()
            .unwrap()
            .insert(challenge.token.hash(), challenge.clone());
        Ok(challenge)
    }

    async fn find_challenge(
        &self,
        token: &SessionToken,
    ) -> Result<Option<TwoFactorChallenge>, Error> {
        Ok(self.challenges.lock().unwrap().get(&token.hash()).cloned())
    }

    async fn consume_challenge(&self, token: &SessionToken) -> Result<bool, Error> {
        Ok(self.challenges.lock().unwrap().remove(&token.hash()).is_some())
    }

    async fn cleanup_expired(&self) -> Result<u64, Error> {
        let mut sessions = self.sessions.lock().unwrap();
        let mut challenges = self.challenges.lock().unwrap();
        let before = sessions.len() + challenges.len();
        sessions.retain(|_, s| !s.is_expired());
        challenges.retain(|_, c| !c.is_expired());
        Ok((before - sessions.len() - challenges.len()) as u64)
    }
}

#[derive(Default)]
pub(crate) struct MockRateLimitRepository {
    pub records: Mutex<HashMap<String, RateLimitRecord>>,
    /// Simulates a store outage when set.
    pub unavailable: AtomicBool,
}

impl MockRateLimitRepository {
    fn check_available(&self) -> Result<(), Error> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StorageError::Connection("store unavailable".to_string()).into());
        }
        Ok(())
    }
}

#[async_trait]
impl RateLimitRepository for MockRateLimitRepository {
    async fn hit(
        &self,
        identifier: &str,
        policy: &RateLimitPolicy,
        now: DateTime<Utc>,
    ) -> Result<RateLimitRecord, Error> {
        self.check_available()?;
        let mut records = self.records.lock().unwrap();
        let next = RateLimitRecord::apply_attempt(records.get(identifier), identifier, policy, now);
        records.insert(identifier.to_string(), next.clone());
        Ok(next)
    }

    async fn find(&self, identifier: &str) -> Result<Option<RateLimitRecord>, Error> {
        self.check_available()?;
        Ok(self.records.lock().unwrap().get(identifier).cloned())
    }

    async fn delete(&self, identifier: &str) -> Result<(), Error> {
        self.check_available()?;
        self.records.lock().unwrap().remove(identifier);
        Ok(())
    }

    async fn purge_stale(&self, before: DateTime<Utc>) -> Result<u64, Error> {
        self.check_available()?;
        let mut records = self.records.lock().unwrap();
        let len = records.len();
        records.retain(|_, r| r.updated_at >= before || r.lock_until.is_some_and(|u| u >= before));
        Ok((len - records.len()) as u64)
    }
}

#[derive(Default)]
pub(crate) struct MockBruteForceRepository {
    pub attempts: Mutex<Vec<FailedLoginAttempt>>,
}

impl MockBruteForceRepository {
    /// Insert an attempt with an explicit timestamp.
    pub fn push_attempt(&self, email: &str, attempted_at: DateTime<Utc>) {
        let mut attempts = self.attempts.lock().unwrap();
        let id = attempts.len() as i64 + 1;
        attempts.push(FailedLoginAttempt {
            id,
            email: email.to_string(),
            ip_address: None,
            user_agent: None,
            attempted_at,
        });
    }
}

#[async_trait]
impl BruteForceProtectionRepository for MockBruteForceRepository {
    async fn record_failed_attempt(
        &self,
        email: &str,
        ip_address: Option<&str>,
        user_agent: Option<&str>,
    ) -> Result<FailedLoginAttempt, Error> {
        let mut attempts = self.attempts.lock().unwrap();
        let attempt = FailedLoginAttempt {
            id: attempts.len() as i64 + 1,
            email: email.to_string(),
            ip_address: ip_address.map(|s| s.to_string()),
            user_agent: user_agent.map(|s| s.to_string()),
            attempted_at: Utc::now(),
        };
        attempts.push(attempt.clone());
        Ok(attempt)
    }

    async fn get_attempt_stats(
        &self,
        email: &str,
        since: DateTime<Utc>,
    ) -> Result<AttemptStats, Error> {
        let attempts = self.attempts.lock().unwrap();
        let matching: Vec<_> = attempts
            .iter()
            .filter(|a| a.email == email && a.attempted_at >= since)
            .collect();

        Ok(AttemptStats {
            count: matching.len() as u32,
            latest_at: matching.iter().map(|a| a.attempted_at).max(),
        })
    }

    async fn clear_attempts(&self, email: &str) -> Result<u64, Error> {
        let mut attempts = self.attempts.lock().unwrap();
        let before_len = attempts.len();
        attempts.retain(|a| a.email != email);
        Ok((before_len - attempts.len()) as u64)
    }

    async fn cleanup_old_attempts(&self, before: DateTime<Utc>) -> Result<u64, Error> {
        let mut attempts = self.attempts.lock().unwrap();
        let before_len = attempts.len();
        attempts.retain(|a| a.attempted_at >= before);
        Ok((before_len - attempts.len()) as u64)
    }
}

#[derive(Default)]
pub(crate) struct MockAuditRepository {
    pub events: Mutex<Vec<AuditEvent>>,
    pub unavailable: AtomicBool,
}

#[async_trait]
impl AuditRepository for MockAuditRepository {
    async fn append(&self, event: NewAuditEvent) -> Result<AuditEvent, Error> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StorageError::Connection("store unavailable".to_string()).into());
        }
        let mut events = self.events.lock().unwrap();
        let event = AuditEvent {
            id: events.len() as i64 + 1,
            user_id: event.user_id,
            email: event.email,
            event_type: event.event_type,
            success: event.success,
            ip_address: event.ip_address,
            user_agent: event.user_agent,
            error_message: event.error_message,
            metadata: Value::Object(event.metadata),
            created_at: Utc::now(),
        };
        events.push(event.clone());
        Ok(event)
    }

    async fn list_for_user(&self, user_id: &UserId, limit: u32) -> Result<Vec<AuditEvent>, Error> {
        Ok(self
            .events
            .lock()
            .unwrap()
            .iter()
            .rev()
            .filter(|e| e.user_id.as_ref() == Some(user_id))
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn list_for_email(&self, email: &str, limit: u32) -> Result<Vec<AuditEvent>, Error> {
        Ok(self
            .events
            .lock()
            .unwrap()
            .iter()
            .rev()
            .filter(|e| e.email == email)
            .take(limit as usize)
            .cloned()
            .collect())
    }
}

#[derive(Default)]
pub(crate) struct MockDeviceSessionRepository {
    pub sessions: Mutex<Vec<DeviceSession>>,
}

#[async_trait]
impl DeviceSessionRepository for MockDeviceSessionRepository {
    async fn create(&self, session: DeviceSession) -> Result<DeviceSession, Error> {
        self.sessions.lock().unwrap().push(session.clone());
        Ok(session)
    }

    async fn find_by_id(&self, id: &DeviceSessionId) -> Result<Option<DeviceSession>, Error> {
        Ok(self
            .sessions
            .lock()
            .unwrap()
            .iter()
            .find(|s| &s.id == id)
            .cloned())
    }

    async fn find_active_for_device(
        &self,
        user_id: &UserId,
        device: &DeviceInfo,
        ip_address: Option<&str>,
    ) -> Result<Option<DeviceSession>, Error> {
        Ok(self
            .sessions
            .lock()
            .unwrap()
            .iter()
            .find(|s| &s.user_id == user_id && !s.is_revoked() && s.matches(device, ip_address))
            .cloned())
    }

    async fn touch(&self, id: &DeviceSessionId, at: DateTime<Utc>) -> Result<(), Error> {
        for session in self.sessions.lock().unwrap().iter_mut() {
            if &session.id == id {
                session.last_active_at = at;
            }
        }
        Ok(())
    }

    async fn mark_current(&self, user_id: &UserId, id: &DeviceSessionId) -> Result<(), Error> {
        for session in self.sessions.lock().unwrap().iter_mut() {
            if &session.user_id == user_id {
                session.is_current = &session.id == id;
            }
        }
        Ok(())
    }

    async fn list_active(&self, user_id: &UserId) -> Result<Vec<DeviceSession>, Error> {
        let mut active: Vec<_> = self
            .sessions
            .lock()
            .unwrap()
            .iter()
            .filter(|s| &s.user_id == user_id && !s.is_revoked())
            .cloned()
            .collect();
        active.sort_by(|a, b| b.last_active_at.cmp(&a.last_active_at));
        Ok(active)
    }

    async fn revoke(
        &self,
        user_id: &UserId,
        id: &DeviceSessionId,
        at: DateTime<Utc>,
    ) -> Result<bool, Error> {
        for session in self.sessions.lock().unwrap().iter_mut() {
            if &session.id == id && &session.user_id == user_id && !session.is_revoked() {
                session.revoked_at = Some(at);
                session.is_current = false;
                return Ok(true);
            }
        }
        Ok(false)
    }
}

#[derive(Default)]
pub(crate) struct MockRepositoryProvider {
    pub user: MockUserRepository,
    pub password: MockPasswordRepository,
    pub session: MockSessionRepository,
    pub rate_limit: MockRateLimitRepository,
    pub brute_force: MockBruteForceRepository,
    pub audit: MockAuditRepository,
    pub device_session: MockDeviceSessionRepository,
}

impl UserRepositoryProvider for MockRepositoryProvider {
    type UserRepo = MockUserRepository;
    fn user(&self) -> &Self::UserRepo {
        &self.user
    }
}

impl PasswordRepositoryProvider for MockRepositoryProvider {
    type PasswordRepo = MockPasswordRepository;
    fn password(&self) -> &Self::PasswordRepo {
        &self.password
    }
}

impl SessionRepositoryProvider for MockRepositoryProvider {
    type SessionRepo = MockSessionRepository;
    fn session(&self) -> &Self::SessionRepo {
        &self.session
    }
}

impl RateLimitRepositoryProvider for MockRepositoryProvider {
    type RateLimitRepo = MockRateLimitRepository;
    fn rate_limit(&self) -> &Self::RateLimitRepo {
        &self.rate_limit
    }
}

impl BruteForceRepositoryProvider for MockRepositoryProvider {
    type BruteForceRepo = MockBruteForceRepository;
    fn brute_force(&self) -> &Self::BruteForceRepo {
        &self.brute_force
    }
}

impl AuditRepositoryProvider for MockRepositoryProvider {
    type AuditRepo = MockAuditRepository;
    fn audit(&self) -> &Self::AuditRepo {
        &self.audit
    }
}

impl DeviceSessionRepositoryProvider for MockRepositoryProvider {
    type DeviceSessionRepo = MockDeviceSessionRepository;
    fn device_session(&self) -> &Self::DeviceSessionRepo {
        &self.device_session
    }
}

#[async_trait]
impl RepositoryProvider for MockRepositoryProvider {
    async fn migrate(&self) -> Result<(), Error> {
        Ok(())
    }

    async fn health_check(&self) -> Result<(), Error> {
        Ok(())
    }
}

/// Poll until `condition` holds for the audit log, for fire-and-forget writes.
pub(crate) async fn wait_for_audit<F>(audit: &MockAuditRepository, condition: F)
where
    F: Fn(&[AuditEvent]) -> bool,
{
    for _ in 0..100 {
        let done = condition(&audit.events.lock().unwrap());
        if done {
            return;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    panic!("audit log never reached the expected state");
}
