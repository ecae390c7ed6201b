use crate::{
    DeviceSessionId, Error, RequestContext, Session, SessionConfig, UserId,
    repositories::SessionRepository,
    session::{SessionToken, TwoFactorChallenge},
};
use chrono::Utc;
use std::sync::Arc;

/// Service for authentication session operations
pub struct SessionService<R: SessionRepository> {
    repository: Arc<R>,
    config: SessionConfig,
}

impl<R: SessionRepository> SessionService<R> {
    pub fn new(repository: Arc<R>, config: SessionConfig) -> Self {
        Self { repository, config }
    }

    /// Issue a new session for a user, tied to the device it was issued on
    pub async fn create_session(
        &self,
        user_id: &UserId,
        device_session_id: Option<&DeviceSessionId>,
        ctx: &RequestContext,
    ) -> Result<Session, Error> {
        let now = Utc::now();
        let session = Session {
            token: SessionToken::new_random(),
            user_id: user_id.clone(),
            user_agent: ctx.user_agent.clone(),
            ip_address: ctx.ip_address.clone(),
            created_at: now,
            updated_at: now,
            expires_at: now + self.config.expires_in,
            device_session_id: device_session_id.cloned(),
        };

        self.repository.create(session).await
    }

    /// Get a live session by token; expired sessions read as absent
    pub async fn get_session(&self, token: &SessionToken) -> Result<Option<Session>, Error> {
        let session = self.repository.find_by_token(token).await?;
        Ok(session.filter(|s| !s.is_expired()))
    }

    /// Delete a session
    pub async fn delete_session(&self, token: &SessionToken) -> Result<(), Error> {
        self.repository.delete(token).await
    }

    /// End every session issued under a device session
    pub async fn delete_device_sessions(&self, id: &DeviceSessionId) -> Result<u64, Error> {
        self.repository.delete_by_device_session(id).await
    }

    /// Issue a challenge that a second factor must redeem
    pub async fn create_challenge(&self, user_id: &UserId) -> Result<TwoFactorChallenge, Error> {
        let challenge = TwoFactorChallenge::new(user_id, self.config.challenge_expires_in);
        self.repository.create_challenge(challenge).await
    }

    /// Get a live challenge; expired challenges read as absent
    pub async fn get_challenge(
        &self,
        token: &SessionToken,
    ) -> Result<Option<TwoFactorChallenge>, Error> {
        let challenge = self.repository.find_challenge(token).await?;
        Ok(challenge.filter(|c| !c.is_expired()))
    }

    /// Redeem a challenge. Only the first caller gets `true`.
    pub async fn consume_challenge(&self, token: &SessionToken) -> Result<bool, Error> {
        self.repository.consume_challenge(token).await
    }

    /// Clean up expired sessions and challenges
    pub async fn cleanup_expired_sessions(&self) -> Result<u64, Error> {
        self.repository.cleanup_expired().await
    }
}
