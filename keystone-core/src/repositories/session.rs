use crate::{
    DeviceSessionId, Error, Session, UserId,
    session::{SessionToken, TwoFactorChallenge},
};
use async_trait::async_trait;

/// Repository for authentication sessions and pending two-factor challenges
///
/// Implementations persist `token.hash()` and never the token itself.
#[async_trait]
pub trait SessionRepository: Send + Sync + 'static {
    /// Create a new session
    async fn create(&self, session: Session) -> Result<Session, Error>;

    /// Find a session by the token the client presented
    async fn find_by_token(&self, token: &SessionToken) -> Result<Option<Session>, Error>;

    /// Delete a session by token
    async fn delete(&self, token: &SessionToken) -> Result<(), Error>;

    /// Delete all sessions for a user
    async fn delete_by_user_id(&self, user_id: &UserId) -> Result<(), Error>;

    /// Delete the sessions issued under a device session, returning how many were removed
    async fn delete_by_device_session(&self, id: &DeviceSessionId) -> Result<u64, Error>;

    /// Store a pending two-factor challenge
    async fn create_challenge(
        &self,
        challenge: TwoFactorChallenge,
    ) -> Result<TwoFactorChallenge, Error>;

    /// Find a pending challenge by the token the client presented, expired or not
    async fn find_challenge(
        &self,
        token: &SessionToken,
    ) -> Result<Option<TwoFactorChallenge>, Error>;

    /// Delete a challenge. Returns `false` if it was already gone.
    async fn consume_challenge(&self, token: &SessionToken) -> Result<bool, Error>;

    /// Delete expired sessions and challenges, returning how many were removed
    async fn cleanup_expired(&self) -> Result<u64, Error>;
}
