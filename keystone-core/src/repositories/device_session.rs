use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{DeviceInfo, DeviceSession, DeviceSessionId, Error, UserId};

/// Repository for the per-device session registry
#[async_trait]
pub trait DeviceSessionRepository: Send + Sync + 'static {
    /// Insert a new device session
    async fn create(&self, session: DeviceSession) -> Result<DeviceSession, Error>;

    /// Find a device session by ID, revoked or not
    async fn find_by_id(&self, id: &DeviceSessionId) -> Result<Option<DeviceSession>, Error>;

    /// The non-revoked session of `user_id` for this device and address
    async fn find_active_for_device(
        &self,
        user_id: &UserId,
        device: &DeviceInfo,
        ip_address: Option<&str>,
    ) -> Result<Option<DeviceSession>, Error>;

    /// Record activity on a session
    async fn touch(&self, id: &DeviceSessionId, at: DateTime<Utc>) -> Result<(), Error>;

    /// Mark `id` as the user's current session and every other one as not current
    async fn mark_current(&self, user_id: &UserId, id: &DeviceSessionId) -> Result<(), Error>;

    /// Non-revoked sessions of a user, most recently active first
    async fn list_active(&self, user_id: &UserId) -> Result<Vec<DeviceSession>, Error>;

    /// Revoke a session owned by `user_id`. Returns `false` if no such active session exists.
    async fn revoke(
        &self,
        user_id: &UserId,
        id: &DeviceSessionId,
        at: DateTime<Utc>,
    ) -> Result<bool, Error>;
}
