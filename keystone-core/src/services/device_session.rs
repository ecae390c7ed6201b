use std::sync::Arc;

use chrono::Utc;

use crate::{
    AuditEventType, DeviceInfo, DeviceSession, DeviceSessionId, Error, NewAuditEvent,
    RequestContext, User, UserId,
    error::SessionError,
    repositories::{AuditRepository, DeviceSessionRepository},
    services::AuditLogger,
};

/// Registry of the devices a user is signed in from
pub struct SessionRegistryService<D: DeviceSessionRepository, A: AuditRepository> {
    repository: Arc<D>,
    audit: Arc<AuditLogger<A>>,
}

impl<D: DeviceSessionRepository, A: AuditRepository> SessionRegistryService<D, A> {
    pub fn new(repository: Arc<D>, audit: Arc<AuditLogger<A>>) -> Self {
        Self { repository, audit }
    }

    /// Record a login from a device.
    ///
    /// A login from a device and address already in the registry refreshes
    /// that entry instead of adding a new one. Either way the entry becomes
    /// the user's current session.
    pub async fn upsert_session(
        &self,
        user_id: &UserId,
        user_agent: Option<&str>,
        ip_address: Option<&str>,
    ) -> Result<DeviceSession, Error> {
        let device = DeviceInfo::from_user_agent(user_agent);

        let mut session = match self
            .repository
            .find_active_for_device(user_id, &device, ip_address)
            .await?
        {
            Some(mut existing) => {
                let now = Utc::now();
                self.repository.touch(&existing.id, now).await?;
                existing.last_active_at = now;
                existing
            }
            None => {
                let session =
                    DeviceSession::new(user_id, device, ip_address.map(|s| s.to_string()));
                tracing::debug!(
                    user_id = %user_id,
                    session_id = %session.id,
                    device = %session.device_name,
                    "New device session"
                );
                self.repository.create(session).await?
            }
        };

        self.repository.mark_current(user_id, &session.id).await?;
        session.is_current = true;

        Ok(session)
    }

    /// Non-revoked sessions, most recently active first.
    pub async fn list_active_sessions(
        &self,
        user_id: &UserId,
    ) -> Result<Vec<DeviceSession>, Error> {
        self.repository.list_active(user_id).await
    }

    /// Revoke one of `user`'s sessions.
    ///
    /// Sessions of other users are reported as not found.
    pub async fn revoke_session(
        &self,
        user: &User,
        session_id: &DeviceSessionId,
        ctx: &RequestContext,
    ) -> Result<(), Error> {
        let revoked = self
            .repository
            .revoke(&user.id, session_id, Utc::now())
            .await?;

        if !revoked {
            return Err(SessionError::NotFound.into());
        }

        tracing::info!(user_id = %user.id, session_id = %session_id, "Device session revoked");
        self.audit.log_auth_event(
            NewAuditEvent::new(&user.email, AuditEventType::SessionRevoked, true)
                .user_id(&user.id)
                .context(ctx)
                .metadata("session_id", session_id.as_str()),
        );

        Ok(())
    }
}
