use std::sync::Arc;

use crate::{AuditEvent, Error, NewAuditEvent, UserId, repositories::AuditRepository};

/// Writes the authentication audit trail
///
/// [`log_auth_event`](Self::log_auth_event) never blocks the caller and never
/// fails it; a lost audit write is reported through `tracing` only.
pub struct AuditLogger<R: AuditRepository> {
    repository: Arc<R>,
}

impl<R: AuditRepository> AuditLogger<R> {
    pub fn new(repository: Arc<R>) -> Self {
        Self { repository }
    }

    /// Queue an event for writing and return immediately.
    pub fn log_auth_event(&self, event: NewAuditEvent) {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            tracing::error!(
                event_type = %event.event_type,
                email = %event.email,
                "No async runtime available, audit event dropped"
            );
            return;
        };

        let repository = Arc::clone(&self.repository);
        handle.spawn(async move {
            let event_type = event.event_type;
            let email = event.email.clone();
            if let Err(e) = repository.append(event).await {
                tracing::error!(
                    error = %e,
                    event_type = %event_type,
                    email = %email,
                    "Failed to write audit event"
                );
            }
        });
    }

    /// Write an event and wait for the store to acknowledge it.
    pub async fn record(&self, event: NewAuditEvent) -> Result<AuditEvent, Error> {
        self.repository.append(event).await
    }

    /// Most recent events for a user, newest first.
    pub async fn list_for_user(
        &self,
        user_id: &UserId,
        limit: u32,
    ) -> Result<Vec<AuditEvent>, Error> {
        self.repository.list_for_user(user_id, limit).await
    }

    /// Most recent events for an email, newest first.
    pub async fn list_for_email(&self, email: &str, limit: u32) -> Result<Vec<AuditEvent>, Error> {
        self.repository.list_for_email(email, limit).await
    }
}
