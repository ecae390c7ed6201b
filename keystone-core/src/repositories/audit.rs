use async_trait::async_trait;

use crate::{AuditEvent, Error, NewAuditEvent, UserId};

/// Append-only store for audit events
#[async_trait]
pub trait AuditRepository: Send + Sync + 'static {
    /// Append an event
    async fn append(&self, event: NewAuditEvent) -> Result<AuditEvent, Error>;

    /// Most recent events for a user, newest first
    async fn list_for_user(&self, user_id: &UserId, limit: u32) -> Result<Vec<AuditEvent>, Error>;

    /// Most recent events for an email, newest first
    async fn list_for_email(&self, email: &str, limit: u32) -> Result<Vec<AuditEvent>, Error>;
}
