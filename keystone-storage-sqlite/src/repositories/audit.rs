use async_trait::async_trait;
use chrono::Utc;
use keystone_core::{
    AuditEvent, Error, NewAuditEvent, UserId, error::StorageError,
    repositories::AuditRepository,
};
use serde_json::Value;
use sqlx::SqlitePool;

use crate::{db_error, from_timestamp};

/// Append-only audit trail in `auth_audit_logs`
pub struct SqliteAuditRepository {
    pool: SqlitePool,
}

impl SqliteAuditRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct SqliteAuditEvent {
    id: i64,
    user_id: Option<String>,
    email: String,
    event_type: String,
    success: bool,
    ip_address: Option<String>,
    user_agent: Option<String>,
    error_message: Option<String>,
    metadata: String,
    created_at: i64,
}

impl TryFrom<SqliteAuditEvent> for AuditEvent {
    type Error = Error;

    fn try_from(row: SqliteAuditEvent) -> Result<Self, Self::Error> {
        let metadata: Value = serde_json::from_str(&row.metadata)
            .map_err(|e| StorageError::Database(format!("Corrupt audit metadata: {e}")))?;

        Ok(AuditEvent {
            id: row.id,
            user_id: row.user_id.map(UserId::from),
            email: row.email,
            event_type: row.event_type.parse()?,
            success: row.success,
            ip_address: row.ip_address,
            user_agent: row.user_agent,
            error_message: row.error_message,
            metadata,
            created_at: from_timestamp(row.created_at)?,
        })
    }
}

const EVENT_COLUMNS: &str = "id, user_id, email, event_type, success, ip_address, user_agent, error_message, metadata, created_at";

#[async_trait]
impl AuditRepository for SqliteAuditRepository {
    async fn append(&self, event: NewAuditEvent) -> Result<AuditEvent, Error> {
        let metadata = Value::Object(event.metadata).to_string();

        let row = sqlx::query_as::<_, SqliteAuditEvent>(&format!(
            r#"
            INSERT INTO auth_audit_logs
                (user_id, email, event_type, success, ip_address, user_agent, error_message, metadata, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            RETURNING {EVENT_COLUMNS}
            "#
        ))
        .bind(event.user_id.as_ref().map(UserId::as_str))
        .bind(&event.email)
        .bind(event.event_type.as_str())
        .bind(event.success)
        .bind(&event.ip_address)
        .bind(&event.user_agent)
        .bind(&event.error_message)
        .bind(metadata)
        .bind(Utc::now().timestamp())
        .fetch_one(&self.pool)
        .await
        .map_err(db_error("Failed to append audit event"))?;

        row.try_into()
    }

    async fn list_for_user(&self, user_id: &UserId, limit: u32) -> Result<Vec<AuditEvent>, Error> {
        let rows = sqlx::query_as::<_, SqliteAuditEvent>(&format!(
            r#"
            SELECT {EVENT_COLUMNS} FROM auth_audit_logs
            WHERE user_id = ?1
            ORDER BY created_at DESC, id DESC
            LIMIT ?2
            "#
        ))
        .bind(user_id.as_str())
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(db_error("Failed to list audit events"))?;

        rows.into_iter().map(AuditEvent::try_from).collect()
    }

    async fn list_for_email(&self, email: &str, limit: u32) -> Result<Vec<AuditEvent>, Error> {
        let rows = sqlx::query_as::<_, SqliteAuditEvent>(&format!(
            r#"
            SELECT {EVENT_COLUMNS} FROM auth_audit_logs
            WHERE email = ?1
            ORDER BY created_at DESC, id DESC
            LIMIT ?2
            "#
        ))
        .bind(email)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(db_error("Failed to list audit events"))?;

        rows.into_iter().map(AuditEvent::try_from).collect()
    }
}
