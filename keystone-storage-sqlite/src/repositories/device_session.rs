use async_trait::async_trait;
use chrono::{DateTime, Utc};
use keystone_core::{
    DeviceInfo, DeviceSession, DeviceSessionId, Error, UserId,
    repositories::DeviceSessionRepository,
};
use sqlx::SqlitePool;

use crate::{db_error, from_timestamp};

pub struct SqliteDeviceSessionRepository {
    pool: SqlitePool,
}

impl SqliteDeviceSessionRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct SqliteDeviceSession {
    id: String,
    user_id: String,
    device_name: String,
    browser: String,
    os: String,
    ip_address: Option<String>,
    last_active_at: i64,
    is_current: bool,
    revoked_at: Option<i64>,
    created_at: i64,
}

impl TryFrom<SqliteDeviceSession> for DeviceSession {
    type Error = Error;

    fn try_from(row: SqliteDeviceSession) -> Result<Self, Self::Error> {
        Ok(DeviceSession {
            id: DeviceSessionId::new(&row.id),
            user_id: UserId::new(&row.user_id),
            device_name: row.device_name,
            browser: row.browser,
            os: row.os,
            ip_address: row.ip_address,
            last_active_at: from_timestamp(row.last_active_at)?,
            is_current: row.is_current,
            revoked_at: row.revoked_at.map(from_timestamp).transpose()?,
            created_at: from_timestamp(row.created_at)?,
        })
    }
}

const SESSION_COLUMNS: &str = "id, user_id, device_name, browser, os, ip_address, last_active_at, is_current, revoked_at, created_at";

#[async_trait]
impl DeviceSessionRepository for SqliteDeviceSessionRepository {
    async fn create(&self, session: DeviceSession) -> Result<DeviceSession, Error> {
        sqlx::query(
            r#"
            INSERT INTO user_sessions
                (id, user_id, device_name, browser, os, ip_address, last_active_at, is_current, revoked_at, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
        )
        .bind(session.id.as_str())
        .bind(session.user_id.as_str())
        .bind(&session.device_name)
        .bind(&session.browser)
        .bind(&session.os)
        .bind(&session.ip_address)
        .bind(session.last_active_at.timestamp())
        .bind(session.is_current)
        .bind(session.revoked_at.map(|t| t.timestamp()))
        .bind(session.created_at.timestamp())
        .execute(&self.pool)
        .await
        .map_err(db_error("Failed to create device session"))?;

        Ok(session)
    }

    async fn find_by_id(&self, id: &DeviceSessionId) -> Result<Option<DeviceSession>, Error> {
        let row = sqlx::query_as::<_, SqliteDeviceSession>(&format!(
            "SELECT {SESSION_COLUMNS} FROM user_sessions WHERE id = ?1"
        ))
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error("Failed to find device session"))?;

        row.map(DeviceSession::try_from).transpose()
    }

    async fn find_active_for_device(
        &self,
        user_id: &UserId,
        device: &DeviceInfo,
        ip_address: Option<&str>,
    ) -> Result<Option<DeviceSession>, Error> {
        // IS compares NULL addresses as equal
        let row = sqlx::query_as::<_, SqliteDeviceSession>(&format!(
            r#"
            SELECT {SESSION_COLUMNS} FROM user_sessions
            WHERE user_id = ?1
              AND device_name = ?2
              AND browser = ?3
              AND os = ?4
              AND ip_address IS ?5
              AND revoked_at IS NULL
            ORDER BY last_active_at DESC
            LIMIT 1
            "#
        ))
        .bind(user_id.as_str())
        .bind(&device.device_name)
        .bind(&device.browser)
        .bind(&device.os)
        .bind(ip_address)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error("Failed to find device session"))?;

        row.map(DeviceSession::try_from).transpose()
    }

    async fn touch(&self, id: &DeviceSessionId, at: DateTime<Utc>) -> Result<(), Error> {
        sqlx::query("UPDATE user_sessions SET last_active_at = ?1 WHERE id = ?2")
            .bind(at.timestamp())
            .bind(id.as_str())
            .execute(&self.pool)
            .await
            .map_err(db_error("Failed to update device session"))?;

        Ok(())
    }

    async fn mark_current(&self, user_id: &UserId, id: &DeviceSessionId) -> Result<(), Error> {
        sqlx::query("UPDATE user_sessions SET is_current = (id = ?2) WHERE user_id = ?1")
            .bind(user_id.as_str())
            .bind(id.as_str())
            .execute(&self.pool)
            .await
            .map_err(db_error("Failed to mark current device session"))?;

        Ok(())
    }

    async fn list_active(&self, user_id: &UserId) -> Result<Vec<DeviceSession>, Error> {
        let rows = sqlx::query_as::<_, SqliteDeviceSession>(&format!(
            r#"
            SELECT {SESSION_COLUMNS} FROM user_sessions
            WHERE user_id = ?1 AND revoked_at IS NULL
            ORDER BY last_active_at DESC, rowid DESC
            "#
        ))
        .bind(user_id.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(db_error("Failed to list device sessions"))?;

        rows.into_iter().map(DeviceSession::try_from).collect()
    }

    async fn revoke(
        &self,
        user_id: &UserId,
        id: &DeviceSessionId,
        at: DateTime<Utc>,
    ) -> Result<bool, Error> {
        let result = sqlx::query(
            r#"
            UPDATE user_sessions
            SET revoked_at = ?1, is_current = 0
            WHERE id = ?2 AND user_id = ?3 AND revoked_at IS NULL
            "#,
        )
        .bind(at.timestamp())
        .bind(id.as_str())
        .bind(user_id.as_str())
        .execute(&self.pool)
        .await
        .map_err(db_error("Failed to revoke device session"))?;

        Ok(result.rows_affected() == 1)
    }
}
