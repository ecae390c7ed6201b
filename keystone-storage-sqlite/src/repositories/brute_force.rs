//! SQLite implementation of the brute force protection repository.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use keystone_core::{
    Error,
    brute_force::{AttemptStats, FailedLoginAttempt},
    repositories::BruteForceProtectionRepository,
};
use sqlx::SqlitePool;

use crate::{db_error, from_timestamp};

/// SQLite repository for brute force protection data.
pub struct SqliteBruteForceRepository {
    pool: SqlitePool,
}

impl SqliteBruteForceRepository {
    /// Create a new SQLite brute force repository.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct SqliteFailedLoginAttempt {
    id: i64,
    email: String,
    ip_address: Option<String>,
    user_agent: Option<String>,
    attempted_at: i64,
}

impl TryFrom<SqliteFailedLoginAttempt> for FailedLoginAttempt {
    type Error = Error;

    fn try_from(row: SqliteFailedLoginAttempt) -> Result<Self, Self::Error> {
        Ok(FailedLoginAttempt {
            id: row.id,
            email: row.email,
            ip_address: row.ip_address,
            user_agent: row.user_agent,
            attempted_at: from_timestamp(row.attempted_at)?,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct SqliteAttemptStats {
    count: i64,
    latest_at: Option<i64>,
}

#[async_trait]
impl BruteForceProtectionRepository for SqliteBruteForceRepository {
    async fn record_failed_attempt(
        &self,
        email: &str,
        ip_address: Option<&str>,
        user_agent: Option<&str>,
    ) -> Result<FailedLoginAttempt, Error> {
        let row = sqlx::query_as::<_, SqliteFailedLoginAttempt>(
            r#"
            INSERT INTO failed_login_attempts (email, ip_address, user_agent, attempted_at)
            VALUES (?1, ?2, ?3, ?4)
            RETURNING id, email, ip_address, user_agent, attempted_at
            "#,
        )
        .bind(email)
        .bind(ip_address)
        .bind(user_agent)
        .bind(Utc::now().timestamp())
        .fetch_one(&self.pool)
        .await
        .map_err(db_error("Failed to record failed login attempt"))?;

        row.try_into()
    }

    async fn get_attempt_stats(
        &self,
        email: &str,
        since: DateTime<Utc>,
    ) -> Result<AttemptStats, Error> {
        let row = sqlx::query_as::<_, SqliteAttemptStats>(
            r#"
            SELECT
                COUNT(*) AS count,
                MAX(attempted_at) AS latest_at
            FROM failed_login_attempts
            WHERE email = ?1 AND attempted_at >= ?2
            "#,
        )
        .bind(email)
        .bind(since.timestamp())
        .fetch_one(&self.pool)
        .await
        .map_err(db_error("Failed to get attempt stats"))?;

        Ok(AttemptStats {
            count: u32::try_from(row.count).unwrap_or(u32::MAX),
            latest_at: row.latest_at.map(from_timestamp).transpose()?,
        })
    }

    async fn clear_attempts(&self, email: &str) -> Result<u64, Error> {
        let result = sqlx::query("DELETE FROM failed_login_attempts WHERE email = ?1")
            .bind(email)
            .execute(&self.pool)
            .await
            .map_err(db_error("Failed to clear attempts"))?;

        Ok(result.rows_affected())
    }

    async fn cleanup_old_attempts(&self, before: DateTime<Utc>) -> Result<u64, Error> {
        let result = sqlx::query("DELETE FROM failed_login_attempts WHERE attempted_at < ?1")
            .bind(before.timestamp())
            .execute(&self.pool)
            .await
            .map_err(db_error("Failed to clean up old attempts"))?;

        Ok(result.rows_affected())
    }
}
