use async_trait::async_trait;
use chrono::Utc;
use keystone_core::{
    DeviceSessionId, Error, Session, UserId,
    crypto::verify_token_hash,
    repositories::SessionRepository,
    session::{SessionToken, TwoFactorChallenge},
};
use sqlx::SqlitePool;

use crate::{db_error, from_timestamp};

pub struct SqliteSessionRepository {
    pool: SqlitePool,
}

impl SqliteSessionRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
struct SqliteSession {
    token: String, // the hash, never the plaintext
    user_id: String,
    user_agent: Option<String>,
    ip_address: Option<String>,
    device_session_id: Option<String>,
    created_at: i64,
    updated_at: i64,
    expires_at: i64,
}

#[derive(Debug, Clone, sqlx::FromRow)]
struct SqliteChallenge {
    token: String, // the hash, never the plaintext
    user_id: String,
    created_at: i64,
    expires_at: i64,
}

#[async_trait]
impl SessionRepository for SqliteSessionRepository {
    async fn create(&self, session: Session) -> Result<Session, Error> {
        sqlx::query(
            r#"
            INSERT INTO sessions (token, user_id, user_agent, ip_address, device_session_id, created_at, updated_at, expires_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )
        .bind(session.token.hash())
        .bind(session.user_id.as_str())
        .bind(&session.user_agent)
        .bind(&session.ip_address)
        .bind(session.device_session_id.as_ref().map(|id| id.as_str()))
        .bind(session.created_at.timestamp())
        .bind(session.updated_at.timestamp())
        .bind(session.expires_at.timestamp())
        .execute(&self.pool)
        .await
        .map_err(db_error("Failed to create session"))?;

        // the caller keeps the plaintext token
        Ok(session)
    }

    async fn find_by_token(&self, token: &SessionToken) -> Result<Option<Session>, Error> {
        let row = sqlx::query_as::<_, SqliteSession>(
            r#"
            SELECT token, user_id, user_agent, ip_address, device_session_id, created_at, updated_at, expires_at
            FROM sessions
            WHERE token = ?1
            "#,
        )
        .bind(token.hash())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error("Failed to find session"))?;

        let Some(row) = row else {
            return Ok(None);
        };

        if !verify_token_hash(token.as_str(), &row.token) {
            return Ok(None);
        }

        Ok(Some(Session {
            token: token.clone(),
            user_id: UserId::new(&row.user_id),
            user_agent: row.user_agent,
            ip_address: row.ip_address,
            created_at: from_timestamp(row.created_at)?,
            updated_at: from_timestamp(row.updated_at)?,
            expires_at: from_timestamp(row.expires_at)?,
            device_session_id: row.device_session_id.map(DeviceSessionId::from),
        }))
    }

    async fn delete(&self, token: &SessionToken) -> Result<(), Error> {
        sqlx::query("DELETE FROM sessions WHERE token = ?1")
            .bind(token.hash())
            .execute(&self.pool)
            .await
            .map_err(db_error("Failed to delete session"))?;

        Ok(())
    }

    async fn delete_by_user_id(&self, user_id: &UserId) -> Result<(), Error> {
        sqlx::query("DELETE FROM sessions WHERE user_id = ?1")
            .bind(user_id.as_str())
            .execute(&self.pool)
            .await
            .map_err(db_error("Failed to delete sessions"))?;

        Ok(())
    }

    async fn delete_by_device_session(&self, id: &DeviceSessionId) -> Result<u64, Error> {
        let result = sqlx::query("DELETE FROM sessions WHERE device_session_id = ?1")
            .bind(id.as_str())
            .execute(&self.pool)
            .await
            .map_err(db_error("Failed to delete device sessions"))?;

        Ok(result.rows_affected())
    }

    async fn create_challenge(
        &self,
        challenge: TwoFactorChallenge,
    ) -> Result<TwoFactorChallenge, Error> {
        sqlx::query(
            r#"
            INSERT INTO two_factor_challenges (token, user_id, created_at, expires_at)
            VALUES (?1, ?2, ?3, ?4)
            "#,
        )
        .bind(challenge.token.hash())
        .bind(challenge.user_id.as_str())
        .bind(challenge.created_at.timestamp())
        .bind(challenge.expires_at.timestamp())
        .execute(&self.pool)
        .await
        .map_err(db_error("Failed to create two-factor challenge"))?;

        Ok(challenge)
    }

    async fn find_challenge(
        &self,
        token: &SessionToken,
    ) -> Result<Option<TwoFactorChallenge>, Error> {
        let row = sqlx::query_as::<_, SqliteChallenge>(
            r#"
            SELECT token, user_id, created_at, expires_at
            FROM two_factor_challenges
            WHERE token = ?1
            "#,
        )
        .bind(token.hash())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error("Failed to find two-factor challenge"))?;

        let Some(row) = row else {
            return Ok(None);
        };

        if !verify_token_hash(token.as_str(), &row.token) {
            return Ok(None);
        }

        Ok(Some(TwoFactorChallenge {
            token: token.clone(),
            user_id: UserId::new(&row.user_id),
            created_at: from_timestamp(row.created_at)?,
            expires_at: from_timestamp(row.expires_at)?,
        }))
    }

    async fn consume_challenge(&self, token: &SessionToken) -> Result<bool, Error> {
        let result = sqlx::query("DELETE FROM two_factor_challenges WHERE token = ?1")
            .bind(token.hash())
            .execute(&self.pool)
            .await
            .map_err(db_error("Failed to consume two-factor challenge"))?;

        Ok(result.rows_affected() == 1)
    }

    async fn cleanup_expired(&self) -> Result<u64, Error> {
        let now = Utc::now().timestamp();

        let sessions = sqlx::query("DELETE FROM sessions WHERE expires_at < ?1")
            .bind(now)
            .execute(&self.pool)
            .await
            .map_err(db_error("Failed to clean up expired sessions"))?;

        let challenges = sqlx::query("DELETE FROM two_factor_challenges WHERE expires_at < ?1")
            .bind(now)
            .execute(&self.pool)
            .await
            .map_err(db_error("Failed to clean up expired two-factor challenges"))?;

        Ok(sessions.rows_affected() + challenges.rows_affected())
    }
}
