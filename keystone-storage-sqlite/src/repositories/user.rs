use async_trait::async_trait;
use chrono::Utc;
use keystone_core::{
    Error, NewUser, TwoFactorCredential, User, UserId, error::StorageError,
    repositories::UserRepository,
};
use sqlx::SqlitePool;

use crate::{db_error, from_timestamp};

pub struct SqliteUserRepository {
    pool: SqlitePool,
}

impl SqliteUserRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
struct SqliteUser {
    id: String,
    email: String,
    name: Option<String>,
    email_verified_at: Option<i64>,
    two_factor_enabled: bool,
    two_factor_secret: Option<String>,
    backup_codes: String,
    created_at: i64,
    updated_at: i64,
}

impl TryFrom<SqliteUser> for User {
    type Error = Error;

    fn try_from(row: SqliteUser) -> Result<Self, Self::Error> {
        let backup_codes: Vec<String> = serde_json::from_str(&row.backup_codes)
            .map_err(|e| StorageError::Database(format!("Corrupt backup codes: {e}")))?;

        Ok(User {
            id: UserId::new(&row.id),
            name: row.name,
            email: row.email,
            email_verified_at: row.email_verified_at.map(from_timestamp).transpose()?,
            two_factor_enabled: row.two_factor_enabled,
            two_factor_secret: row.two_factor_secret,
            backup_codes,
            created_at: from_timestamp(row.created_at)?,
            updated_at: from_timestamp(row.updated_at)?,
        })
    }
}

const USER_COLUMNS: &str = "id, email, name, email_verified_at, two_factor_enabled, two_factor_secret, backup_codes, created_at, updated_at";

fn encode_codes(codes: &[String]) -> Result<String, Error> {
    serde_json::to_string(codes)
        .map_err(|e| StorageError::Database(format!("Failed to encode backup codes: {e}")).into())
}

#[async_trait]
impl UserRepository for SqliteUserRepository {
    async fn create(&self, user: NewUser) -> Result<User, Error> {
        let now = Utc::now().timestamp();

        let row = sqlx::query_as::<_, SqliteUser>(&format!(
            r#"
            INSERT INTO users (id, email, name, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?4)
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(user.id.as_str())
        .bind(&user.email)
        .bind(&user.name)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(db_error("Failed to create user"))?;

        row.try_into()
    }

    async fn find_by_id(&self, id: &UserId) -> Result<Option<User>, Error> {
        let row = sqlx::query_as::<_, SqliteUser>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = ?1"
        ))
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error("Failed to find user"))?;

        row.map(User::try_from).transpose()
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, Error> {
        let row = sqlx::query_as::<_, SqliteUser>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = ?1"
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error("Failed to find user"))?;

        row.map(User::try_from).transpose()
    }

    async fn delete(&self, id: &UserId) -> Result<(), Error> {
        sqlx::query("DELETE FROM users WHERE id = ?1")
            .bind(id.as_str())
            .execute(&self.pool)
            .await
            .map_err(db_error("Failed to delete user"))?;

        Ok(())
    }

    async fn set_two_factor(
        &self,
        user_id: &UserId,
        credential: &TwoFactorCredential,
    ) -> Result<(), Error> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET two_factor_enabled = ?1, two_factor_secret = ?2, backup_codes = ?3, updated_at = ?4
            WHERE id = ?5
            "#,
        )
        .bind(credential.enabled)
        .bind(&credential.secret)
        .bind(encode_codes(&credential.backup_codes)?)
        .bind(Utc::now().timestamp())
        .bind(user_id.as_str())
        .execute(&self.pool)
        .await
        .map_err(db_error("Failed to update two-factor settings"))?;

        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound.into());
        }
        Ok(())
    }

    async fn replace_backup_codes(
        &self,
        user_id: &UserId,
        expected: &[String],
        replacement: &[String],
    ) -> Result<bool, Error> {
        // codes are always written through encode_codes, so the text compares exactly
        let result = sqlx::query(
            r#"
            UPDATE users
            SET backup_codes = ?1, updated_at = ?2
            WHERE id = ?3 AND two_factor_enabled = 1 AND backup_codes = ?4
            "#,
        )
        .bind(encode_codes(replacement)?)
        .bind(Utc::now().timestamp())
        .bind(user_id.as_str())
        .bind(encode_codes(expected)?)
        .execute(&self.pool)
        .await
        .map_err(db_error("Failed to update backup codes"))?;

        Ok(result.rows_affected() == 1)
    }
}
