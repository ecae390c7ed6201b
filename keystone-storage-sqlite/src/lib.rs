//! SQLite storage backend for keystone
//!
//! [`SqliteRepositoryProvider`] implements every repository trait of
//! `keystone-core` over one [`SqlitePool`]. Timestamps are stored as unix
//! seconds, except the rate-limit windows which are stored in milliseconds.
//!
//! ```rust,no_run
//! use keystone_core::repositories::RepositoryProvider;
//! use keystone_storage_sqlite::SqliteRepositoryProvider;
//!
//! # async fn run() -> Result<(), keystone_core::Error> {
//! let provider = SqliteRepositoryProvider::connect("sqlite://keystone.db").await?;
//! provider.migrate().await?;
//! # Ok(())
//! # }
//! ```

pub mod migrations;
pub mod repositories;

pub use repositories::{
    SqliteAuditRepository, SqliteBruteForceRepository, SqliteDeviceSessionRepository,
    SqlitePasswordRepository, SqliteRateLimitRepository, SqliteSessionRepository,
    SqliteUserRepository,
};

use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use keystone_core::{
    Error,
    error::StorageError,
    repositories::{
        AuditRepositoryProvider, BruteForceRepositoryProvider, DeviceSessionRepositoryProvider,
        PasswordRepositoryProvider, RateLimitRepositoryProvider, RepositoryProvider,
        SessionRepositoryProvider, UserRepositoryProvider,
    },
};
use keystone_migration::MigrationManager;
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};

use crate::migrations::SqliteMigrationManager;

/// Repository provider implementation for SQLite
///
/// This struct implements all the individual repository provider traits
/// as well as the unified `RepositoryProvider` trait.
pub struct SqliteRepositoryProvider {
    pool: SqlitePool,
    user: Arc<SqliteUserRepository>,
    password: Arc<SqlitePasswordRepository>,
    session: Arc<SqliteSessionRepository>,
    rate_limit: Arc<SqliteRateLimitRepository>,
    brute_force: Arc<SqliteBruteForceRepository>,
    audit: Arc<SqliteAuditRepository>,
    device_session: Arc<SqliteDeviceSessionRepository>,
}

impl SqliteRepositoryProvider {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            user: Arc::new(SqliteUserRepository::new(pool.clone())),
            password: Arc::new(SqlitePasswordRepository::new(pool.clone())),
            session: Arc::new(SqliteSessionRepository::new(pool.clone())),
            rate_limit: Arc::new(SqliteRateLimitRepository::new(pool.clone())),
            brute_force: Arc::new(SqliteBruteForceRepository::new(pool.clone())),
            audit: Arc::new(SqliteAuditRepository::new(pool.clone())),
            device_session: Arc::new(SqliteDeviceSessionRepository::new(pool.clone())),
            pool,
        }
    }

    /// Open a pool for `url`, creating the database file if it does not exist.
    ///
    /// In-memory databases get a single connection so every query sees the
    /// same database.
    pub async fn connect(url: &str) -> Result<Self, Error> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(|e| StorageError::Connection(e.to_string()))?
            .create_if_missing(true)
            .foreign_keys(true);

        let pool_options = if url.contains(":memory:") {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(8)
        };

        let pool = pool_options
            .connect_with(options)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Failed to connect to SQLite");
                StorageError::Connection(e.to_string())
            })?;

        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

impl UserRepositoryProvider for SqliteRepositoryProvider {
    type UserRepo = SqliteUserRepository;

    fn user(&self) -> &Self::UserRepo {
        &self.user
    }
}

impl PasswordRepositoryProvider for SqliteRepositoryProvider {
    type PasswordRepo = SqlitePasswordRepository;

    fn password(&self) -> &Self::PasswordRepo {
        &self.password
    }
}

impl SessionRepositoryProvider for SqliteRepositoryProvider {
    type SessionRepo = SqliteSessionRepository;

    fn session(&self) -> &Self::SessionRepo {
        &self.session
    }
}

impl RateLimitRepositoryProvider for SqliteRepositoryProvider {
    type RateLimitRepo = SqliteRateLimitRepository;

    fn rate_limit(&self) -> &Self::RateLimitRepo {
        &self.rate_limit
    }
}

impl BruteForceRepositoryProvider for SqliteRepositoryProvider {
    type BruteForceRepo = SqliteBruteForceRepository;

    fn brute_force(&self) -> &Self::BruteForceRepo {
        &self.brute_force
    }
}

impl AuditRepositoryProvider for SqliteRepositoryProvider {
    type AuditRepo = SqliteAuditRepository;

    fn audit(&self) -> &Self::AuditRepo {
        &self.audit
    }
}

impl DeviceSessionRepositoryProvider for SqliteRepositoryProvider {
    type DeviceSessionRepo = SqliteDeviceSessionRepository;

    fn device_session(&self) -> &Self::DeviceSessionRepo {
        &self.device_session
    }
}

#[async_trait]
impl RepositoryProvider for SqliteRepositoryProvider {
    async fn migrate(&self) -> Result<(), Error> {
        let manager = SqliteMigrationManager::new(self.pool.clone());
        manager.initialize().await.map_err(|e| {
            tracing::error!(error = %e, "Failed to initialize migrations");
            StorageError::Migration("Failed to initialize migrations".to_string())
        })?;

        manager.up(&migrations::all()).await.map_err(|e| {
            tracing::error!(error = %e, "Failed to run migrations");
            StorageError::Migration("Failed to run migrations".to_string())
        })?;

        Ok(())
    }

    async fn health_check(&self) -> Result<(), Error> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::Database(e.to_string()))?;
        Ok(())
    }
}

/// Map a query failure, logging it with `context`.
pub(crate) fn db_error(context: &'static str) -> impl FnOnce(sqlx::Error) -> Error {
    move |e| {
        tracing::error!(error = %e, "{context}");
        match &e {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                StorageError::Constraint(db.message().to_string()).into()
            }
            _ => StorageError::Database(context.to_string()).into(),
        }
    }
}

pub(crate) fn from_timestamp(secs: i64) -> Result<DateTime<Utc>, Error> {
    DateTime::from_timestamp(secs, 0)
        .ok_or_else(|| StorageError::Database(format!("Invalid timestamp {secs}")).into())
}

pub(crate) fn from_timestamp_millis(millis: i64) -> Result<DateTime<Utc>, Error> {
    DateTime::from_timestamp_millis(millis)
        .ok_or_else(|| StorageError::Database(format!("Invalid timestamp {millis}ms")).into())
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    pub async fn provider() -> SqliteRepositoryProvider {
        let provider = SqliteRepositoryProvider::connect("sqlite::memory:")
            .await
            .expect("Failed to open in-memory database");
        provider.migrate().await.expect("Failed to run migrations");
        provider
    }

    /// Insert a bare user row so foreign keys are satisfied.
    pub async fn insert_user(pool: &SqlitePool, id: &str, email: &str) {
        sqlx::query("INSERT INTO users (id, email, created_at, updated_at) VALUES (?, ?, ?, ?)")
            .bind(id)
            .bind(email)
            .bind(Utc::now().timestamp())
            .bind(Utc::now().timestamp())
            .execute(pool)
            .await
            .expect("Failed to create test user");
    }
}
