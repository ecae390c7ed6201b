//! Builder pattern for constructing Keystone instances
//!
//! The builder only offers [`build`](KeystoneBuilder::build) once storage has
//! been configured.
//!
//! ```rust,no_run
//! use keystone::KeystoneBuilder;
//! use chrono::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let keystone = KeystoneBuilder::new()
//!         .with_sqlite("sqlite://keystone.db")
//!         .await?
//!         .with_session_expiry(Duration::days(7))
//!         .apply_migrations(true)
//!         .build()
//!         .await?;
//!
//!     keystone.health_check().await?;
//!     Ok(())
//! }
//! ```

use std::sync::Arc;

use chrono::Duration;
use keystone_core::{BruteForceProtectionConfig, IdentityProvider, TotpConfig};

use crate::{FailurePolicy, Keystone, KeystoneConfig, RepositoryProvider};

/// Errors that can occur when building a Keystone instance.
#[derive(Debug, thiserror::Error)]
pub enum KeystoneBuilderError {
    /// Failed to connect to storage backend
    #[error("Storage connection failed: {0}")]
    StorageConnection(String),

    /// Failed to run database migrations
    #[error("Migration failed: {0}")]
    Migration(String),
}

/// Marker type indicating no storage has been configured yet.
pub struct NoStorage;

/// Marker type indicating storage has been configured.
pub struct WithStorage<R: RepositoryProvider> {
    repositories: Arc<R>,
}

pub struct KeystoneBuilder<Storage> {
    storage: Storage,
    config: KeystoneConfig,
    identity: Option<Arc<dyn IdentityProvider>>,
    apply_migrations: bool,
}

impl Default for KeystoneBuilder<NoStorage> {
    fn default() -> Self {
        Self::new()
    }
}

impl KeystoneBuilder<NoStorage> {
    /// Create a new builder with default configuration.
    ///
    /// # Defaults
    ///
    /// - Session expiry: 30 days
    /// - Brute-force protection: lockout after 5 failures
    /// - Rate limiter: fails open
    /// - Migrations: not applied automatically
    pub fn new() -> Self {
        Self {
            storage: NoStorage,
            config: KeystoneConfig::default(),
            identity: None,
            apply_migrations: false,
        }
    }

    /// Use an existing repository provider.
    pub fn with_repositories<R: RepositoryProvider>(
        self,
        repositories: Arc<R>,
    ) -> KeystoneBuilder<WithStorage<R>> {
        KeystoneBuilder {
            storage: WithStorage { repositories },
            config: self.config,
            identity: self.identity,
            apply_migrations: self.apply_migrations,
        }
    }
}

#[cfg(feature = "sqlite")]
impl KeystoneBuilder<NoStorage> {
    /// Connect to a SQLite database, creating the file if needed.
    pub async fn with_sqlite(
        self,
        url: &str,
    ) -> Result<KeystoneBuilder<WithStorage<crate::SqliteRepositoryProvider>>, KeystoneBuilderError>
    {
        let repositories = crate::SqliteRepositoryProvider::connect(url)
            .await
            .map_err(|e| KeystoneBuilderError::StorageConnection(e.to_string()))?;

        Ok(self.with_repositories(Arc::new(repositories)))
    }

    /// Use an existing SQLite pool.
    pub fn with_sqlite_pool(
        self,
        pool: sqlx::SqlitePool,
    ) -> KeystoneBuilder<WithStorage<crate::SqliteRepositoryProvider>> {
        self.with_repositories(Arc::new(crate::SqliteRepositoryProvider::new(pool)))
    }
}

impl<R: RepositoryProvider> KeystoneBuilder<WithStorage<R>> {
    pub fn with_config(mut self, config: KeystoneConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_session_expiry(mut self, duration: Duration) -> Self {
        self.config.session.expires_in = duration;
        self
    }

    pub fn with_brute_force_protection(mut self, config: BruteForceProtectionConfig) -> Self {
        self.config.brute_force = config;
        self
    }

    pub fn with_totp(mut self, config: TotpConfig) -> Self {
        self.config.totp = config;
        self
    }

    pub fn with_failure_policy(mut self, failure_policy: FailurePolicy) -> Self {
        self.config.failure_policy = failure_policy;
        self
    }

    /// Check credentials with an external identity platform instead of the
    /// password hashes in the store.
    pub fn with_identity_provider(mut self, identity: Arc<dyn IdentityProvider>) -> Self {
        self.identity = Some(identity);
        self
    }

    /// Run migrations in [`build`](Self::build).
    pub fn apply_migrations(mut self, apply: bool) -> Self {
        self.apply_migrations = apply;
        self
    }

    pub async fn build(self) -> Result<Keystone<R>, KeystoneBuilderError> {
        let repositories = self.storage.repositories;

        if self.apply_migrations {
            repositories
                .migrate()
                .await
                .map_err(|e| KeystoneBuilderError::Migration(e.to_string()))?;
        }

        Ok(match self.identity {
            Some(identity) => Keystone::with_identity_provider(repositories, self.config, identity),
            None => Keystone::with_config(repositories, self.config),
        })
    }
}
