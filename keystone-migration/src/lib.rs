//! Schema migration traits shared by the keystone storage backends.
//!
//! Each backend implements [`MigrationManager`] for its database and ships an
//! ordered list of [`Migration`]s. Applied versions are tracked in a
//! bookkeeping table so that `up` is idempotent across restarts.

use async_trait::async_trait;
use sqlx::Database;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("Migration failed: {0}")]
    Migration(String),
    #[error("Migrations out of order: version {current} follows {previous}")]
    OutOfOrder { previous: i64, current: i64 },
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

pub type Result<T> = std::result::Result<T, MigrationError>;

#[async_trait]
pub trait Migration<DB: Database>: Send + Sync {
    /// Apply the schema change
    async fn up<'a>(&'a self, conn: &'a mut <DB as Database>::Connection) -> Result<()>;

    /// Revert the schema change
    async fn down<'a>(&'a self, conn: &'a mut <DB as Database>::Connection) -> Result<()>;

    /// Unique, strictly increasing version number
    fn version(&self) -> i64;

    /// Human readable name of the migration
    fn name(&self) -> &str;
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct MigrationRecord {
    pub version: i64,
    pub name: String,
    pub applied_at: i64, // unix seconds
}

/// Check that migration versions are strictly increasing.
///
/// Managers call this before applying anything so a misordered list fails
/// fast instead of leaving the schema half-migrated.
pub fn ensure_ordered<DB: Database>(migrations: &[Box<dyn Migration<DB>>]) -> Result<()> {
    for pair in migrations.windows(2) {
        let (previous, current) = (pair[0].version(), pair[1].version());
        if current <= previous {
            return Err(MigrationError::OutOfOrder { previous, current });
        }
    }
    Ok(())
}

#[async_trait]
pub trait MigrationManager<DB: Database>: Send + Sync {
    fn get_migration_table_name(&self) -> &str {
        "_keystone_migrations"
    }

    /// Create the bookkeeping table if needed
    async fn initialize(&self) -> Result<()>;

    /// Apply pending migrations in order
    async fn up(&self, migrations: &[Box<dyn Migration<DB>>]) -> Result<()>;

    /// Roll back applied migrations, newest first
    async fn down(&self, migrations: &[Box<dyn Migration<DB>>]) -> Result<()>;

    /// List applied migrations
    async fn get_applied_migrations(&self) -> Result<Vec<MigrationRecord>>;

    /// Check whether a specific version was applied
    async fn is_applied(&self, version: i64) -> Result<bool>;
}
