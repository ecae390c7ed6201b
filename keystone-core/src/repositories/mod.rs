//! Repository traits for the data access layer
//!
//! # Trait Hierarchy
//!
//! - Individual `*Repository` traits define the operations for each data domain
//! - Individual `*RepositoryProvider` traits give access to each repository type
//! - [`RepositoryProvider`] combines all provider traits plus lifecycle methods
//!
//! Services are generic over the individual repository traits; the `keystone`
//! crate connects them to one provider through the adapters in [`adapter`].

pub mod adapter;
pub mod audit;
pub mod brute_force;
pub mod device_session;
pub mod password;
pub mod rate_limit;
pub mod session;
pub mod user;

pub use adapter::{
    AuditRepositoryAdapter, BruteForceProtectionRepositoryAdapter,
    DeviceSessionRepositoryAdapter, PasswordRepositoryAdapter, RateLimitRepositoryAdapter,
    SessionRepositoryAdapter, UserRepositoryAdapter,
};
pub use audit::AuditRepository;
pub use brute_force::BruteForceProtectionRepository;
pub use device_session::DeviceSessionRepository;
pub use password::PasswordRepository;
pub use rate_limit::RateLimitRepository;
pub use session::SessionRepository;
pub use user::UserRepository;

use async_trait::async_trait;

use crate::Error;

// ============================================================================
// Individual Repository Provider Traits
// ============================================================================

/// Provider trait for user repository access.
pub trait UserRepositoryProvider: Send + Sync + 'static {
    /// The user repository implementation type
    type UserRepo: UserRepository;

    /// Get the user repository
    fn user(&self) -> &Self::UserRepo;
}

/// Provider trait for password hash access.
pub trait PasswordRepositoryProvider: Send + Sync + 'static {
    type PasswordRepo: PasswordRepository;

    fn password(&self) -> &Self::PasswordRepo;
}

/// Provider trait for authentication session access.
pub trait SessionRepositoryProvider: Send + Sync + 'static {
    type SessionRepo: SessionRepository;

    fn session(&self) -> &Self::SessionRepo;
}

/// Provider trait for rate-limit counters.
pub trait RateLimitRepositoryProvider: Send + Sync + 'static {
    type RateLimitRepo: RateLimitRepository;

    fn rate_limit(&self) -> &Self::RateLimitRepo;
}

/// Provider trait for brute force protection repository access.
pub trait BruteForceRepositoryProvider: Send + Sync + 'static {
    /// The brute force protection repository implementation type
    type BruteForceRepo: BruteForceProtectionRepository;

    /// Get the brute force protection repository
    fn brute_force(&self) -> &Self::BruteForceRepo;
}

/// Provider trait for the audit log.
pub trait AuditRepositoryProvider: Send + Sync + 'static {
    type AuditRepo: AuditRepository;

    fn audit(&self) -> &Self::AuditRepo;
}

/// Provider trait for the device session registry.
pub trait DeviceSessionRepositoryProvider: Send + Sync + 'static {
    type DeviceSessionRepo: DeviceSessionRepository;

    fn device_session(&self) -> &Self::DeviceSessionRepo;
}

// ============================================================================
// Unified Repository Provider Trait
// ============================================================================

/// Provider trait that storage implementations must implement to provide all repositories.
///
/// # Implementing a Custom Storage Backend
///
/// 1. Implement each individual `*Repository` trait for your backend
/// 2. Implement each individual `*RepositoryProvider` trait
/// 3. Implement `RepositoryProvider` with `migrate()` and `health_check()`
///
/// ```rust,ignore
/// use keystone_core::repositories::*;
///
/// struct MyStorage { /* ... */ }
///
/// impl UserRepositoryProvider for MyStorage {
///     type UserRepo = MyUserRepository;
///     fn user(&self) -> &Self::UserRepo { &self.user_repo }
/// }
///
/// // ... implement other provider traits ...
///
/// #[async_trait]
/// impl RepositoryProvider for MyStorage {
///     async fn migrate(&self) -> Result<(), Error> { /* ... */ }
///     async fn health_check(&self) -> Result<(), Error> { /* ... */ }
/// }
/// ```
#[async_trait]
pub trait RepositoryProvider:
    UserRepositoryProvider
    + PasswordRepositoryProvider
    + SessionRepositoryProvider
    + RateLimitRepositoryProvider
    + BruteForceRepositoryProvider
    + AuditRepositoryProvider
    + DeviceSessionRepositoryProvider
{
    /// Run migrations for all repositories
    async fn migrate(&self) -> Result<(), Error>;

    /// Health check for all repositories
    async fn health_check(&self) -> Result<(), Error>;
}
