//! The identity platform seam
//!
//! Password storage and credential checks belong to the identity platform.
//! The security services only ever talk to it through this trait.

use async_trait::async_trait;

use crate::{Error, User, UserId};

#[async_trait]
pub trait IdentityProvider: Send + Sync + 'static {
    /// Check an email and password pair.
    ///
    /// Fails with `AuthError::InvalidCredentials` without revealing whether the
    /// account exists.
    async fn verify_credentials(&self, email: &str, password: &str) -> Result<User, Error>;

    /// Re-check the password of a known user before a sensitive change.
    async fn verify_password(&self, user_id: &UserId, password: &str) -> Result<bool, Error>;

    /// Create an account.
    async fn register(&self, email: &str, password: &str) -> Result<User, Error>;
}
