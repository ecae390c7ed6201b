use crate::{Error, NewUser, TwoFactorCredential, User, UserId};
use async_trait::async_trait;

/// Repository for user data access
#[async_trait]
pub trait UserRepository: Send + Sync + 'static {
    /// Create a new user
    async fn create(&self, user: NewUser) -> Result<User, Error>;

    /// Find a user by ID
    async fn find_by_id(&self, id: &UserId) -> Result<Option<User>, Error>;

    /// Find a user by email
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, Error>;

    /// Delete a user by ID
    async fn delete(&self, id: &UserId) -> Result<(), Error>;

    /// Overwrite the two-factor fields of a user
    async fn set_two_factor(
        &self,
        user_id: &UserId,
        credential: &TwoFactorCredential,
    ) -> Result<(), Error>;

    /// Replace the stored backup code hashes only if they still equal `expected`.
    ///
    /// Returns `false` when another writer changed the list first.
    async fn replace_backup_codes(
        &self,
        user_id: &UserId,
        expected: &[String],
        replacement: &[String],
    ) -> Result<bool, Error>;
}
