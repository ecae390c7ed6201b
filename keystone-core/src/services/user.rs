use crate::{
    Error, NewUser, User, UserId,
    error::AuthError,
    repositories::UserRepository,
    validation::{normalize_email, validate_email},
};
use std::sync::Arc;

/// Service for user management operations
pub struct UserService<R: UserRepository> {
    repository: Arc<R>,
}

impl<R: UserRepository> UserService<R> {
    /// Create a new UserService with the given repository
    pub fn new(repository: Arc<R>) -> Self {
        Self { repository }
    }

    /// Create a new user
    pub async fn create_user(&self, email: &str, name: Option<String>) -> Result<User, Error> {
        let email = normalize_email(email);
        validate_email(&email)?;

        self.repository
            .create(NewUser::new(&email).with_name(name))
            .await
    }

    /// Get a user by ID
    pub async fn get_user(&self, user_id: &UserId) -> Result<Option<User>, Error> {
        self.repository.find_by_id(user_id).await
    }

    /// Get a user by ID, failing if it does not exist
    pub async fn require_user(&self, user_id: &UserId) -> Result<User, Error> {
        self.repository
            .find_by_id(user_id)
            .await?
            .ok_or(Error::Auth(AuthError::UserNotFound))
    }

    /// Get a user by email
    pub async fn get_user_by_email(&self, email: &str) -> Result<Option<User>, Error> {
        self.repository.find_by_email(&normalize_email(email)).await
    }

    /// Delete a user
    pub async fn delete_user(&self, user_id: &UserId) -> Result<(), Error> {
        self.repository.delete(user_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{error::ValidationError, services::mock::MockUserRepository};

    #[tokio::test]
    async fn test_create_user_normalizes_email() {
        let service = UserService::new(Arc::new(MockUserRepository::default()));

        let user = service
            .create_user(" Alice@Example.com ", Some("Alice".to_string()))
            .await
            .unwrap();
        assert_eq!(user.email, "alice@example.com");
        assert!(user.id.is_valid());

        let found = service
            .get_user_by_email("ALICE@example.com")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.id, user.id);
    }

    #[tokio::test]
    async fn test_create_user_rejects_invalid_email() {
        let service = UserService::new(Arc::new(MockUserRepository::default()));

        let result = service.create_user("not-an-email", None).await;
        assert!(matches!(
            result,
            Err(Error::Validation(ValidationError::InvalidEmail(_)))
        ));
    }

    #[tokio::test]
    async fn test_require_user() {
        let service = UserService::new(Arc::new(MockUserRepository::default()));

        let result = service.require_user(&UserId::new_random()).await;
        assert!(matches!(result, Err(Error::Auth(AuthError::UserNotFound))));

        let user = service.create_user("bob@example.com", None).await.unwrap();
        assert_eq!(service.require_user(&user.id).await.unwrap().id, user.id);

        service.delete_user(&user.id).await.unwrap();
        assert!(service.get_user(&user.id).await.unwrap().is_none());
    }
}
