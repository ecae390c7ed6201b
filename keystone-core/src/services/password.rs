use crate::{
    Error, IdentityProvider, User, UserId,
    error::AuthError,
    repositories::{PasswordRepository, UserRepository},
    services::UserService,
    validation::{normalize_email, validate_email, validate_password},
};
use async_trait::async_trait;
use std::sync::Arc;

/// Bundled identity provider: argon2 password hashes next to the user profile
pub struct PasswordIdentityProvider<U: UserRepository, P: PasswordRepository> {
    user_service: Arc<UserService<U>>,
    password_repository: Arc<P>,
}

impl<U: UserRepository, P: PasswordRepository> PasswordIdentityProvider<U, P> {
    pub fn new(user_repository: Arc<U>, password_repository: Arc<P>) -> Self {
        let user_service = Arc::new(UserService::new(user_repository));
        Self {
            user_service,
            password_repository,
        }
    }

    fn hash_password(password: &str) -> String {
        password_auth::generate_hash(password)
    }

    fn verify_hash(password: &str, hash: &str) -> bool {
        password_auth::verify_password(password, hash).is_ok()
    }
}

#[async_trait]
impl<U: UserRepository, P: PasswordRepository> IdentityProvider
    for PasswordIdentityProvider<U, P>
{
    async fn verify_credentials(&self, email: &str, password: &str) -> Result<User, Error> {
        let user = self
            .user_service
            .get_user_by_email(email)
            .await?
            .ok_or(Error::Auth(AuthError::InvalidCredentials))?;

        let password_hash = self
            .password_repository
            .get_password_hash(&user.id)
            .await?
            .ok_or(Error::Auth(AuthError::InvalidCredentials))?;

        if !Self::verify_hash(password, &password_hash) {
            return Err(Error::Auth(AuthError::InvalidCredentials));
        }

        Ok(user)
    }

    async fn verify_password(&self, user_id: &UserId, password: &str) -> Result<bool, Error> {
        let Some(password_hash) = self.password_repository.get_password_hash(user_id).await? else {
            return Ok(false);
        };

        Ok(Self::verify_hash(password, &password_hash))
    }

    async fn register(&self, email: &str, password: &str) -> Result<User, Error> {
        let email = normalize_email(email);
        validate_email(&email)?;
        validate_password(password)?;

        if self.user_service.get_user_by_email(&email).await?.is_some() {
            return Err(Error::Auth(AuthError::UserAlreadyExists));
        }

        let password_hash = Self::hash_password(password);
        let user = self.user_service.create_user(&email, None).await?;

        self.password_repository
            .set_password_hash(&user.id, &password_hash)
            .await?;

        tracing::info!(user_id = %user.id, "Registered user with password");

        Ok(user)
    }
}
