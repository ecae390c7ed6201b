//! TOTP two-factor authentication and backup codes
//!
//! Enrollment is a two-step handshake: [`TwoFactorService::generate_secret`]
//! hands out a secret without storing it, and [`TwoFactorService::enable`]
//! persists it only once the user proves their authenticator produces valid
//! codes for it.

use std::sync::Arc;

use crate::{
    AuditEventType, BackupCodeStatus, Error, IdentityProvider, NewAuditEvent, RequestContext,
    TotpConfig, TwoFactorCredential, TwoFactorSetup, TwoFactorVerification, User, UserId,
    crypto::{find_backup_code, generate_backup_codes, hash_backup_code},
    error::{AuthError, TwoFactorError},
    repositories::{AuditRepository, UserRepository},
    services::AuditLogger,
    two_factor::format_manual_entry_key,
    validation::validate_totp_token,
};

/// Attempts at consuming a backup code before giving up on concurrent writers
const BACKUP_CODE_CAS_RETRIES: usize = 3;

pub struct TwoFactorService<U: UserRepository, A: AuditRepository> {
    users: Arc<U>,
    identity: Arc<dyn IdentityProvider>,
    audit: Arc<AuditLogger<A>>,
    config: TotpConfig,
}

impl<U: UserRepository, A: AuditRepository> TwoFactorService<U, A> {
    pub fn new(
        users: Arc<U>,
        identity: Arc<dyn IdentityProvider>,
        audit: Arc<AuditLogger<A>>,
        config: TotpConfig,
    ) -> Self {
        Self {
            users,
            identity,
            audit,
            config,
        }
    }

    pub fn config(&self) -> &TotpConfig {
        &self.config
    }

    /// Load a user, failing with `UserNotFound`.
    pub async fn load_user(&self, user_id: &UserId) -> Result<User, Error> {
        self.users
            .find_by_id(user_id)
            .await?
            .ok_or(Error::Auth(AuthError::UserNotFound))
    }

    /// Issue a new secret for enrollment. Nothing is stored.
    pub async fn generate_secret(
        &self,
        user_id: &UserId,
        email: &str,
    ) -> Result<TwoFactorSetup, Error> {
        let user = self.load_user(user_id).await?;
        if user.two_factor_enabled {
            return Err(TwoFactorError::AlreadyEnabled.into());
        }

        let secret = self.config.generate_secret()?;
        let totp = self.config.totp(&secret, email)?;

        let qr = totp
            .get_qr_base64()
            .map_err(|e| TwoFactorError::Totp(format!("QR generation error: {e}")))?;

        Ok(TwoFactorSetup {
            manual_entry_key: format_manual_entry_key(&secret),
            otpauth_url: totp.get_url(),
            qr_code_data_url: format!("data:image/png;base64,{qr}"),
            secret,
        })
    }

    /// Confirm enrollment with a code from the authenticator and persist the secret.
    ///
    /// Returns the plaintext backup codes. They are not retrievable later.
    pub async fn enable(
        &self,
        user_id: &UserId,
        email: &str,
        secret: &str,
        token: &str,
        ctx: &RequestContext,
    ) -> Result<Vec<String>, Error> {
        validate_totp_token(token)?;

        let user = self.load_user(user_id).await?;
        if user.two_factor_enabled {
            return Err(TwoFactorError::AlreadyEnabled.into());
        }

        let totp = self.config.totp(secret, email)?;
        if !totp.check_current(token).unwrap_or(false) {
            self.audit.log_auth_event(
                NewAuditEvent::new(email, AuditEventType::TwoFactorEnabled, false)
                    .user_id(user_id)
                    .context(ctx)
                    .error_message("Invalid verification code")
                    .reason("invalid_token"),
            );
            return Err(TwoFactorError::InvalidToken.into());
        }

        let codes = generate_backup_codes(self.config.backup_code_count);
        let credential = TwoFactorCredential {
            enabled: true,
            secret: Some(secret.to_string()),
            backup_codes: codes.iter().map(|c| hash_backup_code(c)).collect(),
        };
        self.users.set_two_factor(user_id, &credential).await?;

        tracing::info!(user_id = %user_id, "Two-factor authentication enabled");
        self.audit.log_auth_event(
            NewAuditEvent::new(email, AuditEventType::TwoFactorEnabled, true)
                .user_id(user_id)
                .context(ctx)
                .metadata("backup_codes", codes.len()),
        );

        Ok(codes)
    }

    /// Check the second factor during login: a current TOTP code or an unused backup code.
    pub async fn verify_for_login(
        &self,
        user_id: &UserId,
        email: &str,
        token: &str,
        ctx: &RequestContext,
    ) -> Result<TwoFactorVerification, Error> {
        let user = self.load_user(user_id).await?;
        let secret = match (&user.two_factor_enabled, &user.two_factor_secret) {
            (true, Some(secret)) => secret.clone(),
            _ => return Err(TwoFactorError::NotEnabled.into()),
        };

        let token = token.trim();

        let verification = if validate_totp_token(token).is_ok() {
            let totp = self.config.totp(&secret, email)?;
            totp.check_current(token)
                .unwrap_or(false)
                .then(|| TwoFactorVerification {
                    used_backup_code: false,
                    remaining_backup_codes: user.backup_codes.len(),
                })
        } else {
            self.consume_backup_code(user, token).await?
        };

        match verification {
            Some(verification) => {
                let method = if verification.used_backup_code {
                    "backup_code"
                } else {
                    "totp"
                };
                self.audit.log_auth_event(
                    NewAuditEvent::new(email, AuditEventType::TwoFactorVerified, true)
                        .user_id(user_id)
                        .context(ctx)
                        .metadata("method", method)
                        .metadata("remaining_backup_codes", verification.remaining_backup_codes),
                );
                Ok(verification)
            }
            None => {
                tracing::debug!(user_id = %user_id, "Invalid two-factor code");
                self.audit.log_auth_event(
                    NewAuditEvent::new(email, AuditEventType::TwoFactorFailed, false)
                        .user_id(user_id)
                        .context(ctx)
                        .error_message("Invalid verification code")
                        .reason("invalid_token"),
                );
                Err(TwoFactorError::InvalidToken.into())
            }
        }
    }

    /// Remove a matching backup code. A code can be consumed at most once,
    /// even by concurrent requests.
    async fn consume_backup_code(
        &self,
        mut user: User,
        code: &str,
    ) -> Result<Option<TwoFactorVerification>, Error> {
        for _ in 0..BACKUP_CODE_CAS_RETRIES {
            let Some(index) = find_backup_code(code, &user.backup_codes) else {
                return Ok(None);
            };

            let mut remaining = user.backup_codes.clone();
            remaining.remove(index);

            if self
                .users
                .replace_backup_codes(&user.id, &user.backup_codes, &remaining)
                .await?
            {
                tracing::info!(
                    user_id = %user.id,
                    remaining = remaining.len(),
                    "Backup code consumed"
                );
                return Ok(Some(TwoFactorVerification {
                    used_backup_code: true,
                    remaining_backup_codes: remaining.len(),
                }));
            }

            // another request changed the list; look again
            user = self.load_user(&user.id).await?;
        }

        tracing::warn!(user_id = %user.id, "Backup code consumption kept conflicting");
        Ok(None)
    }

    /// Turn two-factor authentication off after re-checking the password.
    pub async fn disable(
        &self,
        user_id: &UserId,
        email: &str,
        password: &str,
        ctx: &RequestContext,
    ) -> Result<(), Error> {
        self.require_password(user_id, email, password, AuditEventType::TwoFactorDisabled, ctx)
            .await?;

        let user = self.load_user(user_id).await?;
        if !user.two_factor_enabled {
            return Err(TwoFactorError::NotEnabled.into());
        }

        self.users
            .set_two_factor(user_id, &TwoFactorCredential::disabled())
            .await?;

        tracing::info!(user_id = %user_id, "Two-factor authentication disabled");
        self.audit.log_auth_event(
            NewAuditEvent::new(email, AuditEventType::TwoFactorDisabled, true)
                .user_id(user_id)
                .context(ctx),
        );

        Ok(())
    }

    /// Replace all backup codes after re-checking the password.
    pub async fn regenerate_backup_codes(
        &self,
        user_id: &UserId,
        email: &str,
        password: &str,
        ctx: &RequestContext,
    ) -> Result<Vec<String>, Error> {
        self.require_password(
            user_id,
            email,
            password,
            AuditEventType::BackupCodesRegenerated,
            ctx,
        )
        .await?;

        let user = self.load_user(user_id).await?;
        if !user.two_factor_enabled {
            return Err(TwoFactorError::NotEnabled.into());
        }

        let codes = generate_backup_codes(self.config.backup_code_count);
        let credential = TwoFactorCredential {
            enabled: true,
            secret: user.two_factor_secret,
            backup_codes: codes.iter().map(|c| hash_backup_code(c)).collect(),
        };
        self.users.set_two_factor(user_id, &credential).await?;

        self.audit.log_auth_event(
            NewAuditEvent::new(email, AuditEventType::BackupCodesRegenerated, true)
                .user_id(user_id)
                .context(ctx)
                .metadata("backup_codes", codes.len()),
        );

        Ok(codes)
    }

    /// Whether two-factor is on and how many backup codes are left.
    pub async fn backup_code_status(&self, user_id: &UserId) -> Result<BackupCodeStatus, Error> {
        let user = self.load_user(user_id).await?;
        Ok(BackupCodeStatus {
            enabled: user.two_factor_enabled,
            remaining_codes: if user.two_factor_enabled {
                user.backup_codes.len()
            } else {
                0
            },
        })
    }

    /// Whether `remaining` codes is few enough to warn about.
    pub fn is_running_low(&self, remaining: usize) -> bool {
        remaining <= self.config.low_backup_code_threshold
    }

    async fn require_password(
        &self,
        user_id: &UserId,
        email: &str,
        password: &str,
        event_type: AuditEventType,
        ctx: &RequestContext,
    ) -> Result<(), Error> {
        if self.identity.verify_password(user_id, password).await? {
            return Ok(());
        }

        self.audit.log_auth_event(
            NewAuditEvent::new(email, event_type, false)
                .user_id(user_id)
                .context(ctx)
                .error_message("Invalid password")
                .reason("invalid_password"),
        );
        Err(TwoFactorError::InvalidPassword.into())
    }
}
