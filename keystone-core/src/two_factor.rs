//! TOTP two-factor authentication types
//!
//! Secrets are RFC 6238 SHA-1 secrets with six digits and a 30 second step,
//! accepted one step either side of the current one.

use serde::{Deserialize, Serialize};
use totp_rs::{Algorithm, Secret, TOTP};

use crate::error::TwoFactorError;

#[derive(Debug, Clone)]
pub struct TotpConfig {
    /// Shown by authenticator apps next to the account name.
    pub issuer: String,
    pub digits: usize,
    pub skew: u8,
    pub step: u64,
    pub backup_code_count: usize,
    /// At or below this many unused codes the user is warned.
    pub low_backup_code_threshold: usize,
}

impl Default for TotpConfig {
    fn default() -> Self {
        Self {
            issuer: "Keystone".to_string(),
            digits: 6,
            skew: 1,
            step: 30,
            backup_code_count: 10,
            low_backup_code_threshold: 3,
        }
    }
}

impl TotpConfig {
    pub fn issuer(mut self, issuer: &str) -> Self {
        self.issuer = issuer.to_string();
        self
    }

    /// Build the TOTP instance for a base32 secret.
    pub fn totp(&self, secret_base32: &str, account: &str) -> Result<TOTP, TwoFactorError> {
        let secret_bytes = Secret::Encoded(secret_base32.to_string())
            .to_bytes()
            .map_err(|e| TwoFactorError::Totp(format!("Invalid secret: {e}")))?;

        TOTP::new(
            Algorithm::SHA1,
            self.digits,
            self.skew,
            self.step,
            secret_bytes,
            Some(self.issuer.clone()),
            account.to_string(),
        )
        .map_err(|e| TwoFactorError::Totp(format!("TOTP init error: {e}")))
    }

    /// A new random base32 secret.
    pub fn generate_secret(&self) -> Result<String, TwoFactorError> {
        match Secret::generate_secret().to_encoded() {
            Secret::Encoded(secret) => Ok(secret),
            Secret::Raw(_) => Err(TwoFactorError::Totp(
                "Secret could not be encoded".to_string(),
            )),
        }
    }
}

/// Material handed to the user to enroll an authenticator app
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TwoFactorSetup {
    pub secret: String,
    /// `data:image/png;base64,...`
    pub qr_code_data_url: String,
    /// The secret split into groups of four for typing.
    pub manual_entry_key: String,
    pub otpauth_url: String,
}

/// Result of a successful second-factor check
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TwoFactorVerification {
    pub used_backup_code: bool,
    pub remaining_backup_codes: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupCodeStatus {
    pub enabled: bool,
    pub remaining_codes: usize,
}

/// `JBSWY3DPEHPK3PXP` becomes `JBSW Y3DP EHPK 3PXP`.
pub fn format_manual_entry_key(secret: &str) -> String {
    secret
        .as_bytes()
        .chunks(4)
        .map(|chunk| String::from_utf8_lossy(chunk).into_owned())
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_secret_builds_totp() {
        let config = TotpConfig::default();
        let secret = config.generate_secret().unwrap();
        let totp = config.totp(&secret, "alice@example.com").unwrap();

        let code = totp.generate_current().unwrap();
        assert_eq!(code.len(), 6);
        assert!(totp.check_current(&code).unwrap());
        assert_eq!(totp.get_secret_base32(), secret);
    }

    #[test]
    fn test_invalid_secret_is_rejected() {
        let config = TotpConfig::default();
        assert!(matches!(
            config.totp("not base32!", "alice@example.com"),
            Err(TwoFactorError::Totp(_))
        ));
    }

    #[test]
    fn test_otpauth_url_carries_issuer() {
        let config = TotpConfig::default().issuer("BuildCo");
        let secret = config.generate_secret().unwrap();
        let url = config.totp(&secret, "alice@example.com").unwrap().get_url();
        assert!(url.starts_with("otpauth://totp/"));
        assert!(url.contains("issuer=BuildCo"));
    }

    #[test]
    fn test_manual_entry_key_grouping() {
        assert_eq!(
            format_manual_entry_key("JBSWY3DPEHPK3PXP"),
            "JBSW Y3DP EHPK 3PXP"
        );
        assert_eq!(format_manual_entry_key("ABCDEF"), "ABCD EF");
    }
}
