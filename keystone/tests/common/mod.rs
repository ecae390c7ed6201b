#![allow(dead_code)]

use std::time::Duration;

use keystone::{
    AuditEvent, BruteForceProtectionConfig, Keystone, KeystoneBuilder, LoginOutcome,
    RequestContext, SessionToken, SqliteRepositoryProvider, User,
};

pub const EMAIL: &str = "alice@example.com";
pub const PASSWORD: &str = "Secure123";

/// A migrated in-memory instance without the progressive delay.
pub async fn keystone() -> Keystone<SqliteRepositoryProvider> {
    let _ = tracing_subscriber::fmt::try_init();

    KeystoneBuilder::new()
        .with_sqlite("sqlite::memory:")
        .await
        .expect("Failed to connect")
        .with_brute_force_protection(
            BruteForceProtectionConfig::default().base_delay(Duration::ZERO),
        )
        .apply_migrations(true)
        .build()
        .await
        .expect("Failed to build keystone")
}

pub fn ctx(ip: &str) -> RequestContext {
    RequestContext::new(
        Some(ip.to_string()),
        Some(
            "Mozilla/5.0 (Windows NT 10.0; Win64; x64) Chrome/120.0.0.0 Safari/537.36"
                .to_string(),
        ),
    )
}

pub async fn register(keystone: &Keystone<SqliteRepositoryProvider>, email: &str) -> User {
    keystone
        .register(email, PASSWORD, &ctx("198.51.100.1"))
        .await
        .expect("Failed to register")
}

pub fn current_code(keystone: &Keystone<SqliteRepositoryProvider>, secret: &str) -> String {
    keystone
        .two_factor_config()
        .totp(secret, EMAIL)
        .expect("Invalid secret")
        .generate_current()
        .expect("Failed to generate code")
}

/// Turn on two-factor for `user` and return its backup codes.
pub async fn enable_two_factor(
    keystone: &Keystone<SqliteRepositoryProvider>,
    user: &User,
) -> (String, Vec<String>) {
    let setup = keystone.generate_two_factor_secret(user).await.unwrap();
    let code = current_code(keystone, &setup.secret);
    let codes = keystone
        .enable_two_factor(user, &setup.secret, &code, &RequestContext::default())
        .await
        .unwrap();
    (setup.secret, codes)
}

/// Pass the password step of a two-factor account and return the challenge.
pub async fn password_step(
    keystone: &Keystone<SqliteRepositoryProvider>,
    ctx: &RequestContext,
) -> SessionToken {
    match keystone.login(EMAIL, PASSWORD, ctx).await.unwrap() {
        LoginOutcome::TwoFactorRequired { challenge, .. } => challenge.token,
        other => panic!("expected a second factor to be required, got {other:?}"),
    }
}

/// Poll the audit trail of `email` until `condition` holds.
pub async fn wait_for_audit<F>(
    keystone: &Keystone<SqliteRepositoryProvider>,
    email: &str,
    condition: F,
) where
    F: Fn(&[AuditEvent]) -> bool,
{
    for _ in 0..100 {
        let events = keystone.audit_events_for_email(email, 100).await.unwrap();
        if condition(&events) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("audit log never reached the expected state");
}
