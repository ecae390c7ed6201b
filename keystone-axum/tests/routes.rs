use std::{sync::Arc, time::Duration};

use axum::{
    Router,
    body::Body,
    http::{HeaderMap, Method, Request, StatusCode, header},
};
use keystone::{
    BruteForceProtectionConfig, Keystone, KeystoneBuilder, SessionToken, SqliteRepositoryProvider,
};
use keystone_axum::routes;
use serde_json::{Value, json};
use tower::ServiceExt;

const EMAIL: &str = "alice@example.com";
const PASSWORD: &str = "Secure123";
const CHROME: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) Chrome/120.0.0.0 Safari/537.36";

struct TestApp {
    router: Router,
    keystone: Arc<Keystone<SqliteRepositoryProvider>>,
}

struct TestResponse {
    status: StatusCode,
    headers: HeaderMap,
    body: Value,
}

async fn app() -> TestApp {
    let _ = tracing_subscriber::fmt::try_init();

    let keystone = Arc::new(
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
            .expect("Failed to build keystone"),
    );

    let router = Router::new().nest("/auth", routes(keystone.clone()).build());

    TestApp { router, keystone }
}

impl TestApp {
    async fn send(
        &self,
        method: Method,
        uri: &str,
        ip: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> TestResponse {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header("x-forwarded-for", ip)
            .header(header::USER_AGENT, CHROME);

        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }

        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };

        TestResponse {
            status,
            headers,
            body,
        }
    }

    async fn register(&self, email: &str) -> TestResponse {
        self.send(
            Method::POST,
            "/auth/register",
            "198.51.100.1",
            None,
            Some(json!({ "email": email, "password": PASSWORD })),
        )
        .await
    }

    async fn login(&self, ip: &str, password: &str) -> TestResponse {
        self.send(
            Method::POST,
            "/auth/login",
            ip,
            None,
            Some(json!({ "email": EMAIL, "password": password })),
        )
        .await
    }

    /// Register, log in and return the session token.
    async fn signed_in(&self, ip: &str) -> String {
        self.register(EMAIL).await;
        let response = self.login(ip, PASSWORD).await;
        assert_eq!(response.status, StatusCode::OK);
        response.body["session"]["token"]
            .as_str()
            .unwrap()
            .to_string()
    }

    /// Turn on two-factor for the signed-in user and return the backup codes.
    async fn enable_two_factor(&self, ip: &str, token: &str) -> Vec<String> {
        let setup = self
            .send(Method::POST, "/auth/2fa/setup", ip, Some(token), None)
            .await;
        let secret = setup.body["secret"].as_str().unwrap().to_string();
        let enabled = self
            .send(
                Method::PUT,
                "/auth/2fa/setup",
                ip,
                Some(token),
                Some(json!({ "secret": secret, "token": self.current_code(&secret) })),
            )
            .await;
        assert_eq!(enabled.status, StatusCode::OK);
        serde_json::from_value(enabled.body["backupCodes"].clone()).unwrap()
    }

    /// Pass the password step and return `(userId, challenge)`.
    async fn password_step(&self, ip: &str) -> (String, String) {
        let login = self.login(ip, PASSWORD).await;
        assert_eq!(login.status, StatusCode::OK);
        assert_eq!(login.body["requires2FA"], true);
        (
            login.body["userId"].as_str().unwrap().to_string(),
            login.body["challenge"].as_str().unwrap().to_string(),
        )
    }

    fn current_code(&self, secret: &str) -> String {
        self.keystone
            .two_factor_config()
            .totp(secret, EMAIL)
            .expect("Invalid secret")
            .generate_current()
            .expect("Failed to generate code")
    }
}

#[tokio::test]
async fn test_health() {
    let app = app().await;
    let response = app
        .send(Method::GET, "/auth/health", "203.0.113.1", None, None)
        .await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["status"], "healthy");
}

#[tokio::test]
async fn test_register() {
    let app = app().await;

    let created = app.register(EMAIL).await;
    assert_eq!(created.status, StatusCode::CREATED);
    assert_eq!(created.body["success"], true);
    assert_eq!(created.body["user"]["email"], EMAIL);
    assert_eq!(created.body["user"]["twoFactorEnabled"], false);
    assert!(created.body["user"].get("twoFactorSecret").is_none());

    let duplicate = app.register(EMAIL).await;
    assert_eq!(duplicate.status, StatusCode::BAD_REQUEST);

    let missing = app
        .send(
            Method::POST,
            "/auth/register",
            "198.51.100.2",
            None,
            Some(json!({ "email": "bob@example.com" })),
        )
        .await;
    assert_eq!(missing.status, StatusCode::BAD_REQUEST);
    assert!(missing.body["error"].as_str().unwrap().contains("password"));
}

#[tokio::test]
async fn test_five_failures_then_429() {
    let app = app().await;
    app.register(EMAIL).await;

    for expected_remaining in [4, 3, 2, 1, 0] {
        let response = app.login("203.0.113.7", "Wrong1234").await;
        assert_eq!(response.status, StatusCode::UNAUTHORIZED);
        assert_eq!(response.body["error"], "Invalid email or password");
        assert_eq!(response.body["attemptsRemaining"], expected_remaining);
    }

    let response = app.login("203.0.113.7", PASSWORD).await;
    assert_eq!(response.status, StatusCode::TOO_MANY_REQUESTS);

    let retry_after: i64 = response.headers["retry-after"]
        .to_str()
        .unwrap()
        .parse()
        .unwrap();
    assert!(retry_after > 0 && retry_after <= 15 * 60);
    assert_eq!(response.headers["x-ratelimit-limit"], "5");
    assert_eq!(response.headers["x-ratelimit-remaining"], "0");
    assert!(response.headers.contains_key("x-ratelimit-reset"));
    assert_eq!(response.body["retryAfter"], retry_after);
    assert!(response.body["lockedUntil"].is_string());
}

#[tokio::test]
async fn test_account_lock_is_423() {
    let app = app().await;
    app.register(EMAIL).await;

    for i in 0..5 {
        app.login(&format!("10.0.1.{i}"), "Wrong1234").await;
    }

    let response = app.login("10.0.2.1", PASSWORD).await;
    assert_eq!(response.status, StatusCode::LOCKED);
    assert_eq!(response.body["accountLocked"], true);
    assert!(response.body["lockedUntil"].is_string());
}

#[tokio::test]
async fn test_login_sets_cookie_and_status() {
    let app = app().await;
    app.register(EMAIL).await;

    let response = app.login("203.0.113.8", PASSWORD).await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["success"], true);

    let token = response.body["session"]["token"].as_str().unwrap();
    let cookie = response.headers[header::SET_COOKIE].to_str().unwrap();
    assert!(cookie.starts_with(&format!("session_id={token}")));
    assert!(cookie.contains("HttpOnly"));

    let status = app
        .send(Method::GET, "/auth/login", "203.0.113.8", Some(token), None)
        .await;
    assert_eq!(status.status, StatusCode::OK);
    assert_eq!(status.body["authenticated"], true);
    assert_eq!(status.body["user"]["email"], EMAIL);

    // the cookie works as well as the bearer header
    let request = Request::builder()
        .uri("/auth/login")
        .header(header::COOKIE, format!("session_id={token}"))
        .body(Body::empty())
        .unwrap();
    let response = app.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let anonymous = app
        .send(Method::GET, "/auth/login", "203.0.113.8", None, None)
        .await;
    assert_eq!(anonymous.status, StatusCode::UNAUTHORIZED);
    assert_eq!(anonymous.body["authenticated"], false);
}

#[tokio::test]
async fn test_logout_ends_session() {
    let app = app().await;
    let token = app.signed_in("203.0.113.9").await;

    let response = app
        .send(Method::POST, "/auth/logout", "203.0.113.9", Some(&token), None)
        .await;
    assert_eq!(response.status, StatusCode::OK);
    let cookie = response.headers[header::SET_COOKIE].to_str().unwrap();
    assert!(cookie.contains("Max-Age=0"));

    let status = app
        .send(Method::GET, "/auth/login", "203.0.113.9", Some(&token), None)
        .await;
    assert_eq!(status.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_protected_routes_require_a_session() {
    let app = app().await;

    for (method, uri) in [
        (Method::POST, "/auth/2fa/setup"),
        (Method::GET, "/auth/2fa/backup-codes"),
        (Method::GET, "/auth/sessions"),
        (Method::POST, "/auth/sessions"),
    ] {
        let response = app.send(method, uri, "203.0.113.10", None, None).await;
        assert_eq!(response.status, StatusCode::UNAUTHORIZED, "{uri}");
    }

    let response = app
        .send(
            Method::GET,
            "/auth/sessions",
            "203.0.113.10",
            Some("not-a-real-token"),
            None,
        )
        .await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_two_factor_flow() {
    let app = app().await;
    let ip = "203.0.113.20";
    let token = app.signed_in(ip).await;

    let setup = app
        .send(Method::POST, "/auth/2fa/setup", ip, Some(&token), None)
        .await;
    assert_eq!(setup.status, StatusCode::OK);
    let secret = setup.body["secret"].as_str().unwrap().to_string();
    assert!(
        setup.body["qrCode"]
            .as_str()
            .unwrap()
            .starts_with("data:image/png;base64,")
    );
    assert!(setup.body["manualEntryKey"].is_string());
    assert!(setup.body["otpauthUrl"].is_string());

    let missing = app
        .send(
            Method::PUT,
            "/auth/2fa/setup",
            ip,
            Some(&token),
            Some(json!({ "secret": secret })),
        )
        .await;
    assert_eq!(missing.status, StatusCode::BAD_REQUEST);

    let enabled = app
        .send(
            Method::PUT,
            "/auth/2fa/setup",
            ip,
            Some(&token),
            Some(json!({ "secret": secret, "token": app.current_code(&secret) })),
        )
        .await;
    assert_eq!(enabled.status, StatusCode::OK);
    let codes: Vec<String> = serde_json::from_value(enabled.body["backupCodes"].clone()).unwrap();
    assert_eq!(codes.len(), 10);

    let status = app
        .send(Method::GET, "/auth/2fa/backup-codes", ip, Some(&token), None)
        .await;
    assert_eq!(status.body["enabled"], true);
    assert_eq!(status.body["remainingCodes"], 10);

    // password alone now only gets halfway
    let login = app.login(ip, PASSWORD).await;
    assert_eq!(login.status, StatusCode::OK);
    assert_eq!(login.body["requires2FA"], true);
    assert!(login.body.get("session").is_none());
    assert!(!login.headers.contains_key(header::SET_COOKIE));
    let user_id = login.body["userId"].as_str().unwrap().to_string();
    let challenge = login.body["challenge"].as_str().unwrap().to_string();
    assert!(login.body["expiresAt"].is_string());

    let no_challenge = app
        .send(
            Method::POST,
            "/auth/2fa/verify",
            ip,
            None,
            Some(json!({ "userId": user_id, "token": codes[0] })),
        )
        .await;
    assert_eq!(no_challenge.status, StatusCode::BAD_REQUEST);
    assert!(no_challenge.body["error"].as_str().unwrap().contains("challenge"));

    let verified = app
        .send(
            Method::POST,
            "/auth/2fa/verify",
            ip,
            None,
            Some(json!({ "userId": user_id, "challenge": challenge, "token": codes[0] })),
        )
        .await;
    assert_eq!(verified.status, StatusCode::OK);
    assert_eq!(verified.body["usedBackupCode"], true);
    assert_eq!(verified.body["remainingBackupCodes"], 9);
    assert!(verified.body.get("warning").is_none());
    assert!(verified.headers.contains_key(header::SET_COOKIE));

    let replayed = app
        .send(
            Method::POST,
            "/auth/2fa/verify",
            ip,
            None,
            Some(json!({ "userId": user_id, "challenge": challenge, "token": codes[1] })),
        )
        .await;
    assert_eq!(replayed.status, StatusCode::UNAUTHORIZED);

    let (_, challenge) = app.password_step(ip).await;
    let reused = app
        .send(
            Method::POST,
            "/auth/2fa/verify",
            ip,
            None,
            Some(json!({ "userId": user_id, "challenge": challenge, "token": codes[0] })),
        )
        .await;
    assert_eq!(reused.status, StatusCode::UNAUTHORIZED);
    assert_eq!(reused.body["error"], "Invalid verification code");
}

#[tokio::test]
async fn test_backup_code_without_password_is_401() {
    let app = app().await;
    let ip = "203.0.113.22";
    let token = app.signed_in(ip).await;
    let codes = app.enable_two_factor(ip, &token).await;
    let (user, _) = app
        .keystone
        .authenticate(&SessionToken::new(&token))
        .await
        .unwrap();

    let forged = app
        .send(
            Method::POST,
            "/auth/2fa/verify",
            "198.51.100.66",
            None,
            Some(json!({
                "userId": user.id.as_str(),
                "challenge": "not-a-real-challenge",
                "token": codes[0],
            })),
        )
        .await;
    assert_eq!(forged.status, StatusCode::UNAUTHORIZED);
    assert!(forged.body.get("session").is_none());
    assert!(!forged.headers.contains_key(header::SET_COOKIE));

    let status = app
        .send(Method::GET, "/auth/2fa/backup-codes", ip, Some(&token), None)
        .await;
    assert_eq!(status.body["remainingCodes"], 10);
}

#[tokio::test]
async fn test_six_bad_codes_then_429() {
    let app = app().await;
    let ip = "203.0.113.23";
    let token = app.signed_in(ip).await;
    app.enable_two_factor(ip, &token).await;
    let (user_id, challenge) = app.password_step(ip).await;

    let verify = || {
        app.send(
            Method::POST,
            "/auth/2fa/verify",
            ip,
            None,
            Some(json!({ "userId": user_id, "challenge": challenge, "token": "000000" })),
        )
    };

    for _ in 0..5 {
        assert_eq!(verify().await.status, StatusCode::UNAUTHORIZED);
    }

    let limited = verify().await;
    assert_eq!(limited.status, StatusCode::TOO_MANY_REQUESTS);
    let retry_after: i64 = limited.headers[header::RETRY_AFTER]
        .to_str()
        .unwrap()
        .parse()
        .unwrap();
    assert!(retry_after > 0 && retry_after <= 15 * 60);
    assert_eq!(limited.headers["x-ratelimit-remaining"], "0");
    assert!(limited.body["retryAfter"].is_number());
}

#[tokio::test]
async fn test_password_gated_two_factor_changes() {
    let app = app().await;
    let ip = "203.0.113.21";
    let token = app.signed_in(ip).await;

    let not_enabled = app
        .send(
            Method::POST,
            "/auth/2fa/disable",
            ip,
            Some(&token),
            Some(json!({ "password": PASSWORD })),
        )
        .await;
    assert_eq!(not_enabled.status, StatusCode::BAD_REQUEST);

    let setup = app
        .send(Method::POST, "/auth/2fa/setup", ip, Some(&token), None)
        .await;
    let secret = setup.body["secret"].as_str().unwrap().to_string();
    app.send(
        Method::PUT,
        "/auth/2fa/setup",
        ip,
        Some(&token),
        Some(json!({ "secret": secret, "token": app.current_code(&secret) })),
    )
    .await;

    let wrong = app
        .send(
            Method::POST,
            "/auth/2fa/backup-codes",
            ip,
            Some(&token),
            Some(json!({ "password": "Wrong1234" })),
        )
        .await;
    assert_eq!(wrong.status, StatusCode::BAD_REQUEST);

    let regenerated = app
        .send(
            Method::POST,
            "/auth/2fa/backup-codes",
            ip,
            Some(&token),
            Some(json!({ "password": PASSWORD })),
        )
        .await;
    assert_eq!(regenerated.status, StatusCode::OK);
    assert_eq!(regenerated.body["backupCodes"].as_array().unwrap().len(), 10);

    let disabled = app
        .send(
            Method::POST,
            "/auth/2fa/disable",
            ip,
            Some(&token),
            Some(json!({ "password": PASSWORD })),
        )
        .await;
    assert_eq!(disabled.status, StatusCode::OK);
    assert_eq!(disabled.body["success"], true);
}

#[tokio::test]
async fn test_device_sessions() {
    let app = app().await;
    let ip = "203.0.113.30";
    let other_ip = "203.0.113.31";
    let token = app.signed_in(ip).await;

    let heartbeat = app
        .send(Method::POST, "/auth/sessions", ip, Some(&token), None)
        .await;
    assert_eq!(heartbeat.status, StatusCode::OK);
    assert_eq!(heartbeat.body["session"]["isCurrent"], true);
    assert_eq!(heartbeat.body["session"]["browser"], "Chrome");
    assert_eq!(heartbeat.body["session"]["ipAddress"], ip);
    let session_id = heartbeat.body["session"]["id"].as_str().unwrap().to_string();

    let other = app.login(other_ip, PASSWORD).await;
    let other_token = other.body["session"]["token"].as_str().unwrap().to_string();

    let listed = app
        .send(Method::GET, "/auth/sessions", other_ip, Some(&other_token), None)
        .await;
    assert_eq!(listed.body["sessions"].as_array().unwrap().len(), 2);

    let unknown = app
        .send(
            Method::DELETE,
            "/auth/sessions",
            other_ip,
            Some(&other_token),
            Some(json!({ "sessionId": "ses_doesnotexist" })),
        )
        .await;
    assert_eq!(unknown.status, StatusCode::NOT_FOUND);

    let revoked = app
        .send(
            Method::DELETE,
            "/auth/sessions",
            other_ip,
            Some(&other_token),
            Some(json!({ "sessionId": session_id })),
        )
        .await;
    assert_eq!(revoked.status, StatusCode::OK);

    // the revoked device is signed out and cannot re-register itself
    let heartbeat = app
        .send(Method::POST, "/auth/sessions", ip, Some(&token), None)
        .await;
    assert_eq!(heartbeat.status, StatusCode::UNAUTHORIZED);

    let listed = app
        .send(Method::GET, "/auth/sessions", other_ip, Some(&other_token), None)
        .await;
    let sessions = listed.body["sessions"].as_array().unwrap();
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0]["ipAddress"], other_ip);
}
