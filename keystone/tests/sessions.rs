mod common;

use common::{EMAIL, PASSWORD, ctx, keystone, register, wait_for_audit};
use keystone::{
    AuditEventType, CleanupReport, Error, KeystoneBuilder, LoginOutcome, RequestContext,
    SessionError,
};

#[tokio::test]
async fn test_device_sessions_are_isolated_per_user() {
    let keystone = keystone().await;
    let alice = register(&keystone, EMAIL).await;
    let bob = register(&keystone, "bob@example.com").await;

    let alice_session = keystone
        .touch_device_session(&alice.id, &ctx("203.0.113.40"))
        .await
        .unwrap();

    assert!(matches!(
        keystone
            .revoke_device_session(&bob, &alice_session.id, &RequestContext::default())
            .await,
        Err(Error::Session(SessionError::NotFound))
    ));
    assert_eq!(keystone.list_device_sessions(&alice.id).await.unwrap().len(), 1);

    keystone
        .revoke_device_session(&alice, &alice_session.id, &RequestContext::default())
        .await
        .unwrap();
    assert!(keystone.list_device_sessions(&alice.id).await.unwrap().is_empty());

    wait_for_audit(&keystone, EMAIL, |events| {
        events
            .iter()
            .any(|e| e.event_type == AuditEventType::SessionRevoked)
    })
    .await;
}

#[tokio::test]
async fn test_revoking_a_device_signs_it_out() {
    let keystone = keystone().await;
    let user = register(&keystone, EMAIL).await;
    let laptop = ctx("203.0.113.44");

    let LoginOutcome::Authenticated {
        session,
        device_session,
        ..
    } = keystone.login(EMAIL, PASSWORD, &laptop).await.unwrap()
    else {
        panic!("expected an authenticated login");
    };
    let phone = RequestContext::new(
        Some("203.0.113.45".to_string()),
        Some("Mozilla/5.0 (iPhone; CPU iPhone OS 17_0 like Mac OS X) Safari/604.1".to_string()),
    );
    let LoginOutcome::Authenticated {
        session: phone_session,
        ..
    } = keystone.login(EMAIL, PASSWORD, &phone).await.unwrap()
    else {
        panic!("expected an authenticated login");
    };

    keystone
        .revoke_device_session(&user, &device_session.id, &phone)
        .await
        .unwrap();

    assert!(matches!(
        keystone.authenticate(&session.token).await,
        Err(Error::Session(SessionError::NotFound))
    ));
    assert!(keystone.authenticate(&phone_session.token).await.is_ok());

    let remaining = keystone.list_device_sessions(&user.id).await.unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].device_name, "iPhone");
}

#[tokio::test]
async fn test_heartbeat_reuses_the_device_entry() {
    let keystone = keystone().await;
    let user = register(&keystone, EMAIL).await;
    let ctx = ctx("203.0.113.41");

    let LoginOutcome::Authenticated { device_session, .. } =
        keystone.login(EMAIL, PASSWORD, &ctx).await.unwrap()
    else {
        panic!("expected an authenticated login");
    };

    let again = keystone.touch_device_session(&user.id, &ctx).await.unwrap();
    assert_eq!(again.id, device_session.id);

    let phone = RequestContext::new(
        Some("203.0.113.42".to_string()),
        Some("Mozilla/5.0 (iPhone; CPU iPhone OS 17_0 like Mac OS X) Safari/604.1".to_string()),
    );
    let mobile = keystone.touch_device_session(&user.id, &phone).await.unwrap();
    assert_eq!(mobile.device_name, "iPhone");

    let sessions = keystone.list_device_sessions(&user.id).await.unwrap();
    assert_eq!(sessions.len(), 2);
    assert_eq!(sessions[0].id, mobile.id);
    assert!(sessions[0].is_current);
    assert!(!sessions[1].is_current);
}

#[tokio::test]
async fn test_cleanup_keeps_live_records() {
    let keystone = keystone().await;
    register(&keystone, EMAIL).await;
    keystone.login(EMAIL, PASSWORD, &ctx("203.0.113.43")).await.unwrap();
    let _ = keystone.login(EMAIL, "Wrong1234", &ctx("203.0.113.43")).await;

    let report = keystone.run_cleanup().await.unwrap();
    assert_eq!(report, CleanupReport::default());
    assert_eq!(keystone.brute_force_status(EMAIL).await.unwrap().failed_attempts, 1);
}

#[tokio::test]
async fn test_cleanup_task_stops_on_shutdown() {
    let keystone = keystone().await;
    let (tx, rx) = tokio::sync::watch::channel(false);

    let handle = keystone.start_cleanup_task(rx);
    tx.send(true).unwrap();

    tokio::time::timeout(std::time::Duration::from_secs(5), handle)
        .await
        .expect("cleanup task did not stop")
        .unwrap();
}

#[tokio::test]
async fn test_builder_without_migrations_leaves_schema_empty() {
    let keystone = KeystoneBuilder::new()
        .with_sqlite("sqlite::memory:")
        .await
        .unwrap()
        .build()
        .await
        .unwrap();

    keystone.health_check().await.unwrap();
    assert!(matches!(
        keystone.register(EMAIL, PASSWORD, &RequestContext::default()).await,
        Err(Error::Storage(_))
    ));

    keystone.migrate().await.unwrap();
    keystone
        .register(EMAIL, PASSWORD, &RequestContext::default())
        .await
        .unwrap();
}
