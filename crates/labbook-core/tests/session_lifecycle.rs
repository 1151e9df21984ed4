//! End-to-end session lifecycle against a mocked backend.

use chrono::{Duration, Utc};
use httpmock::prelude::*;
use jsonwebtoken::{encode, EncodingKey, Header};
use labbook_core::auth::{FileTokenStore, TokenStore, TOKEN_FILE};
use labbook_core::models::Experiment;
use labbook_core::{ApiClient, ApiError, AuthPhase, EventBus, Session, SessionSettings};
use serde_json::json;

fn mint(sub: &str, expires_in: Duration) -> String {
    let claims = json!({
        "sub": sub,
        "email": format!("{}@lab.test", sub),
        "firstName": "Alice",
        "lastName": "Liddell",
        "role": "STUDENT",
        "iat": Utc::now().timestamp(),
        "exp": (Utc::now() + expires_in).timestamp(),
    });
    encode(&Header::default(), &claims, &EncodingKey::from_secret(b"integration"))
        .expect("token encodes")
}

#[tokio::test]
async fn login_persist_restore_logout() {
    let server = MockServer::start_async().await;
    let token = mint("alice", Duration::hours(1));
    server
        .mock_async(|when, then| {
            when.method(POST).path("/auth/login");
            then.status(200).json_body(json!({ "token": token.clone() }));
        })
        .await;
    let list = server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/experiments")
                .header("authorization", format!("Bearer {}", token));
            then.status(200).json_body(json!([
                {"id": 1, "title": "Yeast growth", "status": "DRAFT"},
                {"id": 2, "title": null, "status": "DRAFT"}
            ]));
        })
        .await;

    let dir = tempfile::tempdir().unwrap();
    let api = ApiClient::new(server.base_url()).unwrap();

    let session = Session::new(
        api.clone(),
        FileTokenStore::new(dir.path().to_path_buf()),
        SessionSettings::default(),
    );
    assert_eq!(session.phase(), AuthPhase::Authenticating);
    assert_eq!(session.initialize(), AuthPhase::Unauthenticated);

    let claims = session.login("alice", "secret").await.expect("login succeeds");
    assert_eq!(claims.subject, "alice");
    assert_eq!(claims.display_name(), "Alice Liddell");
    assert_eq!(session.phase(), AuthPhase::Authenticated);
    assert!(dir.path().join(TOKEN_FILE).exists());

    let experiments: Vec<Experiment> = session.client().list_experiments().await.unwrap();
    list.assert_async().await;
    let titled = labbook_core::models::filter_by_title(&experiments, "");
    assert_eq!(titled.len(), 1);

    // A second process restores the same session from disk
    let restored = Session::new(
        api.clone(),
        FileTokenStore::new(dir.path().to_path_buf()),
        SessionSettings::default(),
    );
    assert_eq!(restored.initialize(), AuthPhase::Authenticated);
    assert_eq!(restored.state().subject(), Some("alice"));
    restored.teardown();

    session.logout();
    assert_eq!(session.phase(), AuthPhase::Unauthenticated);
    assert!(!dir.path().join(TOKEN_FILE).exists());
    assert_eq!(FileTokenStore::new(dir.path().to_path_buf()).load().unwrap(), None);

    // Logged out: requests go out without credentials
    let err = session.client().list_experiments().await.unwrap_err();
    assert!(matches!(err, ApiError::NotFound(_)));
}

#[tokio::test]
async fn mutations_bump_refresh_for_every_view() {
    let bus = EventBus::new();
    let mut dashboard = bus.subscribe_refresh();
    let mut detail = bus.clone().subscribe_refresh();
    let before = *dashboard.borrow_and_update();
    detail.mark_unchanged();

    for _ in 0..3 {
        bus.trigger_refresh();
    }

    dashboard.changed().await.unwrap();
    detail.changed().await.unwrap();
    assert_eq!(*dashboard.borrow() - before, 3);
    assert_eq!(*detail.borrow(), *dashboard.borrow());
}
