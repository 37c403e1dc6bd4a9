//! End-to-end ticket lifecycle tests over HTTP.

mod common;

use common::{TestApp, registered};
use reqwest::StatusCode;

#[tokio::test]
async fn login_grant_validate_round_trip() {
    let app = TestApp::spawn(vec![registered(1, "app", "https://app.example.org")]).await;

    let tgt_id = app.login().await;
    assert!(tgt_id.starts_with("TGT-"));

    let st_id = app.grant(&tgt_id, "https://app.example.org/login").await;
    assert!(st_id.starts_with("ST-"));

    let response = app
        .client
        .get(app.url("/v1/serviceValidate"))
        .query(&[
            ("ticket", st_id.as_str()),
            ("service", "https://app.example.org/login"),
        ])
        .send()
        .await
        .expect("Failed to execute validate request");
    assert_eq!(response.status(), StatusCode::OK);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["user"], "alice");
}

#[tokio::test]
async fn invalid_credentials_are_rejected() {
    let app = TestApp::spawn(vec![registered(1, "app", "https://app.example.org")]).await;

    let response = app
        .client
        .post(app.url("/v1/tickets"))
        .json(&serde_json::json!({ "username": "alice", "password": "wrong" }))
        .send()
        .await
        .expect("Failed to execute login request");
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn service_ticket_replay_is_rejected() {
    let app = TestApp::spawn(vec![registered(1, "app", "https://app.example.org")]).await;
    let tgt_id = app.login().await;
    let st_id = app.grant(&tgt_id, "https://app.example.org/").await;

    let query = [
        ("ticket", st_id.as_str()),
        ("service", "https://app.example.org/"),
    ];
    let first = app
        .client
        .get(app.url("/v1/serviceValidate"))
        .query(&query)
        .send()
        .await
        .unwrap();
    assert_eq!(first.status(), StatusCode::OK);

    let replay = app
        .client
        .get(app.url("/v1/serviceValidate"))
        .query(&query)
        .send()
        .await
        .unwrap();
    assert_eq!(replay.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn unregistered_service_is_forbidden() {
    let app = TestApp::spawn(vec![registered(1, "app", "https://app.example.org")]).await;
    let tgt_id = app.login().await;

    let response = app
        .client
        .post(app.url(&format!("/v1/tickets/{}", tgt_id)))
        .json(&serde_json::json!({ "service": "https://rogue.example.org/" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn empty_catalog_is_service_unavailable_not_forbidden() {
    let app = TestApp::spawn(vec![]).await;
    let tgt_id = app.login().await;

    let response = app
        .client
        .post(app.url(&format!("/v1/tickets/{}", tgt_id)))
        .json(&serde_json::json!({ "service": "https://app.example.org/" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn renew_validation_requires_renewed_ticket() {
    let app = TestApp::spawn(vec![registered(1, "app", "https://app.example.org")]).await;
    let tgt_id = app.login().await;
    let plain = app.grant(&tgt_id, "https://app.example.org/").await;

    let response = app
        .client
        .get(app.url("/v1/serviceValidate"))
        .query(&[
            ("ticket", plain.as_str()),
            ("service", "https://app.example.org/"),
            ("renew", "true"),
        ])
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    // A grant carrying fresh credentials satisfies the renew requirement
    let response = app
        .client
        .post(app.url(&format!("/v1/tickets/{}", tgt_id)))
        .json(&serde_json::json!({
            "service": "https://app.example.org/",
            "renew": true,
            "username": "alice",
            "password": "secret"
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let body: serde_json::Value = response.json().await.unwrap();
    let renewed = body["st_id"].as_str().unwrap();

    let response = app
        .client
        .get(app.url("/v1/serviceValidate"))
        .query(&[
            ("ticket", renewed),
            ("service", "https://app.example.org/"),
            ("renew", "true"),
        ])
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn renew_with_different_identity_destroys_session() {
    let app = TestApp::spawn(vec![registered(1, "app", "https://app.example.org")]).await;
    let tgt_id = app.login().await;

    let response = app
        .client
        .post(app.url(&format!("/v1/tickets/{}", tgt_id)))
        .json(&serde_json::json!({
            "service": "https://app.example.org/",
            "renew": true,
            "username": "bob",
            "password": "hunter2"
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // The TGT is gone, so even a plain grant now fails
    let response = app
        .client
        .post(app.url(&format!("/v1/tickets/{}", tgt_id)))
        .json(&serde_json::json!({ "service": "https://app.example.org/" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn destroyed_session_invalidates_outstanding_tickets() {
    let app = TestApp::spawn(vec![registered(1, "app", "https://app.example.org")]).await;
    let tgt_id = app.login().await;
    let st_id = app.grant(&tgt_id, "https://app.example.org/").await;

    let response = app
        .client
        .delete(app.url(&format!("/v1/tickets/{}", tgt_id)))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .client
        .get(app.url("/v1/serviceValidate"))
        .query(&[
            ("ticket", st_id.as_str()),
            ("service", "https://app.example.org/"),
        ])
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
