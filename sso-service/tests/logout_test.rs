//! Single-logout propagation tests over HTTP.

mod common;

use common::{TestApp, registered};
use reqwest::StatusCode;
use sso_service::models::LogoutType;

fn with_logout(
    id: u64,
    name: &str,
    service_id: &str,
    logout_type: LogoutType,
) -> sso_service::models::RegisteredService {
    let mut service = registered(id, name, service_id);
    service.logout_type = logout_type;
    service.logout_url = Some(format!("{service_id}/logout"));
    service
}

#[tokio::test]
async fn destroy_runs_back_channel_and_dedupes_by_service() {
    let app = TestApp::spawn(vec![
        with_logout(1, "app", "https://app.example.org", LogoutType::BackChannel),
        with_logout(2, "wiki", "https://wiki.example.org", LogoutType::BackChannel),
    ])
    .await;

    let tgt_id = app.login().await;
    // Two tickets to the same service must produce one logout request
    app.grant(&tgt_id, "https://app.example.org/").await;
    app.grant(&tgt_id, "https://app.example.org/").await;
    app.grant(&tgt_id, "https://wiki.example.org/").await;

    let response = app
        .client
        .delete(app.url(&format!("/v1/tickets/{}", tgt_id)))
        .send()
        .await
        .expect("Failed to execute destroy request");
    assert_eq!(response.status(), StatusCode::OK);
    let body: serde_json::Value = response.json().await.unwrap();

    let requests = body["requests"].as_array().unwrap();
    assert_eq!(requests.len(), 2);
    assert!(requests.iter().all(|r| r["status"] == "success"));
    assert!(body["front_channel_session"].is_null());

    assert!(app
        .transport
        .delivered
        .contains_key("https://app.example.org/logout"));
    assert!(app
        .transport
        .delivered
        .contains_key("https://wiki.example.org/logout"));
}

#[tokio::test]
async fn logout_skips_services_no_longer_registered() {
    let app = TestApp::spawn(vec![with_logout(
        1,
        "app",
        "https://app.example.org",
        LogoutType::BackChannel,
    )])
    .await;

    let tgt_id = app.login().await;
    app.grant(&tgt_id, "https://app.example.org/").await;

    // Deregister before destroy; the logout plan still carries the service
    // but delivery has nowhere to go
    app.catalog.delete(1).await.unwrap();

    let response = app
        .client
        .delete(app.url(&format!("/v1/tickets/{}", tgt_id)))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["requests"][0]["status"], "not_attempted");
}

#[tokio::test]
async fn front_channel_steps_visit_each_service_once() {
    let app = TestApp::spawn(vec![
        with_logout(1, "a", "https://a.example.org", LogoutType::FrontChannel),
        with_logout(2, "b", "https://b.example.org", LogoutType::FrontChannel),
    ])
    .await;

    let tgt_id = app.login().await;
    app.grant(&tgt_id, "https://a.example.org/").await;
    app.grant(&tgt_id, "https://b.example.org/").await;

    let response = app
        .client
        .delete(app.url(&format!("/v1/tickets/{}", tgt_id)))
        .send()
        .await
        .unwrap();
    let body: serde_json::Value = response.json().await.unwrap();
    let session_id = body["front_channel_session"].as_str().unwrap().to_string();

    let mut urls = Vec::new();
    loop {
        let response = app
            .client
            .get(app.url(&format!("/v1/logout/{}/next", session_id)))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let step: serde_json::Value = response.json().await.unwrap();
        if step["finished"].as_bool().unwrap() {
            break;
        }
        assert!(step["message"].as_str().is_some());
        urls.push(step["url"].as_str().unwrap().to_string());
    }

    assert_eq!(
        urls,
        vec![
            "https://a.example.org/logout".to_string(),
            "https://b.example.org/logout".to_string(),
        ]
    );

    // The session is gone once finished
    let response = app
        .client
        .get(app.url(&format!("/v1/logout/{}/next", session_id)))
        .send()
        .await
        .unwrap();
    let step: serde_json::Value = response.json().await.unwrap();
    assert!(step["finished"].as_bool().unwrap());
}

#[tokio::test]
async fn destroy_is_idempotent() {
    let app = TestApp::spawn(vec![with_logout(
        1,
        "app",
        "https://app.example.org",
        LogoutType::BackChannel,
    )])
    .await;
    let tgt_id = app.login().await;
    app.grant(&tgt_id, "https://app.example.org/").await;

    let first = app
        .client
        .delete(app.url(&format!("/v1/tickets/{}", tgt_id)))
        .send()
        .await
        .unwrap();
    let body: serde_json::Value = first.json().await.unwrap();
    assert_eq!(body["requests"].as_array().unwrap().len(), 1);

    let second = app
        .client
        .delete(app.url(&format!("/v1/tickets/{}", tgt_id)))
        .send()
        .await
        .unwrap();
    assert_eq!(second.status(), StatusCode::OK);
    let body: serde_json::Value = second.json().await.unwrap();
    assert!(body["requests"].as_array().unwrap().is_empty());
}
