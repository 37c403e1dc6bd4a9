//! Hot-reload tests for the file-backed service registry.

mod common;

use common::{TestApp, registered};
use std::time::Duration;

async fn wait_for_size(app: &TestApp, expected: usize) {
    for _ in 0..100 {
        if app.catalog.size().await == expected {
            return;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    panic!(
        "catalog never reached {} services (currently {})",
        expected,
        app.catalog.size().await
    );
}

#[tokio::test]
async fn created_definition_file_is_picked_up() {
    let dir = tempfile::tempdir().unwrap();
    let app = TestApp::spawn_with_dir(dir.path()).await;
    assert_eq!(app.catalog.size().await, 0);

    let service = registered(1, "app", "https://app.example.org");
    tokio::fs::write(
        dir.path().join("app-1.json"),
        serde_json::to_vec_pretty(&service).unwrap(),
    )
    .await
    .unwrap();

    wait_for_size(&app, 1).await;

    // The new definition serves grants without a restart
    let tgt_id = app.login().await;
    let st_id = app.grant(&tgt_id, "https://app.example.org/login").await;
    assert!(st_id.starts_with("ST-"));
}

#[tokio::test]
async fn modified_definition_file_is_merged() {
    let dir = tempfile::tempdir().unwrap();
    let mut service = registered(1, "app", "https://app.example.org");
    tokio::fs::write(
        dir.path().join("app-1.json"),
        serde_json::to_vec_pretty(&service).unwrap(),
    )
    .await
    .unwrap();

    let app = TestApp::spawn_with_dir(dir.path()).await;
    wait_for_size(&app, 1).await;

    // Disable the service on disk; the next poll must pick it up
    tokio::time::sleep(Duration::from_millis(50)).await;
    service.access_strategy.enabled = false;
    tokio::fs::write(
        dir.path().join("app-1.json"),
        serde_json::to_vec_pretty(&service).unwrap(),
    )
    .await
    .unwrap();

    for _ in 0..100 {
        if let Some(current) = app.catalog.get_service(1).await {
            if !current.access_strategy.enabled {
                return;
            }
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    panic!("modified definition was never merged");
}

#[tokio::test]
async fn deleted_definition_file_triggers_full_reload() {
    let dir = tempfile::tempdir().unwrap();
    let app_def = registered(1, "app", "https://app.example.org");
    let wiki_def = registered(2, "wiki", "https://wiki.example.org");
    tokio::fs::write(
        dir.path().join("app-1.json"),
        serde_json::to_vec_pretty(&app_def).unwrap(),
    )
    .await
    .unwrap();
    tokio::fs::write(
        dir.path().join("wiki-2.json"),
        serde_json::to_vec_pretty(&wiki_def).unwrap(),
    )
    .await
    .unwrap();

    let app = TestApp::spawn_with_dir(dir.path()).await;
    wait_for_size(&app, 2).await;

    tokio::fs::remove_file(dir.path().join("app-1.json"))
        .await
        .unwrap();
    wait_for_size(&app, 1).await;
    assert!(app.catalog.get_service(1).await.is_none());
    assert!(app.catalog.get_service(2).await.is_some());
}

#[tokio::test]
async fn unparseable_definition_file_is_skipped() {
    let dir = tempfile::tempdir().unwrap();
    let service = registered(1, "app", "https://app.example.org");
    tokio::fs::write(
        dir.path().join("app-1.json"),
        serde_json::to_vec_pretty(&service).unwrap(),
    )
    .await
    .unwrap();
    tokio::fs::write(dir.path().join("broken.json"), b"{ not json")
        .await
        .unwrap();

    let app = TestApp::spawn_with_dir(dir.path()).await;
    wait_for_size(&app, 1).await;
    assert!(app.catalog.get_service(1).await.is_some());
}
