//! Integration tests for folder listing and creation

use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, ResponseTemplate};

use twindrive_core::domain::newtypes::RemoteId;
use twindrive_core::ports::IRemoteStorage;

use crate::common;

fn remote_id(s: &str) -> RemoteId {
    RemoteId::new(s.to_string()).unwrap()
}

#[tokio::test]
async fn test_list_folder_maps_entries() {
    let (server, storage) = common::setup_storage().await;

    common::mount_listing(
        &server,
        "root-1",
        serde_json::json!([
            common::file_entry_json("e1", "notes.txt", "root-1", 512),
            common::folder_entry_json("e2", "archive", "root-1"),
        ]),
    )
    .await;

    let entries = storage.list_folder(&remote_id("root-1")).await.unwrap();

    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].id, "e1");
    assert_eq!(entries[0].name, "notes.txt");
    assert!(!entries[0].is_folder);
    assert_eq!(entries[0].size, Some(512));
    assert_eq!(entries[0].parent_id, Some("root-1".to_string()));
    assert!(entries[1].is_folder);
    assert!(entries[1].size.is_none());
}

#[tokio::test]
async fn test_list_folder_empty() {
    let (server, storage) = common::setup_storage().await;
    common::mount_listing(&server, "empty-folder", serde_json::json!([])).await;

    let entries = storage
        .list_folder(&remote_id("empty-folder"))
        .await
        .unwrap();
    assert!(entries.is_empty());
}

#[tokio::test]
async fn test_list_folder_surfaces_server_errors() {
    let (server, storage) = common::setup_storage().await;

    Mock::given(method("GET"))
        .and(path("/v1/folders/broken/entries"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let result = storage.list_folder(&remote_id("broken")).await;
    let err = result.unwrap_err();
    assert!(err.to_string().contains("error status"));
}

#[tokio::test]
async fn test_requests_carry_bearer_token() {
    let (server, storage) = common::setup_storage().await;

    // The mock only matches when the Authorization header is present,
    // so a successful call proves the token was sent.
    Mock::given(method("GET"))
        .and(path("/v1/folders/auth-check/entries"))
        .and(header(
            "Authorization",
            format!("Bearer {}", common::TEST_TOKEN).as_str(),
        ))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "entries": []
        })))
        .mount(&server)
        .await;

    let entries = storage.list_folder(&remote_id("auth-check")).await.unwrap();
    assert!(entries.is_empty());
}

#[tokio::test]
async fn test_create_folder_returns_entry() {
    let (server, storage) = common::setup_storage().await;

    Mock::given(method("POST"))
        .and(path("/v1/folders"))
        .and(body_partial_json(serde_json::json!({
            "parentId": "root-1",
            "name": "reports"
        })))
        .respond_with(
            ResponseTemplate::new(201)
                .set_body_json(common::folder_entry_json("new-folder", "reports", "root-1")),
        )
        .mount(&server)
        .await;

    let entry = storage
        .create_folder(&remote_id("root-1"), "reports")
        .await
        .unwrap();

    assert_eq!(entry.id, "new-folder");
    assert_eq!(entry.name, "reports");
    assert!(entry.is_folder);
    assert_eq!(entry.parent_id, Some("root-1".to_string()));
}

#[tokio::test]
async fn test_create_folder_surfaces_conflict() {
    let (server, storage) = common::setup_storage().await;

    Mock::given(method("POST"))
        .and(path("/v1/folders"))
        .respond_with(ResponseTemplate::new(409))
        .mount(&server)
        .await;

    let result = storage.create_folder(&remote_id("root-1"), "dup").await;
    assert!(result.is_err());
}
