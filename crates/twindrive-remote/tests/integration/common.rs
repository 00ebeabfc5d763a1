//! Shared test helpers for drive API integration tests
//!
//! Provides wiremock-based mock server setup for drive API endpoints.
//! Each helper mounts the necessary mock endpoints; tests construct a
//! storage adapter pointed at the mock server via [`setup_storage`].

use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use twindrive_remote::{DriveClient, HttpRemoteStorage};

/// Bearer token used by every test client.
pub const TEST_TOKEN: &str = "test-api-token";

/// Starts a mock server and returns it with a storage adapter pointed
/// at it.
pub async fn setup_storage() -> (MockServer, HttpRemoteStorage) {
    let server = MockServer::start().await;
    let client = DriveClient::with_base_url(TEST_TOKEN, server.uri());
    (server, HttpRemoteStorage::new(client))
}

/// Builds a listing entry JSON object for a file.
pub fn file_entry_json(id: &str, name: &str, parent_id: &str, size: u64) -> serde_json::Value {
    serde_json::json!({
        "id": id,
        "name": name,
        "parentId": parent_id,
        "type": "file",
        "size": size,
        "contentHash": "0000000000000000000000000000000000000000000000000000000000000000"
    })
}

/// Builds a listing entry JSON object for a folder.
pub fn folder_entry_json(id: &str, name: &str, parent_id: &str) -> serde_json::Value {
    serde_json::json!({
        "id": id,
        "name": name,
        "parentId": parent_id,
        "type": "folder"
    })
}

/// Mounts a folder listing endpoint returning the given entries.
pub async fn mount_listing(server: &MockServer, folder_id: &str, entries: serde_json::Value) {
    let path_str = format!("/v1/folders/{}/entries", folder_id);
    Mock::given(method("GET"))
        .and(path(&path_str))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({ "entries": entries })),
        )
        .mount(server)
        .await;
}

/// Builds an upload receipt JSON object.
pub fn receipt_json(suffix: &str) -> serde_json::Value {
    serde_json::json!({
        "dataId": format!("data-{}", suffix),
        "metadataId": format!("meta-{}", suffix),
        "fileId": format!("file-{}", suffix)
    })
}

/// Mounts a direct upload endpoint for the given parent folder.
pub async fn mount_direct_upload(
    server: &MockServer,
    parent_id: &str,
    receipt: serde_json::Value,
) {
    let path_str = format!("/v1/folders/{}/files", parent_id);
    Mock::given(method("POST"))
        .and(path(&path_str))
        .respond_with(ResponseTemplate::new(201).set_body_json(receipt))
        .mount(server)
        .await;
}

/// Mounts a file download endpoint for a specific file ID.
pub async fn mount_download(server: &MockServer, file_id: &str, content: &[u8]) {
    let path_str = format!("/v1/files/{}/content", file_id);
    Mock::given(method("GET"))
        .and(path(&path_str))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(content.to_vec())
                .append_header("Content-Type", "application/octet-stream"),
        )
        .mount(server)
        .await;
}
