//! Integration tests for uploads and downloads

use std::sync::{Arc, Mutex};

use wiremock::matchers::{body_bytes, header, method, path, query_param};
use wiremock::{Mock, ResponseTemplate};

use twindrive_core::domain::newtypes::RemoteId;
use twindrive_core::domain::version::UploadMethod;
use twindrive_core::ports::IRemoteStorage;

use crate::common;

fn remote_id(s: &str) -> RemoteId {
    RemoteId::new(s.to_string()).unwrap()
}

#[tokio::test]
async fn test_direct_upload_returns_receipt() {
    let (server, storage) = common::setup_storage().await;
    let data = b"direct upload payload".to_vec();

    Mock::given(method("POST"))
        .and(path("/v1/folders/root-1/files"))
        .and(query_param("name", "payload.bin"))
        .and(body_bytes(data.clone()))
        .respond_with(ResponseTemplate::new(201).set_body_json(common::receipt_json("d1")))
        .mount(&server)
        .await;

    let receipt = storage
        .upload_file(
            &remote_id("root-1"),
            "payload.bin",
            &data,
            UploadMethod::Direct,
            None,
        )
        .await
        .unwrap();

    assert_eq!(receipt.data_id, "data-d1");
    assert_eq!(receipt.metadata_id, "meta-d1");
    assert_eq!(receipt.file_id, "file-d1");
}

#[tokio::test]
async fn test_direct_upload_reports_progress_once() {
    let (server, storage) = common::setup_storage().await;
    let data = vec![1u8; 256];

    common::mount_direct_upload(&server, "root-1", common::receipt_json("p1")).await;

    let seen: Arc<Mutex<Vec<(u64, u64)>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);

    storage
        .upload_file(
            &remote_id("root-1"),
            "small.bin",
            &data,
            UploadMethod::Direct,
            Some(Box::new(move |sent, total| {
                sink.lock().unwrap().push((sent, total));
            })),
        )
        .await
        .unwrap();

    assert_eq!(*seen.lock().unwrap(), vec![(256, 256)]);
}

#[tokio::test]
async fn test_direct_upload_surfaces_server_errors() {
    let (server, storage) = common::setup_storage().await;

    Mock::given(method("POST"))
        .and(path("/v1/folders/root-1/files"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let result = storage
        .upload_file(
            &remote_id("root-1"),
            "doomed.bin",
            b"data",
            UploadMethod::Direct,
            None,
        )
        .await;

    let err = result.unwrap_err();
    assert!(err.to_string().contains("error status"));
}

#[tokio::test]
async fn test_chunked_upload_splits_into_ranges() {
    let (server, storage) = common::setup_storage().await;

    // 12 MiB payload, 8 MiB chunk size: two chunks.
    let total: u64 = 12 * 1024 * 1024;
    let data = vec![7u8; total as usize];
    let session_url_path = "/v1/uploads/session-1";

    Mock::given(method("POST"))
        .and(path("/v1/uploads"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "uploadUrl": format!("{}{}", server.uri(), session_url_path)
        })))
        .mount(&server)
        .await;

    Mock::given(method("PUT"))
        .and(path(session_url_path))
        .and(header(
            "Content-Range",
            format!("bytes 0-8388607/{}", total).as_str(),
        ))
        .respond_with(
            ResponseTemplate::new(202)
                .set_body_json(serde_json::json!({ "receivedBytes": 8388608_u64 })),
        )
        .mount(&server)
        .await;

    Mock::given(method("PUT"))
        .and(path(session_url_path))
        .and(header(
            "Content-Range",
            format!("bytes 8388608-{}/{}", total - 1, total).as_str(),
        ))
        .respond_with(ResponseTemplate::new(201).set_body_json(common::receipt_json("c1")))
        .mount(&server)
        .await;

    let seen: Arc<Mutex<Vec<(u64, u64)>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);

    let receipt = storage
        .upload_file(
            &remote_id("root-1"),
            "big.bin",
            &data,
            UploadMethod::Chunked,
            Some(Box::new(move |sent, total| {
                sink.lock().unwrap().push((sent, total));
            })),
        )
        .await
        .unwrap();

    assert_eq!(receipt.file_id, "file-c1");
    assert_eq!(
        *seen.lock().unwrap(),
        vec![(8388608, total), (total, total)]
    );
}

#[tokio::test]
async fn test_chunked_upload_fails_when_a_chunk_is_rejected() {
    let (server, storage) = common::setup_storage().await;
    let data = vec![3u8; 1024];

    Mock::given(method("POST"))
        .and(path("/v1/uploads"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "uploadUrl": format!("{}/v1/uploads/session-2", server.uri())
        })))
        .mount(&server)
        .await;

    Mock::given(method("PUT"))
        .and(path("/v1/uploads/session-2"))
        .respond_with(ResponseTemplate::new(507).set_body_string("quota exceeded"))
        .mount(&server)
        .await;

    let result = storage
        .upload_file(
            &remote_id("root-1"),
            "big.bin",
            &data,
            UploadMethod::Chunked,
            None,
        )
        .await;

    let err = result.unwrap_err();
    assert!(format!("{:#}", err).contains("quota exceeded"));
}

#[tokio::test]
async fn test_download_returns_bytes() {
    let (server, storage) = common::setup_storage().await;
    let content = b"downloaded file contents";

    common::mount_download(&server, "file-9", content).await;

    let bytes = storage.download_file(&remote_id("file-9")).await.unwrap();
    assert_eq!(bytes, content);
}

#[tokio::test]
async fn test_download_missing_file_is_an_error() {
    let (server, storage) = common::setup_storage().await;

    Mock::given(method("GET"))
        .and(path("/v1/files/gone/content"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let result = storage.download_file(&remote_id("gone")).await;
    assert!(result.is_err());
}
