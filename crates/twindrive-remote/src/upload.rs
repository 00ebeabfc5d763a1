//! Upload operations for the drive API
//!
//! Provides the two transfer paths behind `IRemoteStorage::upload_file`:
//! - [`upload_direct`] - Single-request upload for small files
//! - [`upload_chunked`] - Session-based upload in fixed-size chunks
//! - [`create_upload_session`] - Opens a session for a chunked transfer
//! - [`upload_chunk`] - Sends a single chunk within a session
//!
//! The engine chooses between direct and chunked based on its configured
//! size threshold; this module only executes the chosen method.

use anyhow::{Context, Result};
use reqwest::Method;
use serde::Deserialize;
use tracing::{debug, info};

use twindrive_core::domain::newtypes::RemoteId;
use twindrive_core::ports::RemoteUploadReceipt;

use crate::client::DriveClient;

/// Chunk size for session uploads: 8 MiB
const CHUNK_SIZE: usize = 8 * 1024 * 1024;

// ============================================================================
// Drive API response types for deserialization
// ============================================================================

/// Receipt returned by the API after a completed upload
///
/// The backend stores content and metadata as separate records and
/// returns all three identifiers in one response.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReceiptDto {
    /// Identifier of the stored content record
    data_id: String,
    /// Identifier of the stored metadata record
    metadata_id: String,
    /// Identifier of the file entry visible in listings
    file_id: String,
}

impl From<ReceiptDto> for RemoteUploadReceipt {
    fn from(dto: ReceiptDto) -> Self {
        Self {
            data_id: dto.data_id,
            metadata_id: dto.metadata_id,
            file_id: dto.file_id,
        }
    }
}

/// Response from opening an upload session
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UploadSessionResponse {
    /// Absolute URL chunk requests are sent to
    upload_url: String,
}

// ============================================================================
// upload_direct
// ============================================================================

/// Uploads a file in a single POST request
///
/// Sends the file bytes as an `application/octet-stream` body to
/// `POST /v1/folders/{parent}/files?name={name}`. The optional progress
/// callback is invoked once with `(total, total)` after the request
/// completes.
///
/// # Errors
/// Returns an error if the request fails or the receipt cannot be parsed
pub async fn upload_direct(
    client: &DriveClient,
    parent_id: &RemoteId,
    name: &str,
    data: &[u8],
    progress: Option<Box<dyn Fn(u64, u64) + Send>>,
) -> Result<RemoteUploadReceipt> {
    let total = data.len() as u64;
    let path = format!("/v1/folders/{}/files", parent_id.as_str());
    debug!("Uploading {} directly ({} bytes)", name, total);

    let receipt: ReceiptDto = client
        .request(Method::POST, &path)
        .query(&[("name", name)])
        .header("Content-Type", "application/octet-stream")
        .body(data.to_vec())
        .send()
        .await
        .context("Failed to send direct upload request")?
        .error_for_status()
        .context("Direct upload returned error status")?
        .json()
        .await
        .context("Failed to parse upload receipt")?;

    if let Some(ref cb) = progress {
        cb(total, total);
    }

    debug!(
        "Direct upload completed: file_id={}, data_id={}",
        receipt.file_id, receipt.data_id
    );
    Ok(receipt.into())
}

// ============================================================================
// create_upload_session
// ============================================================================

/// Opens a session for a chunked upload
///
/// Calls `POST /v1/uploads` with the target parent, name, and total
/// size. The returned URL accepts `PUT` chunk requests until the final
/// byte range lands.
///
/// # Errors
/// Returns an error if the session request fails
pub async fn create_upload_session(
    client: &DriveClient,
    parent_id: &RemoteId,
    name: &str,
    total: u64,
) -> Result<String> {
    debug!("Creating upload session for {} ({} bytes)", name, total);

    let response: UploadSessionResponse = client
        .request(Method::POST, "/v1/uploads")
        .json(&serde_json::json!({
            "parentId": parent_id.as_str(),
            "name": name,
            "size": total,
        }))
        .send()
        .await
        .context("Failed to create upload session")?
        .error_for_status()
        .context("Create upload session returned error status")?
        .json()
        .await
        .context("Failed to parse upload session response")?;

    debug!("Upload session created: {}", response.upload_url);
    Ok(response.upload_url)
}

// ============================================================================
// upload_chunk
// ============================================================================

/// Sends a single chunk to an upload session
///
/// Issues a `PUT` to the session URL with a `Content-Range` header
/// covering the chunk's byte range. The session URL is absolute, so the
/// raw HTTP client is used instead of [`DriveClient::request`].
///
/// # Returns
/// - `Some(Value)` with the receipt JSON once the final chunk lands
/// - `None` for intermediate chunks (HTTP 202 Accepted)
///
/// # Errors
/// Returns an error if the chunk request fails
pub async fn upload_chunk(
    client: &reqwest::Client,
    upload_url: &str,
    api_token: &str,
    data: &[u8],
    offset: u64,
    total: u64,
) -> Result<Option<serde_json::Value>> {
    let chunk_len = data.len() as u64;
    let range_end = offset + chunk_len - 1;
    let content_range = format!("bytes {}-{}/{}", offset, range_end, total);

    debug!("Uploading chunk: {} ({} bytes)", content_range, chunk_len);

    let response = client
        .put(upload_url)
        .bearer_auth(api_token)
        .header("Content-Length", chunk_len.to_string())
        .header("Content-Range", &content_range)
        .body(data.to_vec())
        .send()
        .await
        .context("Failed to send chunk request")?;

    let status = response.status();

    if status.is_success() {
        let body: serde_json::Value = response
            .json()
            .await
            .context("Failed to parse chunk response body")?;

        if status == reqwest::StatusCode::OK || status == reqwest::StatusCode::CREATED {
            debug!("Upload session completed (status {})", status);
            Ok(Some(body))
        } else {
            debug!("Chunk accepted (status {})", status);
            Ok(None)
        }
    } else {
        let error_body = response
            .text()
            .await
            .unwrap_or_else(|_| "unable to read error body".to_string());
        anyhow::bail!("Chunk upload failed with status {}: {}", status, error_body);
    }
}

// ============================================================================
// upload_chunked
// ============================================================================

/// Uploads a file through an upload session in 8 MiB chunks
///
/// Opens a session via [`create_upload_session`], sends each chunk via
/// [`upload_chunk`], reports progress after every chunk, and parses the
/// final response into a receipt.
///
/// # Errors
/// Returns an error if session creation, any chunk, or receipt parsing
/// fails. A failed chunk abandons the session; there is no resume.
pub async fn upload_chunked(
    client: &DriveClient,
    parent_id: &RemoteId,
    name: &str,
    data: &[u8],
    progress: Option<Box<dyn Fn(u64, u64) + Send>>,
) -> Result<RemoteUploadReceipt> {
    let total = data.len() as u64;
    info!(
        "Starting chunked upload: {} ({} bytes, {} chunks)",
        name,
        total,
        total.div_ceil(CHUNK_SIZE as u64)
    );

    let upload_url = create_upload_session(client, parent_id, name, total).await?;

    let http_client = client.http_client();
    let api_token = client.api_token();
    let mut offset: u64 = 0;
    let mut final_response: Option<serde_json::Value> = None;

    while offset < total {
        let end = std::cmp::min(offset + CHUNK_SIZE as u64, total);
        let chunk = &data[offset as usize..end as usize];

        let result = upload_chunk(http_client, &upload_url, api_token, chunk, offset, total)
            .await
            .with_context(|| {
                format!(
                    "Failed to upload chunk at offset {}/{} for {}",
                    offset, total, name
                )
            })?;

        offset = end;

        if let Some(ref cb) = progress {
            cb(offset, total);
        }

        if let Some(response) = result {
            final_response = Some(response);
        }
    }

    let response_json =
        final_response.context("Upload session completed without a final receipt")?;

    let receipt: ReceiptDto = serde_json::from_value(response_json)
        .context("Failed to deserialize final upload receipt")?;

    info!(
        "Chunked upload completed: file_id={}, data_id={}",
        receipt.file_id, receipt.data_id
    );
    Ok(receipt.into())
}

// ============================================================================
// Tests
// ============================================================================
