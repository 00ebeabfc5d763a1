//! HttpRemoteStorage - IRemoteStorage implementation over the drive API
//!
//! Wraps a [`DriveClient`] and delegates uploads to the [`crate::upload`]
//! module to fulfil the `IRemoteStorage` port contract.
//!
//! ## Design Notes
//!
//! - Listing and folder creation parse wire DTOs and map them to the
//!   port-level `RemoteEntry`; the engine converts those to cache rows.
//! - Downloads buffer the full body. Files above the engine's size
//!   ceiling never reach this adapter, so streaming to disk is not
//!   needed here.

use anyhow::{Context, Result};
use reqwest::Method;
use serde::Deserialize;
use tracing::debug;

use twindrive_core::domain::newtypes::RemoteId;
use twindrive_core::domain::version::UploadMethod;
use twindrive_core::ports::{IRemoteStorage, RemoteEntry, RemoteUploadReceipt};

use crate::client::DriveClient;
use crate::upload;

// ============================================================================
// Drive API response types for deserialization
// ============================================================================

/// A single entry in a folder listing response
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EntryDto {
    /// Entry identifier
    id: String,
    /// File or folder name
    name: String,
    /// Parent folder identifier (absent for drive roots)
    parent_id: Option<String>,
    /// Entry kind: "file" or "folder"
    #[serde(rename = "type")]
    kind: String,
    /// File size in bytes (absent for folders)
    size: Option<u64>,
    /// Content hash (absent for folders)
    content_hash: Option<String>,
}

/// Folder listing response wrapper
#[derive(Debug, Deserialize)]
struct ListingDto {
    /// The folder's immediate children
    entries: Vec<EntryDto>,
}

fn entry_from_dto(dto: EntryDto) -> RemoteEntry {
    RemoteEntry {
        is_folder: dto.kind == "folder",
        id: dto.id,
        name: dto.name,
        parent_id: dto.parent_id,
        size: dto.size,
        content_hash: dto.content_hash,
    }
}

// ============================================================================
// HttpRemoteStorage
// ============================================================================

/// `IRemoteStorage` implementation backed by the drive HTTP API
pub struct HttpRemoteStorage {
    client: DriveClient,
}

impl HttpRemoteStorage {
    /// Creates a storage adapter over the given client
    pub fn new(client: DriveClient) -> Self {
        Self { client }
    }
}

#[async_trait::async_trait]
impl IRemoteStorage for HttpRemoteStorage {
    async fn list_folder(&self, folder_id: &RemoteId) -> Result<Vec<RemoteEntry>> {
        let path = format!("/v1/folders/{}/entries", folder_id.as_str());
        debug!("Listing remote folder {}", folder_id.as_str());

        let listing: ListingDto = self
            .client
            .request(Method::GET, &path)
            .send()
            .await
            .context("Failed to send folder listing request")?
            .error_for_status()
            .context("Folder listing returned error status")?
            .json()
            .await
            .context("Failed to parse folder listing")?;

        debug!(
            "Folder {} has {} entries",
            folder_id.as_str(),
            listing.entries.len()
        );
        Ok(listing.entries.into_iter().map(entry_from_dto).collect())
    }

    async fn create_folder(&self, parent_id: &RemoteId, name: &str) -> Result<RemoteEntry> {
        debug!("Creating remote folder {} under {}", name, parent_id.as_str());

        let entry: EntryDto = self
            .client
            .request(Method::POST, "/v1/folders")
            .json(&serde_json::json!({
                "parentId": parent_id.as_str(),
                "name": name,
            }))
            .send()
            .await
            .context("Failed to send folder creation request")?
            .error_for_status()
            .context("Folder creation returned error status")?
            .json()
            .await
            .context("Failed to parse created folder")?;

        debug!("Remote folder created: id={}", entry.id);
        Ok(entry_from_dto(entry))
    }

    async fn upload_file(
        &self,
        parent_id: &RemoteId,
        name: &str,
        data: &[u8],
        method: UploadMethod,
        progress: Option<Box<dyn Fn(u64, u64) + Send>>,
    ) -> Result<RemoteUploadReceipt> {
        match method {
            UploadMethod::Direct => {
                upload::upload_direct(&self.client, parent_id, name, data, progress).await
            }
            UploadMethod::Chunked => {
                upload::upload_chunked(&self.client, parent_id, name, data, progress).await
            }
        }
    }

    async fn download_file(&self, file_id: &RemoteId) -> Result<Vec<u8>> {
        let path = format!("/v1/files/{}/content", file_id.as_str());
        debug!("Downloading remote file {}", file_id.as_str());

        let bytes = self
            .client
            .request(Method::GET, &path)
            .send()
            .await
            .context("Failed to send download request")?
            .error_for_status()
            .context("Download returned error status")?
            .bytes()
            .await
            .context("Failed to read download body")?;

        debug!(
            "Downloaded {} bytes for {}",
            bytes.len(),
            file_id.as_str()
        );
        Ok(bytes.to_vec())
    }
}

// ============================================================================
// Tests
// ============================================================================
