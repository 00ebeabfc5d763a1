//! Remote storage port (driven/secondary port)
//!
//! This module defines the interface for interacting with the remote
//! drive backend. The primary implementation targets the TwinDrive HTTP
//! API, but the trait is deliberately narrow so other backends can be
//! slotted in without touching the engine.
//!
//! ## Design Notes
//!
//! - Uses `anyhow::Result` because errors at port boundaries are
//!   adapter-specific and don't need domain-level classification.
//! - `RemoteEntry` and `RemoteUploadReceipt` are port-level DTOs with
//!   raw string identifiers; use cases are responsible for mapping them
//!   to domain newtypes.

use serde::{Deserialize, Serialize};

use crate::domain::newtypes::RemoteId;
use crate::domain::version::UploadMethod;

// ============================================================================
// RemoteEntry DTO
// ============================================================================

/// A single entry returned by a remote folder listing
///
/// This is a port-level DTO that represents raw data from the remote
/// backend. Use cases map `RemoteEntry` instances to `MetadataEntry`
/// cache rows.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteEntry {
    /// Backend-specific entry identifier
    pub id: String,
    /// Entry name (file or folder name)
    pub name: String,
    /// Parent folder identifier (None for root entries)
    pub parent_id: Option<String>,
    /// Whether this entry is a folder
    pub is_folder: bool,
    /// File size in bytes (None for folders)
    pub size: Option<u64>,
    /// Content hash for integrity comparison (None for folders, or when
    /// the backend does not report one)
    pub content_hash: Option<String>,
}

// ============================================================================
// RemoteUploadReceipt DTO
// ============================================================================

/// Identifiers returned by the backend after a completed upload
///
/// The backend stores content and metadata as separate records; both
/// identifiers are retained so later operations can address either.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteUploadReceipt {
    /// Identifier of the stored content record
    pub data_id: String,
    /// Identifier of the stored metadata record
    pub metadata_id: String,
    /// Identifier of the file entry visible in folder listings
    pub file_id: String,
}

// ============================================================================
// IRemoteStorage trait
// ============================================================================

/// Port trait for remote drive operations
///
/// This is the complete remote surface the engine depends on: listing,
/// folder creation, upload, and download. Implementations handle the
/// backend-specific API calls and error mapping.
///
/// ## Implementation Notes
///
/// - Implementations should not retry internally; the engine treats a
///   failed transfer as terminal and surfaces it for manual re-trigger.
/// - The `progress` callback in `upload_file` is called with
///   `(bytes_sent, total_bytes)` as the transfer advances.
#[async_trait::async_trait]
pub trait IRemoteStorage: Send + Sync {
    /// Lists the direct children of a remote folder
    ///
    /// # Arguments
    /// * `folder_id` - Backend identifier of the folder to list
    ///
    /// # Returns
    /// The folder's immediate children (no recursion)
    async fn list_folder(&self, folder_id: &RemoteId) -> anyhow::Result<Vec<RemoteEntry>>;

    /// Creates a folder under the given parent
    ///
    /// # Arguments
    /// * `parent_id` - Backend identifier of the parent folder
    /// * `name` - The folder name
    ///
    /// # Returns
    /// The created folder as a listing entry
    async fn create_folder(&self, parent_id: &RemoteId, name: &str)
        -> anyhow::Result<RemoteEntry>;

    /// Uploads a file into the given parent folder
    ///
    /// # Arguments
    /// * `parent_id` - Backend identifier of the parent folder
    /// * `name` - The file name
    /// * `data` - The file contents
    /// * `method` - Direct or chunked transfer
    /// * `progress` - Optional callback reporting (bytes_sent, total_bytes)
    ///
    /// # Returns
    /// A receipt with the backend identifiers of the stored records
    async fn upload_file(
        &self,
        parent_id: &RemoteId,
        name: &str,
        data: &[u8],
        method: UploadMethod,
        progress: Option<Box<dyn Fn(u64, u64) + Send>>,
    ) -> anyhow::Result<RemoteUploadReceipt>;

    /// Downloads a file's content by its remote ID
    ///
    /// # Arguments
    /// * `file_id` - Backend identifier of the file
    ///
    /// # Returns
    /// The file contents as a byte vector
    async fn download_file(&self, file_id: &RemoteId) -> anyhow::Result<Vec<u8>>;
}
