//! State store port (driven/secondary port)
//!
//! This module defines the interface for persisting and querying all
//! engine state: mappings, version chains, transfers, the dedup ledger,
//! the audit log, and the remote metadata cache.
//!
//! ## Design Notes
//!
//! - Uses `anyhow::Result` because storage errors are adapter-specific
//!   (SQLite, filesystem, etc.) and don't need domain-level classification.
//! - The `VersionFilter` struct provides a composable query mechanism
//!   without exposing storage implementation details.
//! - All write operations take references to domain entities, allowing
//!   the caller to retain ownership.
//! - `append_version` is the only compound write: the supersede of the
//!   previous head and the insert of the new head must land atomically
//!   so the per-path "exactly one latest" invariant survives crashes.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::domain::{
    newtypes::{ContentHash, MappingId, RelativePath, RemoteId, SyncPath, TransferId, VersionId},
    transfer::UploadStatus,
    version::ChangeType,
    Download, DriveMapping, FileOperation, FileVersion, MetadataEntry, PendingUpload,
    ProcessedFile, Upload,
};

// ============================================================================
// VersionFilter struct
// ============================================================================

/// Filter criteria for querying file versions
///
/// All fields are optional; when `None`, no filtering is applied for
/// that field. Multiple filters are combined with AND logic.
#[derive(Debug, Clone, Default)]
pub struct VersionFilter {
    /// Filter by mapping ID
    pub mapping_id: Option<MappingId>,
    /// Filter by change type
    pub change_type: Option<ChangeType>,
    /// Filter by path prefix (versions whose path starts with this prefix)
    pub path_prefix: Option<SyncPath>,
    /// Only return the latest version of each path
    pub latest_only: bool,
    /// Filter by creation time (versions created after this timestamp)
    pub created_since: Option<DateTime<Utc>>,
}

impl VersionFilter {
    /// Creates a new empty filter (matches all versions)
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the mapping ID filter
    pub fn with_mapping_id(mut self, mapping_id: MappingId) -> Self {
        self.mapping_id = Some(mapping_id);
        self
    }

    /// Sets the change type filter
    pub fn with_change_type(mut self, change_type: ChangeType) -> Self {
        self.change_type = Some(change_type);
        self
    }

    /// Sets the path prefix filter
    pub fn with_path_prefix(mut self, path_prefix: SyncPath) -> Self {
        self.path_prefix = Some(path_prefix);
        self
    }

    /// Restricts the query to latest versions only
    pub fn latest_only(mut self) -> Self {
        self.latest_only = true;
        self
    }

    /// Sets the created since filter
    pub fn with_created_since(mut self, since: DateTime<Utc>) -> Self {
        self.created_since = Some(since);
        self
    }

    /// Returns true if no filters are set
    pub fn is_empty(&self) -> bool {
        self.mapping_id.is_none()
            && self.change_type.is_none()
            && self.path_prefix.is_none()
            && !self.latest_only
            && self.created_since.is_none()
    }
}

// ============================================================================
// IStateStore trait
// ============================================================================

/// Port trait for persistent state storage
///
/// This is the primary interface for all persistence operations in
/// TwinDrive. It covers CRUD operations for every domain entity the
/// engine tracks: mappings, file versions, pending uploads, uploads,
/// downloads, the dedup ledger, the audit log, and the metadata cache.
///
/// ## Implementation Notes
///
/// - Implementations should ensure atomicity for individual operations.
/// - `append_version` must supersede the previous head and insert the
///   new head inside one transaction.
/// - `replace_metadata` drops the mapping's entire cached tree and
///   inserts the replacement snapshot inside one transaction.
/// - The `count_transfers_by_status` method returns a map where keys
///   are status names (as returned by `UploadStatus::name()`) and
///   values are counts.
#[async_trait::async_trait]
pub trait IStateStore: Send + Sync {
    // --- Mapping operations ---

    /// Saves a drive mapping (insert or update)
    async fn save_mapping(&self, mapping: &DriveMapping) -> anyhow::Result<()>;

    /// Retrieves a mapping by its ID
    async fn get_mapping(&self, id: MappingId) -> anyhow::Result<Option<DriveMapping>>;

    /// Retrieves all configured mappings
    async fn list_mappings(&self) -> anyhow::Result<Vec<DriveMapping>>;

    // --- FileVersion operations ---

    /// Appends a version to a path's chain
    ///
    /// Clears `is_latest` on the current head for the version's
    /// (mapping, path) pair and inserts the new version as the head,
    /// atomically. Passing a version that is not marked latest is a
    /// caller bug and implementations may reject it.
    async fn append_version(&self, version: &FileVersion) -> anyhow::Result<()>;

    /// Updates a stored version in place (remote IDs, upload method)
    async fn update_version(&self, version: &FileVersion) -> anyhow::Result<()>;

    /// Retrieves a version by its ID
    async fn get_version(&self, id: VersionId) -> anyhow::Result<Option<FileVersion>>;

    /// Retrieves the latest version for a path within a mapping
    async fn get_latest_version(
        &self,
        mapping_id: MappingId,
        path: &SyncPath,
    ) -> anyhow::Result<Option<FileVersion>>;

    /// Retrieves the latest versions matching a content hash
    ///
    /// Used for move detection: a missing path whose hash reappears at
    /// another path is a relocation, not a new file.
    async fn get_latest_versions_by_hash(
        &self,
        mapping_id: MappingId,
        hash: &ContentHash,
    ) -> anyhow::Result<Vec<FileVersion>>;

    /// Queries versions matching the given filter criteria
    async fn query_versions(&self, filter: &VersionFilter) -> anyhow::Result<Vec<FileVersion>>;

    /// Retrieves the full version chain for a path, oldest first
    async fn get_version_chain(
        &self,
        mapping_id: MappingId,
        path: &SyncPath,
    ) -> anyhow::Result<Vec<FileVersion>>;

    // --- PendingUpload operations ---

    /// Saves a pending upload (insert or update)
    async fn save_pending_upload(&self, pending: &PendingUpload) -> anyhow::Result<()>;

    /// Retrieves a pending upload by its ID
    async fn get_pending_upload(&self, id: TransferId) -> anyhow::Result<Option<PendingUpload>>;

    /// Retrieves all pending uploads awaiting approval, oldest first
    async fn list_awaiting_approval(&self) -> anyhow::Result<Vec<PendingUpload>>;

    /// Removes a pending upload once it has been promoted or rejected
    async fn delete_pending_upload(&self, id: TransferId) -> anyhow::Result<()>;

    // --- Upload operations ---

    /// Saves an upload (insert or update)
    async fn save_upload(&self, upload: &Upload) -> anyhow::Result<()>;

    /// Retrieves an upload by its ID
    async fn get_upload(&self, id: TransferId) -> anyhow::Result<Option<Upload>>;

    /// Retrieves the next upload to execute for a mapping
    ///
    /// Returns the pending upload with the highest priority, breaking
    /// ties by earliest creation time. Returns `None` when the mapping's
    /// queue is empty.
    async fn next_queued_upload(&self, mapping_id: MappingId) -> anyhow::Result<Option<Upload>>;

    /// Retrieves all uploads with the given status, oldest first
    async fn list_uploads_by_status(&self, status: UploadStatus) -> anyhow::Result<Vec<Upload>>;

    /// Counts uploads grouped by status for a given mapping
    ///
    /// Returns a map where keys are status names (e.g., "pending",
    /// "failed") and values are the number of uploads in each status.
    async fn count_transfers_by_status(
        &self,
        mapping_id: MappingId,
    ) -> anyhow::Result<HashMap<String, u64>>;

    // --- Download operations ---

    /// Saves a download (insert or update)
    async fn save_download(&self, download: &Download) -> anyhow::Result<()>;

    /// Retrieves a download by its ID
    async fn get_download(&self, id: TransferId) -> anyhow::Result<Option<Download>>;

    // --- Dedup ledger operations ---

    /// Records a fully handled (hash, mapping) pair
    ///
    /// If the pair is already present the row is replaced; the ledger
    /// keys on content, not on occurrence count.
    async fn record_processed(&self, entry: &ProcessedFile) -> anyhow::Result<()>;

    /// Returns true if the (hash, mapping) pair is in the ledger
    async fn is_processed(
        &self,
        mapping_id: MappingId,
        hash: &ContentHash,
    ) -> anyhow::Result<bool>;

    /// Retrieves a ledger row by its (hash, mapping) key
    async fn get_processed(
        &self,
        mapping_id: MappingId,
        hash: &ContentHash,
    ) -> anyhow::Result<Option<ProcessedFile>>;

    // --- Audit operations ---

    /// Appends an operation to the audit log
    async fn record_operation(&self, operation: &FileOperation) -> anyhow::Result<()>;

    /// Retrieves audit entries since a given timestamp, up to a limit
    ///
    /// Returns entries ordered by timestamp (newest first).
    async fn get_operations_since(
        &self,
        since: DateTime<Utc>,
        limit: u32,
    ) -> anyhow::Result<Vec<FileOperation>>;

    // --- Metadata cache operations ---

    /// Replaces a mapping's entire cached remote tree
    ///
    /// Deletes every existing entry for the mapping and inserts the
    /// given snapshot inside one transaction.
    async fn replace_metadata(
        &self,
        mapping_id: MappingId,
        entries: &[MetadataEntry],
    ) -> anyhow::Result<()>;

    /// Retrieves a cached entry by its remote ID
    async fn get_metadata_entry(
        &self,
        mapping_id: MappingId,
        remote_id: &RemoteId,
    ) -> anyhow::Result<Option<MetadataEntry>>;

    /// Retrieves a cached entry by its path relative to the mapping root
    async fn get_metadata_by_path(
        &self,
        mapping_id: MappingId,
        path: &RelativePath,
    ) -> anyhow::Result<Option<MetadataEntry>>;

    /// Retrieves all cached entries for a mapping
    async fn list_metadata(&self, mapping_id: MappingId) -> anyhow::Result<Vec<MetadataEntry>>;

    /// Updates a cached entry's materialization state
    async fn update_metadata_entry(&self, entry: &MetadataEntry) -> anyhow::Result<()>;
}
