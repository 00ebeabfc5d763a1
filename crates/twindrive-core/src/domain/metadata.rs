//! MetadataEntry remote-state cache entity
//!
//! The metadata cache mirrors the remote folder tree for one mapping.
//! The reconciler rebuilds it wholesale on every pass: the previous
//! snapshot for the mapping is dropped and replaced with what the
//! remote listing returned. Rows are therefore only as fresh as the
//! last reconcile and carry no incremental history.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::errors::DomainError;
use super::newtypes::{ContentHash, MappingId, RelativePath, RemoteId, SyncPath};

/// Whether a remote entry is a file or a folder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    File,
    Folder,
}

impl EntryKind {
    /// Returns the kind name as a string
    pub fn name(&self) -> &'static str {
        match self {
            EntryKind::File => "file",
            EntryKind::Folder => "folder",
        }
    }
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for EntryKind {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "file" => Ok(EntryKind::File),
            "folder" => Ok(EntryKind::Folder),
            other => Err(DomainError::ValidationFailed(format!(
                "Unknown entry kind: {other}"
            ))),
        }
    }
}

/// Local materialization state of a cached remote entry
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    /// Local copy matches the cached remote state
    Synced,
    /// Entry is known but no transfer has been decided yet
    #[default]
    Pending,
    /// A download for this entry is in flight
    Downloading,
    /// The last attempt to materialize this entry failed
    Error,
}

impl SyncStatus {
    /// Returns the status name as a string
    pub fn name(&self) -> &'static str {
        match self {
            SyncStatus::Synced => "synced",
            SyncStatus::Pending => "pending",
            SyncStatus::Downloading => "downloading",
            SyncStatus::Error => "error",
        }
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for SyncStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "synced" => Ok(SyncStatus::Synced),
            "pending" => Ok(SyncStatus::Pending),
            "downloading" => Ok(SyncStatus::Downloading),
            "error" => Ok(SyncStatus::Error),
            other => Err(DomainError::ValidationFailed(format!(
                "Unknown sync status: {other}"
            ))),
        }
    }
}

/// One cached remote entry, keyed by (mapping_id, remote_id)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetadataEntry {
    /// The mapping this entry belongs to
    mapping_id: MappingId,
    /// Remote identifier of the entry
    remote_id: RemoteId,
    /// Remote identifier of the parent folder (None for the root)
    parent_remote_id: Option<RemoteId>,
    /// Entry name as reported by the remote
    name: String,
    /// Path relative to the mapping root
    path: RelativePath,
    /// File or folder
    kind: EntryKind,
    /// Size in bytes (None for folders)
    size: Option<u64>,
    /// Content hash, when the remote reports one
    content_hash: Option<ContentHash>,
    /// Absolute local path the entry materializes to
    local_path: SyncPath,
    /// Whether the local path existed at reconcile time
    local_file_exists: bool,
    /// Local materialization state
    sync_status: SyncStatus,
}

impl MetadataEntry {
    /// Creates a cache entry for a remote file
    #[allow(clippy::too_many_arguments)]
    pub fn file(
        mapping_id: MappingId,
        remote_id: RemoteId,
        parent_remote_id: Option<RemoteId>,
        name: impl Into<String>,
        path: RelativePath,
        size: u64,
        content_hash: Option<ContentHash>,
        local_path: SyncPath,
        local_file_exists: bool,
    ) -> Self {
        Self {
            mapping_id,
            remote_id,
            parent_remote_id,
            name: name.into(),
            path,
            kind: EntryKind::File,
            size: Some(size),
            content_hash,
            local_path,
            local_file_exists,
            sync_status: if local_file_exists {
                SyncStatus::Synced
            } else {
                SyncStatus::Pending
            },
        }
    }

    /// Creates a cache entry for a remote folder
    pub fn folder(
        mapping_id: MappingId,
        remote_id: RemoteId,
        parent_remote_id: Option<RemoteId>,
        name: impl Into<String>,
        path: RelativePath,
        local_path: SyncPath,
        local_file_exists: bool,
    ) -> Self {
        Self {
            mapping_id,
            remote_id,
            parent_remote_id,
            name: name.into(),
            path,
            kind: EntryKind::Folder,
            size: None,
            content_hash: None,
            local_path,
            local_file_exists,
            sync_status: if local_file_exists {
                SyncStatus::Synced
            } else {
                SyncStatus::Pending
            },
        }
    }

    /// Reconstructs a cache entry from stored fields
    #[allow(clippy::too_many_arguments)]
    pub fn from_parts(
        mapping_id: MappingId,
        remote_id: RemoteId,
        parent_remote_id: Option<RemoteId>,
        name: String,
        path: RelativePath,
        kind: EntryKind,
        size: Option<u64>,
        content_hash: Option<ContentHash>,
        local_path: SyncPath,
        local_file_exists: bool,
        sync_status: SyncStatus,
    ) -> Self {
        Self {
            mapping_id,
            remote_id,
            parent_remote_id,
            name,
            path,
            kind,
            size,
            content_hash,
            local_path,
            local_file_exists,
            sync_status,
        }
    }

    // --- Getters ---

    /// Returns the mapping id
    pub fn mapping_id(&self) -> MappingId {
        self.mapping_id
    }

    /// Returns the remote identifier
    pub fn remote_id(&self) -> &RemoteId {
        &self.remote_id
    }

    /// Returns the parent's remote identifier, if any
    pub fn parent_remote_id(&self) -> Option<&RemoteId> {
        self.parent_remote_id.as_ref()
    }

    /// Returns the entry name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the path relative to the mapping root
    pub fn path(&self) -> &RelativePath {
        &self.path
    }

    /// Returns whether the entry is a file or a folder
    pub fn kind(&self) -> EntryKind {
        self.kind
    }

    /// Returns the size in bytes, if known
    pub fn size(&self) -> Option<u64> {
        self.size
    }

    /// Returns the content hash, if the remote reported one
    pub fn content_hash(&self) -> Option<&ContentHash> {
        self.content_hash.as_ref()
    }

    /// Returns the absolute local path
    pub fn local_path(&self) -> &SyncPath {
        &self.local_path
    }

    /// Returns whether the local path existed at reconcile time
    pub fn local_file_exists(&self) -> bool {
        self.local_file_exists
    }

    /// Returns the local materialization state
    pub fn sync_status(&self) -> SyncStatus {
        self.sync_status
    }

    // --- Mutations ---

    /// Marks a download as in flight
    pub fn mark_downloading(&mut self) {
        self.sync_status = SyncStatus::Downloading;
    }

    /// Marks the entry as materialized locally
    pub fn mark_synced(&mut self) {
        self.local_file_exists = true;
        self.sync_status = SyncStatus::Synced;
    }

    /// Marks the last materialization attempt as failed
    pub fn mark_error(&mut self) {
        self.sync_status = SyncStatus::Error;
    }

    /// Returns true if the entry is a file that still needs a local copy
    pub fn needs_download(&self) -> bool {
        self.kind == EntryKind::File
            && !self.local_file_exists
            && self.sync_status == SyncStatus::Pending
    }
}
