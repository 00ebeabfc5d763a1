//! FileOperation audit entity
//!
//! Append-only log of everything the engine did to a file: uploads,
//! downloads, renames, moves, deletes. Rows are never mutated or
//! deleted; the store assigns the row id on insert.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::errors::DomainError;
use super::newtypes::{ContentHash, MappingId, OperationId, SyncPath};

/// Kind of operation recorded in the audit log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Upload,
    Download,
    Rename,
    Move,
    Delete,
}

impl OperationKind {
    /// Returns the operation name as a string
    pub fn name(&self) -> &'static str {
        match self {
            OperationKind::Upload => "upload",
            OperationKind::Download => "download",
            OperationKind::Rename => "rename",
            OperationKind::Move => "move",
            OperationKind::Delete => "delete",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for OperationKind {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "upload" => Ok(OperationKind::Upload),
            "download" => Ok(OperationKind::Download),
            "rename" => Ok(OperationKind::Rename),
            "move" => Ok(OperationKind::Move),
            "delete" => Ok(OperationKind::Delete),
            other => Err(DomainError::ValidationFailed(format!(
                "Unknown operation kind: {other}"
            ))),
        }
    }
}

/// One append-only audit entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileOperation {
    /// Row id assigned by the store (None before insert)
    id: Option<OperationId>,
    /// The mapping this operation belongs to
    mapping_id: MappingId,
    /// Content hash of the affected file
    content_hash: ContentHash,
    /// What happened
    operation: OperationKind,
    /// Source path for rename/move/delete
    from_path: Option<SyncPath>,
    /// Destination path for upload/download/rename/move
    to_path: Option<SyncPath>,
    /// Opaque context captured at the time (never interpreted)
    metadata: serde_json::Value,
    /// When the operation happened
    timestamp: DateTime<Utc>,
}

impl FileOperation {
    /// Creates a new audit entry, timestamped now
    pub fn new(
        mapping_id: MappingId,
        content_hash: ContentHash,
        operation: OperationKind,
        from_path: Option<SyncPath>,
        to_path: Option<SyncPath>,
        metadata: serde_json::Value,
    ) -> Self {
        Self {
            id: None,
            mapping_id,
            content_hash,
            operation,
            from_path,
            to_path,
            metadata,
            timestamp: Utc::now(),
        }
    }

    /// Reconstructs an entry from stored fields
    pub fn from_parts(
        id: OperationId,
        mapping_id: MappingId,
        content_hash: ContentHash,
        operation: OperationKind,
        from_path: Option<SyncPath>,
        to_path: Option<SyncPath>,
        metadata: serde_json::Value,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Some(id),
            mapping_id,
            content_hash,
            operation,
            from_path,
            to_path,
            metadata,
            timestamp,
        }
    }

    /// Returns the row id (None before insert)
    pub fn id(&self) -> Option<OperationId> {
        self.id
    }

    /// Returns the mapping id
    pub fn mapping_id(&self) -> MappingId {
        self.mapping_id
    }

    /// Returns the content hash
    pub fn content_hash(&self) -> &ContentHash {
        &self.content_hash
    }

    /// Returns the operation kind
    pub fn operation(&self) -> OperationKind {
        self.operation
    }

    /// Returns the source path, if any
    pub fn from_path(&self) -> Option<&SyncPath> {
        self.from_path.as_ref()
    }

    /// Returns the destination path, if any
    pub fn to_path(&self) -> Option<&SyncPath> {
        self.to_path.as_ref()
    }

    /// Returns the opaque metadata
    pub fn metadata(&self) -> &serde_json::Value {
        &self.metadata
    }

    /// Returns when the operation happened
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}
