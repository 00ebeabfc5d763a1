//! ProcessedFile dedup ledger entity
//!
//! The ledger records every content hash the engine has fully handled
//! for a mapping, whether it arrived by upload or download. Presence of
//! a (hash, mapping) pair means: do not re-upload or re-download this
//! exact content for this mapping. This is the authoritative echo
//! suppression record; the reconciler's short-lived download markers
//! only cover the window before a ledger row lands.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::errors::DomainError;
use super::newtypes::{ContentHash, MappingId, RemoteId, SyncPath};

/// How content entered the ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferSource {
    Upload,
    Download,
}

impl TransferSource {
    /// Returns the source name as a string
    pub fn name(&self) -> &'static str {
        match self {
            TransferSource::Upload => "upload",
            TransferSource::Download => "download",
        }
    }
}

impl fmt::Display for TransferSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for TransferSource {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "upload" => Ok(TransferSource::Upload),
            "download" => Ok(TransferSource::Download),
            other => Err(DomainError::ValidationFailed(format!(
                "Unknown transfer source: {other}"
            ))),
        }
    }
}

/// One dedup ledger row, keyed by (content_hash, mapping_id)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessedFile {
    /// Content hash (half of the ledger key)
    content_hash: ContentHash,
    /// Mapping (other half of the ledger key)
    mapping_id: MappingId,
    /// File name at processing time
    file_name: String,
    /// Size in bytes at processing time
    file_size: u64,
    /// Local path where the content was last seen
    local_path: SyncPath,
    /// Whether the content arrived by upload or download
    source: TransferSource,
    /// Remote id, when known
    remote_id: Option<RemoteId>,
    /// When the content was processed
    processed_at: DateTime<Utc>,
}

impl ProcessedFile {
    /// Creates a new ledger row, timestamped now
    ///
    /// # Errors
    ///
    /// Returns `DomainError::ValidationFailed` if the path has no file name
    pub fn new(
        content_hash: ContentHash,
        mapping_id: MappingId,
        file_size: u64,
        local_path: SyncPath,
        source: TransferSource,
        remote_id: Option<RemoteId>,
    ) -> Result<Self, DomainError> {
        let file_name = local_path
            .file_name()
            .ok_or_else(|| {
                DomainError::ValidationFailed(format!("Path has no file name: {local_path}"))
            })?
            .to_string();

        Ok(Self {
            content_hash,
            mapping_id,
            file_name,
            file_size,
            local_path,
            source,
            remote_id,
            processed_at: Utc::now(),
        })
    }

    /// Reconstructs a ledger row from stored fields
    pub fn from_parts(
        content_hash: ContentHash,
        mapping_id: MappingId,
        file_name: String,
        file_size: u64,
        local_path: SyncPath,
        source: TransferSource,
        remote_id: Option<RemoteId>,
        processed_at: DateTime<Utc>,
    ) -> Self {
        Self {
            content_hash,
            mapping_id,
            file_name,
            file_size,
            local_path,
            source,
            remote_id,
            processed_at,
        }
    }

    /// Returns the content hash
    pub fn content_hash(&self) -> &ContentHash {
        &self.content_hash
    }

    /// Returns the mapping id
    pub fn mapping_id(&self) -> MappingId {
        self.mapping_id
    }

    /// Returns the file name
    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    /// Returns the file size
    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    /// Returns the local path
    pub fn local_path(&self) -> &SyncPath {
        &self.local_path
    }

    /// Returns how the content entered the ledger
    pub fn source(&self) -> TransferSource {
        self.source
    }

    /// Returns the remote id, if known
    pub fn remote_id(&self) -> Option<&RemoteId> {
        self.remote_id.as_ref()
    }

    /// Returns when the content was processed
    pub fn processed_at(&self) -> DateTime<Utc> {
        self.processed_at
    }
}
