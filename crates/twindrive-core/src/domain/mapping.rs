//! DriveMapping domain entity
//!
//! This module defines the DriveMapping entity which pairs one local
//! folder with one remote drive folder and carries the per-mapping
//! sync policy (direction, exclusions, size ceiling, priority).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{
    errors::DomainError,
    newtypes::{MappingId, RemoteId, SyncPath},
};

/// Which directions of transfer a mapping allows
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncDirection {
    /// Local changes upload and remote changes download
    #[default]
    Bidirectional,
    /// Local changes upload; remote changes are ignored
    UploadOnly,
    /// Remote changes download; local changes are ignored
    DownloadOnly,
}

impl SyncDirection {
    /// Returns true if local changes may be uploaded
    pub fn allows_upload(&self) -> bool {
        matches!(self, SyncDirection::Bidirectional | SyncDirection::UploadOnly)
    }

    /// Returns true if remote changes may be downloaded
    pub fn allows_download(&self) -> bool {
        matches!(self, SyncDirection::Bidirectional | SyncDirection::DownloadOnly)
    }
}

impl std::fmt::Display for SyncDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncDirection::Bidirectional => write!(f, "bidirectional"),
            SyncDirection::UploadOnly => write!(f, "upload_only"),
            SyncDirection::DownloadOnly => write!(f, "download_only"),
        }
    }
}

impl std::str::FromStr for SyncDirection {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "bidirectional" => Ok(SyncDirection::Bidirectional),
            "upload_only" => Ok(SyncDirection::UploadOnly),
            "download_only" => Ok(SyncDirection::DownloadOnly),
            other => Err(DomainError::ValidationFailed(format!(
                "Unknown sync direction: {other}"
            ))),
        }
    }
}

/// Per-mapping sync policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncSettings {
    /// Glob patterns excluded from sync (matched against relative paths)
    #[serde(default)]
    pub exclude_patterns: Vec<String>,
    /// Per-mapping size ceiling in bytes (None means engine default)
    #[serde(default)]
    pub max_file_size: Option<u64>,
    /// Which directions of transfer this mapping allows
    #[serde(default)]
    pub sync_direction: SyncDirection,
    /// Base priority assigned to uploads from this mapping
    #[serde(default)]
    pub upload_priority: i32,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            exclude_patterns: Vec::new(),
            max_file_size: None,
            sync_direction: SyncDirection::Bidirectional,
            upload_priority: 0,
        }
    }
}

/// Pairs a local folder with a remote drive folder
///
/// A DriveMapping is the unit of configuration for the sync engine:
/// every version, transfer, and ledger row is scoped to exactly one
/// mapping. The local folder and the remote root folder are fixed at
/// creation time; only the policy and last-sync bookkeeping mutate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriveMapping {
    /// Unique identifier for this mapping
    id: MappingId,
    /// Remote drive the mapping syncs against
    remote_drive_id: RemoteId,
    /// Local folder that is watched and scanned
    local_folder_path: SyncPath,
    /// Remote folder acting as the mapping root
    root_folder_id: RemoteId,
    /// Per-mapping sync policy
    sync_settings: SyncSettings,
    /// Timestamp of the last completed reconcile (None if never run)
    last_sync_time: Option<DateTime<Utc>>,
    /// When this mapping was created
    created_at: DateTime<Utc>,
}

impl DriveMapping {
    /// Creates a new DriveMapping with default settings
    ///
    /// # Arguments
    /// * `remote_drive_id` - Remote drive identifier
    /// * `local_folder_path` - Absolute local folder to sync
    /// * `root_folder_id` - Remote folder acting as the mapping root
    pub fn new(
        remote_drive_id: RemoteId,
        local_folder_path: SyncPath,
        root_folder_id: RemoteId,
    ) -> Self {
        Self {
            id: MappingId::new(),
            remote_drive_id,
            local_folder_path,
            root_folder_id,
            sync_settings: SyncSettings::default(),
            last_sync_time: None,
            created_at: Utc::now(),
        }
    }

    /// Creates a DriveMapping with specific settings
    pub fn with_settings(
        remote_drive_id: RemoteId,
        local_folder_path: SyncPath,
        root_folder_id: RemoteId,
        sync_settings: SyncSettings,
    ) -> Self {
        Self {
            id: MappingId::new(),
            remote_drive_id,
            local_folder_path,
            root_folder_id,
            sync_settings,
            last_sync_time: None,
            created_at: Utc::now(),
        }
    }

    /// Reconstructs a DriveMapping from stored fields
    #[allow(clippy::too_many_arguments)]
    pub fn from_parts(
        id: MappingId,
        remote_drive_id: RemoteId,
        local_folder_path: SyncPath,
        root_folder_id: RemoteId,
        sync_settings: SyncSettings,
        last_sync_time: Option<DateTime<Utc>>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            remote_drive_id,
            local_folder_path,
            root_folder_id,
            sync_settings,
            last_sync_time,
            created_at,
        }
    }

    // --- Getters ---

    /// Returns the mapping's unique identifier
    pub fn id(&self) -> MappingId {
        self.id
    }

    /// Returns the remote drive identifier
    pub fn remote_drive_id(&self) -> &RemoteId {
        &self.remote_drive_id
    }

    /// Returns the local folder path
    pub fn local_folder_path(&self) -> &SyncPath {
        &self.local_folder_path
    }

    /// Returns the remote root folder identifier
    pub fn root_folder_id(&self) -> &RemoteId {
        &self.root_folder_id
    }

    /// Returns the sync policy
    pub fn sync_settings(&self) -> &SyncSettings {
        &self.sync_settings
    }

    /// Returns the last completed reconcile timestamp if any
    pub fn last_sync_time(&self) -> Option<DateTime<Utc>> {
        self.last_sync_time
    }

    /// Returns when the mapping was created
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    // --- Mutations ---

    /// Replaces the sync policy
    pub fn set_sync_settings(&mut self, settings: SyncSettings) {
        self.sync_settings = settings;
    }

    /// Records a completed reconcile
    pub fn record_sync(&mut self, timestamp: DateTime<Utc>) {
        self.last_sync_time = Some(timestamp);
    }

    /// Returns true if `path` falls under this mapping's local folder
    pub fn contains(&self, path: &SyncPath) -> bool {
        path.as_ref().starts_with(self.local_folder_path.as_ref())
    }

    /// Returns the effective size ceiling for this mapping
    ///
    /// The per-mapping ceiling wins when set; otherwise the engine
    /// default passed by the caller applies.
    pub fn effective_max_file_size(&self, engine_default: u64) -> u64 {
        self.sync_settings.max_file_size.unwrap_or(engine_default)
    }
}
