//! FileVersion domain entity
//!
//! A FileVersion row records one observed state of a file under a
//! mapping: its content hash, location, size, and how it came to be
//! (create, update, rename, move). Versions form a chain through
//! `parent_version`, and exactly one version per (mapping, path) is
//! the latest at any time. Rows are immutable once written except for
//! the `is_latest` flag, which flips when a successor is inserted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::errors::DomainError;
use super::newtypes::{ContentHash, MappingId, RelativePath, RemoteId, SyncPath, VersionId};

// ============================================================================
// ChangeType enum
// ============================================================================

/// How a version came to exist
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeType {
    /// First version of a path
    Create,
    /// Content changed in place
    Update,
    /// Same directory, new name
    Rename,
    /// New directory (name may have changed too)
    Move,
}

impl ChangeType {
    /// Returns the change type name as a string
    pub fn name(&self) -> &'static str {
        match self {
            ChangeType::Create => "create",
            ChangeType::Update => "update",
            ChangeType::Rename => "rename",
            ChangeType::Move => "move",
        }
    }

    /// Returns true for rename/move changes, where the content is
    /// unchanged but the location is not
    pub fn is_relocation(&self) -> bool {
        matches!(self, ChangeType::Rename | ChangeType::Move)
    }
}

impl fmt::Display for ChangeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for ChangeType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "create" => Ok(ChangeType::Create),
            "update" => Ok(ChangeType::Update),
            "rename" => Ok(ChangeType::Rename),
            "move" => Ok(ChangeType::Move),
            other => Err(DomainError::ValidationFailed(format!(
                "Unknown change type: {other}"
            ))),
        }
    }
}

// ============================================================================
// UploadMethod enum
// ============================================================================

/// How content was (or should be) sent to the remote store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadMethod {
    /// Single-request upload for small files
    Direct,
    /// Chunked upload for large files
    Chunked,
}

impl UploadMethod {
    /// Returns the method name as a string
    pub fn name(&self) -> &'static str {
        match self {
            UploadMethod::Direct => "direct",
            UploadMethod::Chunked => "chunked",
        }
    }
}

impl fmt::Display for UploadMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for UploadMethod {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "direct" => Ok(UploadMethod::Direct),
            "chunked" => Ok(UploadMethod::Chunked),
            other => Err(DomainError::ValidationFailed(format!(
                "Unknown upload method: {other}"
            ))),
        }
    }
}

// ============================================================================
// FileVersion struct
// ============================================================================

/// One observed state of a file under a mapping
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileVersion {
    /// Unique identifier for this version row
    id: VersionId,
    /// The mapping this version belongs to
    mapping_id: MappingId,
    /// Content hash at the time this version was observed
    content_hash: ContentHash,
    /// File name component
    file_name: String,
    /// Absolute local path
    file_path: SyncPath,
    /// Path relative to the mapping root
    relative_path: RelativePath,
    /// Size in bytes
    file_size: u64,
    /// Remote data id once uploaded
    remote_data_id: Option<RemoteId>,
    /// Remote metadata id once uploaded
    remote_metadata_id: Option<RemoteId>,
    /// Monotonic version number per path, starting at 1
    version: i64,
    /// Prior version in the chain (None for the first)
    parent_version: Option<VersionId>,
    /// How this version came to exist
    change_type: ChangeType,
    /// Upload method used, once known
    upload_method: Option<UploadMethod>,
    /// When this version row was created
    created_at: DateTime<Utc>,
    /// Whether this is the current version for its path
    is_latest: bool,
}

impl FileVersion {
    /// Creates the first version of a path (version = 1, no parent)
    ///
    /// # Errors
    ///
    /// Returns `DomainError::ValidationFailed` if the path has no file name
    pub fn first(
        mapping_id: MappingId,
        file_path: SyncPath,
        relative_path: RelativePath,
        content_hash: ContentHash,
        file_size: u64,
    ) -> Result<Self, DomainError> {
        let file_name = file_path
            .file_name()
            .ok_or_else(|| {
                DomainError::ValidationFailed(format!("Path has no file name: {file_path}"))
            })?
            .to_string();

        Ok(Self {
            id: VersionId::new(),
            mapping_id,
            content_hash,
            file_name,
            file_path,
            relative_path,
            file_size,
            remote_data_id: None,
            remote_metadata_id: None,
            version: 1,
            parent_version: None,
            change_type: ChangeType::Create,
            upload_method: None,
            created_at: Utc::now(),
            is_latest: true,
        })
    }

    /// Creates the successor of an existing version
    ///
    /// The new row carries `version + 1`, points back at the parent,
    /// and becomes the latest. The caller is responsible for flipping
    /// the parent's `is_latest` flag in the same store transaction.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::ValidationFailed` if the path has no file
    /// name, or if `change_type` is `Create` (a successor is never a
    /// create).
    pub fn successor(
        parent: &FileVersion,
        file_path: SyncPath,
        relative_path: RelativePath,
        content_hash: ContentHash,
        file_size: u64,
        change_type: ChangeType,
    ) -> Result<Self, DomainError> {
        if change_type == ChangeType::Create {
            return Err(DomainError::ValidationFailed(
                "Successor version cannot have change type 'create'".to_string(),
            ));
        }

        let file_name = file_path
            .file_name()
            .ok_or_else(|| {
                DomainError::ValidationFailed(format!("Path has no file name: {file_path}"))
            })?
            .to_string();

        Ok(Self {
            id: VersionId::new(),
            mapping_id: parent.mapping_id,
            content_hash,
            file_name,
            file_path,
            relative_path,
            file_size,
            remote_data_id: None,
            remote_metadata_id: None,
            version: parent.version + 1,
            parent_version: Some(parent.id),
            change_type,
            upload_method: None,
            created_at: Utc::now(),
            is_latest: true,
        })
    }

    /// Reconstructs a FileVersion from stored fields
    ///
    /// Used by store adapters when mapping rows back into the domain.
    #[allow(clippy::too_many_arguments)]
    pub fn from_parts(
        id: VersionId,
        mapping_id: MappingId,
        content_hash: ContentHash,
        file_name: String,
        file_path: SyncPath,
        relative_path: RelativePath,
        file_size: u64,
        remote_data_id: Option<RemoteId>,
        remote_metadata_id: Option<RemoteId>,
        version: i64,
        parent_version: Option<VersionId>,
        change_type: ChangeType,
        upload_method: Option<UploadMethod>,
        created_at: DateTime<Utc>,
        is_latest: bool,
    ) -> Self {
        Self {
            id,
            mapping_id,
            content_hash,
            file_name,
            file_path,
            relative_path,
            file_size,
            remote_data_id,
            remote_metadata_id,
            version,
            parent_version,
            change_type,
            upload_method,
            created_at,
            is_latest,
        }
    }

    // --- Getters ---

    /// Returns the version row id
    pub fn id(&self) -> VersionId {
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

    /// Returns the file name
    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    /// Returns the absolute local path
    pub fn file_path(&self) -> &SyncPath {
        &self.file_path
    }

    /// Returns the path relative to the mapping root
    pub fn relative_path(&self) -> &RelativePath {
        &self.relative_path
    }

    /// Returns the file size in bytes
    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    /// Returns the remote data id, if uploaded
    pub fn remote_data_id(&self) -> Option<&RemoteId> {
        self.remote_data_id.as_ref()
    }

    /// Returns the remote metadata id, if uploaded
    pub fn remote_metadata_id(&self) -> Option<&RemoteId> {
        self.remote_metadata_id.as_ref()
    }

    /// Returns the monotonic version number
    pub fn version(&self) -> i64 {
        self.version
    }

    /// Returns the parent version id, if any
    pub fn parent_version(&self) -> Option<VersionId> {
        self.parent_version
    }

    /// Returns the change type
    pub fn change_type(&self) -> ChangeType {
        self.change_type
    }

    /// Returns the upload method, if known
    pub fn upload_method(&self) -> Option<UploadMethod> {
        self.upload_method
    }

    /// Returns when this version row was created
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Returns whether this is the current version for its path
    pub fn is_latest(&self) -> bool {
        self.is_latest
    }

    // --- Mutators ---

    /// Records the remote ids after a completed upload
    pub fn set_remote_ids(&mut self, data_id: RemoteId, metadata_id: RemoteId) {
        self.remote_data_id = Some(data_id);
        self.remote_metadata_id = Some(metadata_id);
    }

    /// Records the upload method used
    pub fn set_upload_method(&mut self, method: UploadMethod) {
        self.upload_method = Some(method);
    }

    /// Flips this version out of the latest position
    ///
    /// Called on the parent when a successor is inserted.
    pub fn mark_superseded(&mut self) {
        self.is_latest = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn sample_hash(fill: char) -> ContentHash {
        ContentHash::new(fill.to_string().repeat(64)).unwrap()
    }

    fn sample_path(name: &str) -> (SyncPath, RelativePath) {
        let path = SyncPath::new(PathBuf::from(format!("/data/drive/{name}"))).unwrap();
        let rel = RelativePath::new(name.to_string()).unwrap();
        (path, rel)
    }

    mod change_type_tests {
        use super::*;

        #[test]
        fn test_name_roundtrip() {
            for ct in [
                ChangeType::Create,
                ChangeType::Update,
                ChangeType::Rename,
                ChangeType::Move,
            ] {
                let parsed: ChangeType = ct.name().parse().unwrap();
                assert_eq!(parsed, ct);
            }
        }

        #[test]
        fn test_unknown_fails() {
            let result: Result<ChangeType, _> = "copy".parse();
            assert!(result.is_err());
        }

        #[test]
        fn test_is_relocation() {
            assert!(ChangeType::Rename.is_relocation());
            assert!(ChangeType::Move.is_relocation());
            assert!(!ChangeType::Create.is_relocation());
            assert!(!ChangeType::Update.is_relocation());
        }
    }

    mod file_version_tests {
        use super::*;

        #[test]
        fn test_first_version() {
            let (path, rel) = sample_path("report.pdf");
            let version =
                FileVersion::first(MappingId::new(), path, rel, sample_hash('a'), 2_000_000)
                    .unwrap();

            assert_eq!(version.version(), 1);
            assert!(version.parent_version().is_none());
            assert_eq!(version.change_type(), ChangeType::Create);
            assert!(version.is_latest());
            assert_eq!(version.file_name(), "report.pdf");
        }

        #[test]
        fn test_successor_chains() {
            let mapping = MappingId::new();
            let (path, rel) = sample_path("a.txt");
            let first =
                FileVersion::first(mapping, path.clone(), rel.clone(), sample_hash('a'), 10)
                    .unwrap();

            let second = FileVersion::successor(
                &first,
                path,
                rel,
                sample_hash('b'),
                12,
                ChangeType::Update,
            )
            .unwrap();

            assert_eq!(second.version(), 2);
            assert_eq!(second.parent_version(), Some(first.id()));
            assert_eq!(second.mapping_id(), mapping);
            assert!(second.is_latest());
        }

        #[test]
        fn test_successor_rejects_create() {
            let (path, rel) = sample_path("a.txt");
            let first = FileVersion::first(
                MappingId::new(),
                path.clone(),
                rel.clone(),
                sample_hash('a'),
                10,
            )
            .unwrap();

            let result = FileVersion::successor(
                &first,
                path,
                rel,
                sample_hash('b'),
                12,
                ChangeType::Create,
            );
            assert!(result.is_err());
        }

        #[test]
        fn test_mark_superseded() {
            let (path, rel) = sample_path("a.txt");
            let mut version =
                FileVersion::first(MappingId::new(), path, rel, sample_hash('a'), 10).unwrap();

            assert!(version.is_latest());
            version.mark_superseded();
            assert!(!version.is_latest());
        }

        #[test]
        fn test_set_remote_ids() {
            let (path, rel) = sample_path("a.txt");
            let mut version =
                FileVersion::first(MappingId::new(), path, rel, sample_hash('a'), 10).unwrap();

            version.set_remote_ids(
                RemoteId::new("data1".to_string()).unwrap(),
                RemoteId::new("meta1".to_string()).unwrap(),
            );
            assert_eq!(version.remote_data_id().unwrap().as_str(), "data1");
            assert_eq!(version.remote_metadata_id().unwrap().as_str(), "meta1");
        }
    }
}
