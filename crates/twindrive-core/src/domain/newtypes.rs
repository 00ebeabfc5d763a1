//! Domain newtypes with validation
//!
//! Strongly-typed wrappers for identifiers and values. Each newtype
//! validates at construction time so the rest of the engine never sees
//! a malformed path, hash, or id.

use std::fmt::{self, Display, Formatter};
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::errors::DomainError;

// ============================================================================
// UUID-based ID types
// ============================================================================

/// Identifier for a DriveMapping (local folder bound to a remote drive)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MappingId(Uuid);

impl MappingId {
    /// Create a new random MappingId
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create a MappingId from an existing UUID
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the inner UUID value
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }

    /// Create a nil (all zeros) MappingId
    #[must_use]
    pub const fn nil() -> Self {
        Self(Uuid::nil())
    }
}

impl Default for MappingId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for MappingId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for MappingId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| DomainError::InvalidId(format!("Invalid MappingId: {e}")))
    }
}

impl From<Uuid> for MappingId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

/// Identifier for a FileVersion row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VersionId(Uuid);

impl VersionId {
    /// Create a new random VersionId
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create a VersionId from an existing UUID
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the inner UUID value
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }

    /// Create a nil (all zeros) VersionId
    #[must_use]
    pub const fn nil() -> Self {
        Self(Uuid::nil())
    }
}

impl Default for VersionId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for VersionId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for VersionId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| DomainError::InvalidId(format!("Invalid VersionId: {e}")))
    }
}

impl From<Uuid> for VersionId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

/// Identifier for PendingUpload, Upload, and Download lifecycle rows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransferId(Uuid);

impl TransferId {
    /// Create a new random TransferId
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create a TransferId from an existing UUID
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the inner UUID value
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }

    /// Create a nil (all zeros) TransferId
    #[must_use]
    pub const fn nil() -> Self {
        Self(Uuid::nil())
    }
}

impl Default for TransferId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for TransferId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for TransferId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| DomainError::InvalidId(format!("Invalid TransferId: {e}")))
    }
}

impl From<Uuid> for TransferId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

/// Identifier for FileOperation audit entries (database row ID)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OperationId(i64);

impl OperationId {
    /// Create an OperationId from an i64 value
    #[must_use]
    pub const fn new(id: i64) -> Self {
        Self(id)
    }

    /// Get the inner i64 value
    #[must_use]
    pub const fn as_i64(&self) -> i64 {
        self.0
    }
}

impl Display for OperationId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for OperationId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

// ============================================================================
// Path types
// ============================================================================

/// A validated absolute path on the local filesystem
///
/// SyncPath ensures the path is:
/// - Absolute (starts with /)
/// - Normalized (no . or .. components)
/// - Within the mapping root when validated against one
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "PathBuf", into = "PathBuf")]
pub struct SyncPath(PathBuf);

impl SyncPath {
    /// Create a new SyncPath, validating it is absolute
    ///
    /// # Errors
    /// Returns `DomainError::InvalidPath` if the path is not absolute
    pub fn new(path: PathBuf) -> Result<Self, DomainError> {
        if !path.is_absolute() {
            return Err(DomainError::InvalidPath(format!(
                "Path must be absolute: {}",
                path.display()
            )));
        }

        // Not fs::canonicalize(): the path may not exist yet.
        let normalized = Self::normalize_path(&path)?;
        Ok(Self(normalized))
    }

    /// Create a SyncPath validated against a mapping root
    ///
    /// # Errors
    /// Returns error if path is not within the root
    pub fn new_within_root(path: PathBuf, root: &SyncPath) -> Result<Self, DomainError> {
        let sync_path = Self::new(path)?;

        if !sync_path.0.starts_with(&root.0) {
            return Err(DomainError::PathNotInMappingRoot(format!(
                "{} is not within mapping root {}",
                sync_path.0.display(),
                root.0.display()
            )));
        }

        Ok(sync_path)
    }

    /// Get the inner PathBuf reference
    #[must_use]
    pub fn as_path(&self) -> &PathBuf {
        &self.0
    }

    /// Convert to owned PathBuf
    #[must_use]
    pub fn into_path_buf(self) -> PathBuf {
        self.0
    }

    /// File name component, if any
    #[must_use]
    pub fn file_name(&self) -> Option<&str> {
        self.0.file_name().and_then(|n| n.to_str())
    }

    /// Parent directory, if any
    #[must_use]
    pub fn parent(&self) -> Option<SyncPath> {
        self.0.parent().map(|p| Self(p.to_path_buf()))
    }

    /// Get the path relative to a root
    ///
    /// # Errors
    /// Returns error if this path is not within the root
    pub fn relative_to(&self, root: &SyncPath) -> Result<RelativePath, DomainError> {
        let stripped = self.0.strip_prefix(&root.0).map_err(|_| {
            DomainError::PathNotInMappingRoot(format!(
                "{} is not within {}",
                self.0.display(),
                root.0.display()
            ))
        })?;
        RelativePath::new(stripped.to_string_lossy().into_owned())
    }

    /// Join a relative path component to this SyncPath
    ///
    /// # Errors
    /// Returns error if the component contains invalid sequences
    pub fn join(&self, component: &str) -> Result<Self, DomainError> {
        // Prevent path traversal
        if component.contains("..") || component.starts_with('/') {
            return Err(DomainError::InvalidPath(format!(
                "Invalid path component: {component}"
            )));
        }

        let new_path = self.0.join(component);
        Self::new(new_path)
    }

    /// Normalize a path by resolving . and .. components
    fn normalize_path(path: &PathBuf) -> Result<PathBuf, DomainError> {
        use std::path::Component;

        let mut normalized = PathBuf::new();

        for component in path.components() {
            match component {
                Component::Prefix(p) => normalized.push(p.as_os_str()),
                Component::RootDir => normalized.push("/"),
                Component::CurDir => {}
                Component::ParentDir => {
                    if !normalized.pop() {
                        return Err(DomainError::InvalidPath(
                            "Path escapes root via ..".to_string(),
                        ));
                    }
                }
                Component::Normal(c) => normalized.push(c),
            }
        }

        Ok(normalized)
    }
}

impl Display for SyncPath {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.display())
    }
}

impl TryFrom<PathBuf> for SyncPath {
    type Error = DomainError;

    fn try_from(path: PathBuf) -> Result<Self, Self::Error> {
        Self::new(path)
    }
}

impl From<SyncPath> for PathBuf {
    fn from(sync_path: SyncPath) -> Self {
        sync_path.0
    }
}

impl AsRef<std::path::Path> for SyncPath {
    fn as_ref(&self) -> &std::path::Path {
        &self.0
    }
}

/// A path relative to a mapping root, slash-separated
///
/// Stored on FileVersion rows and metadata cache entries so the same
/// file can be located under different local roots.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RelativePath(String);

impl RelativePath {
    /// Create a new RelativePath
    ///
    /// # Errors
    /// Returns error if the path is absolute or contains traversal
    pub fn new(path: String) -> Result<Self, DomainError> {
        if path.starts_with('/') {
            return Err(DomainError::InvalidPath(format!(
                "Relative path must not start with '/': {path}"
            )));
        }
        if path.split('/').any(|c| c == "..") {
            return Err(DomainError::InvalidPath(format!(
                "Relative path contains traversal: {path}"
            )));
        }

        Ok(Self(path))
    }

    /// The empty relative path (the mapping root itself)
    #[must_use]
    pub fn root() -> Self {
        Self(String::new())
    }

    /// Get the inner string reference
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// File name component, if any
    #[must_use]
    pub fn file_name(&self) -> Option<&str> {
        if self.0.is_empty() {
            return None;
        }
        self.0.rsplit('/').next()
    }

    /// Parent directory (None for the root or single-component paths)
    #[must_use]
    pub fn parent(&self) -> Option<Self> {
        self.0.rfind('/').map(|idx| Self(self.0[..idx].to_string()))
    }

    /// Resolve against a local mapping root
    ///
    /// # Errors
    /// Returns error if the joined path fails absolute-path validation
    pub fn resolve(&self, root: &SyncPath) -> Result<SyncPath, DomainError> {
        if self.0.is_empty() {
            return Ok(root.clone());
        }
        SyncPath::new(root.as_path().join(&self.0))
    }
}

impl Display for RelativePath {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for RelativePath {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s.to_string())
    }
}

impl TryFrom<String> for RelativePath {
    type Error = DomainError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<RelativePath> for String {
    fn from(path: RelativePath) -> Self {
        path.0
    }
}

// ============================================================================
// Remote storage types
// ============================================================================

/// Identifier assigned by the remote drive store
///
/// Opaque to the engine. Covers drive ids, folder ids, file ids, and the
/// data/metadata ids returned by an upload.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RemoteId(String);

impl RemoteId {
    /// Create a new RemoteId
    ///
    /// # Errors
    /// Returns error if the ID format is invalid
    pub fn new(id: String) -> Result<Self, DomainError> {
        if id.is_empty() {
            return Err(DomainError::InvalidRemoteId(
                "Remote ID cannot be empty".to_string(),
            ));
        }

        // Remote ids are hex or base64-like strings
        if !id
            .chars()
            .all(|c| c.is_alphanumeric() || c == '-' || c == '_' || c == '=')
        {
            return Err(DomainError::InvalidRemoteId(format!(
                "Remote ID contains invalid characters: {id}"
            )));
        }

        Ok(Self(id))
    }

    /// Get the inner string reference
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for RemoteId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for RemoteId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s.to_string())
    }
}

impl TryFrom<String> for RemoteId {
    type Error = DomainError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<RemoteId> for String {
    fn from(id: RemoteId) -> Self {
        id.0
    }
}

/// SHA-256 content hash in lowercase hex
///
/// The dedup ledger and version rows key on this, so two byte-identical
/// files always carry the same ContentHash regardless of path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ContentHash(String);

impl ContentHash {
    /// Hex length of a SHA-256 digest
    const EXPECTED_HEX_LEN: usize = 64;

    /// Create a new ContentHash
    ///
    /// # Errors
    /// Returns error if the hash is not 64 lowercase hex characters
    pub fn new(hash: String) -> Result<Self, DomainError> {
        if hash.len() != Self::EXPECTED_HEX_LEN {
            return Err(DomainError::InvalidHash(format!(
                "Hash has wrong length: expected {} hex chars, got {}",
                Self::EXPECTED_HEX_LEN,
                hash.len()
            )));
        }

        if !hash
            .chars()
            .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c))
        {
            return Err(DomainError::InvalidHash(format!(
                "Hash is not lowercase hex: {hash}"
            )));
        }

        Ok(Self(hash))
    }

    /// Create a ContentHash from a raw 32-byte digest
    #[must_use]
    pub fn from_digest(digest: &[u8; 32]) -> Self {
        let mut hex = String::with_capacity(Self::EXPECTED_HEX_LEN);
        for byte in digest {
            use std::fmt::Write;
            // write! to a String cannot fail
            let _ = write!(hex, "{byte:02x}");
        }
        Self(hex)
    }

    /// Get the inner string reference
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Abbreviated form for log fields (first 12 hex chars)
    #[must_use]
    pub fn short(&self) -> &str {
        &self.0[..12]
    }
}

impl Display for ContentHash {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ContentHash {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s.to_string())
    }
}

impl TryFrom<String> for ContentHash {
    type Error = DomainError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<ContentHash> for String {
    fn from(hash: ContentHash) -> Self {
        hash.0
    }
}

// ============================================================================
// Tests
// ============================================================================
