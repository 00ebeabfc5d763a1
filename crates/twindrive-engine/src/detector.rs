//! Content-hash change detection
//!
//! The detector answers two questions about a local path: what is its
//! content hash, and does that hash differ from the latest recorded
//! version. It also owns the transition itself, appending new versions
//! (and their audit entries) to the state store.
//!
//! Hashes are cached per path, keyed on file size and mtime, so repeated
//! classification of an unchanged file does not re-read its contents.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use chrono::{DateTime, Utc};

use twindrive_core::domain::errors::SyncError;
use twindrive_core::domain::mapping::DriveMapping;
use twindrive_core::domain::newtypes::{ContentHash, RemoteId, SyncPath};
use twindrive_core::domain::operation::{FileOperation, OperationKind};
use twindrive_core::domain::version::{ChangeType, FileVersion};
use twindrive_core::ports::{FileSystemState, ILocalFileSystem, IStateStore};

/// Outcome of comparing a path against its recorded version chain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectedChange {
    /// No version chain exists for this path yet
    Create,
    /// The content hash differs from the latest recorded version
    Update,
    /// The content hash matches the latest recorded version
    Unchanged,
}

struct CachedHash {
    hash: ContentHash,
    size: u64,
    modified: Option<DateTime<Utc>>,
    last_used: Instant,
}

/// Detects content changes and appends version chain entries
pub struct ChangeDetector {
    store: Arc<dyn IStateStore>,
    filesystem: Arc<dyn ILocalFileSystem>,
    hash_cache: Mutex<HashMap<SyncPath, CachedHash>>,
}

impl ChangeDetector {
    pub fn new(store: Arc<dyn IStateStore>, filesystem: Arc<dyn ILocalFileSystem>) -> Self {
        Self {
            store,
            filesystem,
            hash_cache: Mutex::new(HashMap::new()),
        }
    }

    /// Computes the SHA-256 hash of a path, consulting the cache first
    ///
    /// A cache entry is only reused while the file's size and mtime still
    /// match the values captured when the hash was computed.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Hash`] if the path disappeared, is not a
    /// regular file, or cannot be read within the hash timeout.
    pub async fn hash(&self, path: &SyncPath) -> Result<ContentHash, SyncError> {
        let state = self
            .filesystem
            .get_state(path)
            .await
            .map_err(|e| SyncError::Hash(format!("stat failed for {}: {:#}", path, e)))?;

        if !state.is_regular_file() {
            return Err(SyncError::Hash(format!("{} is not a regular file", path)));
        }

        if let Some(hash) = self.cached_hash(path, &state) {
            return Ok(hash);
        }

        let hash = self
            .filesystem
            .compute_hash(path)
            .await
            .map_err(|e| SyncError::Hash(format!("hashing {} failed: {:#}", path, e)))?;

        self.remember_hash(path, &state, hash.clone());
        Ok(hash)
    }

    /// Compares a path's current content against its latest version
    #[tracing::instrument(skip(self, mapping), fields(path = %path))]
    pub async fn detect_change(
        &self,
        mapping: &DriveMapping,
        path: &SyncPath,
    ) -> Result<DetectedChange, SyncError> {
        let latest = self
            .store
            .get_latest_version(mapping.id(), path)
            .await
            .map_err(|e| SyncError::Persistence(format!("{:#}", e)))?;

        let Some(latest) = latest else {
            return Ok(DetectedChange::Create);
        };

        let hash = self.hash(path).await?;
        if &hash == latest.content_hash() {
            Ok(DetectedChange::Unchanged)
        } else {
            Ok(DetectedChange::Update)
        }
    }

    /// Appends a new version for a path and records the matching audit entry
    ///
    /// When `parent` is given, the new version extends that chain even if
    /// the path changed (rename and move chains). Otherwise the latest
    /// version at `path` is looked up, and a first version is created when
    /// no chain exists yet.
    ///
    /// Both the version flip and the insert happen in one store
    /// transaction, so the single-latest-per-path invariant holds even if
    /// the process dies mid-append.
    #[tracing::instrument(skip(self, mapping, parent, remote), fields(path = %path, change = %change_type))]
    pub async fn append_version(
        &self,
        mapping: &DriveMapping,
        path: &SyncPath,
        change_type: ChangeType,
        parent: Option<&FileVersion>,
        remote: Option<(RemoteId, RemoteId)>,
    ) -> Result<FileVersion, SyncError> {
        let state = self
            .filesystem
            .get_state(path)
            .await
            .map_err(|e| SyncError::Io(std::io::Error::other(format!("{:#}", e))))?;

        if !state.is_regular_file() {
            return Err(SyncError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("{} is not a regular file", path),
            )));
        }

        let hash = self.hash(path).await?;
        let relative = path.relative_to(mapping.local_folder_path())?;

        let head = match parent {
            Some(p) => Some(p.clone()),
            None => self
                .store
                .get_latest_version(mapping.id(), path)
                .await
                .map_err(|e| SyncError::Persistence(format!("{:#}", e)))?,
        };

        let mut version = match &head {
            Some(prev) => FileVersion::successor(
                prev,
                path.clone(),
                relative,
                hash.clone(),
                state.size,
                change_type,
            )?,
            None => {
                FileVersion::first(mapping.id(), path.clone(), relative, hash.clone(), state.size)?
            }
        };

        if let Some((data_id, metadata_id)) = remote {
            version.set_remote_ids(data_id, metadata_id);
        }

        self.store
            .append_version(&version)
            .await
            .map_err(|e| SyncError::Persistence(format!("{:#}", e)))?;

        let op_kind = match change_type {
            ChangeType::Create | ChangeType::Update => OperationKind::Upload,
            ChangeType::Rename => OperationKind::Rename,
            ChangeType::Move => OperationKind::Move,
        };
        let from_path = head
            .as_ref()
            .filter(|prev| prev.file_path() != path)
            .map(|prev| prev.file_path().clone());
        let operation = FileOperation::new(
            mapping.id(),
            hash.clone(),
            op_kind,
            from_path,
            Some(path.clone()),
            serde_json::json!({
                "file_size": state.size,
                "version": version.version(),
            }),
        );
        self.store
            .record_operation(&operation)
            .await
            .map_err(|e| SyncError::Persistence(format!("{:#}", e)))?;

        tracing::debug!(
            version = version.version(),
            hash = %hash.short(),
            "Version appended"
        );

        Ok(version)
    }

    /// Returns true when both paths currently hash to the same content
    ///
    /// Any read or hash failure yields false.
    pub async fn detect_move(&self, a: &SyncPath, b: &SyncPath) -> bool {
        match (self.hash(a).await, self.hash(b).await) {
            (Ok(hash_a), Ok(hash_b)) => hash_a == hash_b,
            _ => false,
        }
    }

    /// Evicts the least recently used cache entries
    ///
    /// A no-op until the cache exceeds `max` entries; it is then trimmed
    /// down to `keep` entries.
    pub fn trim_cache(&self, max: usize, keep: usize) {
        let Ok(mut cache) = self.hash_cache.lock() else {
            return;
        };
        if cache.len() <= max {
            return;
        }

        let mut entries: Vec<(SyncPath, Instant)> = cache
            .iter()
            .map(|(path, cached)| (path.clone(), cached.last_used))
            .collect();
        entries.sort_by_key(|(_, last_used)| *last_used);

        let excess = cache.len().saturating_sub(keep);
        for (path, _) in entries.into_iter().take(excess) {
            cache.remove(&path);
        }

        tracing::debug!(removed = excess, remaining = cache.len(), "Hash cache trimmed");
    }

    /// Last hash computed for a path, regardless of freshness
    ///
    /// For paths that no longer exist on disk a stat-validated lookup is
    /// impossible, so callers reconstructing a deleted file's identity
    /// take whatever the cache still holds.
    pub fn last_cached_hash(&self, path: &SyncPath) -> Option<ContentHash> {
        let cache = self.hash_cache.lock().ok()?;
        cache.get(path).map(|cached| cached.hash.clone())
    }

    /// Current number of cached hashes
    pub fn cache_len(&self) -> usize {
        self.hash_cache.lock().map(|c| c.len()).unwrap_or(0)
    }

    fn cached_hash(&self, path: &SyncPath, state: &FileSystemState) -> Option<ContentHash> {
        let mut cache = self.hash_cache.lock().ok()?;
        let cached = cache.get_mut(path)?;
        if cached.size != state.size || cached.modified != state.modified {
            return None;
        }
        cached.last_used = Instant::now();
        Some(cached.hash.clone())
    }

    fn remember_hash(&self, path: &SyncPath, state: &FileSystemState, hash: ContentHash) {
        if let Ok(mut cache) = self.hash_cache.lock() {
            cache.insert(
                path.clone(),
                CachedHash {
                    hash,
                    size: state.size,
                    modified: state.modified,
                    last_used: Instant::now(),
                },
            );
        }
    }
}
