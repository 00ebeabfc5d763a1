//! Delete/rename/move/copy classification
//!
//! Raw watcher events only say "deleted here" and "created there". The
//! classifier holds deleted paths in a detection window and pairs them
//! with subsequent creates to recover what actually happened:
//!
//! - Content hash match inside the window is a relocation; the directory
//!   comparison decides rename vs move vs both.
//! - Name and size match is the fallback when content hashing is
//!   inconclusive. A hash comparison that ran always wins over metadata.
//! - A create whose hash sits in the dedup ledger for a still-present
//!   path is a copy.
//! - Everything else is a new file.
//!
//! A pending delete that outlives the window is a confirmed delete and
//! gets an audit entry.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use twindrive_core::domain::errors::SyncError;
use twindrive_core::domain::mapping::DriveMapping;
use twindrive_core::domain::newtypes::{ContentHash, MappingId, RemoteId, SyncPath};
use twindrive_core::domain::operation::{FileOperation, OperationKind};
use twindrive_core::ports::{ILocalFileSystem, IStateStore};

use crate::detector::ChangeDetector;

/// How long classification waits for an in-flight snapshot resolution.
const HASH_WAIT: Duration = Duration::from_secs(1);

/// Timing knobs for the classifier
#[derive(Debug, Clone)]
pub struct ClassifierSettings {
    /// How long a deleted path waits for a matching create
    pub detection_window: Duration,
    /// Delay before the single re-hash when sizes match but hashes differ
    pub hash_settle: Duration,
    /// Per-directory batch id window, diagnostic only
    pub batch_window: Duration,
}

impl Default for ClassifierSettings {
    fn default() -> Self {
        Self {
            detection_window: Duration::from_secs(3),
            hash_settle: Duration::from_millis(1000),
            batch_window: Duration::from_millis(500),
        }
    }
}

/// What a create event turned out to be
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    /// A genuinely new file
    New,
    /// The file at `from` was renamed within its directory
    Rename { from: SyncPath },
    /// The file at `from` moved to another directory, keeping its name
    Move { from: SyncPath },
    /// The file at `from` moved to another directory under a new name
    MoveRename { from: SyncPath },
    /// A duplicate of `original`, which still exists
    Copy { original: SyncPath },
}

/// Everything known about a file at the moment it disappeared
///
/// Resolution runs asynchronously (the version chain lookup), so the
/// snapshot carries a watch channel that classification awaits with a
/// short cap instead of blocking on the store.
pub struct PendingDelete {
    mapping_id: MappingId,
    path: SyncPath,
    file_name: Option<String>,
    recorded_at: Instant,
    info: watch::Receiver<Option<ResolvedInfo>>,
    cancel: CancellationToken,
}

impl PendingDelete {
    /// Path the delete was observed at
    pub fn path(&self) -> &SyncPath {
        &self.path
    }
}

#[derive(Debug, Clone, Default)]
struct ResolvedInfo {
    hash: Option<ContentHash>,
    size: Option<u64>,
    modified: Option<DateTime<Utc>>,
    remote_data_id: Option<RemoteId>,
}

#[derive(Debug, Clone, Copy)]
struct Observation {
    size: u64,
    modified: Option<DateTime<Utc>>,
}

/// Pairs deletes with creates inside a detection window
pub struct OperationClassifier {
    store: Arc<dyn IStateStore>,
    detector: Arc<ChangeDetector>,
    filesystem: Arc<dyn ILocalFileSystem>,
    settings: ClassifierSettings,
    pending: Arc<DashMap<SyncPath, PendingDelete>>,
    observed: DashMap<SyncPath, Observation>,
    batches: DashMap<SyncPath, (u64, Instant)>,
    batch_counter: AtomicU64,
}

impl OperationClassifier {
    pub fn new(
        store: Arc<dyn IStateStore>,
        detector: Arc<ChangeDetector>,
        filesystem: Arc<dyn ILocalFileSystem>,
        settings: ClassifierSettings,
    ) -> Self {
        Self {
            store,
            detector,
            filesystem,
            settings,
            pending: Arc::new(DashMap::new()),
            observed: DashMap::new(),
            batches: DashMap::new(),
            batch_counter: AtomicU64::new(1),
        }
    }

    /// Records a delete event and arms its detection window timer
    ///
    /// If no create claims the path before the window closes, the delete
    /// is confirmed and an audit entry is written for tracked files.
    pub async fn note_delete(&self, mapping: &DriveMapping, path: SyncPath) {
        // A duplicate delete for the same path restarts its window.
        if let Some((_, stale)) = self.pending.remove(&path) {
            stale.cancel.cancel();
        }

        let observation = self.observed.remove(&path).map(|(_, obs)| obs);
        let (tx, rx) = watch::channel(None);
        let cancel = CancellationToken::new();

        let pending = PendingDelete {
            mapping_id: mapping.id(),
            path: path.clone(),
            file_name: path.file_name().map(str::to_owned),
            recorded_at: Instant::now(),
            info: rx.clone(),
            cancel: cancel.clone(),
        };
        self.pending.insert(path.clone(), pending);

        tracing::debug!(
            batch_id = self.batch_id(&path),
            path = %path,
            "Delete observed, window armed"
        );

        // Resolve what we knew about the file: the version chain head if
        // it was ever synced, otherwise the last computed hash.
        let store = self.store.clone();
        let detector = self.detector.clone();
        let mapping_id = mapping.id();
        let resolve_path = path.clone();
        tokio::spawn(async move {
            let mut info = ResolvedInfo {
                size: observation.map(|o| o.size),
                modified: observation.and_then(|o| o.modified),
                ..ResolvedInfo::default()
            };
            match store.get_latest_version(mapping_id, &resolve_path).await {
                Ok(Some(version)) => {
                    info.hash = Some(version.content_hash().clone());
                    if info.size.is_none() {
                        info.size = Some(version.file_size());
                    }
                    info.remote_data_id = version.remote_data_id().cloned();
                }
                Ok(None) => {
                    info.hash = detector.last_cached_hash(&resolve_path);
                }
                Err(err) => {
                    tracing::warn!(path = %resolve_path, error = %format!("{err:#}"),
                        "Version lookup for pending delete failed");
                    info.hash = detector.last_cached_hash(&resolve_path);
                }
            }
            let _ = tx.send(Some(info));
        });

        // Window timer.
        let pending_map = self.pending.clone();
        let store = self.store.clone();
        let window = self.settings.detection_window;
        tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {}
                _ = tokio::time::sleep(window) => {
                    if let Some((_, expired)) = pending_map.remove(&path) {
                        confirm_delete(store.as_ref(), expired).await;
                    }
                }
            }
        });
    }

    /// Classifies a create event against the pending deletes
    #[tracing::instrument(skip(self, mapping), fields(path = %path))]
    pub async fn classify_create(
        &self,
        mapping: &DriveMapping,
        path: &SyncPath,
    ) -> Result<Classification, SyncError> {
        let batch_id = self.batch_id(path);

        let state = self.filesystem.get_state(path).await.ok();
        let size = state
            .as_ref()
            .filter(|s| s.is_regular_file())
            .map(|s| s.size);
        let modified = state.as_ref().and_then(|s| s.modified);
        if let Some(size) = size {
            self.observed.insert(path.clone(), Observation { size, modified });
        }

        let mut new_hash = self.detector.hash(path).await.ok();

        let candidates: Vec<(SyncPath, watch::Receiver<Option<ResolvedInfo>>)> = self
            .pending
            .iter()
            .filter(|entry| entry.value().mapping_id == mapping.id())
            .map(|entry| (entry.key().clone(), entry.value().info.clone()))
            .collect();

        let mut infos = Vec::with_capacity(candidates.len());
        for (candidate, rx) in candidates {
            let info = wait_resolved(rx, HASH_WAIT).await;
            infos.push((candidate, info));
        }

        // Pass 1: content hash. Runs at most twice; the second round only
        // happens after a size collision with a hash mismatch, which can
        // mean the create was hashed mid-write.
        for attempt in 0..2 {
            let Some(hash) = new_hash.as_ref() else { break };

            let mut size_collision = false;
            for (candidate, info) in &infos {
                if info.hash.as_ref() == Some(hash) {
                    if let Some(claimed) = self.claim(candidate) {
                        let classification = relocation(claimed.path, path);
                        tracing::debug!(batch_id, outcome = ?classification, "Relocation by hash");
                        return Ok(classification);
                    }
                } else if info.hash.is_some() && size.is_some() && info.size == size {
                    size_collision = true;
                }
            }

            if attempt == 0 && size_collision {
                tokio::time::sleep(self.settings.hash_settle).await;
                new_hash = self.detector.hash(path).await.ok();
            } else {
                break;
            }
        }

        // Pass 2: name and size, only where hashing had nothing to say.
        let name = path.file_name();
        for (candidate, info) in &infos {
            if new_hash.is_some() && info.hash.is_some() {
                continue;
            }
            if name.is_some()
                && candidate.file_name() == name
                && size.is_some()
                && info.size == size
            {
                if let Some(claimed) = self.claim(candidate) {
                    let classification = relocation(claimed.path, path);
                    tracing::debug!(batch_id, outcome = ?classification, "Relocation by metadata");
                    return Ok(classification);
                }
            }
        }

        // Pass 3: dedup ledger.
        if let Some(hash) = &new_hash {
            let processed = self
                .store
                .is_processed(mapping.id(), hash)
                .await
                .map_err(|e| SyncError::Persistence(format!("{e:#}")))?;
            if processed {
                let versions = self
                    .store
                    .get_latest_versions_by_hash(mapping.id(), hash)
                    .await
                    .map_err(|e| SyncError::Persistence(format!("{e:#}")))?;
                for version in versions {
                    if version.file_path() == path {
                        continue;
                    }
                    let original_state = self.filesystem.get_state(version.file_path()).await;
                    if matches!(original_state, Ok(s) if s.is_regular_file()) {
                        let original = version.file_path().clone();
                        tracing::debug!(batch_id, original = %original, "Copy detected");
                        return Ok(Classification::Copy { original });
                    }
                }
            }
        }

        tracing::debug!(batch_id, "New file");
        Ok(Classification::New)
    }

    /// Force-confirms pending deletes whose window timer never fired
    ///
    /// Timers are tokio tasks and die with the runtime that spawned them;
    /// the periodic sweep catches anything stranded that way.
    pub async fn sweep(&self) {
        let stale_after = self.settings.detection_window * 2;
        let stale: Vec<SyncPath> = self
            .pending
            .iter()
            .filter(|entry| entry.value().recorded_at.elapsed() > stale_after)
            .map(|entry| entry.key().clone())
            .collect();

        for path in stale {
            if let Some(expired) = self.claim(&path) {
                tracing::warn!(path = %path, "Pending delete missed its window, confirming");
                confirm_delete(self.store.as_ref(), expired).await;
            }
        }
    }

    /// Number of deletes currently inside their detection window
    pub fn pending_deletes(&self) -> usize {
        self.pending.len()
    }

    fn claim(&self, path: &SyncPath) -> Option<PendingDelete> {
        let (_, pending) = self.pending.remove(path)?;
        pending.cancel.cancel();
        Some(pending)
    }

    /// Per-directory batch id, for correlating burst events in logs.
    fn batch_id(&self, path: &SyncPath) -> u64 {
        let Some(dir) = path.parent() else {
            return 0;
        };
        let now = Instant::now();
        let mut entry = self.batches.entry(dir).or_insert_with(|| {
            (self.batch_counter.fetch_add(1, Ordering::Relaxed), now)
        });
        if now.duration_since(entry.1) > self.settings.batch_window {
            entry.0 = self.batch_counter.fetch_add(1, Ordering::Relaxed);
        }
        entry.1 = now;
        entry.0
    }
}

async fn wait_resolved(
    mut rx: watch::Receiver<Option<ResolvedInfo>>,
    cap: Duration,
) -> ResolvedInfo {
    match tokio::time::timeout(cap, rx.wait_for(|info| info.is_some())).await {
        Ok(Ok(guard)) => guard.clone().unwrap_or_default(),
        _ => ResolvedInfo::default(),
    }
}

async fn confirm_delete(store: &dyn IStateStore, pending: PendingDelete) {
    let info = wait_resolved(pending.info.clone(), HASH_WAIT).await;

    let Some(hash) = info.hash else {
        tracing::debug!(path = %pending.path, "Untracked file deleted, no audit entry");
        return;
    };

    let metadata = serde_json::json!({
        "file_name": pending.file_name,
        "file_size": info.size,
        "modified": info.modified,
        "remote_data_id": info.remote_data_id.as_ref().map(|r| r.as_str()),
    });
    let operation = FileOperation::new(
        pending.mapping_id,
        hash,
        OperationKind::Delete,
        Some(pending.path.clone()),
        None,
        metadata,
    );
    if let Err(err) = store.record_operation(&operation).await {
        tracing::warn!(path = %pending.path, error = %format!("{err:#}"),
            "Failed to record delete operation");
    }
    tracing::info!(path = %pending.path, "Delete confirmed");
}

fn relocation(from: SyncPath, to: &SyncPath) -> Classification {
    let same_dir = from.parent() == to.parent();
    let same_name = from.file_name() == to.file_name();
    match (same_dir, same_name) {
        (true, _) => Classification::Rename { from },
        (false, true) => Classification::Move { from },
        (false, false) => Classification::MoveRename { from },
    }
}
