//! Remote-to-local reconciliation
//!
//! Reconciliation runs in two phases per mapping. The metadata phase
//! snapshots the remote tree and replaces the cached copy wholesale; the
//! file phase materializes everything the snapshot marked pending,
//! folders before files.
//!
//! Every write the reconciler performs will come straight back as a
//! watcher event. The [`EchoGuard`] suppresses those echoes before any
//! hashing happens; the ProcessedFile ledger catches whatever slips
//! past it.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;

use twindrive_core::domain::errors::SyncError;
use twindrive_core::domain::mapping::DriveMapping;
use twindrive_core::domain::metadata::{EntryKind, MetadataEntry};
use twindrive_core::domain::newtypes::{ContentHash, RelativePath, RemoteId, SyncPath};
use twindrive_core::domain::processed::{ProcessedFile, TransferSource};
use twindrive_core::domain::transfer::Download;
use twindrive_core::ports::{ILocalFileSystem, IRemoteStorage, IStateStore};

/// Per-path suppression of watcher echoes from our own writes
///
/// Two layers: an in-flight set covering the write itself, and a
/// timestamp marker covering the window in which the watcher delivers
/// the resulting event. Both answer before any hash is computed.
pub struct EchoGuard {
    ttl: Duration,
    recent: DashMap<SyncPath, Instant>,
    in_flight: DashMap<SyncPath, ()>,
}

impl EchoGuard {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            recent: DashMap::new(),
            in_flight: DashMap::new(),
        }
    }

    /// True when an event for this path is an echo of our own write
    pub fn is_echo(&self, path: &SyncPath) -> bool {
        if self.in_flight.contains_key(path) {
            return true;
        }
        if let Some(marked_at) = self.recent.get(path).map(|entry| *entry.value()) {
            if marked_at.elapsed() <= self.ttl {
                return true;
            }
            self.recent.remove(path);
        }
        false
    }

    /// Marks a path as just written by the engine
    pub fn mark_downloaded(&self, path: &SyncPath) {
        self.recent.insert(path.clone(), Instant::now());
    }

    /// Claims a path for an in-flight download; false if already claimed
    pub fn begin_download(&self, path: &SyncPath) -> bool {
        self.in_flight.insert(path.clone(), ()).is_none()
    }

    /// Releases an in-flight claim
    pub fn finish_download(&self, path: &SyncPath) {
        self.in_flight.remove(path);
    }

    /// Drops expired markers
    pub fn prune(&self) {
        self.recent.retain(|_, marked_at| marked_at.elapsed() <= self.ttl);
    }
}

/// Counters for one reconciliation pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileOutcome {
    /// Remote entries seen in the metadata phase
    pub entries_listed: usize,
    /// Local folders ensured in the file phase
    pub folders_ensured: usize,
    /// Files fetched and verified
    pub files_downloaded: usize,
    /// Per-entry failures (recorded on their rows, pass continued)
    pub failures: usize,
}

/// Pulls the remote tree down into the local folder
pub struct Reconciler {
    store: Arc<dyn IStateStore>,
    remote: Arc<dyn IRemoteStorage>,
    filesystem: Arc<dyn ILocalFileSystem>,
    echo: Arc<EchoGuard>,
}

impl Reconciler {
    pub fn new(
        store: Arc<dyn IStateStore>,
        remote: Arc<dyn IRemoteStorage>,
        filesystem: Arc<dyn ILocalFileSystem>,
        echo: Arc<EchoGuard>,
    ) -> Self {
        Self {
            store,
            remote,
            filesystem,
            echo,
        }
    }

    /// Runs both reconciliation phases for a mapping
    ///
    /// A metadata phase failure aborts the pass. File phase failures are
    /// recorded on the affected rows and counted; the pass continues.
    #[tracing::instrument(skip(self, mapping), fields(mapping_id = %mapping.id()))]
    pub async fn reconcile(&self, mapping: &DriveMapping) -> Result<ReconcileOutcome, SyncError> {
        let mut outcome = ReconcileOutcome::default();

        // Metadata phase.
        let mut entries = Vec::new();
        self.list_tree(
            mapping,
            mapping.root_folder_id().clone(),
            RelativePath::root(),
            &mut entries,
        )
        .await
        .map_err(|e| SyncError::Remote(format!("metadata listing failed: {e:#}")))?;
        outcome.entries_listed = entries.len();

        self.store
            .replace_metadata(mapping.id(), &entries)
            .await
            .map_err(|e| SyncError::Persistence(format!("{e:#}")))?;
        tracing::info!(entries = entries.len(), "Metadata cache replaced");

        // File phase: folders first so nested writes have parents.
        for entry in entries.iter().filter(|e| e.kind() == EntryKind::Folder) {
            match self.filesystem.create_directory(entry.local_path()).await {
                Ok(()) => outcome.folders_ensured += 1,
                Err(err) => {
                    outcome.failures += 1;
                    tracing::warn!(path = %entry.local_path(), error = %format!("{err:#}"),
                        "Failed to create local folder");
                }
            }
        }

        for entry in entries.iter().filter(|e| e.needs_download()) {
            match self.download_entry(mapping, entry).await {
                Ok(true) => outcome.files_downloaded += 1,
                Ok(false) => {}
                Err(err) => {
                    outcome.failures += 1;
                    tracing::warn!(path = %entry.path(), error = %err,
                        "Download failed, row marked for the next pass");
                }
            }
        }

        tracing::info!(
            listed = outcome.entries_listed,
            downloaded = outcome.files_downloaded,
            failures = outcome.failures,
            "Reconciliation pass finished"
        );
        Ok(outcome)
    }

    /// Downloads one pending entry; Ok(false) when another task holds it
    async fn download_entry(
        &self,
        mapping: &DriveMapping,
        entry: &MetadataEntry,
    ) -> Result<bool, SyncError> {
        let path = entry.local_path();
        if !self.echo.begin_download(path) {
            tracing::debug!(path = %path, "Download already in flight, skipping");
            return Ok(false);
        }
        let result = self.fetch_and_record(mapping, entry).await;
        self.echo.finish_download(path);
        result.map(|_| true)
    }

    async fn fetch_and_record(
        &self,
        mapping: &DriveMapping,
        entry: &MetadataEntry,
    ) -> Result<(), SyncError> {
        let mut download = Download::new(
            mapping.id(),
            entry.remote_id().clone(),
            entry.local_path().clone(),
            entry.size(),
        );
        self.store
            .save_download(&download)
            .await
            .map_err(|e| SyncError::Persistence(format!("{e:#}")))?;
        download.start()?;
        self.store
            .save_download(&download)
            .await
            .map_err(|e| SyncError::Persistence(format!("{e:#}")))?;

        match self.transfer(entry).await {
            Ok((hash, size)) => {
                download.complete(hash.clone())?;
                self.store
                    .save_download(&download)
                    .await
                    .map_err(|e| SyncError::Persistence(format!("{e:#}")))?;

                let processed = ProcessedFile::new(
                    hash.clone(),
                    mapping.id(),
                    size,
                    entry.local_path().clone(),
                    TransferSource::Download,
                    Some(entry.remote_id().clone()),
                )?;
                self.store
                    .record_processed(&processed)
                    .await
                    .map_err(|e| SyncError::Persistence(format!("{e:#}")))?;

                let mut updated = entry.clone();
                updated.mark_synced();
                self.store
                    .update_metadata_entry(&updated)
                    .await
                    .map_err(|e| SyncError::Persistence(format!("{e:#}")))?;

                tracing::info!(path = %entry.local_path(), hash = %hash.short(), "File downloaded");
                Ok(())
            }
            Err(err) => {
                if download.fail(err.to_string()).is_ok() {
                    if let Err(save_err) = self.store.save_download(&download).await {
                        tracing::warn!(error = %format!("{save_err:#}"),
                            "Failed to persist download failure");
                    }
                }
                let mut updated = entry.clone();
                updated.mark_error();
                if let Err(save_err) = self.store.update_metadata_entry(&updated).await {
                    tracing::warn!(error = %format!("{save_err:#}"),
                        "Failed to persist metadata error state");
                }
                Err(err)
            }
        }
    }

    /// Fetch, write, verify; returns the recomputed hash and on-disk size
    async fn transfer(&self, entry: &MetadataEntry) -> Result<(ContentHash, u64), SyncError> {
        let path = entry.local_path();

        let data = self
            .remote
            .download_file(entry.remote_id())
            .await
            .map_err(|e| SyncError::Remote(format!("{e:#}")))?;

        // Mark before writing so the watcher event cannot outrun the marker.
        self.echo.mark_downloaded(path);
        self.filesystem
            .write_file(path, &data)
            .await
            .map_err(|e| SyncError::Io(std::io::Error::other(format!("{e:#}"))))?;

        let state = self
            .filesystem
            .get_state(path)
            .await
            .map_err(|e| SyncError::Io(std::io::Error::other(format!("{e:#}"))))?;
        if !state.is_regular_file() || state.size != data.len() as u64 {
            return Err(SyncError::Io(std::io::Error::other(format!(
                "post-write verification failed for {} ({} bytes on disk, {} fetched)",
                path,
                state.size,
                data.len()
            ))));
        }

        let hash = self
            .filesystem
            .compute_hash(path)
            .await
            .map_err(|e| SyncError::Hash(format!("{e:#}")))?;

        Ok((hash, state.size))
    }

    /// Depth-first remote listing, accumulating cache entries
    fn list_tree<'a>(
        &'a self,
        mapping: &'a DriveMapping,
        folder_id: RemoteId,
        prefix: RelativePath,
        entries: &'a mut Vec<MetadataEntry>,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + 'a>> {
        Box::pin(async move {
            let children = self.remote.list_folder(&folder_id).await?;
            for child in children {
                let name = leaf_name(&child.name);
                let rel = if prefix.as_str().is_empty() {
                    RelativePath::new(name.to_string())?
                } else {
                    RelativePath::new(format!("{}/{}", prefix.as_str(), name))?
                };
                let local_path = rel.resolve(mapping.local_folder_path())?;
                let local_state = self.filesystem.get_state(&local_path).await?;
                let remote_id = RemoteId::new(child.id.clone())?;
                let parent_id = match &child.parent_id {
                    Some(raw) => Some(RemoteId::new(raw.clone())?),
                    None => None,
                };

                if child.is_folder {
                    entries.push(MetadataEntry::folder(
                        mapping.id(),
                        remote_id.clone(),
                        parent_id,
                        name,
                        rel.clone(),
                        local_path,
                        local_state.is_directory(),
                    ));
                    self.list_tree(mapping, remote_id, rel, &mut *entries).await?;
                } else {
                    let hash = match child.content_hash.as_deref() {
                        Some(raw) => match ContentHash::new(raw.to_string()) {
                            Ok(h) => Some(h),
                            Err(_) => {
                                tracing::warn!(name, "Ignoring malformed remote content hash");
                                None
                            }
                        },
                        None => None,
                    };
                    entries.push(MetadataEntry::file(
                        mapping.id(),
                        remote_id,
                        parent_id,
                        name,
                        rel,
                        child.size.unwrap_or(0),
                        hash,
                        local_path,
                        local_state.is_regular_file(),
                    ));
                }
            }
            Ok(())
        })
    }
}

/// Strips any path prefix a backend bakes into an entry name
///
/// Some drive backends report root children as "DriveName/child", which
/// would nest the whole tree under a phantom folder named after the
/// drive itself.
fn leaf_name(raw: &str) -> &str {
    raw.rsplit('/').next().unwrap_or(raw)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn plain_names_pass_through() {
        assert_eq!(leaf_name("report.txt"), "report.txt");
    }

    #[test]
    fn drive_prefixes_are_stripped() {
        assert_eq!(leaf_name("MyDrive/report.txt"), "report.txt");
        assert_eq!(leaf_name("MyDrive/MyDrive/report.txt"), "report.txt");
    }

    #[test]
    fn echo_guard_marks_and_expires() {
        let guard = EchoGuard::new(Duration::from_millis(50));
        let path = SyncPath::new(PathBuf::from("/data/a.txt")).unwrap();

        assert!(!guard.is_echo(&path));
        guard.mark_downloaded(&path);
        assert!(guard.is_echo(&path));

        std::thread::sleep(Duration::from_millis(60));
        assert!(!guard.is_echo(&path));
    }

    #[test]
    fn echo_guard_tracks_in_flight_downloads() {
        let guard = EchoGuard::new(Duration::from_secs(30));
        let path = SyncPath::new(PathBuf::from("/data/a.txt")).unwrap();

        assert!(guard.begin_download(&path));
        assert!(!guard.begin_download(&path), "second claim must fail");
        assert!(guard.is_echo(&path));

        guard.finish_download(&path);
        // The write itself never happened, so nothing was marked.
        assert!(!guard.is_echo(&path));
    }

    #[test]
    fn prune_drops_expired_markers() {
        let guard = EchoGuard::new(Duration::from_millis(10));
        let path = SyncPath::new(PathBuf::from("/data/a.txt")).unwrap();

        guard.mark_downloaded(&path);
        std::thread::sleep(Duration::from_millis(20));
        guard.prune();
        assert!(!guard.is_echo(&path));
    }
}
