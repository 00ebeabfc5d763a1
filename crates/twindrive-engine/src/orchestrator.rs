//! Per-mapping sync lifecycle
//!
//! One orchestrator owns one drive mapping. It brings the mapping up
//! (local folder, initial reconciliation, watcher), runs the event loop
//! that feeds debounced watcher events into detection and
//! classification, and drains the upload queue. Stopping, pausing and
//! resuming are explicit state transitions; everything in between is a
//! per-file pipeline where errors are logged and never take the loop
//! down.
//!
//! ## Per-path debouncing
//!
//! Editors produce bursts of events for a single save. Each path gets
//! its own debounce timer; a newer event for the same path cancels the
//! older timer. Once a timer fires the path is locked until processing
//! finishes, and events arriving for a locked path are dropped (the
//! next watcher event after the lock clears picks up any further
//! change).

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use dashmap::DashMap;
use globset::{Glob, GlobSet, GlobSetBuilder};
use tokio::sync::{mpsc, Notify};
use tokio_util::sync::CancellationToken;

use twindrive_core::config::Config;
use twindrive_core::domain::errors::{DomainError, SyncError};
use twindrive_core::domain::mapping::DriveMapping;
use twindrive_core::domain::metadata::EntryKind;
use twindrive_core::domain::newtypes::{RelativePath, RemoteId, SyncPath, TransferId};
use twindrive_core::domain::processed::{ProcessedFile, TransferSource};
use twindrive_core::domain::transfer::{PendingUpload, Upload};
use twindrive_core::domain::version::{ChangeType, UploadMethod};
use twindrive_core::ports::{
    ILocalFileSystem, IRemoteStorage, IStateStore, VersionFilter, WatchHandle,
};

use crate::classifier::{Classification, ClassifierSettings, OperationClassifier};
use crate::detector::{ChangeDetector, DetectedChange};
use crate::reconciler::{EchoGuard, Reconciler};
use crate::watcher::ChangeEvent;

// ============================================================================
// OrchestratorState
// ============================================================================

/// Lifecycle state of a mapping's orchestrator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrchestratorState {
    /// Constructed, not yet started
    Idle,
    /// Bring-up in progress (folder, reconcile, watcher)
    Starting,
    /// Event loop live, uploads draining
    Running,
    /// Watcher detached, queue held
    Paused,
    /// Teardown in progress
    Stopping,
    /// Terminal
    Stopped,
}

impl OrchestratorState {
    /// Returns the lowercase state name
    pub fn name(&self) -> &'static str {
        match self {
            OrchestratorState::Idle => "idle",
            OrchestratorState::Starting => "starting",
            OrchestratorState::Running => "running",
            OrchestratorState::Paused => "paused",
            OrchestratorState::Stopping => "stopping",
            OrchestratorState::Stopped => "stopped",
        }
    }

    /// Checks if a state transition is valid
    ///
    /// Valid transitions:
    /// - Idle -> Starting
    /// - Starting -> Running, Stopping
    /// - Running -> Paused, Stopping
    /// - Paused -> Running, Stopping
    /// - Stopping -> Stopped
    /// - Stopped -> (terminal)
    pub fn can_transition_to(&self, target: OrchestratorState) -> bool {
        matches!(
            (self, target),
            (OrchestratorState::Idle, OrchestratorState::Starting)
                | (OrchestratorState::Starting, OrchestratorState::Running)
                | (OrchestratorState::Starting, OrchestratorState::Stopping)
                | (OrchestratorState::Running, OrchestratorState::Paused)
                | (OrchestratorState::Running, OrchestratorState::Stopping)
                | (OrchestratorState::Paused, OrchestratorState::Running)
                | (OrchestratorState::Paused, OrchestratorState::Stopping)
                | (OrchestratorState::Stopping, OrchestratorState::Stopped)
        )
    }
}

impl std::fmt::Display for OrchestratorState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

// ============================================================================
// OrchestratorSettings
// ============================================================================

/// Tuning knobs for one orchestrator
#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    /// Quiet period before a path's event is processed
    pub debounce: Duration,
    /// Timing knobs passed through to the classifier
    pub classifier: ClassifierSettings,
    /// Upper bound on a single classification, settle waits included
    pub classification_timeout: Duration,
    /// Interval of the maintenance sweep (windows, caches, queue)
    pub sweep_interval: Duration,
    /// How long a downloaded path suppresses its own watcher echo
    pub download_marker_ttl: Duration,
    /// Engine-wide upload size ceiling in bytes, mappings may lower it
    pub max_file_size: u64,
    /// Files larger than this upload chunked
    pub chunked_threshold: u64,
    /// Route new uploads through the approval queue
    pub require_approval: bool,
    /// Hash cache size that triggers a trim
    pub hash_cache_max: usize,
    /// Hash cache size a trim shrinks to
    pub hash_cache_trim_to: usize,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(500),
            classifier: ClassifierSettings::default(),
            classification_timeout: Duration::from_secs(10),
            sweep_interval: Duration::from_secs(60),
            download_marker_ttl: Duration::from_secs(30),
            max_file_size: 100 * 1024 * 1024,
            chunked_threshold: 10 * 1024 * 1024,
            require_approval: true,
            hash_cache_max: 1000,
            hash_cache_trim_to: 500,
        }
    }
}

impl OrchestratorSettings {
    /// Builds settings from the loaded configuration
    pub fn from_config(config: &Config) -> Self {
        Self {
            debounce: Duration::from_millis(config.engine.debounce_ms),
            classifier: ClassifierSettings {
                detection_window: Duration::from_secs(config.engine.detection_window_secs),
                hash_settle: Duration::from_millis(config.engine.hash_settle_ms),
                batch_window: Duration::from_millis(config.engine.batch_window_ms),
            },
            classification_timeout: Duration::from_secs(10),
            sweep_interval: Duration::from_secs(config.engine.sweep_interval_secs),
            download_marker_ttl: Duration::from_secs(config.engine.download_marker_ttl_secs),
            max_file_size: config.uploads.max_file_size_mb * 1024 * 1024,
            chunked_threshold: config.uploads.chunked_threshold_mb * 1024 * 1024,
            require_approval: config.uploads.require_approval,
            hash_cache_max: config.engine.hash_cache_max,
            hash_cache_trim_to: config.engine.hash_cache_trim_to,
        }
    }
}

// ============================================================================
// SyncOrchestrator
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PathState {
    Debouncing,
    Locked,
}

struct PathEntry {
    state: PathState,
    cancel: CancellationToken,
}

/// Drives the sync lifecycle for a single mapping
pub struct SyncOrchestrator {
    mapping: DriveMapping,
    store: Arc<dyn IStateStore>,
    remote: Arc<dyn IRemoteStorage>,
    filesystem: Arc<dyn ILocalFileSystem>,
    detector: Arc<ChangeDetector>,
    classifier: Arc<OperationClassifier>,
    reconciler: Reconciler,
    echo: Arc<EchoGuard>,
    excludes: GlobSet,
    settings: OrchestratorSettings,
    state: Mutex<OrchestratorState>,
    paths: DashMap<SyncPath, PathEntry>,
    watch: Mutex<Option<WatchHandle>>,
    upload_ready: Notify,
    shutdown: CancellationToken,
}

impl SyncOrchestrator {
    /// Wires up the pipeline for a mapping
    ///
    /// # Errors
    ///
    /// Returns `DomainError::ValidationFailed` if the mapping's exclude
    /// patterns do not compile.
    pub fn new(
        mapping: DriveMapping,
        store: Arc<dyn IStateStore>,
        remote: Arc<dyn IRemoteStorage>,
        filesystem: Arc<dyn ILocalFileSystem>,
        settings: OrchestratorSettings,
    ) -> Result<Arc<Self>, SyncError> {
        let excludes = build_globset(&mapping.sync_settings().exclude_patterns)?;
        let detector = Arc::new(ChangeDetector::new(
            Arc::clone(&store),
            Arc::clone(&filesystem),
        ));
        let classifier = Arc::new(OperationClassifier::new(
            Arc::clone(&store),
            Arc::clone(&detector),
            Arc::clone(&filesystem),
            settings.classifier.clone(),
        ));
        let echo = Arc::new(EchoGuard::new(settings.download_marker_ttl));
        let reconciler = Reconciler::new(
            Arc::clone(&store),
            Arc::clone(&remote),
            Arc::clone(&filesystem),
            Arc::clone(&echo),
        );

        Ok(Arc::new(Self {
            mapping,
            store,
            remote,
            filesystem,
            detector,
            classifier,
            reconciler,
            echo,
            excludes,
            settings,
            state: Mutex::new(OrchestratorState::Idle),
            paths: DashMap::new(),
            watch: Mutex::new(None),
            upload_ready: Notify::new(),
            shutdown: CancellationToken::new(),
        }))
    }

    /// The mapping this orchestrator drives
    pub fn mapping(&self) -> &DriveMapping {
        &self.mapping
    }

    /// Current lifecycle state
    pub fn state(&self) -> OrchestratorState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The echo guard shared between reconciliation and event intake
    pub fn echo(&self) -> &Arc<EchoGuard> {
        &self.echo
    }

    // --- Lifecycle ---

    /// Brings the mapping up and spawns the event loop
    ///
    /// Ensures the local folder exists, runs an initial remote
    /// reconciliation (download directions), attaches the watcher
    /// (upload directions), then hands `events` to the spawned loop.
    pub async fn start(
        self: Arc<Self>,
        events: mpsc::Receiver<ChangeEvent>,
    ) -> Result<(), SyncError> {
        self.transition(OrchestratorState::Starting)?;

        if let Err(err) = self.bring_up().await {
            let _ = self.transition(OrchestratorState::Stopping);
            let _ = self.transition(OrchestratorState::Stopped);
            return Err(err);
        }

        tokio::spawn(Arc::clone(&self).run(events));
        self.transition(OrchestratorState::Running)?;
        self.upload_ready.notify_one();
        tracing::info!(
            mapping = %self.mapping.id(),
            folder = %self.mapping.local_folder_path(),
            "Orchestrator running"
        );
        Ok(())
    }

    /// Stops the orchestrator and tears the pipeline down
    ///
    /// Detaches the watcher, cancels the event loop and every pending
    /// debounce timer. In-flight debounce tasks observe their cancelled
    /// tokens and exit without processing.
    pub fn stop(&self) -> Result<(), SyncError> {
        self.transition(OrchestratorState::Stopping)?;

        if let Some(handle) = self
            .watch
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            handle.stop();
        }
        self.shutdown.cancel();
        for entry in self.paths.iter() {
            entry.value().cancel.cancel();
        }
        self.paths.clear();

        self.transition(OrchestratorState::Stopped)?;
        tracing::info!(mapping = %self.mapping.id(), "Orchestrator stopped");
        Ok(())
    }

    /// Detaches the watcher and holds the upload queue
    ///
    /// Events already debouncing still settle; nothing new arrives
    /// until [`resume`](Self::resume).
    pub fn pause(&self) -> Result<(), SyncError> {
        self.transition(OrchestratorState::Paused)?;
        if let Some(handle) = self
            .watch
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            handle.stop();
        }
        tracing::info!(mapping = %self.mapping.id(), "Watching paused");
        Ok(())
    }

    /// Reattaches the watcher and rescans for changes missed while paused
    pub async fn resume(&self) -> Result<(), SyncError> {
        self.transition(OrchestratorState::Running)?;

        if self.mapping.sync_settings().sync_direction.allows_upload() {
            let handle = self
                .filesystem
                .watch(self.mapping.local_folder_path())
                .await
                .map_err(|e| SyncError::Io(std::io::Error::other(format!("{:#}", e))))?;
            *self.watch.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle);
        }

        self.rescan().await?;
        self.upload_ready.notify_one();
        tracing::info!(mapping = %self.mapping.id(), "Watching resumed");
        Ok(())
    }

    async fn bring_up(&self) -> Result<(), SyncError> {
        self.filesystem
            .create_directory(self.mapping.local_folder_path())
            .await
            .map_err(|e| SyncError::Io(std::io::Error::other(format!("{:#}", e))))?;

        if self.mapping.sync_settings().sync_direction.allows_download() {
            let outcome = self.reconciler.reconcile(&self.mapping).await?;
            tracing::info!(
                mapping = %self.mapping.id(),
                listed = outcome.entries_listed,
                downloaded = outcome.files_downloaded,
                failures = outcome.failures,
                "Initial reconciliation complete"
            );
        }

        if self.mapping.sync_settings().sync_direction.allows_upload() {
            let handle = self
                .filesystem
                .watch(self.mapping.local_folder_path())
                .await
                .map_err(|e| SyncError::Io(std::io::Error::other(format!("{:#}", e))))?;
            *self.watch.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle);
        }

        Ok(())
    }

    fn transition(&self, target: OrchestratorState) -> Result<(), SyncError> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if !state.can_transition_to(target) {
            return Err(SyncError::Domain(DomainError::InvalidState {
                from: state.name().to_string(),
                to: target.name().to_string(),
            }));
        }
        *state = target;
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.state() == OrchestratorState::Running
    }

    // --- Event loop ---

    async fn run(self: Arc<Self>, mut events: mpsc::Receiver<ChangeEvent>) {
        let mut sweep = tokio::time::interval(self.settings.sweep_interval);
        sweep.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        sweep.tick().await;

        tracing::debug!(mapping = %self.mapping.id(), "Event loop started");
        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    tracing::debug!(mapping = %self.mapping.id(), "Event loop shutting down");
                    break;
                }
                maybe_event = events.recv() => {
                    match maybe_event {
                        Some(event) => Arc::clone(&self).accept(event),
                        None => {
                            tracing::debug!(mapping = %self.mapping.id(), "Event channel closed");
                            break;
                        }
                    }
                }
                _ = sweep.tick() => {
                    self.classifier.sweep().await;
                    self.detector
                        .trim_cache(self.settings.hash_cache_max, self.settings.hash_cache_trim_to);
                    self.echo.prune();
                    self.drain_uploads().await;
                }
                _ = self.upload_ready.notified() => {
                    self.drain_uploads().await;
                }
            }
        }
    }

    /// Filters an incoming event and arms its debounce timer
    fn accept(self: Arc<Self>, event: ChangeEvent) {
        let path = match SyncPath::new(event.path().clone()) {
            Ok(path) => path,
            Err(err) => {
                tracing::warn!(error = %err, "Dropping event with unusable path");
                return;
            }
        };

        if !self.mapping.contains(&path) {
            tracing::debug!(path = %path, "Event outside the mapping root");
            return;
        }
        if self.echo.is_echo(&path) {
            tracing::debug!(path = %path, "Suppressed echo of our own write");
            return;
        }
        if self.is_excluded(&path) {
            tracing::debug!(path = %path, "Excluded by pattern");
            return;
        }
        if let Some(entry) = self.paths.get(&path) {
            if entry.state == PathState::Locked {
                tracing::debug!(path = %path, "Path locked, event dropped");
                return;
            }
        }

        let token = CancellationToken::new();
        if let Some(previous) = self.paths.insert(
            path.clone(),
            PathEntry {
                state: PathState::Debouncing,
                cancel: token.clone(),
            },
        ) {
            previous.cancel.cancel();
        }

        let debounce = self.settings.debounce;
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = tokio::time::sleep(debounce) => {
                    self.settle(path, event).await;
                }
            }
        });
    }

    /// Locks a debounced path and runs it through the pipeline
    async fn settle(self: Arc<Self>, path: SyncPath, event: ChangeEvent) {
        {
            let Some(mut entry) = self.paths.get_mut(&path) else {
                return;
            };
            entry.state = PathState::Locked;
        }

        if let Err(err) = self.process(&path, event).await {
            tracing::warn!(path = %path, error = %err, "Change processing failed");
        }
        self.paths.remove(&path);
    }

    #[tracing::instrument(skip(self, event), fields(path = %path))]
    async fn process(&self, path: &SyncPath, event: ChangeEvent) -> Result<(), SyncError> {
        match event {
            ChangeEvent::Deleted(_) => {
                self.classifier
                    .note_delete(&self.mapping, path.clone())
                    .await;
                Ok(())
            }
            ChangeEvent::Renamed { old, .. } => {
                match SyncPath::new(old) {
                    Ok(old_path) => {
                        self.classifier.note_delete(&self.mapping, old_path).await;
                    }
                    Err(err) => {
                        tracing::warn!(error = %err, "Rename source path unusable");
                    }
                }
                self.handle_create(path).await
            }
            ChangeEvent::Created(_) => self.handle_create(path).await,
            ChangeEvent::Modified(_) => {
                let state = self
                    .filesystem
                    .get_state(path)
                    .await
                    .map_err(|e| SyncError::Io(std::io::Error::other(format!("{:#}", e))))?;
                if !state.is_regular_file() {
                    tracing::debug!(path = %path, "Modified path is not a regular file");
                    return Ok(());
                }
                match self.detector.detect_change(&self.mapping, path).await? {
                    DetectedChange::Unchanged => Ok(()),
                    DetectedChange::Create => self.handle_create(path).await,
                    DetectedChange::Update => self.queue_upload(path).await,
                }
            }
        }
    }

    /// Classifies a create and routes the outcome
    async fn handle_create(&self, path: &SyncPath) -> Result<(), SyncError> {
        let state = self
            .filesystem
            .get_state(path)
            .await
            .map_err(|e| SyncError::Io(std::io::Error::other(format!("{:#}", e))))?;
        if !state.exists {
            tracing::debug!(path = %path, "Path vanished before processing");
            return Ok(());
        }
        if !state.is_file {
            tracing::debug!(path = %path, "Directory creates carry no content");
            return Ok(());
        }

        let classification = tokio::time::timeout(
            self.settings.classification_timeout,
            self.classifier.classify_create(&self.mapping, path),
        )
        .await
        .map_err(|_| SyncError::ClassificationTimeout(path.to_string()))??;

        match classification {
            Classification::New => self.queue_upload(path).await,
            Classification::Rename { from } => self.relink(path, &from, ChangeType::Rename).await,
            Classification::Move { from } | Classification::MoveRename { from } => {
                self.relink(path, &from, ChangeType::Move).await
            }
            Classification::Copy { original } => {
                self.detector
                    .append_version(&self.mapping, path, ChangeType::Create, None, None)
                    .await?;
                tracing::debug!(
                    path = %path,
                    original = %original,
                    "Duplicate content, upload skipped"
                );
                Ok(())
            }
        }
    }

    /// Extends the source path's version chain at the new location
    async fn relink(
        &self,
        path: &SyncPath,
        from: &SyncPath,
        change_type: ChangeType,
    ) -> Result<(), SyncError> {
        let parent = self
            .store
            .get_latest_version(self.mapping.id(), from)
            .await
            .map_err(|e| SyncError::Persistence(format!("{:#}", e)))?;

        match parent {
            Some(previous) => {
                self.detector
                    .append_version(&self.mapping, path, change_type, Some(&previous), None)
                    .await?;
                tracing::info!(
                    path = %path,
                    from = %from,
                    change = %change_type,
                    "Relocation recorded"
                );
                Ok(())
            }
            None => {
                tracing::debug!(from = %from, "No chain at the source, treating as new");
                self.queue_upload(path).await
            }
        }
    }

    // --- Upload intake ---

    /// Queues a path for upload, or parks it for approval
    #[tracing::instrument(skip(self), fields(path = %path))]
    async fn queue_upload(&self, path: &SyncPath) -> Result<(), SyncError> {
        if !self.mapping.sync_settings().sync_direction.allows_upload() {
            tracing::debug!("Mapping is download-only, upload skipped");
            return Ok(());
        }

        let state = self
            .filesystem
            .get_state(path)
            .await
            .map_err(|e| SyncError::Io(std::io::Error::other(format!("{:#}", e))))?;
        if !state.is_regular_file() {
            tracing::debug!("Path is no longer a regular file");
            return Ok(());
        }

        let ceiling = self
            .mapping
            .effective_max_file_size(self.settings.max_file_size);
        if state.size > ceiling {
            tracing::info!(size = state.size, ceiling, "File exceeds the size ceiling");
            return Ok(());
        }

        let hash = self.detector.hash(path).await?;
        let already = self
            .store
            .is_processed(self.mapping.id(), &hash)
            .await
            .map_err(|e| SyncError::Persistence(format!("{:#}", e)))?;
        if already {
            tracing::debug!(hash = %hash.short(), "Content already handled");
            return Ok(());
        }

        let method = if state.size > self.settings.chunked_threshold {
            UploadMethod::Chunked
        } else {
            UploadMethod::Direct
        };

        if self.settings.require_approval {
            let pending = PendingUpload::new(
                self.mapping.id(),
                path.clone(),
                state.size,
                hash,
                None,
                method,
            )?;
            self.store
                .save_pending_upload(&pending)
                .await
                .map_err(|e| SyncError::Persistence(format!("{:#}", e)))?;
            tracing::info!(
                size = state.size,
                method = method.name(),
                "Upload parked for approval"
            );
        } else {
            let upload = Upload::new(
                self.mapping.id(),
                path.clone(),
                state.size,
                hash,
                method,
                self.mapping.sync_settings().upload_priority,
            );
            self.store
                .save_upload(&upload)
                .await
                .map_err(|e| SyncError::Persistence(format!("{:#}", e)))?;
            self.upload_ready.notify_one();
            tracing::info!(size = state.size, method = method.name(), "Upload queued");
        }

        Ok(())
    }

    /// Approves a parked upload and moves it to the queue
    ///
    /// The approved row stays in the approval table for audit; the
    /// queued upload carries the approver's method override when given.
    pub async fn promote_pending(
        &self,
        id: TransferId,
        method: Option<UploadMethod>,
    ) -> Result<(), SyncError> {
        let mut pending = self
            .store
            .get_pending_upload(id)
            .await
            .map_err(|e| SyncError::Persistence(format!("{:#}", e)))?
            .ok_or_else(|| {
                SyncError::Domain(DomainError::ValidationFailed(format!(
                    "No pending upload {id}"
                )))
            })?;

        pending.approve(method)?;
        self.store
            .save_pending_upload(&pending)
            .await
            .map_err(|e| SyncError::Persistence(format!("{:#}", e)))?;

        let upload = Upload::new(
            pending.mapping_id(),
            pending.local_path().clone(),
            pending.file_size(),
            pending.content_hash().clone(),
            method.unwrap_or(pending.recommended_method()),
            self.mapping.sync_settings().upload_priority,
        );
        self.store
            .save_upload(&upload)
            .await
            .map_err(|e| SyncError::Persistence(format!("{:#}", e)))?;
        self.upload_ready.notify_one();
        tracing::info!(path = %pending.local_path(), "Pending upload approved");
        Ok(())
    }

    /// Rejects a parked upload
    pub async fn reject_pending(&self, id: TransferId) -> Result<(), SyncError> {
        let mut pending = self
            .store
            .get_pending_upload(id)
            .await
            .map_err(|e| SyncError::Persistence(format!("{:#}", e)))?
            .ok_or_else(|| {
                SyncError::Domain(DomainError::ValidationFailed(format!(
                    "No pending upload {id}"
                )))
            })?;

        pending.reject()?;
        self.store
            .save_pending_upload(&pending)
            .await
            .map_err(|e| SyncError::Persistence(format!("{:#}", e)))?;
        tracing::info!(path = %pending.local_path(), "Pending upload rejected");
        Ok(())
    }

    // --- Upload worker ---

    /// Executes queued uploads until the mapping's queue is empty
    pub async fn drain_uploads(&self) {
        let mut last: Option<TransferId> = None;
        loop {
            if self.shutdown.is_cancelled() || !self.is_running() {
                break;
            }
            let next = match self.store.next_queued_upload(self.mapping.id()).await {
                Ok(Some(upload)) => upload,
                Ok(None) => break,
                Err(err) => {
                    tracing::warn!(error = %err, "Upload queue poll failed");
                    break;
                }
            };
            // Seeing the same row twice means status writes are not
            // landing; bail instead of spinning on it.
            if last == Some(next.id()) {
                tracing::warn!(upload = %next.id(), "Upload queue is not advancing");
                break;
            }
            last = Some(next.id());
            self.process_upload(next).await;
        }
    }

    async fn process_upload(&self, mut upload: Upload) {
        let path = upload.local_path().clone();
        if let Err(err) = self.transfer(&mut upload).await {
            tracing::warn!(path = %path, error = %err, "Upload failed");
            if upload.fail(err.to_string()).is_ok() {
                if let Err(save_err) = self.store.save_upload(&upload).await {
                    tracing::warn!(path = %path, error = %save_err, "Upload failure not recorded");
                }
            }
        }
    }

    #[tracing::instrument(skip(self, upload), fields(path = %upload.local_path(), method = upload.method().name()))]
    async fn transfer(&self, upload: &mut Upload) -> Result<(), SyncError> {
        let path = upload.local_path().clone();
        upload.start()?;
        self.store
            .save_upload(upload)
            .await
            .map_err(|e| SyncError::Persistence(format!("{:#}", e)))?;

        let state = self
            .filesystem
            .get_state(&path)
            .await
            .map_err(|e| SyncError::Io(std::io::Error::other(format!("{:#}", e))))?;
        if !state.is_regular_file() {
            return Err(SyncError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("{} vanished before transfer", path),
            )));
        }

        // The file may have changed between queueing and execution. A
        // stale queue entry fails here and the fresh content arrives
        // through its own watcher event.
        let hash = self.detector.hash(&path).await?;
        if &hash != upload.content_hash() {
            return Err(SyncError::Hash(format!(
                "content of {} changed before transfer",
                path
            )));
        }

        let data = self
            .filesystem
            .read_file(&path)
            .await
            .map_err(|e| SyncError::Io(std::io::Error::other(format!("{:#}", e))))?;

        let parent = self.resolve_remote_parent(&path).await?;
        let name = path.file_name().ok_or_else(|| {
            SyncError::Domain(DomainError::ValidationFailed(format!(
                "Path has no file name: {path}"
            )))
        })?;

        let receipt = self
            .remote
            .upload_file(&parent, name, &data, upload.method(), None)
            .await
            .map_err(|e| SyncError::Remote(format!("{:#}", e)))?;
        let data_id = RemoteId::new(receipt.data_id)?;
        let metadata_id = RemoteId::new(receipt.metadata_id)?;

        upload.complete(data_id.clone(), metadata_id.clone())?;
        self.store
            .save_upload(upload)
            .await
            .map_err(|e| SyncError::Persistence(format!("{:#}", e)))?;

        let change_type = match self
            .store
            .get_latest_version(self.mapping.id(), &path)
            .await
            .map_err(|e| SyncError::Persistence(format!("{:#}", e)))?
        {
            Some(_) => ChangeType::Update,
            None => ChangeType::Create,
        };
        self.detector
            .append_version(
                &self.mapping,
                &path,
                change_type,
                None,
                Some((data_id.clone(), metadata_id)),
            )
            .await?;

        let processed = ProcessedFile::new(
            hash,
            self.mapping.id(),
            upload.file_size(),
            path.clone(),
            TransferSource::Upload,
            Some(data_id),
        )?;
        self.store
            .record_processed(&processed)
            .await
            .map_err(|e| SyncError::Persistence(format!("{:#}", e)))?;

        tracing::info!(size = upload.file_size(), "Upload completed");
        Ok(())
    }

    /// Resolves the remote folder a path's parent maps to
    ///
    /// Walks the relative path component by component through the
    /// metadata cache, creating remote folders that do not exist yet.
    /// Folders created here are not cached; the next reconciliation
    /// snapshot picks them up.
    async fn resolve_remote_parent(&self, path: &SyncPath) -> Result<RemoteId, SyncError> {
        let root = self.mapping.local_folder_path();
        let Some(parent) = path.parent() else {
            return Ok(self.mapping.root_folder_id().clone());
        };
        if &parent == root {
            return Ok(self.mapping.root_folder_id().clone());
        }

        let relative = parent.relative_to(root)?;
        let mut current = self.mapping.root_folder_id().clone();
        let mut prefix = String::new();

        for component in relative.as_str().split('/') {
            if component.is_empty() {
                continue;
            }
            if !prefix.is_empty() {
                prefix.push('/');
            }
            prefix.push_str(component);

            let cached = self
                .store
                .get_metadata_by_path(self.mapping.id(), &RelativePath::new(prefix.clone())?)
                .await
                .map_err(|e| SyncError::Persistence(format!("{:#}", e)))?;

            match cached {
                Some(entry) if entry.kind() == EntryKind::Folder => {
                    current = entry.remote_id().clone();
                }
                _ => {
                    let created = self
                        .remote
                        .create_folder(&current, component)
                        .await
                        .map_err(|e| SyncError::Remote(format!("{:#}", e)))?;
                    current = RemoteId::new(created.id)?;
                    tracing::debug!(folder = component, "Remote folder created");
                }
            }
        }

        Ok(current)
    }

    // --- Rescan ---

    /// Walks the local tree and reconciles it with the version chains
    ///
    /// Covers changes the watcher missed: new and modified files route
    /// through the normal create/update pipeline, and tracked paths no
    /// longer on disk enter the delete detection window.
    pub async fn rescan(&self) -> Result<(), SyncError> {
        let mut on_disk: HashSet<SyncPath> = HashSet::new();
        let mut stack = vec![self.mapping.local_folder_path().clone()];

        while let Some(dir) = stack.pop() {
            let children = self
                .filesystem
                .list_directory(&dir)
                .await
                .map_err(|e| SyncError::Io(std::io::Error::other(format!("{:#}", e))))?;
            for child in children {
                if self.is_excluded(&child) {
                    continue;
                }
                let state = self
                    .filesystem
                    .get_state(&child)
                    .await
                    .map_err(|e| SyncError::Io(std::io::Error::other(format!("{:#}", e))))?;
                if state.is_directory() {
                    stack.push(child);
                    continue;
                }
                if !state.is_regular_file() {
                    continue;
                }
                on_disk.insert(child.clone());

                match self.detector.detect_change(&self.mapping, &child).await {
                    Ok(DetectedChange::Unchanged) => {}
                    Ok(DetectedChange::Create) => {
                        if let Err(err) = self.handle_create(&child).await {
                            tracing::warn!(path = %child, error = %err, "Rescan create failed");
                        }
                    }
                    Ok(DetectedChange::Update) => {
                        if let Err(err) = self.queue_upload(&child).await {
                            tracing::warn!(path = %child, error = %err, "Rescan update failed");
                        }
                    }
                    Err(err) => {
                        tracing::warn!(path = %child, error = %err, "Rescan detection failed");
                    }
                }
            }
        }

        let filter = VersionFilter::new()
            .with_mapping_id(self.mapping.id())
            .latest_only();
        let latest = self
            .store
            .query_versions(&filter)
            .await
            .map_err(|e| SyncError::Persistence(format!("{:#}", e)))?;
        for version in latest {
            let path = version.file_path();
            if on_disk.contains(path) {
                continue;
            }
            let state = self
                .filesystem
                .get_state(path)
                .await
                .map_err(|e| SyncError::Io(std::io::Error::other(format!("{:#}", e))))?;
            if !state.exists {
                self.classifier
                    .note_delete(&self.mapping, path.clone())
                    .await;
            }
        }

        Ok(())
    }

    fn is_excluded(&self, path: &SyncPath) -> bool {
        match path.relative_to(self.mapping.local_folder_path()) {
            Ok(relative) => self.excludes.is_match(relative.as_str()),
            Err(_) => false,
        }
    }
}

fn build_globset(patterns: &[String]) -> Result<GlobSet, SyncError> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern).map_err(|e| {
            SyncError::Domain(DomainError::ValidationFailed(format!(
                "Invalid exclude pattern {pattern:?}: {e}"
            )))
        })?;
        builder.add(glob);
    }
    builder.build().map_err(|e| {
        SyncError::Domain(DomainError::ValidationFailed(format!(
            "Exclude patterns failed to compile: {e}"
        )))
    })
}
