//! TwinDrive Engine - Core synchronization logic
//!
//! This crate implements the sync pipeline between a local folder and a
//! content-addressed remote drive:
//!
//! - [`filesystem`] - Tokio-based `ILocalFileSystem` adapter with SHA-256
//!   hashing and notify-backed watching
//! - [`watcher`] - Raw watcher event mapping and debounced change queue
//! - [`detector`] - Content-hash change detection and version appending
//! - [`classifier`] - Delete/rename/move/copy classification over a
//!   pending-delete window
//! - [`reconciler`] - Two-phase remote-to-local reconciliation
//! - [`orchestrator`] - Per-mapping lifecycle, debounce pipeline and the
//!   upload queue worker
//!
//! ## Architecture
//!
//! The engine depends only on the ports defined in `twindrive-core`
//! (`IStateStore`, `IRemoteStorage`, `ILocalFileSystem`). Concrete
//! adapters are injected by the composition root, so everything here is
//! testable against in-memory or temp-dir implementations.

pub mod classifier;
pub mod detector;
pub mod filesystem;
pub mod orchestrator;
pub mod reconciler;
pub mod watcher;

pub use classifier::{Classification, ClassifierSettings, OperationClassifier, PendingDelete};
pub use detector::{ChangeDetector, DetectedChange};
pub use filesystem::TokioFileSystem;
pub use orchestrator::{OrchestratorSettings, OrchestratorState, SyncOrchestrator};
pub use reconciler::{EchoGuard, ReconcileOutcome, Reconciler};
pub use watcher::{ChangeEvent, ChannelObserver, DebouncedChangeQueue};
