//! Port definitions (hexagonal architecture interfaces)
//!
//! This module defines the port traits that form the boundaries of the
//! hexagonal architecture. Ports are interfaces that the domain core
//! depends on, but whose implementations live in adapter crates.
//!
//! ## Ports Overview
//!
//! - [`IRemoteStorage`] - Remote drive operations (list, create, upload, download)
//! - [`IStateStore`] - Persistent storage for versions, transfers, ledger, cache
//! - [`ILocalFileSystem`] - Local filesystem operations and file watching

pub mod local_filesystem;
pub mod remote_storage;
pub mod state_store;

pub use local_filesystem::{FileSystemState, IFileObserver, ILocalFileSystem, WatchHandle};
pub use remote_storage::{IRemoteStorage, RemoteEntry, RemoteUploadReceipt};
pub use state_store::{IStateStore, VersionFilter};
