//! Domain entities and business logic
//!
//! This module contains the core domain types for TwinDrive:
//! - Newtypes for type-safe identifiers and validated domain types
//! - Drive mapping configuration types
//! - File version chain types
//! - Transfer types (pending uploads, uploads, downloads)
//! - Remote metadata cache types
//! - Dedup ledger and audit log types
//! - Domain-specific error types

pub mod errors;
pub mod mapping;
pub mod metadata;
pub mod newtypes;
pub mod operation;
pub mod processed;
pub mod transfer;
pub mod version;

// Re-export commonly used types
pub use errors::{DomainError, SyncError};
pub use mapping::{DriveMapping, SyncDirection, SyncSettings};
pub use metadata::{EntryKind, MetadataEntry, SyncStatus};
pub use newtypes::*;
pub use operation::{FileOperation, OperationKind};
pub use processed::{ProcessedFile, TransferSource};
pub use transfer::{
    Download, DownloadStatus, PendingUpload, PendingUploadStatus, Upload, UploadStatus,
};
pub use version::{ChangeType, FileVersion, UploadMethod};
