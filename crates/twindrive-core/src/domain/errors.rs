//! Domain error types
//!
//! This module defines error types specific to domain operations,
//! including validation failures, invalid state transitions, and the
//! engine-level failure taxonomy recorded on transfer rows.

use thiserror::Error;

/// Errors that can occur in domain operations
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Invalid path format or content
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// Invalid content hash format (expected SHA-256 hex)
    #[error("Invalid hash format: {0}")]
    InvalidHash(String),

    /// Invalid state transition attempt
    #[error("Invalid state transition from {from} to {to}")]
    InvalidState {
        /// The current state
        from: String,
        /// The attempted target state
        to: String,
    },

    /// Generic validation failure
    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    /// Path is not within the configured mapping root
    #[error("Path not within mapping root: {0}")]
    PathNotInMappingRoot(String),

    /// Invalid remote ID format
    #[error("Invalid remote ID: {0}")]
    InvalidRemoteId(String),

    /// ID parsing error
    #[error("Invalid ID format: {0}")]
    InvalidId(String),
}

/// Engine-level failure taxonomy
///
/// Every failure that a handler records on an Upload, Download, or
/// PendingUpload row is one of these. Handlers catch these at the
/// boundary; they never escape a watcher callback.
#[derive(Debug, Error)]
pub enum SyncError {
    /// A file is missing or unreadable
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Content hashing failed or timed out
    #[error("Hash error: {0}")]
    Hash(String),

    /// A remote listing, upload, or download failed
    #[error("Remote error: {0}")]
    Remote(String),

    /// A pending hash never resolved within the detection window
    #[error("Classification timed out for {0}")]
    ClassificationTimeout(String),

    /// The state store rejected or failed an operation
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// A domain invariant was violated
    #[error("Domain error: {0}")]
    Domain(#[from] DomainError),
}

impl SyncError {
    /// Short machine-readable category name, used in log fields and
    /// stored error messages.
    pub fn category(&self) -> &'static str {
        match self {
            SyncError::Io(_) => "io",
            SyncError::Hash(_) => "hash",
            SyncError::Remote(_) => "remote",
            SyncError::ClassificationTimeout(_) => "classification_timeout",
            SyncError::Persistence(_) => "persistence",
            SyncError::Domain(_) => "domain",
        }
    }
}
