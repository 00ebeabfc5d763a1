//! TwinDrive Store - Persistent engine state
//!
//! SQLite-based storage for:
//! - Drive mappings and per-path version chains
//! - Transfer lifecycle rows (pending uploads, uploads, downloads)
//! - The dedup ledger and the audit log
//! - The remote metadata cache
//!
//! ## Architecture
//!
//! This crate implements the `IStateStore` port from `twindrive-core`
//! using SQLite as the storage backend. It is a driven (secondary)
//! adapter in the hexagonal architecture.
//!
//! ## Key Components
//!
//! - [`DatabasePool`] - Connection pool with migration support
//! - [`SqliteStateStore`] - Full `IStateStore` implementation
//! - [`StoreError`] - Error types for store operations
//!
//! ## Usage
//!
//! ```no_run
//! use std::path::Path;
//! use twindrive_store::{DatabasePool, SqliteStateStore};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let pool = DatabasePool::new(Path::new("/home/user/.local/share/twindrive/state.db")).await?;
//! let store = SqliteStateStore::new(pool.pool().clone());
//! // Use store as IStateStore...
//! # Ok(())
//! # }
//! ```

pub mod pool;
pub mod repository;

pub use pool::DatabasePool;
pub use repository::SqliteStateStore;

/// Errors that can occur during store operations
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Failed to establish a database connection
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// A database query failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Schema migration failed
    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    /// Serialization or deserialization of domain types failed
    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        StoreError::QueryFailed(e.to_string())
    }
}
