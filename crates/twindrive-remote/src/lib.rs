//! TwinDrive Remote - HTTP adapter for the drive API
//!
//! This crate implements the `IRemoteStorage` port from `twindrive-core`
//! against the TwinDrive drive API over HTTP:
//!
//! - [`client`] - Authenticated request construction ([`DriveClient`])
//! - [`upload`] - Direct and session-based (chunked) file uploads
//! - [`storage`] - The [`HttpRemoteStorage`] port implementation
//!
//! ## Design Notes
//!
//! The adapter performs no retries. The engine treats a failed transfer
//! as terminal and surfaces it on the corresponding Upload row, so a
//! request that fails here fails the whole operation.

pub mod client;
pub mod storage;
pub mod upload;

pub use client::DriveClient;
pub use storage::HttpRemoteStorage;
