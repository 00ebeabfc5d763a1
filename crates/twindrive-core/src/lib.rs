//! TwinDrive Core - Domain logic and business rules
//!
//! This crate contains the hexagonal architecture core with:
//! - **Domain entities** - `DriveMapping`, `FileVersion`, `PendingUpload`, `Upload`, `Download`, `MetadataEntry`
//! - **Port definitions** - Traits for adapters: `IRemoteStorage`, `IStateStore`, `ILocalFileSystem`
//! - **Configuration** - Typed YAML configuration with validation and a builder
//!
//! # Architecture
//!
//! This crate follows the hexagonal (ports & adapters) architecture pattern.
//! The domain module contains pure business logic with no external dependencies.
//! Ports define trait interfaces that adapter crates implement.
//! The engine crate orchestrates domain entities through port interfaces.

pub mod config;
pub mod domain;
pub mod ports;
