//! SQLite implementation of IStateStore
//!
//! This module provides the concrete SQLite-based implementation of the
//! state store port defined in twindrive-core. It handles all domain
//! type serialization/deserialization and SQL query construction.
//!
//! ## Type Mapping
//!
//! | Domain Type              | SQL Type | Strategy                    |
//! |--------------------------|----------|-----------------------------|
//! | MappingId, VersionId,    | TEXT     | UUID string via `.to_string()` / `FromStr` |
//! | TransferId               |          |                             |
//! | OperationId              | INTEGER  | AUTOINCREMENT row id        |
//! | SyncPath                 | TEXT     | Path string via `.to_string()` / `SyncPath::new()` |
//! | RelativePath             | TEXT     | String via `.as_str()` / `RelativePath::new()` |
//! | RemoteId                 | TEXT     | String via `.as_str()` / `RemoteId::new()` |
//! | ContentHash              | TEXT     | Hex string via `.as_str()` / `ContentHash::new()` |
//! | DateTime<Utc>            | TEXT     | ISO 8601 via `to_rfc3339()` / `DateTime::parse_from_rfc3339()` |
//! | ChangeType, UploadMethod | TEXT     | `.name()` / `FromStr`       |
//! | Status enums             | TEXT     | `.name()` / `FromStr`       |
//! | SyncSettings             | TEXT     | serde_json serialization    |
//! | FileOperation metadata   | TEXT     | serde_json serialization    |

use std::collections::HashMap;
use std::path::PathBuf;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use twindrive_core::domain::{
    newtypes::{
        ContentHash, MappingId, OperationId, RelativePath, RemoteId, SyncPath, TransferId,
        VersionId,
    },
    ChangeType, Download, DownloadStatus, DriveMapping, EntryKind, FileOperation, FileVersion,
    MetadataEntry, OperationKind, PendingUpload, PendingUploadStatus, ProcessedFile, SyncSettings,
    SyncStatus, TransferSource, Upload, UploadMethod, UploadStatus,
};
use twindrive_core::ports::{IStateStore, VersionFilter};

use crate::StoreError;

/// SQLite-based implementation of the state store port
///
/// Provides persistent storage for all domain entities using SQLite.
/// All operations are performed through a connection pool for concurrency.
pub struct SqliteStateStore {
    pool: SqlitePool,
}

impl SqliteStateStore {
    /// Creates a new store instance with the given connection pool
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

// ============================================================================
// Helper functions for type conversion
// ============================================================================

/// Parse a DateTime<Utc> from an ISO 8601 string
fn parse_datetime(s: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|_| {
            // Try parsing without timezone (SQLite default format)
            chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
                .or_else(|_| chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S"))
                .map(|ndt| ndt.and_utc())
        })
        .map_err(|e| {
            StoreError::SerializationError(format!("Failed to parse datetime '{}': {}", s, e))
        })
}

/// Parse an optional DateTime<Utc> from an optional string
fn parse_optional_datetime(s: Option<String>) -> Result<Option<DateTime<Utc>>, StoreError> {
    match s {
        Some(ref val) if !val.is_empty() => parse_datetime(val).map(Some),
        _ => Ok(None),
    }
}

/// Parse a SyncPath from its stored string form
fn parse_sync_path(s: &str) -> Result<SyncPath, StoreError> {
    SyncPath::new(PathBuf::from(s))
        .map_err(|e| StoreError::SerializationError(format!("Invalid SyncPath '{}': {}", s, e)))
}

/// Parse an optional SyncPath from an optional string
fn parse_optional_sync_path(s: Option<String>) -> Result<Option<SyncPath>, StoreError> {
    match s {
        Some(ref val) if !val.is_empty() => parse_sync_path(val).map(Some),
        _ => Ok(None),
    }
}

/// Parse a stored enum value through its domain FromStr impl
fn parse_enum<T>(s: &str, what: &str) -> Result<T, StoreError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    T::from_str(s)
        .map_err(|e| StoreError::SerializationError(format!("Invalid {} '{}': {}", what, s, e)))
}

/// Parse an optional RemoteId from an optional string
fn parse_optional_remote_id(s: Option<String>) -> Result<Option<RemoteId>, StoreError> {
    match s {
        Some(ref val) if !val.is_empty() => {
            let id = RemoteId::new(val.clone()).map_err(|e| {
                StoreError::SerializationError(format!("Invalid RemoteId '{}': {}", val, e))
            })?;
            Ok(Some(id))
        }
        _ => Ok(None),
    }
}

// ============================================================================
// Row mapping functions
// ============================================================================

/// Reconstruct a DriveMapping from a database row
fn mapping_from_row(row: &SqliteRow) -> Result<DriveMapping, StoreError> {
    let id_str: String = row.get("id");
    let remote_drive_id_str: String = row.get("remote_drive_id");
    let local_folder_str: String = row.get("local_folder_path");
    let root_folder_id_str: String = row.get("root_folder_id");
    let sync_settings_str: String = row.get("sync_settings");
    let last_sync_str: Option<String> = row.get("last_sync_time");
    let created_at_str: String = row.get("created_at");

    let id = parse_enum::<MappingId>(&id_str, "MappingId")?;
    let remote_drive_id = parse_enum::<RemoteId>(&remote_drive_id_str, "RemoteId")?;
    let root_folder_id = parse_enum::<RemoteId>(&root_folder_id_str, "RemoteId")?;
    let local_folder_path = parse_sync_path(&local_folder_str)?;

    let sync_settings: SyncSettings = serde_json::from_str(&sync_settings_str).map_err(|e| {
        StoreError::SerializationError(format!("Invalid SyncSettings JSON: {}", e))
    })?;

    let last_sync_time = parse_optional_datetime(last_sync_str)?;
    let created_at = parse_datetime(&created_at_str)?;

    Ok(DriveMapping::from_parts(
        id,
        remote_drive_id,
        local_folder_path,
        root_folder_id,
        sync_settings,
        last_sync_time,
        created_at,
    ))
}

/// Reconstruct a FileVersion from a database row
fn version_from_row(row: &SqliteRow) -> Result<FileVersion, StoreError> {
    let id_str: String = row.get("id");
    let mapping_id_str: String = row.get("mapping_id");
    let content_hash_str: String = row.get("content_hash");
    let file_name: String = row.get("file_name");
    let file_path_str: String = row.get("file_path");
    let relative_path_str: String = row.get("relative_path");
    let file_size: i64 = row.get("file_size");
    let remote_data_id_str: Option<String> = row.get("remote_data_id");
    let remote_metadata_id_str: Option<String> = row.get("remote_metadata_id");
    let version: i64 = row.get("version");
    let parent_version_str: Option<String> = row.get("parent_version");
    let change_type_str: String = row.get("change_type");
    let upload_method_str: Option<String> = row.get("upload_method");
    let created_at_str: String = row.get("created_at");
    let is_latest: i64 = row.get("is_latest");

    let id = parse_enum::<VersionId>(&id_str, "VersionId")?;
    let mapping_id = parse_enum::<MappingId>(&mapping_id_str, "MappingId")?;
    let content_hash = parse_enum::<ContentHash>(&content_hash_str, "ContentHash")?;
    let file_path = parse_sync_path(&file_path_str)?;
    let relative_path = parse_enum::<RelativePath>(&relative_path_str, "RelativePath")?;
    let remote_data_id = parse_optional_remote_id(remote_data_id_str)?;
    let remote_metadata_id = parse_optional_remote_id(remote_metadata_id_str)?;
    let change_type = parse_enum::<ChangeType>(&change_type_str, "ChangeType")?;
    let created_at = parse_datetime(&created_at_str)?;

    let parent_version = match parent_version_str {
        Some(ref s) if !s.is_empty() => Some(parse_enum::<VersionId>(s, "VersionId")?),
        _ => None,
    };

    let upload_method = match upload_method_str {
        Some(ref s) if !s.is_empty() => Some(parse_enum::<UploadMethod>(s, "UploadMethod")?),
        _ => None,
    };

    Ok(FileVersion::from_parts(
        id,
        mapping_id,
        content_hash,
        file_name,
        file_path,
        relative_path,
        file_size as u64,
        remote_data_id,
        remote_metadata_id,
        version,
        parent_version,
        change_type,
        upload_method,
        created_at,
        is_latest != 0,
    ))
}

/// Reconstruct a PendingUpload from a database row
fn pending_upload_from_row(row: &SqliteRow) -> Result<PendingUpload, StoreError> {
    let id_str: String = row.get("id");
    let mapping_id_str: String = row.get("mapping_id");
    let local_path_str: String = row.get("local_path");
    let file_name: String = row.get("file_name");
    let file_size: i64 = row.get("file_size");
    let content_hash_str: String = row.get("content_hash");
    let estimated_cost: Option<f64> = row.get("estimated_cost");
    let method_str: String = row.get("recommended_method");
    let conflict_info: Option<String> = row.get("conflict_info");
    let status_str: String = row.get("status");
    let created_at_str: String = row.get("created_at");

    let id = parse_enum::<TransferId>(&id_str, "TransferId")?;
    let mapping_id = parse_enum::<MappingId>(&mapping_id_str, "MappingId")?;
    let local_path = parse_sync_path(&local_path_str)?;
    let content_hash = parse_enum::<ContentHash>(&content_hash_str, "ContentHash")?;
    let recommended_method = parse_enum::<UploadMethod>(&method_str, "UploadMethod")?;
    let status = parse_enum::<PendingUploadStatus>(&status_str, "PendingUploadStatus")?;
    let created_at = parse_datetime(&created_at_str)?;

    Ok(PendingUpload::from_parts(
        id,
        mapping_id,
        local_path,
        file_name,
        file_size as u64,
        content_hash,
        estimated_cost,
        recommended_method,
        conflict_info,
        status,
        created_at,
    ))
}

/// Reconstruct an Upload from a database row
fn upload_from_row(row: &SqliteRow) -> Result<Upload, StoreError> {
    let id_str: String = row.get("id");
    let mapping_id_str: String = row.get("mapping_id");
    let local_path_str: String = row.get("local_path");
    let file_size: i64 = row.get("file_size");
    let content_hash_str: String = row.get("content_hash");
    let method_str: String = row.get("method");
    let priority: i32 = row.get("priority");
    let status_str: String = row.get("status");
    let progress: i64 = row.get("progress");
    let remote_data_id_str: Option<String> = row.get("remote_data_id");
    let remote_metadata_id_str: Option<String> = row.get("remote_metadata_id");
    let error_message: Option<String> = row.get("error_message");
    let created_at_str: String = row.get("created_at");
    let updated_at_str: String = row.get("updated_at");

    let id = parse_enum::<TransferId>(&id_str, "TransferId")?;
    let mapping_id = parse_enum::<MappingId>(&mapping_id_str, "MappingId")?;
    let local_path = parse_sync_path(&local_path_str)?;
    let content_hash = parse_enum::<ContentHash>(&content_hash_str, "ContentHash")?;
    let method = parse_enum::<UploadMethod>(&method_str, "UploadMethod")?;
    let status = parse_enum::<UploadStatus>(&status_str, "UploadStatus")?;
    let remote_data_id = parse_optional_remote_id(remote_data_id_str)?;
    let remote_metadata_id = parse_optional_remote_id(remote_metadata_id_str)?;
    let created_at = parse_datetime(&created_at_str)?;
    let updated_at = parse_datetime(&updated_at_str)?;

    Ok(Upload::from_parts(
        id,
        mapping_id,
        local_path,
        file_size as u64,
        content_hash,
        method,
        priority,
        status,
        progress as u64,
        remote_data_id,
        remote_metadata_id,
        error_message,
        created_at,
        updated_at,
    ))
}

/// Reconstruct a Download from a database row
fn download_from_row(row: &SqliteRow) -> Result<Download, StoreError> {
    let id_str: String = row.get("id");
    let mapping_id_str: String = row.get("mapping_id");
    let remote_file_id_str: String = row.get("remote_file_id");
    let local_path_str: String = row.get("local_path");
    let file_size: Option<i64> = row.get("file_size");
    let status_str: String = row.get("status");
    let progress: i64 = row.get("progress");
    let content_hash_str: Option<String> = row.get("content_hash");
    let error_message: Option<String> = row.get("error_message");
    let created_at_str: String = row.get("created_at");
    let updated_at_str: String = row.get("updated_at");

    let id = parse_enum::<TransferId>(&id_str, "TransferId")?;
    let mapping_id = parse_enum::<MappingId>(&mapping_id_str, "MappingId")?;
    let remote_file_id = parse_enum::<RemoteId>(&remote_file_id_str, "RemoteId")?;
    let local_path = parse_sync_path(&local_path_str)?;
    let status = parse_enum::<DownloadStatus>(&status_str, "DownloadStatus")?;
    let created_at = parse_datetime(&created_at_str)?;
    let updated_at = parse_datetime(&updated_at_str)?;

    let content_hash = match content_hash_str {
        Some(ref s) if !s.is_empty() => Some(parse_enum::<ContentHash>(s, "ContentHash")?),
        _ => None,
    };

    Ok(Download::from_parts(
        id,
        mapping_id,
        remote_file_id,
        local_path,
        file_size.map(|s| s as u64),
        status,
        progress as u64,
        content_hash,
        error_message,
        created_at,
        updated_at,
    ))
}

/// Reconstruct a ProcessedFile from a database row
fn processed_from_row(row: &SqliteRow) -> Result<ProcessedFile, StoreError> {
    let content_hash_str: String = row.get("content_hash");
    let mapping_id_str: String = row.get("mapping_id");
    let file_name: String = row.get("file_name");
    let file_size: i64 = row.get("file_size");
    let local_path_str: String = row.get("local_path");
    let source_str: String = row.get("source");
    let remote_id_str: Option<String> = row.get("remote_id");
    let processed_at_str: String = row.get("processed_at");

    let content_hash = parse_enum::<ContentHash>(&content_hash_str, "ContentHash")?;
    let mapping_id = parse_enum::<MappingId>(&mapping_id_str, "MappingId")?;
    let local_path = parse_sync_path(&local_path_str)?;
    let source = parse_enum::<TransferSource>(&source_str, "TransferSource")?;
    let remote_id = parse_optional_remote_id(remote_id_str)?;
    let processed_at = parse_datetime(&processed_at_str)?;

    Ok(ProcessedFile::from_parts(
        content_hash,
        mapping_id,
        file_name,
        file_size as u64,
        local_path,
        source,
        remote_id,
        processed_at,
    ))
}

/// Reconstruct a FileOperation from a database row
fn operation_from_row(row: &SqliteRow) -> Result<FileOperation, StoreError> {
    let id: i64 = row.get("id");
    let mapping_id_str: String = row.get("mapping_id");
    let content_hash_str: String = row.get("content_hash");
    let operation_str: String = row.get("operation");
    let from_path_str: Option<String> = row.get("from_path");
    let to_path_str: Option<String> = row.get("to_path");
    let metadata_str: String = row.get("metadata");
    let timestamp_str: String = row.get("timestamp");

    let mapping_id = parse_enum::<MappingId>(&mapping_id_str, "MappingId")?;
    let content_hash = parse_enum::<ContentHash>(&content_hash_str, "ContentHash")?;
    let operation = parse_enum::<OperationKind>(&operation_str, "OperationKind")?;
    let from_path = parse_optional_sync_path(from_path_str)?;
    let to_path = parse_optional_sync_path(to_path_str)?;
    let timestamp = parse_datetime(&timestamp_str)?;

    let metadata: serde_json::Value = serde_json::from_str(&metadata_str)
        .map_err(|e| StoreError::SerializationError(format!("Invalid metadata JSON: {}", e)))?;

    Ok(FileOperation::from_parts(
        OperationId::new(id),
        mapping_id,
        content_hash,
        operation,
        from_path,
        to_path,
        metadata,
        timestamp,
    ))
}

/// Reconstruct a MetadataEntry from a database row
fn metadata_entry_from_row(row: &SqliteRow) -> Result<MetadataEntry, StoreError> {
    let mapping_id_str: String = row.get("mapping_id");
    let remote_id_str: String = row.get("remote_id");
    let parent_remote_id_str: Option<String> = row.get("parent_remote_id");
    let name: String = row.get("name");
    let path_str: String = row.get("path");
    let kind_str: String = row.get("kind");
    let size: Option<i64> = row.get("size");
    let content_hash_str: Option<String> = row.get("content_hash");
    let local_path_str: String = row.get("local_path");
    let local_file_exists: i64 = row.get("local_file_exists");
    let sync_status_str: String = row.get("sync_status");

    let mapping_id = parse_enum::<MappingId>(&mapping_id_str, "MappingId")?;
    let remote_id = parse_enum::<RemoteId>(&remote_id_str, "RemoteId")?;
    let parent_remote_id = parse_optional_remote_id(parent_remote_id_str)?;
    let path = parse_enum::<RelativePath>(&path_str, "RelativePath")?;
    let kind = parse_enum::<EntryKind>(&kind_str, "EntryKind")?;
    let local_path = parse_sync_path(&local_path_str)?;
    let sync_status = parse_enum::<SyncStatus>(&sync_status_str, "SyncStatus")?;

    let content_hash = match content_hash_str {
        Some(ref s) if !s.is_empty() => Some(parse_enum::<ContentHash>(s, "ContentHash")?),
        _ => None,
    };

    Ok(MetadataEntry::from_parts(
        mapping_id,
        remote_id,
        parent_remote_id,
        name,
        path,
        kind,
        size.map(|s| s as u64),
        content_hash,
        local_path,
        local_file_exists != 0,
        sync_status,
    ))
}

// ============================================================================
// IStateStore implementation
// ============================================================================

#[async_trait::async_trait]
impl IStateStore for SqliteStateStore {
    // --- Mapping operations ---

    async fn save_mapping(&self, mapping: &DriveMapping) -> anyhow::Result<()> {
        let id = mapping.id().to_string();
        let remote_drive_id = mapping.remote_drive_id().as_str().to_string();
        let local_folder_path = mapping.local_folder_path().to_string();
        let root_folder_id = mapping.root_folder_id().as_str().to_string();
        let sync_settings = serde_json::to_string(mapping.sync_settings())
            .map_err(|e| anyhow::anyhow!("Failed to serialize sync settings: {}", e))?;
        let last_sync_time = mapping.last_sync_time().map(|dt| dt.to_rfc3339());
        let created_at = mapping.created_at().to_rfc3339();

        sqlx::query(
            "INSERT OR REPLACE INTO drive_mappings \
             (id, remote_drive_id, local_folder_path, root_folder_id, \
              sync_settings, last_sync_time, created_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(&remote_drive_id)
        .bind(&local_folder_path)
        .bind(&root_folder_id)
        .bind(&sync_settings)
        .bind(&last_sync_time)
        .bind(&created_at)
        .execute(&self.pool)
        .await?;

        tracing::trace!(mapping_id = %id, "Saved drive mapping");
        Ok(())
    }

    async fn get_mapping(&self, id: MappingId) -> anyhow::Result<Option<DriveMapping>> {
        let id_str = id.to_string();

        let row = sqlx::query("SELECT * FROM drive_mappings WHERE id = ?")
            .bind(&id_str)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(ref r) => Ok(Some(mapping_from_row(r)?)),
            None => Ok(None),
        }
    }

    async fn list_mappings(&self) -> anyhow::Result<Vec<DriveMapping>> {
        let rows = sqlx::query("SELECT * FROM drive_mappings ORDER BY created_at ASC")
            .fetch_all(&self.pool)
            .await?;

        let mut mappings = Vec::with_capacity(rows.len());
        for row in &rows {
            mappings.push(mapping_from_row(row)?);
        }

        Ok(mappings)
    }

    // --- FileVersion operations ---

    async fn append_version(&self, version: &FileVersion) -> anyhow::Result<()> {
        if !version.is_latest() {
            anyhow::bail!("append_version requires a version marked latest");
        }

        let id = version.id().to_string();
        let mapping_id = version.mapping_id().to_string();
        let content_hash = version.content_hash().as_str().to_string();
        let file_path = version.file_path().to_string();
        let relative_path = version.relative_path().as_str().to_string();
        let file_size = version.file_size() as i64;
        let remote_data_id = version.remote_data_id().map(|r| r.as_str().to_string());
        let remote_metadata_id = version.remote_metadata_id().map(|r| r.as_str().to_string());
        let parent_version = version.parent_version().map(|p| p.to_string());
        let change_type = version.change_type().name();
        let upload_method = version.upload_method().map(|m| m.name());
        let created_at = version.created_at().to_rfc3339();

        // Supersede the old head and insert the new one atomically so
        // the per-path "exactly one latest" invariant survives crashes.
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "UPDATE file_versions SET is_latest = 0 \
             WHERE mapping_id = ? AND file_path = ? AND is_latest = 1",
        )
        .bind(&mapping_id)
        .bind(&file_path)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "INSERT INTO file_versions \
             (id, mapping_id, content_hash, file_name, file_path, relative_path, \
              file_size, remote_data_id, remote_metadata_id, version, parent_version, \
              change_type, upload_method, created_at, is_latest) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 1)",
        )
        .bind(&id)
        .bind(&mapping_id)
        .bind(&content_hash)
        .bind(version.file_name())
        .bind(&file_path)
        .bind(&relative_path)
        .bind(file_size)
        .bind(&remote_data_id)
        .bind(&remote_metadata_id)
        .bind(version.version())
        .bind(&parent_version)
        .bind(change_type)
        .bind(upload_method)
        .bind(&created_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::trace!(
            version_id = %id,
            version = version.version(),
            "Appended file version"
        );
        Ok(())
    }

    async fn update_version(&self, version: &FileVersion) -> anyhow::Result<()> {
        let id = version.id().to_string();
        let remote_data_id = version.remote_data_id().map(|r| r.as_str().to_string());
        let remote_metadata_id = version.remote_metadata_id().map(|r| r.as_str().to_string());
        let upload_method = version.upload_method().map(|m| m.name());

        sqlx::query(
            "UPDATE file_versions \
             SET remote_data_id = ?, remote_metadata_id = ?, upload_method = ? \
             WHERE id = ?",
        )
        .bind(&remote_data_id)
        .bind(&remote_metadata_id)
        .bind(upload_method)
        .bind(&id)
        .execute(&self.pool)
        .await?;

        tracing::trace!(version_id = %id, "Updated file version");
        Ok(())
    }

    async fn get_version(&self, id: VersionId) -> anyhow::Result<Option<FileVersion>> {
        let id_str = id.to_string();

        let row = sqlx::query("SELECT * FROM file_versions WHERE id = ?")
            .bind(&id_str)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(ref r) => Ok(Some(version_from_row(r)?)),
            None => Ok(None),
        }
    }

    async fn get_latest_version(
        &self,
        mapping_id: MappingId,
        path: &SyncPath,
    ) -> anyhow::Result<Option<FileVersion>> {
        let mapping_id_str = mapping_id.to_string();
        let path_str = path.to_string();

        let row = sqlx::query(
            "SELECT * FROM file_versions \
             WHERE mapping_id = ? AND file_path = ? AND is_latest = 1",
        )
        .bind(&mapping_id_str)
        .bind(&path_str)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(ref r) => Ok(Some(version_from_row(r)?)),
            None => Ok(None),
        }
    }

    async fn get_latest_versions_by_hash(
        &self,
        mapping_id: MappingId,
        hash: &ContentHash,
    ) -> anyhow::Result<Vec<FileVersion>> {
        let mapping_id_str = mapping_id.to_string();

        let rows = sqlx::query(
            "SELECT * FROM file_versions \
             WHERE mapping_id = ? AND content_hash = ? AND is_latest = 1",
        )
        .bind(&mapping_id_str)
        .bind(hash.as_str())
        .fetch_all(&self.pool)
        .await?;

        let mut versions = Vec::with_capacity(rows.len());
        for row in &rows {
            versions.push(version_from_row(row)?);
        }

        Ok(versions)
    }

    async fn query_versions(&self, filter: &VersionFilter) -> anyhow::Result<Vec<FileVersion>> {
        let mut sql = String::from("SELECT * FROM file_versions WHERE 1=1");
        let mut binds: Vec<String> = Vec::new();

        if let Some(ref mapping_id) = filter.mapping_id {
            sql.push_str(" AND mapping_id = ?");
            binds.push(mapping_id.to_string());
        }

        if let Some(ref change_type) = filter.change_type {
            sql.push_str(" AND change_type = ?");
            binds.push(change_type.name().to_string());
        }

        if let Some(ref path_prefix) = filter.path_prefix {
            sql.push_str(" AND file_path LIKE ?");
            let prefix = format!("{path_prefix}%");
            binds.push(prefix);
        }

        if filter.latest_only {
            sql.push_str(" AND is_latest = 1");
        }

        if let Some(ref created_since) = filter.created_since {
            sql.push_str(" AND created_at > ?");
            binds.push(created_since.to_rfc3339());
        }

        sql.push_str(" ORDER BY created_at ASC");

        // Build the query dynamically
        let mut query = sqlx::query(&sql);
        for bind in &binds {
            query = query.bind(bind);
        }

        let rows = query.fetch_all(&self.pool).await?;

        let mut versions = Vec::with_capacity(rows.len());
        for row in &rows {
            versions.push(version_from_row(row)?);
        }

        Ok(versions)
    }

    async fn get_version_chain(
        &self,
        mapping_id: MappingId,
        path: &SyncPath,
    ) -> anyhow::Result<Vec<FileVersion>> {
        // Walk parent links from the head so the chain survives renames
        // and moves, where older rows carry a different path.
        let mut chain = Vec::new();
        let mut current = self.get_latest_version(mapping_id, path).await?;

        while let Some(version) = current {
            let parent = version.parent_version();
            chain.push(version);
            current = match parent {
                Some(parent_id) => self.get_version(parent_id).await?,
                None => None,
            };
        }

        chain.reverse();
        Ok(chain)
    }

    // --- PendingUpload operations ---

    async fn save_pending_upload(&self, pending: &PendingUpload) -> anyhow::Result<()> {
        let id = pending.id().to_string();
        let mapping_id = pending.mapping_id().to_string();
        let local_path = pending.local_path().to_string();
        let file_size = pending.file_size() as i64;
        let content_hash = pending.content_hash().as_str().to_string();
        let created_at = pending.created_at().to_rfc3339();

        sqlx::query(
            "INSERT OR REPLACE INTO pending_uploads \
             (id, mapping_id, local_path, file_name, file_size, content_hash, \
              estimated_cost, recommended_method, conflict_info, status, created_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(&mapping_id)
        .bind(&local_path)
        .bind(pending.file_name())
        .bind(file_size)
        .bind(&content_hash)
        .bind(pending.estimated_cost())
        .bind(pending.recommended_method().name())
        .bind(pending.conflict_info())
        .bind(pending.status().name())
        .bind(&created_at)
        .execute(&self.pool)
        .await?;

        tracing::trace!(pending_id = %id, status = %pending.status(), "Saved pending upload");
        Ok(())
    }

    async fn get_pending_upload(&self, id: TransferId) -> anyhow::Result<Option<PendingUpload>> {
        let id_str = id.to_string();

        let row = sqlx::query("SELECT * FROM pending_uploads WHERE id = ?")
            .bind(&id_str)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(ref r) => Ok(Some(pending_upload_from_row(r)?)),
            None => Ok(None),
        }
    }

    async fn list_awaiting_approval(&self) -> anyhow::Result<Vec<PendingUpload>> {
        let rows = sqlx::query(
            "SELECT * FROM pending_uploads WHERE status = ? ORDER BY created_at ASC",
        )
        .bind(PendingUploadStatus::AwaitingApproval.name())
        .fetch_all(&self.pool)
        .await?;

        let mut pending = Vec::with_capacity(rows.len());
        for row in &rows {
            pending.push(pending_upload_from_row(row)?);
        }

        Ok(pending)
    }

    async fn delete_pending_upload(&self, id: TransferId) -> anyhow::Result<()> {
        let id_str = id.to_string();

        sqlx::query("DELETE FROM pending_uploads WHERE id = ?")
            .bind(&id_str)
            .execute(&self.pool)
            .await?;

        tracing::trace!(pending_id = %id_str, "Deleted pending upload");
        Ok(())
    }

    // --- Upload operations ---

    async fn save_upload(&self, upload: &Upload) -> anyhow::Result<()> {
        let id = upload.id().to_string();
        let mapping_id = upload.mapping_id().to_string();
        let local_path = upload.local_path().to_string();
        let file_size = upload.file_size() as i64;
        let content_hash = upload.content_hash().as_str().to_string();
        let progress = upload.progress() as i64;
        let remote_data_id = upload.remote_data_id().map(|r| r.as_str().to_string());
        let remote_metadata_id = upload.remote_metadata_id().map(|r| r.as_str().to_string());
        let created_at = upload.created_at().to_rfc3339();
        let updated_at = upload.updated_at().to_rfc3339();

        sqlx::query(
            "INSERT OR REPLACE INTO uploads \
             (id, mapping_id, local_path, file_size, content_hash, method, \
              priority, status, progress, remote_data_id, remote_metadata_id, \
              error_message, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(&mapping_id)
        .bind(&local_path)
        .bind(file_size)
        .bind(&content_hash)
        .bind(upload.method().name())
        .bind(upload.priority())
        .bind(upload.status().name())
        .bind(progress)
        .bind(&remote_data_id)
        .bind(&remote_metadata_id)
        .bind(upload.error_message())
        .bind(&created_at)
        .bind(&updated_at)
        .execute(&self.pool)
        .await?;

        tracing::trace!(upload_id = %id, status = %upload.status(), "Saved upload");
        Ok(())
    }

    async fn get_upload(&self, id: TransferId) -> anyhow::Result<Option<Upload>> {
        let id_str = id.to_string();

        let row = sqlx::query("SELECT * FROM uploads WHERE id = ?")
            .bind(&id_str)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(ref r) => Ok(Some(upload_from_row(r)?)),
            None => Ok(None),
        }
    }

    async fn next_queued_upload(&self, mapping_id: MappingId) -> anyhow::Result<Option<Upload>> {
        let row = sqlx::query(
            "SELECT * FROM uploads WHERE mapping_id = ? AND status = ? \
             ORDER BY priority DESC, created_at ASC LIMIT 1",
        )
        .bind(mapping_id.to_string())
        .bind(UploadStatus::Pending.name())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(ref r) => Ok(Some(upload_from_row(r)?)),
            None => Ok(None),
        }
    }

    async fn list_uploads_by_status(&self, status: UploadStatus) -> anyhow::Result<Vec<Upload>> {
        let rows = sqlx::query("SELECT * FROM uploads WHERE status = ? ORDER BY created_at ASC")
            .bind(status.name())
            .fetch_all(&self.pool)
            .await?;

        let mut uploads = Vec::with_capacity(rows.len());
        for row in &rows {
            uploads.push(upload_from_row(row)?);
        }

        Ok(uploads)
    }

    async fn count_transfers_by_status(
        &self,
        mapping_id: MappingId,
    ) -> anyhow::Result<HashMap<String, u64>> {
        let mapping_id_str = mapping_id.to_string();

        let rows = sqlx::query(
            "SELECT status, COUNT(*) as count FROM uploads \
             WHERE mapping_id = ? GROUP BY status",
        )
        .bind(&mapping_id_str)
        .fetch_all(&self.pool)
        .await?;

        let mut counts = HashMap::new();
        for row in &rows {
            let status_str: String = row.get("status");
            let count: i64 = row.get("count");

            // Round-trip through the domain enum so keys are canonical
            let status = parse_enum::<UploadStatus>(&status_str, "UploadStatus")?;
            counts.insert(status.name().to_string(), count as u64);
        }

        Ok(counts)
    }

    // --- Download operations ---

    async fn save_download(&self, download: &Download) -> anyhow::Result<()> {
        let id = download.id().to_string();
        let mapping_id = download.mapping_id().to_string();
        let remote_file_id = download.remote_file_id().as_str().to_string();
        let local_path = download.local_path().to_string();
        let file_size = download.file_size().map(|s| s as i64);
        let progress = download.progress() as i64;
        let content_hash = download.content_hash().map(|h| h.as_str().to_string());
        let created_at = download.created_at().to_rfc3339();
        let updated_at = download.updated_at().to_rfc3339();

        sqlx::query(
            "INSERT OR REPLACE INTO downloads \
             (id, mapping_id, remote_file_id, local_path, file_size, status, \
              progress, content_hash, error_message, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(&mapping_id)
        .bind(&remote_file_id)
        .bind(&local_path)
        .bind(file_size)
        .bind(download.status().name())
        .bind(progress)
        .bind(&content_hash)
        .bind(download.error_message())
        .bind(&created_at)
        .bind(&updated_at)
        .execute(&self.pool)
        .await?;

        tracing::trace!(download_id = %id, status = %download.status(), "Saved download");
        Ok(())
    }

    async fn get_download(&self, id: TransferId) -> anyhow::Result<Option<Download>> {
        let id_str = id.to_string();

        let row = sqlx::query("SELECT * FROM downloads WHERE id = ?")
            .bind(&id_str)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(ref r) => Ok(Some(download_from_row(r)?)),
            None => Ok(None),
        }
    }

    // --- Dedup ledger operations ---

    async fn record_processed(&self, entry: &ProcessedFile) -> anyhow::Result<()> {
        let content_hash = entry.content_hash().as_str().to_string();
        let mapping_id = entry.mapping_id().to_string();
        let local_path = entry.local_path().to_string();
        let file_size = entry.file_size() as i64;
        let remote_id = entry.remote_id().map(|r| r.as_str().to_string());
        let processed_at = entry.processed_at().to_rfc3339();

        sqlx::query(
            "INSERT OR REPLACE INTO processed_files \
             (content_hash, mapping_id, file_name, file_size, local_path, \
              source, remote_id, processed_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&content_hash)
        .bind(&mapping_id)
        .bind(entry.file_name())
        .bind(file_size)
        .bind(&local_path)
        .bind(entry.source().name())
        .bind(&remote_id)
        .bind(&processed_at)
        .execute(&self.pool)
        .await?;

        tracing::trace!(
            hash = entry.content_hash().short(),
            source = %entry.source(),
            "Recorded processed file"
        );
        Ok(())
    }

    async fn is_processed(
        &self,
        mapping_id: MappingId,
        hash: &ContentHash,
    ) -> anyhow::Result<bool> {
        let mapping_id_str = mapping_id.to_string();

        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM processed_files \
             WHERE mapping_id = ? AND content_hash = ?",
        )
        .bind(&mapping_id_str)
        .bind(hash.as_str())
        .fetch_one(&self.pool)
        .await?;

        Ok(count > 0)
    }

    async fn get_processed(
        &self,
        mapping_id: MappingId,
        hash: &ContentHash,
    ) -> anyhow::Result<Option<ProcessedFile>> {
        let mapping_id_str = mapping_id.to_string();

        let row = sqlx::query(
            "SELECT * FROM processed_files WHERE mapping_id = ? AND content_hash = ?",
        )
        .bind(&mapping_id_str)
        .bind(hash.as_str())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(ref r) => Ok(Some(processed_from_row(r)?)),
            None => Ok(None),
        }
    }

    // --- Audit operations ---

    async fn record_operation(&self, operation: &FileOperation) -> anyhow::Result<()> {
        let mapping_id = operation.mapping_id().to_string();
        let content_hash = operation.content_hash().as_str().to_string();
        let from_path = operation.from_path().map(|p| p.to_string());
        let to_path = operation.to_path().map(|p| p.to_string());
        let metadata = serde_json::to_string(operation.metadata())
            .map_err(|e| anyhow::anyhow!("Failed to serialize operation metadata: {}", e))?;
        let timestamp = operation.timestamp().to_rfc3339();

        sqlx::query(
            "INSERT INTO file_operations \
             (mapping_id, content_hash, operation, from_path, to_path, metadata, timestamp) \
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&mapping_id)
        .bind(&content_hash)
        .bind(operation.operation().name())
        .bind(&from_path)
        .bind(&to_path)
        .bind(&metadata)
        .bind(&timestamp)
        .execute(&self.pool)
        .await?;

        tracing::trace!(operation = %operation.operation(), "Recorded file operation");
        Ok(())
    }

    async fn get_operations_since(
        &self,
        since: DateTime<Utc>,
        limit: u32,
    ) -> anyhow::Result<Vec<FileOperation>> {
        let since_str = since.to_rfc3339();

        let rows = sqlx::query(
            "SELECT * FROM file_operations WHERE timestamp > ? \
             ORDER BY timestamp DESC LIMIT ?",
        )
        .bind(&since_str)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        let mut operations = Vec::with_capacity(rows.len());
        for row in &rows {
            operations.push(operation_from_row(row)?);
        }

        Ok(operations)
    }

    // --- Metadata cache operations ---

    async fn replace_metadata(
        &self,
        mapping_id: MappingId,
        entries: &[MetadataEntry],
    ) -> anyhow::Result<()> {
        let mapping_id_str = mapping_id.to_string();

        // Drop and re-insert the mapping's entire tree in one transaction
        // so readers never observe a half-replaced snapshot.
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM metadata_entries WHERE mapping_id = ?")
            .bind(&mapping_id_str)
            .execute(&mut *tx)
            .await?;

        for entry in entries {
            let parent_remote_id = entry.parent_remote_id().map(|r| r.as_str().to_string());
            let size = entry.size().map(|s| s as i64);
            let content_hash = entry.content_hash().map(|h| h.as_str().to_string());
            let local_path = entry.local_path().to_string();

            sqlx::query(
                "INSERT INTO metadata_entries \
                 (mapping_id, remote_id, parent_remote_id, name, path, kind, \
                  size, content_hash, local_path, local_file_exists, sync_status) \
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(&mapping_id_str)
            .bind(entry.remote_id().as_str())
            .bind(&parent_remote_id)
            .bind(entry.name())
            .bind(entry.path().as_str())
            .bind(entry.kind().name())
            .bind(size)
            .bind(&content_hash)
            .bind(&local_path)
            .bind(entry.local_file_exists() as i64)
            .bind(entry.sync_status().name())
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        tracing::trace!(
            mapping_id = %mapping_id_str,
            entries = entries.len(),
            "Replaced metadata cache"
        );
        Ok(())
    }

    async fn get_metadata_entry(
        &self,
        mapping_id: MappingId,
        remote_id: &RemoteId,
    ) -> anyhow::Result<Option<MetadataEntry>> {
        let mapping_id_str = mapping_id.to_string();

        let row = sqlx::query(
            "SELECT * FROM metadata_entries WHERE mapping_id = ? AND remote_id = ?",
        )
        .bind(&mapping_id_str)
        .bind(remote_id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(ref r) => Ok(Some(metadata_entry_from_row(r)?)),
            None => Ok(None),
        }
    }

    async fn get_metadata_by_path(
        &self,
        mapping_id: MappingId,
        path: &RelativePath,
    ) -> anyhow::Result<Option<MetadataEntry>> {
        let mapping_id_str = mapping_id.to_string();

        let row = sqlx::query("SELECT * FROM metadata_entries WHERE mapping_id = ? AND path = ?")
            .bind(&mapping_id_str)
            .bind(path.as_str())
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(ref r) => Ok(Some(metadata_entry_from_row(r)?)),
            None => Ok(None),
        }
    }

    async fn list_metadata(&self, mapping_id: MappingId) -> anyhow::Result<Vec<MetadataEntry>> {
        let mapping_id_str = mapping_id.to_string();

        let rows = sqlx::query("SELECT * FROM metadata_entries WHERE mapping_id = ? ORDER BY path ASC")
            .bind(&mapping_id_str)
            .fetch_all(&self.pool)
            .await?;

        let mut entries = Vec::with_capacity(rows.len());
        for row in &rows {
            entries.push(metadata_entry_from_row(row)?);
        }

        Ok(entries)
    }

    async fn update_metadata_entry(&self, entry: &MetadataEntry) -> anyhow::Result<()> {
        let mapping_id = entry.mapping_id().to_string();

        sqlx::query(
            "UPDATE metadata_entries SET local_file_exists = ?, sync_status = ? \
             WHERE mapping_id = ? AND remote_id = ?",
        )
        .bind(entry.local_file_exists() as i64)
        .bind(entry.sync_status().name())
        .bind(&mapping_id)
        .bind(entry.remote_id().as_str())
        .execute(&self.pool)
        .await?;

        tracing::trace!(
            remote_id = %entry.remote_id(),
            status = %entry.sync_status(),
            "Updated metadata entry"
        );
        Ok(())
    }
}
