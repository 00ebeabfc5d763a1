//! Pending command - List, approve, or reject pending uploads
//!
//! Provides the `twindrive pending` CLI command which:
//! 1. Lists uploads awaiting approval in a table format
//! 2. Approves a pending upload (optionally overriding the transfer method)
//!    and enqueues the resulting upload for the daemon to pick up
//! 3. Rejects a pending upload

use std::{path::Path, sync::Arc};

use anyhow::{Context, Result};
use clap::Subcommand;
use tracing::info;

use crate::output::{get_formatter, OutputFormat};

#[derive(Debug, Subcommand)]
pub enum PendingCommand {
    /// List uploads awaiting approval
    List,
    /// Approve a pending upload
    Approve {
        /// Pending upload ID (a unique prefix is enough)
        id: String,
        /// Override the transfer method: direct or chunked
        #[arg(long)]
        method: Option<String>,
    },
    /// Reject a pending upload
    Reject {
        /// Pending upload ID (a unique prefix is enough)
        id: String,
    },
}

impl PendingCommand {
    /// Execute the pending command
    pub async fn execute(&self, format: OutputFormat, config_path: &Path) -> Result<()> {
        match self {
            PendingCommand::List => self.execute_list(format, config_path).await,
            PendingCommand::Approve { id, method } => {
                self.execute_approve(id, method.as_deref(), format, config_path)
                    .await
            }
            PendingCommand::Reject { id } => self.execute_reject(id, format, config_path).await,
        }
    }

    /// Open the database and return a state store
    async fn open_database(
        &self,
        config_path: &Path,
        formatter: &dyn crate::output::OutputFormatter,
    ) -> Result<Option<Arc<dyn twindrive_core::ports::IStateStore>>> {
        use twindrive_core::config::Config;
        use twindrive_store::{DatabasePool, SqliteStateStore};

        let config = Config::load_or_default(config_path);
        let db_path = &config.store.database_path;

        if !db_path.exists() {
            formatter.error("No database found. Run 'twindrive sync' first.");
            return Ok(None);
        }

        let pool = DatabasePool::new(db_path)
            .await
            .context("Failed to open database")?;
        Ok(Some(Arc::new(SqliteStateStore::new(pool.pool().clone()))))
    }

    /// List uploads awaiting approval
    async fn execute_list(&self, format: OutputFormat, config_path: &Path) -> Result<()> {
        let formatter = get_formatter(format);

        let store = match self.open_database(config_path, &*formatter).await? {
            Some(store) => store,
            None => return Ok(()),
        };

        let pending = store
            .list_awaiting_approval()
            .await
            .context("Failed to list pending uploads")?;

        info!(count = pending.len(), "Retrieved pending uploads");

        if format.is_json() {
            let pending_json: Vec<serde_json::Value> = pending
                .iter()
                .map(|p| {
                    serde_json::json!({
                        "id": p.id().to_string(),
                        "file_name": p.file_name(),
                        "local_path": p.local_path().to_string(),
                        "file_size": p.file_size(),
                        "recommended_method": p.recommended_method().name(),
                        "estimated_cost": p.estimated_cost(),
                        "conflict": p.conflict_info(),
                        "created_at": p.created_at().to_rfc3339(),
                    })
                })
                .collect();

            let json = serde_json::json!({
                "count": pending.len(),
                "pending": pending_json,
            });
            formatter.print_json(&json);
            return Ok(());
        }

        if pending.is_empty() {
            formatter.success("No uploads awaiting approval");
            return Ok(());
        }

        formatter.success(&format!(
            "{} upload{} awaiting approval",
            pending.len(),
            if pending.len() == 1 { "" } else { "s" }
        ));
        formatter.info("");
        formatter.info("  ID (short)     File                      Size        Method   Created");
        formatter.info("  -------------- ------------------------- ----------- -------- -------------------");

        for p in &pending {
            let id_short = truncate_id(p.id().to_string(), 14);
            let name = truncate_id(p.file_name().to_string(), 25);
            let created = p.created_at().format("%Y-%m-%d %H:%M:%S").to_string();

            formatter.info(&format!(
                "  {:<14} {:<25} {:>11} {:<8} {}",
                id_short,
                name,
                format_bytes(p.file_size()),
                p.recommended_method().name(),
                created
            ));
            if let Some(conflict) = p.conflict_info() {
                formatter.info(&format!("    conflict: {}", conflict));
            }
        }

        formatter.info("");
        formatter.info("Use 'twindrive pending approve <id>' to queue an upload.");
        formatter.info("Use 'twindrive pending reject <id>' to discard one.");

        Ok(())
    }

    /// Approve a pending upload and enqueue the resulting upload
    async fn execute_approve(
        &self,
        id: &str,
        method: Option<&str>,
        format: OutputFormat,
        config_path: &Path,
    ) -> Result<()> {
        use twindrive_core::domain::transfer::Upload;
        use twindrive_core::domain::version::UploadMethod;

        let formatter = get_formatter(format);

        let method_override = match method {
            Some(value) => match value.parse::<UploadMethod>() {
                Ok(parsed) => Some(parsed),
                Err(_) => {
                    formatter.error(&format!(
                        "Unknown method: '{}'. Valid methods: direct, chunked",
                        value
                    ));
                    return Ok(());
                }
            },
            None => None,
        };

        let store = match self.open_database(config_path, &*formatter).await? {
            Some(store) => store,
            None => return Ok(()),
        };

        let mut pending = match find_pending(store.as_ref(), id).await? {
            Some(p) => p,
            None => {
                formatter.error(&format!("No pending upload found with ID: {}", id));
                formatter.info("Use 'twindrive pending list' to see pending uploads.");
                return Ok(());
            }
        };

        pending
            .approve(method_override)
            .context("Failed to approve pending upload")?;
        store
            .save_pending_upload(&pending)
            .await
            .context("Failed to save approval")?;

        let mapping = store
            .get_mapping(pending.mapping_id())
            .await
            .context("Failed to load drive mapping")?
            .context("Pending upload references an unknown mapping")?;

        let upload = Upload::new(
            pending.mapping_id(),
            pending.local_path().clone(),
            pending.file_size(),
            pending.content_hash().clone(),
            pending.recommended_method(),
            mapping.sync_settings().upload_priority,
        );
        store
            .save_upload(&upload)
            .await
            .context("Failed to enqueue upload")?;

        info!(
            pending_id = %pending.id(),
            upload_id = %upload.id(),
            method = %pending.recommended_method(),
            "Approved pending upload"
        );

        if format.is_json() {
            let json = serde_json::json!({
                "ok": true,
                "pending_id": pending.id().to_string(),
                "upload_id": upload.id().to_string(),
                "method": pending.recommended_method().name(),
            });
            formatter.print_json(&json);
        } else {
            formatter.success(&format!(
                "Approved {} ({}, {} upload)",
                pending.file_name(),
                format_bytes(pending.file_size()),
                pending.recommended_method().name()
            ));
            formatter.info("The daemon will pick up the upload on its next queue pass.");
        }

        Ok(())
    }

    /// Reject a pending upload
    async fn execute_reject(
        &self,
        id: &str,
        format: OutputFormat,
        config_path: &Path,
    ) -> Result<()> {
        let formatter = get_formatter(format);

        let store = match self.open_database(config_path, &*formatter).await? {
            Some(store) => store,
            None => return Ok(()),
        };

        let mut pending = match find_pending(store.as_ref(), id).await? {
            Some(p) => p,
            None => {
                formatter.error(&format!("No pending upload found with ID: {}", id));
                formatter.info("Use 'twindrive pending list' to see pending uploads.");
                return Ok(());
            }
        };

        pending
            .reject()
            .context("Failed to reject pending upload")?;
        store
            .save_pending_upload(&pending)
            .await
            .context("Failed to save rejection")?;

        info!(pending_id = %pending.id(), "Rejected pending upload");

        if format.is_json() {
            let json = serde_json::json!({
                "ok": true,
                "pending_id": pending.id().to_string(),
            });
            formatter.print_json(&json);
        } else {
            formatter.success(&format!("Rejected {}", pending.file_name()));
        }

        Ok(())
    }
}

/// Find an awaiting-approval upload by full ID or unique prefix
async fn find_pending(
    store: &dyn twindrive_core::ports::IStateStore,
    id: &str,
) -> Result<Option<twindrive_core::domain::transfer::PendingUpload>> {
    let pending = store
        .list_awaiting_approval()
        .await
        .context("Failed to list pending uploads")?;

    Ok(pending.into_iter().find(|p| {
        let pid = p.id().to_string();
        pid == id || pid.starts_with(id)
    }))
}

/// Truncate a string for display, showing only the first N characters
fn truncate_id(id: String, max_len: usize) -> String {
    if id.len() <= max_len {
        id
    } else {
        format!("{}...", &id[..max_len - 3])
    }
}

/// Format a byte count into a human-readable string
fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = 1024 * KB;
    const GB: u64 = 1024 * MB;

    if bytes >= GB {
        format!("{:.1} GiB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MiB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KiB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_id_short() {
        let id = "abc123".to_string();
        assert_eq!(truncate_id(id, 14), "abc123");
    }

    #[test]
    fn test_truncate_id_long() {
        let id = "550e8400-e29b-41d4-a716-446655440000".to_string();
        let result = truncate_id(id, 14);
        assert_eq!(result.len(), 14);
        assert!(result.ends_with("..."));
    }

    #[test]
    fn test_truncate_id_exact() {
        let id = "12345678901234".to_string();
        assert_eq!(truncate_id(id, 14), "12345678901234");
    }

    #[test]
    fn test_format_bytes_small() {
        assert_eq!(format_bytes(0), "0 B");
        assert_eq!(format_bytes(1023), "1023 B");
    }

    #[test]
    fn test_format_bytes_kib() {
        assert_eq!(format_bytes(1024), "1.0 KiB");
        assert_eq!(format_bytes(1536), "1.5 KiB");
    }

    #[test]
    fn test_format_bytes_mib() {
        assert_eq!(format_bytes(1048576), "1.0 MiB");
    }

    #[test]
    fn test_format_bytes_gib() {
        assert_eq!(format_bytes(1073741824), "1.0 GiB");
    }
}
