//! Status command - Show per-mapping synchronization status
//!
//! Provides the `twindrive status` CLI command which:
//! 1. Shows latest-version counts broken down by change type per mapping
//! 2. Shows transfer queue depth and failure counts per mapping
//! 3. Optionally lists recent file operations with `--audit <N>`

use std::{path::Path, sync::Arc};

use anyhow::{Context, Result};
use chrono::{Duration, Utc};
use clap::Args;
use tracing::info;

use crate::output::{get_formatter, OutputFormat};

#[derive(Debug, Args)]
pub struct StatusCommand {
    /// Also list the N most recent file operations (last 7 days)
    #[arg(long, value_name = "N")]
    audit: Option<u32>,
}

impl StatusCommand {
    /// Execute the status command
    pub async fn execute(&self, format: OutputFormat, config_path: &Path) -> Result<()> {
        use twindrive_core::config::Config;
        use twindrive_core::domain::version::ChangeType;
        use twindrive_core::ports::state_store::{IStateStore, VersionFilter};
        use twindrive_store::{DatabasePool, SqliteStateStore};

        let formatter = get_formatter(format);

        let config = Config::load_or_default(config_path);
        let db_path = &config.store.database_path;

        if !db_path.exists() {
            formatter.error("No database found. Run 'twindrive sync' first.");
            return Ok(());
        }

        let pool = DatabasePool::new(db_path)
            .await
            .context("Failed to open database")?;
        let store: Arc<dyn IStateStore> = Arc::new(SqliteStateStore::new(pool.pool().clone()));

        let mappings = store
            .list_mappings()
            .await
            .context("Failed to list drive mappings")?;

        let awaiting = store
            .list_awaiting_approval()
            .await
            .context("Failed to list pending uploads")?;

        info!(mappings = mappings.len(), "Retrieved mapping status");

        let mut mapping_reports = Vec::new();
        for mapping in &mappings {
            let filter = VersionFilter::new()
                .with_mapping_id(mapping.id())
                .latest_only();
            let versions = store
                .query_versions(&filter)
                .await
                .context("Failed to query file versions")?;

            let mut creates = 0u64;
            let mut updates = 0u64;
            let mut renames = 0u64;
            let mut moves = 0u64;
            for version in &versions {
                match version.change_type() {
                    ChangeType::Create => creates += 1,
                    ChangeType::Update => updates += 1,
                    ChangeType::Rename => renames += 1,
                    ChangeType::Move => moves += 1,
                }
            }

            let transfers = store
                .count_transfers_by_status(mapping.id())
                .await
                .context("Failed to count transfers")?;
            let count = |status: &str| transfers.get(status).copied().unwrap_or(0);

            let awaiting_count = awaiting
                .iter()
                .filter(|p| p.mapping_id() == mapping.id())
                .count();

            mapping_reports.push(MappingReport {
                remote_drive_id: mapping.remote_drive_id().as_str().to_string(),
                local_folder: mapping.local_folder_path().to_string(),
                files: versions.len() as u64,
                creates,
                updates,
                renames,
                moves,
                pending: count("pending"),
                uploading: count("uploading"),
                failed: count("failed"),
                awaiting_approval: awaiting_count as u64,
                last_sync: mapping.last_sync_time().map(|t| t.to_rfc3339()),
            });
        }

        if format.is_json() {
            let mappings_json: Vec<serde_json::Value> = mapping_reports
                .iter()
                .map(|r| {
                    serde_json::json!({
                        "remote_drive_id": r.remote_drive_id,
                        "local_folder": r.local_folder,
                        "latest_versions": {
                            "total": r.files,
                            "create": r.creates,
                            "update": r.updates,
                            "rename": r.renames,
                            "move": r.moves,
                        },
                        "transfers": {
                            "pending": r.pending,
                            "uploading": r.uploading,
                            "failed": r.failed,
                        },
                        "awaiting_approval": r.awaiting_approval,
                        "last_sync": r.last_sync,
                    })
                })
                .collect();

            let mut json = serde_json::json!({
                "mapping_count": mapping_reports.len(),
                "mappings": mappings_json,
            });

            if let Some(limit) = self.audit {
                let operations = self.recent_operations(store.as_ref(), limit).await?;
                json["operations"] = serde_json::Value::Array(operations);
            }

            formatter.print_json(&json);
            return Ok(());
        }

        if mapping_reports.is_empty() {
            formatter.success("No drive mappings");
            formatter.info("Add mappings to the configuration and run 'twindrive sync'.");
            return Ok(());
        }

        formatter.success(&format!(
            "{} drive mapping{}",
            mapping_reports.len(),
            if mapping_reports.len() == 1 { "" } else { "s" }
        ));

        for report in &mapping_reports {
            formatter.info("");
            formatter.info(&format!(
                "{} -> {}",
                report.remote_drive_id, report.local_folder
            ));
            formatter.info(&format!(
                "  Latest versions:   {} (create {}, update {}, rename {}, move {})",
                report.files, report.creates, report.updates, report.renames, report.moves
            ));
            formatter.info(&format!(
                "  Transfers:         {} pending, {} uploading, {} failed",
                report.pending, report.uploading, report.failed
            ));
            formatter.info(&format!(
                "  Awaiting approval: {}",
                report.awaiting_approval
            ));
            match &report.last_sync {
                Some(ts) => formatter.info(&format!("  Last sync:         {}", ts)),
                None => formatter.info("  Last sync:         never"),
            }
        }

        if let Some(limit) = self.audit {
            self.print_audit(&*formatter, store.as_ref(), limit).await?;
        }

        Ok(())
    }

    /// Fetch recent operations as JSON values for the `--json` branch
    async fn recent_operations(
        &self,
        store: &dyn twindrive_core::ports::state_store::IStateStore,
        limit: u32,
    ) -> Result<Vec<serde_json::Value>> {
        let since = Utc::now() - Duration::days(AUDIT_WINDOW_DAYS);
        let operations = store
            .get_operations_since(since, limit)
            .await
            .context("Failed to query file operations")?;

        Ok(operations
            .iter()
            .map(|op| {
                serde_json::json!({
                    "timestamp": op.timestamp().to_rfc3339(),
                    "operation": op.operation().name(),
                    "from_path": op.from_path().map(|p| p.to_string()),
                    "to_path": op.to_path().map(|p| p.to_string()),
                    "content_hash": op.content_hash().as_str(),
                })
            })
            .collect())
    }

    /// Print a recent-operations table for the human branch
    async fn print_audit(
        &self,
        formatter: &dyn crate::output::OutputFormatter,
        store: &dyn twindrive_core::ports::state_store::IStateStore,
        limit: u32,
    ) -> Result<()> {
        let since = Utc::now() - Duration::days(AUDIT_WINDOW_DAYS);
        let operations = store
            .get_operations_since(since, limit)
            .await
            .context("Failed to query file operations")?;

        formatter.info("");
        if operations.is_empty() {
            formatter.info(&format!(
                "No file operations in the last {} days",
                AUDIT_WINDOW_DAYS
            ));
            return Ok(());
        }

        formatter.info(&format!(
            "Recent operations (last {} days):",
            AUDIT_WINDOW_DAYS
        ));
        formatter.info("");
        formatter.info("  Time                 Operation  Hash      Path");
        formatter.info("  -------------------- ---------- --------- ----");

        for op in &operations {
            let time = op.timestamp().format("%Y-%m-%d %H:%M:%S").to_string();
            let paths = describe_paths(
                op.from_path().map(|p| p.to_string()),
                op.to_path().map(|p| p.to_string()),
            );
            formatter.info(&format!(
                "  {:<20} {:<10} {:<9} {}",
                time,
                op.operation().name(),
                op.content_hash().short(),
                paths
            ));
        }

        Ok(())
    }
}

/// How far back `--audit` looks for operations.
const AUDIT_WINDOW_DAYS: i64 = 7;

struct MappingReport {
    remote_drive_id: String,
    local_folder: String,
    files: u64,
    creates: u64,
    updates: u64,
    renames: u64,
    moves: u64,
    pending: u64,
    uploading: u64,
    failed: u64,
    awaiting_approval: u64,
    last_sync: Option<String>,
}

/// Render an operation's from/to paths for table display
fn describe_paths(from: Option<String>, to: Option<String>) -> String {
    match (from, to) {
        (Some(from), Some(to)) => format!("{} -> {}", from, to),
        (Some(from), None) => from,
        (None, Some(to)) => to,
        (None, None) => "-".to_string(),
    }
}
