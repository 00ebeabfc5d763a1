//! Sync command - One-shot reconciliation pass
//!
//! Provides the `twindrive sync` CLI command which wires the full
//! adapter stack (store, remote, filesystem) and runs one remote-to-local
//! reconciliation pass for each configured mapping. Local change
//! detection and uploads are the daemon's job; this command is for
//! pulling remote state without a running daemon.

use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use anyhow::{Context, Result};
use clap::Args;
use tracing::info;

use crate::output::{get_formatter, OutputFormat};

/// Environment variable holding the drive API bearer token.
const TOKEN_ENV_VAR: &str = "TWINDRIVE_API_TOKEN";

#[derive(Debug, Args)]
pub struct SyncCommand {
    /// Only sync the mapping with this remote drive ID
    #[arg(long)]
    drive: Option<String>,
}

impl SyncCommand {
    /// Execute the sync command
    pub async fn execute(&self, format: OutputFormat, config_path: &Path) -> Result<()> {
        use twindrive_core::config::Config;
        use twindrive_core::ports::{ILocalFileSystem, IRemoteStorage, IStateStore};
        use twindrive_engine::{EchoGuard, Reconciler, TokioFileSystem};
        use twindrive_remote::{DriveClient, HttpRemoteStorage};
        use twindrive_store::{DatabasePool, SqliteStateStore};

        let formatter = get_formatter(format);

        let config = Config::load_or_default(config_path);
        let errors = config.validate();
        if !errors.is_empty() {
            formatter.error(&format!(
                "Configuration has {} error{}. Run 'twindrive config validate'.",
                errors.len(),
                if errors.len() == 1 { "" } else { "s" }
            ));
            return Ok(());
        }

        let selected: Vec<_> = config
            .mappings
            .iter()
            .filter(|m| match &self.drive {
                Some(drive) => &m.remote_drive_id == drive,
                None => true,
            })
            .collect();

        if selected.is_empty() {
            match &self.drive {
                Some(drive) => {
                    formatter.error(&format!("No configured mapping for drive '{}'", drive));
                }
                None => {
                    formatter.error("No drive mappings configured. Run 'twindrive init' and add mappings.");
                }
            }
            return Ok(());
        }

        let token = std::env::var(TOKEN_ENV_VAR)
            .with_context(|| format!("{} is not set", TOKEN_ENV_VAR))?;

        if let Some(parent) = config.store.database_path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create data directory")?;
        }
        let pool = DatabasePool::new(&config.store.database_path)
            .await
            .context("Failed to open database")?;
        let store: Arc<dyn IStateStore> = Arc::new(SqliteStateStore::new(pool.pool().clone()));

        let client = DriveClient::from_config(&config.remote, token)?;
        let remote: Arc<dyn IRemoteStorage> = Arc::new(HttpRemoteStorage::new(client));
        let filesystem: Arc<dyn ILocalFileSystem> = Arc::new(TokioFileSystem::new(
            Duration::from_secs(config.engine.hash_timeout_secs),
        ));
        let echo = Arc::new(EchoGuard::new(Duration::from_secs(
            config.engine.download_marker_ttl_secs,
        )));

        let reconciler = Reconciler::new(
            Arc::clone(&store),
            remote,
            Arc::clone(&filesystem),
            echo,
        );

        let started = std::time::Instant::now();
        let mut results = Vec::new();
        for mapping_config in selected {
            let mut mapping = resolve_mapping(store.as_ref(), mapping_config).await?;

            filesystem
                .create_directory(mapping.local_folder_path())
                .await
                .context("Failed to create local sync folder")?;

            info!(
                drive = %mapping.remote_drive_id(),
                folder = %mapping.local_folder_path(),
                "Reconciling mapping"
            );

            let outcome = reconciler
                .reconcile(&mapping)
                .await
                .context("Reconciliation failed")?;

            mapping.record_sync(chrono::Utc::now());
            store
                .save_mapping(&mapping)
                .await
                .context("Failed to record sync time")?;

            results.push((mapping, outcome));
        }
        let elapsed = started.elapsed();

        if format.is_json() {
            let mappings_json: Vec<serde_json::Value> = results
                .iter()
                .map(|(mapping, outcome)| {
                    serde_json::json!({
                        "remote_drive_id": mapping.remote_drive_id().as_str(),
                        "local_folder": mapping.local_folder_path().to_string(),
                        "entries_listed": outcome.entries_listed,
                        "folders_ensured": outcome.folders_ensured,
                        "files_downloaded": outcome.files_downloaded,
                        "failures": outcome.failures,
                    })
                })
                .collect();

            let json = serde_json::json!({
                "mapping_count": results.len(),
                "elapsed_secs": elapsed.as_secs_f64(),
                "mappings": mappings_json,
            });
            formatter.print_json(&json);
            return Ok(());
        }

        let total_failures: usize = results.iter().map(|(_, o)| o.failures).sum();
        if total_failures > 0 {
            formatter.warn(&format!(
                "Sync finished with {} failure{}",
                total_failures,
                if total_failures == 1 { "" } else { "s" }
            ));
        } else {
            formatter.success(&format!(
                "Synced {} mapping{} in {:.1}s",
                results.len(),
                if results.len() == 1 { "" } else { "s" },
                elapsed.as_secs_f64()
            ));
        }

        for (mapping, outcome) in &results {
            formatter.info("");
            formatter.info(&format!(
                "{} -> {}",
                mapping.remote_drive_id(),
                mapping.local_folder_path()
            ));
            formatter.info(&format!(
                "  {} entries listed, {} folders ensured, {} files downloaded, {} failures",
                outcome.entries_listed,
                outcome.folders_ensured,
                outcome.files_downloaded,
                outcome.failures
            ));
        }

        Ok(())
    }
}

/// Find the stored mapping for a config entry, creating it on first use.
///
/// Mappings are matched on (remote drive, local folder) so repeated runs
/// reuse the same mapping ID and version history.
async fn resolve_mapping(
    store: &dyn twindrive_core::ports::IStateStore,
    config: &twindrive_core::config::MappingConfig,
) -> Result<twindrive_core::domain::mapping::DriveMapping> {
    use twindrive_core::domain::mapping::{DriveMapping, SyncSettings};
    use twindrive_core::domain::newtypes::{RemoteId, SyncPath};

    let remote_drive_id = RemoteId::new(config.remote_drive_id.clone())
        .context("Invalid remote_drive_id in configuration")?;
    let local_folder = SyncPath::new(expand_tilde(&config.local_folder))
        .context("Invalid local_folder in configuration")?;
    let root_folder_id = RemoteId::new(config.root_folder_id.clone())
        .context("Invalid root_folder_id in configuration")?;

    let existing = store
        .list_mappings()
        .await
        .context("Failed to list drive mappings")?;
    if let Some(mapping) = existing.into_iter().find(|m| {
        m.remote_drive_id() == &remote_drive_id && m.local_folder_path() == &local_folder
    }) {
        return Ok(mapping);
    }

    let settings = SyncSettings {
        exclude_patterns: config.exclude_patterns.clone(),
        max_file_size: config.max_file_size_mb.map(|mb| mb * 1024 * 1024),
        sync_direction: config
            .direction
            .parse()
            .context("Invalid direction in configuration")?,
        upload_priority: config.upload_priority,
    };

    let mapping =
        DriveMapping::with_settings(remote_drive_id, local_folder, root_folder_id, settings);
    store
        .save_mapping(&mapping)
        .await
        .context("Failed to save new drive mapping")?;

    Ok(mapping)
}

/// Expand a leading `~` to the user's home directory
fn expand_tilde(path: &Path) -> PathBuf {
    let Ok(stripped) = path.strip_prefix("~") else {
        return path.to_path_buf();
    };
    match dirs::home_dir() {
        Some(home) => home.join(stripped),
        None => path.to_path_buf(),
    }
}
