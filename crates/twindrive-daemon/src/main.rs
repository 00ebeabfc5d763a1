//! TwinDrive daemon - background synchronization service
//!
//! Composition root for the sync stack. Loads the configuration, opens
//! the state database, builds the remote client, and runs one sync
//! orchestrator per configured drive mapping on a current-thread tokio
//! runtime until SIGTERM or SIGINT.

use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use twindrive_core::config::Config;
use twindrive_core::ports::{ILocalFileSystem, IRemoteStorage, IStateStore};
use twindrive_engine::{ChannelObserver, OrchestratorSettings, SyncOrchestrator, TokioFileSystem};
use twindrive_remote::{DriveClient, HttpRemoteStorage};
use twindrive_store::{DatabasePool, SqliteStateStore};

/// Environment variable holding the drive API bearer token.
const TOKEN_ENV_VAR: &str = "TWINDRIVE_API_TOKEN";

/// Capacity of the per-mapping filesystem event channel.
const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// The daemon service, owning the shared adapters and the running
/// orchestrators.
struct DaemonService {
    config: Config,
    store: Arc<dyn IStateStore>,
    remote: Arc<dyn IRemoteStorage>,
    orchestrators: Vec<Arc<SyncOrchestrator>>,
    shutdown: CancellationToken,
}

impl DaemonService {
    /// Build the shared adapters: database pool, state store, and
    /// remote client. Orchestrators are started separately in `run`.
    async fn new(config: Config, shutdown: CancellationToken) -> Result<Self> {
        if let Some(parent) = config.store.database_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .context("Failed to create data directory")?;
        }

        let pool = DatabasePool::new(&config.store.database_path)
            .await
            .context("Failed to open database")?;
        let store: Arc<dyn IStateStore> = Arc::new(SqliteStateStore::new(pool.pool().clone()));

        let token = std::env::var(TOKEN_ENV_VAR)
            .with_context(|| format!("{} is not set", TOKEN_ENV_VAR))?;
        let client = DriveClient::from_config(&config.remote, token)?;
        let remote: Arc<dyn IRemoteStorage> = Arc::new(HttpRemoteStorage::new(client));

        info!(
            database = %config.store.database_path.display(),
            base_url = %config.remote.base_url,
            "Daemon adapters ready"
        );

        Ok(Self {
            config,
            store,
            remote,
            orchestrators: Vec::new(),
            shutdown,
        })
    }

    /// Start one orchestrator per configured mapping.
    ///
    /// Each mapping gets its own filesystem adapter and event channel;
    /// the store and remote client are shared.
    async fn start_orchestrators(&mut self) -> Result<()> {
        for mapping_config in &self.config.mappings {
            let mapping = resolve_mapping(self.store.as_ref(), mapping_config).await?;

            info!(
                drive = %mapping.remote_drive_id(),
                folder = %mapping.local_folder_path(),
                "Starting orchestrator"
            );

            let (observer, events) = ChannelObserver::channel(EVENT_CHANNEL_CAPACITY);
            let filesystem: Arc<dyn ILocalFileSystem> = Arc::new(
                TokioFileSystem::new(Duration::from_secs(self.config.engine.hash_timeout_secs))
                    .with_observer(Arc::new(observer)),
            );
            let settings = OrchestratorSettings::from_config(&self.config);

            let orchestrator = SyncOrchestrator::new(
                mapping,
                Arc::clone(&self.store),
                Arc::clone(&self.remote),
                filesystem,
                settings,
            )
            .context("Failed to build orchestrator")?;

            Arc::clone(&orchestrator)
                .start(events)
                .await
                .context("Failed to start orchestrator")?;

            self.orchestrators.push(orchestrator);
        }

        Ok(())
    }

    /// Run until shutdown is requested, then stop every orchestrator.
    async fn run(mut self) -> Result<()> {
        if self.config.mappings.is_empty() {
            warn!("No drive mappings configured; daemon is idle");
        } else {
            self.start_orchestrators().await?;
            info!(count = self.orchestrators.len(), "All orchestrators running");
        }

        self.shutdown.cancelled().await;
        info!("Shutdown requested, stopping orchestrators");

        for orchestrator in &self.orchestrators {
            if let Err(e) = orchestrator.stop() {
                error!(
                    drive = %orchestrator.mapping().remote_drive_id(),
                    error = %e,
                    "Failed to stop orchestrator"
                );
            }
        }

        Ok(())
    }
}

/// Find the stored mapping for a config entry, creating it on first use.
///
/// Mappings are matched on (remote drive, local folder) so restarts
/// reuse the same mapping ID and version history.
async fn resolve_mapping(
    store: &dyn IStateStore,
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

/// Read the configuration path from the command line.
///
/// Supports `--config <path>` and `--config=<path>`; anything else
/// falls back to the default location.
fn config_path_from_args<I: Iterator<Item = String>>(mut args: I) -> PathBuf {
    while let Some(arg) = args.next() {
        if arg == "--config" {
            if let Some(path) = args.next() {
                return PathBuf::from(path);
            }
        } else if let Some(path) = arg.strip_prefix("--config=") {
            return PathBuf::from(path);
        }
    }
    Config::default_path()
}

/// Wait for SIGTERM or SIGINT and cancel the shutdown token.
async fn shutdown_signal(token: CancellationToken) {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C"),
        _ = terminate => info!("Received SIGTERM"),
    }

    token.cancel();
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let config_path = config_path_from_args(std::env::args().skip(1));
    let config = Config::load_or_default(&config_path);

    // RUST_LOG overrides the configured level when set.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.logging.level.clone()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();

    info!(config_path = %config_path.display(), "Starting TwinDrive daemon");

    let errors = config.validate();
    if !errors.is_empty() {
        for e in &errors {
            error!(field = %e.field, message = %e.message, "Invalid configuration");
        }
        anyhow::bail!(
            "Configuration has {} error{}",
            errors.len(),
            if errors.len() == 1 { "" } else { "s" }
        );
    }

    let shutdown = CancellationToken::new();
    tokio::spawn(shutdown_signal(shutdown.clone()));

    let service = DaemonService::new(config, shutdown).await?;
    let result = service.run().await;

    match &result {
        Ok(()) => info!("Daemon stopped"),
        Err(e) => error!(error = %e, "Daemon exited with error"),
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancellation_token_starts_uncancelled() {
        let token = CancellationToken::new();
        assert!(!token.is_cancelled());
    }

    #[test]
    fn test_cancellation_token_propagates_to_child() {
        let token = CancellationToken::new();
        let child = token.child_token();
        token.cancel();
        assert!(child.is_cancelled());
    }

    #[tokio::test]
    async fn test_cancellation_token_wakes_waiters() {
        let token = CancellationToken::new();
        let waiter = token.clone();
        token.cancel();
        waiter.cancelled().await;
    }

    #[test]
    fn test_config_path_from_args_flag() {
        let args = ["--config".to_string(), "/tmp/twindrive.yaml".to_string()];
        assert_eq!(
            config_path_from_args(args.into_iter()),
            PathBuf::from("/tmp/twindrive.yaml")
        );
    }

    #[test]
    fn test_config_path_from_args_equals_form() {
        let args = ["--config=/etc/twindrive.yaml".to_string()];
        assert_eq!(
            config_path_from_args(args.into_iter()),
            PathBuf::from("/etc/twindrive.yaml")
        );
    }

    #[test]
    fn test_config_path_from_args_default() {
        let args: [String; 0] = [];
        assert_eq!(config_path_from_args(args.into_iter()), Config::default_path());
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(Config::default().validate().is_empty());
    }

    #[test]
    fn test_expand_tilde_leading() {
        let expanded = expand_tilde(Path::new("~/TwinDrive"));
        assert!(!expanded.starts_with("~"));
    }

    #[test]
    fn test_expand_tilde_absolute_unchanged() {
        assert_eq!(expand_tilde(Path::new("/srv/data")), PathBuf::from("/srv/data"));
    }
}
