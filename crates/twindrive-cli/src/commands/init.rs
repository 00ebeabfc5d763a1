//! Init command - Write a starter configuration file
//!
//! Provides the `twindrive init` CLI command which writes a default
//! configuration to the config path (or `--config` override) and prints
//! a sample mapping snippet to get started.

use std::path::Path;

use anyhow::{Context, Result};
use clap::Args;
use tracing::info;

use crate::output::{get_formatter, OutputFormat};

#[derive(Debug, Args)]
pub struct InitCommand {
    /// Overwrite an existing configuration file
    #[arg(long)]
    force: bool,
}

impl InitCommand {
    /// Execute the init command
    pub async fn execute(&self, format: OutputFormat, config_path: &Path) -> Result<()> {
        use twindrive_core::config::Config;

        let formatter = get_formatter(format);

        if config_path.exists() && !self.force {
            formatter.error(&format!(
                "Configuration already exists at {} (use --force to overwrite)",
                config_path.display()
            ));
            return Ok(());
        }

        let config = Config::default();
        let yaml =
            serde_yaml::to_string(&config).context("Failed to serialize starter configuration")?;

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)
                .context("Failed to create configuration directory")?;
        }
        std::fs::write(config_path, &yaml).context("Failed to write configuration file")?;

        info!(config_path = %config_path.display(), "Wrote starter configuration");

        if format.is_json() {
            let json = serde_json::json!({
                "ok": true,
                "config_path": config_path.display().to_string(),
            });
            formatter.print_json(&json);
            return Ok(());
        }

        formatter.success(&format!(
            "Wrote starter configuration to {}",
            config_path.display()
        ));
        formatter.info("");
        formatter.info("Add a drive mapping to start syncing:");
        formatter.info("");
        formatter.info("mappings:");
        formatter.info("  - remote_drive_id: <drive-id>");
        formatter.info("    local_folder: ~/TwinDrive");
        formatter.info("    root_folder_id: <folder-id>");
        formatter.info("    direction: bidirectional");
        formatter.info("");
        formatter.info("Then set TWINDRIVE_API_TOKEN and run 'twindrive sync'.");

        Ok(())
    }
}
