//! Config command - View and validate TwinDrive configuration
//!
//! Provides the `twindrive config` CLI command which:
//! 1. Shows the current configuration (YAML or JSON)
//! 2. Validates the configuration file and reports errors

use std::path::Path;

use anyhow::{Context, Result};
use clap::Subcommand;
use tracing::info;

use crate::output::{get_formatter, OutputFormat};

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Display current configuration
    Show,
    /// Validate configuration file
    Validate,
}

impl ConfigCommand {
    /// Execute the config command
    pub async fn execute(&self, format: OutputFormat, config_path: &Path) -> Result<()> {
        match self {
            ConfigCommand::Show => self.execute_show(format, config_path).await,
            ConfigCommand::Validate => self.execute_validate(format, config_path).await,
        }
    }

    /// Show current configuration
    async fn execute_show(&self, format: OutputFormat, config_path: &Path) -> Result<()> {
        use twindrive_core::config::Config;

        let formatter = get_formatter(format);
        let config = Config::load_or_default(config_path);

        info!(config_path = %config_path.display(), "Showing configuration");

        if format.is_json() {
            let json = serde_json::to_value(&config)
                .context("Failed to serialize configuration to JSON")?;
            formatter.print_json(&json);
        } else {
            formatter.success(&format!("Configuration ({})", config_path.display()));
            formatter.info("");

            let yaml = serde_yaml::to_string(&config)
                .context("Failed to serialize configuration to YAML")?;
            for line in yaml.lines() {
                formatter.info(line);
            }
        }

        Ok(())
    }

    /// Validate configuration file
    async fn execute_validate(&self, format: OutputFormat, config_path: &Path) -> Result<()> {
        use twindrive_core::config::Config;

        let formatter = get_formatter(format);

        let config = match Config::load(config_path) {
            Ok(config) => config,
            Err(e) => {
                if !config_path.exists() {
                    if format.is_json() {
                        let json = serde_json::json!({
                            "valid": false,
                            "config_path": config_path.display().to_string(),
                            "errors": ["Configuration file not found."],
                        });
                        formatter.print_json(&json);
                    } else {
                        formatter.info(&format!(
                            "Configuration file not found at {}",
                            config_path.display()
                        ));
                        formatter.info("Run 'twindrive init' to create one.");
                    }
                    return Ok(());
                }

                if format.is_json() {
                    let json = serde_json::json!({
                        "valid": false,
                        "config_path": config_path.display().to_string(),
                        "errors": [format!("Failed to parse configuration: {}", e)],
                    });
                    formatter.print_json(&json);
                } else {
                    formatter.error(&format!("Failed to parse configuration: {}", e));
                    formatter.info(&format!("File: {}", config_path.display()));
                }
                return Ok(());
            }
        };

        info!(config_path = %config_path.display(), "Validating configuration");

        let errors = config.validate();

        if format.is_json() {
            let error_strings: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
            let json = serde_json::json!({
                "valid": errors.is_empty(),
                "config_path": config_path.display().to_string(),
                "errors": error_strings,
            });
            formatter.print_json(&json);
        } else if errors.is_empty() {
            formatter.success("Configuration is valid");
            formatter.info(&format!("File: {}", config_path.display()));
        } else {
            formatter.error(&format!(
                "Configuration has {} error{}:",
                errors.len(),
                if errors.len() == 1 { "" } else { "s" }
            ));
            formatter.info(&format!("File: {}", config_path.display()));
            formatter.info("");
            for error in &errors {
                formatter.info(&format!("  {} - {}", error.field, error.message));
            }
        }

        Ok(())
    }
}
