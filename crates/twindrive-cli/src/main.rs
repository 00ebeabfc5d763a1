//! TwinDrive CLI - Command-line interface for TwinDrive
//!
//! Provides commands for:
//! - Writing a starter configuration
//! - Viewing sync status and recent file operations
//! - Running a one-shot reconciliation pass
//! - Approving or rejecting pending uploads
//! - Controlling the background daemon

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;
mod output;

use commands::{
    config::ConfigCommand, daemon::DaemonCommand, init::InitCommand, pending::PendingCommand,
    status::StatusCommand, sync::SyncCommand,
};
use output::OutputFormat;
use twindrive_core::config::Config;

#[derive(Debug, Parser)]
#[command(name = "twindrive", version, about = "Two-way folder sync for content-addressed drives")]
pub struct Cli {
    /// Output in JSON format
    #[arg(long, global = true)]
    json: bool,

    /// Verbose output (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Use alternate config file
    #[arg(long, global = true)]
    config: Option<String>,

    /// Minimal output (warnings and errors only)
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Write a starter configuration file
    Init(InitCommand),
    /// Show per-mapping synchronization status
    Status(StatusCommand),
    /// Run a one-shot reconciliation pass for configured mappings
    Sync(SyncCommand),
    /// List, approve, or reject pending uploads
    #[command(subcommand)]
    Pending(PendingCommand),
    /// View and validate configuration
    #[command(subcommand)]
    Config(ConfigCommand),
    /// Manage the TwinDrive background daemon
    #[command(subcommand)]
    Daemon(DaemonCommand),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup tracing
    let filter = if cli.quiet {
        "warn"
    } else {
        match cli.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .init();

    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Human
    };

    let config_path = cli
        .config
        .map(PathBuf::from)
        .unwrap_or_else(Config::default_path);

    match cli.command {
        Commands::Init(cmd) => cmd.execute(format, &config_path).await,
        Commands::Status(cmd) => cmd.execute(format, &config_path).await,
        Commands::Sync(cmd) => cmd.execute(format, &config_path).await,
        Commands::Pending(cmd) => cmd.execute(format, &config_path).await,
        Commands::Config(cmd) => cmd.execute(format, &config_path).await,
        Commands::Daemon(cmd) => cmd.execute(format).await,
    }
}
