//! Daemon command - Manage the TwinDrive background daemon
//!
//! Provides the `twindrive daemon` CLI command which controls the
//! daemon through its systemd user unit.

use anyhow::{Context, Result};
use clap::Subcommand;

use crate::output::{get_formatter, OutputFormat};

/// Systemd user unit name for the daemon.
const SYSTEMD_UNIT: &str = "twindrive.service";

#[derive(Debug, Subcommand)]
pub enum DaemonCommand {
    /// Start the daemon
    Start,
    /// Stop the daemon
    Stop,
    /// Show daemon status
    Status,
    /// Restart the daemon
    Restart,
}

impl DaemonCommand {
    /// Execute the daemon command
    pub async fn execute(&self, format: OutputFormat) -> Result<()> {
        match self {
            DaemonCommand::Start => self.run_action("start", "Daemon started", format),
            DaemonCommand::Stop => self.run_action("stop", "Daemon stopped", format),
            DaemonCommand::Restart => self.run_action("restart", "Daemon restarted", format),
            DaemonCommand::Status => self.execute_status(format),
        }
    }

    /// Run a start/stop/restart action against the systemd unit
    fn run_action(&self, action: &str, success_message: &str, format: OutputFormat) -> Result<()> {
        let formatter = get_formatter(format);

        let output = run_systemctl(&[action, SYSTEMD_UNIT])?;

        if output.status.success() {
            formatter.success(success_message);
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            formatter.error(&format!("Failed to {} daemon: {}", action, stderr.trim()));
            formatter.info(&format!(
                "Is the {} systemd user unit installed?",
                SYSTEMD_UNIT
            ));
        }

        Ok(())
    }

    /// Show daemon status via the systemd unit state
    fn execute_status(&self, format: OutputFormat) -> Result<()> {
        let formatter = get_formatter(format);

        let output = run_systemctl(&["status", SYSTEMD_UNIT])?;
        let stdout = String::from_utf8_lossy(&output.stdout);
        let state = parse_unit_state(&stdout);

        if format.is_json() {
            let json = serde_json::json!({
                "unit": SYSTEMD_UNIT,
                "state": state,
            });
            formatter.print_json(&json);
            return Ok(());
        }

        match state {
            "running" => formatter.success("Daemon is running"),
            "stopped" => {
                formatter.info("Daemon is not running.");
                formatter.info("Start it with 'twindrive daemon start'.");
            }
            "failed" => {
                formatter.error("Daemon is in a failed state");
                formatter.info(&format!(
                    "Inspect it with 'systemctl --user status {}'.",
                    SYSTEMD_UNIT
                ));
            }
            _ => {
                formatter.warn(&format!("Daemon state is unknown ({})", SYSTEMD_UNIT));
                formatter.info(&format!(
                    "Is the {} systemd user unit installed?",
                    SYSTEMD_UNIT
                ));
            }
        }

        Ok(())
    }
}

/// Invoke systemctl for the current user
fn run_systemctl(args: &[&str]) -> Result<std::process::Output> {
    std::process::Command::new("systemctl")
        .arg("--user")
        .args(args)
        .output()
        .context("Failed to run systemctl")
}

/// Map `systemctl status` output to a coarse unit state
fn parse_unit_state(stdout: &str) -> &'static str {
    if stdout.contains("active (running)") {
        "running"
    } else if stdout.contains("inactive (dead)") {
        "stopped"
    } else if stdout.contains("failed") {
        "failed"
    } else {
        "unknown"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_unit_state_running() {
        let stdout = "● twindrive.service - TwinDrive daemon\n   Active: active (running) since Mon";
        assert_eq!(parse_unit_state(stdout), "running");
    }

    #[test]
    fn test_parse_unit_state_stopped() {
        let stdout = "● twindrive.service - TwinDrive daemon\n   Active: inactive (dead)";
        assert_eq!(parse_unit_state(stdout), "stopped");
    }

    #[test]
    fn test_parse_unit_state_failed() {
        let stdout = "● twindrive.service - TwinDrive daemon\n   Active: failed (Result: exit-code)";
        assert_eq!(parse_unit_state(stdout), "failed");
    }

    #[test]
    fn test_parse_unit_state_unknown() {
        assert_eq!(parse_unit_state(""), "unknown");
    }
}
