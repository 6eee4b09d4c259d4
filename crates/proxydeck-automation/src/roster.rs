//! Account roster: the list of authenticated accounts known to the proxy.

use std::process::Stdio;
use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use tokio::process::Command;

use crate::error::AutomationError;

/// `  1. user@example.com` style entries printed by `accounts list`.
static ENTRY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*\d+\.\s*(.+@.+\..+)").unwrap());

static ANSI_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\x1b\[[0-9;?]*[A-Za-z]").unwrap());

/// Read-only source of the current account roster.
#[async_trait]
pub trait RosterSource: Send + Sync {
    async fn query_roster(&self) -> Result<Vec<String>, AutomationError>;
}

/// Extract account identifiers from `accounts list` output, in order.
pub fn parse_roster(output: &str) -> Vec<String> {
    let plain = ANSI_RE.replace_all(output, "");
    plain
        .lines()
        .filter_map(|line| ENTRY_RE.captures(line))
        .map(|caps| caps[1].trim().to_string())
        .collect()
}

/// Queries the roster by running `<command> accounts list`.
#[derive(Debug, Clone)]
pub struct CommandRoster {
    command: String,
    timeout: Duration,
}

impl CommandRoster {
    pub fn new(command: impl Into<String>, timeout: Duration) -> Self {
        Self {
            command: command.into(),
            timeout,
        }
    }

    fn build_command(&self) -> Command {
        // npm installs the CLI as a .cmd shim on Windows
        #[cfg(windows)]
        let mut cmd = {
            let mut cmd = Command::new("cmd");
            cmd.args(["/C", &self.command]);
            cmd
        };
        #[cfg(not(windows))]
        let mut cmd = Command::new(&self.command);

        cmd.args(["accounts", "list"])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }
}

#[async_trait]
impl RosterSource for CommandRoster {
    async fn query_roster(&self) -> Result<Vec<String>, AutomationError> {
        let output = tokio::time::timeout(self.timeout, self.build_command().output())
            .await
            .map_err(|_| {
                AutomationError::Roster(format!(
                    "`{} accounts list` timed out after {:?}",
                    self.command, self.timeout
                ))
            })?
            .map_err(|e| AutomationError::Roster(format!("failed to run {}: {e}", self.command)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(AutomationError::Roster(format!(
                "`{} accounts list` exited with {}: {}",
                self.command,
                output.status,
                stderr.trim()
            )));
        }

        let accounts = parse_roster(&String::from_utf8_lossy(&output.stdout));
        tracing::debug!(count = accounts.len(), "roster queried");
        Ok(accounts)
    }
}
