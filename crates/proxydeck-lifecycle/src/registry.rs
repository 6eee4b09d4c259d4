//! Ownership of a proxy process started outside the terminal.

use std::process::Stdio;

use proxydeck_common::ProbeError;
use proxydeck_config::ProxyConfig;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::Mutex;

/// At most one proxy process, owned explicitly.
///
/// The child is killed when the registry is dropped.
#[derive(Debug)]
pub struct ProxyRegistry {
    program: String,
    args: Vec<String>,
    port: u16,
    child: Mutex<Option<Child>>,
}

impl ProxyRegistry {
    pub fn new(program: impl Into<String>, args: Vec<String>, port: u16) -> Self {
        Self {
            program: program.into(),
            args,
            port,
            child: Mutex::new(None),
        }
    }

    /// `<command> start` on the configured port.
    pub fn from_config(config: &ProxyConfig) -> Self {
        Self::new(config.command.clone(), vec!["start".into()], config.port)
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    fn build_command(&self) -> Command {
        #[cfg(windows)]
        let mut cmd = {
            let mut cmd = Command::new("cmd");
            cmd.arg("/C").arg(&self.program);
            cmd
        };
        #[cfg(not(windows))]
        let mut cmd = Command::new(&self.program);

        cmd.args(&self.args)
            .env("PORT", self.port.to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }

    /// Spawn the proxy. Refuses while a previous one is still running.
    ///
    /// Returns the process id.
    pub async fn start(&self) -> Result<Option<u32>, ProbeError> {
        let mut slot = self.child.lock().await;
        if let Some(child) = slot.as_mut() {
            match child.try_wait() {
                Ok(None) => return Err(ProbeError::AlreadyRunning),
                Ok(Some(status)) => {
                    tracing::info!(%status, "previous proxy process had exited");
                }
                Err(e) => tracing::debug!(error = %e, "could not poll previous proxy process"),
            }
        }

        let mut child = self
            .build_command()
            .spawn()
            .map_err(|e| ProbeError::Process(format!("failed to start {}: {e}", self.program)))?;

        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(log_lines(stdout, false));
        }
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(log_lines(stderr, true));
        }

        let pid = child.id();
        tracing::info!(program = %self.program, port = self.port, ?pid, "proxy started");
        *slot = Some(child);
        Ok(pid)
    }

    /// Kill and reap the proxy. Returns false if none was running.
    pub async fn stop(&self) -> Result<bool, ProbeError> {
        let Some(mut child) = self.child.lock().await.take() else {
            return Ok(false);
        };
        if let Ok(Some(status)) = child.try_wait() {
            tracing::info!(%status, "proxy had already exited");
            return Ok(false);
        }
        child
            .kill()
            .await
            .map_err(|e| ProbeError::Process(format!("failed to stop proxy: {e}")))?;
        tracing::info!("proxy stopped");
        Ok(true)
    }

    /// Whether the owned process is alive. Reaps it if it has exited.
    pub async fn is_running(&self) -> bool {
        let mut slot = self.child.lock().await;
        let Some(child) = slot.as_mut() else {
            return false;
        };
        match child.try_wait() {
            Ok(None) => true,
            Ok(Some(status)) => {
                tracing::info!(%status, "proxy process exited");
                *slot = None;
                false
            }
            Err(e) => {
                tracing::debug!(error = %e, "could not poll proxy process");
                false
            }
        }
    }
}

async fn log_lines<R: AsyncRead + Unpin>(reader: R, is_stderr: bool) {
    let mut lines = BufReader::new(reader).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        if is_stderr {
            tracing::warn!(target: "proxydeck_lifecycle::proxy", "{line}");
        } else {
            tracing::info!(target: "proxydeck_lifecycle::proxy", "{line}");
        }
    }
}
