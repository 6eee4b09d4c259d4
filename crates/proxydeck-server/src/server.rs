//! Accept loop for the terminal bridge.

use std::sync::Arc;
use std::time::Duration;

use proxydeck_config::{ServerConfig, ShellConfig};
use proxydeck_pty::{SessionManager, SpawnOptions};
use tokio::net::TcpListener;
use tokio_tungstenite::accept_async;

use crate::connection::handle_connection;

/// Shared state handed to every connection.
#[derive(Clone)]
pub struct Bridge {
    sessions: SessionManager,
    spawn: Arc<SpawnOptions>,
    handshake_timeout: Duration,
}

impl Bridge {
    pub fn new(sessions: SessionManager, spawn: SpawnOptions, handshake_timeout: Duration) -> Self {
        Self {
            sessions,
            spawn: Arc::new(spawn),
            handshake_timeout,
        }
    }

    /// Spawn options from `[shell]`, with `extra_env` layered on top.
    pub fn from_config(
        server: &ServerConfig,
        shell: &ShellConfig,
        extra_env: &[(String, String)],
    ) -> Self {
        let spawn = extra_env
            .iter()
            .fold(SpawnOptions::from_config(shell), |opts, (k, v)| {
                opts.with_env(k.as_str(), v.as_str())
            });
        Self::new(
            SessionManager::new(),
            spawn,
            Duration::from_secs(server.handshake_timeout_secs),
        )
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    pub fn spawn_options(&self) -> &SpawnOptions {
        &self.spawn
    }

    /// Accept connections forever. Each one gets its own task and session.
    pub async fn serve(self, listener: TcpListener) {
        loop {
            match listener.accept().await {
                Ok((stream, addr)) => {
                    let bridge = self.clone();
                    tokio::spawn(async move {
                        match tokio::time::timeout(bridge.handshake_timeout, accept_async(stream))
                            .await
                        {
                            Ok(Ok(ws)) => {
                                handle_connection(ws, addr, bridge.sessions, bridge.spawn).await
                            }
                            Ok(Err(e)) => {
                                tracing::warn!(peer = %addr, error = %e, "WS handshake failed");
                            }
                            Err(_) => {
                                tracing::warn!(peer = %addr, "WS handshake timed out");
                            }
                        }
                    });
                }
                Err(e) => {
                    tracing::warn!(error = %e, "TCP accept error");
                }
            }
        }
    }
}
