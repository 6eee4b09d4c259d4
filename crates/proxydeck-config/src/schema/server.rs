use serde::{Deserialize, Serialize};

/// Listener settings for the terminal bridge.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Interface to bind. Loopback by default: the bridge hands out a shell.
    pub host: String,
    pub port: u16,
    /// Seconds to wait for the WebSocket handshake before dropping the peer.
    pub handshake_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 3000,
            handshake_timeout_secs: 10,
        }
    }
}

impl ServerConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
