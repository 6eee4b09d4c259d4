use serde::{Deserialize, Serialize};

/// How to reach and drive the locally managed proxy CLI.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxyConfig {
    /// Executable of the proxy CLI, resolved through `PATH`.
    pub command: String,
    pub host: String,
    /// Port the proxy listens on; also exported as `PORT` when it is started.
    pub port: u16,
    /// Sent as `x-api-key` on every probe.
    pub api_key: String,
    pub probe_timeout_ms: u64,
    /// Seconds between background health probes. 0 disables the cycle.
    pub health_interval_secs: u64,
    /// Terminal substrings that mean the proxy is accepting connections.
    pub startup_banners: Vec<String>,
    /// Type `PORT=<port> <command> start` into the shell on first connect.
    pub auto_start: bool,
    /// Command typed into the shell once after the first connect.
    pub initial_command: Option<String>,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            command: "antigravity-claude-proxy".into(),
            host: "localhost".into(),
            port: 8642,
            api_key: "test".into(),
            probe_timeout_ms: 3000,
            health_interval_secs: 30,
            startup_banners: vec![
                "Server started successfully".into(),
                "Server running at: http://localhost:".into(),
            ],
            auto_start: false,
            initial_command: None,
        }
    }
}

impl ProxyConfig {
    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }
}
