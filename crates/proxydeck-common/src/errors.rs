use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("config parse error: {0}")]
    ParseError(String),

    #[error("config validation error: {0}")]
    ValidationError(String),
}

/// Failures of the pseudo-terminal layer.
#[derive(Debug, thiserror::Error)]
pub enum TerminalError {
    #[error("PTY spawn failed: {0}")]
    SpawnFailed(String),

    #[error("PTY I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("PTY resize failed: {0}")]
    ResizeFailed(String),
}

/// Failures talking to the externally managed proxy process.
#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    #[error("proxy unreachable: {0}")]
    Unreachable(String),

    #[error("proxy returned HTTP {0}")]
    BadStatus(u16),

    #[error("proxy response malformed: {0}")]
    Malformed(String),

    #[error("proxy already running")]
    AlreadyRunning,

    #[error("proxy process error: {0}")]
    Process(String),
}

#[derive(Debug, thiserror::Error)]
pub enum ProxydeckError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Terminal(#[from] TerminalError),

    #[error(transparent)]
    Probe(#[from] ProbeError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("{0}")]
    Other(String),
}
