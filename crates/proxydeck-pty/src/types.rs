//! PTY session types: spawn options, per-process handle, and output events.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::mpsc;

use portable_pty::{Child, MasterPty};
use proxydeck_common::TermSize;
use proxydeck_config::ShellConfig;
use tokio::sync::mpsc::UnboundedReceiver;

// =============================================================================
// CONSTANTS
// =============================================================================

/// Maximum bytes to read from a PTY in a single read (8 KB).
pub const PTY_READ_CHUNK: usize = 8_192;

/// Default terminal columns.
pub const DEFAULT_COLS: u16 = 80;

/// Default terminal rows.
pub const DEFAULT_ROWS: u16 = 24;

// =============================================================================
// SPAWN OPTIONS
// =============================================================================

/// Everything needed to launch one shell.
#[derive(Debug, Clone)]
pub struct SpawnOptions {
    /// Shell program. Empty means [`default_shell`](crate::default_shell).
    pub program: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    /// Layered over the inherited process environment.
    pub env: HashMap<String, String>,
    pub term: String,
    pub login_shell: bool,
    pub size: TermSize,
}

impl Default for SpawnOptions {
    fn default() -> Self {
        Self {
            program: String::new(),
            args: Vec::new(),
            cwd: None,
            env: HashMap::new(),
            term: "xterm-256color".into(),
            login_shell: false,
            size: TermSize::new(DEFAULT_COLS, DEFAULT_ROWS),
        }
    }
}

impl SpawnOptions {
    pub fn from_config(config: &ShellConfig) -> Self {
        Self {
            program: config.program.clone(),
            args: config.args.clone(),
            cwd: config.working_directory.as_ref().map(PathBuf::from),
            env: config.env.clone(),
            term: config.term.clone(),
            login_shell: config.login_shell,
            size: TermSize::new(config.cols, config.rows),
        }
    }

    /// Add or replace one environment override.
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }
}

// =============================================================================
// EVENTS
// =============================================================================

/// Emitted by the reader thread of one shell process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PtyEvent {
    /// One chunk of raw output, in read order.
    Output(Vec<u8>),
    /// The PTY reached EOF; the shell is gone or closed its terminal.
    Closed,
}

/// Returned by a successful `start`.
#[derive(Debug)]
pub struct StartedSession {
    /// Distinguishes successive shells of the same session.
    pub generation: u64,
    pub events: UnboundedReceiver<PtyEvent>,
}

/// Result of reaping a shell that exited on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShellExit {
    pub generation: u64,
    pub code: Option<u32>,
}

// =============================================================================
// PTY HANDLE
// =============================================================================

/// A single running shell bound to a session.
///
/// Owns the master side of the PTY pair, the sending half of the writer
/// thread's input queue, and the child process handle. Dropping the handle
/// kills and reaps the child if that has not happened yet.
pub struct PtyHandle {
    /// Ordered queue drained by the writer thread.
    pub(crate) input_tx: mpsc::Sender<Vec<u8>>,
    pub(crate) child: Box<dyn Child + Send + Sync>,
    /// Master PTY handle (for resize).
    pub(crate) master: Box<dyn MasterPty + Send>,
    pub(crate) size: TermSize,
    pub(crate) generation: u64,
    /// Set once the child has been waited on.
    pub(crate) reaped: bool,
}

impl PtyHandle {
    pub fn size(&self) -> TermSize {
        self.size
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn pid(&self) -> Option<u32> {
        self.child.process_id()
    }
}

impl std::fmt::Debug for PtyHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PtyHandle")
            .field("pid", &self.pid())
            .field("size", &self.size)
            .field("generation", &self.generation)
            .field("reaped", &self.reaped)
            .finish()
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pty_constants_are_sane() {
        assert_eq!(PTY_READ_CHUNK, 8_192);
        assert_eq!(DEFAULT_COLS, 80);
        assert_eq!(DEFAULT_ROWS, 24);
    }

    #[test]
    fn spawn_options_default_size() {
        let opts = SpawnOptions::default();
        assert_eq!(opts.size, TermSize::new(80, 24));
        assert!(opts.program.is_empty());
        assert_eq!(opts.term, "xterm-256color");
    }

    #[test]
    fn spawn_options_from_shell_config() {
        let mut config = ShellConfig {
            program: "/bin/bash".into(),
            working_directory: Some("/tmp".into()),
            cols: 132,
            rows: 50,
            ..ShellConfig::default()
        };
        config.env.insert("FOO".into(), "bar".into());

        let opts = SpawnOptions::from_config(&config);
        assert_eq!(opts.program, "/bin/bash");
        assert_eq!(opts.cwd, Some(PathBuf::from("/tmp")));
        assert_eq!(opts.size, TermSize::new(132, 50));
        assert_eq!(opts.env.get("FOO").map(String::as_str), Some("bar"));
    }

    #[test]
    fn with_env_overrides_existing_key() {
        let opts = SpawnOptions::default()
            .with_env("PORT", "8642")
            .with_env("PORT", "9000");
        assert_eq!(opts.env.len(), 1);
        assert_eq!(opts.env["PORT"], "9000");
    }
}
