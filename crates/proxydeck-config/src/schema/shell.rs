//! Shell process configuration types.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Shell process settings.
///
/// Controls which shell each session spawns, its arguments, working
/// directory, extra environment variables and the initial pty size.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ShellConfig {
    /// Shell program path. Empty string means auto-detect per platform.
    pub program: String,
    /// Extra arguments passed to the shell.
    pub args: Vec<String>,
    /// Initial working directory. `None` means inherit from the server.
    pub working_directory: Option<String>,
    /// Variables layered over the inherited process environment.
    pub env: HashMap<String, String>,
    /// Launch as a login shell (`-l`, Unix only).
    pub login_shell: bool,
    /// Value exported as `TERM`.
    pub term: String,
    pub cols: u16,
    pub rows: u16,
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self {
            program: String::new(),
            args: Vec::new(),
            working_directory: None,
            env: HashMap::new(),
            login_shell: false,
            term: "xterm-256color".into(),
            cols: 80,
            rows: 24,
        }
    }
}
