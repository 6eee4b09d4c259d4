//! PTY session manager: one real shell per transport session.
//!
//! Uses `portable-pty` for cross-platform PTY spawning. Each session owns a
//! PTY with a background reader thread and a background writer thread.
//! Input flows from the transport → writer thread → shell. Output flows from
//! the reader thread → per-start event channel → transport.

mod io;
mod manager;
mod spawn;
mod types;

pub use manager::SessionManager;
pub use spawn::{default_shell, spawn_pty};
pub use types::{
    PtyEvent, PtyHandle, ShellExit, SpawnOptions, StartedSession, DEFAULT_COLS, DEFAULT_ROWS,
    PTY_READ_CHUNK,
};
