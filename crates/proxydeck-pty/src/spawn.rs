//! PTY spawn logic: open a PTY, launch the shell, start the I/O threads.

use std::io::{Read, Write};
use std::sync::mpsc;
use std::thread;

use portable_pty::{native_pty_system, CommandBuilder, PtySize};
use proxydeck_common::TerminalError;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

use crate::types::{PtyEvent, PtyHandle, SpawnOptions, PTY_READ_CHUNK};

// =============================================================================
// SHELL DETECTION
// =============================================================================

/// Get the default shell for this platform.
///
/// - Unix: reads `$SHELL`, falls back to `/bin/sh`
/// - Windows: `powershell.exe`
pub fn default_shell() -> String {
    #[cfg(unix)]
    {
        std::env::var("SHELL")
            .ok()
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "/bin/sh".to_string())
    }
    #[cfg(windows)]
    {
        "powershell.exe".to_string()
    }
}

/// Arguments added when the shell was auto-detected.
fn default_shell_args() -> Vec<String> {
    #[cfg(windows)]
    {
        vec!["-ExecutionPolicy".into(), "Bypass".into()]
    }
    #[cfg(not(windows))]
    {
        Vec::new()
    }
}

/// Build the `CommandBuilder` for a shell.
///
/// The full process environment is inherited, then `TERM` and the caller's
/// overrides are layered on top.
fn build_shell_command(opts: &SpawnOptions) -> (String, CommandBuilder) {
    let (shell, mut args) = if opts.program.is_empty() {
        (default_shell(), default_shell_args())
    } else {
        (opts.program.clone(), Vec::new())
    };
    args.extend(opts.args.iter().cloned());

    let mut cmd = CommandBuilder::new(&shell);

    // Login shells load .profile and friends (Unix only)
    #[cfg(unix)]
    {
        if opts.login_shell {
            cmd.arg("-l");
        }
    }
    cmd.args(&args);

    if let Some(cwd) = &opts.cwd {
        cmd.cwd(cwd);
    }

    cmd.env("TERM", &opts.term);
    for (key, value) in &opts.env {
        cmd.env(key, value);
    }

    (shell, cmd)
}

// =============================================================================
// SPAWN
// =============================================================================

/// Spawn a new shell in a fresh PTY.
///
/// Returns the handle that owns the process and the receiver for its
/// output events. The reader thread forwards every chunk as it arrives and
/// finishes with [`PtyEvent::Closed`].
pub fn spawn_pty(
    opts: &SpawnOptions,
    generation: u64,
) -> Result<(PtyHandle, UnboundedReceiver<PtyEvent>), TerminalError> {
    if opts.size.is_empty() {
        return Err(TerminalError::SpawnFailed(format!(
            "invalid terminal size {}x{}",
            opts.size.cols, opts.size.rows
        )));
    }

    let pty_system = native_pty_system();
    let pty_size = PtySize {
        rows: opts.size.rows,
        cols: opts.size.cols,
        pixel_width: 0,
        pixel_height: 0,
    };

    let pair = pty_system
        .openpty(pty_size)
        .map_err(|e| TerminalError::SpawnFailed(format!("failed to open PTY: {e}")))?;

    let (shell, cmd) = build_shell_command(opts);

    let child = pair
        .slave
        .spawn_command(cmd)
        .map_err(|e| TerminalError::SpawnFailed(format!("failed to spawn shell '{shell}': {e}")))?;

    // Only the master side is needed from here on
    drop(pair.slave);

    let writer = pair
        .master
        .take_writer()
        .map_err(|e| TerminalError::SpawnFailed(format!("failed to take PTY writer: {e}")))?;

    let reader = pair
        .master
        .try_clone_reader()
        .map_err(|e| TerminalError::SpawnFailed(format!("failed to clone PTY reader: {e}")))?;

    let (event_tx, event_rx) = unbounded_channel();
    spawn_reader_thread(reader, event_tx)?;

    let (input_tx, input_rx) = mpsc::channel::<Vec<u8>>();
    spawn_writer_thread(writer, input_rx)?;

    tracing::debug!(
        shell = %shell,
        pid = ?child.process_id(),
        generation,
        "shell spawned"
    );

    Ok((
        PtyHandle {
            input_tx,
            child,
            master: pair.master,
            size: opts.size,
            generation,
            reaped: false,
        },
        event_rx,
    ))
}

fn spawn_reader_thread(
    mut reader: Box<dyn Read + Send>,
    tx: UnboundedSender<PtyEvent>,
) -> Result<(), TerminalError> {
    thread::Builder::new()
        .name("pty-reader".to_string())
        .spawn(move || {
            let mut buf = [0u8; PTY_READ_CHUNK];
            loop {
                match reader.read(&mut buf) {
                    Ok(0) => break,
                    Ok(n) => {
                        if tx.send(PtyEvent::Output(buf[..n].to_vec())).is_err() {
                            return;
                        }
                    }
                    Err(e) => {
                        // EIO is how Linux reports a hung-up PTY
                        tracing::debug!("PTY reader error: {e}");
                        break;
                    }
                }
            }
            let _ = tx.send(PtyEvent::Closed);
        })
        .map(|_| ())
        .map_err(|e| TerminalError::SpawnFailed(format!("failed to spawn PTY reader thread: {e}")))
}

fn spawn_writer_thread(
    mut writer: Box<dyn Write + Send>,
    rx: mpsc::Receiver<Vec<u8>>,
) -> Result<(), TerminalError> {
    thread::Builder::new()
        .name("pty-writer".to_string())
        .spawn(move || {
            while let Ok(data) = rx.recv() {
                let result = writer.write_all(&data).and_then(|_| writer.flush());
                if let Err(e) = result {
                    tracing::debug!("PTY writer error: {e}");
                    break;
                }
            }
        })
        .map(|_| ())
        .map_err(|e| TerminalError::SpawnFailed(format!("failed to spawn PTY writer thread: {e}")))
}

// =============================================================================
// TESTS
// =============================================================================
