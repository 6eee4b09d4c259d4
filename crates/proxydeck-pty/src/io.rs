//! PTY I/O operations: queue input, resize, kill and reap.

use portable_pty::PtySize;
use proxydeck_common::{TermSize, TerminalError};

use crate::types::PtyHandle;

// =============================================================================
// INPUT (WRITE TO PTY)
// =============================================================================

impl PtyHandle {
    /// Queue raw input bytes for the writer thread.
    ///
    /// Never blocks; bytes reach the shell in the order they were queued.
    pub fn send_input(&self, data: &[u8]) -> Result<(), TerminalError> {
        self.input_tx.send(data.to_vec()).map_err(|_| {
            TerminalError::Io(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "PTY writer thread has exited",
            ))
        })
    }
}

// =============================================================================
// RESIZE
// =============================================================================

impl PtyHandle {
    /// Resize the PTY to new dimensions.
    pub fn resize(&mut self, size: TermSize) -> Result<(), TerminalError> {
        if size.is_empty() {
            return Err(TerminalError::ResizeFailed(format!(
                "invalid terminal size {}x{}",
                size.cols, size.rows
            )));
        }
        self.master
            .resize(PtySize {
                rows: size.rows,
                cols: size.cols,
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(|e| TerminalError::ResizeFailed(e.to_string()))?;
        self.size = size;
        Ok(())
    }
}

// =============================================================================
// KILL / REAP
// =============================================================================

impl PtyHandle {
    /// Kill the child process.
    pub fn kill(&mut self) {
        if let Err(e) = self.child.kill() {
            tracing::debug!("PTY kill error (may already be dead): {e}");
        }
    }

    /// Wait for the child process to exit and return the exit code.
    pub fn wait_exit_code(&mut self) -> Option<u32> {
        let result = self.child.wait();
        self.reaped = true;
        match result {
            Ok(status) => Some(status.exit_code()),
            Err(e) => {
                tracing::debug!("PTY wait error: {e}");
                None
            }
        }
    }

    /// Collect the exit status, killing the child first if it is still
    /// running. Blocks until the child is gone.
    pub fn shutdown(&mut self) -> Option<u32> {
        if self.reaped {
            return None;
        }
        match self.child.try_wait() {
            Ok(Some(status)) => {
                self.reaped = true;
                Some(status.exit_code())
            }
            _ => {
                self.kill();
                self.wait_exit_code()
            }
        }
    }
}

impl Drop for PtyHandle {
    fn drop(&mut self) {
        if !self.reaped {
            self.shutdown();
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(all(test, unix))]
mod tests {
    use std::time::Duration;

    use tokio::sync::mpsc::UnboundedReceiver;

    use crate::spawn::spawn_pty;
    use crate::types::{PtyEvent, SpawnOptions};

    use super::*;

    fn sh() -> SpawnOptions {
        SpawnOptions::default().with_program("/bin/sh")
    }

    /// Read events until `needle` shows up in the accumulated output.
    async fn read_until(events: &mut UnboundedReceiver<PtyEvent>, needle: &str) -> String {
        let mut out = Vec::new();
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while !String::from_utf8_lossy(&out).contains(needle) {
            match tokio::time::timeout_at(deadline, events.recv()).await {
                Ok(Some(PtyEvent::Output(chunk))) => out.extend_from_slice(&chunk),
                _ => break,
            }
        }
        String::from_utf8_lossy(&out).into_owned()
    }

    #[tokio::test]
    async fn pty_write_and_read_echo() {
        let (mut handle, mut events) = spawn_pty(&sh(), 1).expect("spawn should succeed");
        handle
            .send_input(b"printf 'PTY_%s\\n' MARKER\n")
            .expect("write should succeed");

        let output = read_until(&mut events, "PTY_MARKER").await;
        assert!(
            output.contains("PTY_MARKER"),
            "output should contain marker, got: {output}"
        );
        handle.shutdown();
    }

    #[test]
    fn pty_resize_updates_size() {
        let (mut handle, _events) = spawn_pty(&sh(), 1).expect("spawn should succeed");
        handle
            .resize(TermSize::new(120, 40))
            .expect("resize should succeed");
        assert_eq!(handle.size(), TermSize::new(120, 40));
        handle.shutdown();
    }

    #[test]
    fn pty_resize_rejects_zero() {
        let (mut handle, _events) = spawn_pty(&sh(), 1).expect("spawn should succeed");
        assert!(handle.resize(TermSize::new(0, 0)).is_err());
        assert_eq!(handle.size(), TermSize::new(80, 24));
        handle.shutdown();
    }

    #[tokio::test]
    async fn kill_closes_event_stream() {
        let (mut handle, mut events) = spawn_pty(&sh(), 1).expect("spawn should succeed");
        handle.shutdown();

        let last = tokio::time::timeout(Duration::from_secs(5), async {
            let mut last = None;
            while let Some(event) = events.recv().await {
                last = Some(event);
            }
            last
        })
        .await
        .expect("reader thread should finish");
        assert_eq!(last, Some(PtyEvent::Closed));
    }

    #[test]
    fn shutdown_is_idempotent() {
        let (mut handle, _events) = spawn_pty(&sh(), 1).expect("spawn should succeed");
        handle.shutdown();
        assert!(handle.reaped);
        assert_eq!(handle.shutdown(), None);
    }

    #[tokio::test]
    async fn exit_code_is_collected_after_shell_exits() {
        let (mut handle, mut events) = spawn_pty(&sh(), 1).expect("spawn should succeed");
        handle.send_input(b"exit 3\n").unwrap();

        while let Some(event) = events.recv().await {
            if event == PtyEvent::Closed {
                break;
            }
        }
        assert_eq!(handle.shutdown(), Some(3));
    }
}
