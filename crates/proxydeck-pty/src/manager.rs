//! Session manager: at most one live shell per session.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use proxydeck_common::{SessionId, TermSize, TerminalError};
use tokio::sync::Mutex;

use crate::spawn::spawn_pty;
use crate::types::{PtyHandle, ShellExit, SpawnOptions, StartedSession};

// =============================================================================
// SESSION MANAGER
// =============================================================================

/// Owns every live shell, keyed by session.
///
/// Cheap to clone. The map lock is only held for map bookkeeping and quick
/// PTY calls; blocking waits on child processes run on the blocking pool
/// after the handle has been removed.
#[derive(Clone, Default)]
pub struct SessionManager {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    handles: Mutex<HashMap<SessionId, PtyHandle>>,
    next_generation: AtomicU64,
}

impl SessionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn a shell for `session` unless one is already live.
    ///
    /// Returns `Ok(None)` when the session already has a process. The map
    /// is unlocked while the PTY opens, so a concurrent start for the same
    /// session may win; the loser's shell is shut down.
    pub async fn start(
        &self,
        session: &SessionId,
        opts: &SpawnOptions,
    ) -> Result<Option<StartedSession>, TerminalError> {
        if self.is_live(session).await {
            tracing::debug!(session = %session, "start ignored, shell already live");
            return Ok(None);
        }

        let generation = self.inner.next_generation.fetch_add(1, Ordering::Relaxed) + 1;
        let opts = opts.clone();
        let (handle, events) = tokio::task::spawn_blocking(move || spawn_pty(&opts, generation))
            .await
            .map_err(|e| TerminalError::SpawnFailed(format!("spawn task failed: {e}")))??;

        let mut handles = self.inner.handles.lock().await;
        if handles.contains_key(session) {
            drop(handles);
            tracing::debug!(session = %session, generation, "lost start race, discarding shell");
            shutdown_blocking(handle).await;
            return Ok(None);
        }
        tracing::info!(session = %session, generation, pid = ?handle.pid(), "shell started");
        handles.insert(session.clone(), handle);
        Ok(Some(StartedSession { generation, events }))
    }

    /// Forward bytes to the session's shell. No-op when nothing is live.
    pub async fn write(&self, session: &SessionId, data: &[u8]) {
        let handles = self.inner.handles.lock().await;
        let Some(handle) = handles.get(session) else {
            tracing::trace!(session = %session, "input dropped, no live shell");
            return;
        };
        if let Err(e) = handle.send_input(data) {
            tracing::debug!(session = %session, error = %e, "input dropped");
        }
    }

    /// Resize the session's PTY. Never creates a process; errors are logged.
    pub async fn resize(&self, session: &SessionId, size: TermSize) {
        let mut handles = self.inner.handles.lock().await;
        let Some(handle) = handles.get_mut(session) else {
            return;
        };
        if let Err(e) = handle.resize(size) {
            tracing::warn!(session = %session, error = %e, "resize failed");
        }
    }

    /// Kill and reap the session's shell.
    ///
    /// Returns the exit code if one was collected; a second call is a no-op.
    pub async fn terminate(&self, session: &SessionId) -> Option<u32> {
        let handle = self.inner.handles.lock().await.remove(session)?;
        let generation = handle.generation();
        let code = shutdown_blocking(handle).await;
        tracing::info!(session = %session, generation, ?code, "shell terminated");
        code
    }

    /// Reap a shell that reached EOF, but only if `generation` is still the
    /// live one. A stale generation leaves the current process untouched.
    pub async fn reap(&self, session: &SessionId, generation: u64) -> Option<ShellExit> {
        let handle = {
            let mut handles = self.inner.handles.lock().await;
            if handles.get(session).map(PtyHandle::generation) != Some(generation) {
                return None;
            }
            handles.remove(session)?
        };
        let code = shutdown_blocking(handle).await;
        tracing::info!(session = %session, generation, ?code, "shell exited");
        Some(ShellExit { generation, code })
    }

    /// Kill every live shell. Used during graceful shutdown.
    pub async fn terminate_all(&self) {
        let drained: Vec<PtyHandle> = {
            let mut handles = self.inner.handles.lock().await;
            handles.drain().map(|(_, h)| h).collect()
        };
        let count = drained.len();
        for handle in drained {
            shutdown_blocking(handle).await;
        }
        tracing::info!(count, "all shells terminated");
    }

    pub async fn is_live(&self, session: &SessionId) -> bool {
        self.inner.handles.lock().await.contains_key(session)
    }

    pub async fn size(&self, session: &SessionId) -> Option<TermSize> {
        self.inner.handles.lock().await.get(session).map(|h| h.size())
    }

    pub async fn generation(&self, session: &SessionId) -> Option<u64> {
        self.inner
            .handles
            .lock()
            .await
            .get(session)
            .map(|h| h.generation())
    }

    /// Number of live shells.
    pub async fn len(&self) -> usize {
        self.inner.handles.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.handles.lock().await.is_empty()
    }
}

async fn shutdown_blocking(mut handle: PtyHandle) -> Option<u32> {
    tokio::task::spawn_blocking(move || handle.shutdown())
        .await
        .unwrap_or_else(|e| {
            tracing::warn!("shell shutdown task failed: {e}");
            None
        })
}

// =============================================================================
// TESTS
// =============================================================================
