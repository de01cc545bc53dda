//! Stopping the HTTP side of the relay.
//!
//! Serve tasks register here when they start. [`ShutdownCoordinator::drain`]
//! cancels the shared token, waits for the registered tasks, and aborts the
//! stragglers.

use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Drain timeout used when the caller passes none.
const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

/// Outcome of [`ShutdownCoordinator::drain`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DrainReport {
    /// Tasks that finished on their own.
    pub completed: usize,
    /// Tasks still running at the deadline.
    pub aborted: usize,
}

/// Cancellation token plus the serve tasks watching it.
#[derive(Debug, Default)]
pub struct ShutdownCoordinator {
    token: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl ShutdownCoordinator {
    /// New coordinator with no tasks.
    pub fn new() -> Self {
        Self::default()
    }

    /// Token serve tasks stop on.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Register a task to wait for in [`drain`](Self::drain).
    ///
    /// A task registered after shutdown was signalled is aborted at once.
    pub fn track(&self, handle: JoinHandle<()>) {
        if self.token.is_cancelled() {
            handle.abort();
            return;
        }
        self.tasks.lock().push(handle);
    }

    /// Number of registered tasks not yet drained.
    pub fn tracked(&self) -> usize {
        self.tasks.lock().len()
    }

    /// Cancel the token without waiting.
    pub fn signal(&self) {
        self.token.cancel();
    }

    /// Whether shutdown has been signalled.
    pub fn is_shutting_down(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Signal shutdown and wait up to `timeout` for every registered task.
    pub async fn drain(&self, timeout: Option<Duration>) -> DrainReport {
        let timeout = timeout.unwrap_or(DEFAULT_DRAIN_TIMEOUT);
        self.signal();

        let handles = std::mem::take(&mut *self.tasks.lock());
        let total = handles.len();
        info!(
            tasks = total,
            timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            "draining server tasks"
        );

        let aborts: Vec<_> = handles.iter().map(JoinHandle::abort_handle).collect();
        if tokio::time::timeout(timeout, futures::future::join_all(handles))
            .await
            .is_ok()
        {
            return DrainReport {
                completed: total,
                aborted: 0,
            };
        }

        let mut aborted = 0;
        for handle in aborts.iter().filter(|h| !h.is_finished()) {
            handle.abort();
            aborted += 1;
        }
        warn!(aborted, "server tasks still running after {timeout:?}, aborted");
        DrainReport {
            completed: total - aborted,
            aborted,
        }
    }
}
