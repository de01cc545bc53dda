//! Structured scope for fire-and-forget tasks.
//!
//! Every outbound dispatch runs as its own task inside a [`TaskGroup`].
//! Finished tasks are reaped on the next spawn; [`TaskGroup::shutdown`]
//! reports the finished ones and aborts the rest.

use std::future::Future;

use parking_lot::Mutex;
use tokio::task::{JoinError, JoinSet};
use tracing::{Instrument, debug, debug_span, error};

/// Owns background tasks until they finish or the group shuts down.
#[derive(Debug, Default)]
pub struct TaskGroup {
    tasks: Mutex<JoinSet<()>>,
}

impl TaskGroup {
    /// Empty group.
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn `future` into the group. Must be called within a tokio runtime.
    pub fn spawn<F>(&self, name: &'static str, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut tasks = self.tasks.lock();
        reap(&mut tasks);
        let _ = tasks.spawn(future.instrument(debug_span!("task", name)));
    }

    /// Tasks spawned and not yet reaped.
    pub fn len(&self) -> usize {
        self.tasks.lock().len()
    }

    /// Whether no tasks are tracked.
    pub fn is_empty(&self) -> bool {
        self.tasks.lock().is_empty()
    }

    /// Surface finished tasks, abort pending ones, and wait for them to stop.
    ///
    /// Returns the number of tasks that were still pending. The group stays
    /// usable afterwards.
    pub async fn shutdown(&self) -> usize {
        let mut tasks = std::mem::take(&mut *self.tasks.lock());
        reap(&mut tasks);

        let pending = tasks.len();
        tasks.abort_all();
        while let Some(result) = tasks.join_next().await {
            match result {
                Err(err) if !err.is_cancelled() => report(&err),
                _ => {}
            }
        }

        if pending > 0 {
            debug!(pending, "aborted pending tasks");
        }
        pending
    }
}

fn reap(tasks: &mut JoinSet<()>) {
    while let Some(result) = tasks.try_join_next() {
        if let Err(err) = result {
            report(&err);
        }
    }
}

fn report(err: &JoinError) {
    if err.is_panic() {
        error!(error = %err, "background task panicked");
    } else {
        debug!(error = %err, "background task did not complete");
    }
}
