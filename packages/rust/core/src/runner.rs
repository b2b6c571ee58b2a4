//! Task runner for fire-and-forget units of work.
//!
//! Units are spawned onto the tokio runtime and keep running when their
//! handle is dropped. Their errors are logged here and never reach a caller.

use std::future::Future;
use std::sync::Mutex;

use neurograph_shared::Result;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, error, info_span};

/// Owns the detached background units spawned by the orchestrator.
#[derive(Debug, Default)]
pub struct BackgroundRunner {
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl BackgroundRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a unit of work. A returned error is logged and absorbed.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn<F>(&self, label: &'static str, work: F)
    where
        F: Future<Output = Result<()>> + Send + 'static,
    {
        let span = info_span!("background", task = label);
        let handle = tokio::spawn(
            async move {
                match work.await {
                    Ok(()) => debug!("background task finished"),
                    Err(e) => error!(error = %e, "background task failed"),
                }
            }
            .instrument(span),
        );

        let mut tasks = self.lock();
        tasks.retain(|t| !t.is_finished());
        tasks.push(handle);
    }

    /// Queue a unit and hand its result back through the returned receiver.
    ///
    /// Dropping the receiver does not cancel the unit.
    pub fn spawn_with_result<T, F>(&self, label: &'static str, work: F) -> oneshot::Receiver<Result<T>>
    where
        T: Send + 'static,
        F: Future<Output = Result<T>> + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        self.spawn(label, async move {
            if tx.send(work.await).is_err() {
                debug!("result receiver dropped, unit ran to completion");
            }
            Ok(())
        });
        rx
    }

    /// Number of units that have not finished yet.
    pub fn in_flight(&self) -> usize {
        let mut tasks = self.lock();
        tasks.retain(|t| !t.is_finished());
        tasks.len()
    }

    /// Wait until every queued unit (including ones queued while waiting) is done.
    pub async fn wait_idle(&self) {
        loop {
            let drained = std::mem::take(&mut *self.lock());
            if drained.is_empty() {
                break;
            }
            for handle in drained {
                if let Err(e) = handle.await {
                    error!(error = %e, "background task panicked or was cancelled");
                }
            }
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<JoinHandle<()>>> {
        self.tasks.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
