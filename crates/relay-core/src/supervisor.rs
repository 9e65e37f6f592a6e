//! Supervised spawning for fire-and-forget background work.

use std::future::Future;
use tokio::task::JoinHandle;
use tracing::{debug, error};

/// Spawn `future` and watch it.
///
/// A panic inside the task is logged under `task` instead of vanishing with
/// the task. The returned handle resolves once the watched task has ended,
/// whichever way it ended.
pub fn spawn_supervised<F>(task: &'static str, future: F) -> JoinHandle<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let handle = tokio::spawn(future);

    tokio::spawn(async move {
        if let Err(e) = handle.await {
            if e.is_panic() {
                error!(task, error = %e, "Background task panicked");
            } else {
                debug!(task, "Background task cancelled");
            }
        }
    })
}
