//! Background task joining for shutdown.

use tokio::task::JoinHandle;

/// Await `handle`, logging a panic or cancellation instead of dropping it.
pub async fn join_logged<T>(task: &'static str, handle: JoinHandle<T>) -> Option<T> {
    match handle.await {
        Ok(value) => Some(value),
        Err(err) => {
            tracing::warn!(task, error = %err, panicked = err.is_panic(), "Background task failed");
            None
        }
    }
}
