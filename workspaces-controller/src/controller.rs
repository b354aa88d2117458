//! Watch dispatch loop for the visibility reconciler.
//!
//! Internal workspace events reconcile the workspace itself; access grant
//! events are mapped back to their workspace through the space label, so a
//! grant that was deleted or edited by hand is healed even though the
//! workspace did not change.
//!
//! Each resource type is consumed by its own task. Within a task, requests are
//! reconciled one at a time in event order.
//!
//! # Example
//!
//! ```ignore
//! let (shutdown_tx, shutdown_rx) = watch::channel(false);
//! let controller = Controller::new(client, source, &WorkspacesConfig::from_env());
//! let handle = tokio::spawn(async move { controller.run(shutdown_rx).await });
//!
//! // Later, trigger shutdown
//! let _ = shutdown_tx.send(true);
//! let metrics = handle.await?;
//! ```

use futures_util::StreamExt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use workspaces_core::{
    AccessGrant, InternalWorkspace, ObjectKey, Resource, ResourceKind, RetryPolicy,
    WorkspacesConfig,
};
use workspaces_storage::{ControlPlaneClient, WatchEvent, WatchSource, WatchStream};

use crate::reconciler::{ReconcileOutcome, VisibilityReconciler};

// ============================================================================
// METRICS
// ============================================================================

/// Counters for controller activity since startup.
#[derive(Debug, Default)]
pub struct ControllerMetrics {
    /// Reconcile passes that completed
    pub reconciles: AtomicU64,

    /// Grants created, updated or deleted
    pub grant_writes: AtomicU64,

    /// Passes that found nothing to change
    pub writes_skipped: AtomicU64,

    /// Retries after a transient failure
    pub transient_retries: AtomicU64,

    /// Requests dropped on a non-transient error
    pub terminal_failures: AtomicU64,

    /// Requests dropped after the retry budget ran out
    pub retries_exhausted: AtomicU64,
}

impl ControllerMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> ControllerSnapshot {
        ControllerSnapshot {
            reconciles: self.reconciles.load(Ordering::Relaxed),
            grant_writes: self.grant_writes.load(Ordering::Relaxed),
            writes_skipped: self.writes_skipped.load(Ordering::Relaxed),
            transient_retries: self.transient_retries.load(Ordering::Relaxed),
            terminal_failures: self.terminal_failures.load(Ordering::Relaxed),
            retries_exhausted: self.retries_exhausted.load(Ordering::Relaxed),
        }
    }

    fn record(&self, outcome: ReconcileOutcome) {
        self.reconciles.fetch_add(1, Ordering::Relaxed);
        if outcome.is_write() {
            self.grant_writes.fetch_add(1, Ordering::Relaxed);
        } else {
            self.writes_skipped.fetch_add(1, Ordering::Relaxed);
        }
    }
}

/// Snapshot of controller metrics at a point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControllerSnapshot {
    pub reconciles: u64,
    pub grant_writes: u64,
    pub writes_skipped: u64,
    pub transient_retries: u64,
    pub terminal_failures: u64,
    pub retries_exhausted: u64,
}

// ============================================================================
// CONTROLLER
// ============================================================================

/// Drives the [`VisibilityReconciler`] from watch events.
pub struct Controller<S> {
    reconciler: VisibilityReconciler,
    source: Arc<S>,
    retry: RetryPolicy,
    metrics: Arc<ControllerMetrics>,
}

impl<S> Clone for Controller<S> {
    fn clone(&self) -> Self {
        Self {
            reconciler: self.reconciler.clone(),
            source: Arc::clone(&self.source),
            retry: self.retry.clone(),
            metrics: Arc::clone(&self.metrics),
        }
    }
}

/// How a request left the retry loop.
enum Completion {
    Done,
    Shutdown,
}

impl<S> Controller<S>
where
    S: WatchSource<InternalWorkspace> + WatchSource<AccessGrant> + 'static,
{
    pub fn new(
        client: Arc<dyn ControlPlaneClient>,
        source: Arc<S>,
        config: &WorkspacesConfig,
    ) -> Self {
        Self {
            reconciler: VisibilityReconciler::new(client, config),
            source,
            retry: config.retry.clone(),
            metrics: Arc::new(ControllerMetrics::new()),
        }
    }

    pub fn reconciler(&self) -> &VisibilityReconciler {
        &self.reconciler
    }

    pub fn metrics(&self) -> Arc<ControllerMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Consume both watch streams until shutdown is signalled or both end.
    pub async fn run(&self, shutdown_rx: watch::Receiver<bool>) -> Arc<ControllerMetrics> {
        let workspace_stream = <S as WatchSource<InternalWorkspace>>::watch(&self.source);
        let grant_stream = <S as WatchSource<AccessGrant>>::watch(&self.source);

        info!(
            max_retries = self.retry.max_retries,
            initial_backoff_ms = self.retry.initial_backoff.as_millis() as u64,
            "Visibility controller started"
        );

        let workspaces = {
            let controller = self.clone();
            tokio::spawn(controller.dispatch(
                ResourceKind::InternalWorkspace,
                workspace_stream,
                shutdown_rx.clone(),
                |event: &WatchEvent<InternalWorkspace>| event.object().map(|ws| ws.key()),
            ))
        };
        let grants = {
            let controller = self.clone();
            let reconciler = self.reconciler.clone();
            tokio::spawn(controller.dispatch(
                ResourceKind::AccessGrant,
                grant_stream,
                shutdown_rx,
                move |event: &WatchEvent<AccessGrant>| {
                    event
                        .object()
                        .and_then(|grant| reconciler.map_grant_to_workspace(grant))
                },
            ))
        };

        for (kind, handle) in [
            (ResourceKind::InternalWorkspace, workspaces),
            (ResourceKind::AccessGrant, grants),
        ] {
            if let Err(err) = handle.await {
                error!(kind = %kind, error = %err, "Controller dispatch task failed");
            }
        }

        let snapshot = self.metrics.snapshot();
        info!(
            reconciles = snapshot.reconciles,
            grant_writes = snapshot.grant_writes,
            writes_skipped = snapshot.writes_skipped,
            transient_retries = snapshot.transient_retries,
            terminal_failures = snapshot.terminal_failures,
            retries_exhausted = snapshot.retries_exhausted,
            "Visibility controller stopped"
        );

        Arc::clone(&self.metrics)
    }

    async fn dispatch<T, M>(
        self,
        kind: ResourceKind,
        mut stream: WatchStream<T>,
        mut shutdown_rx: watch::Receiver<bool>,
        map: M,
    ) where
        T: Resource,
        M: Fn(&WatchEvent<T>) -> Option<ObjectKey> + Send + 'static,
    {
        if *shutdown_rx.borrow() {
            return;
        }

        loop {
            tokio::select! {
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        debug!(kind = %kind, "Controller dispatch shutting down");
                        break;
                    }
                }

                event = stream.next() => {
                    let Some(event) = event else {
                        warn!(kind = %kind, "Watch stream closed");
                        break;
                    };
                    let Some(key) = map(&event) else {
                        continue;
                    };
                    if let Completion::Shutdown = self.reconcile_with_retry(&key, &mut shutdown_rx).await {
                        debug!(kind = %kind, "Controller dispatch shutting down");
                        break;
                    }
                }
            }
        }
    }

    /// Reconcile `key`, backing off between attempts on failures that are not
    /// terminal.
    async fn reconcile_with_retry(
        &self,
        key: &ObjectKey,
        shutdown_rx: &mut watch::Receiver<bool>,
    ) -> Completion {
        let mut attempt = 0u32;
        loop {
            let err = match self.reconciler.reconcile(key).await {
                Ok(outcome) => {
                    self.metrics.record(outcome);
                    return Completion::Done;
                }
                Err(err) => err,
            };

            if err.is_non_transient() {
                self.metrics.terminal_failures.fetch_add(1, Ordering::Relaxed);
                error!(workspace = %key, error = %err, "Workspace cannot be reconciled");
                return Completion::Done;
            }

            if attempt >= self.retry.max_retries {
                self.metrics.retries_exhausted.fetch_add(1, Ordering::Relaxed);
                error!(workspace = %key, attempts = attempt + 1, error = %err, "Giving up on workspace");
                return Completion::Done;
            }

            let backoff = self.retry.backoff_for(attempt);
            attempt += 1;
            self.metrics.transient_retries.fetch_add(1, Ordering::Relaxed);
            warn!(
                workspace = %key,
                attempt,
                backoff_ms = backoff.as_millis() as u64,
                error = %err,
                "Reconcile failed, retrying"
            );

            tokio::select! {
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        return Completion::Shutdown;
                    }
                }
                _ = tokio::time::sleep(backoff) => {}
            }
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
