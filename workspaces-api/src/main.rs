//! Workspaces API Server Entry Point
//!
//! Bootstraps configuration, starts the mirror sync and the visibility
//! controller against the control plane, and serves the REST boundary.

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use tokio::sync::watch;
use workspaces_api::tasks::join_logged;
use workspaces_api::telemetry::{init_tracing, LogFormat};
use workspaces_api::{create_api_router, ApiConfig, ApiError, ApiResult, AppState};
use workspaces_controller::Controller;
use workspaces_core::WorkspacesConfig;
use workspaces_storage::{run_mirror_sync, ControlPlaneClient, InMemoryControlPlane, MirrorCache};

const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> ApiResult<()> {
    init_tracing(LogFormat::from_env())?;

    let workspaces_config = WorkspacesConfig::from_env();
    workspaces_config.validate()?;
    let api_config = ApiConfig::from_env()?;
    let addr = api_config.bind_addr()?;

    let plane = Arc::new(InMemoryControlPlane::with_watch_capacity(
        workspaces_config.watch_capacity,
    ));
    let client: Arc<dyn ControlPlaneClient> = plane.clone();
    let cache = Arc::new(MirrorCache::new(workspaces_config.workspaces_namespace.clone()));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let sync = tokio::spawn(run_mirror_sync(
        Arc::clone(&cache),
        Arc::clone(&plane),
        shutdown_rx.clone(),
    ));
    let controller = Controller::new(Arc::clone(&client), Arc::clone(&plane), &workspaces_config);
    let reconcile = tokio::spawn(async move { controller.run(shutdown_rx).await });

    let sync_timeout = api_config.initial_sync_timeout;
    match tokio::time::timeout(sync_timeout, cache.wait_for_initial_sync()).await {
        Ok(()) => tracing::info!("Workspace cache synced"),
        Err(_) => tracing::warn!(
            timeout_ms = sync_timeout.as_millis() as u64,
            "Workspace cache not synced yet, serving 503 until it is"
        ),
    }

    let state = AppState::new(cache, client, api_config, workspaces_config);
    let app: Router = create_api_router(state);

    tracing::info!(%addr, "Starting workspaces API server");
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| ApiError::internal_error(format!("Failed to bind {}: {}", addr, e)))?;

    let server = axum::serve(listener, app);
    tokio::select! {
        result = server => {
            result.map_err(|e| ApiError::internal_error(format!("Server error: {}", e)))?;
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown signal received");
        }
    }

    let _ = shutdown_tx.send(true);
    let drained = tokio::time::timeout(SHUTDOWN_GRACE, async {
        join_logged("mirror sync", sync).await;
        join_logged("visibility controller", reconcile).await;
    })
    .await;
    if drained.is_err() {
        tracing::warn!("Background tasks did not stop within the grace period");
    }

    Ok(())
}
