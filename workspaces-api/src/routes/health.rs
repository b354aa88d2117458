//! Health Check Endpoints
//!
//! - /healthz - Liveness, always `alive`
//! - /readyz - Ready once the mirror cache finished its initial sync
//!
//! No principal required for health endpoints.

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Router};
use std::sync::Arc;

use workspaces_storage::MirrorCache;

// ============================================================================
// HANDLERS
// ============================================================================

/// GET /healthz
pub async fn liveness() -> impl IntoResponse {
    (StatusCode::OK, "alive")
}

/// GET /readyz
pub async fn readiness(State(cache): State<Arc<MirrorCache>>) -> impl IntoResponse {
    if cache.is_synced() {
        (StatusCode::OK, "ready")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "caches not synced")
    }
}

// ============================================================================
// ROUTER
// ============================================================================

pub fn create_router(cache: Arc<MirrorCache>) -> Router {
    Router::new()
        .route("/healthz", get(liveness))
        .route("/readyz", get(readiness))
        .with_state(cache)
}
