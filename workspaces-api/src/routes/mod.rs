//! Route assembly for the REST boundary.

pub mod health;
pub mod workspace;

use axum::{
    http::{header, HeaderName, HeaderValue, Method},
    middleware::from_fn_with_state,
    Router,
};
use std::time::Duration;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::{
    config::ApiConfig,
    middleware::{principal_middleware, PrincipalState},
    state::AppState,
};

/// Prefix of the workspaces API group.
pub const API_GROUP_PREFIX: &str = "/apis/workspaces.io/v1alpha1";

// ============================================================================
// CORS LAYER
// ============================================================================

/// Build the CORS layer from ApiConfig.
///
/// In development mode (empty origins), allows all origins.
/// Otherwise only the configured origins are allowed.
fn build_cors_layer(config: &ApiConfig) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::OPTIONS])
        .max_age(Duration::from_secs(config.cors_max_age_secs));

    if config.cors_origins.is_empty() {
        tracing::info!("CORS: Development mode - allowing all origins");
        cors.allow_origin(Any).allow_headers(Any)
    } else {
        tracing::info!(
            "CORS: allowing origins: {:?}",
            config.cors_origins
        );
        let origins: Vec<HeaderValue> = config
            .cors_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();

        let mut headers = vec![header::CONTENT_TYPE, header::ACCEPT];
        if let Ok(principal) = HeaderName::from_bytes(config.principal_header.as_bytes()) {
            headers.push(principal);
        }
        cors.allow_origin(origins).allow_headers(headers)
    }
}

// ============================================================================
// ROUTER
// ============================================================================

/// Create the complete API router.
///
/// - Workspace routes under `/apis/workspaces.io/v1alpha1` require a principal
/// - `/healthz` and `/readyz` are public
///
/// Execution order: CORS -> Trace -> principal check -> handler.
pub fn create_api_router(state: AppState) -> Router {
    let principal_state = PrincipalState::new(&state.api_config.principal_header);
    let cors = build_cors_layer(&state.api_config);

    let api_routes = workspace::create_router()
        .route_layer(from_fn_with_state(principal_state, principal_middleware))
        .with_state(state.clone());

    Router::new()
        .nest(API_GROUP_PREFIX, api_routes)
        .merge(health::create_router(state.cache.clone()))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}
