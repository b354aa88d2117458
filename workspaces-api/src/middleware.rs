//! Principal Middleware
//!
//! The API runs behind a proxy that authenticates callers and forwards the
//! username in a trusted header. This middleware lifts that header into a
//! [`Principal`] request extension; requests without it are rejected with
//! 401 before reaching any handler.

use axum::{
    async_trait,
    extract::{FromRequestParts, Request, State},
    http::request::Parts,
    middleware::Next,
    response::Response,
};
use std::sync::Arc;

use crate::error::ApiError;

// ============================================================================
// MIDDLEWARE STATE
// ============================================================================

#[derive(Debug, Clone)]
pub struct PrincipalState {
    /// Lowercase header name holding the principal.
    pub header: Arc<str>,
}

impl PrincipalState {
    pub fn new(header: impl AsRef<str>) -> Self {
        Self {
            header: Arc::from(header.as_ref().to_ascii_lowercase()),
        }
    }
}

// ============================================================================
// MIDDLEWARE FUNCTION
// ============================================================================

/// Authenticated caller, as asserted by the fronting proxy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal(pub String);

impl Principal {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Require a non-empty principal header and inject [`Principal`].
pub async fn principal_middleware(
    State(state): State<PrincipalState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let principal = request
        .headers()
        .get(&*state.header)
        .and_then(|h| h.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string);

    let Some(principal) = principal else {
        tracing::debug!(header = %state.header, path = %request.uri().path(), "Request without principal");
        return Err(ApiError::unauthorized(format!(
            "Authentication required: missing {} header",
            state.header
        )));
    };

    request.extensions_mut().insert(Principal(principal));
    Ok(next.run(request).await)
}

// ============================================================================
// TYPED EXTRACTOR
// ============================================================================

/// Requires `principal_middleware` on the route; without it the extractor
/// fails with 500.
#[async_trait]
impl<S> FromRequestParts<S> for Principal
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts.extensions.get::<Principal>().cloned().ok_or_else(|| {
            ApiError::internal_error(
                "Principal not found in request extensions. \
                 Ensure principal_middleware is applied to this route.",
            )
        })
    }
}
