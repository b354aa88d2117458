//! Workspaces API - REST Boundary
//!
//! Exposes the workspace read path (served from the mirror cache and the
//! access-scoped list query) and the write path (create and update through
//! the control plane client) over HTTP. The acting principal is taken from a
//! trusted header set by the fronting proxy.

pub mod config;
pub mod error;
pub mod macros;
pub mod middleware;
pub mod routes;
pub mod state;
pub mod tasks;
pub mod telemetry;

pub use config::ApiConfig;
pub use error::{ApiError, ApiResult, ErrorCode};
pub use middleware::{principal_middleware, Principal, PrincipalState};
pub use routes::create_api_router;
pub use state::AppState;
