//! API error envelope.
//!
//! Every failed request answers with `{"code", "message", "details"}` and the
//! HTTP status bound to its [`ErrorCode`]. Domain errors from the storage and
//! core crates convert through `From<WorkspacesError>`.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::fmt;

use workspaces_core::{StorageError, WorkspacesError};

// ============================================================================
// ERROR CODES
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// No principal header on a protected route
    MissingPrincipal,
    /// Principal writing outside its own namespace
    NamespaceForbidden,
    /// Body failed validation or mapping
    InvalidWorkspace,
    /// Required body field absent
    MissingField,
    WorkspaceNotFound,
    AlreadyExists,
    /// Write carried a stale resource version
    StaleResourceVersion,
    UpstreamUnavailable,
    UpstreamTimeout,
    /// Mirror cache has not finished its initial sync
    CacheNotSynced,
    Internal,
}

impl ErrorCode {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ErrorCode::MissingPrincipal => StatusCode::UNAUTHORIZED,
            ErrorCode::NamespaceForbidden => StatusCode::FORBIDDEN,
            ErrorCode::InvalidWorkspace | ErrorCode::MissingField => StatusCode::BAD_REQUEST,
            ErrorCode::WorkspaceNotFound => StatusCode::NOT_FOUND,
            ErrorCode::AlreadyExists | ErrorCode::StaleResourceVersion => StatusCode::CONFLICT,
            ErrorCode::UpstreamUnavailable | ErrorCode::CacheNotSynced => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            ErrorCode::UpstreamTimeout => StatusCode::GATEWAY_TIMEOUT,
            ErrorCode::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message used when the real cause must not leak to the caller.
    pub fn default_message(&self) -> &'static str {
        match self {
            ErrorCode::MissingPrincipal => "No authenticated principal on request",
            ErrorCode::NamespaceForbidden => "Namespace belongs to another user",
            ErrorCode::InvalidWorkspace => "Workspace is invalid",
            ErrorCode::MissingField => "Workspace is missing a required field",
            ErrorCode::WorkspaceNotFound => "Workspace does not exist",
            ErrorCode::AlreadyExists => "Workspace already exists",
            ErrorCode::StaleResourceVersion => "Workspace was modified concurrently",
            ErrorCode::UpstreamUnavailable => "Control plane unavailable",
            ErrorCode::UpstreamTimeout => "Control plane did not answer in time",
            ErrorCode::CacheNotSynced => "Workspace cache is still syncing",
            ErrorCode::Internal => "Internal server error",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

// ============================================================================
// API ERROR
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiError {
    pub code: ErrorCode,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        ApiError {
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn from_code(code: ErrorCode) -> Self {
        ApiError::new(code, code.default_message())
    }

    /// Attach structured context, e.g. the offending namespace.
    pub fn with_details(self, details: serde_json::Value) -> Self {
        ApiError {
            details: Some(details),
            ..self
        }
    }

    pub fn status_code(&self) -> StatusCode {
        self.code.status_code()
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        ApiError::new(ErrorCode::MissingPrincipal, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        ApiError::new(ErrorCode::NamespaceForbidden, message)
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        ApiError::new(ErrorCode::InvalidWorkspace, message)
    }

    pub fn missing_field(field: &str) -> Self {
        ApiError::new(ErrorCode::MissingField, format!("Field '{}' must be set", field))
    }

    pub fn workspace_not_found(key: impl fmt::Display) -> Self {
        ApiError::new(ErrorCode::WorkspaceNotFound, format!("Workspace {} not found", key))
    }

    pub fn already_exists(key: impl fmt::Display) -> Self {
        ApiError::new(ErrorCode::AlreadyExists, format!("Workspace {} already exists", key))
    }

    pub fn cache_not_synced() -> Self {
        ApiError::from_code(ErrorCode::CacheNotSynced)
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        ApiError::new(ErrorCode::Internal, message)
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for ApiError {}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status_code(), Json(self)).into_response()
    }
}

// ============================================================================
// DOMAIN ERROR MAPPING
// ============================================================================

fn code_for(err: &WorkspacesError) -> ErrorCode {
    match err {
        WorkspacesError::Storage(StorageError::NotFound { .. }) => ErrorCode::WorkspaceNotFound,
        WorkspacesError::Storage(StorageError::AlreadyExists { .. }) => ErrorCode::AlreadyExists,
        WorkspacesError::Storage(StorageError::Conflict { .. }) => ErrorCode::StaleResourceVersion,
        WorkspacesError::Storage(StorageError::UpstreamUnavailable { reason, .. }) => {
            if reason.starts_with("timed out") {
                ErrorCode::UpstreamTimeout
            } else {
                ErrorCode::UpstreamUnavailable
            }
        }
        WorkspacesError::Storage(StorageError::LockPoisoned) | WorkspacesError::Config(_) => {
            ErrorCode::Internal
        }
        WorkspacesError::Validation(_) | WorkspacesError::Reconcile(_) => {
            ErrorCode::InvalidWorkspace
        }
        WorkspacesError::List(list) => code_for(&list.source),
    }
}

impl From<WorkspacesError> for ApiError {
    fn from(err: WorkspacesError) -> Self {
        let code = code_for(&err);
        if code == ErrorCode::Internal {
            tracing::error!(error = %err, "Request failed with internal error");
            return ApiError::from_code(code);
        }
        ApiError::new(code, err.to_string())
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
