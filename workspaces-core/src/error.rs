//! Error types for workspace operations

use crate::{ObjectKey, ResourceKind};
use std::fmt;
use thiserror::Error;

/// Upstream and cache storage errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    #[error("{kind} not found: {key}")]
    NotFound { kind: ResourceKind, key: ObjectKey },

    #[error("{kind} already exists: {key}")]
    AlreadyExists { kind: ResourceKind, key: ObjectKey },

    #[error("Conflict writing {kind} {key}: expected resource version {expected}, found {actual}")]
    Conflict {
        kind: ResourceKind,
        key: ObjectKey,
        expected: u64,
        actual: u64,
    },

    #[error("Upstream unavailable during {operation}: {reason}")]
    UpstreamUnavailable { operation: String, reason: String },

    #[error("Storage lock poisoned")]
    LockPoisoned,
}

/// Validation errors raised while deriving or accepting resources.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Required field missing on {kind} {key}: {field}")]
    MissingRequiredField {
        kind: ResourceKind,
        key: ObjectKey,
        field: String,
    },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },
}

/// Errors raised by the visibility reconciler.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ReconcileError {
    /// Terminal: retrying cannot fix a malformed visibility.
    #[error("Invalid visibility {value:?} on workspace {key}")]
    InvalidVisibility { key: ObjectKey, value: String },
}

/// Step of the access-scoped list query that failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListPhase {
    CommunityListing,
    GrantListing,
    SpaceFetch(String),
}

impl fmt::Display for ListPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ListPhase::CommunityListing => f.write_str("error retrieving community workspaces"),
            ListPhase::GrantListing => f.write_str("error fetching directly accessible workspaces"),
            ListPhase::SpaceFetch(space) => {
                write!(f, "error fetching workspaces for space {}", space)
            }
        }
    }
}

/// Access-scoped list failure. No partial results accompany it.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{phase}: {source}")]
pub struct ListError {
    pub phase: ListPhase,
    pub source: Box<WorkspacesError>,
}

impl ListError {
    pub fn new(phase: ListPhase, source: impl Into<WorkspacesError>) -> Self {
        Self {
            phase,
            source: Box::new(source.into()),
        }
    }
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

/// Master error type for all workspace errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum WorkspacesError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Reconcile error: {0}")]
    Reconcile(#[from] ReconcileError),

    #[error("List error: {0}")]
    List(#[from] ListError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

impl WorkspacesError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, WorkspacesError::Storage(StorageError::NotFound { .. }))
    }

    /// Whether a retry with backoff may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            WorkspacesError::Storage(err) => err.is_retryable(),
            WorkspacesError::List(err) => err.source.is_retryable(),
            _ => false,
        }
    }

    /// Errors that must be logged once and never retried.
    pub fn is_non_transient(&self) -> bool {
        match self {
            WorkspacesError::Reconcile(_)
            | WorkspacesError::Validation(_)
            | WorkspacesError::Config(_) => true,
            WorkspacesError::List(err) => err.source.is_non_transient(),
            WorkspacesError::Storage(_) => false,
        }
    }
}

impl StorageError {
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            StorageError::UpstreamUnavailable { .. } | StorageError::Conflict { .. }
        )
    }
}

/// Result type alias for workspace operations.
pub type WorkspacesResult<T> = Result<T, WorkspacesError>;

// =============================================================================
// TESTS
// =============================================================================
