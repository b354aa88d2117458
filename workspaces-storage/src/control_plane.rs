//! Upstream read/write API of the control plane.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::fmt;

use workspaces_core::{AccessGrant, InternalWorkspace, ObjectKey, WorkspacesResult};

/// Selectors applied by list calls. All given selectors must match.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListOptions {
    /// Restrict to one namespace.
    pub namespace: Option<String>,
    /// Field selectors, keyed by index key (see [`crate::index`]).
    pub fields: BTreeMap<String, String>,
    /// Exact-match label selectors.
    pub labels: BTreeMap<String, String>,
}

impl ListOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn in_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }
}

/// Verb of a control-plane call, used in errors and fault injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verb {
    Get,
    List,
    Create,
    Update,
    Delete,
}

impl Verb {
    pub fn is_write(&self) -> bool {
        matches!(self, Verb::Create | Verb::Update | Verb::Delete)
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = match self {
            Verb::Get => "get",
            Verb::List => "list",
            Verb::Create => "create",
            Verb::Update => "update",
            Verb::Delete => "delete",
        };
        f.write_str(value)
    }
}

/// Async client for the control plane.
///
/// Writes are only eventually visible to watchers; callers must not assume a
/// write is reflected in any cache when the call returns.
#[async_trait]
pub trait ControlPlaneClient: Send + Sync {
    // ========================================================================
    // INTERNAL WORKSPACE OPERATIONS
    // ========================================================================

    /// Get an internal workspace by key.
    async fn internal_workspace_get(&self, key: &ObjectKey)
        -> WorkspacesResult<Option<InternalWorkspace>>;

    /// List internal workspaces matching the options, ordered by key.
    async fn internal_workspace_list(
        &self,
        options: &ListOptions,
    ) -> WorkspacesResult<Vec<InternalWorkspace>>;

    /// Create an internal workspace; returns the stored object.
    async fn internal_workspace_create(
        &self,
        workspace: &InternalWorkspace,
    ) -> WorkspacesResult<InternalWorkspace>;

    /// Update an internal workspace; returns the stored object.
    async fn internal_workspace_update(
        &self,
        workspace: &InternalWorkspace,
    ) -> WorkspacesResult<InternalWorkspace>;

    /// Delete an internal workspace.
    async fn internal_workspace_delete(&self, key: &ObjectKey) -> WorkspacesResult<()>;

    // ========================================================================
    // ACCESS GRANT OPERATIONS
    // ========================================================================

    /// Get an access grant by key.
    async fn access_grant_get(&self, key: &ObjectKey) -> WorkspacesResult<Option<AccessGrant>>;

    /// List access grants matching the options, ordered by key.
    async fn access_grant_list(&self, options: &ListOptions) -> WorkspacesResult<Vec<AccessGrant>>;

    /// Create an access grant; returns the stored object.
    async fn access_grant_create(&self, grant: &AccessGrant) -> WorkspacesResult<AccessGrant>;

    /// Update an access grant; returns the stored object.
    async fn access_grant_update(&self, grant: &AccessGrant) -> WorkspacesResult<AccessGrant>;

    /// Delete an access grant.
    async fn access_grant_delete(&self, key: &ObjectKey) -> WorkspacesResult<()>;
}
