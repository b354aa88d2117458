//! Access-scoped workspace listing.
//!
//! Listing "as a user" merges every community workspace with every workspace
//! whose space the user holds a direct grant on. The merge runs against the
//! control plane's indexes, which may lag behind recent writes; results are
//! consistent with whatever snapshot each list call observed.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use workspaces_core::{
    to_view, InternalWorkspace, ListError, ListPhase, StorageError, Visibility, Workspace,
    WorkspacesConfig, WorkspacesError, WorkspacesResult,
};

use crate::control_plane::{ControlPlaneClient, ListOptions};
use crate::index::{INDEX_GRANT_PRINCIPAL, INDEX_SPACE_NAME, INDEX_VISIBILITY};

/// Computes the set of workspaces visible to a principal.
#[derive(Clone)]
pub struct WorkspaceLister {
    client: Arc<dyn ControlPlaneClient>,
    workspaces_namespace: String,
    kubesaw_namespace: String,
}

impl WorkspaceLister {
    pub fn new(client: Arc<dyn ControlPlaneClient>, config: &WorkspacesConfig) -> Self {
        Self {
            client,
            workspaces_namespace: config.workspaces_namespace.clone(),
            kubesaw_namespace: config.kubesaw_namespace.clone(),
        }
    }

    /// Community workspaces followed by directly granted ones.
    ///
    /// Granted spaces already covered by the community set are skipped, and
    /// the rest are fetched once each in sorted order. Any failed call aborts
    /// the whole listing.
    pub async fn list_as_user(&self, principal: &str) -> WorkspacesResult<Vec<InternalWorkspace>> {
        let mut workspaces = self
            .client
            .internal_workspace_list(
                &ListOptions::new()
                    .in_namespace(self.workspaces_namespace.clone())
                    .with_field(INDEX_VISIBILITY, Visibility::COMMUNITY),
            )
            .await
            .map_err(|err| ListError::new(ListPhase::CommunityListing, err))?;

        let grants = self
            .client
            .access_grant_list(
                &ListOptions::new()
                    .in_namespace(self.kubesaw_namespace.clone())
                    .with_label(INDEX_GRANT_PRINCIPAL, principal),
            )
            .await
            .map_err(|err| ListError::new(ListPhase::GrantListing, err))?;

        let missing: BTreeSet<String> = {
            let covered: BTreeSet<&str> = workspaces.iter().map(|w| w.space_name()).collect();
            grants
                .iter()
                .map(|grant| grant.spec.space.as_str())
                .filter(|space| !space.is_empty() && !covered.contains(space))
                .map(str::to_string)
                .collect()
        };

        debug!(
            principal,
            community = workspaces.len(),
            grants = grants.len(),
            missing_spaces = missing.len(),
            "Listing workspaces as user"
        );

        for space in missing {
            let found = self
                .client
                .internal_workspace_list(
                    &ListOptions::new()
                        .in_namespace(self.workspaces_namespace.clone())
                        .with_field(INDEX_SPACE_NAME, space.clone()),
                )
                .await
                .map_err(|err| ListError::new(ListPhase::SpaceFetch(space.clone()), err))?;
            workspaces.extend(found);
        }

        Ok(workspaces)
    }

    /// [`WorkspaceLister::list_as_user`] bounded by `timeout`.
    ///
    /// On expiry the in-flight upstream calls are dropped and the call fails
    /// with `UpstreamUnavailable`.
    pub async fn list_as_user_within(
        &self,
        principal: &str,
        timeout: Duration,
    ) -> WorkspacesResult<Vec<InternalWorkspace>> {
        match tokio::time::timeout(timeout, self.list_as_user(principal)).await {
            Ok(result) => result,
            Err(_) => Err(WorkspacesError::Storage(StorageError::UpstreamUnavailable {
                operation: "list workspaces as user".to_string(),
                reason: format!("timed out after {}ms", timeout.as_millis()),
            })),
        }
    }

    /// Public views visible to `principal`, optionally restricted to views
    /// owned by `namespace`. Workspaces that cannot be mapped are skipped.
    pub async fn list_views_as_user(
        &self,
        principal: &str,
        namespace: Option<&str>,
        timeout: Option<Duration>,
    ) -> WorkspacesResult<Vec<Workspace>> {
        let internal = match timeout {
            Some(timeout) => self.list_as_user_within(principal, timeout).await?,
            None => self.list_as_user(principal).await?,
        };

        let views = internal
            .iter()
            .filter_map(|workspace| match to_view(workspace) {
                Ok(view) => Some(view),
                Err(err) => {
                    warn!(source = %workspace.metadata.key(), error = %err, "Skipping unmappable workspace");
                    None
                }
            })
            .filter(|view| namespace.map_or(true, |ns| view.metadata.namespace == ns))
            .collect();
        Ok(views)
    }
}

// =============================================================================
// TESTS
// =============================================================================
