//! Visibility reconciler.
//!
//! A community workspace owns exactly one access grant, named
//! `<workspace>-community`, giving the public viewer principal the viewer role
//! on the workspace's space. A private workspace owns none. Every pass reads
//! the current state and converges on that rule, so passes are idempotent and
//! may be repeated freely.

use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

use workspaces_core::{
    community_grant_name, AccessGrant, InternalWorkspace, ObjectKey, ReconcileError, SpaceRole,
    Visibility, WorkspacesConfig, WorkspacesResult, PUBLIC_VIEWER_NAME,
};
use workspaces_storage::ControlPlaneClient;

/// Result of one reconcile pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// The workspace no longer exists.
    Skipped,
    GrantCreated,
    GrantUpdated,
    GrantDeleted,
    /// State already matched; no write was issued.
    Unchanged,
}

impl ReconcileOutcome {
    pub fn is_write(&self) -> bool {
        matches!(
            self,
            ReconcileOutcome::GrantCreated
                | ReconcileOutcome::GrantUpdated
                | ReconcileOutcome::GrantDeleted
        )
    }
}

impl fmt::Display for ReconcileOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = match self {
            ReconcileOutcome::Skipped => "skipped",
            ReconcileOutcome::GrantCreated => "grant_created",
            ReconcileOutcome::GrantUpdated => "grant_updated",
            ReconcileOutcome::GrantDeleted => "grant_deleted",
            ReconcileOutcome::Unchanged => "unchanged",
        };
        f.write_str(value)
    }
}

/// Converges the community grant of one workspace on its visibility.
#[derive(Clone)]
pub struct VisibilityReconciler {
    client: Arc<dyn ControlPlaneClient>,
    workspaces_namespace: String,
    kubesaw_namespace: String,
}

impl fmt::Debug for VisibilityReconciler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VisibilityReconciler")
            .field("workspaces_namespace", &self.workspaces_namespace)
            .field("kubesaw_namespace", &self.kubesaw_namespace)
            .finish()
    }
}

impl VisibilityReconciler {
    pub fn new(client: Arc<dyn ControlPlaneClient>, config: &WorkspacesConfig) -> Self {
        Self {
            client,
            workspaces_namespace: config.workspaces_namespace.clone(),
            kubesaw_namespace: config.kubesaw_namespace.clone(),
        }
    }

    /// Key of the community grant belonging to `workspace_name`.
    pub fn grant_key(&self, workspace_name: &str) -> ObjectKey {
        ObjectKey::new(
            self.kubesaw_namespace.clone(),
            community_grant_name(workspace_name),
        )
    }

    /// The community grant a community workspace must own.
    pub fn desired_grant(&self, workspace: &InternalWorkspace) -> AccessGrant {
        AccessGrant::new(
            self.grant_key(&workspace.metadata.name),
            &workspace.metadata.name,
            PUBLIC_VIEWER_NAME,
            SpaceRole::Viewer,
        )
    }

    /// Run one pass for the internal workspace at `key`.
    ///
    /// A visibility outside the known values fails with
    /// [`ReconcileError::InvalidVisibility`], which must not be retried.
    pub async fn reconcile(&self, key: &ObjectKey) -> WorkspacesResult<ReconcileOutcome> {
        let Some(workspace) = self.client.internal_workspace_get(key).await? else {
            debug!(workspace = %key, "Workspace gone, nothing to reconcile");
            return Ok(ReconcileOutcome::Skipped);
        };

        let outcome = match &workspace.spec.visibility {
            Visibility::Community => self.ensure_grant(&workspace).await?,
            Visibility::Private => self.remove_grant(&workspace).await?,
            Visibility::Unknown(value) => {
                return Err(ReconcileError::InvalidVisibility {
                    key: key.clone(),
                    value: value.clone(),
                }
                .into())
            }
        };

        debug!(
            workspace = %key,
            visibility = %workspace.spec.visibility,
            outcome = %outcome,
            "Workspace visibility is satisfied"
        );
        Ok(outcome)
    }

    async fn ensure_grant(&self, workspace: &InternalWorkspace) -> WorkspacesResult<ReconcileOutcome> {
        let desired = self.desired_grant(workspace);
        let grant_key = desired.metadata.key();

        let Some(current) = self.client.access_grant_get(&grant_key).await? else {
            info!(workspace = %workspace.metadata.key(), grant = %grant_key, "Creating community grant");
            self.client.access_grant_create(&desired).await?;
            return Ok(ReconcileOutcome::GrantCreated);
        };

        let labels_match = desired
            .metadata
            .labels
            .iter()
            .all(|(label, value)| current.metadata.label(label) == Some(value.as_str()));
        if current.spec == desired.spec && labels_match {
            return Ok(ReconcileOutcome::Unchanged);
        }

        let mut updated = current;
        updated.spec = desired.spec;
        updated.metadata.labels.extend(desired.metadata.labels);
        info!(workspace = %workspace.metadata.key(), grant = %grant_key, "Updating community grant");
        self.client.access_grant_update(&updated).await?;
        Ok(ReconcileOutcome::GrantUpdated)
    }

    async fn remove_grant(&self, workspace: &InternalWorkspace) -> WorkspacesResult<ReconcileOutcome> {
        let grant_key = self.grant_key(&workspace.metadata.name);
        if self.client.access_grant_get(&grant_key).await?.is_none() {
            return Ok(ReconcileOutcome::Unchanged);
        }

        info!(workspace = %workspace.metadata.key(), grant = %grant_key, "Deleting community grant");
        match self.client.access_grant_delete(&grant_key).await {
            Ok(()) => Ok(ReconcileOutcome::GrantDeleted),
            Err(err) if err.is_not_found() => Ok(ReconcileOutcome::Unchanged),
            Err(err) => Err(err),
        }
    }

    /// Workspace a grant belongs to, resolved through its space label.
    pub fn map_grant_to_workspace(&self, grant: &AccessGrant) -> Option<ObjectKey> {
        grant
            .space_label()
            .map(|space| ObjectKey::new(self.workspaces_namespace.clone(), space))
    }
}

// =============================================================================
// TESTS
// =============================================================================
