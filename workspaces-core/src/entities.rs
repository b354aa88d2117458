//! Resource definitions
//!
//! Three resources take part in the workspace model:
//!
//! - [`InternalWorkspace`] is the system of record, owned by the control plane
//!   and stored in the workspaces namespace.
//! - [`Workspace`] is the externally visible view derived from it, identified
//!   by owner username and display name.
//! - [`AccessGrant`] confers a principal a role over a space. Community
//!   workspaces own one companion grant for the public viewer principal.

use serde::{Deserialize, Serialize};

use crate::{ObjectKey, ObjectMeta, Resource, ResourceKind, SpaceRole, Visibility};

// ============================================================================
// LABELS AND WELL-KNOWN NAMES
// ============================================================================

/// Prefix of labels reserved for the service; never exposed on views.
pub const LABEL_INTERNAL_DOMAIN: &str = "internal.workspaces.konflux.io/";

/// Label carrying the user chosen display name of an internal workspace.
pub const LABEL_DISPLAY_NAME: &str = "internal.workspaces.konflux.io/display-name";

/// Owner label on internal workspaces. Superseded by `status.owner.username`.
pub const LABEL_WORKSPACE_OWNER: &str = "internal.workspaces.konflux.io/owner";

/// Label on access grants naming the space they target.
pub const LABEL_GRANT_SPACE: &str = "toolchain.dev.openshift.com/space";

/// Label on access grants naming the principal they are issued to.
pub const LABEL_GRANT_PRINCIPAL: &str = "toolchain.dev.openshift.com/masteruserrecord";

/// Principal standing for "every authenticated user".
pub const PUBLIC_VIEWER_NAME: &str = "kubesaw-authenticated";

/// Display name of a user's home workspace.
pub const DISPLAY_NAME_DEFAULT_WORKSPACE: &str = "default";

/// Name of the community grant companion of the internal workspace `workspace_name`.
pub fn community_grant_name(workspace_name: &str) -> String {
    format!("{}-community", workspace_name)
}

/// Returns true for labels that belong to the internal domain.
pub fn is_internal_label(key: &str) -> bool {
    key.starts_with(LABEL_INTERNAL_DOMAIN)
}

// ============================================================================
// OWNER IDENTITY
// ============================================================================

/// Claims extracted from the owner's identity token.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JwtInfo {
    pub email: String,
    pub user_id: String,
    pub sub: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferred_username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub given_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub family_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserInfo {
    pub jwt_info: JwtInfo,
}

/// Owner information resolved by the control plane.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserInfoStatus {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub username: String,
}

/// Information about the space backing a workspace.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpaceInfo {
    pub name: String,
    #[serde(default)]
    pub is_home: bool,
}

// ============================================================================
// INTERNAL WORKSPACE
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InternalWorkspaceSpec {
    pub display_name: String,
    pub visibility: Visibility,
    pub owner: UserInfo,
    /// Name of the underlying space allocation.
    #[serde(default)]
    pub space: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InternalWorkspaceStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub space: Option<SpaceInfo>,
    #[serde(default)]
    pub owner: UserInfoStatus,
}

/// System-of-record workspace resource.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InternalWorkspace {
    pub metadata: ObjectMeta,
    pub spec: InternalWorkspaceSpec,
    #[serde(default)]
    pub status: InternalWorkspaceStatus,
}

impl InternalWorkspace {
    /// Space name as reported in status, if the control plane resolved one.
    pub fn status_space_name(&self) -> Option<&str> {
        self.status
            .space
            .as_ref()
            .map(|space| space.name.as_str())
            .filter(|name| !name.is_empty())
    }

    /// Space name used for matching grants: the resolved status space,
    /// falling back to the requested spec space.
    pub fn space_name(&self) -> &str {
        self.status_space_name().unwrap_or(&self.spec.space)
    }
}

impl Resource for InternalWorkspace {
    const KIND: ResourceKind = ResourceKind::InternalWorkspace;

    fn metadata(&self) -> &ObjectMeta {
        &self.metadata
    }

    fn metadata_mut(&mut self) -> &mut ObjectMeta {
        &mut self.metadata
    }
}

// ============================================================================
// WORKSPACE (EXTERNAL VIEW)
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceSpec {
    pub visibility: Visibility,
    pub owner: UserInfo,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub space: Option<SpaceInfo>,
    #[serde(default)]
    pub owner: UserInfoStatus,
}

/// Externally visible workspace, identified by (owner username, display name).
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Workspace {
    pub metadata: ObjectMeta,
    pub spec: WorkspaceSpec,
    #[serde(default)]
    pub status: WorkspaceStatus,
}

impl Workspace {
    pub fn space_name(&self) -> Option<&str> {
        self.status.space.as_ref().map(|space| space.name.as_str())
    }
}

impl Resource for Workspace {
    const KIND: ResourceKind = ResourceKind::Workspace;

    fn metadata(&self) -> &ObjectMeta {
        &self.metadata
    }

    fn metadata_mut(&mut self) -> &mut ObjectMeta {
        &mut self.metadata
    }
}

/// Envelope returned by list endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct WorkspaceList {
    pub items: Vec<Workspace>,
}

// ============================================================================
// ACCESS GRANT
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessGrantSpec {
    /// Space the grant targets.
    pub space: String,
    /// Principal the grant is issued to.
    pub principal: String,
    pub role: SpaceRole,
}

/// Grant of a role over a space to a principal ("SpaceBinding").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessGrant {
    pub metadata: ObjectMeta,
    pub spec: AccessGrantSpec,
}

impl AccessGrant {
    /// Builds a grant whose lookup labels agree with its spec.
    pub fn new(key: ObjectKey, space: &str, principal: &str, role: SpaceRole) -> Self {
        let mut metadata = ObjectMeta::new(key.namespace, key.name);
        metadata
            .labels
            .insert(LABEL_GRANT_SPACE.to_string(), space.to_string());
        metadata
            .labels
            .insert(LABEL_GRANT_PRINCIPAL.to_string(), principal.to_string());
        Self {
            metadata,
            spec: AccessGrantSpec {
                space: space.to_string(),
                principal: principal.to_string(),
                role,
            },
        }
    }

    pub fn space_label(&self) -> Option<&str> {
        self.metadata.label(LABEL_GRANT_SPACE)
    }

    pub fn principal_label(&self) -> Option<&str> {
        self.metadata.label(LABEL_GRANT_PRINCIPAL)
    }
}

impl Resource for AccessGrant {
    const KIND: ResourceKind = ResourceKind::AccessGrant;

    fn metadata(&self) -> &ObjectMeta {
        &self.metadata
    }

    fn metadata_mut(&mut self) -> &mut ObjectMeta {
        &mut self.metadata
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_community_grant_name() {
        assert_eq!(community_grant_name("ws-1"), "ws-1-community");
    }

    #[test]
    fn test_internal_label_detection() {
        assert!(is_internal_label(LABEL_DISPLAY_NAME));
        assert!(is_internal_label(LABEL_WORKSPACE_OWNER));
        assert!(!is_internal_label("app.kubernetes.io/name"));
    }

    #[test]
    fn test_space_name_prefers_status() {
        let mut workspace = InternalWorkspace::default();
        workspace.spec.space = "requested".to_string();
        assert_eq!(workspace.space_name(), "requested");
        assert_eq!(workspace.status_space_name(), None);

        workspace.status.space = Some(SpaceInfo {
            name: "resolved".to_string(),
            is_home: false,
        });
        assert_eq!(workspace.space_name(), "resolved");
    }

    #[test]
    fn test_access_grant_labels_match_spec() {
        let grant = AccessGrant::new(
            ObjectKey::new("toolchain", "ws-community"),
            "ws",
            PUBLIC_VIEWER_NAME,
            SpaceRole::Viewer,
        );
        assert_eq!(grant.space_label(), Some("ws"));
        assert_eq!(grant.principal_label(), Some(PUBLIC_VIEWER_NAME));
        assert_eq!(grant.key(), ObjectKey::new("toolchain", "ws-community"));
    }

    #[test]
    fn test_internal_workspace_json_shape() -> Result<(), serde_json::Error> {
        let mut workspace = InternalWorkspace::default();
        workspace.metadata = ObjectMeta::new("workspaces-system", "ws-1");
        workspace.spec.display_name = "default".to_string();
        workspace.spec.visibility = Visibility::Community;
        workspace.status.owner.username = "alice".to_string();

        let json = serde_json::to_value(&workspace)?;
        assert_eq!(json["spec"]["displayName"], "default");
        assert_eq!(json["spec"]["visibility"], "community");
        assert_eq!(json["status"]["owner"]["username"], "alice");

        let back: InternalWorkspace = serde_json::from_value(json)?;
        assert_eq!(back, workspace);
        Ok(())
    }
}
