//! Workspaces Test Utilities
//!
//! Shared test infrastructure for the workspace crates:
//! - Proptest generators for resources and identities
//! - Fixtures for common control-plane scenarios
//! - Assertions over the error taxonomy

pub use workspaces_storage::InMemoryControlPlane;

pub use workspaces_core::{
    AccessGrant, InternalWorkspace, JwtInfo, ObjectKey, ObjectMeta, ResourceKind, SpaceInfo,
    SpaceRole, StorageError, UserInfo, Visibility, Workspace, WorkspacesConfig, WorkspacesError,
    WorkspacesResult, DEFAULT_KUBESAW_NAMESPACE, DEFAULT_WORKSPACES_NAMESPACE,
};

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for workspace resources.

    use super::*;
    use proptest::prelude::*;

    /// DNS-label-ish names used for namespaces, spaces and display names.
    pub fn arb_name() -> impl Strategy<Value = String> {
        "[a-z][a-z0-9-]{0,14}[a-z0-9]".prop_map(String::from)
    }

    pub fn arb_username() -> impl Strategy<Value = String> {
        "[a-z]{1,10}".prop_map(String::from)
    }

    pub fn arb_visibility() -> impl Strategy<Value = Visibility> {
        prop_oneof![Just(Visibility::Community), Just(Visibility::Private)]
    }

    /// Known visibilities plus arbitrary unknown values.
    pub fn arb_any_visibility() -> impl Strategy<Value = Visibility> {
        prop_oneof![
            3 => arb_visibility(),
            1 => "[a-z]{3,8}"
                .prop_filter("must not be a known visibility", |v| {
                    v != Visibility::COMMUNITY && v != Visibility::PRIVATE
                })
                .prop_map(Visibility::from),
        ]
    }

    pub fn arb_space_role() -> impl Strategy<Value = SpaceRole> {
        prop_oneof![
            Just(SpaceRole::Viewer),
            Just(SpaceRole::Contributor),
            Just(SpaceRole::Maintainer),
            Just(SpaceRole::Admin),
        ]
    }

    pub fn arb_jwt_info() -> impl Strategy<Value = JwtInfo> {
        (
            "[a-z]{1,8}@[a-z]{1,6}\\.com",
            "[a-z0-9]{1,12}",
            "[a-z0-9]{1,12}",
            proptest::option::of("[a-z]{1,8}"),
            proptest::option::of("[0-9]{4,8}"),
            proptest::option::of("[A-Z][a-z]{1,8}"),
            proptest::option::of("[A-Z][a-z]{1,8}"),
            proptest::option::of("[A-Z][a-z]{1,8}"),
        )
            .prop_map(
                |(
                    email,
                    user_id,
                    sub,
                    preferred_username,
                    account_id,
                    company,
                    given_name,
                    family_name,
                )| JwtInfo {
                    email,
                    user_id,
                    sub,
                    preferred_username,
                    account_id,
                    company,
                    given_name,
                    family_name,
                },
            )
    }

    /// A mappable internal workspace in the default workspaces namespace,
    /// named after its space.
    pub fn arb_internal_workspace() -> impl Strategy<Value = InternalWorkspace> {
        (
            arb_name(),
            arb_username(),
            arb_name(),
            arb_visibility(),
            arb_jwt_info(),
            any::<bool>(),
        )
            .prop_map(|(space, owner, display_name, visibility, jwt, is_home)| {
                let mut workspace = fixtures::internal_workspace(&space, &owner, visibility);
                workspace.spec.display_name = display_name;
                workspace.spec.owner.jwt_info = jwt;
                if let Some(status_space) = workspace.status.space.as_mut() {
                    status_space.is_home = is_home;
                }
                workspace
            })
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built resources for common scenarios.

    use super::*;

    /// Internal workspace `space` in the default workspaces namespace, owned
    /// by `owner`, with display name equal to the space name.
    pub fn internal_workspace(space: &str, owner: &str, visibility: Visibility) -> InternalWorkspace {
        let mut workspace = InternalWorkspace {
            metadata: ObjectMeta::new(DEFAULT_WORKSPACES_NAMESPACE, space),
            ..InternalWorkspace::default()
        };
        workspace.spec.display_name = space.to_string();
        workspace.spec.visibility = visibility;
        workspace.spec.space = space.to_string();
        workspace.spec.owner = UserInfo {
            jwt_info: JwtInfo {
                email: format!("{}@example.com", owner),
                user_id: format!("{}-id", owner),
                sub: format!("{}-sub", owner),
                preferred_username: Some(owner.to_string()),
                ..JwtInfo::default()
            },
        };
        workspace.status.owner.username = owner.to_string();
        workspace.status.space = Some(SpaceInfo {
            name: space.to_string(),
            is_home: false,
        });
        workspace
    }

    /// Grant of `role` on `space` to `principal`, in the default grant namespace.
    pub fn access_grant(name: &str, space: &str, principal: &str, role: SpaceRole) -> AccessGrant {
        AccessGrant::new(
            ObjectKey::new(DEFAULT_KUBESAW_NAMESPACE, name),
            space,
            principal,
            role,
        )
    }

    /// Control plane pre-populated with `workspaces`.
    pub async fn seeded_control_plane(
        workspaces: &[InternalWorkspace],
    ) -> WorkspacesResult<InMemoryControlPlane> {
        use workspaces_storage::ControlPlaneClient;

        let plane = InMemoryControlPlane::new();
        for workspace in workspaces {
            plane.internal_workspace_create(workspace).await?;
        }
        Ok(plane)
    }

    /// Configuration with fast retries for tests.
    pub fn fast_retry_config() -> WorkspacesConfig {
        let mut config = WorkspacesConfig::default();
        config.retry.max_retries = 3;
        config.retry.initial_backoff = std::time::Duration::from_millis(1);
        config.retry.max_backoff = std::time::Duration::from_millis(5);
        config
    }
}

// ============================================================================
// CUSTOM ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Assertions over workspace results.

    use super::*;

    #[track_caller]
    pub fn assert_ok<T: std::fmt::Debug>(result: &WorkspacesResult<T>) {
        assert!(result.is_ok(), "Expected Ok, got Err: {:?}", result);
    }

    /// Assert that a result is a NotFound storage error for `kind`.
    #[track_caller]
    pub fn assert_not_found<T: std::fmt::Debug>(result: &WorkspacesResult<T>, kind: ResourceKind) {
        match result {
            Err(WorkspacesError::Storage(StorageError::NotFound { kind: found, .. })) => {
                assert_eq!(*found, kind, "Wrong kind in NotFound error");
            }
            other => panic!("Expected NotFound error for {}, got: {:?}", kind, other),
        }
    }

    #[track_caller]
    pub fn assert_retryable<T: std::fmt::Debug>(result: &WorkspacesResult<T>) {
        match result {
            Err(err) if err.is_retryable() => {}
            other => panic!("Expected retryable error, got: {:?}", other),
        }
    }

    #[track_caller]
    pub fn assert_non_transient<T: std::fmt::Debug>(result: &WorkspacesResult<T>) {
        match result {
            Err(err) if err.is_non_transient() => {}
            other => panic!("Expected non-transient error, got: {:?}", other),
        }
    }
}
