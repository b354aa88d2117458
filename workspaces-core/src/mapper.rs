//! Bidirectional transform between internal workspaces and their public view
//!
//! Both directions are pure: no I/O, no clock, no randomness. The view is
//! addressed by `(owner username, display name)`, so deriving one fails when
//! either half of that identity is missing.

use crate::{
    is_internal_label, InternalWorkspace, InternalWorkspaceSpec, InternalWorkspaceStatus, Labels,
    ObjectMeta, Resource, ResourceKind, SpaceInfo, UserInfoStatus, ValidationError, Workspace,
    WorkspaceSpec, WorkspaceStatus, DISPLAY_NAME_DEFAULT_WORKSPACE, LABEL_DISPLAY_NAME,
};

fn external_labels(labels: &Labels) -> Labels {
    labels
        .iter()
        .filter(|(key, _)| !is_internal_label(key))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

/// Derive the public view of an internal workspace.
pub fn to_view(internal: &InternalWorkspace) -> Result<Workspace, ValidationError> {
    let owner = &internal.status.owner.username;
    if owner.is_empty() {
        return Err(ValidationError::MissingRequiredField {
            kind: ResourceKind::InternalWorkspace,
            key: internal.key(),
            field: "status.owner.username".to_string(),
        });
    }

    let display_name = &internal.spec.display_name;
    if display_name.is_empty() {
        return Err(ValidationError::MissingRequiredField {
            kind: ResourceKind::InternalWorkspace,
            key: internal.key(),
            field: "spec.displayName".to_string(),
        });
    }

    let is_home = internal
        .status
        .space
        .as_ref()
        .map(|space| space.is_home)
        .unwrap_or(false);

    let mut metadata = ObjectMeta::new(owner.clone(), display_name.clone());
    metadata.labels = external_labels(&internal.metadata.labels);
    metadata.generation = internal.metadata.generation;

    Ok(Workspace {
        metadata,
        spec: WorkspaceSpec {
            visibility: internal.spec.visibility.clone(),
            owner: internal.spec.owner.clone(),
        },
        status: WorkspaceStatus {
            space: Some(SpaceInfo {
                name: internal.spec.space.clone(),
                is_home,
            }),
            owner: UserInfoStatus {
                username: owner.clone(),
            },
        },
    })
}

/// Build an internal workspace from a view.
///
/// Name and namespace are left empty; the write path assigns them.
pub fn to_internal(view: &Workspace) -> Result<InternalWorkspace, ValidationError> {
    let display_name = view.metadata.name.clone();

    let mut labels = external_labels(&view.metadata.labels);
    labels.insert(LABEL_DISPLAY_NAME.to_string(), display_name.clone());

    let metadata = ObjectMeta {
        labels,
        generation: view.metadata.generation,
        ..ObjectMeta::default()
    };

    Ok(InternalWorkspace {
        metadata,
        spec: InternalWorkspaceSpec {
            space: view.space_name().unwrap_or_default().to_string(),
            display_name: display_name.clone(),
            visibility: view.spec.visibility.clone(),
            owner: view.spec.owner.clone(),
        },
        status: InternalWorkspaceStatus {
            space: Some(SpaceInfo {
                name: String::new(),
                is_home: display_name == DISPLAY_NAME_DEFAULT_WORKSPACE,
            }),
            owner: UserInfoStatus {
                username: view.metadata.namespace.clone(),
            },
        },
    })
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{JwtInfo, ObjectKey, UserInfo, Visibility};

    fn internal(owner: &str, display_name: &str) -> InternalWorkspace {
        let mut metadata = ObjectMeta::new("workspaces-system", "ws-abc12");
        metadata.generation = 3;
        metadata
            .labels
            .insert("team".to_string(), "infra".to_string());
        metadata
            .labels
            .insert(LABEL_DISPLAY_NAME.to_string(), display_name.to_string());
        InternalWorkspace {
            metadata,
            spec: InternalWorkspaceSpec {
                display_name: display_name.to_string(),
                visibility: Visibility::Community,
                owner: UserInfo {
                    jwt_info: JwtInfo {
                        email: "alice@example.com".to_string(),
                        user_id: "u-1".to_string(),
                        sub: "sub-1".to_string(),
                        given_name: Some("Alice".to_string()),
                        ..JwtInfo::default()
                    },
                },
                space: "sp1".to_string(),
            },
            status: InternalWorkspaceStatus {
                space: Some(SpaceInfo {
                    name: "sp1".to_string(),
                    is_home: true,
                }),
                owner: UserInfoStatus {
                    username: owner.to_string(),
                },
            },
        }
    }

    #[test]
    fn test_to_view_identity_and_labels() {
        let view = to_view(&internal("alice", "default")).expect("derivation should succeed");
        assert_eq!(view.key(), ObjectKey::new("alice", "default"));
        assert_eq!(view.metadata.generation, 3);
        assert_eq!(view.metadata.label("team"), Some("infra"));
        assert_eq!(view.metadata.label(LABEL_DISPLAY_NAME), None);
        assert_eq!(view.spec.visibility, Visibility::Community);
        assert_eq!(view.status.owner.username, "alice");
        assert_eq!(
            view.status.space,
            Some(SpaceInfo {
                name: "sp1".to_string(),
                is_home: true
            })
        );
    }

    #[test]
    fn test_to_view_missing_owner_fails() {
        let err = to_view(&internal("", "default")).expect_err("missing owner should fail");
        match err {
            ValidationError::MissingRequiredField { field, key, .. } => {
                assert_eq!(field, "status.owner.username");
                assert_eq!(key, ObjectKey::new("workspaces-system", "ws-abc12"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_to_view_missing_display_name_fails() {
        let err = to_view(&internal("alice", "")).expect_err("missing display name should fail");
        assert!(matches!(
            err,
            ValidationError::MissingRequiredField { ref field, .. } if field == "spec.displayName"
        ));
    }

    #[test]
    fn test_to_view_absent_status_space_is_not_home() {
        let mut source = internal("alice", "proj");
        source.status.space = None;
        let view = to_view(&source).expect("derivation should succeed");
        let space = view.status.space.expect("view always carries a space");
        assert_eq!(space.name, "sp1");
        assert!(!space.is_home);
    }

    #[test]
    fn test_to_view_preserves_unknown_visibility() {
        let mut source = internal("alice", "proj");
        source.spec.visibility = Visibility::from("public");
        let view = to_view(&source).expect("derivation should succeed");
        assert_eq!(view.spec.visibility.as_str(), "public");
    }

    #[test]
    fn test_to_internal_fields() {
        let view = to_view(&internal("alice", "default")).expect("derivation should succeed");
        let back = to_internal(&view).expect("reverse mapping should succeed");

        assert!(back.metadata.name.is_empty());
        assert!(back.metadata.namespace.is_empty());
        assert_eq!(back.metadata.label(LABEL_DISPLAY_NAME), Some("default"));
        assert_eq!(back.metadata.label("team"), Some("infra"));
        assert_eq!(back.spec.display_name, "default");
        assert_eq!(back.spec.space, "sp1");
        assert_eq!(back.status.owner.username, "alice");
        assert!(back.status.space.as_ref().is_some_and(|space| space.is_home));
        assert_eq!(back.spec.owner, view.spec.owner);
        assert_eq!(back.metadata.generation, 3);
    }

    #[test]
    fn test_to_internal_non_default_is_not_home() {
        let mut view = Workspace::default();
        view.metadata = ObjectMeta::new("bob", "project-x");
        let back = to_internal(&view).expect("reverse mapping should succeed");
        assert!(back.status.space.as_ref().is_some_and(|space| !space.is_home));
        assert_eq!(back.spec.space, "");
    }

    #[test]
    fn test_to_internal_drops_internal_labels() {
        let mut view = Workspace::default();
        view.metadata = ObjectMeta::new("bob", "project-x");
        view.metadata.labels.insert(
            "internal.workspaces.konflux.io/owner".to_string(),
            "mallory".to_string(),
        );
        let back = to_internal(&view).expect("reverse mapping should succeed");
        assert_eq!(back.metadata.label("internal.workspaces.konflux.io/owner"), None);
        assert_eq!(back.metadata.label(LABEL_DISPLAY_NAME), Some("project-x"));
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        fn arb_jwt() -> impl Strategy<Value = JwtInfo> {
            (
                "[a-z]{1,8}@[a-z]{1,6}\\.com",
                "[a-z0-9]{1,12}",
                "[a-z0-9]{1,12}",
                proptest::option::of("[a-z]{1,8}"),
                proptest::option::of("[A-Z][a-z]{1,8}"),
            )
                .prop_map(|(email, user_id, sub, preferred_username, given_name)| JwtInfo {
                    email,
                    user_id,
                    sub,
                    preferred_username,
                    given_name,
                    ..JwtInfo::default()
                })
        }

        fn arb_visibility() -> impl Strategy<Value = Visibility> {
            prop_oneof![
                Just(Visibility::Community),
                Just(Visibility::Private),
                "[a-z]{3,8}".prop_map(Visibility::from),
            ]
        }

        proptest! {
            #![proptest_config(ProptestConfig::with_cases(100))]

            /// Reverse mapping keeps owner claims, visibility and space.
            #[test]
            fn prop_round_trip_preserves_owner_visibility_space(
                owner in "[a-z]{1,10}",
                display_name in "[a-z][a-z0-9-]{0,15}",
                space in "[a-z0-9]{1,10}",
                jwt in arb_jwt(),
                visibility in arb_visibility(),
            ) {
                let mut source = internal(&owner, &display_name);
                source.spec.space = space.clone();
                source.spec.owner.jwt_info = jwt;
                source.spec.visibility = visibility;

                let view = match to_view(&source) {
                    Ok(view) => view,
                    Err(err) => {
                        prop_assert!(false, "derivation failed: {:?}", err);
                        return Ok(());
                    }
                };
                let back = match to_internal(&view) {
                    Ok(back) => back,
                    Err(err) => {
                        prop_assert!(false, "reverse mapping failed: {:?}", err);
                        return Ok(());
                    }
                };

                prop_assert_eq!(&back.spec.owner, &source.spec.owner);
                prop_assert_eq!(&back.spec.visibility, &source.spec.visibility);
                prop_assert_eq!(&back.spec.space, &space);
                prop_assert_eq!(&back.spec.display_name, &display_name);
                prop_assert_eq!(&back.status.owner.username, &owner);
            }
        }
    }
}
