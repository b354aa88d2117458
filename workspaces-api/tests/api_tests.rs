//! REST boundary tests driving the router with `oneshot`.

use std::sync::Arc;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use tower::ServiceExt;

use workspaces_api::{create_api_router, ApiConfig, ApiError, AppState, ErrorCode};
use workspaces_core::{ObjectKey, Workspace, WorkspaceList};
use workspaces_storage::{ControlPlaneClient, MirrorCache, INDEX_OWNER_USERNAME};
use workspaces_test_utils::fixtures::{access_grant, internal_workspace, seeded_control_plane};
use workspaces_test_utils::{
    InMemoryControlPlane, InternalWorkspace, ResourceKind, SpaceRole, Visibility,
    WorkspacesConfig, DEFAULT_WORKSPACES_NAMESPACE,
};

struct TestApp {
    router: Router,
    plane: Arc<InMemoryControlPlane>,
    cache: Arc<MirrorCache>,
}

/// App whose mirror cache holds `workspaces` but has not finished its
/// initial sync.
async fn unsynced_app(workspaces: &[InternalWorkspace]) -> TestApp {
    let plane = Arc::new(
        seeded_control_plane(workspaces)
            .await
            .expect("seeding should succeed"),
    );
    let cache = Arc::new(MirrorCache::new(DEFAULT_WORKSPACES_NAMESPACE));
    for workspace in workspaces {
        cache.on_upsert(workspace).expect("upsert should succeed");
    }

    let client: Arc<dyn ControlPlaneClient> = plane.clone();
    let state = AppState::new(
        Arc::clone(&cache),
        client,
        ApiConfig::default(),
        WorkspacesConfig::default(),
    );
    TestApp {
        router: create_api_router(state),
        plane,
        cache,
    }
}

fn get(uri: &str, principal: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().uri(uri).method("GET");
    if let Some(principal) = principal {
        builder = builder.header("X-Remote-User", principal);
    }
    builder.body(Body::empty()).expect("request should build")
}

fn with_json(method: &str, uri: &str, principal: &str, body: &serde_json::Value) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .method(method)
        .header("X-Remote-User", principal)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .expect("request should build")
}

async fn read_json<T: serde::de::DeserializeOwned>(response: axum::response::Response) -> T {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body should be readable");
    serde_json::from_slice(&body).expect("body should be valid JSON")
}

fn new_workspace_body(name: &str, owner: &str, visibility: &str) -> serde_json::Value {
    serde_json::json!({
        "metadata": { "name": name, "labels": { "team": "infra" } },
        "spec": {
            "visibility": visibility,
            "owner": {
                "jwtInfo": {
                    "email": format!("{}@example.com", owner),
                    "userId": format!("{}-id", owner),
                    "sub": format!("{}-sub", owner),
                }
            }
        }
    })
}

async fn test_app(workspaces: &[InternalWorkspace]) -> TestApp {
    let app = unsynced_app(workspaces).await;
    app.cache.mark_synced(ResourceKind::InternalWorkspace);
    app.cache.mark_synced(ResourceKind::AccessGrant);
    app
}

fn create_request(display_name: &str, owner: &str) -> Request<Body> {
    with_json(
        "POST",
        &format!("/apis/workspaces.io/v1alpha1/namespaces/{}/workspaces", owner),
        owner,
        &new_workspace_body(display_name, owner, "private"),
    )
}

// ============================================================================
// HEALTH
// ============================================================================

#[tokio::test]
async fn test_healthz_is_alive() {
    let app = test_app(&[]).await;
    let response = app
        .router
        .oneshot(get("/healthz", None))
        .await
        .expect("request should complete");
    assert_eq!(response.status(), StatusCode::OK);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body should be readable");
    assert_eq!(&body[..], b"alive");
}

#[tokio::test]
async fn test_readyz_waits_for_sync() {
    let app = unsynced_app(&[]).await;
    let response = app
        .router
        .clone()
        .oneshot(get("/readyz", None))
        .await
        .expect("request should complete");
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

    app.cache.mark_synced(ResourceKind::InternalWorkspace);
    app.cache.mark_synced(ResourceKind::AccessGrant);
    let response = app
        .router
        .oneshot(get("/readyz", None))
        .await
        .expect("request should complete");
    assert_eq!(response.status(), StatusCode::OK);
}

// ============================================================================
// READS
// ============================================================================

#[tokio::test]
async fn test_missing_principal_is_unauthorized() {
    let app = test_app(&[internal_workspace("sp1", "alice", Visibility::Community)]).await;
    let response = app
        .router
        .oneshot(get("/apis/workspaces.io/v1alpha1/workspaces", None))
        .await
        .expect("request should complete");
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let error: ApiError = read_json(response).await;
    assert_eq!(error.code, ErrorCode::MissingPrincipal);
}

#[tokio::test]
async fn test_get_returns_cached_view() {
    let app = test_app(&[internal_workspace("sp1", "alice", Visibility::Community)]).await;
    let response = app
        .router
        .oneshot(get(
            "/apis/workspaces.io/v1alpha1/namespaces/alice/workspaces/sp1",
            Some("bob"),
        ))
        .await
        .expect("request should complete");
    assert_eq!(response.status(), StatusCode::OK);

    let workspace: Workspace = read_json(response).await;
    assert_eq!(workspace.metadata.key(), ObjectKey::new("alice", "sp1"));
    assert_eq!(workspace.spec.visibility, Visibility::Community);
}

#[tokio::test]
async fn test_get_cache_miss_is_not_found() {
    let app = test_app(&[]).await;
    let response = app
        .router
        .oneshot(get(
            "/apis/workspaces.io/v1alpha1/namespaces/alice/workspaces/missing",
            Some("alice"),
        ))
        .await
        .expect("request should complete");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let error: ApiError = read_json(response).await;
    assert_eq!(error.code, ErrorCode::WorkspaceNotFound);
}

#[tokio::test]
async fn test_get_before_sync_is_unavailable() {
    let app = unsynced_app(&[]).await;
    app.plane
        .internal_workspace_create(&internal_workspace("sp1", "alice", Visibility::Private))
        .await
        .expect("create should succeed");

    let response = app
        .router
        .clone()
        .oneshot(get(
            "/apis/workspaces.io/v1alpha1/namespaces/alice/workspaces/sp1",
            Some("alice"),
        ))
        .await
        .expect("request should complete");
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let error: ApiError = read_json(response).await;
    assert_eq!(error.code, ErrorCode::CacheNotSynced);

    let source = app
        .plane
        .internal_workspace_get(&ObjectKey::new(DEFAULT_WORKSPACES_NAMESPACE, "sp1"))
        .await
        .expect("get should succeed")
        .expect("workspace should exist");
    app.cache.on_upsert(&source).expect("upsert should succeed");
    app.cache.mark_synced(ResourceKind::InternalWorkspace);
    app.cache.mark_synced(ResourceKind::AccessGrant);

    let response = app
        .router
        .oneshot(get(
            "/apis/workspaces.io/v1alpha1/namespaces/alice/workspaces/sp1",
            Some("alice"),
        ))
        .await
        .expect("request should complete");
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_unknown_path_is_not_found_without_principal() {
    let app = test_app(&[]).await;
    let response = app
        .router
        .oneshot(get("/apis/workspaces.io/v1alpha1/nothing", None))
        .await
        .expect("request should complete");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_list_returns_visible_items() {
    let app = test_app(&[
        internal_workspace("sp1", "carol", Visibility::Community),
        internal_workspace("sp2", "bob", Visibility::Private),
        internal_workspace("sp3", "dave", Visibility::Private),
    ])
    .await;
    app.plane
        .access_grant_create(&access_grant("g1", "sp2", "alice", SpaceRole::Contributor))
        .await
        .expect("grant should be created");

    let response = app
        .router
        .oneshot(get("/apis/workspaces.io/v1alpha1/workspaces", Some("alice")))
        .await
        .expect("request should complete");
    assert_eq!(response.status(), StatusCode::OK);

    let list: WorkspaceList = read_json(response).await;
    let mut keys: Vec<_> = list.items.iter().map(|w| w.metadata.key()).collect();
    keys.sort();
    assert_eq!(
        keys,
        vec![ObjectKey::new("bob", "sp2"), ObjectKey::new("carol", "sp1")]
    );
}

#[tokio::test]
async fn test_namespaced_list_filters_by_owner() {
    let app = test_app(&[
        internal_workspace("sp1", "carol", Visibility::Community),
        internal_workspace("sp2", "bob", Visibility::Community),
    ])
    .await;

    let response = app
        .router
        .oneshot(get(
            "/apis/workspaces.io/v1alpha1/namespaces/bob/workspaces",
            Some("alice"),
        ))
        .await
        .expect("request should complete");
    assert_eq!(response.status(), StatusCode::OK);

    let list: WorkspaceList = read_json(response).await;
    assert_eq!(list.items.len(), 1);
    assert_eq!(list.items[0].metadata.namespace, "bob");
}

#[tokio::test]
async fn test_list_upstream_failure_is_unavailable() {
    let app = test_app(&[internal_workspace("sp1", "carol", Visibility::Community)]).await;
    app.plane
        .fail_next(ResourceKind::AccessGrant, workspaces_storage::Verb::List);

    let response = app
        .router
        .oneshot(get("/apis/workspaces.io/v1alpha1/workspaces", Some("alice")))
        .await
        .expect("request should complete");
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

// ============================================================================
// WRITES
// ============================================================================

#[tokio::test]
async fn test_create_in_own_namespace() {
    let app = test_app(&[]).await;
    let response = app
        .router
        .oneshot(with_json(
            "POST",
            "/apis/workspaces.io/v1alpha1/namespaces/alice/workspaces",
            "alice",
            &new_workspace_body("team-a", "alice", "community"),
        ))
        .await
        .expect("request should complete");
    assert_eq!(response.status(), StatusCode::CREATED);

    let created: Workspace = read_json(response).await;
    assert_eq!(created.metadata.key(), ObjectKey::new("alice", "team-a"));
    assert_eq!(created.spec.visibility, Visibility::Community);
    assert_eq!(created.metadata.labels.get("team").map(String::as_str), Some("infra"));

    let stored = app
        .plane
        .internal_workspace_list(
            &workspaces_storage::ListOptions::new()
                .in_namespace(DEFAULT_WORKSPACES_NAMESPACE)
                .with_field(INDEX_OWNER_USERNAME, "alice"),
        )
        .await
        .expect("list should succeed");
    assert_eq!(stored.len(), 1);
    assert!(stored[0].metadata.name.starts_with("team-a-"));
    assert_eq!(stored[0].spec.display_name, "team-a");
}

#[tokio::test]
async fn test_create_in_other_namespace_is_forbidden() {
    let app = test_app(&[]).await;
    let response = app
        .router
        .oneshot(with_json(
            "POST",
            "/apis/workspaces.io/v1alpha1/namespaces/bob/workspaces",
            "alice",
            &new_workspace_body("team-a", "alice", "private"),
        ))
        .await
        .expect("request should complete");
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(app.plane.write_count(), 0);
}

#[tokio::test]
async fn test_create_rejects_unknown_visibility() {
    let app = test_app(&[]).await;
    let response = app
        .router
        .oneshot(with_json(
            "POST",
            "/apis/workspaces.io/v1alpha1/namespaces/alice/workspaces",
            "alice",
            &new_workspace_body("team-a", "alice", "public"),
        ))
        .await
        .expect("request should complete");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(app.plane.write_count(), 0);
}

#[tokio::test]
async fn test_update_applies_visibility_and_labels() {
    let mut source = internal_workspace("sp1", "alice", Visibility::Private);
    source.metadata.labels.insert(
        "internal.workspaces.konflux.io/owner".to_string(),
        "alice".to_string(),
    );
    let app = test_app(&[source]).await;

    let body = serde_json::json!({
        "metadata": { "name": "sp1", "namespace": "alice", "labels": { "tier": "gold" } },
        "spec": {
            "visibility": "community",
            "owner": { "jwtInfo": { "email": "alice@example.com", "userId": "alice-id", "sub": "alice-sub" } }
        }
    });
    let response = app
        .router
        .oneshot(with_json(
            "PUT",
            "/apis/workspaces.io/v1alpha1/namespaces/alice/workspaces/sp1",
            "alice",
            &body,
        ))
        .await
        .expect("request should complete");
    assert_eq!(response.status(), StatusCode::OK);

    let view: Workspace = read_json(response).await;
    assert_eq!(view.spec.visibility, Visibility::Community);
    assert_eq!(view.metadata.labels.get("tier").map(String::as_str), Some("gold"));

    let stored = app
        .plane
        .internal_workspace_get(&ObjectKey::new(DEFAULT_WORKSPACES_NAMESPACE, "sp1"))
        .await
        .expect("get should succeed")
        .expect("workspace should exist");
    assert_eq!(stored.spec.visibility, Visibility::Community);
    assert_eq!(
        stored
            .metadata
            .labels
            .get("internal.workspaces.konflux.io/owner")
            .map(String::as_str),
        Some("alice")
    );
}

#[tokio::test]
async fn test_update_missing_workspace_is_not_found() {
    let app = test_app(&[]).await;
    let response = app
        .router
        .oneshot(with_json(
            "PUT",
            "/apis/workspaces.io/v1alpha1/namespaces/alice/workspaces/sp1",
            "alice",
            &new_workspace_body("sp1", "alice", "community"),
        ))
        .await
        .expect("request should complete");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_create_duplicate_display_name_conflicts() {
    let app = test_app(&[]).await;
    let first = app
        .router
        .clone()
        .oneshot(create_request("team-a", "alice"))
        .await
        .expect("request should complete");
    assert_eq!(first.status(), StatusCode::CREATED);

    let second = app
        .router
        .clone()
        .oneshot(create_request("team-a", "alice"))
        .await
        .expect("request should complete");
    assert_eq!(second.status(), StatusCode::CONFLICT);
    let error: ApiError = read_json(second).await;
    assert_eq!(error.code, ErrorCode::AlreadyExists);
    assert_eq!(app.plane.write_count(), 1);

    // The identity stays unique, so updates keep resolving it.
    let response = app
        .router
        .oneshot(with_json(
            "PUT",
            "/apis/workspaces.io/v1alpha1/namespaces/alice/workspaces/team-a",
            "alice",
            &new_workspace_body("", "alice", "community"),
        ))
        .await
        .expect("request should complete");
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_same_display_name_for_other_owner_is_allowed() {
    let app = test_app(&[]).await;
    for owner in ["alice", "bob"] {
        let response = app
            .router
            .clone()
            .oneshot(create_request("team-a", owner))
            .await
            .expect("request should complete");
        assert_eq!(response.status(), StatusCode::CREATED, "{}", owner);
    }
}

#[tokio::test]
async fn test_rename_onto_taken_display_name_conflicts() {
    let app = test_app(&[
        internal_workspace("sp1", "alice", Visibility::Private),
        internal_workspace("sp2", "alice", Visibility::Private),
    ])
    .await;

    let response = app
        .router
        .oneshot(with_json(
            "PUT",
            "/apis/workspaces.io/v1alpha1/namespaces/alice/workspaces/sp1",
            "alice",
            &new_workspace_body("sp2", "alice", "private"),
        ))
        .await
        .expect("request should complete");
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let untouched = app
        .plane
        .internal_workspace_get(&ObjectKey::new(DEFAULT_WORKSPACES_NAMESPACE, "sp1"))
        .await
        .expect("get should succeed")
        .expect("workspace should exist");
    assert_eq!(untouched.spec.display_name, "sp1");
}
