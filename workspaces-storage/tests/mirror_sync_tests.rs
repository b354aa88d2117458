//! End-to-end tests feeding the mirror cache from the in-memory control plane.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use workspaces_core::{
    AccessGrant, InternalWorkspace, ObjectKey, ObjectMeta, SpaceInfo, SpaceRole, Visibility,
    PUBLIC_VIEWER_NAME,
};
use workspaces_storage::{
    run_mirror_sync, ControlPlaneClient, InMemoryControlPlane, MirrorCache, WorkspaceLister,
    INDEX_VISIBILITY,
};

const NS: &str = "workspaces-system";

fn workspace(space: &str, owner: &str, visibility: Visibility) -> InternalWorkspace {
    let mut workspace = InternalWorkspace {
        metadata: ObjectMeta::new(NS, space),
        ..InternalWorkspace::default()
    };
    workspace.spec.display_name = space.to_string();
    workspace.spec.visibility = visibility;
    workspace.spec.space = space.to_string();
    workspace.status.owner.username = owner.to_string();
    workspace.status.space = Some(SpaceInfo {
        name: space.to_string(),
        is_home: false,
    });
    workspace
}

/// Poll `check` until it holds or a second elapses.
async fn eventually<F: Fn() -> bool>(check: F) -> bool {
    for _ in 0..100 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}

#[tokio::test]
async fn test_mirror_follows_control_plane() {
    let plane = Arc::new(InMemoryControlPlane::new());
    plane
        .internal_workspace_create(&workspace("sp1", "alice", Visibility::Private))
        .await
        .expect("create should succeed");

    let cache = Arc::new(MirrorCache::new(NS));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let sync = tokio::spawn(run_mirror_sync(
        Arc::clone(&cache),
        Arc::clone(&plane),
        shutdown_rx,
    ));

    tokio::time::timeout(Duration::from_secs(1), cache.wait_for_initial_sync())
        .await
        .expect("initial sync should complete");
    assert!(cache
        .get(&ObjectKey::new("alice", "sp1"))
        .expect("get should succeed")
        .is_some());

    let mut updated = plane
        .internal_workspace_get(&ObjectKey::new(NS, "sp1"))
        .await
        .expect("get should succeed")
        .expect("workspace should exist");
    updated.spec.visibility = Visibility::Community;
    plane
        .internal_workspace_update(&updated)
        .await
        .expect("update should succeed");

    assert!(
        eventually(|| {
            cache
                .lookup(INDEX_VISIBILITY, "community")
                .map(|found| found.len() == 1)
                .unwrap_or(false)
        })
        .await
    );

    plane
        .internal_workspace_delete(&ObjectKey::new(NS, "sp1"))
        .await
        .expect("delete should succeed");
    assert!(eventually(|| cache.is_empty().unwrap_or(false)).await);

    shutdown_tx.send(true).expect("shutdown should send");
    tokio::time::timeout(Duration::from_secs(1), sync)
        .await
        .expect("sync should stop")
        .expect("sync task should not panic");
}

#[tokio::test]
async fn test_grant_events_do_not_disturb_entries() {
    let plane = Arc::new(InMemoryControlPlane::new());
    plane
        .internal_workspace_create(&workspace("sp1", "alice", Visibility::Community))
        .await
        .expect("create should succeed");

    let cache = Arc::new(MirrorCache::new(NS));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let sync = tokio::spawn(run_mirror_sync(
        Arc::clone(&cache),
        Arc::clone(&plane),
        shutdown_rx,
    ));
    tokio::time::timeout(Duration::from_secs(1), cache.wait_for_initial_sync())
        .await
        .expect("initial sync should complete");
    let before = cache.watermark().expect("watermark should be readable");

    plane
        .access_grant_create(&AccessGrant::new(
            ObjectKey::new("toolchain-host-operator", "sp1-community"),
            "sp1",
            PUBLIC_VIEWER_NAME,
            SpaceRole::Viewer,
        ))
        .await
        .expect("create should succeed");
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(cache.len().expect("len should succeed"), 1);
    assert_eq!(
        cache.watermark().expect("watermark should be readable").sequence,
        before.sequence
    );

    shutdown_tx.send(true).expect("shutdown should send");
    sync.await.expect("sync task should not panic");
}

#[tokio::test]
async fn test_list_as_user_never_duplicates_spaces() {
    let plane = Arc::new(InMemoryControlPlane::new());
    for ws in [
        workspace("sp1", "carol", Visibility::Community),
        workspace("sp2", "bob", Visibility::Private),
        workspace("sp3", "dave", Visibility::Community),
    ] {
        plane
            .internal_workspace_create(&ws)
            .await
            .expect("create should succeed");
    }
    for (name, space) in [("g1", "sp1"), ("g2", "sp2"), ("g3", "sp2"), ("g4", "sp3")] {
        plane
            .access_grant_create(&AccessGrant::new(
                ObjectKey::new("toolchain-host-operator", name),
                space,
                "alice",
                SpaceRole::Contributor,
            ))
            .await
            .expect("create should succeed");
    }

    let lister = WorkspaceLister::new(plane.clone(), &Default::default());
    let result = lister
        .list_as_user("alice")
        .await
        .expect("list should succeed");

    let mut spaces: Vec<_> = result.iter().map(|w| w.space_name().to_string()).collect();
    let total = spaces.len();
    spaces.sort();
    spaces.dedup();
    assert_eq!(spaces.len(), total);
    assert_eq!(spaces, vec!["sp1", "sp2", "sp3"]);
}
