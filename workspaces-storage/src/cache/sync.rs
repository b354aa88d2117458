//! Initial-sync barrier shared by the watch loops feeding one cache.

use tokio::sync::watch;

use workspaces_core::ResourceKind;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct SyncState {
    workspaces: bool,
    grants: bool,
}

impl SyncState {
    fn complete(&self) -> bool {
        self.workspaces && self.grants
    }
}

/// Opens once both the internal workspace and the access grant streams have
/// delivered their initial listing. Never closes again.
#[derive(Debug)]
pub struct SyncBarrier {
    tx: watch::Sender<SyncState>,
}

impl Default for SyncBarrier {
    fn default() -> Self {
        Self::new()
    }
}

impl SyncBarrier {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(SyncState::default());
        Self { tx }
    }

    /// Record that the stream for `kind` finished its initial listing.
    pub fn mark_synced(&self, kind: ResourceKind) {
        self.tx.send_if_modified(|state| {
            let flag = match kind {
                ResourceKind::InternalWorkspace => &mut state.workspaces,
                ResourceKind::AccessGrant => &mut state.grants,
                ResourceKind::Workspace => return false,
            };
            let changed = !*flag;
            *flag = true;
            changed
        });
    }

    pub fn is_synced(&self) -> bool {
        self.tx.borrow().complete()
    }

    /// Wait until every required stream has synced.
    pub async fn wait(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives as long as `self`, so the channel cannot close here.
        let _ = rx.wait_for(SyncState::complete).await;
    }
}
