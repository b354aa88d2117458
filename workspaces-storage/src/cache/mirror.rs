//! Watch-driven mirror of derived workspace views.
//!
//! The mirror consumes internal workspace and access grant watch events and
//! keeps a table of [`Workspace`] views keyed by `(owner, display name)`.
//! All state lives in one aggregate behind a `std::sync::RwLock`; each event
//! is applied inside a single write critical section, so readers observe
//! either the state before an event or the state after it, never a mix.
//! The lock is never held across an `.await`.

use chrono::{DateTime, Utc};
use futures_util::StreamExt;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use workspaces_core::{
    to_view, AccessGrant, InternalWorkspace, ObjectKey, Resource, ResourceKind, StorageError,
    Workspace, WorkspacesError, WorkspacesResult, DEFAULT_WORKSPACES_NAMESPACE,
};

use super::read::CacheRead;
use super::sync::SyncBarrier;
use super::watermark::Watermark;
use crate::index::{workspace_view_indexers, IndexStore};
use crate::watch::{WatchEvent, WatchSource, WatchStream};

// ============================================================================
// STATE
// ============================================================================

#[derive(Debug, Clone)]
struct MirrorEntry {
    view: Workspace,
    /// Internal workspace the view was derived from.
    source: ObjectKey,
    generation: u64,
    cached_at: DateTime<Utc>,
}

/// A source whose view key is held by another source.
#[derive(Debug, Clone)]
struct DisplacedSource {
    source: InternalWorkspace,
    view: Workspace,
}

#[derive(Debug)]
struct MirrorState {
    entries: BTreeMap<ObjectKey, MirrorEntry>,
    /// source key -> view key, for sources that own an entry
    by_source: HashMap<ObjectKey, ObjectKey>,
    /// Last seen state of every source that owns an entry.
    sources: HashMap<ObjectKey, InternalWorkspace>,
    /// Sources that lost their view key to another source, restored when the
    /// key is freed.
    displaced: BTreeMap<ObjectKey, DisplacedSource>,
    indexes: IndexStore,
    watermark: Watermark,
}

impl MirrorState {
    fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
            by_source: HashMap::new(),
            sources: HashMap::new(),
            displaced: BTreeMap::new(),
            indexes: IndexStore::with_indexers(workspace_view_indexers()),
            watermark: Watermark::zero(),
        }
    }

    /// Forget `source`. Returns the view key it freed and that entry's
    /// generation, if it owned one.
    fn remove_source(&mut self, source: &ObjectKey) -> Option<(ObjectKey, u64)> {
        self.sources.remove(source);
        self.displaced.remove(source);
        let view_key = self.by_source.remove(source)?;
        match self.entries.get(&view_key) {
            Some(entry) if entry.source == *source => {
                let generation = entry.generation;
                self.entries.remove(&view_key);
                self.indexes.remove(&view_key);
                Some((view_key, generation))
            }
            _ => None,
        }
    }

    /// Store `view` derived from `source`, displacing any other source that
    /// holds the same view key.
    fn apply_upsert(&mut self, source: &InternalWorkspace, view: Workspace) -> MirrorChange {
        let source_key = source.key();
        let view_key = view.key();
        self.displaced.remove(&source_key);

        let existing = self
            .entries
            .get(&view_key)
            .map(|entry| (entry.source.clone(), entry.view.clone()));
        if let Some((existing_source, existing_view)) = existing {
            if existing_source == source_key && existing_view == view {
                self.sources.insert(source_key, source.clone());
                return MirrorChange::Unchanged;
            }
            if existing_source != source_key {
                warn!(
                    view = %view_key,
                    previous_source = %existing_source,
                    source = %source_key,
                    "Workspace view claimed by a different source"
                );
                self.by_source.remove(&existing_source);
                if let Some(previous) = self.sources.remove(&existing_source) {
                    self.displaced.insert(
                        existing_source,
                        DisplacedSource {
                            source: previous,
                            view: existing_view,
                        },
                    );
                }
            }
        }

        let freed = self.remove_source(&source_key);
        let previous_generation = freed.as_ref().map_or(0, |(_, generation)| *generation);
        let replaced_generation = self
            .entries
            .get(&view_key)
            .map_or(0, |entry| entry.generation);
        let generation = previous_generation.max(replaced_generation) + 1;

        self.indexes.upsert(&view_key, &view);
        self.entries.insert(
            view_key.clone(),
            MirrorEntry {
                view,
                source: source_key.clone(),
                generation,
                cached_at: Utc::now(),
            },
        );
        self.by_source.insert(source_key.clone(), view_key.clone());
        self.sources.insert(source_key.clone(), source.clone());
        self.watermark = self.watermark.next();
        debug!(source = %source_key, view = %view_key, generation, "Mirrored workspace");

        if let Some((freed_key, _)) = freed {
            if freed_key != view_key {
                self.restore_displaced(&freed_key);
            }
        }
        MirrorChange::Upserted
    }

    /// Hand a freed view key to the first displaced source that derives it.
    fn restore_displaced(&mut self, view_key: &ObjectKey) {
        let candidate = self
            .displaced
            .iter()
            .find(|(_, displaced)| displaced.view.key() == *view_key)
            .map(|(source_key, _)| source_key.clone());
        let Some(displaced) = candidate.and_then(|key| self.displaced.remove(&key)) else {
            return;
        };
        info!(view = %view_key, source = %displaced.source.key(), "Restoring displaced workspace view");
        self.apply_upsert(&displaced.source, displaced.view);
    }
}

/// Outcome of applying one event to the mirror.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MirrorChange {
    /// An entry was inserted or replaced.
    Upserted,
    /// An entry was removed.
    Removed,
    /// The derived view already matched the stored one.
    Unchanged,
    /// The event did not affect the mirror.
    Ignored,
}

// ============================================================================
// MIRROR CACHE
// ============================================================================

/// In-memory table of workspace views, kept in step with upstream by watch
/// events. Point reads never touch the network.
#[derive(Debug)]
pub struct MirrorCache {
    state: RwLock<MirrorState>,
    sync: SyncBarrier,
    /// Namespace holding internal workspaces; grants map into it.
    workspaces_namespace: String,
}

impl Default for MirrorCache {
    fn default() -> Self {
        Self::new(DEFAULT_WORKSPACES_NAMESPACE)
    }
}

impl MirrorCache {
    pub fn new(workspaces_namespace: impl Into<String>) -> Self {
        Self {
            state: RwLock::new(MirrorState::new()),
            sync: SyncBarrier::new(),
            workspaces_namespace: workspaces_namespace.into(),
        }
    }

    fn read_state(&self) -> WorkspacesResult<RwLockReadGuard<'_, MirrorState>> {
        self.state
            .read()
            .map_err(|_| WorkspacesError::Storage(StorageError::LockPoisoned))
    }

    fn write_state(&self) -> WorkspacesResult<RwLockWriteGuard<'_, MirrorState>> {
        self.state
            .write()
            .map_err(|_| WorkspacesError::Storage(StorageError::LockPoisoned))
    }

    // ========================================================================
    // READS
    // ========================================================================

    /// Copy of the view stored under `key`, or `None` if absent.
    pub fn get(&self, key: &ObjectKey) -> WorkspacesResult<Option<Workspace>> {
        let state = self.read_state()?;
        Ok(state.entries.get(key).map(|entry| entry.view.clone()))
    }

    /// Like [`MirrorCache::get`], with staleness metadata attached.
    pub fn get_read(&self, key: &ObjectKey) -> WorkspacesResult<Option<CacheRead<Workspace>>> {
        let state = self.read_state()?;
        Ok(state.entries.get(key).map(|entry| {
            CacheRead::new(
                entry.view.clone(),
                entry.cached_at,
                entry.generation,
                state.watermark,
            )
        }))
    }

    /// Copies of all views, optionally restricted to one namespace, in key order.
    pub fn list(&self, namespace: Option<&str>) -> WorkspacesResult<Vec<Workspace>> {
        let state = self.read_state()?;
        Ok(state
            .entries
            .values()
            .filter(|entry| namespace.map_or(true, |ns| entry.view.metadata.namespace == ns))
            .map(|entry| entry.view.clone())
            .collect())
    }

    /// Copies of the views indexed under `(index, value)`, in key order.
    pub fn lookup(&self, index: &str, value: &str) -> WorkspacesResult<Vec<Workspace>> {
        let state = self.read_state()?;
        Ok(state
            .indexes
            .lookup(index, value)
            .iter()
            .filter_map(|key| state.entries.get(key))
            .map(|entry| entry.view.clone())
            .collect())
    }

    pub fn watermark(&self) -> WorkspacesResult<Watermark> {
        Ok(self.read_state()?.watermark)
    }

    pub fn len(&self) -> WorkspacesResult<usize> {
        Ok(self.read_state()?.entries.len())
    }

    pub fn is_empty(&self) -> WorkspacesResult<bool> {
        Ok(self.read_state()?.entries.is_empty())
    }

    // ========================================================================
    // EVENTS
    // ========================================================================

    /// Apply a created or updated internal workspace.
    ///
    /// A source that cannot be mapped to a view is logged and dropped; any
    /// entry it produced earlier stays in place.
    pub fn on_upsert(&self, source: &InternalWorkspace) -> WorkspacesResult<MirrorChange> {
        let view = match to_view(source) {
            Ok(view) => view,
            Err(err) => {
                warn!(source = %source.key(), error = %err, "Dropping unmappable workspace");
                return Ok(MirrorChange::Ignored);
            }
        };

        let mut state = self.write_state()?;
        Ok(state.apply_upsert(source, view))
    }

    /// Remove the view derived from the internal workspace `source`. Idempotent.
    ///
    /// If another source was displaced from the freed view key, it takes the
    /// key back.
    pub fn on_delete(&self, source: &ObjectKey) -> WorkspacesResult<MirrorChange> {
        let mut state = self.write_state()?;
        match state.remove_source(source) {
            Some((view_key, _)) => {
                state.watermark = state.watermark.next();
                debug!(source = %source, "Removed mirrored workspace");
                state.restore_displaced(&view_key);
                Ok(MirrorChange::Removed)
            }
            None => Ok(MirrorChange::Ignored),
        }
    }

    /// Re-derive the workspace a grant points at from its last seen source.
    ///
    /// Lookup and re-derivation share one write critical section, so a
    /// concurrent delete or newer upsert is never overwritten by a stale copy.
    /// Displaced sources are not touched.
    pub fn on_grant_event(&self, grant: &AccessGrant) -> WorkspacesResult<MirrorChange> {
        let Some(space) = grant.space_label() else {
            debug!(grant = %grant.key(), "Grant without space label");
            return Ok(MirrorChange::Ignored);
        };

        let source_key = ObjectKey::new(self.workspaces_namespace.clone(), space);
        let mut state = self.write_state()?;
        let Some(source) = state.sources.get(&source_key).cloned() else {
            debug!(grant = %grant.key(), space, "Grant for unknown workspace");
            return Ok(MirrorChange::Ignored);
        };
        match to_view(&source) {
            Ok(view) => Ok(state.apply_upsert(&source, view)),
            Err(err) => {
                warn!(source = %source_key, error = %err, "Dropping unmappable workspace");
                Ok(MirrorChange::Ignored)
            }
        }
    }

    /// Apply one watch event for internal workspaces.
    pub fn apply_workspace_event(
        &self,
        event: WatchEvent<InternalWorkspace>,
    ) -> WorkspacesResult<MirrorChange> {
        match event {
            WatchEvent::Applied(source) => self.on_upsert(&source),
            WatchEvent::Deleted(source) => self.on_delete(&source.key()),
            WatchEvent::Synced => {
                self.mark_synced(ResourceKind::InternalWorkspace);
                Ok(MirrorChange::Ignored)
            }
        }
    }

    /// Apply one watch event for access grants.
    pub fn apply_grant_event(&self, event: WatchEvent<AccessGrant>) -> WorkspacesResult<MirrorChange> {
        match event {
            WatchEvent::Applied(grant) | WatchEvent::Deleted(grant) => self.on_grant_event(&grant),
            WatchEvent::Synced => {
                self.mark_synced(ResourceKind::AccessGrant);
                Ok(MirrorChange::Ignored)
            }
        }
    }

    // ========================================================================
    // INITIAL SYNC
    // ========================================================================

    pub fn mark_synced(&self, kind: ResourceKind) {
        self.sync.mark_synced(kind);
    }

    /// Whether both watch streams delivered their initial listing.
    pub fn is_synced(&self) -> bool {
        self.sync.is_synced()
    }

    /// Wait until the mirror is authoritative.
    pub async fn wait_for_initial_sync(&self) {
        self.sync.wait().await;
    }
}

// ============================================================================
// SYNC LOOP
// ============================================================================

/// Feed `cache` from `source` until shutdown is signalled or both streams end.
///
/// Internal workspace and access grant events are consumed by two tasks
/// running concurrently; each applies its events serially.
pub async fn run_mirror_sync<S>(
    cache: Arc<MirrorCache>,
    source: Arc<S>,
    shutdown_rx: watch::Receiver<bool>,
) where
    S: WatchSource<InternalWorkspace> + WatchSource<AccessGrant> + 'static,
{
    let workspace_stream = <S as WatchSource<InternalWorkspace>>::watch(&source);
    let grant_stream = <S as WatchSource<AccessGrant>>::watch(&source);

    info!("Mirror sync started");

    let workspaces = {
        let cache = Arc::clone(&cache);
        tokio::spawn(drive(
            ResourceKind::InternalWorkspace,
            workspace_stream,
            shutdown_rx.clone(),
            move |event| cache.apply_workspace_event(event),
        ))
    };
    let grants = {
        let cache = Arc::clone(&cache);
        tokio::spawn(drive(
            ResourceKind::AccessGrant,
            grant_stream,
            shutdown_rx,
            move |event| cache.apply_grant_event(event),
        ))
    };

    for (kind, handle) in [
        (ResourceKind::InternalWorkspace, workspaces),
        (ResourceKind::AccessGrant, grants),
    ] {
        if let Err(err) = handle.await {
            warn!(kind = %kind, error = %err, "Mirror sync task failed");
        }
    }

    info!("Mirror sync stopped");
}

async fn drive<T, F>(
    kind: ResourceKind,
    mut stream: WatchStream<T>,
    mut shutdown_rx: watch::Receiver<bool>,
    apply: F,
) where
    T: Resource,
    F: Fn(WatchEvent<T>) -> WorkspacesResult<MirrorChange> + Send + 'static,
{
    if *shutdown_rx.borrow() {
        return;
    }

    loop {
        tokio::select! {
            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    debug!(kind = %kind, "Mirror sync loop shutting down");
                    break;
                }
            }

            event = stream.next() => {
                let Some(event) = event else {
                    warn!(kind = %kind, "Watch stream closed");
                    break;
                };
                if let Err(err) = apply(event) {
                    warn!(kind = %kind, error = %err, "Failed to apply watch event");
                }
            }
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
