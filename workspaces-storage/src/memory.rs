//! In-memory control plane.
//!
//! Implements [`ControlPlaneClient`] and [`WatchSource`] for both resource
//! kinds over process-local state. Every successful write bumps a global
//! resource version and fans the change out to watchers over a
//! `tokio::sync::broadcast` channel, sent while the write lock is held so that
//! subscribers observe changes in commit order.
//!
//! Besides backing tests, it provides fault injection (`fail_next`), an
//! artificial list latency, and a write-call counter.

use async_trait::async_trait;
use futures_util::StreamExt;
use std::any::Any;
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{debug, warn};

use workspaces_core::{
    AccessGrant, InternalWorkspace, ObjectKey, Resource, ResourceKind, StorageError,
    ValidationError, WorkspacesError, WorkspacesResult, DEFAULT_WATCH_CAPACITY,
};

use crate::control_plane::{ControlPlaneClient, ListOptions, Verb};
use crate::index::{access_grant_indexers, internal_workspace_indexers, IndexStore};
use crate::watch::{WatchEvent, WatchSource, WatchStream};

// ============================================================================
// STATE
// ============================================================================

struct Collection<T> {
    objects: BTreeMap<ObjectKey, T>,
    indexes: IndexStore,
    tx: broadcast::Sender<WatchEvent<T>>,
}

impl<T: Clone> Collection<T> {
    fn new(indexes: IndexStore, capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity);
        Self {
            objects: BTreeMap::new(),
            indexes,
            tx,
        }
    }

    fn broadcast(&self, event: WatchEvent<T>) {
        let event_kind = event.kind();
        if self.tx.send(event).is_err() {
            debug!(event_kind, "No watchers for event");
        }
    }
}

struct ControlPlaneState {
    workspaces: Collection<InternalWorkspace>,
    grants: Collection<AccessGrant>,
    resource_version: u64,
}

/// Per-kind access to the shared state.
trait Stored: Resource + Any {
    fn collection(state: &ControlPlaneState) -> &Collection<Self>;

    fn collection_mut(state: &mut ControlPlaneState) -> &mut Collection<Self>;

    fn same_spec(&self, other: &Self) -> bool;
}

impl Stored for InternalWorkspace {
    fn collection(state: &ControlPlaneState) -> &Collection<Self> {
        &state.workspaces
    }

    fn collection_mut(state: &mut ControlPlaneState) -> &mut Collection<Self> {
        &mut state.workspaces
    }

    fn same_spec(&self, other: &Self) -> bool {
        self.spec == other.spec
    }
}

impl Stored for AccessGrant {
    fn collection(state: &ControlPlaneState) -> &Collection<Self> {
        &state.grants
    }

    fn collection_mut(state: &mut ControlPlaneState) -> &mut Collection<Self> {
        &mut state.grants
    }

    fn same_spec(&self, other: &Self) -> bool {
        self.spec == other.spec
    }
}

/// Injected failure for the first `(kind, verb)` call after `skip` matching calls.
#[derive(Debug, Clone, Copy)]
struct Fault {
    kind: ResourceKind,
    verb: Verb,
    skip: usize,
}

struct Inner {
    state: RwLock<ControlPlaneState>,
    faults: Mutex<VecDeque<Fault>>,
    list_delay: Mutex<Option<Duration>>,
    writes: AtomicU64,
}

// ============================================================================
// IN-MEMORY CONTROL PLANE
// ============================================================================

/// Process-local control plane holding internal workspaces and access grants.
#[derive(Clone)]
pub struct InMemoryControlPlane {
    inner: Arc<Inner>,
}

impl Default for InMemoryControlPlane {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for InMemoryControlPlane {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryControlPlane")
            .field("writes", &self.write_count())
            .finish()
    }
}

impl InMemoryControlPlane {
    pub fn new() -> Self {
        Self::with_watch_capacity(DEFAULT_WATCH_CAPACITY)
    }

    /// Create a control plane whose watchers buffer up to `capacity` events
    /// before lagging.
    pub fn with_watch_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let state = ControlPlaneState {
            workspaces: Collection::new(
                IndexStore::with_indexers(internal_workspace_indexers()),
                capacity,
            ),
            grants: Collection::new(IndexStore::with_indexers(access_grant_indexers()), capacity),
            resource_version: 0,
        };
        Self {
            inner: Arc::new(Inner {
                state: RwLock::new(state),
                faults: Mutex::new(VecDeque::new()),
                list_delay: Mutex::new(None),
                writes: AtomicU64::new(0),
            }),
        }
    }

    /// Make the next `verb` call on `kind` fail with `UpstreamUnavailable`.
    /// Queued faults are consumed in order.
    pub fn fail_next(&self, kind: ResourceKind, verb: Verb) {
        self.fail_after(kind, verb, 0);
    }

    /// Let `skip` matching calls through, then fail the next one.
    pub fn fail_after(&self, kind: ResourceKind, verb: Verb, skip: usize) {
        if let Ok(mut faults) = self.inner.faults.lock() {
            faults.push_back(Fault { kind, verb, skip });
        }
    }

    /// Delay every list call by `delay`.
    pub fn set_list_delay(&self, delay: Option<Duration>) {
        if let Ok(mut current) = self.inner.list_delay.lock() {
            *current = delay;
        }
    }

    /// Number of create/update/delete calls received, failed ones included.
    pub fn write_count(&self) -> u64 {
        self.inner.writes.load(Ordering::Relaxed)
    }

    /// Number of stored objects of each kind: (internal workspaces, grants).
    pub fn object_counts(&self) -> WorkspacesResult<(usize, usize)> {
        let state = self.read_state()?;
        Ok((state.workspaces.objects.len(), state.grants.objects.len()))
    }

    fn read_state(&self) -> WorkspacesResult<std::sync::RwLockReadGuard<'_, ControlPlaneState>> {
        self.inner
            .state
            .read()
            .map_err(|_| WorkspacesError::Storage(StorageError::LockPoisoned))
    }

    fn write_state(&self) -> WorkspacesResult<std::sync::RwLockWriteGuard<'_, ControlPlaneState>> {
        self.inner
            .state
            .write()
            .map_err(|_| WorkspacesError::Storage(StorageError::LockPoisoned))
    }

    fn check_fault(&self, kind: ResourceKind, verb: Verb) -> WorkspacesResult<()> {
        if verb.is_write() {
            self.inner.writes.fetch_add(1, Ordering::Relaxed);
        }

        let mut faults = self
            .inner
            .faults
            .lock()
            .map_err(|_| WorkspacesError::Storage(StorageError::LockPoisoned))?;
        let Some(position) = faults
            .iter()
            .position(|fault| fault.kind == kind && fault.verb == verb)
        else {
            return Ok(());
        };

        if let Some(fault) = faults.get_mut(position) {
            if fault.skip > 0 {
                fault.skip -= 1;
                return Ok(());
            }
        }
        faults.remove(position);
        Err(WorkspacesError::Storage(StorageError::UpstreamUnavailable {
            operation: format!("{} {}", verb, kind),
            reason: "injected fault".to_string(),
        }))
    }

    async fn apply_list_delay(&self) {
        let delay = self
            .inner
            .list_delay
            .lock()
            .ok()
            .and_then(|delay| *delay);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }

    // ========================================================================
    // GENERIC OPERATIONS
    // ========================================================================

    fn get<T: Stored>(&self, key: &ObjectKey) -> WorkspacesResult<Option<T>> {
        self.check_fault(T::KIND, Verb::Get)?;
        let state = self.read_state()?;
        Ok(T::collection(&state).objects.get(key).cloned())
    }

    async fn list<T: Stored>(&self, options: &ListOptions) -> WorkspacesResult<Vec<T>> {
        self.apply_list_delay().await;
        self.check_fault(T::KIND, Verb::List)?;

        let state = self.read_state()?;
        let collection = T::collection(&state);

        let mut candidates: Option<BTreeSet<ObjectKey>> = None;
        for (field, value) in &options.fields {
            if !collection.indexes.has_index(field) {
                return Err(WorkspacesError::Validation(ValidationError::InvalidValue {
                    field: field.clone(),
                    reason: format!("field selector is not indexed for {}", T::KIND),
                }));
            }
            let matched = collection.indexes.lookup(field, value);
            candidates = Some(match candidates {
                Some(current) => current.intersection(&matched).cloned().collect(),
                None => matched,
            });
        }

        let matches = |object: &T| {
            let meta = object.metadata();
            let namespace_ok = options
                .namespace
                .as_deref()
                .map_or(true, |namespace| meta.namespace == namespace);
            let labels_ok = options
                .labels
                .iter()
                .all(|(key, value)| meta.label(key) == Some(value.as_str()));
            namespace_ok && labels_ok
        };

        let items = match candidates {
            Some(keys) => keys
                .iter()
                .filter_map(|key| collection.objects.get(key))
                .filter(|object| matches(object))
                .cloned()
                .collect(),
            None => collection
                .objects
                .values()
                .filter(|object| matches(object))
                .cloned()
                .collect(),
        };
        Ok(items)
    }

    fn create<T: Stored>(&self, object: &T) -> WorkspacesResult<T> {
        self.check_fault(T::KIND, Verb::Create)?;
        let key = object.key();
        if key.name.is_empty() || key.namespace.is_empty() {
            return Err(WorkspacesError::Validation(ValidationError::InvalidValue {
                field: "metadata.name".to_string(),
                reason: format!("{} requires a namespace and a name", T::KIND),
            }));
        }

        let mut state = self.write_state()?;
        if T::collection(&state).objects.contains_key(&key) {
            return Err(WorkspacesError::Storage(StorageError::AlreadyExists {
                kind: T::KIND,
                key,
            }));
        }

        state.resource_version += 1;
        let resource_version = state.resource_version;

        let mut stored = object.clone();
        stored.metadata_mut().resource_version = resource_version;
        stored.metadata_mut().generation = 1;

        let collection = T::collection_mut(&mut state);
        collection.indexes.upsert(&key, &stored);
        collection.objects.insert(key.clone(), stored.clone());
        collection.broadcast(WatchEvent::Applied(stored.clone()));

        debug!(kind = %T::KIND, key = %key, resource_version, "Created object");
        Ok(stored)
    }

    fn update<T: Stored>(&self, object: &T) -> WorkspacesResult<T> {
        self.check_fault(T::KIND, Verb::Update)?;
        let key = object.key();

        let mut state = self.write_state()?;
        let (current_version, current_generation, spec_changed) =
            match T::collection(&state).objects.get(&key) {
                Some(current) => (
                    current.metadata().resource_version,
                    current.metadata().generation,
                    !current.same_spec(object),
                ),
                None => {
                    return Err(WorkspacesError::Storage(StorageError::NotFound {
                        kind: T::KIND,
                        key,
                    }))
                }
            };

        let expected = object.metadata().resource_version;
        if expected != 0 && expected != current_version {
            return Err(WorkspacesError::Storage(StorageError::Conflict {
                kind: T::KIND,
                key,
                expected,
                actual: current_version,
            }));
        }

        state.resource_version += 1;
        let resource_version = state.resource_version;

        let mut stored = object.clone();
        stored.metadata_mut().resource_version = resource_version;
        stored.metadata_mut().generation = if spec_changed {
            current_generation + 1
        } else {
            current_generation
        };

        let collection = T::collection_mut(&mut state);
        collection.indexes.upsert(&key, &stored);
        collection.objects.insert(key.clone(), stored.clone());
        collection.broadcast(WatchEvent::Applied(stored.clone()));

        debug!(kind = %T::KIND, key = %key, resource_version, "Updated object");
        Ok(stored)
    }

    fn delete<T: Stored>(&self, key: &ObjectKey) -> WorkspacesResult<()> {
        self.check_fault(T::KIND, Verb::Delete)?;

        let mut state = self.write_state()?;
        let collection = T::collection_mut(&mut state);
        let Some(removed) = collection.objects.remove(key) else {
            return Err(WorkspacesError::Storage(StorageError::NotFound {
                kind: T::KIND,
                key: key.clone(),
            }));
        };
        collection.indexes.remove(key);
        collection.broadcast(WatchEvent::Deleted(removed));

        debug!(kind = %T::KIND, key = %key, "Deleted object");
        Ok(())
    }

    // ========================================================================
    // WATCH
    // ========================================================================

    /// Snapshot the collection and subscribe to changes under one read lock,
    /// so no change falls between the two.
    fn snapshot<T: Stored>(
        &self,
    ) -> WorkspacesResult<(BTreeMap<ObjectKey, T>, broadcast::Receiver<WatchEvent<T>>)> {
        let state = self.read_state()?;
        let collection = T::collection(&state);
        Ok((collection.objects.clone(), collection.tx.subscribe()))
    }

    fn watch_stream<T: Stored>(&self) -> WatchStream<T> {
        let cursor = match self.snapshot::<T>() {
            Ok((objects, rx)) => Some(WatchCursor::start(self.clone(), objects, rx)),
            Err(err) => {
                warn!(kind = %T::KIND, error = %err, "Failed to start watch");
                None
            }
        };

        let stream = futures_util::stream::unfold(cursor, |cursor| async move {
            let mut cursor = cursor?;
            let event = cursor.next_event().await?;
            Some((event, Some(cursor)))
        });
        Box::pin(stream)
    }
}

/// Position of one watcher: replay queue, live subscription, and the last
/// state it delivered for every object it believes exists.
struct WatchCursor<T: Stored> {
    plane: InMemoryControlPlane,
    pending: VecDeque<WatchEvent<T>>,
    live: BroadcastStream<WatchEvent<T>>,
    known: BTreeMap<ObjectKey, T>,
}

impl<T: Stored> WatchCursor<T> {
    fn start(
        plane: InMemoryControlPlane,
        objects: BTreeMap<ObjectKey, T>,
        rx: broadcast::Receiver<WatchEvent<T>>,
    ) -> Self {
        let mut pending: VecDeque<WatchEvent<T>> =
            objects.values().cloned().map(WatchEvent::Applied).collect();
        pending.push_back(WatchEvent::Synced);
        Self {
            plane,
            pending,
            live: BroadcastStream::new(rx),
            known: objects,
        }
    }

    async fn next_event(&mut self) -> Option<WatchEvent<T>> {
        loop {
            if let Some(event) = self.pending.pop_front() {
                return Some(event);
            }

            match self.live.next().await? {
                Ok(event) => {
                    match &event {
                        WatchEvent::Applied(object) => {
                            self.known.insert(object.key(), object.clone());
                        }
                        WatchEvent::Deleted(object) => {
                            self.known.remove(&object.key());
                        }
                        WatchEvent::Synced => {}
                    }
                    return Some(event);
                }
                Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                    warn!(kind = %T::KIND, skipped, "Watcher lagged, relisting");
                    if let Err(err) = self.relist() {
                        warn!(kind = %T::KIND, error = %err, "Relist failed, closing watch");
                        return None;
                    }
                }
            }
        }
    }

    /// Replace the subscription and queue a replay: deletions for objects
    /// that vanished while lagging, the full current collection, then a new
    /// sync marker.
    fn relist(&mut self) -> WorkspacesResult<()> {
        let (objects, rx) = self.plane.snapshot::<T>()?;

        let vanished: Vec<T> = self
            .known
            .iter()
            .filter(|(key, _)| !objects.contains_key(*key))
            .map(|(_, object)| object.clone())
            .collect();

        self.pending = vanished.into_iter().map(WatchEvent::Deleted).collect();
        self.pending
            .extend(objects.values().cloned().map(WatchEvent::Applied));
        self.pending.push_back(WatchEvent::Synced);
        self.live = BroadcastStream::new(rx);
        self.known = objects;
        Ok(())
    }
}

impl WatchSource<InternalWorkspace> for InMemoryControlPlane {
    fn watch(&self) -> WatchStream<InternalWorkspace> {
        self.watch_stream()
    }
}

impl WatchSource<AccessGrant> for InMemoryControlPlane {
    fn watch(&self) -> WatchStream<AccessGrant> {
        self.watch_stream()
    }
}

#[async_trait]
impl ControlPlaneClient for InMemoryControlPlane {
    async fn internal_workspace_get(
        &self,
        key: &ObjectKey,
    ) -> WorkspacesResult<Option<InternalWorkspace>> {
        self.get(key)
    }

    async fn internal_workspace_list(
        &self,
        options: &ListOptions,
    ) -> WorkspacesResult<Vec<InternalWorkspace>> {
        self.list(options).await
    }

    async fn internal_workspace_create(
        &self,
        workspace: &InternalWorkspace,
    ) -> WorkspacesResult<InternalWorkspace> {
        self.create(workspace)
    }

    async fn internal_workspace_update(
        &self,
        workspace: &InternalWorkspace,
    ) -> WorkspacesResult<InternalWorkspace> {
        self.update(workspace)
    }

    async fn internal_workspace_delete(&self, key: &ObjectKey) -> WorkspacesResult<()> {
        self.delete::<InternalWorkspace>(key)
    }

    async fn access_grant_get(&self, key: &ObjectKey) -> WorkspacesResult<Option<AccessGrant>> {
        self.get(key)
    }

    async fn access_grant_list(&self, options: &ListOptions) -> WorkspacesResult<Vec<AccessGrant>> {
        self.list(options).await
    }

    async fn access_grant_create(&self, grant: &AccessGrant) -> WorkspacesResult<AccessGrant> {
        self.create(grant)
    }

    async fn access_grant_update(&self, grant: &AccessGrant) -> WorkspacesResult<AccessGrant> {
        self.update(grant)
    }

    async fn access_grant_delete(&self, key: &ObjectKey) -> WorkspacesResult<()> {
        self.delete::<AccessGrant>(key)
    }
}

// =============================================================================
// TESTS
// =============================================================================
