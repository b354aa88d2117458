//! Secondary indexes keyed by extracted field values.
//!
//! An [`IndexStore`] maps `(index key, extracted value)` to the set of object
//! identities that produced that value. It keeps a reverse map per identity so
//! that re-indexing an object first retracts every value it previously
//! contributed; an object therefore never appears under a stale value.
//!
//! The store holds no lock of its own. Owners embed it in the same aggregate
//! as the objects it indexes and mutate both inside one critical section.

use std::any::Any;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;

use workspaces_core::{
    AccessGrant, InternalWorkspace, ObjectKey, ValidationError, Workspace, LABEL_GRANT_PRINCIPAL,
    LABEL_GRANT_SPACE,
};

// ============================================================================
// INDEX KEYS
// ============================================================================

pub const INDEX_DISPLAY_NAME: &str = "display-name";
pub const INDEX_VISIBILITY: &str = "visibility";
pub const INDEX_OWNER_USERNAME: &str = "owner.username";
pub const INDEX_OWNER_EMAIL: &str = "owner.email";
pub const INDEX_OWNER_SUB: &str = "owner.sub";
pub const INDEX_SPACE_NAME: &str = "space.name";

pub const INDEX_GRANT_PRINCIPAL: &str = LABEL_GRANT_PRINCIPAL;
pub const INDEX_GRANT_SPACE_LABEL: &str = LABEL_GRANT_SPACE;
pub const INDEX_GRANT_SPACE: &str = "spec.space";

/// Extracts zero or more index values from an object.
///
/// Indexers receive type-erased objects and must return no values for types
/// they do not understand.
pub type Indexer = Arc<dyn Fn(&dyn Any) -> Vec<String> + Send + Sync>;

/// Build an indexer over a single field of `T`.
pub fn single_field_indexer<T, F>(extract: F) -> Indexer
where
    T: Any,
    F: Fn(&T) -> String + Send + Sync + 'static,
{
    Arc::new(move |object: &dyn Any| match object.downcast_ref::<T>() {
        Some(typed) => vec![extract(typed)],
        None => Vec::new(),
    })
}

/// Build an indexer that may emit several values per object.
pub fn multi_value_indexer<T, F>(extract: F) -> Indexer
where
    T: Any,
    F: Fn(&T) -> Vec<String> + Send + Sync + 'static,
{
    Arc::new(move |object: &dyn Any| match object.downcast_ref::<T>() {
        Some(typed) => extract(typed),
        None => Vec::new(),
    })
}

// ============================================================================
// STANDARD INDEXER SETS
// ============================================================================

/// Indexers over internal workspaces, matching the field selectors accepted
/// by the control plane.
pub fn internal_workspace_indexers() -> Vec<(&'static str, Indexer)> {
    vec![
        (
            INDEX_DISPLAY_NAME,
            single_field_indexer(|w: &InternalWorkspace| w.spec.display_name.clone()),
        ),
        (
            INDEX_VISIBILITY,
            single_field_indexer(|w: &InternalWorkspace| w.spec.visibility.as_str().to_string()),
        ),
        (
            INDEX_OWNER_USERNAME,
            single_field_indexer(|w: &InternalWorkspace| w.status.owner.username.clone()),
        ),
        (
            INDEX_OWNER_EMAIL,
            single_field_indexer(|w: &InternalWorkspace| w.spec.owner.jwt_info.email.clone()),
        ),
        (
            INDEX_OWNER_SUB,
            single_field_indexer(|w: &InternalWorkspace| w.spec.owner.jwt_info.sub.clone()),
        ),
        (
            INDEX_SPACE_NAME,
            single_field_indexer(|w: &InternalWorkspace| w.space_name().to_string()),
        ),
    ]
}

pub fn access_grant_indexers() -> Vec<(&'static str, Indexer)> {
    vec![
        (
            INDEX_GRANT_PRINCIPAL,
            multi_value_indexer(|g: &AccessGrant| {
                g.principal_label().map(str::to_string).into_iter().collect()
            }),
        ),
        (
            INDEX_GRANT_SPACE_LABEL,
            multi_value_indexer(|g: &AccessGrant| {
                g.space_label().map(str::to_string).into_iter().collect()
            }),
        ),
        (
            INDEX_GRANT_SPACE,
            single_field_indexer(|g: &AccessGrant| g.spec.space.clone()),
        ),
    ]
}

/// Indexers over the derived public views held by the mirror cache.
pub fn workspace_view_indexers() -> Vec<(&'static str, Indexer)> {
    vec![
        (
            INDEX_VISIBILITY,
            single_field_indexer(|w: &Workspace| w.spec.visibility.as_str().to_string()),
        ),
        (
            INDEX_SPACE_NAME,
            multi_value_indexer(|w: &Workspace| {
                w.space_name().map(str::to_string).into_iter().collect()
            }),
        ),
        (
            INDEX_OWNER_USERNAME,
            single_field_indexer(|w: &Workspace| w.metadata.namespace.clone()),
        ),
    ]
}

// ============================================================================
// INDEX STORE
// ============================================================================

#[derive(Default)]
pub struct IndexStore {
    indexers: BTreeMap<String, Indexer>,
    /// index key -> value -> identities
    indices: HashMap<String, HashMap<String, BTreeSet<ObjectKey>>>,
    /// identity -> index key -> values it contributed
    entries: HashMap<ObjectKey, Vec<(String, String)>>,
}

impl fmt::Debug for IndexStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IndexStore")
            .field("index_keys", &self.indexers.keys().collect::<Vec<_>>())
            .field("objects", &self.entries.len())
            .finish()
    }
}

impl IndexStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store with a standard indexer set registered.
    pub fn with_indexers(indexers: Vec<(&'static str, Indexer)>) -> Self {
        let mut store = Self::new();
        for (key, indexer) in indexers {
            store.indexers.insert(key.to_string(), indexer);
        }
        store
    }

    /// Register an indexer under `key`, replacing any previous one.
    ///
    /// Indexes must be registered before objects are added; a populated store
    /// rejects new registrations.
    pub fn add_index(&mut self, key: impl Into<String>, indexer: Indexer) -> Result<(), ValidationError> {
        let key = key.into();
        if !self.entries.is_empty() {
            return Err(ValidationError::InvalidValue {
                field: "index".to_string(),
                reason: format!("cannot register index {} on a populated store", key),
            });
        }
        self.indexers.insert(key, indexer);
        Ok(())
    }

    /// Index `object` under `identity`, retracting whatever it contributed before.
    pub fn upsert(&mut self, identity: &ObjectKey, object: &dyn Any) {
        self.remove(identity);

        let mut contributed = Vec::new();
        for (key, indexer) in &self.indexers {
            let mut values = indexer(object);
            values.retain(|value| !value.is_empty());
            values.sort();
            values.dedup();
            for value in values {
                self.indices
                    .entry(key.clone())
                    .or_default()
                    .entry(value.clone())
                    .or_default()
                    .insert(identity.clone());
                contributed.push((key.clone(), value));
            }
        }

        self.entries.insert(identity.clone(), contributed);
    }

    /// Drop every entry of `identity`. Unknown identities are ignored.
    pub fn remove(&mut self, identity: &ObjectKey) {
        let Some(contributed) = self.entries.remove(identity) else {
            return;
        };

        for (key, value) in contributed {
            let Some(index) = self.indices.get_mut(&key) else {
                continue;
            };
            if let Some(identities) = index.get_mut(&value) {
                identities.remove(identity);
                if identities.is_empty() {
                    index.remove(&value);
                }
            }
        }
    }

    /// Identities indexed under `(key, value)`, in key order.
    pub fn lookup(&self, key: &str, value: &str) -> BTreeSet<ObjectKey> {
        self.indices
            .get(key)
            .and_then(|index| index.get(value))
            .cloned()
            .unwrap_or_default()
    }

    pub fn has_index(&self, key: &str) -> bool {
        self.indexers.contains_key(key)
    }

    /// Registered index keys, sorted.
    pub fn index_keys(&self) -> Vec<String> {
        self.indexers.keys().cloned().collect()
    }

    /// Number of indexed objects.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// =============================================================================
// TESTS
// =============================================================================
