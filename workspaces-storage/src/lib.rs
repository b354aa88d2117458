//! Workspaces Storage - Control Plane Access and Derived-View Cache
//!
//! Everything that touches upstream state lives here:
//!
//! - [`ControlPlaneClient`]: async read/write API over internal workspaces and
//!   access grants, with [`InMemoryControlPlane`] as the process-local
//!   implementation.
//! - [`WatchSource`]: ordered event streams with an initial-sync marker.
//! - [`IndexStore`]: secondary indexes keyed by extracted field values.
//! - [`MirrorCache`]: watch-driven table of derived [`Workspace`] views.
//! - [`WorkspaceLister`]: community ∪ directly granted listing for a principal.
//!
//! [`Workspace`]: workspaces_core::Workspace

pub mod cache;
pub mod control_plane;
pub mod index;
pub mod list_query;
pub mod memory;
pub mod watch;

pub use cache::{run_mirror_sync, CacheRead, MirrorCache, MirrorChange, SyncBarrier, Watermark};
pub use control_plane::{ControlPlaneClient, ListOptions, Verb};
pub use index::{
    access_grant_indexers, internal_workspace_indexers, multi_value_indexer,
    single_field_indexer, workspace_view_indexers, IndexStore, Indexer, INDEX_DISPLAY_NAME,
    INDEX_GRANT_PRINCIPAL, INDEX_GRANT_SPACE, INDEX_GRANT_SPACE_LABEL, INDEX_OWNER_EMAIL,
    INDEX_OWNER_SUB, INDEX_OWNER_USERNAME, INDEX_SPACE_NAME, INDEX_VISIBILITY,
};
pub use list_query::WorkspaceLister;
pub use memory::InMemoryControlPlane;
pub use watch::{WatchEvent, WatchSource, WatchStream};
