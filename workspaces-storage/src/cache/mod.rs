//! Watch-driven cache of derived workspace views.
//!
//! The cache never calls upstream: it is populated purely from watch events
//! and serves point lookups and listings from memory. Reads return copies, and
//! [`CacheRead<T>`] exposes how old an entry is and which cache watermark it
//! was read at.
//!
//! The cache only becomes authoritative once both watch streams delivered
//! their initial listing; see [`MirrorCache::wait_for_initial_sync`].
//!
//! # Example
//!
//! ```ignore
//! let cache = Arc::new(MirrorCache::new("workspaces-system"));
//! let (shutdown_tx, shutdown_rx) = watch::channel(false);
//! tokio::spawn(run_mirror_sync(Arc::clone(&cache), control_plane, shutdown_rx));
//!
//! cache.wait_for_initial_sync().await;
//! let view = cache.get(&ObjectKey::new("alice", "default"))?;
//! ```

pub mod mirror;
pub mod read;
pub mod sync;
pub mod watermark;

pub use mirror::{run_mirror_sync, MirrorCache, MirrorChange};
pub use read::CacheRead;
pub use sync::SyncBarrier;
pub use watermark::Watermark;
