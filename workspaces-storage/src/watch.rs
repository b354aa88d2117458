//! Watch notifications delivered by the control plane.

use futures_util::Stream;
use std::pin::Pin;

use workspaces_core::Resource;

/// A change observed on a watched resource collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchEvent<T> {
    /// The object was created or updated; carries the latest state.
    Applied(T),
    /// The object was deleted; carries its last known state.
    Deleted(T),
    /// Every object that existed when the stream (re)started has been
    /// delivered as [`WatchEvent::Applied`].
    Synced,
}

impl<T> WatchEvent<T> {
    pub fn object(&self) -> Option<&T> {
        match self {
            WatchEvent::Applied(object) | WatchEvent::Deleted(object) => Some(object),
            WatchEvent::Synced => None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            WatchEvent::Applied(_) => "applied",
            WatchEvent::Deleted(_) => "deleted",
            WatchEvent::Synced => "synced",
        }
    }
}

pub type WatchStream<T> = Pin<Box<dyn Stream<Item = WatchEvent<T>> + Send>>;

/// Source of watch events for one resource type.
///
/// A new stream first replays the current collection as `Applied` events,
/// then emits one `Synced` marker, then live changes. A consumer that falls
/// too far behind receives a fresh replay followed by another `Synced`.
pub trait WatchSource<T: Resource>: Send + Sync {
    fn watch(&self) -> WatchStream<T>;
}
