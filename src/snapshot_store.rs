//! A thread-safe in-memory slot for the currently active [`Snapshot`].
use std::sync::{Arc, RwLock};

use crate::Snapshot;

/// `SnapshotStore` provides a thread-safe (`Sync`) slot for the active snapshot that allows
/// concurrent access for readers (lookups) and writers (fetch completion, user updates).
///
/// `Snapshot` itself is always immutable and can only be replaced completely, so a reader never
/// observes a partially-updated snapshot.
#[derive(Default)]
pub(crate) struct SnapshotStore {
    snapshot: RwLock<Option<Arc<Snapshot>>>,
}

impl SnapshotStore {
    pub fn new() -> Self {
        SnapshotStore::default()
    }

    /// Get currently-active snapshot. Returns `None` if there is no snapshot (not initialized yet
    /// or invalidated by a user update).
    pub fn get(&self) -> Option<Arc<Snapshot>> {
        // read() returns Err only if the lock is poisoned (writer panicked while holding the
        // lock), which should never happen.
        let snapshot = self
            .snapshot
            .read()
            .expect("thread holding snapshot lock should not panic");

        snapshot.clone()
    }

    /// Set new snapshot, returning the previous one.
    pub fn set(&self, snapshot: Arc<Snapshot>) -> Option<Arc<Snapshot>> {
        let mut slot = self
            .snapshot
            .write()
            .expect("thread holding snapshot lock should not panic");

        std::mem::replace(&mut *slot, Some(snapshot))
    }

    /// Drop the active snapshot.
    pub fn clear(&self) -> Option<Arc<Snapshot>> {
        let mut slot = self
            .snapshot
            .write()
            .expect("thread holding snapshot lock should not panic");

        slot.take()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::SnapshotStore;
    use crate::Snapshot;

    #[test]
    fn can_set_snapshot_from_another_thread() {
        let store = Arc::new(SnapshotStore::new());

        assert!(store.get().is_none());

        {
            let store = store.clone();
            let _ = std::thread::spawn(move || {
                store.set(Arc::new(Snapshot::default()));
            })
            .join();
        }

        assert!(store.get().is_some());
    }

    #[test]
    fn clear_returns_previous_snapshot() {
        let store = SnapshotStore::new();
        store.set(Arc::new(Snapshot::default()));

        assert!(store.clear().is_some());
        assert!(store.get().is_none());
        assert!(store.clear().is_none());
    }
}
