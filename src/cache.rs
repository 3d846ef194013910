use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::{storage::KeyValueStore, Result, Snapshot, User};

/// Storage key of the last-known-good snapshot.
pub(crate) const CACHED_SNAPSHOT_KEY: &str = "gatekit.cached_snapshot";

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CacheEntry {
    #[serde(rename = "userID")]
    user_id: Option<String>,
    snapshot: Snapshot,
}

/// Persists the last successfully fetched [`Snapshot`] for cold-start availability.
///
/// There is only ever one cached snapshot. It is tagged with the user it was fetched for and is
/// only served back for that same user.
#[derive(Clone)]
pub(crate) struct SnapshotCache {
    store: Arc<dyn KeyValueStore>,
}

impl SnapshotCache {
    pub fn new(store: Arc<dyn KeyValueStore>) -> SnapshotCache {
        SnapshotCache { store }
    }

    /// Load the snapshot cached for `user`, if any.
    ///
    /// Unreadable or corrupt cache contents are logged and treated as an empty cache.
    pub fn load(&self, user: &User) -> Option<Snapshot> {
        let bytes = match self.store.get(CACHED_SNAPSHOT_KEY) {
            Ok(bytes) => bytes?,
            Err(err) => {
                log::warn!(target: "gatekit", "failed to read cached snapshot: {:?}", err);
                return None;
            }
        };

        let entry: CacheEntry = match serde_json::from_slice(&bytes) {
            Ok(entry) => entry,
            Err(err) => {
                log::warn!(target: "gatekit", "discarding corrupt cached snapshot: {:?}", err);
                self.clear();
                return None;
            }
        };

        if entry.user_id != user.user_id {
            log::debug!(target: "gatekit", "cached snapshot belongs to another user, ignoring it");
            return None;
        }
        Some(entry.snapshot)
    }

    pub fn save(&self, snapshot: &Snapshot, user: &User) -> Result<()> {
        let entry = CacheEntry {
            user_id: user.user_id.clone(),
            snapshot: snapshot.clone(),
        };
        let bytes = serde_json::to_vec(&entry)?;
        self.store.set(CACHED_SNAPSHOT_KEY, &bytes)
    }

    /// Remove the cached snapshot. Failures are logged and otherwise ignored.
    pub fn clear(&self) {
        if let Err(err) = self.store.remove(CACHED_SNAPSHOT_KEY) {
            log::warn!(target: "gatekit", "failed to clear cached snapshot: {:?}", err);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    #[test]
    fn load_returns_none_on_empty_store() {
        let cache = SnapshotCache::new(Arc::new(MemoryStore::new()));

        assert!(cache.load(&User::default()).is_none());
    }

    #[test]
    fn save_then_load_for_same_user() {
        let cache = SnapshotCache::new(Arc::new(MemoryStore::new()));
        let user = User::with_user_id("u1");
        let snapshot = Snapshot {
            has_updates: true,
            time: 42,
            ..Snapshot::default()
        };

        cache.save(&snapshot, &user).unwrap();

        let loaded = cache.load(&user.clone().email("new@example.com")).unwrap();
        assert!(loaded.has_updates);
        assert_eq!(loaded.time, 42);
    }

    #[test]
    fn snapshot_of_another_user_is_not_served() {
        let cache = SnapshotCache::new(Arc::new(MemoryStore::new()));
        cache
            .save(&Snapshot::default(), &User::with_user_id("u1"))
            .unwrap();

        assert!(cache.load(&User::with_user_id("u2")).is_none());
        assert!(cache.load(&User::default()).is_none());
    }

    #[test]
    fn clear_removes_snapshot() {
        let cache = SnapshotCache::new(Arc::new(MemoryStore::new()));
        let user = User::default();
        cache.save(&Snapshot::default(), &user).unwrap();

        cache.clear();

        assert!(cache.load(&user).is_none());
    }

    #[test]
    fn corrupt_snapshot_is_discarded() {
        let store = Arc::new(MemoryStore::new());
        store.set(CACHED_SNAPSHOT_KEY, b"{not json").unwrap();
        let cache = SnapshotCache::new(store.clone());

        assert!(cache.load(&User::default()).is_none());
        assert_eq!(store.get(CACHED_SNAPSHOT_KEY).unwrap(), None);
    }
}
