//! Stable and session identifiers attached to telemetry.
use uuid::Uuid;

use crate::storage::KeyValueStore;

/// Storage key of the persisted stable id.
pub(crate) const STABLE_ID_KEY: &str = "gatekit.stable_id";

/// Supplies stable-id and session-id strings.
///
/// The stable id identifies a device across sessions and is persisted in the provided store. The
/// session id is scoped to a single session (and rotated on every user update).
pub trait IdentityProvider: Send + Sync {
    /// Return the persisted stable id, creating and persisting a new one if there is none.
    fn stable_id(&self, store: &dyn KeyValueStore) -> String;
    /// Generate a new stable id and persist it, replacing the previous one.
    fn new_stable_id(&self, store: &dyn KeyValueStore) -> String;
    /// Generate a new session id.
    fn new_session_id(&self) -> String;
}

/// Default provider generating random RFC 4122 version 4 ids.
pub struct RandomIdentityProvider;

impl IdentityProvider for RandomIdentityProvider {
    fn stable_id(&self, store: &dyn KeyValueStore) -> String {
        match store.get(STABLE_ID_KEY) {
            Ok(Some(bytes)) => match String::from_utf8(bytes) {
                Ok(id) if !id.is_empty() => return id,
                _ => {
                    log::warn!(target: "gatekit", "persisted stable id is malformed, generating a new one");
                }
            },
            Ok(None) => {}
            Err(err) => {
                log::warn!(target: "gatekit", "failed to read stable id: {:?}", err);
            }
        }
        self.new_stable_id(store)
    }

    fn new_stable_id(&self, store: &dyn KeyValueStore) -> String {
        let id = random_id();
        if let Err(err) = store.set(STABLE_ID_KEY, id.as_bytes()) {
            // The id is still usable for this process, it just won't survive a restart.
            log::warn!(target: "gatekit", "failed to persist stable id: {:?}", err);
        }
        id
    }

    fn new_session_id(&self) -> String {
        random_id()
    }
}

/// Random version 4 UUID, hyphenated.
fn random_id() -> String {
    Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    #[test]
    fn random_id_is_uuid_v4_shaped() {
        let id = random_id();

        assert_eq!(id.len(), 36);
        let parts: Vec<&str> = id.split('-').collect();
        assert_eq!(
            parts.iter().map(|p| p.len()).collect::<Vec<_>>(),
            [8, 4, 4, 4, 12]
        );
        assert!(parts[2].starts_with('4'));
        assert!(matches!(&parts[3][..1], "8" | "9" | "a" | "b"));
        assert_eq!(Uuid::parse_str(&id).unwrap().get_version_num(), 4);
    }

    #[test]
    fn stable_id_is_persisted_and_reused() {
        let store = MemoryStore::new();

        let first = RandomIdentityProvider.stable_id(&store);
        let second = RandomIdentityProvider.stable_id(&store);

        assert_eq!(first, second);
        assert_eq!(store.get(STABLE_ID_KEY).unwrap(), Some(first.into_bytes()));
    }

    #[test]
    fn new_stable_id_replaces_persisted_one() {
        let store = MemoryStore::new();
        let first = RandomIdentityProvider.stable_id(&store);

        let rotated = RandomIdentityProvider.new_stable_id(&store);

        assert_ne!(first, rotated);
        assert_eq!(RandomIdentityProvider.stable_id(&store), rotated);
    }

    #[test]
    fn session_ids_are_unique() {
        assert_ne!(
            RandomIdentityProvider.new_session_id(),
            RandomIdentityProvider.new_session_id()
        );
    }
}
