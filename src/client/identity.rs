use log::warn;

use crate::error::StoreError;
use crate::store::EntityStore;
use crate::types::{Bit, BitId};

/// Where a client remembers which bit is its own between sessions.
pub trait IdentityStore {
    fn load(&self) -> Option<BitId>;
    fn save(&mut self, id: &str);
}

#[derive(Clone, Debug, Default)]
pub struct MemoryIdentityStore {
    id: Option<BitId>,
}

impl MemoryIdentityStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl IdentityStore for MemoryIdentityStore {
    fn load(&self) -> Option<BitId> {
        self.id.clone()
    }

    fn save(&mut self, id: &str) {
        self.id = Some(id.to_string());
    }
}

/// Loads the remembered bit, or creates and remembers a new one.
///
/// A remembered id that the store no longer knows is replaced.
pub fn create_or_load_player_bit(
    store: &dyn EntityStore,
    identity: &mut dyn IdentityStore,
) -> Result<Bit, StoreError> {
    if let Some(id) = identity.load() {
        match store.get(&id) {
            Ok(bit) => return Ok(bit),
            Err(StoreError::NotFound(_)) => {
                warn!("[client] stored bit {id} no longer exists; creating a new one");
            }
            Err(error) => return Err(error),
        }
    }
    let bit = store.create(None, None)?;
    identity.save(&bit.id);
    Ok(bit)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryBitStore;

    #[test]
    fn first_visit_creates_and_remembers() {
        let store = MemoryBitStore::new();
        let mut identity = MemoryIdentityStore::new();

        let created = create_or_load_player_bit(&store, &mut identity).expect("create");
        assert_eq!(identity.load(), Some(created.id.clone()));

        let fetched = store.get(&created.id).expect("stored");
        assert_eq!((fetched.id, fetched.x, fetched.y), (created.id, created.x, created.y));
    }

    #[test]
    fn returning_visit_loads_same_bit() {
        let store = MemoryBitStore::new();
        let mut identity = MemoryIdentityStore::new();
        let first = create_or_load_player_bit(&store, &mut identity).expect("create");
        store.update(&first.id, 50, 60).expect("update");

        let second = create_or_load_player_bit(&store, &mut identity).expect("load");
        assert_eq!(second.id, first.id);
        assert_eq!((second.x, second.y), (50, 60));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn stale_identity_is_replaced() {
        let store = MemoryBitStore::new();
        let mut identity = MemoryIdentityStore::new();
        identity.save("deleted-long-ago");

        let bit = create_or_load_player_bit(&store, &mut identity).expect("create");
        assert_ne!(bit.id, "deleted-long-ago");
        assert_eq!(identity.load(), Some(bit.id));
    }
}
