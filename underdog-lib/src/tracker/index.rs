use ahash::AHashMap;
use tracing::debug;

use crate::tracker::arena::Slot;
use crate::tracker::digest::Digest;

/// Digest → slot lookup for every record on the active list.
#[derive(Debug, Default)]
pub struct DigestIndex {
    map: AHashMap<Digest, Slot>,
}

impl DigestIndex {
    pub fn with_capacity(capacity: usize) -> Self {
        Self { map: AHashMap::with_capacity(capacity) }
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn lookup(&self, digest: &Digest) -> Option<Slot> {
        self.map.get(digest).copied()
    }

    /// Indexes `digest` under `slot`. Inserting a digest already held by a different
    /// slot corrupts the store and panics.
    pub fn insert(&mut self, digest: Digest, slot: Slot) {
        if let Some(existing) = self.map.insert(digest, slot) {
            assert_eq!(existing, slot, "digest {digest} already indexed under another slot");
        }
        debug!(%digest, slot = slot.index(), "index entry added");
    }

    pub fn remove(&mut self, digest: &Digest) -> Option<Slot> {
        let removed = self.map.remove(digest);
        if removed.is_some() {
            debug!(%digest, "index entry removed");
        }
        removed
    }
}
