//! In-memory digest tracking: a fixed arena of packed records threaded onto a free
//! list and a recency-ordered active list, plus a digest index and expiry sweep.

mod arena;
mod clock;
mod digest;
mod expiry;
mod hash_tracker;
mod index;
mod layout;
mod slot_list;

use std::sync::{Arc, Mutex, MutexGuard};

pub use arena::{RecordArena, Slot};
pub use clock::{Clock, ManualClock, SystemClock, WrapClock};
pub use digest::{Digest, DigestError, DIGEST_LEN};
pub use expiry::ExpirySweeper;
pub use hash_tracker::{HashTracker, Outcome, TrackerStats};
pub use index::DigestIndex;
pub use layout::{bytes_required, Field, RecordLayout};
pub use slot_list::SlotList;

use crate::error::{Result, UnderdogError};

/// The single owner lock every mutation of a shard's tracker goes through.
pub type SharedTracker = Arc<Mutex<HashTracker>>;

pub fn shared(tracker: HashTracker) -> SharedTracker {
    Arc::new(Mutex::new(tracker))
}

/// Locks the tracker. A poisoned lock means an invariant check panicked mid-update,
/// so the store is no longer trusted.
pub fn lock(tracker: &SharedTracker) -> Result<MutexGuard<'_, HashTracker>> {
    tracker.lock().map_err(|_| UnderdogError::TrackerPoisoned)
}
