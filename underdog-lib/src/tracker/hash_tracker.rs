use std::sync::Arc;

use tracing::debug;

use crate::config::CacheConfig;
use crate::error::{Result, UnderdogError};
use crate::tracker::arena::{RecordArena, Slot};
use crate::tracker::clock::{Clock, SystemClock, WrapClock};
use crate::tracker::digest::Digest;
use crate::tracker::index::DigestIndex;
use crate::tracker::layout::RecordLayout;
use crate::tracker::slot_list::SlotList;

/// Result of recording one sighting of a digest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The sighting was counted.
    Allowed {
        /// Sightings so far, including this one
        count: u64,
    },
    /// The digest reached `max_count`; the sighting was not counted.
    Blocked {
        /// Epoch second after which the record may have expired
        retry_at: u64,
    },
}

impl Outcome {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Outcome::Allowed { .. })
    }

    pub fn is_blocked(&self) -> bool {
        matches!(self, Outcome::Blocked { .. })
    }

    pub fn count(&self) -> Option<u64> {
        match self {
            Outcome::Allowed { count } => Some(*count),
            Outcome::Blocked { .. } => None,
        }
    }

    pub fn retry_at(&self) -> Option<u64> {
        match self {
            Outcome::Blocked { retry_at } => Some(*retry_at),
            Outcome::Allowed { .. } => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TrackerStats {
    /// Records on the active list
    pub active: usize,
    /// Slots on the free list
    pub free: usize,
    /// Unexpired records dropped to make room for new digests
    pub evicted: u64,
    /// Records released by the expiry sweep
    pub expired: u64,
}

/// Fixed-capacity, recency-ordered record of digest sightings.
///
/// Every slot of the arena is on exactly one of two lists: `free` or `active`. The
/// active list runs from the most recently touched record (head) to the least
/// recently touched one (tail), and `index` maps each active record's digest to its
/// slot. The tracker is not synchronised; share it behind a single lock.
pub struct HashTracker {
    pub(super) arena: RecordArena,
    pub(super) free: SlotList,
    pub(super) active: SlotList,
    pub(super) index: DigestIndex,
    pub(super) wrap: WrapClock,
    pub(super) clock: Arc<dyn Clock>,
    max_count: u64,
    pub(super) max_age: u64,
    retry_delay: u64,
    evicted: u64,
    pub(super) expired: u64,
}

impl HashTracker {
    pub fn new(cfg: &CacheConfig) -> Result<Self> {
        Self::with_clock(cfg, Arc::new(SystemClock))
    }

    pub fn with_clock(cfg: &CacheConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        cfg.validate().map_err(UnderdogError::Config)?;

        let layout = RecordLayout::new(cfg.num_records, cfg.time_chunk_secs, cfg.max_count);
        let mut arena = RecordArena::new(cfg.num_records, layout);
        let mut free = SlotList::new();
        for index in 0..cfg.num_records {
            free.push_head(&mut arena, Slot::new(index));
        }
        debug!(
            record_size = layout.record_size(),
            buffer_bytes = arena.byte_len(),
            "record arena allocated"
        );

        Ok(Self {
            arena,
            free,
            active: SlotList::new(),
            index: DigestIndex::with_capacity(cfg.num_records as usize),
            wrap: WrapClock::new(cfg.time_chunk_secs),
            clock,
            max_count: cfg.max_count,
            max_age: cfg.max_age_secs,
            retry_delay: cfg.max_age_secs.saturating_add(cfg.tidy_up_interval_secs),
            evicted: 0,
            expired: 0,
        })
    }

    /// Records a sighting of `digest` and moves its record to the head of the
    /// active list.
    pub fn check(&mut self, digest: &Digest) -> Outcome {
        let now = self.clock.now_secs();

        let (slot, prior) = match self.index.lookup(digest) {
            Some(slot) => (slot, self.active.detach(&mut self.arena, slot)),
            None => (self.allocate(digest), 0),
        };

        let outcome = if prior >= self.max_count {
            Outcome::Blocked { retry_at: now.saturating_add(self.retry_delay) }
        } else {
            let count = prior + 1;
            self.arena.set_count(slot, count);
            Outcome::Allowed { count }
        };

        self.arena.set_last_seen(slot, self.wrap.wrap(now));
        self.active.push_head(&mut self.arena, slot);
        outcome
    }

    /// Takes a slot for a digest that is not indexed yet, evicting the least recently
    /// seen record when no slot is free.
    fn allocate(&mut self, digest: &Digest) -> Slot {
        let slot = if self.free.is_empty() {
            let slot = self.active.pop_tail(&self.arena);
            let evicted = self.arena.digest(slot);
            self.index.remove(&evicted);
            self.evicted += 1;
            debug!(%evicted, "capacity reached, evicted least recently seen digest");
            slot
        } else {
            self.free.pop_tail(&self.arena)
        };
        self.arena.set_digest(slot, digest);
        self.index.insert(*digest, slot);
        slot
    }

    pub fn stats(&self) -> TrackerStats {
        TrackerStats {
            active: self.active.len(),
            free: self.free.len(),
            evicted: self.evicted,
            expired: self.expired,
        }
    }

    pub fn capacity(&self) -> usize {
        self.arena.slots() as usize
    }

    pub fn contains(&self, digest: &Digest) -> bool {
        self.index.lookup(digest).is_some()
    }

    /// Tracked digests from most to least recently seen.
    pub fn active_digests(&self) -> impl Iterator<Item = Digest> + '_ {
        self.active.iter(&self.arena).map(|slot| self.arena.digest(slot))
    }

    /// Walks both lists and the index, reporting the first inconsistency found.
    pub fn validate_invariants(&self) -> std::result::Result<(), String> {
        let slots = self.capacity();
        let mut owner: Vec<Option<&'static str>> = vec![None; slots];

        for (name, list) in [("active", &self.active), ("free", &self.free)] {
            let mut last = None;
            for slot in list.iter(&self.arena) {
                if slot.index() >= slots {
                    return Err(format!("{name} list links to slot {} out of range", slot.index()));
                }
                if let Some(other) = owner[slot.index()] {
                    return Err(format!("slot {} on both {other} and {name} lists", slot.index()));
                }
                owner[slot.index()] = Some(name);
                if let Some(newer) = last {
                    if self.arena.next(slot) != newer {
                        return Err(format!("{name} list: slot {} has a stale next link", slot.index()));
                    }
                }
                last = Some(slot);
            }
            if last != list.tail() {
                return Err(format!("{name} list tail does not match its last member"));
            }
        }

        if let Some(missing) = owner.iter().position(Option::is_none) {
            return Err(format!("slot {missing} is on neither list"));
        }
        if self.index.len() != self.active.len() {
            return Err(format!(
                "index holds {} digests but the active list holds {}",
                self.index.len(),
                self.active.len()
            ));
        }
        for slot in self.active.iter(&self.arena) {
            let digest = self.arena.digest(slot);
            if self.index.lookup(&digest) != Some(slot) {
                return Err(format!("active slot {} is not indexed under {digest}", slot.index()));
            }
            if self.arena.count(slot) > self.max_count {
                return Err(format!("slot {} count exceeds max_count", slot.index()));
            }
        }
        Ok(())
    }
}
