//! Intrusive doubly linked list over arena slots.
//!
//! Links live in the records themselves (`next` points towards the head, `prev`
//! towards the tail), so two lists can share one arena as long as a slot is a member
//! of at most one of them.
//!
//! ```text
//!   tail ─► [s3] ──next──► [s7] ──next──► [s1] ◄── head
//!           [s3] ◄──prev── [s7] ◄──prev── [s1]
//! ```
//!
//! All operations are O(1). Popping or detaching from an empty list is a logic error
//! and panics.

use crate::tracker::arena::{RecordArena, Slot};

#[derive(Debug, Default)]
pub struct SlotList {
    head: Option<Slot>,
    tail: Option<Slot>,
    len: usize,
}

impl SlotList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Most recently pushed slot.
    pub fn head(&self) -> Option<Slot> {
        self.head
    }

    /// Least recently pushed slot.
    pub fn tail(&self) -> Option<Slot> {
        self.tail
    }

    /// Links `slot` in as the new head.
    pub fn push_head(&mut self, arena: &mut RecordArena, slot: Slot) {
        match self.head {
            Some(head) => {
                arena.set_next(head, slot);
                arena.set_prev(slot, head);
            }
            None => self.tail = Some(slot),
        }
        self.head = Some(slot);
        self.len += 1;
    }

    /// Unlinks and returns the tail.
    pub fn pop_tail(&mut self, arena: &RecordArena) -> Slot {
        let Some(tail) = self.tail else {
            panic!("pop_tail on an empty slot list");
        };
        if self.len > 1 {
            self.tail = Some(arena.next(tail));
        } else {
            self.head = None;
            self.tail = None;
        }
        self.len -= 1;
        tail
    }

    /// Unlinks `slot` from anywhere in the list, leaving its fields intact, and
    /// returns the count it held.
    pub fn detach(&mut self, arena: &mut RecordArena, slot: Slot) -> u64 {
        assert!(self.len > 0, "detach of slot {slot:?} from an empty slot list");
        let count = arena.count(slot);
        let next = arena.next(slot);
        let prev = arena.prev(slot);

        match (self.head == Some(slot), self.tail == Some(slot)) {
            (true, true) => {
                self.head = None;
                self.tail = None;
            }
            (true, false) => self.head = Some(prev),
            (false, true) => self.tail = Some(next),
            (false, false) => {
                arena.set_next(prev, next);
                arena.set_prev(next, prev);
            }
        }
        self.len -= 1;
        count
    }

    /// Slots from head to tail.
    pub fn iter<'a>(&self, arena: &'a RecordArena) -> SlotIter<'a> {
        SlotIter { arena, current: self.head, remaining: self.len }
    }
}

pub struct SlotIter<'a> {
    arena: &'a RecordArena,
    current: Option<Slot>,
    remaining: usize,
}

impl Iterator for SlotIter<'_> {
    type Item = Slot;

    fn next(&mut self) -> Option<Slot> {
        if self.remaining == 0 {
            return None;
        }
        let slot = self.current?;
        self.remaining -= 1;
        self.current = (self.remaining > 0).then(|| self.arena.prev(slot));
        Some(slot)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}
