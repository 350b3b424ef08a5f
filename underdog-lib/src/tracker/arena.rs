//! Flat record storage addressed by slot index.
//!
//! All records live in one boxed byte slice sized once at startup. Slot indices are
//! only ever produced by the tracker's own list operations, so an out-of-range slot
//! is a logic error and panics.

use crate::tracker::digest::{Digest, DIGEST_LEN};
use crate::tracker::layout::{Field, RecordLayout};

/// Index of a record position in the arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Slot(u32);

impl Slot {
    pub const fn new(index: u32) -> Self {
        Self(index)
    }

    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug)]
pub struct RecordArena {
    buf: Box<[u8]>,
    layout: RecordLayout,
    slots: u32,
}

impl RecordArena {
    pub fn new(slots: u32, layout: RecordLayout) -> Self {
        let size = slots as usize * layout.record_size();
        Self { buf: vec![0u8; size].into_boxed_slice(), layout, slots }
    }

    pub fn slots(&self) -> u32 {
        self.slots
    }

    pub fn layout(&self) -> &RecordLayout {
        &self.layout
    }

    /// Size of the backing buffer in bytes.
    pub fn byte_len(&self) -> usize {
        self.buf.len()
    }

    fn base(&self, slot: Slot) -> usize {
        assert!(
            slot.0 < self.slots,
            "slot {} out of range for arena of {} records",
            slot.0,
            self.slots
        );
        slot.index() * self.layout.record_size()
    }

    pub fn read(&self, slot: Slot, field: Field) -> u64 {
        let start = self.base(slot) + self.layout.offset(field);
        let width = self.layout.width(field);
        let mut raw = [0u8; 8];
        raw[8 - width..].copy_from_slice(&self.buf[start..start + width]);
        u64::from_be_bytes(raw)
    }

    pub fn write(&mut self, slot: Slot, field: Field, value: u64) {
        let start = self.base(slot) + self.layout.offset(field);
        let width = self.layout.width(field);
        let raw = value.to_be_bytes();
        assert!(
            raw[..8 - width].iter().all(|b| *b == 0),
            "value {value} does not fit the {width}-byte {field:?} field"
        );
        self.buf[start..start + width].copy_from_slice(&raw[8 - width..]);
    }

    pub fn digest(&self, slot: Slot) -> Digest {
        let start = self.base(slot);
        let mut bytes = [0u8; DIGEST_LEN];
        bytes.copy_from_slice(&self.buf[start..start + DIGEST_LEN]);
        Digest::from_bytes(bytes)
    }

    pub fn set_digest(&mut self, slot: Slot, digest: &Digest) {
        let start = self.base(slot);
        self.buf[start..start + DIGEST_LEN].copy_from_slice(digest.as_bytes());
    }

    pub fn next(&self, slot: Slot) -> Slot {
        self.link(slot, Field::Next)
    }

    pub fn prev(&self, slot: Slot) -> Slot {
        self.link(slot, Field::Prev)
    }

    pub fn set_next(&mut self, slot: Slot, next: Slot) {
        self.write(slot, Field::Next, u64::from(next.0));
    }

    pub fn set_prev(&mut self, slot: Slot, prev: Slot) {
        self.write(slot, Field::Prev, u64::from(prev.0));
    }

    fn link(&self, slot: Slot, field: Field) -> Slot {
        // links are written from `Slot` values, so they always fit in u32
        Slot(self.read(slot, field) as u32)
    }

    pub fn count(&self, slot: Slot) -> u64 {
        self.read(slot, Field::Count)
    }

    pub fn set_count(&mut self, slot: Slot, count: u64) {
        self.write(slot, Field::Count, count);
    }

    pub fn last_seen(&self, slot: Slot) -> u64 {
        self.read(slot, Field::LastSeen)
    }

    pub fn set_last_seen(&mut self, slot: Slot, time: u64) {
        self.write(slot, Field::LastSeen, time);
    }
}
