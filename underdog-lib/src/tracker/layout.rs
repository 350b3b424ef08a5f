//! Byte layout of one record slot.
//!
//! Every record is packed as:
//!
//! ```text
//! ┌──────────────┬───────────────┬────────────┬───────────┬───────────┐
//! │ digest (16B) │ last_seen (T) │ count (C)  │ next (P)  │ prev (P)  │
//! └──────────────┴───────────────┴────────────┴───────────┴───────────┘
//! ```
//!
//! `T`, `C` and `P` are the smallest big-endian widths able to hold the largest value
//! each field will ever store.

use crate::tracker::digest::DIGEST_LEN;

/// A fixed-width unsigned field of a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    LastSeen,
    Count,
    Next,
    Prev,
}

/// Minimum number of bytes able to represent every value in `0..=max_value`.
pub fn bytes_required(max_value: u64) -> usize {
    let bits = (u64::BITS - max_value.leading_zeros()) as usize;
    bits.div_ceil(8).max(1)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordLayout {
    ptr_width: usize,
    time_width: usize,
    count_width: usize,
}

impl RecordLayout {
    /// Derive field widths from the capacity parameters.
    ///
    /// Slot links address `0..num_records`, timestamps live in `0..time_chunk` and
    /// counts saturate at `max_count`.
    pub fn new(num_records: u32, time_chunk: u64, max_count: u64) -> Self {
        Self {
            ptr_width: bytes_required(u64::from(num_records.saturating_sub(1))),
            time_width: bytes_required(time_chunk.saturating_sub(1)),
            count_width: bytes_required(max_count),
        }
    }

    pub fn record_size(&self) -> usize {
        DIGEST_LEN + self.time_width + self.count_width + 2 * self.ptr_width
    }

    pub fn width(&self, field: Field) -> usize {
        match field {
            Field::LastSeen => self.time_width,
            Field::Count => self.count_width,
            Field::Next | Field::Prev => self.ptr_width,
        }
    }

    /// Offset of `field` from the start of a record.
    pub fn offset(&self, field: Field) -> usize {
        let last_seen = DIGEST_LEN;
        let count = last_seen + self.time_width;
        let next = count + self.count_width;
        match field {
            Field::LastSeen => last_seen,
            Field::Count => count,
            Field::Next => next,
            Field::Prev => next + self.ptr_width,
        }
    }
}
