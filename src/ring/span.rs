//! Wraparound index arithmetic shared by the insert and extract paths.
//!
//! A logical window of slots may run past the physical end of storage. It is
//! then handled as two contiguous spans: `[start, capacity)` followed by
//! `[0, remainder)`.

use std::ops::Range;

#[inline]
pub(crate) fn wrap_add(index: usize, addend: usize, capacity: usize) -> usize {
    debug_assert!(capacity > 0);
    debug_assert!(addend <= capacity);
    (index + addend) % capacity
}

#[inline]
pub(crate) fn wrap_sub(index: usize, subtrahend: usize, capacity: usize) -> usize {
    debug_assert!(capacity > 0);
    debug_assert!(subtrahend <= capacity);
    (index + capacity - subtrahend) % capacity
}

/// Physical slot of a monotonically increasing sequence number.
#[inline]
pub(crate) fn slot_of(sequence: u64, capacity: usize) -> usize {
    if capacity == 0 {
        0
    } else {
        (sequence % capacity as u64) as usize
    }
}

/// Contiguous run of physical slots.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Span {
    pub start: usize,
    pub len: usize,
}

impl Span {
    #[inline]
    pub(crate) fn range(self) -> Range<usize> {
        self.start..self.start + self.len
    }
}

/// A logical window split at the physical end of storage.
///
/// `first` always begins at the window's start slot; `second` begins at slot
/// 0 and is empty unless the window wraps.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Spans {
    pub first: Span,
    pub second: Span,
}

impl Spans {
    /// Splits the `len` slots starting at `start`.
    #[inline]
    pub(crate) fn new(start: usize, len: usize, capacity: usize) -> Self {
        debug_assert!(len <= capacity);
        debug_assert!(start < capacity || (start == 0 && len == 0));

        let first_len = (capacity - start).min(len);
        Self {
            first: Span {
                start,
                len: first_len,
            },
            second: Span {
                start: 0,
                len: len - first_len,
            },
        }
    }

    #[inline]
    pub(crate) fn iter(self) -> impl Iterator<Item = Span> {
        [self.first, self.second].into_iter().filter(|span| span.len > 0)
    }
}
