//! Single-threaded overwrite-oldest ring buffer.
//!
//! Elements are constructed in place in a raw slot arena, so `T` needs no
//! `Default` or `Clone` unless an operation asks for it. When the buffer is
//! full the next insert drops the oldest element and reuses its slot.

use std::fmt;
use std::iter::Chain;
use std::mem;
use std::slice;

use tracing::debug;

use super::span::{wrap_add, wrap_sub, Spans};
use super::storage::Storage;
use crate::error::RingBufferError;

/// Oldest-to-newest iterator over a [`RingBuffer`].
pub type Iter<'a, T> = Chain<slice::Iter<'a, T>, slice::Iter<'a, T>>;

/// Fixed-capacity circular buffer that overwrites its oldest element when
/// full.
///
/// # Invariants
/// - `size <= capacity` and `write_cursor < capacity` (0 when capacity is 0).
/// - The occupied slots are the `size` slots ending at `write_cursor - 1`,
///   going backwards circularly. All other slots are free.
///
/// # Examples
/// ```
/// use overwriting_ring::RingBuffer;
///
/// let mut ring = RingBuffer::new(3);
/// ring.insert_slice(&[1, 2, 3, 4]);
///
/// assert_eq!(ring.current_size(), 3);
/// assert_eq!(ring.copy(0), Ok(4));
/// assert_eq!(ring.iter().copied().collect::<Vec<_>>(), vec![2, 3, 4]);
/// ```
pub struct RingBuffer<T> {
    storage: Storage<T>,
    write_cursor: usize,
    size: usize,
}

impl<T> RingBuffer<T> {
    /// Creates an empty buffer holding up to `capacity` elements.
    ///
    /// Capacity 0 is allowed; such a buffer ignores every insert.
    ///
    /// # Panics
    /// Panics on capacity overflow. Allocation failure aborts through
    /// [`std::alloc::handle_alloc_error`].
    pub fn new(capacity: usize) -> Self {
        debug!(capacity, "ring buffer created");
        Self::with_storage(Storage::allocate(capacity))
    }

    /// Fallible variant of [`new`](Self::new).
    pub fn try_new(capacity: usize) -> Result<Self, RingBufferError> {
        let storage = Storage::try_allocate(capacity)?;
        debug!(capacity, "ring buffer created");
        Ok(Self::with_storage(storage))
    }

    fn with_storage(storage: Storage<T>) -> Self {
        Self {
            storage,
            write_cursor: 0,
            size: 0,
        }
    }

    /// Number of elements the buffer holds before it starts overwriting.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.storage.capacity()
    }

    /// Number of elements currently stored.
    #[inline]
    pub fn current_size(&self) -> usize {
        self.size
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// True once the next insert would overwrite. A zero-capacity buffer is
    /// always full.
    #[inline]
    pub fn is_full(&self) -> bool {
        self.size == self.capacity()
    }

    fn occupied(&self) -> Spans {
        let capacity = self.capacity();
        if self.size == 0 {
            return Spans::new(0, 0, capacity);
        }
        Spans::new(wrap_sub(self.write_cursor, self.size, capacity), self.size, capacity)
    }

    /// Moves `value` into the slot under the write cursor, dropping the
    /// oldest element first when full. Requires `capacity > 0`.
    #[inline]
    fn place(&mut self, value: T) {
        let capacity = self.capacity();
        let slot = self.write_cursor;
        debug_assert!(capacity > 0);

        if self.size == capacity {
            // The slot under a full buffer's cursor holds the oldest element.
            // Shrinking first keeps the slot free if its drop panics.
            self.size -= 1;
            // SAFETY: slot < capacity and occupied; we hold &mut self.
            unsafe { self.storage.drop_slot(slot) };
        }

        // SAFETY: slot < capacity and free at this point.
        unsafe { self.storage.write(slot, value) };
        self.size += 1;
        self.write_cursor = wrap_add(slot, 1, capacity);
    }

    /// Inserts an owned value. The value is moved, never cloned.
    ///
    /// On a zero-capacity buffer the value is dropped immediately.
    #[inline]
    pub fn insert(&mut self, value: T) {
        if self.capacity() == 0 {
            return;
        }
        self.place(value);
    }

    /// Inserts a clone of `value`, leaving the caller's value untouched.
    #[inline]
    pub fn insert_ref(&mut self, value: &T)
    where
        T: Clone,
    {
        if self.capacity() == 0 {
            return;
        }
        self.place(value.clone());
    }

    /// Length of the trailing part of a `len`-element block that survives an
    /// insert.
    #[inline]
    fn window(&self, len: usize) -> usize {
        len.min(self.capacity())
    }

    /// Places the first `window` items one slot at a time. The cursor and
    /// size are updated after every slot, so a panicking item source leaves
    /// the buffer consistent.
    fn insert_window<I>(&mut self, window: usize, items: I)
    where
        I: Iterator<Item = T>,
    {
        if window == 0 {
            return;
        }
        for value in items.take(window) {
            self.place(value);
        }
    }

    /// Inserts clones of `block` in order.
    ///
    /// Only the trailing `capacity()` elements are cloned when the block is
    /// longer than the buffer; the rest are never touched. The result is the
    /// same as inserting the elements one at a time.
    pub fn insert_slice(&mut self, block: &[T])
    where
        T: Clone,
    {
        let window = self.window(block.len());
        let tail = &block[block.len() - window..];
        self.insert_window(window, tail.iter().cloned());
    }

    /// Moves elements out of `block` in order, leaving `T::default()` behind
    /// in every slot that was taken.
    ///
    /// Only the trailing `capacity()` elements are taken when the block is
    /// longer than the buffer; the leading ones stay as they were.
    pub fn insert_take(&mut self, block: &mut [T])
    where
        T: Default,
    {
        let window = self.window(block.len());
        let start = block.len() - window;
        self.insert_window(window, block[start..].iter_mut().map(mem::take));
    }

    /// Moves the trailing `capacity()` elements of an owned block in. The
    /// leading elements are dropped with the vector.
    pub fn insert_vec(&mut self, mut block: Vec<T>) {
        let window = self.window(block.len());
        block.drain(..block.len() - window);
        self.insert_window(window, block.into_iter());
    }

    /// Slot of the element `samples_backward` inserts before the most recent
    /// one, wrapping the index every `capacity()` steps.
    #[inline]
    fn locate(&self, samples_backward: usize) -> Result<usize, RingBufferError> {
        if self.size == 0 {
            return Err(RingBufferError::Empty);
        }
        let capacity = self.capacity();
        let back = samples_backward % capacity;
        if back >= self.size {
            return Err(RingBufferError::Unwritten);
        }
        Ok(wrap_sub(self.write_cursor, back + 1, capacity))
    }

    /// Borrows the element inserted `samples_backward` inserts before the
    /// most recent one. `0` is the most recent.
    ///
    /// The index wraps every `capacity()` steps, so `get(capacity())` aliases
    /// `get(0)`. Returns `None` when the buffer is empty or when the wrapped
    /// index reaches past the stored elements of a partly filled buffer.
    #[inline]
    pub fn get(&self, samples_backward: usize) -> Option<&T> {
        let slot = self.locate(samples_backward).ok()?;
        // SAFETY: locate only returns slots in the occupied range.
        Some(unsafe { self.storage.get(slot) })
    }

    /// Clones the element inserted `samples_backward` inserts before the
    /// most recent one. See [`get`](Self::get) for the indexing rules.
    ///
    /// # Errors
    /// - [`RingBufferError::Empty`] when nothing is stored.
    /// - [`RingBufferError::Unwritten`] when the wrapped index names a slot
    ///   that has not been written since the last reset.
    #[inline]
    pub fn copy(&self, samples_backward: usize) -> Result<T, RingBufferError>
    where
        T: Clone,
    {
        let slot = self.locate(samples_backward)?;
        // SAFETY: locate only returns slots in the occupied range.
        Ok(unsafe { self.storage.get(slot) }.clone())
    }

    /// Clones the `number_of_elements` most recent elements into
    /// `destination`, oldest first, and returns how many were copied.
    ///
    /// The count is clamped to `current_size()`. The buffer is not modified,
    /// so the call is repeatable.
    ///
    /// # Panics
    /// Panics if `destination` is shorter than the clamped count.
    pub fn copy_to(&self, destination: &mut [T], number_of_elements: usize) -> usize
    where
        T: Clone,
    {
        let count = number_of_elements.min(self.size);
        assert!(
            destination.len() >= count,
            "destination holds {} elements but {} are to be copied",
            destination.len(),
            count
        );
        if count == 0 {
            return 0;
        }

        let capacity = self.capacity();
        let spans = Spans::new(wrap_sub(self.write_cursor, count, capacity), count, capacity);
        let (head, tail) = destination[..count].split_at_mut(spans.first.len);

        // SAFETY: both spans lie inside the occupied range.
        unsafe {
            head.clone_from_slice(self.storage.span(spans.first));
            tail.clone_from_slice(self.storage.span(spans.second));
        }
        count
    }

    /// The stored elements as two slices, oldest first. The second slice is
    /// empty unless the occupied range wraps.
    pub fn as_slices(&self) -> (&[T], &[T]) {
        let spans = self.occupied();
        // SAFETY: spans cover exactly the occupied range.
        unsafe { (self.storage.span(spans.first), self.storage.span(spans.second)) }
    }

    /// Iterates oldest to newest.
    pub fn iter(&self) -> Iter<'_, T> {
        let (head, tail) = self.as_slices();
        head.iter().chain(tail.iter())
    }

    /// Drops every occupant and returns how many there were.
    fn release(&mut self) -> usize {
        let dropped = self.size;
        if dropped == 0 {
            return 0;
        }

        let spans = self.occupied();
        // Forget the occupants before dropping them: a panicking destructor
        // leaks the rest instead of dropping anything twice.
        self.size = 0;
        self.write_cursor = 0;

        // SAFETY: spans covered exactly the occupied range.
        unsafe {
            self.storage.drop_span(spans.first);
            self.storage.drop_span(spans.second);
        }
        dropped
    }

    /// Drops every element. Capacity and allocation are kept.
    pub fn reset(&mut self) {
        let dropped = self.release();
        if dropped > 0 {
            debug!(dropped, capacity = self.capacity(), "ring buffer reset");
        }
    }

    /// Drops every element and replaces the storage with `new_capacity`
    /// fresh slots.
    ///
    /// # Panics
    /// Same conditions as [`new`](Self::new).
    pub fn reset_with_capacity(&mut self, new_capacity: usize) {
        self.install(Storage::allocate(new_capacity));
    }

    /// Fallible variant of [`reset_with_capacity`](Self::reset_with_capacity).
    ///
    /// The new storage is allocated first. On failure the buffer keeps its
    /// old storage and contents.
    pub fn try_reset_with_capacity(&mut self, new_capacity: usize) -> Result<(), RingBufferError> {
        let storage = Storage::try_allocate(new_capacity)?;
        self.install(storage);
        Ok(())
    }

    fn install(&mut self, storage: Storage<T>) {
        let dropped = self.release();
        let old_capacity = self.capacity();
        self.storage = storage;
        debug!(
            dropped,
            old_capacity,
            new_capacity = self.capacity(),
            "ring buffer resized"
        );
    }
}

impl<T> Drop for RingBuffer<T> {
    fn drop(&mut self) {
        self.release();
    }
}

impl<T> Extend<T> for RingBuffer<T> {
    fn extend<I: IntoIterator<Item = T>>(&mut self, iter: I) {
        for value in iter {
            self.insert(value);
        }
    }
}

impl<'a, T> IntoIterator for &'a RingBuffer<T> {
    type Item = &'a T;
    type IntoIter = Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<T: fmt::Debug> fmt::Debug for RingBuffer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}
