//! Lock-free single-producer single-consumer overwrite-oldest ring buffer.
//!
//! No Mutex, no CAS loop, no blocking, and no allocation after construction.
//!
//! # Ordering
//!
//! ```text
//! producer: claim.store(seq + n, Relaxed); fence(Release)
//!           write slots
//!           write_sequence.store(seq + n, Release); size.store(.., Release)
//!
//! consumer: size.load(Acquire); write_sequence.load(Acquire)
//!           copy slots
//!           fence(Acquire); claim.load(Relaxed)  -> discard overwritten prefix
//!           read_cursor.store(.., Release)
//! ```
//!
//! The size/sequence pair tells the consumer which slots were published. The
//! claim/fence pair is a seqlock: if a copied slot was being overwritten, the
//! consumer sees a claim covering it and drops that slot from the result.
//! The producer never waits for the consumer, so unread elements can be
//! evicted. The buffer keeps a best-effort recent window; it is not a queue.

use std::sync::atomic::{fence, AtomicU64, AtomicUsize, Ordering};

use crossbeam_utils::CachePadded;
use tracing::{debug, trace};

use super::span::{slot_of, Spans};
use super::storage::Storage;
use crate::error::RingBufferError;

/// Lock-free overwrite-oldest ring buffer for one producer thread and one
/// consumer thread.
///
/// Roles are handed out by [`split`](Self::split); the borrow it takes makes
/// a second producer or consumer, or a reset while either is alive, a
/// compile error.
///
/// Elements must be `Copy`: the consumer may copy a slot the producer is
/// overwriting and discards the copy afterwards, which is only sound for
/// types without drop glue or clone logic.
///
/// # Examples
/// ```
/// use overwriting_ring::SpscRingBuffer;
///
/// let mut ring = SpscRingBuffer::<u64>::new(8);
/// let (mut producer, mut consumer) = ring.split();
///
/// std::thread::scope(|s| {
///     s.spawn(move || producer.insert_slice(&[1, 2, 3]));
/// });
///
/// let mut out = [0u64; 8];
/// let copied = consumer.copy_to(&mut out, 8);
/// assert_eq!(&out[..copied], &[1, 2, 3]);
/// ```
pub struct SpscRingBuffer<T> {
    // Each cell lives on its own cache line.
    capacity: CachePadded<AtomicUsize>,
    // Monotonic count of published elements; the write cursor is
    // `write_sequence % capacity`.
    write_sequence: CachePadded<AtomicU64>,
    size: CachePadded<AtomicUsize>,
    // Advisory: slot of the last write cursor the consumer observed.
    read_cursor: CachePadded<AtomicUsize>,
    // Elements the producer has started writing. Runs ahead of
    // `write_sequence` while a write is in flight.
    claim_sequence: CachePadded<AtomicU64>,
    storage: Storage<T>,
}

// SAFETY: the producer is the only writer of the slots, the write sequence,
// size and claim; the consumer is the only writer of read_cursor. Both roles
// are reachable only through `split(&mut self)`, which hands out exactly one
// of each. Torn slot reads are detected through the claim sequence and never
// returned.
unsafe impl<T: Send> Sync for SpscRingBuffer<T> {}

/// Number of leading elements of the window `[first, first + len)` that the
/// producer may have overwritten once it had claimed up to `claimed`.
#[inline]
fn overwritten_prefix(first: u64, len: usize, claimed: u64, capacity: usize) -> usize {
    let horizon = claimed.saturating_sub(capacity as u64);
    if horizon <= first {
        0
    } else {
        (horizon - first).min(len as u64) as usize
    }
}

impl<T: Copy> SpscRingBuffer<T> {
    /// Creates an empty buffer holding up to `capacity` elements.
    ///
    /// # Panics
    /// Panics on capacity overflow. Allocation failure aborts through
    /// [`std::alloc::handle_alloc_error`].
    pub fn new(capacity: usize) -> Self {
        debug!(capacity, "spsc ring buffer created");
        Self::with_storage(Storage::allocate(capacity))
    }

    /// Fallible variant of [`new`](Self::new).
    pub fn try_new(capacity: usize) -> Result<Self, RingBufferError> {
        let storage = Storage::try_allocate(capacity)?;
        debug!(capacity, "spsc ring buffer created");
        Ok(Self::with_storage(storage))
    }

    fn with_storage(storage: Storage<T>) -> Self {
        Self {
            capacity: CachePadded::new(AtomicUsize::new(storage.capacity())),
            write_sequence: CachePadded::new(AtomicU64::new(0)),
            size: CachePadded::new(AtomicUsize::new(0)),
            read_cursor: CachePadded::new(AtomicUsize::new(0)),
            claim_sequence: CachePadded::new(AtomicU64::new(0)),
            storage,
        }
    }

    /// Hands out the producer and consumer roles.
    ///
    /// The handles borrow the buffer mutably, so it cannot be reset, resized,
    /// moved or split again until both are gone.
    pub fn split(&mut self) -> (Producer<'_, T>, Consumer<'_, T>) {
        let ring: &Self = self;
        (Producer { ring }, Consumer { ring })
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity.load(Ordering::Relaxed)
    }

    /// Snapshot of the number of stored elements.
    #[inline]
    pub fn current_size(&self) -> usize {
        self.size.load(Ordering::Relaxed)
    }

    /// Slot index of the write cursor as last observed by the consumer.
    /// Bookkeeping only; nothing in the protocol reads it.
    #[inline]
    pub fn read_cursor(&self) -> usize {
        self.read_cursor.load(Ordering::Acquire)
    }

    /// Forgets every element. Capacity and allocation are kept.
    pub fn reset(&mut self) {
        // Copy elements carry no drop glue, so clearing the counters is
        // enough to free every slot.
        let dropped = std::mem::replace(self.size.get_mut(), 0);
        *self.write_sequence.get_mut() = 0;
        *self.claim_sequence.get_mut() = 0;
        *self.read_cursor.get_mut() = 0;

        if dropped > 0 {
            debug!(dropped, capacity = self.capacity(), "spsc ring buffer reset");
        }
    }

    /// Forgets every element and replaces the storage with `new_capacity`
    /// fresh slots.
    ///
    /// # Panics
    /// Same conditions as [`new`](Self::new).
    pub fn reset_with_capacity(&mut self, new_capacity: usize) {
        self.install(Storage::allocate(new_capacity));
    }

    /// Fallible variant of [`reset_with_capacity`](Self::reset_with_capacity).
    /// On failure the buffer keeps its old storage and contents.
    pub fn try_reset_with_capacity(&mut self, new_capacity: usize) -> Result<(), RingBufferError> {
        let storage = Storage::try_allocate(new_capacity)?;
        self.install(storage);
        Ok(())
    }

    fn install(&mut self, storage: Storage<T>) {
        self.reset();
        let old_capacity = std::mem::replace(self.capacity.get_mut(), storage.capacity());
        self.storage = storage;
        debug!(
            old_capacity,
            new_capacity = self.capacity(),
            "spsc ring buffer resized"
        );
    }
}

/// Writing half of a [`SpscRingBuffer`].
pub struct Producer<'a, T> {
    ring: &'a SpscRingBuffer<T>,
}

impl<T: Copy> Producer<'_, T> {
    /// Inserts one element, overwriting the oldest one when full. A no-op on
    /// a zero-capacity buffer.
    #[inline]
    pub fn insert(&mut self, value: T) {
        let ring = self.ring;
        let capacity = ring.capacity.load(Ordering::Relaxed);
        if capacity == 0 {
            return;
        }

        // Producer-owned cells: relaxed loads see our own last stores.
        let sequence = ring.write_sequence.load(Ordering::Relaxed);
        let size = ring.size.load(Ordering::Relaxed);

        ring.claim_sequence.store(sequence + 1, Ordering::Relaxed);
        fence(Ordering::Release);

        // SAFETY: only the producer writes slots. A consumer copy racing with
        // this write sees the claim and discards the value.
        unsafe { ring.storage.write_volatile(slot_of(sequence, capacity), value) };

        ring.write_sequence.store(sequence + 1, Ordering::Release);
        ring.size.store((size + 1).min(capacity), Ordering::Release);
    }

    /// Inserts `block` in order. Only the trailing `capacity()` elements are
    /// written when the block is longer than the buffer. The write is split
    /// into at most two contiguous copies.
    pub fn insert_slice(&mut self, block: &[T]) {
        let ring = self.ring;
        let capacity = ring.capacity.load(Ordering::Relaxed);
        let window = block.len().min(capacity);
        if window == 0 {
            return;
        }
        let tail = &block[block.len() - window..];

        let sequence = ring.write_sequence.load(Ordering::Relaxed);
        let size = ring.size.load(Ordering::Relaxed);
        let next = sequence + window as u64;

        ring.claim_sequence.store(next, Ordering::Relaxed);
        fence(Ordering::Release);

        let spans = Spans::new(slot_of(sequence, capacity), window, capacity);
        let (head, wrapped) = tail.split_at(spans.first.len);
        // SAFETY: both spans lie inside storage and only the producer writes
        // slots.
        unsafe {
            ring.storage.copy_from_slice(spans.first.start, head);
            ring.storage.copy_from_slice(spans.second.start, wrapped);
        }

        ring.write_sequence.store(next, Ordering::Release);
        ring.size.store((size + window).min(capacity), Ordering::Release);
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.ring.capacity()
    }

    #[inline]
    pub fn current_size(&self) -> usize {
        self.ring.current_size()
    }
}

/// Reading half of a [`SpscRingBuffer`].
pub struct Consumer<'a, T> {
    ring: &'a SpscRingBuffer<T>,
}

impl<T: Copy> Consumer<'_, T> {
    /// Acquire-loads size, then the write sequence. Seeing the size of a
    /// publish guarantees seeing that publish's sequence or a later one.
    #[inline]
    fn observe(&self) -> (usize, usize, u64) {
        let ring = self.ring;
        let capacity = ring.capacity.load(Ordering::Relaxed);
        let size = ring.size.load(Ordering::Acquire);
        let published = ring.write_sequence.load(Ordering::Acquire);
        debug_assert!(size as u64 <= published);
        (capacity, size, published)
    }

    #[inline]
    fn claimed_after_read(&self) -> u64 {
        fence(Ordering::Acquire);
        self.ring.claim_sequence.load(Ordering::Relaxed)
    }

    /// Copies the element inserted `samples_backward` inserts before the
    /// most recent one the consumer can see. `0` is the most recent; the
    /// index wraps every `capacity()` steps.
    ///
    /// # Errors
    /// - [`RingBufferError::Empty`] when nothing is stored.
    /// - [`RingBufferError::Unwritten`] when the wrapped index reaches past
    ///   the stored elements of a partly filled buffer.
    /// - [`RingBufferError::Overwritten`] when the producer overwrote the
    ///   element while it was being read.
    pub fn copy(&mut self, samples_backward: usize) -> Result<T, RingBufferError> {
        let (capacity, size, published) = self.observe();
        if size == 0 {
            return Err(RingBufferError::Empty);
        }

        let back = samples_backward % capacity;
        if back >= size {
            return Err(RingBufferError::Unwritten);
        }

        let position = published - 1 - back as u64;
        // SAFETY: position is published and occupied; a torn value is
        // rejected below before it escapes.
        let value = unsafe { self.ring.storage.read_volatile(slot_of(position, capacity)) };
        let claimed = self.claimed_after_read();

        self.ring
            .read_cursor
            .store(slot_of(published, capacity), Ordering::Release);

        if overwritten_prefix(position, 1, claimed, capacity) > 0 {
            trace!(position, claimed, "element overwritten during copy");
            return Err(RingBufferError::Overwritten);
        }
        Ok(value)
    }

    /// Copies up to `number_of_elements` of the most recent elements into
    /// `destination`, oldest first, and returns how many are valid.
    ///
    /// The count is clamped to the observed size. Elements the producer
    /// overwrote during the copy are dropped from the front of the result, so
    /// `destination[..n]` is always a contiguous run of the inserted sequence.
    ///
    /// # Panics
    /// Panics if `destination` is shorter than the clamped count.
    pub fn copy_to(&mut self, destination: &mut [T], number_of_elements: usize) -> usize {
        let (capacity, size, published) = self.observe();
        let count = number_of_elements.min(size);
        assert!(
            destination.len() >= count,
            "destination holds {} elements but {} are to be copied",
            destination.len(),
            count
        );

        let mut valid = 0;
        if count > 0 {
            let first = published - count as u64;
            let spans = Spans::new(slot_of(first, capacity), count, capacity);
            let (head, wrapped) = destination[..count].split_at_mut(spans.first.len);

            // SAFETY: both spans lie in the published range; torn slots are
            // discarded below.
            unsafe {
                self.ring.storage.copy_to_slice(spans.first.start, head);
                self.ring.storage.copy_to_slice(spans.second.start, wrapped);
            }

            let claimed = self.claimed_after_read();
            let stale = overwritten_prefix(first, count, claimed, capacity);
            if stale > 0 {
                trace!(discarded = stale, "slots overwritten during copy");
                destination.copy_within(stale..count, 0);
            }
            valid = count - stale;
        }

        self.ring
            .read_cursor
            .store(slot_of(published, capacity), Ordering::Release);
        valid
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.ring.capacity()
    }

    #[inline]
    pub fn current_size(&self) -> usize {
        self.ring.current_size()
    }

    #[inline]
    pub fn read_cursor(&self) -> usize {
        self.ring.read_cursor()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn drain<T: Copy + Default>(consumer: &mut Consumer<'_, T>, n: usize) -> Vec<T> {
        let mut out = vec![T::default(); n];
        let copied = consumer.copy_to(&mut out, n);
        out.truncate(copied);
        out
    }

    #[test]
    fn test_basic_insert_copy() {
        let mut ring = SpscRingBuffer::<u64>::new(4);
        let (mut producer, mut consumer) = ring.split();

        assert_eq!(consumer.copy(0), Err(RingBufferError::Empty));

        producer.insert(42);
        assert_eq!(consumer.copy(0), Ok(42));
        assert_eq!(producer.current_size(), 1);
    }

    #[test]
    fn test_copy_wraps_on_partial_fill() {
        let mut ring = SpscRingBuffer::<u32>::new(8);
        let (mut producer, mut consumer) = ring.split();
        producer.insert_slice(&[10, 20, 30]);

        assert_eq!(consumer.copy(1), Ok(20));
        assert_eq!(consumer.copy(9), Ok(20));
        assert_eq!(consumer.copy(16), Ok(30));
        assert_eq!(consumer.copy(3), Err(RingBufferError::Unwritten));
        assert_eq!(consumer.copy(15), Err(RingBufferError::Unwritten));
    }

    #[test]
    fn test_try_new() {
        let ring = SpscRingBuffer::<u64>::try_new(16).unwrap();
        assert_eq!(ring.capacity(), 16);
        assert_eq!(ring.current_size(), 0);

        assert_eq!(
            SpscRingBuffer::<u64>::try_new(usize::MAX).err(),
            Some(RingBufferError::CapacityOverflow)
        );
    }

    #[test]
    fn test_overwrite_oldest() {
        let mut ring = SpscRingBuffer::<u32>::new(19);
        let (mut producer, mut consumer) = ring.split();

        for i in 1..=20 {
            producer.insert(i);
        }
        assert_eq!(consumer.current_size(), 19);
        assert_eq!(consumer.copy(0), Ok(20));
        assert_eq!(consumer.copy(18), Ok(2));
        assert_eq!(consumer.copy(19), Ok(20));
        assert_eq!(drain(&mut consumer, 32), (2..=20).collect::<Vec<_>>());
    }

    #[test]
    fn test_bulk_matches_single() {
        let source: Vec<u32> = (1..=20).collect();

        let mut single = SpscRingBuffer::new(19);
        let (mut producer, mut single_consumer) = single.split();
        for &value in &source {
            producer.insert(value);
        }

        let mut bulk = SpscRingBuffer::new(19);
        let (mut bulk_producer, mut bulk_consumer) = bulk.split();
        bulk_producer.insert_slice(&source);

        assert_eq!(drain(&mut single_consumer, 19), drain(&mut bulk_consumer, 19));
    }

    #[test]
    fn test_wraparound_blocks() {
        let mut ring = SpscRingBuffer::<u64>::new(5);
        let (mut producer, mut consumer) = ring.split();

        producer.insert_slice(&[1, 2, 3]);
        producer.insert_slice(&[4, 5, 6, 7]);
        assert_eq!(drain(&mut consumer, 5), vec![3, 4, 5, 6, 7]);
        assert_eq!(drain(&mut consumer, 2), vec![6, 7]);
        assert_eq!(consumer.read_cursor(), 2);
    }

    #[test]
    fn test_zero_capacity() {
        let mut ring = SpscRingBuffer::<u8>::new(0);
        let (mut producer, mut consumer) = ring.split();

        producer.insert(1);
        producer.insert_slice(&[1, 2, 3]);
        assert_eq!(consumer.current_size(), 0);
        assert_eq!(consumer.copy(3), Err(RingBufferError::Empty));
        assert_eq!(consumer.copy_to(&mut [], 4), 0);
    }

    #[test]
    fn test_reset_and_resize() {
        let mut ring = SpscRingBuffer::<u16>::new(4);
        {
            let (mut producer, _) = ring.split();
            producer.insert_slice(&[1, 2, 3, 4, 5]);
        }

        ring.reset();
        assert_eq!(ring.current_size(), 0);
        assert_eq!(ring.capacity(), 4);
        assert_eq!(ring.read_cursor(), 0);

        ring.reset_with_capacity(16);
        assert_eq!(ring.capacity(), 16);
        assert_eq!(ring.current_size(), 0);

        let (mut producer, mut consumer) = ring.split();
        producer.insert_slice(&[9; 10]);
        assert_eq!(drain(&mut consumer, 16), vec![9; 10]);
    }

    #[test]
    fn test_failed_resize_keeps_state() {
        let mut ring = SpscRingBuffer::<u64>::new(4);
        ring.split().0.insert(7);

        assert_eq!(
            ring.try_reset_with_capacity(usize::MAX),
            Err(RingBufferError::CapacityOverflow)
        );
        assert_eq!(ring.capacity(), 4);
        assert_eq!(ring.split().1.copy(0), Ok(7));
    }

    #[test]
    fn test_overwritten_prefix() {
        // Nothing claimed past the window.
        assert_eq!(overwritten_prefix(10, 5, 15, 8), 0);
        // Claims up to 20 evict positions below 12.
        assert_eq!(overwritten_prefix(10, 5, 20, 8), 2);
        // Whole window lapped.
        assert_eq!(overwritten_prefix(10, 5, 40, 8), 5);
        assert_eq!(overwritten_prefix(0, 3, 2, 0), 0);
    }

    #[test]
    fn test_concurrent_monotonic_reads() {
        const TOTAL: u64 = 50_000;
        let mut ring = SpscRingBuffer::<u64>::new(64);
        let (mut producer, mut consumer) = ring.split();

        thread::scope(|s| {
            s.spawn(move || {
                for i in 1..=TOTAL {
                    producer.insert(i);
                }
            });

            let mut last_seen = 0;
            let mut out = [0u64; 16];
            while last_seen < TOTAL {
                let copied = consumer.copy_to(&mut out, 16);
                let chunk = &out[..copied];
                assert!(chunk.windows(2).all(|w| w[1] == w[0] + 1), "{:?}", chunk);
                if let Some(&newest) = chunk.last() {
                    assert!(newest >= last_seen);
                    last_seen = newest;
                }
            }
        });
    }
}
