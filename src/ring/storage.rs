//! Raw slot arena backing both ring buffer flavours.
//!
//! Allocation is decoupled from construction: `Storage` hands out
//! `capacity` uninitialised, correctly aligned slots and offers
//! construct-in-place / destroy-in-place primitives. It never tracks which
//! slots are occupied; the owning buffer derives that from its own cursor and
//! size, and must drop its occupants before the storage is released.

use std::alloc::{self, Layout};
use std::marker::PhantomData;
use std::ptr::{self, NonNull};
use std::slice;

use tracing::warn;

use super::span::Span;
use crate::error::RingBufferError;

pub(crate) struct Storage<T> {
    ptr: NonNull<T>,
    capacity: usize,
    _marker: PhantomData<T>,
}

// SAFETY: Storage owns its slots like a `Box<[T]>` would; the slot primitives
// are unsafe and put the aliasing burden on the owning buffer.
unsafe impl<T: Send> Send for Storage<T> {}
unsafe impl<T: Sync> Sync for Storage<T> {}

impl<T> Storage<T> {
    fn layout(capacity: usize) -> Result<Layout, RingBufferError> {
        Layout::array::<T>(capacity).map_err(|_| RingBufferError::CapacityOverflow)
    }

    /// Allocates `capacity` free slots.
    ///
    /// Zero-sized layouts (capacity 0 or a zero-sized `T`) never touch the
    /// allocator.
    pub(crate) fn try_allocate(capacity: usize) -> Result<Self, RingBufferError> {
        let layout = Self::layout(capacity)?;

        if layout.size() == 0 {
            return Ok(Self {
                ptr: NonNull::dangling(),
                capacity,
                _marker: PhantomData,
            });
        }

        // SAFETY: layout has a non-zero size.
        let raw = unsafe { alloc::alloc(layout) } as *mut T;

        match NonNull::new(raw) {
            Some(ptr) => Ok(Self {
                ptr,
                capacity,
                _marker: PhantomData,
            }),
            None => {
                warn!(capacity, bytes = layout.size(), "ring buffer allocation failed");
                Err(RingBufferError::AllocationFailed { capacity })
            }
        }
    }

    /// Infallible variant of [`try_allocate`](Self::try_allocate).
    ///
    /// # Panics
    /// Panics on capacity overflow and aborts through
    /// [`alloc::handle_alloc_error`] when the allocator fails, like `Vec`.
    pub(crate) fn allocate(capacity: usize) -> Self {
        let layout = match Self::layout(capacity) {
            Ok(layout) => layout,
            Err(err) => panic!("ring buffer {}", err),
        };

        match Self::try_allocate(capacity) {
            Ok(storage) => storage,
            Err(_) => alloc::handle_alloc_error(layout),
        }
    }

    #[inline(always)]
    pub(crate) fn capacity(&self) -> usize {
        self.capacity
    }

    #[inline(always)]
    fn slot_ptr(&self, slot: usize) -> *mut T {
        debug_assert!(slot <= self.capacity, "slot {} out of {}", slot, self.capacity);
        // SAFETY: slot <= capacity keeps the pointer inside (or one past) the
        // allocation; for zero-sized layouts the offset is a no-op.
        unsafe { self.ptr.as_ptr().add(slot) }
    }

    /// Constructs `value` in `slot`.
    ///
    /// # Safety
    /// `slot < capacity`, the slot is free and the caller has exclusive
    /// access to it.
    #[inline(always)]
    pub(crate) unsafe fn write(&self, slot: usize, value: T) {
        ptr::write(self.slot_ptr(slot), value);
    }

    /// Drops the element in `slot`, leaving the slot free.
    ///
    /// # Safety
    /// `slot < capacity`, the slot is occupied and the caller has exclusive
    /// access to it.
    #[inline(always)]
    pub(crate) unsafe fn drop_slot(&self, slot: usize) {
        ptr::drop_in_place(self.slot_ptr(slot));
    }

    /// Drops every element of `span`.
    ///
    /// # Safety
    /// Every slot of `span` is occupied and exclusively accessible.
    pub(crate) unsafe fn drop_span(&self, span: Span) {
        debug_assert!(span.start + span.len <= self.capacity);
        ptr::drop_in_place(ptr::slice_from_raw_parts_mut(
            self.slot_ptr(span.start),
            span.len,
        ));
    }

    /// # Safety
    /// `slot` is occupied and not being written.
    #[inline(always)]
    pub(crate) unsafe fn get(&self, slot: usize) -> &T {
        debug_assert!(slot < self.capacity);
        &*self.slot_ptr(slot)
    }

    /// # Safety
    /// Every slot of `span` is occupied and not being written.
    #[inline(always)]
    pub(crate) unsafe fn span(&self, span: Span) -> &[T] {
        debug_assert!(span.start + span.len <= self.capacity);
        slice::from_raw_parts(self.slot_ptr(span.start), span.len)
    }
}

impl<T: Copy> Storage<T> {
    /// Volatile single-slot store for the lock-free producer.
    ///
    /// # Safety
    /// `slot < capacity` and no other thread writes the slot.
    #[inline(always)]
    pub(crate) unsafe fn write_volatile(&self, slot: usize, value: T) {
        ptr::write_volatile(self.slot_ptr(slot), value);
    }

    /// Volatile single-slot load for the lock-free consumer. The value may be
    /// torn if the producer is overwriting the slot; callers validate it
    /// against the claim sequence before handing it out.
    ///
    /// # Safety
    /// `slot < capacity` and the slot has been written at least once.
    #[inline(always)]
    pub(crate) unsafe fn read_volatile(&self, slot: usize) -> T {
        ptr::read_volatile(self.slot_ptr(slot))
    }

    /// Copies `source` into the contiguous slots starting at `start`.
    ///
    /// # Safety
    /// `start + source.len() <= capacity` and no other thread writes those
    /// slots.
    #[inline]
    pub(crate) unsafe fn copy_from_slice(&self, start: usize, source: &[T]) {
        debug_assert!(start + source.len() <= self.capacity);
        ptr::copy_nonoverlapping(source.as_ptr(), self.slot_ptr(start), source.len());
    }

    /// Copies the contiguous slots starting at `start` into `destination`.
    ///
    /// # Safety
    /// `start + destination.len() <= capacity` and every slot has been
    /// written at least once.
    #[inline]
    pub(crate) unsafe fn copy_to_slice(&self, start: usize, destination: &mut [T]) {
        debug_assert!(start + destination.len() <= self.capacity);
        ptr::copy_nonoverlapping(
            self.slot_ptr(start) as *const T,
            destination.as_mut_ptr(),
            destination.len(),
        );
    }
}

impl<T> Drop for Storage<T> {
    fn drop(&mut self) {
        // Occupants were already dropped by the owning buffer.
        if let Ok(layout) = Self::layout(self.capacity) {
            if layout.size() != 0 {
                // SAFETY: ptr came from alloc::alloc with this exact layout.
                unsafe { alloc::dealloc(self.ptr.as_ptr() as *mut u8, layout) };
            }
        }
    }
}
