//! Overwriting Ring - fixed-capacity overwrite-oldest ring buffers
//!
//! Two flavours share one slot arena and one index scheme:
//! - [`RingBuffer`]: single-threaded, stores any `T`, move or clone inserts
//! - [`SpscRingBuffer`]: lock-free, one [`Producer`] thread and one
//!   [`Consumer`] thread, for `Copy` elements
//!
//! Both keep the most recent `capacity` elements. Reads look backwards from
//! the newest element (`copy(0)` is the latest insert) or copy the newest
//! window out oldest-first (`copy_to`).
//!
//! ```
//! use overwriting_ring::RingBuffer;
//!
//! let mut ring = RingBuffer::new(19);
//! for word in ["one", "two", "three"] {
//!     ring.insert(word.to_string());
//! }
//! assert_eq!(ring.copy(0).unwrap(), "three");
//!
//! let mut out = vec![String::new(); 2];
//! assert_eq!(ring.copy_to(&mut out, 2), 2);
//! assert_eq!(out, ["two", "three"]);
//! ```

pub mod error;
pub mod ring;

pub use error::RingBufferError;
pub use ring::{Consumer, Iter, Producer, RingBuffer, SpscRingBuffer};
