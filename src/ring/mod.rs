//! Ring buffer core: raw slot storage, wraparound span arithmetic and the
//! two buffer flavours built on top of them.
//!
//! Design principles:
//! - Placement construction: slots are raw memory, elements are written and
//!   dropped in place, so `T` needs no `Default`
//! - Overwrite-oldest: inserting into a full buffer evicts the oldest element
//! - Lock-free: the SPSC flavour uses only atomic loads, stores and fences
//! - No allocation after construction outside of an explicit resize

mod ring_buffer;
mod span;
mod spsc;
mod storage;

pub use ring_buffer::{Iter, RingBuffer};
pub use spsc::{Consumer, Producer, SpscRingBuffer};
