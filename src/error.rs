//! Error type shared by both ring buffer flavours.

use std::error::Error;
use std::fmt;

/// Failure conditions reported by the ring buffers.
///
/// Inserts never fail: a full buffer overwrites its oldest element and a
/// zero-capacity buffer ignores the insert. Errors only come from reads that
/// have nothing to return and from allocation.
#[derive(Clone, Copy, Eq, PartialEq, Hash)]
pub enum RingBufferError {
    /// A single-element read was issued against an empty buffer.
    Empty,
    /// A single-element read wrapped onto a slot of a partly filled buffer
    /// that has not been written since the last reset.
    Unwritten,
    /// The producer overwrote the requested element while the consumer was
    /// reading it. Only reported by [`SpscRingBuffer`](crate::SpscRingBuffer).
    Overwritten,
    /// `capacity * size_of::<T>()` does not fit in a valid allocation layout.
    CapacityOverflow,
    /// The global allocator returned null.
    AllocationFailed {
        /// Number of slots that were requested.
        capacity: usize,
    },
}

impl RingBufferError {
    fn description_str(&self) -> &'static str {
        match self {
            RingBufferError::Empty => "ring buffer is empty",
            RingBufferError::Unwritten => "requested element has not been written",
            RingBufferError::Overwritten => "element was overwritten while being read",
            RingBufferError::CapacityOverflow => "capacity overflow",
            RingBufferError::AllocationFailed { .. } => "memory allocation failed",
        }
    }
}

impl Error for RingBufferError {}

impl fmt::Display for RingBufferError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            RingBufferError::AllocationFailed { capacity } => {
                write!(f, "{} ({} slots)", self.description_str(), capacity)
            }
            _ => write!(f, "{}", self.description_str()),
        }
    }
}

impl fmt::Debug for RingBufferError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "RingBufferError: {}", self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(RingBufferError::Empty.to_string(), "ring buffer is empty");
        assert_eq!(
            RingBufferError::Unwritten.to_string(),
            "requested element has not been written"
        );
        assert_eq!(
            RingBufferError::AllocationFailed { capacity: 8 }.to_string(),
            "memory allocation failed (8 slots)"
        );
        assert_eq!(
            format!("{:?}", RingBufferError::CapacityOverflow),
            "RingBufferError: capacity overflow"
        );
    }
}
