//! Heap Error Handling
//!
//! Recoverable failures that allocation entry points report to the
//! interpreter. They behave like any other evaluation error: the allocation
//! that failed yields no value, and the caller propagates with `?`.
//!
//! Internal consistency violations (unregistered type codes, unbalanced root
//! pops, wide-type exhaustion, allocating during a collection) are not
//! represented here. Those are programming bugs and panic at the point of
//! detection.

use std::fmt;

/// Error signalled by an allocator
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeapError {
    /// The system allocator (or the configured heap limit) refused memory
    OutOfMemory {
        /// Bytes requested by the failing allocation
        requested: usize,
    },
    /// A string longer than the maximum representable length was requested
    StringTooLong {
        requested: usize,
        max: usize,
    },
}

impl fmt::Display for HeapError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HeapError::OutOfMemory { requested } => {
                write!(f, "Memory exhausted allocating {} bytes", requested)
            }
            HeapError::StringTooLong { requested, max } => {
                write!(
                    f,
                    "String too long: {} bytes requested, maximum is {}",
                    requested, max
                )
            }
        }
    }
}

impl std::error::Error for HeapError {}

/// Result alias used by every allocator entry point
pub type HeapResult<T> = Result<T, HeapError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_messages() {
        let oom = HeapError::OutOfMemory { requested: 4096 };
        assert_eq!(oom.to_string(), "Memory exhausted allocating 4096 bytes");

        let long = HeapError::StringTooLong {
            requested: 11,
            max: 10,
        };
        assert_eq!(
            long.to_string(),
            "String too long: 11 bytes requested, maximum is 10"
        );
    }

    #[test]
    fn test_is_std_error() {
        let err: Box<dyn std::error::Error> = Box::new(HeapError::OutOfMemory { requested: 1 });
        assert!(err.source().is_none());
    }
}
