//! Heap errors

use crate::value::Value;
use thiserror::Error;

/// Errors raised by heap accesses and allocation
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HeapError {
    /// The bump region cannot satisfy the request; a collection is required
    #[error("heap region exhausted: requested {requested} bytes, {available} available")]
    NeedsCollection {
        /// Aligned size of the request
        requested: usize,
        /// Bytes left before the limit
        available: usize,
    },

    /// Address outside the region, misaligned, or null
    #[error("heap access out of bounds at {address:#x}")]
    OutOfBounds {
        /// Offending byte address
        address: usize,
    },

    /// A pointer was required
    #[error("expected a heap pointer, found {0:?}")]
    NotAPointer(Value),

    /// A small integer was required
    #[error("expected a small integer, found {0:?}")]
    NotASmi(Value),
}

/// Result type for heap operations
pub type HeapResult<T> = std::result::Result<T, HeapError>;
