//! Stub traps.
//!
//! When a fast-path stub meets a case it cannot handle it stops with a trap.
//! There are two kinds:
//!
//! ```text
//! Trap::Fatal          precondition violated (non-function `new` target,
//!                      unreachable branch, bad heap access)
//! Trap::Unimplemented  a slow path that does not exist yet
//!                      (collection on exhaustion, operator deoptimization)
//! ```
//!
//! The stub layer performs no recovery. A caller treating an `Unimplemented`
//! trap as "deoptimize and retry in the interpreter" is expected.

use otter_stub_heap::HeapError;
use thiserror::Error;

/// Why a stub stopped.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Trap {
    /// Precondition violated
    #[error("fatal stub trap: {0}")]
    Fatal(FatalReason),

    /// The needed slow path is not implemented at this layer
    #[error("unhandled stub condition: {0}")]
    Unimplemented(Gap),
}

/// Fatal trap reasons.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FatalReason {
    /// `new` or `instanceof` target is not a function
    #[error("target is not a function")]
    NotAFunction,

    /// Call target is neither a function nor a code value
    #[error("value is not callable")]
    NotCallable,

    /// A branch marked unreachable was reached
    #[error("unreachable stub branch reached")]
    Unreachable,

    /// Heap read or write through an invalid address
    #[error("invalid heap access: {0}")]
    InvalidHeapAccess(HeapError),

    /// Small-integer primitive applied to a pointer
    #[error("expected a small integer operand")]
    NotASmi,

    /// Stub invoked with too few arguments
    #[error("missing stub argument {0}")]
    MissingArgument(usize),

    /// Nested stub calls exceeded the configured depth
    #[error("maximum stub call depth exceeded")]
    StackOverflow,

    /// The runtime has no entry for the requested id
    #[error("no runtime entry for {0}")]
    RuntimeUnavailable(String),
}

/// Slow paths missing at this layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Gap {
    /// Bump region exhausted; the collector must run before retrying
    #[error("heap region exhausted, collection required")]
    NeedsCollection,

    /// Operator fast path failed and there is no fallback
    #[error("deoptimization required ({0:?})")]
    Deoptimize(DeoptReason),
}

/// Why an operator stub gave up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeoptReason {
    /// Result left the small-integer range
    Overflow,
    /// An operand was a heap value
    NonSmiOperand,
}

impl Trap {
    /// Shorthand for a deoptimization trap.
    pub const fn deoptimize(reason: DeoptReason) -> Self {
        Trap::Unimplemented(Gap::Deoptimize(reason))
    }

    /// Whether this is a precondition violation.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Trap::Fatal(_))
    }

    /// Whether this marks a missing slow path.
    pub fn is_unimplemented(&self) -> bool {
        matches!(self, Trap::Unimplemented(_))
    }
}

impl From<HeapError> for Trap {
    fn from(value: HeapError) -> Self {
        match value {
            HeapError::NeedsCollection { .. } => Trap::Unimplemented(Gap::NeedsCollection),
            HeapError::NotASmi(_) => Trap::Fatal(FatalReason::NotASmi),
            other => Trap::Fatal(FatalReason::InvalidHeapAccess(other)),
        }
    }
}
