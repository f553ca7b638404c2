//! Registry errors

use otter_stub_cfg::{CfgError, Trap};
use thiserror::Error;

/// Errors surfaced by the stub registry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StubError {
    /// No stub was declared under this name.
    #[error("stub `{0}` not found")]
    NotFound(String),

    /// Compiling the stub requires compiling itself. Holds the chain, first
    /// and last entries name the same stub.
    #[error("cyclic stub dependency: {}", .0.join(" -> "))]
    CyclicDependency(Vec<String>),

    /// The template or compiler rejected the body.
    #[error("stub compilation failed: {0}")]
    Compile(#[from] CfgError),

    /// The stub trapped while running.
    #[error(transparent)]
    Trap(#[from] Trap),
}

/// Result type for registry operations
pub type StubResult<T> = std::result::Result<T, StubError>;
