//! CFG construction and compilation errors

use thiserror::Error;

/// Errors produced while building or compiling a stub body.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CfgError {
    /// A block was left without a terminator.
    #[error("block {block} of `{stub}` has no terminator")]
    UnterminatedBlock {
        /// Stub being built
        stub: String,
        /// Index of the open block
        block: usize,
    },

    /// A second terminator was emitted into a block.
    #[error("block {block} of `{stub}` is already terminated")]
    AlreadyTerminated {
        /// Stub being built
        stub: String,
        /// Index of the terminated block
        block: usize,
    },

    /// Jump or branch to a block that does not exist.
    #[error("`{stub}` references unknown block {block}")]
    UnknownBlock {
        /// Stub being built
        stub: String,
        /// Index that was referenced
        block: usize,
    },

    /// Jump argument count differs from the target's parameter count.
    #[error("jump to block {block} of `{stub}` passes {given} args, expected {expected}")]
    ParamMismatch {
        /// Stub being built
        stub: String,
        /// Jump target
        block: usize,
        /// Arguments passed by the jump
        given: usize,
        /// Parameters declared on the target
        expected: usize,
    },

    /// Branch successors cannot receive values.
    #[error("branch target {block} of `{stub}` takes parameters")]
    BranchTargetHasParams {
        /// Stub being built
        stub: String,
        /// Branch target with parameters
        block: usize,
    },

    /// A template read a local the stub config does not provide.
    #[error("stub config has no local `{0}`")]
    MissingLocal(String),

    /// The body reads an inline-cache handle but the config has none.
    #[error("`{0}` uses an inline cache but none was configured")]
    MissingInlineCache(String),

    /// A referenced stub was not supplied to the compiler.
    #[error("`{stub}` depends on `{dependency}`, which was not supplied")]
    UnresolvedDependency {
        /// Stub being compiled
        stub: String,
        /// Name of the missing dependency
        dependency: String,
    },
}

/// Result type for CFG operations
pub type CfgResult<T> = std::result::Result<T, CfgError>;
