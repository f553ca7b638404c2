//! # Otter Stub CFG
//!
//! Stub bodies are explicit control-flow graphs: blocks of instructions,
//! block parameters as phi merges, and a single terminator per block.
//!
//! ```text
//! CfgBuilder ──finish──▶ Cfg ──CompileCfg::compile──▶ CompiledStub ──call──▶ Value | Trap
//! ```
//!
//! The executor runs a compiled stub against a [`Machine`] (heap + code
//! table) and a [`Runtime`] providing the general slow paths.

#![warn(clippy::all)]
#![warn(missing_docs)]

pub mod builder;
pub mod compiler;
pub mod config;
pub mod error;
pub mod exec;
pub mod ir;
pub mod runtime;
pub mod template;
pub mod trap;

pub use builder::CfgBuilder;
pub use compiler::{CfgCompiler, CompileCfg, CompiledStub, EntryPoint, StubHandle};
pub use config::ExecConfig;
pub use error::{CfgError, CfgResult};
pub use exec::Machine;
pub use ir::{BlockId, CallArgs, Cfg, Cmp, Cond, Inst, Literal, SmiOp, Terminator, Var};
pub use runtime::{NoRuntime, Runtime, RuntimeId};
pub use template::{IcHandle, Locals, StubConfig, StubTemplate};
pub use trap::{DeoptReason, FatalReason, Gap, Trap};
