//! Control-flow-graph IR.
//!
//! Values live in SSA variables. A block's parameters are its phi nodes:
//! every `Jump` into the block supplies one argument per parameter.
//!
//! ```text
//!   [Dense] ── jump Op(t3) ──┐
//!                            ▼
//!                      [Op(off)]  ← `off` is the merged offset
//!                            ▲
//!   [Key]   ── jump Op(t11) ─┘
//! ```
//!
//! Stub references are generic: a freshly built graph names the stubs it
//! calls, a compiled graph refers to them by dependency index.

use otter_stub_heap::EntityKind;

use crate::runtime::RuntimeId;
use crate::trap::Trap;

/// Name of a stub referenced from a body.
pub type StubName = String;

/// An SSA variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Var(pub(crate) u32);

impl Var {
    /// Position in the frame's register file.
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// A basic block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockId(pub(crate) u32);

impl BlockId {
    /// The entry block of every graph.
    pub const ENTRY: BlockId = BlockId(0);

    /// Position in the graph's block list.
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Constant operands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Literal {
    /// Small integer
    Smi(i64),
    /// `undefined`
    Undefined,
    /// `null`
    Null,
    /// Uninitialized slot marker
    Hole,
    /// `true`
    True,
    /// `false`
    False,
    /// Interned property name
    Atom(String),
}

/// Overflow-checked small-integer operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SmiOp {
    /// `lhs + rhs`
    Add,
    /// `lhs - rhs`
    Sub,
    /// `lhs * rhs`
    Mul,
    /// `lhs << rhs`
    Shl,
    /// `lhs | rhs` (never overflows)
    Or,
}

/// Comparison primitives. `>` and `>=` are expressed by swapping operands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cmp {
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `==`
    Eq,
    /// `!=`
    Ne,
}

impl Cmp {
    /// Apply the comparison.
    #[inline]
    pub fn eval<T: Ord>(self, lhs: T, rhs: T) -> bool {
        match self {
            Cmp::Lt => lhs < rhs,
            Cmp::Le => lhs <= rhs,
            Cmp::Eq => lhs == rhs,
            Cmp::Ne => lhs != rhs,
        }
    }
}

/// Branch conditions. The `then` successor is taken when the condition holds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Cond {
    /// Operand is a small integer
    IsSmi(Var),
    /// `(lhs & rhs) != 0` on small integers
    SmiTest(Var, Var),
    /// Numeric comparison of small integers
    SmiCompare(Cmp, Var, Var),
    /// Identity comparison of raw words
    PointerCompare(Cmp, Var, Var),
    /// The last checked small-integer operation overflowed
    Overflow,
}

/// Argument list of a call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallArgs {
    /// Explicit operands, in order
    List(Vec<Var>),
    /// Re-push `count` incoming arguments starting at `from`
    Forward {
        /// First incoming argument to forward
        from: usize,
        /// Small integer holding the number of arguments
        count: Var,
    },
}

/// Instructions. `S` is how other stubs are referenced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inst<S = StubName> {
    /// Positional stub argument
    LoadStubArg { dst: Var, index: usize },
    /// Positional call argument, `undefined` when absent
    LoadArg { dst: Var, index: usize },
    /// Call receiver
    This { dst: Var },
    /// Constant
    Literal { dst: Var, value: Literal },
    /// Inline-cache handle from the stub's config
    InlineCache { dst: Var },
    /// Canonical map of an entity kind
    CanonicalMap { dst: Var, kind: EntityKind },
    /// Read the tagged word at a fixed byte offset
    ReadTagged { dst: Var, base: Var, offset: usize },
    /// Write the tagged word at a fixed byte offset
    WriteTagged { base: Var, value: Var, offset: usize },
    /// Read the tagged word at a byte offset held in a small integer
    SmiReadTagged { dst: Var, base: Var, offset: Var },
    /// Write the tagged word at a byte offset held in a small integer
    SmiWriteTagged { base: Var, value: Var, offset: Var },
    /// Checked arithmetic; sets the overflow flag
    Smi { dst: Var, op: SmiOp, lhs: Var, rhs: Var },
    /// Checked negation; sets the overflow flag
    SmiNeg { dst: Var, src: Var },
    /// Pointer plus a small-integer byte count
    PointerAdd { dst: Var, base: Var, offset: Var },
    /// Store `value` into every word of `[start, end)`
    PointerFill { start: Var, end: Var, value: Var },
    /// Bump allocator cursor
    HeapCurrent { dst: Var },
    /// Bump allocator limit
    HeapLimit { dst: Var },
    /// Move the bump allocator cursor
    HeapSetCurrent { src: Var },
    /// Round a small-integer byte count up to the allocation alignment
    AlignSize { dst: Var, src: Var },
    /// Dispatch to a general runtime entry point
    CallRuntime { dst: Var, id: RuntimeId, args: Vec<Var> },
    /// Call another stub
    CallStub { dst: Var, stub: S, args: CallArgs },
    /// Callable code value for another stub
    StubRef { dst: Var, stub: S },
    /// Call a function or code value with a receiver
    Call { dst: Var, callee: Var, receiver: Var, args: CallArgs },
}

impl<S> Inst<S> {
    /// Stub referenced by this instruction, if any.
    pub fn stub(&self) -> Option<&S> {
        match self {
            Inst::CallStub { stub, .. } | Inst::StubRef { stub, .. } => Some(stub),
            _ => None,
        }
    }

    /// Rewrite the stub reference.
    pub fn map_stub<T, E>(self, f: impl FnOnce(S) -> Result<T, E>) -> Result<Inst<T>, E> {
        Ok(match self {
            Inst::CallStub { dst, stub, args } => Inst::CallStub {
                dst,
                stub: f(stub)?,
                args,
            },
            Inst::StubRef { dst, stub } => Inst::StubRef { dst, stub: f(stub)? },
            Inst::LoadStubArg { dst, index } => Inst::LoadStubArg { dst, index },
            Inst::LoadArg { dst, index } => Inst::LoadArg { dst, index },
            Inst::This { dst } => Inst::This { dst },
            Inst::Literal { dst, value } => Inst::Literal { dst, value },
            Inst::InlineCache { dst } => Inst::InlineCache { dst },
            Inst::CanonicalMap { dst, kind } => Inst::CanonicalMap { dst, kind },
            Inst::ReadTagged { dst, base, offset } => Inst::ReadTagged { dst, base, offset },
            Inst::WriteTagged {
                base,
                value,
                offset,
            } => Inst::WriteTagged {
                base,
                value,
                offset,
            },
            Inst::SmiReadTagged { dst, base, offset } => Inst::SmiReadTagged { dst, base, offset },
            Inst::SmiWriteTagged {
                base,
                value,
                offset,
            } => Inst::SmiWriteTagged {
                base,
                value,
                offset,
            },
            Inst::Smi { dst, op, lhs, rhs } => Inst::Smi { dst, op, lhs, rhs },
            Inst::SmiNeg { dst, src } => Inst::SmiNeg { dst, src },
            Inst::PointerAdd { dst, base, offset } => Inst::PointerAdd { dst, base, offset },
            Inst::PointerFill { start, end, value } => Inst::PointerFill { start, end, value },
            Inst::HeapCurrent { dst } => Inst::HeapCurrent { dst },
            Inst::HeapLimit { dst } => Inst::HeapLimit { dst },
            Inst::HeapSetCurrent { src } => Inst::HeapSetCurrent { src },
            Inst::AlignSize { dst, src } => Inst::AlignSize { dst, src },
            Inst::CallRuntime { dst, id, args } => Inst::CallRuntime { dst, id, args },
            Inst::Call {
                dst,
                callee,
                receiver,
                args,
            } => Inst::Call {
                dst,
                callee,
                receiver,
                args,
            },
        })
    }
}

/// Block terminators.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Terminator {
    /// Return a value, or `undefined`
    Return(Option<Var>),
    /// Unconditional jump supplying the target's parameters
    Jump { target: BlockId, args: Vec<Var> },
    /// Two-way branch; neither target may take parameters
    Branch {
        cond: Cond,
        then_block: BlockId,
        else_block: BlockId,
    },
    /// Stop with a trap
    Trap(Trap),
}

/// A basic block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block<S = StubName> {
    /// Phi nodes
    pub params: Vec<Var>,
    /// Straight-line body
    pub insts: Vec<Inst<S>>,
    /// Exit
    pub terminator: Terminator,
}

/// A verified stub body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cfg<S = StubName> {
    pub(crate) name: String,
    pub(crate) blocks: Vec<Block<S>>,
    pub(crate) var_count: usize,
}

impl<S> Cfg<S> {
    /// Stub name this body was built for.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Blocks, entry first.
    pub fn blocks(&self) -> &[Block<S>] {
        &self.blocks
    }

    /// Number of SSA variables.
    pub fn var_count(&self) -> usize {
        self.var_count
    }
}

impl Cfg<StubName> {
    /// Names of the stubs this body calls or references, in first-use order.
    pub fn dependencies(&self) -> Vec<&str> {
        let mut deps: Vec<&str> = Vec::new();
        for block in &self.blocks {
            for inst in &block.insts {
                if let Some(stub) = inst.stub() {
                    if !deps.contains(&stub.as_str()) {
                        deps.push(stub.as_str());
                    }
                }
            }
        }
        deps
    }
}
