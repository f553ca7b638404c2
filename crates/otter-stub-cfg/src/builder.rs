//! Stub body builder
//!
//! Instructions are appended to the current block; each helper returns the
//! variable it defines. Structural errors are recorded and reported by
//! [`CfgBuilder::finish`], so templates read as straight-line code.

use otter_stub_heap::EntityKind;

use crate::error::{CfgError, CfgResult};
use crate::ir::{
    Block, BlockId, CallArgs, Cfg, Cmp, Cond, Inst, Literal, SmiOp, StubName, Terminator, Var,
};
use crate::runtime::RuntimeId;
use crate::trap::Trap;

struct BlockData {
    params: Vec<Var>,
    insts: Vec<Inst>,
    terminator: Option<Terminator>,
}

impl BlockData {
    fn new() -> Self {
        Self {
            params: Vec::new(),
            insts: Vec::new(),
            terminator: None,
        }
    }
}

/// Builds one stub body.
pub struct CfgBuilder {
    name: String,
    blocks: Vec<BlockData>,
    current: BlockId,
    next_var: u32,
    error: Option<CfgError>,
}

impl CfgBuilder {
    /// Start a body with its entry block selected.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            blocks: vec![BlockData::new()],
            current: BlockId::ENTRY,
            next_var: 0,
            error: None,
        }
    }

    /// Stub name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Append an empty block.
    pub fn create_block(&mut self) -> BlockId {
        let id = BlockId(self.blocks.len() as u32);
        self.blocks.push(BlockData::new());
        id
    }

    /// Add a parameter (phi) to `block`.
    pub fn append_block_param(&mut self, block: BlockId) -> Var {
        let var = self.fresh();
        match self.blocks.get_mut(block.index()) {
            Some(data) => data.params.push(var),
            None => self.record(CfgError::UnknownBlock {
                stub: self.name.clone(),
                block: block.index(),
            }),
        }
        var
    }

    /// Direct subsequent instructions to `block`.
    pub fn switch_to_block(&mut self, block: BlockId) {
        if block.index() >= self.blocks.len() {
            self.record(CfgError::UnknownBlock {
                stub: self.name.clone(),
                block: block.index(),
            });
            return;
        }
        self.current = block;
    }

    fn fresh(&mut self) -> Var {
        let var = Var(self.next_var);
        self.next_var += 1;
        var
    }

    fn record(&mut self, error: CfgError) {
        if self.error.is_none() {
            self.error = Some(error);
        }
    }

    fn push(&mut self, inst: Inst) {
        let block = self.current.index();
        if self.blocks[block].terminator.is_some() {
            self.record(CfgError::AlreadyTerminated {
                stub: self.name.clone(),
                block,
            });
            return;
        }
        self.blocks[block].insts.push(inst);
    }

    fn define(&mut self, make: impl FnOnce(Var) -> Inst) -> Var {
        let dst = self.fresh();
        self.push(make(dst));
        dst
    }

    fn terminate(&mut self, terminator: Terminator) {
        let block = self.current.index();
        if self.blocks[block].terminator.is_some() {
            self.record(CfgError::AlreadyTerminated {
                stub: self.name.clone(),
                block,
            });
            return;
        }
        self.blocks[block].terminator = Some(terminator);
    }

    // -------------------------------------------------------------------------
    // Arguments and constants
    // -------------------------------------------------------------------------

    /// Positional stub argument.
    pub fn load_stub_arg(&mut self, index: usize) -> Var {
        self.define(|dst| Inst::LoadStubArg { dst, index })
    }

    /// Positional call argument (`undefined` when absent).
    pub fn load_arg(&mut self, index: usize) -> Var {
        self.define(|dst| Inst::LoadArg { dst, index })
    }

    /// Call receiver.
    pub fn this(&mut self) -> Var {
        self.define(|dst| Inst::This { dst })
    }

    /// Constant.
    pub fn literal(&mut self, value: Literal) -> Var {
        self.define(|dst| Inst::Literal { dst, value })
    }

    /// Small-integer constant.
    pub fn smi(&mut self, value: i64) -> Var {
        self.literal(Literal::Smi(value))
    }

    /// `undefined`.
    pub fn undefined(&mut self) -> Var {
        self.literal(Literal::Undefined)
    }

    /// Hole.
    pub fn hole(&mut self) -> Var {
        self.literal(Literal::Hole)
    }

    /// Interned property name.
    pub fn atom(&mut self, name: &str) -> Var {
        self.literal(Literal::Atom(name.to_string()))
    }

    /// Inline-cache handle from the config.
    pub fn inline_cache(&mut self) -> Var {
        self.define(|dst| Inst::InlineCache { dst })
    }

    /// Canonical map of `kind`.
    pub fn canonical_map(&mut self, kind: EntityKind) -> Var {
        self.define(|dst| Inst::CanonicalMap { dst, kind })
    }

    // -------------------------------------------------------------------------
    // Memory
    // -------------------------------------------------------------------------

    /// `base[offset]`
    pub fn read_tagged(&mut self, base: Var, offset: usize) -> Var {
        self.define(|dst| Inst::ReadTagged { dst, base, offset })
    }

    /// `base[offset] = value`
    pub fn write_tagged(&mut self, base: Var, value: Var, offset: usize) {
        self.push(Inst::WriteTagged {
            base,
            value,
            offset,
        });
    }

    /// `base[offset]` with a small-integer offset.
    pub fn smi_read_tagged(&mut self, base: Var, offset: Var) -> Var {
        self.define(|dst| Inst::SmiReadTagged { dst, base, offset })
    }

    /// `base[offset] = value` with a small-integer offset.
    pub fn smi_write_tagged(&mut self, base: Var, value: Var, offset: Var) {
        self.push(Inst::SmiWriteTagged {
            base,
            value,
            offset,
        });
    }

    // -------------------------------------------------------------------------
    // Small integers
    // -------------------------------------------------------------------------

    /// Checked arithmetic.
    pub fn smi_op(&mut self, op: SmiOp, lhs: Var, rhs: Var) -> Var {
        self.define(|dst| Inst::Smi { dst, op, lhs, rhs })
    }

    /// `lhs + rhs`
    pub fn smi_add(&mut self, lhs: Var, rhs: Var) -> Var {
        self.smi_op(SmiOp::Add, lhs, rhs)
    }

    /// `lhs - rhs`
    pub fn smi_sub(&mut self, lhs: Var, rhs: Var) -> Var {
        self.smi_op(SmiOp::Sub, lhs, rhs)
    }

    /// `lhs * rhs`
    pub fn smi_mul(&mut self, lhs: Var, rhs: Var) -> Var {
        self.smi_op(SmiOp::Mul, lhs, rhs)
    }

    /// `lhs << rhs`
    pub fn smi_shl(&mut self, lhs: Var, rhs: Var) -> Var {
        self.smi_op(SmiOp::Shl, lhs, rhs)
    }

    /// `lhs | rhs`
    pub fn smi_or(&mut self, lhs: Var, rhs: Var) -> Var {
        self.smi_op(SmiOp::Or, lhs, rhs)
    }

    /// Checked negation.
    pub fn smi_neg(&mut self, src: Var) -> Var {
        self.define(|dst| Inst::SmiNeg { dst, src })
    }

    // -------------------------------------------------------------------------
    // Pointers and the bump region
    // -------------------------------------------------------------------------

    /// `base + offset` bytes.
    pub fn pointer_add(&mut self, base: Var, offset: Var) -> Var {
        self.define(|dst| Inst::PointerAdd { dst, base, offset })
    }

    /// Fill `[start, end)` with `value`.
    pub fn pointer_fill(&mut self, start: Var, end: Var, value: Var) {
        self.push(Inst::PointerFill { start, end, value });
    }

    /// Bump cursor.
    pub fn heap_current(&mut self) -> Var {
        self.define(|dst| Inst::HeapCurrent { dst })
    }

    /// Bump limit.
    pub fn heap_limit(&mut self) -> Var {
        self.define(|dst| Inst::HeapLimit { dst })
    }

    /// Move the bump cursor.
    pub fn heap_set_current(&mut self, src: Var) {
        self.push(Inst::HeapSetCurrent { src });
    }

    /// Round a byte count up to the allocation alignment.
    pub fn align_size(&mut self, src: Var) -> Var {
        self.define(|dst| Inst::AlignSize { dst, src })
    }

    // -------------------------------------------------------------------------
    // Calls
    // -------------------------------------------------------------------------

    /// General runtime entry point.
    pub fn call_runtime(&mut self, id: RuntimeId, args: &[Var]) -> Var {
        let args = args.to_vec();
        self.define(|dst| Inst::CallRuntime { dst, id, args })
    }

    /// Call another stub.
    pub fn call_stub(&mut self, stub: &str, args: &[Var]) -> Var {
        let args = CallArgs::List(args.to_vec());
        let stub: StubName = stub.to_string();
        self.define(|dst| Inst::CallStub { dst, stub, args })
    }

    /// Callable value for another stub.
    pub fn stub_ref(&mut self, stub: &str) -> Var {
        let stub: StubName = stub.to_string();
        self.define(|dst| Inst::StubRef { dst, stub })
    }

    /// Call a function or code value.
    pub fn call(&mut self, callee: Var, receiver: Var, args: &[Var]) -> Var {
        let args = CallArgs::List(args.to_vec());
        self.define(|dst| Inst::Call {
            dst,
            callee,
            receiver,
            args,
        })
    }

    /// Call a function or code value, forwarding incoming arguments.
    pub fn call_forward(&mut self, callee: Var, receiver: Var, from: usize, count: Var) -> Var {
        let args = CallArgs::Forward { from, count };
        self.define(|dst| Inst::Call {
            dst,
            callee,
            receiver,
            args,
        })
    }

    // -------------------------------------------------------------------------
    // Terminators
    // -------------------------------------------------------------------------

    /// Return `value`.
    pub fn ret(&mut self, value: Var) {
        self.terminate(Terminator::Return(Some(value)));
    }

    /// Return `undefined`.
    pub fn ret_void(&mut self) {
        self.terminate(Terminator::Return(None));
    }

    /// Jump to `target`, binding its parameters.
    pub fn jump(&mut self, target: BlockId, args: &[Var]) {
        self.terminate(Terminator::Jump {
            target,
            args: args.to_vec(),
        });
    }

    /// Two-way branch.
    pub fn branch(&mut self, cond: Cond, then_block: BlockId, else_block: BlockId) {
        self.terminate(Terminator::Branch {
            cond,
            then_block,
            else_block,
        });
    }

    /// Branch on `IsSmi(value)`.
    pub fn branch_smi(&mut self, value: Var, smi: BlockId, non_smi: BlockId) {
        self.branch(Cond::IsSmi(value), smi, non_smi);
    }

    /// Branch on a small-integer comparison.
    pub fn branch_smi_cmp(
        &mut self,
        cmp: Cmp,
        lhs: Var,
        rhs: Var,
        then_block: BlockId,
        else_block: BlockId,
    ) {
        self.branch(Cond::SmiCompare(cmp, lhs, rhs), then_block, else_block);
    }

    /// Leave for `overflow` if the last checked operation overflowed,
    /// otherwise continue in a fresh block.
    pub fn guard_overflow(&mut self, overflow: BlockId) {
        let ok = self.create_block();
        self.branch(Cond::Overflow, overflow, ok);
        self.switch_to_block(ok);
    }

    /// Stop with `trap`.
    pub fn trap(&mut self, trap: Trap) {
        self.terminate(Terminator::Trap(trap));
    }

    // -------------------------------------------------------------------------
    // Verification
    // -------------------------------------------------------------------------

    /// Verify and produce the body.
    pub fn finish(self) -> CfgResult<Cfg> {
        if let Some(error) = self.error {
            return Err(error);
        }

        let params: Vec<usize> = self.blocks.iter().map(|b| b.params.len()).collect();
        let mut blocks = Vec::with_capacity(self.blocks.len());
        for (index, data) in self.blocks.into_iter().enumerate() {
            let terminator = data.terminator.ok_or_else(|| CfgError::UnterminatedBlock {
                stub: self.name.clone(),
                block: index,
            })?;
            verify_terminator(&self.name, &terminator, &params)?;
            blocks.push(Block {
                params: data.params,
                insts: data.insts,
                terminator,
            });
        }

        tracing::trace!(
            stub = %self.name,
            blocks = blocks.len(),
            vars = self.next_var,
            "cfg built"
        );

        Ok(Cfg {
            name: self.name,
            blocks,
            var_count: self.next_var as usize,
        })
    }
}

fn verify_terminator(stub: &str, terminator: &Terminator, params: &[usize]) -> CfgResult<()> {
    let expect_block = |block: BlockId| {
        params
            .get(block.index())
            .copied()
            .ok_or_else(|| CfgError::UnknownBlock {
                stub: stub.to_string(),
                block: block.index(),
            })
    };

    match terminator {
        Terminator::Jump { target, args } => {
            let expected = expect_block(*target)?;
            if expected != args.len() {
                return Err(CfgError::ParamMismatch {
                    stub: stub.to_string(),
                    block: target.index(),
                    given: args.len(),
                    expected,
                });
            }
        }
        Terminator::Branch {
            then_block,
            else_block,
            ..
        } => {
            for block in [*then_block, *else_block] {
                if expect_block(block)? != 0 {
                    return Err(CfgError::BranchTargetHasParams {
                        stub: stub.to_string(),
                        block: block.index(),
                    });
                }
            }
        }
        Terminator::Return(_) | Terminator::Trap(_) => {}
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trap::FatalReason;

    #[test]
    fn builds_diamond_with_phi() {
        let mut b = CfgBuilder::new("diamond");
        let then_block = b.create_block();
        let else_block = b.create_block();
        let join = b.create_block();
        let res = b.append_block_param(join);

        let x = b.load_stub_arg(0);
        b.branch_smi(x, then_block, else_block);

        b.switch_to_block(then_block);
        let one = b.smi(1);
        b.jump(join, &[one]);

        b.switch_to_block(else_block);
        let two = b.smi(2);
        b.jump(join, &[two]);

        b.switch_to_block(join);
        b.ret(res);

        let cfg = b.finish().unwrap();
        assert_eq!(cfg.blocks().len(), 4);
        assert_eq!(cfg.blocks()[join.index()].params, vec![res]);
        assert!(cfg.dependencies().is_empty());
    }

    #[test]
    fn unterminated_block_is_rejected() {
        let mut b = CfgBuilder::new("open");
        let _dangling = b.create_block();
        b.ret_void();
        assert!(matches!(
            b.finish(),
            Err(CfgError::UnterminatedBlock { block: 1, .. })
        ));
    }

    #[test]
    fn jump_arity_is_checked() {
        let mut b = CfgBuilder::new("arity");
        let target = b.create_block();
        let _p = b.append_block_param(target);
        b.jump(target, &[]);
        b.switch_to_block(target);
        b.ret_void();
        assert!(matches!(
            b.finish(),
            Err(CfgError::ParamMismatch { given: 0, expected: 1, .. })
        ));
    }

    #[test]
    fn branch_into_phi_block_is_rejected() {
        let mut b = CfgBuilder::new("phi-branch");
        let a = b.create_block();
        let c = b.create_block();
        let _p = b.append_block_param(a);
        let x = b.load_stub_arg(0);
        b.branch_smi(x, a, c);
        b.switch_to_block(a);
        b.ret_void();
        b.switch_to_block(c);
        b.trap(Trap::Fatal(FatalReason::Unreachable));
        assert!(matches!(
            b.finish(),
            Err(CfgError::BranchTargetHasParams { .. })
        ));
    }

    #[test]
    fn double_terminator_is_rejected() {
        let mut b = CfgBuilder::new("twice");
        b.ret_void();
        b.ret_void();
        assert!(matches!(b.finish(), Err(CfgError::AlreadyTerminated { .. })));
    }

    #[test]
    fn dependencies_are_deduplicated_in_order() {
        let mut b = CfgBuilder::new("deps");
        let size = b.smi(24);
        let _a = b.call_stub("allocTagged/object", &[size]);
        let _g = b.stub_ref("FunctionProtoGetter");
        let _b = b.call_stub("allocTagged/object", &[size]);
        b.ret_void();
        let cfg = b.finish().unwrap();
        assert_eq!(
            cfg.dependencies(),
            vec!["allocTagged/object", "FunctionProtoGetter"]
        );
    }
}
