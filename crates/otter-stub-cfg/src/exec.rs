//! Stub executor
//!
//! A [`Machine`] owns the heap and the code table. Compiled stubs run as a
//! register machine over their blocks:
//!
//! ```text
//!   block ──insts──▶ terminator ──┬─ Return  ─▶ Ok(value)
//!     ▲                           ├─ Trap    ─▶ Err(trap)
//!     └──── bind params ──────────┴─ Jump / Branch
//! ```
//!
//! Code values are Code entities whose `index` names a slot in the code
//! table; functions call through their `code` field.

use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use otter_stub_heap::allocator::align_size;
use otter_stub_heap::layout::{code, function, map};
use otter_stub_heap::value::{SMI_MAX, SMI_MIN};
use otter_stub_heap::{EntityKind, Heap, HeapError, Value};

use crate::compiler::{CompiledStub, EntryPoint, StubHandle};
use crate::config::ExecConfig;
use crate::ir::{CallArgs, Cond, Inst, Literal, SmiOp, Terminator, Var};
use crate::runtime::Runtime;
use crate::trap::{FatalReason, Trap};

/// Execution state shared by every stub call.
pub struct Machine {
    heap: Heap,
    code_table: Vec<StubHandle>,
    code_objects: FxHashMap<EntryPoint, Value>,
    depth: u32,
    config: ExecConfig,
}

impl Machine {
    /// Machine over `heap`, configured from the environment.
    pub fn new(heap: Heap) -> Self {
        Self::with_config(heap, ExecConfig::from_env())
    }

    /// Machine over `heap` with a custom config.
    pub fn with_config(heap: Heap, config: ExecConfig) -> Self {
        Self {
            heap,
            code_table: Vec::new(),
            code_objects: FxHashMap::default(),
            depth: 0,
            config,
        }
    }

    /// The heap.
    pub fn heap(&self) -> &Heap {
        &self.heap
    }

    /// The heap, mutably.
    pub fn heap_mut(&mut self) -> &mut Heap {
        &mut self.heap
    }

    /// Current call nesting.
    pub fn depth(&self) -> u32 {
        self.depth
    }

    pub(crate) fn enter(&mut self) -> Result<(), Trap> {
        if self.depth >= self.config.max_call_depth {
            return Err(Trap::Fatal(FatalReason::StackOverflow));
        }
        self.depth += 1;
        Ok(())
    }

    pub(crate) fn leave(&mut self) {
        self.depth = self.depth.saturating_sub(1);
    }

    /// Code entity for `stub`. One entity per entry point.
    pub fn code_value(&mut self, stub: &StubHandle) -> Result<Value, Trap> {
        if let Some(value) = self.code_objects.get(&stub.entry_point()) {
            return Ok(*value);
        }
        let index = i32::try_from(self.code_table.len())
            .map_err(|_| HeapError::OutOfBounds {
                address: self.code_table.len(),
            })?;
        let value = self.heap.allocate(EntityKind::Code, code::SIZE)?;
        self.heap.write_tagged(value, code::INDEX, Value::smi(index))?;
        self.code_table.push(stub.clone());
        self.code_objects.insert(stub.entry_point(), value);
        Ok(value)
    }

    /// Stub behind a Code entity.
    pub fn code_stub(&self, value: Value) -> Option<&StubHandle> {
        if self.heap.kind_of(value) != Some(EntityKind::Code) {
            return None;
        }
        let index = self.heap.read_smi(value, code::INDEX).ok()?;
        self.code_table.get(usize::try_from(index).ok()?)
    }

    /// Stub to run when calling `callee`: a Code entity directly, or a
    /// function through its `code` field.
    pub fn resolve_callable(&self, callee: Value) -> Result<StubHandle, Trap> {
        let not_callable = Trap::Fatal(FatalReason::NotCallable);
        if callee.is_smi() {
            return Err(not_callable);
        }
        if let Some(stub) = self.code_stub(callee) {
            return Ok(stub.clone());
        }
        if self.heap.map_has_flag(callee, map::flags::FN)? {
            let code = self.heap.read_tagged(callee, function::CODE)?;
            return self.code_stub(code).cloned().ok_or(not_callable);
        }
        Err(not_callable)
    }

    /// Call a function or code value with a receiver.
    pub fn call_value(
        &mut self,
        rt: &mut dyn Runtime,
        callee: Value,
        this: Value,
        args: &[Value],
    ) -> Result<Value, Trap> {
        let stub = self.resolve_callable(callee)?;
        stub.call_with_receiver(self, rt, this, args)
    }
}

impl std::fmt::Debug for Machine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Machine")
            .field("heap", &self.heap)
            .field("code_table", &self.code_table.len())
            .field("depth", &self.depth)
            .finish()
    }
}

// =============================================================================
// Interpreter
// =============================================================================

type ArgVec = SmallVec<[Value; 4]>;

struct Frame<'a> {
    regs: Vec<Value>,
    this: Value,
    args: &'a [Value],
    overflow: bool,
}

impl Frame<'_> {
    #[inline]
    fn get(&self, var: Var) -> Value {
        self.regs[var.index()]
    }

    #[inline]
    fn set(&mut self, var: Var, value: Value) {
        self.regs[var.index()] = value;
    }

    #[inline]
    fn smi(&self, var: Var) -> Result<i64, Trap> {
        self.get(var)
            .as_smi()
            .ok_or(Trap::Fatal(FatalReason::NotASmi))
    }

    fn address(&self, var: Var) -> Result<usize, Trap> {
        let value = self.get(var);
        value.address().ok_or(Trap::from(HeapError::NotAPointer(value)))
    }

    fn byte_count(&self, var: Var) -> Result<usize, Trap> {
        let n = self.smi(var)?;
        usize::try_from(n).map_err(|_| Trap::from(HeapError::OutOfBounds { address: 0 }))
    }
}

pub(crate) fn run(
    stub: &CompiledStub,
    vm: &mut Machine,
    rt: &mut dyn Runtime,
    this: Value,
    args: &[Value],
) -> Result<Value, Trap> {
    let undefined = vm.heap.undefined();
    let mut frame = Frame {
        regs: vec![undefined; stub.var_count],
        this,
        args,
        overflow: false,
    };

    let mut block = &stub.blocks[0];
    loop {
        for inst in &block.insts {
            step(stub, vm, rt, &mut frame, inst)?;
        }
        match &block.terminator {
            Terminator::Return(value) => {
                return Ok(value.map_or(undefined, |v| frame.get(v)));
            }
            Terminator::Jump { target, args } => {
                let values: ArgVec = args.iter().map(|a| frame.get(*a)).collect();
                block = &stub.blocks[target.index()];
                for (param, value) in block.params.iter().zip(values) {
                    frame.set(*param, value);
                }
            }
            Terminator::Branch {
                cond,
                then_block,
                else_block,
            } => {
                let taken = if eval_cond(&frame, cond)? {
                    then_block
                } else {
                    else_block
                };
                block = &stub.blocks[taken.index()];
            }
            Terminator::Trap(trap) => {
                tracing::trace!(stub = %stub.name, %trap, "stub trapped");
                return Err(trap.clone());
            }
        }
    }
}

fn eval_cond(frame: &Frame<'_>, cond: &Cond) -> Result<bool, Trap> {
    Ok(match cond {
        Cond::IsSmi(v) => frame.get(*v).is_smi(),
        Cond::SmiTest(a, b) => frame.smi(*a)? & frame.smi(*b)? != 0,
        Cond::SmiCompare(cmp, a, b) => cmp.eval(frame.smi(*a)?, frame.smi(*b)?),
        Cond::PointerCompare(cmp, a, b) => cmp.eval(frame.get(*a).raw(), frame.get(*b).raw()),
        Cond::Overflow => frame.overflow,
    })
}

/// Checked small-integer arithmetic. Returns the (possibly truncated) result
/// and whether it left the small-integer range.
fn smi_arith(op: SmiOp, lhs: i64, rhs: i64) -> (i64, bool) {
    let wide: Option<i128> = match op {
        SmiOp::Add => Some(i128::from(lhs) + i128::from(rhs)),
        SmiOp::Sub => Some(i128::from(lhs) - i128::from(rhs)),
        SmiOp::Mul => Some(i128::from(lhs) * i128::from(rhs)),
        SmiOp::Shl => u32::try_from(rhs)
            .ok()
            .filter(|shift| *shift < 64)
            .map(|shift| i128::from(lhs) << shift),
        SmiOp::Or => Some(i128::from(lhs | rhs)),
    };
    match wide
        .and_then(|w| i64::try_from(w).ok())
        .filter(|v| (SMI_MIN..=SMI_MAX).contains(v))
    {
        Some(v) => (v, false),
        None => (wide.map_or(0, |w| w as i64), true),
    }
}

fn stage_args(frame: &Frame<'_>, undefined: Value, args: &CallArgs) -> Result<ArgVec, Trap> {
    match args {
        CallArgs::List(vars) => Ok(vars.iter().map(|v| frame.get(*v)).collect()),
        CallArgs::Forward { from, count } => {
            let count = frame.byte_count(*count)?;
            Ok((0..count)
                .map(|i| frame.args.get(from + i).copied().unwrap_or(undefined))
                .collect())
        }
    }
}

fn literal(vm: &mut Machine, value: &Literal) -> Result<Value, Trap> {
    let roots = *vm.heap.roots();
    Ok(match value {
        Literal::Smi(n) => Value::try_smi(*n).ok_or(Trap::Fatal(FatalReason::NotASmi))?,
        Literal::Undefined => roots.undefined,
        Literal::Null => roots.null,
        Literal::Hole => roots.hole,
        Literal::True => roots.true_value,
        Literal::False => roots.false_value,
        Literal::Atom(name) => vm.heap.atom(name)?,
    })
}

fn step(
    stub: &CompiledStub,
    vm: &mut Machine,
    rt: &mut dyn Runtime,
    frame: &mut Frame<'_>,
    inst: &Inst<usize>,
) -> Result<(), Trap> {
    let undefined = vm.heap.undefined();
    match inst {
        Inst::LoadStubArg { dst, index } => {
            let value = frame
                .args
                .get(*index)
                .copied()
                .ok_or(Trap::Fatal(FatalReason::MissingArgument(*index)))?;
            frame.set(*dst, value);
        }
        Inst::LoadArg { dst, index } => {
            let value = frame.args.get(*index).copied().unwrap_or(undefined);
            frame.set(*dst, value);
        }
        Inst::This { dst } => frame.set(*dst, frame.this),
        Inst::Literal { dst, value } => {
            let value = literal(vm, value)?;
            frame.set(*dst, value);
        }
        Inst::InlineCache { dst } => {
            let ic = stub.ic.ok_or(Trap::Fatal(FatalReason::Unreachable))?;
            let value = Value::try_smi(i64::from(ic.0)).ok_or(Trap::Fatal(FatalReason::NotASmi))?;
            frame.set(*dst, value);
        }
        Inst::CanonicalMap { dst, kind } => frame.set(*dst, vm.heap.canonical_map(*kind)),
        Inst::ReadTagged { dst, base, offset } => {
            let value = vm.heap.read_tagged(frame.get(*base), *offset)?;
            frame.set(*dst, value);
        }
        Inst::WriteTagged {
            base,
            value,
            offset,
        } => {
            vm.heap
                .write_tagged(frame.get(*base), *offset, frame.get(*value))?;
        }
        Inst::SmiReadTagged { dst, base, offset } => {
            let offset = frame.byte_count(*offset)?;
            let value = vm.heap.read_tagged(frame.get(*base), offset)?;
            frame.set(*dst, value);
        }
        Inst::SmiWriteTagged {
            base,
            value,
            offset,
        } => {
            let offset = frame.byte_count(*offset)?;
            vm.heap
                .write_tagged(frame.get(*base), offset, frame.get(*value))?;
        }
        Inst::Smi { dst, op, lhs, rhs } => {
            let (result, overflow) = smi_arith(*op, frame.smi(*lhs)?, frame.smi(*rhs)?);
            frame.overflow = overflow;
            frame.set(*dst, Value::smi_wrapping(result));
        }
        Inst::SmiNeg { dst, src } => {
            let (result, overflow) = smi_arith(SmiOp::Sub, 0, frame.smi(*src)?);
            frame.overflow = overflow;
            frame.set(*dst, Value::smi_wrapping(result));
        }
        Inst::PointerAdd { dst, base, offset } => {
            let base = frame.address(*base)?;
            let delta = frame.smi(*offset)?;
            let address = i64::try_from(base)
                .ok()
                .and_then(|b| b.checked_add(delta))
                .and_then(|a| usize::try_from(a).ok())
                .filter(|a| a % 2 == 0)
                .ok_or(Trap::from(HeapError::OutOfBounds { address: base }))?;
            frame.set(*dst, Value::pointer(address));
        }
        Inst::PointerFill { start, end, value } => {
            let start = frame.address(*start)?;
            let end = frame.address(*end)?;
            vm.heap.fill(start, end, frame.get(*value))?;
        }
        Inst::HeapCurrent { dst } => {
            frame.set(*dst, Value::pointer(vm.heap.allocator().current()));
        }
        Inst::HeapLimit { dst } => {
            frame.set(*dst, Value::pointer(vm.heap.allocator().limit()));
        }
        Inst::HeapSetCurrent { src } => {
            let current = frame.address(*src)?;
            vm.heap.set_current(current)?;
        }
        Inst::AlignSize { dst, src } => {
            let size = align_size(frame.byte_count(*src)?);
            let value = i64::try_from(size)
                .ok()
                .and_then(Value::try_smi)
                .ok_or(Trap::Fatal(FatalReason::NotASmi))?;
            frame.set(*dst, value);
        }
        Inst::CallRuntime { dst, id, args } => {
            let values: ArgVec = args.iter().map(|a| frame.get(*a)).collect();
            let result = rt.call(vm, *id, &values)?;
            frame.set(*dst, result);
        }
        Inst::CallStub { dst, stub: dep, args } => {
            let values = stage_args(frame, undefined, args)?;
            let result = stub.deps[*dep].call(vm, rt, &values)?;
            frame.set(*dst, result);
        }
        Inst::StubRef { dst, stub: dep } => {
            let value = vm.code_value(&stub.deps[*dep])?;
            frame.set(*dst, value);
        }
        Inst::Call {
            dst,
            callee,
            receiver,
            args,
        } => {
            let values = stage_args(frame, undefined, args)?;
            let result = vm.call_value(rt, frame.get(*callee), frame.get(*receiver), &values)?;
            frame.set(*dst, result);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::CfgBuilder;
    use crate::compiler::{CfgCompiler, CompileCfg};
    use crate::ir::Cmp;
    use crate::runtime::NoRuntime;
    use crate::template::StubConfig;
    use crate::trap::{DeoptReason, Gap};
    use otter_stub_heap::HeapConfig;

    fn machine() -> Machine {
        Machine::new(Heap::with_config(HeapConfig::with_region_size(64 * 1024)).unwrap())
    }

    fn checked_add() -> StubHandle {
        let mut b = CfgBuilder::new("add");
        let ok = b.create_block();
        let overflow = b.create_block();
        let l = b.load_stub_arg(0);
        let r = b.load_stub_arg(1);
        let sum = b.smi_add(l, r);
        b.branch(Cond::Overflow, overflow, ok);
        b.switch_to_block(ok);
        b.ret(sum);
        b.switch_to_block(overflow);
        b.trap(Trap::deoptimize(DeoptReason::Overflow));
        let cfg = b.finish().unwrap();
        CfgCompiler::new()
            .compile(&cfg, &StubConfig::new(), Vec::new())
            .unwrap()
    }

    #[test]
    fn smi_arith_flags_overflow() {
        assert_eq!(smi_arith(SmiOp::Add, 2, 3), (5, false));
        assert!(smi_arith(SmiOp::Add, SMI_MAX, 1).1);
        assert!(smi_arith(SmiOp::Sub, SMI_MIN, 1).1);
        assert!(smi_arith(SmiOp::Mul, SMI_MAX, 2).1);
        assert_eq!(smi_arith(SmiOp::Shl, 3, 3), (24, false));
        assert!(smi_arith(SmiOp::Shl, 1, 64).1);
        assert!(smi_arith(SmiOp::Sub, 0, SMI_MIN).1);
        assert_eq!(smi_arith(SmiOp::Or, 4, 1), (5, false));
    }

    #[test]
    fn checked_add_returns_or_traps() {
        let mut vm = machine();
        let add = checked_add();
        let sum = add
            .call(&mut vm, &mut NoRuntime, &[Value::smi(40), Value::smi(2)])
            .unwrap();
        assert_eq!(sum.as_smi(), Some(42));

        let max = Value::try_smi(SMI_MAX).unwrap();
        let err = add
            .call(&mut vm, &mut NoRuntime, &[max, Value::smi(1)])
            .unwrap_err();
        assert_eq!(err, Trap::Unimplemented(Gap::Deoptimize(DeoptReason::Overflow)));
        assert_eq!(vm.depth(), 0);
    }

    #[test]
    fn missing_stub_argument_traps() {
        let mut vm = machine();
        let err = checked_add()
            .call(&mut vm, &mut NoRuntime, &[Value::smi(1)])
            .unwrap_err();
        assert_eq!(err, Trap::Fatal(FatalReason::MissingArgument(1)));
    }

    #[test]
    fn loop_with_phi_counts_down() {
        // sum = 0; while n != 0 { sum += n; n -= 1 }
        let mut b = CfgBuilder::new("triangle");
        let head = b.create_block();
        let body = b.create_block();
        let exit = b.create_block();
        let n_phi = b.append_block_param(head);
        let sum_phi = b.append_block_param(head);

        let n0 = b.load_stub_arg(0);
        let zero = b.smi(0);
        b.jump(head, &[n0, zero]);

        b.switch_to_block(head);
        let zero = b.smi(0);
        b.branch_smi_cmp(Cmp::Ne, n_phi, zero, body, exit);

        b.switch_to_block(body);
        let sum = b.smi_add(sum_phi, n_phi);
        let one = b.smi(1);
        let n = b.smi_sub(n_phi, one);
        b.jump(head, &[n, sum]);

        b.switch_to_block(exit);
        b.ret(sum_phi);

        let cfg = b.finish().unwrap();
        let stub = CfgCompiler::new()
            .compile(&cfg, &StubConfig::new(), Vec::new())
            .unwrap();
        let mut vm = machine();
        let result = stub.call(&mut vm, &mut NoRuntime, &[Value::smi(10)]).unwrap();
        assert_eq!(result.as_smi(), Some(55));
    }

    #[test]
    fn code_values_are_deduplicated_and_callable() {
        let mut vm = machine();
        let add = checked_add();
        let a = vm.code_value(&add).unwrap();
        let b = vm.code_value(&add).unwrap();
        assert_eq!(a, b);
        assert_eq!(vm.heap().kind_of(a), Some(EntityKind::Code));

        let undefined = vm.heap().undefined();
        let result = vm
            .call_value(&mut NoRuntime, a, undefined, &[Value::smi(1), Value::smi(2)])
            .unwrap();
        assert_eq!(result.as_smi(), Some(3));
    }

    #[test]
    fn smi_callee_is_not_callable() {
        let mut vm = machine();
        let undefined = vm.heap().undefined();
        let err = vm
            .call_value(&mut NoRuntime, Value::smi(1), undefined, &[])
            .unwrap_err();
        assert_eq!(err, Trap::Fatal(FatalReason::NotCallable));
    }

    #[test]
    fn runaway_recursion_hits_depth_limit() {
        let compiler = CfgCompiler::new();
        let mut b = CfgBuilder::new("recurse");
        let this = b.this();
        let r = b.call(this, this, &[]);
        b.ret(r);
        let stub = compiler
            .compile(&b.finish().unwrap(), &StubConfig::new(), Vec::new())
            .unwrap();

        let heap = Heap::with_config(HeapConfig::with_region_size(64 * 1024)).unwrap();
        let mut vm = Machine::with_config(heap, ExecConfig { max_call_depth: 16 });
        let code = vm.code_value(&stub).unwrap();
        let err = stub
            .call_with_receiver(&mut vm, &mut NoRuntime, code, &[])
            .unwrap_err();
        assert_eq!(err, Trap::Fatal(FatalReason::StackOverflow));
        assert_eq!(vm.depth(), 0);
    }

    #[test]
    fn runtime_calls_without_runtime_trap() {
        let mut b = CfgBuilder::new("rt");
        let x = b.load_stub_arg(0);
        let r = b.call_runtime(crate::runtime::RuntimeId::GetProperty, &[x]);
        b.ret(r);
        let stub = CfgCompiler::new()
            .compile(&b.finish().unwrap(), &StubConfig::new(), Vec::new())
            .unwrap();
        let mut vm = machine();
        let err = stub
            .call(&mut vm, &mut NoRuntime, &[Value::smi(0)])
            .unwrap_err();
        assert_eq!(
            err,
            Trap::Fatal(FatalReason::RuntimeUnavailable("getProperty".to_string()))
        );
    }
}
