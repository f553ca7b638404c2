//! Binary operator stubs
//!
//! Arithmetic and comparison take the small-integer fast path and trap for
//! deoptimization otherwise. Comparisons only use `<`, `<=`, `==` and `!=`;
//! `>` and `>=` swap the operands.
//!
//! `instanceof` walks map prototypes until it meets the function's instance
//! map, a small-integer prototype or a map whose prototype's map is itself:
//!
//! ```text
//!   NotSmi ──▶ Loop(m) ── m == fn.instanceMap ──▶ True ──┐
//!                ▲   └──▶ Next: p = m.proto ─ p is smi ───┤
//!                │         m' = p.map                    ├─▶ Join(res)
//!                │         ├─ m' != m ─▶ Continue ─┐     │
//!                └─────────┼───────────────────────┘     │
//!                          └─ m' == m ─▶ False ──────────┘
//! ```

use otter_stub_cfg::{
    Cfg, CfgBuilder, CfgResult, Cmp, Cond, DeoptReason, Literal, SmiOp, StubConfig, Trap,
};
use otter_stub_heap::layout::{base, function, map};

use crate::catalogue::types;
use crate::registry::StubRegistry;

/// Binary operators with a stub.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    /// `+`
    Add,
    /// `-`
    Sub,
    /// `*`
    Mul,
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `>=`
    Ge,
    /// `==`
    Eq,
    /// `!=`
    Ne,
    /// `instanceof`
    InstanceOf,
}

impl BinaryOp {
    /// Every operator.
    pub const ALL: [BinaryOp; 10] = [
        BinaryOp::Add,
        BinaryOp::Sub,
        BinaryOp::Mul,
        BinaryOp::Lt,
        BinaryOp::Le,
        BinaryOp::Gt,
        BinaryOp::Ge,
        BinaryOp::Eq,
        BinaryOp::Ne,
        BinaryOp::InstanceOf,
    ];

    /// Source symbol.
    pub const fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::InstanceOf => "instanceof",
        }
    }

    /// `binary/<symbol>`
    pub fn stub_name(self) -> String {
        format!("binary/{}", self.symbol())
    }

    /// Arithmetic primitive, for `+ - *`.
    pub const fn arith(self) -> Option<SmiOp> {
        match self {
            BinaryOp::Add => Some(SmiOp::Add),
            BinaryOp::Sub => Some(SmiOp::Sub),
            BinaryOp::Mul => Some(SmiOp::Mul),
            _ => None,
        }
    }

    /// Comparison primitive and whether operands are swapped.
    pub const fn compare(self) -> Option<(Cmp, bool)> {
        match self {
            BinaryOp::Lt => Some((Cmp::Lt, false)),
            BinaryOp::Le => Some((Cmp::Le, false)),
            BinaryOp::Gt => Some((Cmp::Lt, true)),
            BinaryOp::Ge => Some((Cmp::Le, true)),
            BinaryOp::Eq => Some((Cmp::Eq, true)),
            BinaryOp::Ne => Some((Cmp::Ne, true)),
            _ => None,
        }
    }
}

/// Declare the binary family.
pub fn declare(registry: &StubRegistry) {
    for op in BinaryOp::ALL {
        let config = match op {
            BinaryOp::InstanceOf => StubConfig::new()
                .with_local("mapOffset", base::MAP as i64)
                .with_local("mapProto", map::PROTO as i64)
                .with_local("instanceMap", function::INSTANCE_MAP as i64),
            _ => StubConfig::new(),
        };
        registry.declare(
            op.stub_name(),
            move |name: &str, config: &StubConfig| build_binary(name, op, config),
            config,
        );
    }
}

/// `(left, right) -> result`
pub fn build_binary(name: &str, op: BinaryOp, config: &StubConfig) -> CfgResult<Cfg> {
    if let Some(arith) = op.arith() {
        return build_math(name, arith);
    }
    if let Some((cmp, swap)) = op.compare() {
        return build_logic(name, cmp, swap);
    }
    build_instance_of(name, config)
}

fn build_math(name: &str, arith: SmiOp) -> CfgResult<Cfg> {
    let mut b = CfgBuilder::new(name);
    let left_smi = b.create_block();
    let left_non_smi = b.create_block();
    let right_smi = b.create_block();
    let right_non_smi = b.create_block();
    let success = b.create_block();
    let overflow = b.create_block();

    let left = b.load_stub_arg(0);
    b.branch_smi(left, left_smi, left_non_smi);

    b.switch_to_block(left_smi);
    let right = b.load_stub_arg(1);
    b.branch_smi(right, right_smi, right_non_smi);

    b.switch_to_block(right_smi);
    let r = b.smi_op(arith, left, right);
    b.branch(Cond::Overflow, overflow, success);

    b.switch_to_block(success);
    b.ret(r);

    b.switch_to_block(left_non_smi);
    b.jump(right_non_smi, &[]);

    b.switch_to_block(right_non_smi);
    b.trap(Trap::deoptimize(DeoptReason::NonSmiOperand));

    b.switch_to_block(overflow);
    b.trap(Trap::deoptimize(DeoptReason::Overflow));

    b.finish()
}

fn build_logic(name: &str, cmp: Cmp, swap: bool) -> CfgResult<Cfg> {
    let mut b = CfgBuilder::new(name);
    let left_smi = b.create_block();
    let left_non_smi = b.create_block();
    let right_smi = b.create_block();
    let right_non_smi = b.create_block();
    let truthy = b.create_block();
    let falsy = b.create_block();

    let left = b.load_stub_arg(0);
    b.branch_smi(left, left_smi, left_non_smi);

    b.switch_to_block(left_smi);
    let right = b.load_stub_arg(1);
    b.branch_smi(right, right_smi, right_non_smi);

    b.switch_to_block(right_smi);
    let (lhs, rhs) = if swap { (right, left) } else { (left, right) };
    b.branch_smi_cmp(cmp, lhs, rhs, truthy, falsy);

    b.switch_to_block(truthy);
    let r0 = b.literal(Literal::True);
    b.ret(r0);

    b.switch_to_block(falsy);
    let r1 = b.literal(Literal::False);
    b.ret(r1);

    b.switch_to_block(left_non_smi);
    b.jump(right_non_smi, &[]);

    b.switch_to_block(right_non_smi);
    b.trap(Trap::deoptimize(DeoptReason::NonSmiOperand));

    b.finish()
}

fn build_instance_of(name: &str, config: &StubConfig) -> CfgResult<Cfg> {
    let mut b = CfgBuilder::new(name);
    let smi = b.create_block();
    let not_smi = b.create_block();
    let looping = b.create_block();
    let obj_map = b.append_block_param(looping);
    let next = b.create_block();
    let proto_ptr = b.create_block();
    let cont = b.create_block();
    let matched = b.create_block();
    let pre_false = b.create_block();
    let falsy = b.create_block();
    let truthy = b.create_block();
    let join = b.create_block();
    let res = b.append_block_param(join);

    let obj = b.load_stub_arg(0);
    let func = b.load_stub_arg(1);
    b.call_stub(types::CHECK_FUNCTION, &[func]);
    b.branch_smi(obj, smi, not_smi);

    // Small integers have no map
    b.switch_to_block(smi);
    b.jump(pre_false, &[]);

    b.switch_to_block(not_smi);
    let first_map = b.read_tagged(obj, config.offset("mapOffset")?);
    b.jump(looping, &[first_map]);

    b.switch_to_block(looping);
    let instance_map = b.read_tagged(func, config.offset("instanceMap")?);
    b.branch(
        Cond::PointerCompare(Cmp::Eq, obj_map, instance_map),
        matched,
        next,
    );

    // A map whose prototype's map is itself ends the chain
    b.switch_to_block(next);
    let proto = b.read_tagged(obj_map, config.offset("mapProto")?);
    // A small-integer prototype has no map either
    b.branch_smi(proto, pre_false, proto_ptr);

    b.switch_to_block(proto_ptr);
    let next_map = b.read_tagged(proto, config.offset("mapOffset")?);
    b.branch(
        Cond::PointerCompare(Cmp::Ne, next_map, obj_map),
        cont,
        pre_false,
    );

    b.switch_to_block(cont);
    b.jump(looping, &[next_map]);

    b.switch_to_block(matched);
    b.jump(truthy, &[]);

    b.switch_to_block(pre_false);
    b.jump(falsy, &[]);

    b.switch_to_block(falsy);
    let res0 = b.literal(Literal::False);
    b.jump(join, &[res0]);

    b.switch_to_block(truthy);
    let res1 = b.literal(Literal::True);
    b.jump(join, &[res1]);

    b.switch_to_block(join);
    b.ret(res);

    b.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn greater_than_swaps_operands() {
        assert_eq!(BinaryOp::Gt.compare(), Some((Cmp::Lt, true)));
        assert_eq!(BinaryOp::Ge.compare(), Some((Cmp::Le, true)));
        assert_eq!(BinaryOp::Lt.compare(), Some((Cmp::Lt, false)));
        assert_eq!(BinaryOp::InstanceOf.compare(), None);
    }

    #[test]
    fn instance_of_needs_layout_locals() {
        let empty = StubConfig::new();
        assert!(build_binary("binary/instanceof", BinaryOp::InstanceOf, &empty).is_err());
        assert!(build_binary("binary/+", BinaryOp::Add, &StubConfig::new()).is_ok());
    }

    #[test]
    fn stub_names() {
        let names: Vec<String> = BinaryOp::ALL.iter().map(|op| op.stub_name()).collect();
        assert!(names.contains(&"binary/instanceof".to_string()));
        assert!(names.contains(&"binary/!=".to_string()));
        assert_eq!(names.len(), 10);
    }
}
