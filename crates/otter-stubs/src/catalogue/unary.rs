//! Unary operator stubs
//!
//! Small-integer fast path only. A heap operand or an overflowing result
//! traps for deoptimization; there is no generic fallback at this layer.

use otter_stub_cfg::{Cfg, CfgBuilder, CfgResult, Cond, DeoptReason, StubConfig, Trap};

use crate::registry::StubRegistry;

/// Unary operators with a stub.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    /// `-x`
    Neg,
}

impl UnaryOp {
    /// Every operator.
    pub const ALL: [UnaryOp; 1] = [UnaryOp::Neg];

    /// Source symbol.
    pub const fn symbol(self) -> &'static str {
        match self {
            UnaryOp::Neg => "-",
        }
    }

    /// `unary/<symbol>`
    pub fn stub_name(self) -> String {
        format!("unary/{}", self.symbol())
    }
}

/// Declare the unary family.
pub fn declare(registry: &StubRegistry) {
    for op in UnaryOp::ALL {
        registry.declare(
            op.stub_name(),
            move |name: &str, _config: &StubConfig| build_unary(name, op),
            StubConfig::new(),
        );
    }
}

/// `(src) -> result`
pub fn build_unary(name: &str, op: UnaryOp) -> CfgResult<Cfg> {
    let mut b = CfgBuilder::new(name);
    let src_smi = b.create_block();
    let src_non_smi = b.create_block();
    let success = b.create_block();
    let overflow = b.create_block();

    let src = b.load_stub_arg(0);
    b.branch_smi(src, src_smi, src_non_smi);

    b.switch_to_block(src_smi);
    let r = match op {
        UnaryOp::Neg => b.smi_neg(src),
    };
    b.branch(Cond::Overflow, overflow, success);

    b.switch_to_block(success);
    b.ret(r);

    b.switch_to_block(src_non_smi);
    b.trap(Trap::deoptimize(DeoptReason::NonSmiOperand));

    b.switch_to_block(overflow);
    b.trap(Trap::deoptimize(DeoptReason::Overflow));

    b.finish()
}
