//! Type checks and coercions

use otter_stub_cfg::{
    Cfg, CfgBuilder, CfgResult, Cmp, Cond, FatalReason, Literal, RuntimeId, StubConfig, Trap,
};
use otter_stub_heap::EntityKind;
use otter_stub_heap::layout::{base, map};

use crate::registry::StubRegistry;

/// `checkFunction(value)`
pub const CHECK_FUNCTION: &str = "checkFunction";

/// Kinds with a `coerce/<kind>` stub.
pub const COERCE_KINDS: [EntityKind; 1] = [EntityKind::Boolean];

/// `coerce/<kind>`
pub fn coerce_name(kind: EntityKind) -> String {
    format!("coerce/{}", kind.name())
}

/// Declare the type family.
pub fn declare(registry: &StubRegistry) {
    registry.declare(
        CHECK_FUNCTION,
        build_check_function,
        StubConfig::new()
            .with_local("mapOffset", base::MAP as i64)
            .with_local("mapFlags", map::FLAGS as i64)
            .with_local("fnFlag", i64::from(map::flags::FN)),
    );
    for kind in COERCE_KINDS {
        registry.declare(
            coerce_name(kind),
            move |name: &str, config: &StubConfig| build_coerce(name, kind, config),
            StubConfig::new().with_local("mapOffset", base::MAP as i64),
        );
    }
}

/// `(value) -> undefined`, trapping unless `value` is a function.
fn build_check_function(name: &str, config: &StubConfig) -> CfgResult<Cfg> {
    let mut b = CfgBuilder::new(name);
    let smi = b.create_block();
    let non_smi = b.create_block();
    let ok = b.create_block();
    let not_ok = b.create_block();

    let obj = b.load_stub_arg(0);
    b.branch_smi(obj, smi, non_smi);

    b.switch_to_block(non_smi);
    let m = b.read_tagged(obj, config.offset("mapOffset")?);
    let actual = b.read_tagged(m, config.offset("mapFlags")?);
    let expected = b.smi(config.local("fnFlag")?);
    b.branch(Cond::SmiTest(actual, expected), ok, not_ok);

    b.switch_to_block(ok);
    b.ret_void();

    b.switch_to_block(smi);
    b.jump(not_ok, &[]);

    b.switch_to_block(not_ok);
    b.trap(Trap::Fatal(FatalReason::NotAFunction));

    b.finish()
}

/// `(value) -> kind`. Small integers coerce by non-zero test, values already
/// of `kind` pass through, everything else goes to `coerce/<kind>` in the
/// runtime.
pub fn build_coerce(name: &str, kind: EntityKind, config: &StubConfig) -> CfgResult<Cfg> {
    let mut b = CfgBuilder::new(name);
    let smi = b.create_block();
    let non_smi = b.create_block();
    let truthy = b.create_block();
    let falsy = b.create_block();
    let same = b.create_block();
    let not_same = b.create_block();

    let val = b.load_stub_arg(0);
    b.branch_smi(val, smi, non_smi);

    b.switch_to_block(smi);
    let zero = b.smi(0);
    b.branch_smi_cmp(Cmp::Ne, val, zero, truthy, falsy);

    b.switch_to_block(truthy);
    let r0 = b.literal(Literal::True);
    b.ret(r0);

    b.switch_to_block(falsy);
    let r1 = b.literal(Literal::False);
    b.ret(r1);

    b.switch_to_block(non_smi);
    let actual = b.read_tagged(val, config.offset("mapOffset")?);
    let expected = b.canonical_map(kind);
    b.branch(Cond::PointerCompare(Cmp::Eq, expected, actual), same, not_same);

    b.switch_to_block(same);
    b.ret(val);

    b.switch_to_block(not_same);
    let r2 = b.call_runtime(RuntimeId::Coerce(kind), &[val]);
    b.ret(r2);

    b.finish()
}
