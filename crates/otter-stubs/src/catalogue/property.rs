//! Property slot stubs
//!
//! `slot` comes from an inline cache. A small-integer slot addresses the
//! object's storage directly; anything else is a miss and goes to the runtime.
//!
//! ```text
//!            ┌─ ACCESS flag ─────────────────────────────┐
//!   entry ───┤                                           ▼
//!            └─ NoAccess ─┬─ slot is smi ─ Found ─┬─ Dense ─┐   Runtime
//!                         │                       └─ Key ───┴▶ Op(off)
//!                         └─ NotFound ─▶ (load: Runtime, store: trap,
//!                                         delete: return slot)
//! ```
//!
//! Offset arithmetic is overflow-checked. A slot whose offset leaves the
//! small-integer range is treated like a miss by loads and traps otherwise.

use otter_stub_cfg::{
    Cfg, CfgBuilder, CfgResult, Cond, FatalReason, IcHandle, RuntimeId, StubConfig, Trap,
};
use otter_stub_heap::layout::{PTR_SHIFT, field, key_dict, object};

use crate::registry::StubRegistry;

/// Cache-miss stub populating an inline cache through the runtime.
pub const MISS: &str = "getPropertySlot_Miss";

/// Inline cache the catalogue's own miss stub reports to.
pub const DEFAULT_MISS_IC: IcHandle = IcHandle(0);

/// Operation performed by a slot stub.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PropertyOp {
    /// Read the slot
    Load,
    /// Write the slot
    Store,
    /// Delete the property
    Delete,
}

impl PropertyOp {
    /// Every operation.
    pub const ALL: [PropertyOp; 3] = [PropertyOp::Load, PropertyOp::Store, PropertyOp::Delete];

    /// Stub name.
    pub const fn stub_name(self) -> &'static str {
        match self {
            PropertyOp::Load => "loadPropertySlot",
            PropertyOp::Store => "storePropertySlot",
            PropertyOp::Delete => "deletePropertySlot",
        }
    }

    /// General runtime fallback.
    pub const fn runtime(self) -> RuntimeId {
        match self {
            PropertyOp::Load => RuntimeId::GetProperty,
            PropertyOp::Store => RuntimeId::SetProperty,
            PropertyOp::Delete => RuntimeId::DeleteProperty,
        }
    }
}

fn slot_config() -> StubConfig {
    StubConfig::new()
        .with_local("objectFlags", object::FLAGS as i64)
        .with_local("objectField", object::FIELD as i64)
        .with_local("accessFlag", i64::from(object::flags::ACCESS))
        .with_local("denseFlag", i64::from(object::flags::DENSE))
        .with_local("ptrShift", i64::from(PTR_SHIFT))
        .with_local("fieldData", field::DATA as i64)
        .with_local("itemSize", i64::from(key_dict::ITEM_SIZE))
        .with_local("itemValue", i64::from(key_dict::VALUE))
}

/// Declare the property family.
pub fn declare(registry: &StubRegistry) {
    declare_miss(registry, MISS, DEFAULT_MISS_IC);
    for op in PropertyOp::ALL {
        registry.declare(
            op.stub_name(),
            move |name: &str, config: &StubConfig| build_slot(name, op, config),
            slot_config(),
        );
    }
}

/// Declare a cache-miss stub bound to `ic`.
pub fn declare_miss(registry: &StubRegistry, name: &str, ic: IcHandle) {
    registry.declare(name, build_miss, StubConfig::new().with_ic(ic));
}

/// `(obj, key, update) -> slot | undefined`
fn build_miss(name: &str, _config: &StubConfig) -> CfgResult<Cfg> {
    let mut b = CfgBuilder::new(name);
    let ic = b.inline_cache();
    let obj = b.load_stub_arg(0);
    let prop = b.load_stub_arg(1);
    let update = b.load_stub_arg(2);
    let res = b.call_runtime(RuntimeId::GetPropertySlot, &[ic, obj, prop, update]);
    b.ret(res);
    b.finish()
}

/// `(obj, key, slot[, value])`
pub fn build_slot(name: &str, op: PropertyOp, config: &StubConfig) -> CfgResult<Cfg> {
    let mut b = CfgBuilder::new(name);
    let access = b.create_block();
    let no_access = b.create_block();
    let found = b.create_block();
    let not_found = b.create_block();
    let dense = b.create_block();
    let keyed = b.create_block();
    let out_of_range = b.create_block();
    let op_block = b.create_block();
    let off = b.append_block_param(op_block);
    let runtime = b.create_block();

    let obj = b.load_stub_arg(0);
    let key = b.load_stub_arg(1);
    let slot = b.load_stub_arg(2);
    let value = match op {
        PropertyOp::Store => Some(b.load_stub_arg(3)),
        _ => None,
    };

    // Accessor pairs need full property semantics
    let oflags = b.read_tagged(obj, config.offset("objectFlags")?);
    let access_bit = b.smi(config.local("accessFlag")?);
    b.branch(Cond::SmiTest(oflags, access_bit), access, no_access);

    b.switch_to_block(no_access);
    b.branch_smi(slot, found, not_found);

    b.switch_to_block(access);
    b.jump(runtime, &[]);

    b.switch_to_block(found);
    let dense_bit = b.smi(config.local("denseFlag")?);
    b.branch(Cond::SmiTest(oflags, dense_bit), dense, keyed);

    // off = data + (slot << ptrShift)
    b.switch_to_block(dense);
    let t0 = b.smi(config.local("ptrShift")?);
    let t1 = b.smi_shl(slot, t0);
    b.guard_overflow(out_of_range);
    let t2 = b.smi(config.local("fieldData")?);
    let t3 = b.smi_add(t1, t2);
    b.guard_overflow(out_of_range);
    b.jump(op_block, &[t3]);

    // off = data + ((slot * itemSize + value) << ptrShift)
    b.switch_to_block(keyed);
    let t4 = b.smi(config.local("itemSize")?);
    let t5 = b.smi_mul(slot, t4);
    b.guard_overflow(out_of_range);
    let t6 = b.smi(config.local("itemValue")?);
    let t7 = b.smi_add(t5, t6);
    b.guard_overflow(out_of_range);
    let t8 = b.smi(config.local("ptrShift")?);
    let t9 = b.smi_shl(t7, t8);
    b.guard_overflow(out_of_range);
    let t10 = b.smi(config.local("fieldData")?);
    let t11 = b.smi_add(t9, t10);
    b.guard_overflow(out_of_range);
    b.jump(op_block, &[t11]);

    // No cache hands out such a slot; a load can still ask by key
    b.switch_to_block(out_of_range);
    match op {
        PropertyOp::Load => b.jump(runtime, &[]),
        _ => b.trap(Trap::Fatal(FatalReason::Unreachable)),
    }

    b.switch_to_block(op_block);
    let storage = b.read_tagged(obj, config.offset("objectField")?);
    match (op, value) {
        (PropertyOp::Load, _) => {
            let res = b.smi_read_tagged(storage, off);
            b.ret(res);
        }
        (PropertyOp::Store, Some(value)) => {
            b.smi_write_tagged(storage, value, off);
            let res = b.undefined();
            b.ret(res);
        }
        _ => b.trap(Trap::Fatal(FatalReason::Unreachable)),
    }

    b.switch_to_block(not_found);
    match op {
        PropertyOp::Load => b.jump(runtime, &[]),
        PropertyOp::Store => b.trap(Trap::Fatal(FatalReason::Unreachable)),
        // The slot is already undefined
        PropertyOp::Delete => b.ret(slot),
    }

    // The value might live on the prototype chain
    b.switch_to_block(runtime);
    let rres = match value {
        Some(value) => b.call_runtime(op.runtime(), &[obj, key, value]),
        None => b.call_runtime(op.runtime(), &[obj, key]),
    };
    b.ret(rres);

    b.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use otter_stub_cfg::{Inst, Terminator};

    #[test]
    fn store_reads_value_argument() {
        let cfg = build_slot("s", PropertyOp::Store, &slot_config()).unwrap();
        let loads = cfg.blocks()[0]
            .insts
            .iter()
            .filter(|inst| matches!(inst, Inst::LoadStubArg { .. }))
            .count();
        assert_eq!(loads, 4);
    }

    #[test]
    fn delete_never_reaches_the_op_block() {
        let cfg = build_slot("d", PropertyOp::Delete, &slot_config()).unwrap();
        let traps = cfg
            .blocks()
            .iter()
            .filter(|block| {
                block.terminator == Terminator::Trap(Trap::Fatal(FatalReason::Unreachable))
            })
            .count();
        // Op block and out-of-range slots
        assert_eq!(traps, 2);
    }

    #[test]
    fn slot_stub_needs_layout_locals() {
        assert!(build_slot("l", PropertyOp::Load, &StubConfig::new()).is_err());
    }
}
