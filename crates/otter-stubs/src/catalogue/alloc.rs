//! Allocation stubs
//!
//! `allocTagged/<kind>` is the only stub touching the bump cursor. Every other
//! allocator sizes its entity and calls it.

use otter_stub_cfg::{Cfg, CfgBuilder, CfgResult, Cmp, Cond, Gap, StubConfig, Trap};
use otter_stub_heap::EntityKind;
use otter_stub_heap::layout::{PTR_SHIFT, access_pair, base, field, function, object};

use crate::catalogue::construct;
use crate::catalogue::types;
use crate::registry::StubRegistry;

/// `allocField(slots)`
pub const ALLOC_FIELD: &str = "allocField";
/// `allocObject()`
pub const ALLOC_OBJECT: &str = "allocObject";
/// `allocFn(code, outer, slots)`
pub const ALLOC_FN: &str = "allocFn";
/// `allocAccessPair()`
pub const ALLOC_ACCESS_PAIR: &str = "allocAccessPair";
/// `new(argc, fn, ...args)`
pub const NEW: &str = "new";

/// Kinds with an `allocTagged/<kind>` stub.
pub const ALLOC_TAGGED_KINDS: [EntityKind; 6] = [
    EntityKind::Map,
    EntityKind::Boolean,
    EntityKind::Field,
    EntityKind::Object,
    EntityKind::Function,
    EntityKind::AccessPair,
];

/// `allocTagged/<kind>`
pub fn tagged_name(kind: EntityKind) -> String {
    format!("allocTagged/{}", kind.name())
}

/// Declare the allocation family.
pub fn declare(registry: &StubRegistry) {
    for kind in ALLOC_TAGGED_KINDS {
        registry.declare(
            tagged_name(kind),
            move |name: &str, config: &StubConfig| build_tagged(name, kind, config),
            StubConfig::new().with_local("mapOffset", base::MAP as i64),
        );
    }

    registry.declare(
        ALLOC_FIELD,
        build_field,
        StubConfig::new()
            .with_local("fieldBase", field::size(0) as i64)
            .with_local("fieldShift", i64::from(field::SHIFT))
            .with_local("fieldLength", field::LENGTH as i64)
            .with_local("fieldData", field::DATA as i64),
    );
    registry.declare(
        ALLOC_OBJECT,
        build_object,
        StubConfig::new().with_local("objectSize", object::SIZE as i64),
    );
    registry.declare(
        ALLOC_FN,
        build_function,
        StubConfig::new()
            .with_local("fnBaseSize", function::size(0) as i64)
            .with_local("ptrShift", i64::from(PTR_SHIFT)),
    );
    registry.declare(
        ALLOC_ACCESS_PAIR,
        build_access_pair,
        StubConfig::new()
            .with_local("pairSize", access_pair::SIZE as i64)
            .with_local("getter", access_pair::GETTER as i64)
            .with_local("setter", access_pair::SETTER as i64)
            .with_local("attributes", access_pair::ATTRIBUTES as i64)
            .with_local("defaultAttributes", i64::from(access_pair::attributes::DEFAULT)),
    );
    registry.declare(
        NEW,
        build_new,
        StubConfig::new()
            .with_local("mapOffset", base::MAP as i64)
            .with_local("instanceMap", function::INSTANCE_MAP as i64),
    );
}

/// `(size) -> entity`, stamped with the canonical map of `kind`.
pub fn build_tagged(name: &str, kind: EntityKind, config: &StubConfig) -> CfgResult<Cfg> {
    let mut b = CfgBuilder::new(name);
    let has_space = b.create_block();
    let need_gc = b.create_block();

    let requested = b.load_stub_arg(0);
    let size = b.align_size(requested);
    let current = b.heap_current();
    let limit = b.heap_limit();
    let after = b.pointer_add(current, size);
    b.branch(Cond::PointerCompare(Cmp::Le, after, limit), has_space, need_gc);

    b.switch_to_block(has_space);
    b.heap_set_current(after);
    let map = b.canonical_map(kind);
    b.write_tagged(current, map, config.offset("mapOffset")?);
    b.ret(current);

    // TODO: run the collector and retry once it exists
    b.switch_to_block(need_gc);
    b.trap(Trap::Unimplemented(Gap::NeedsCollection));

    b.finish()
}

/// `(slots) -> field`, every slot holding the hole.
fn build_field(name: &str, config: &StubConfig) -> CfgResult<Cfg> {
    let mut b = CfgBuilder::new(name);
    let base = b.smi(config.local("fieldBase")?);
    let slots = b.load_stub_arg(0);

    let shift = b.smi(config.local("fieldShift")?);
    let body = b.smi_shl(slots, shift);
    let size = b.smi_add(base, body);
    let field = b.call_stub(&tagged_name(EntityKind::Field), &[size]);

    b.write_tagged(field, slots, config.offset("fieldLength")?);

    let data = b.smi(config.local("fieldData")?);
    let start = b.pointer_add(field, data);
    let end = b.pointer_add(field, size);
    let hole = b.hole();
    b.pointer_fill(start, end, hole);

    b.ret(field);
    b.finish()
}

/// `() -> object` with dictionary storage.
fn build_object(name: &str, config: &StubConfig) -> CfgResult<Cfg> {
    let mut b = CfgBuilder::new(name);
    let size = b.smi(config.local("objectSize")?);
    let obj = b.call_stub(&tagged_name(EntityKind::Object), &[size]);
    b.call_stub(construct::OBJECT, &[obj]);
    b.ret(obj);
    b.finish()
}

/// `(code, outer, slots) -> function`
fn build_function(name: &str, config: &StubConfig) -> CfgResult<Cfg> {
    let mut b = CfgBuilder::new(name);
    let slots = b.load_stub_arg(2);
    let shift = b.smi(config.local("ptrShift")?);
    let context_size = b.smi_shl(slots, shift);
    let pre_size = b.smi(config.local("fnBaseSize")?);

    let size = b.smi_add(pre_size, context_size);
    let func = b.call_stub(&tagged_name(EntityKind::Function), &[size]);

    b.call_stub(construct::OBJECT, &[func]);

    let code = b.load_stub_arg(0);
    let outer = b.load_stub_arg(1);
    b.call_stub(construct::FUNCTION, &[func, code, outer, slots]);

    b.ret(func);
    b.finish()
}

/// `() -> pair` with both accessors unset.
fn build_access_pair(name: &str, config: &StubConfig) -> CfgResult<Cfg> {
    let mut b = CfgBuilder::new(name);
    let size = b.smi(config.local("pairSize")?);
    let pair = b.call_stub(&tagged_name(EntityKind::AccessPair), &[size]);

    let hole = b.hole();
    b.write_tagged(pair, hole, config.offset("getter")?);
    b.write_tagged(pair, hole, config.offset("setter")?);
    let attrs = b.smi(config.local("defaultAttributes")?);
    b.write_tagged(pair, attrs, config.offset("attributes")?);

    b.ret(pair);
    b.finish()
}

/// `(argc, fn, ...args) -> object`
///
/// The constructor's own return value is discarded.
fn build_new(name: &str, config: &StubConfig) -> CfgResult<Cfg> {
    let mut b = CfgBuilder::new(name);
    let argc = b.load_stub_arg(0);
    let func = b.load_stub_arg(1);
    b.call_stub(types::CHECK_FUNCTION, &[func]);

    let res = b.call_stub(ALLOC_OBJECT, &[]);

    let map = b.read_tagged(func, config.offset("instanceMap")?);
    b.write_tagged(res, map, config.offset("mapOffset")?);

    b.call_forward(func, res, 2, argc);

    b.ret(res);
    b.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tagged_names_follow_kind_names() {
        assert_eq!(tagged_name(EntityKind::AccessPair), "allocTagged/access-pair");
        assert_eq!(tagged_name(EntityKind::Map), "allocTagged/map");
    }

    #[test]
    fn new_depends_on_check_and_alloc() {
        let config = StubConfig::new()
            .with_local("mapOffset", 0)
            .with_local("instanceMap", function::INSTANCE_MAP as i64);
        let cfg = build_new(NEW, &config).unwrap();
        assert_eq!(cfg.dependencies(), vec![types::CHECK_FUNCTION, ALLOC_OBJECT]);
    }

    #[test]
    fn field_size_uses_layout_shift() {
        let cfg = build_field(
            ALLOC_FIELD,
            &StubConfig::new()
                .with_local("fieldBase", 16)
                .with_local("fieldShift", 3)
                .with_local("fieldLength", 8)
                .with_local("fieldData", 16),
        )
        .unwrap();
        assert_eq!(cfg.dependencies(), vec!["allocTagged/field"]);
    }
}
