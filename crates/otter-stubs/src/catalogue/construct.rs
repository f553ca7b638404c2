//! Object and function constructors, and the `prototype` accessor pair

use otter_stub_cfg::{Cfg, CfgBuilder, CfgResult, RuntimeId, StubConfig};
use otter_stub_heap::EntityKind;
use otter_stub_heap::layout::{PTR_SHIFT, access_pair, function, key_dict, map, object};

use crate::catalogue::alloc;
use crate::registry::StubRegistry;

/// `Object(self)`
pub const OBJECT: &str = "Object";
/// `Function(fn, code, outer, slots)`
pub const FUNCTION: &str = "Function";
/// Getter of `prototype` on functions.
pub const PROTO_GETTER: &str = "FunctionProtoGetter";
/// Setter of `prototype` on functions.
pub const PROTO_SETTER: &str = "FunctionProtoSetter";

/// Declare the construction family.
pub fn declare(registry: &StubRegistry) {
    registry.declare(
        OBJECT,
        build_object,
        StubConfig::new()
            .with_local("minSize", i64::from(object::MIN_SIZE))
            .with_local("itemSize", i64::from(key_dict::ITEM_SIZE))
            .with_local("objectField", object::FIELD as i64)
            .with_local("objectFlags", object::FLAGS as i64)
            .with_local("defaultFlags", i64::from(object::flags::DEFAULT)),
    );
    registry.declare(
        FUNCTION,
        build_function,
        StubConfig::new()
            .with_local("code", function::CODE as i64)
            .with_local("contextSize", function::CONTEXT_SIZE as i64)
            .with_local("context", function::CONTEXT as i64)
            .with_local("outer", function::OUTER as i64)
            .with_local("getter", access_pair::GETTER as i64)
            .with_local("setter", access_pair::SETTER as i64)
            .with_local("objectFlags", object::FLAGS as i64)
            .with_local("accessFlag", i64::from(object::flags::ACCESS))
            .with_local("ptrShift", i64::from(PTR_SHIFT)),
    );
    registry.declare(
        PROTO_GETTER,
        build_proto_getter,
        StubConfig::new()
            .with_local("instanceMap", function::INSTANCE_MAP as i64)
            .with_local("mapProto", map::PROTO as i64),
    );
    registry.declare(
        PROTO_SETTER,
        build_proto_setter,
        StubConfig::new()
            .with_local("mapSize", map::SIZE as i64)
            .with_local("mapFlags", map::FLAGS as i64)
            .with_local("mapProto", map::PROTO as i64)
            .with_local("mapEdges", map::EDGES as i64)
            .with_local("mapTransitions", map::TRANSITION_COUNT as i64)
            .with_local("defaultMapFlags", i64::from(map::flags::DEFAULT))
            .with_local("instanceMap", function::INSTANCE_MAP as i64),
    );
}

/// `(self) -> self`: dictionary storage for `minSize` properties.
fn build_object(name: &str, config: &StubConfig) -> CfgResult<Cfg> {
    let mut b = CfgBuilder::new(name);
    let this = b.load_stub_arg(0);
    let size = b.smi(config.local("minSize")?);

    // Each dictionary item spans `itemSize` words
    let item_size = b.smi(config.local("itemSize")?);
    let slots = b.smi_mul(size, item_size);

    let storage = b.call_stub(alloc::ALLOC_FIELD, &[slots]);
    b.write_tagged(this, storage, config.offset("objectField")?);

    let flags = b.smi(config.local("defaultFlags")?);
    b.write_tagged(this, flags, config.offset("objectFlags")?);

    b.ret(this);
    b.finish()
}

/// `(fn, code, outer, slots) -> fn`
///
/// Installs `prototype` as an accessor pair, flags the function so every
/// property access goes through the runtime, then runs the setter once with a
/// fresh object so the instance map exists from the start.
fn build_function(name: &str, config: &StubConfig) -> CfgResult<Cfg> {
    let mut b = CfgBuilder::new(name);
    let func = b.load_stub_arg(0);
    let code = b.load_stub_arg(1);

    b.write_tagged(func, code, config.offset("code")?);

    let zero = b.smi(0);
    b.write_tagged(func, zero, config.offset("contextSize")?);

    let pair = b.call_stub(alloc::ALLOC_ACCESS_PAIR, &[]);
    let getter = b.stub_ref(PROTO_GETTER);
    b.write_tagged(pair, getter, config.offset("getter")?);
    let setter = b.stub_ref(PROTO_SETTER);
    b.write_tagged(pair, setter, config.offset("setter")?);

    let prop = b.atom("prototype");
    b.call_runtime(RuntimeId::SetProperty, &[func, prop, pair]);

    let oflags = b.read_tagged(func, config.offset("objectFlags")?);
    let access = b.smi(config.local("accessFlag")?);
    let flags = b.smi_or(oflags, access);
    b.write_tagged(func, flags, config.offset("objectFlags")?);

    let proto = b.call_stub(alloc::ALLOC_OBJECT, &[]);
    b.call(setter, func, &[proto]);

    let outer = b.load_stub_arg(2);
    b.write_tagged(func, outer, config.offset("outer")?);

    let slots = b.load_stub_arg(3);
    let shift = b.smi(config.local("ptrShift")?);
    let context_bytes = b.smi_shl(slots, shift);
    let context = b.smi(config.local("context")?);
    let start = b.pointer_add(func, context);
    let end = b.pointer_add(start, context_bytes);
    let undefined = b.undefined();
    b.pointer_fill(start, end, undefined);

    b.ret(func);
    b.finish()
}

/// `this.instanceMap.proto`
fn build_proto_getter(name: &str, config: &StubConfig) -> CfgResult<Cfg> {
    let mut b = CfgBuilder::new(name);
    let this = b.this();
    let imap = b.read_tagged(this, config.offset("instanceMap")?);
    let proto = b.read_tagged(imap, config.offset("mapProto")?);
    b.ret(proto);
    b.finish()
}

/// `(proto) -> this` with a fresh instance map whose prototype is `proto`.
fn build_proto_setter(name: &str, config: &StubConfig) -> CfgResult<Cfg> {
    let mut b = CfgBuilder::new(name);
    let proto = b.load_arg(0);
    let this = b.this();

    let size = b.smi(config.local("mapSize")?);
    let imap = b.call_stub(&alloc::tagged_name(EntityKind::Map), &[size]);

    // Instance maps never transition
    let hole = b.hole();
    b.write_tagged(imap, hole, config.offset("mapEdges")?);
    b.write_tagged(imap, hole, config.offset("mapTransitions")?);

    let flags = b.smi(config.local("defaultMapFlags")?);
    b.write_tagged(imap, flags, config.offset("mapFlags")?);

    b.write_tagged(imap, proto, config.offset("mapProto")?);
    b.write_tagged(this, imap, config.offset("instanceMap")?);

    b.ret(this);
    b.finish()
}
