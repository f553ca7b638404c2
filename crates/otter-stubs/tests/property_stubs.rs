//! Property slot stubs and the cache-miss path

mod common;

use common::Env;
use otter_stub_cfg::{FatalReason, IcHandle, Trap};
use otter_stub_heap::layout::{WORD_SIZE, field, object};
use otter_stub_heap::{EntityKind, Value};
use otter_stubs::catalogue::property;
use otter_stubs::{InlineCacheState, StubError};

fn unreachable() -> StubError {
    StubError::Trap(Trap::Fatal(FatalReason::Unreachable))
}

#[test]
fn test_alloc_field_fills_holes() {
    let mut env = Env::new();
    let f = env.call("allocField", &[Value::smi(4)]).unwrap();
    let heap = env.vm.heap();
    assert_eq!(heap.kind_of(f), Some(EntityKind::Field));
    assert_eq!(heap.read_smi(f, field::LENGTH).unwrap(), 4);
    for i in 0..4 {
        assert_eq!(
            heap.read_tagged(f, field::DATA + i * WORD_SIZE).unwrap(),
            heap.hole()
        );
    }
}

#[test]
fn test_alloc_object_has_dictionary_storage() {
    let mut env = Env::new();
    let obj = env.object();
    let storage = env.storage(obj);
    let heap = env.vm.heap();
    assert_eq!(heap.kind_of(obj), Some(EntityKind::Object));
    assert_eq!(
        heap.read_smi(obj, object::FLAGS).unwrap(),
        i64::from(object::flags::DEFAULT)
    );
    // Eight items of three words
    assert_eq!(heap.read_smi(storage, field::LENGTH).unwrap(), 24);
}

#[test]
fn test_load_dictionary_slot() {
    let mut env = Env::new();
    let obj = env.object();
    env.set(obj, "a", Value::smi(10));
    env.set(obj, "b", Value::smi(20));
    env.set(obj, "c", Value::smi(30));

    let key = env.atom("c");
    let got = env
        .call("loadPropertySlot", &[obj, key, Value::smi(2)])
        .unwrap();
    assert_eq!(got, Value::smi(30));
    assert_eq!(env.rt.calls(), 0);
}

#[test]
fn test_store_dictionary_slot() {
    let mut env = Env::new();
    let obj = env.object();
    env.set(obj, "x", Value::smi(1));

    let key = env.atom("x");
    let res = env
        .call("storePropertySlot", &[obj, key, Value::smi(0), Value::smi(99)])
        .unwrap();
    assert_eq!(res, env.undefined());
    assert_eq!(env.item_value(obj, 0), Value::smi(99));
    assert_eq!(env.get(obj, "x"), Value::smi(99));
}

#[test]
fn test_dense_slots_index_directly() {
    let mut env = Env::new();
    let obj = env.object();
    let storage = env.storage(obj);
    let heap = env.vm.heap_mut();
    heap.write_tagged(obj, object::FLAGS, Value::smi(object::flags::DENSE))
        .unwrap();
    heap.write_tagged(storage, field::DATA + 5 * WORD_SIZE, Value::smi(55))
        .unwrap();

    let key = Value::smi(5);
    let got = env.call("loadPropertySlot", &[obj, key, Value::smi(5)]).unwrap();
    assert_eq!(got, Value::smi(55));

    env.call("storePropertySlot", &[obj, key, Value::smi(6), Value::smi(66)])
        .unwrap();
    let stored = env
        .vm
        .heap()
        .read_tagged(storage, field::DATA + 6 * WORD_SIZE)
        .unwrap();
    assert_eq!(stored, Value::smi(66));
}

#[test]
fn test_load_miss_goes_to_runtime() {
    let mut env = Env::new();
    let obj = env.object();
    env.set(obj, "far", Value::smi(7));

    let key = env.atom("far");
    let undefined = env.undefined();
    let got = env.call("loadPropertySlot", &[obj, key, undefined]).unwrap();
    assert_eq!(got, Value::smi(7));
    assert_eq!(env.rt.calls(), 1);
}

#[test]
fn test_store_miss_is_unreachable() {
    let mut env = Env::new();
    let obj = env.object();
    let key = env.atom("k");
    let undefined = env.undefined();
    assert_eq!(
        env.call("storePropertySlot", &[obj, key, undefined, Value::smi(1)])
            .unwrap_err(),
        unreachable()
    );
}

#[test]
fn test_delete_slot() {
    let mut env = Env::new();
    let obj = env.object();
    let key = env.atom("k");
    let undefined = env.undefined();

    // Nothing cached, nothing to delete
    let res = env.call("deletePropertySlot", &[obj, key, undefined]).unwrap();
    assert_eq!(res, undefined);

    assert_eq!(
        env.call("deletePropertySlot", &[obj, key, Value::smi(0)])
            .unwrap_err(),
        unreachable()
    );
}

#[test]
fn test_miss_stub_populates_inline_cache() {
    let mut env = Env::new();
    let obj = env.object();
    env.set(obj, "p", Value::smi(1));
    env.set(obj, "q", Value::smi(2));

    let key = env.atom("q");
    let no_update = env.boolean(false);
    let slot = env
        .call(property::MISS, &[obj, key, no_update])
        .unwrap();
    assert_eq!(slot, Value::smi(1));

    let obj_map = env.vm.heap().map_of(obj).unwrap();
    assert_eq!(
        env.rt.caches().state(property::DEFAULT_MISS_IC),
        InlineCacheState::Monomorphic {
            map: obj_map.raw(),
            slot: 1
        }
    );

    let got = env.call("loadPropertySlot", &[obj, key, slot]).unwrap();
    assert_eq!(got, Value::smi(2));
}

#[test]
fn test_miss_stub_inserts_on_update() {
    let mut env = Env::new();
    let site = IcHandle(7);
    property::declare_miss(&env.registry, "getPropertySlot_Miss/7", site);

    let obj = env.object();
    let key = env.atom("fresh");
    let no_update = env.boolean(false);
    let update = env.boolean(true);

    let missing = env
        .call("getPropertySlot_Miss/7", &[obj, key, no_update])
        .unwrap();
    assert_eq!(missing, env.undefined());
    assert_eq!(env.rt.caches().state(site), InlineCacheState::Uninitialized);

    let slot = env
        .call("getPropertySlot_Miss/7", &[obj, key, update])
        .unwrap();
    assert_eq!(slot, Value::smi(0));
    assert!(matches!(
        env.rt.caches().state(site),
        InlineCacheState::Monomorphic { slot: 0, .. }
    ));

    env.call("storePropertySlot", &[obj, key, slot, Value::smi(5)])
        .unwrap();
    assert_eq!(env.get(obj, "fresh"), Value::smi(5));
}

#[test]
fn test_out_of_range_slot_does_not_alias() {
    let mut env = Env::new();
    let huge = Value::try_smi(1 << 60).unwrap();

    let dense = env.object();
    let storage = env.storage(dense);
    let heap = env.vm.heap_mut();
    heap.write_tagged(dense, object::FLAGS, Value::smi(object::flags::DENSE))
        .unwrap();
    heap.write_tagged(storage, field::DATA, Value::smi(111))
        .unwrap();
    heap.write_tagged(storage, field::DATA + 3 * WORD_SIZE, Value::smi(333))
        .unwrap();

    // The offset would wrap onto slot 0; the runtime answers by key instead
    let got = env
        .call("loadPropertySlot", &[dense, Value::smi(3), huge])
        .unwrap();
    assert_eq!(got, Value::smi(333));
    assert_eq!(env.rt.calls(), 1);

    assert_eq!(
        env.call("storePropertySlot", &[dense, Value::smi(3), huge, Value::smi(1)])
            .unwrap_err(),
        unreachable()
    );
    let first = env.vm.heap().read_tagged(storage, field::DATA).unwrap();
    assert_eq!(first, Value::smi(111));

    let dict = env.object();
    env.set(dict, "a", Value::smi(10));
    let key = env.atom("a");
    let got = env.call("loadPropertySlot", &[dict, key, huge]).unwrap();
    assert_eq!(got, Value::smi(10));
    assert_eq!(
        env.call("deletePropertySlot", &[dict, key, huge]).unwrap_err(),
        unreachable()
    );
}
