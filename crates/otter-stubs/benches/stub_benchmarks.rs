//! Stub execution benchmarks
//!
//! Measures the small-integer operator path and cached property loads.

use criterion::{Criterion, criterion_group, criterion_main};
use std::hint::black_box;

use otter_stub_cfg::Machine;
use otter_stub_heap::{Heap, Value};
use otter_stubs::{GeneralRuntime, StubRegistry};

fn setup() -> (StubRegistry, Machine, GeneralRuntime) {
    let heap = Heap::new().expect("heap");
    let registry = StubRegistry::with_catalogue(heap.pin_handle());
    (registry, Machine::new(heap), GeneralRuntime::new())
}

/// Benchmark: `binary/+` on two small integers.
fn bench_binary_add(c: &mut Criterion) {
    let (registry, mut vm, mut rt) = setup();
    let add = registry.resolve("binary/+").expect("binary/+");

    c.bench_function("binary_add_smi", |b| {
        b.iter(|| {
            add.call(&mut vm, &mut rt, &[black_box(Value::smi(40)), black_box(Value::smi(2))])
                .expect("add")
        })
    });
}

/// Benchmark: registry lookup plus call, the path taken by uncached call sites.
fn bench_registry_call(c: &mut Criterion) {
    let (registry, mut vm, mut rt) = setup();

    c.bench_function("registry_call_lt", |b| {
        b.iter(|| {
            registry
                .call("binary/<", &mut vm, &mut rt, &[Value::smi(1), black_box(Value::smi(2))])
                .expect("lt")
        })
    });
}

/// Benchmark: `loadPropertySlot` with a slot from the miss stub.
fn bench_load_property_slot(c: &mut Criterion) {
    let (registry, mut vm, mut rt) = setup();
    let obj = registry
        .call("allocObject", &mut vm, &mut rt, &[])
        .expect("object");
    let key = vm.heap_mut().atom("x").expect("atom");
    rt.set_property(&mut vm, obj, key, Value::smi(7)).expect("set");
    let no_update = vm.heap().boolean(false);
    let slot = registry
        .call("getPropertySlot_Miss", &mut vm, &mut rt, &[obj, key, no_update])
        .expect("slot");
    let load = registry.resolve("loadPropertySlot").expect("load");

    c.bench_function("load_property_slot_hit", |b| {
        b.iter(|| {
            load.call(&mut vm, &mut rt, &[black_box(obj), key, slot])
                .expect("load")
        })
    });
}

criterion_group!(
    benches,
    bench_binary_add,
    bench_registry_call,
    bench_load_property_slot
);
criterion_main!(benches);
