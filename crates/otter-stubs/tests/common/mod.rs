//! Shared setup for the stub integration tests

#![allow(dead_code)]

use std::sync::Once;

use otter_stub_cfg::Machine;
use otter_stub_heap::layout::{WORD_SIZE, field, key_dict, object};
use otter_stub_heap::{Heap, HeapConfig, Value};
use otter_stubs::{GeneralRuntime, StubRegistry, StubResult};
use tracing_subscriber::EnvFilter;

static TRACING: Once = Once::new();

/// Install a test subscriber once. `RUST_LOG=otter_stubs=trace` shows stub
/// traps and cache hits.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// Registry with the full catalogue, a machine and the general runtime.
pub struct Env {
    pub registry: StubRegistry,
    pub vm: Machine,
    pub rt: GeneralRuntime,
}

impl Env {
    pub fn new() -> Self {
        Self::with_heap(Heap::new().unwrap())
    }

    pub fn with_region_size(size: usize) -> Self {
        Self::with_heap(Heap::with_config(HeapConfig::with_region_size(size)).unwrap())
    }

    fn with_heap(heap: Heap) -> Self {
        init_tracing();
        let registry = StubRegistry::with_catalogue(heap.pin_handle());
        Self {
            registry,
            vm: Machine::new(heap),
            rt: GeneralRuntime::new(),
        }
    }

    /// Call a stub by name.
    pub fn call(&mut self, name: &str, args: &[Value]) -> StubResult<Value> {
        self.registry.call(name, &mut self.vm, &mut self.rt, args)
    }

    pub fn undefined(&self) -> Value {
        self.vm.heap().undefined()
    }

    pub fn hole(&self) -> Value {
        self.vm.heap().hole()
    }

    pub fn boolean(&self, truth: bool) -> Value {
        self.vm.heap().boolean(truth)
    }

    pub fn atom(&mut self, name: &str) -> Value {
        self.vm.heap_mut().atom(name).unwrap()
    }

    /// `obj[name] = value` through the runtime.
    pub fn set(&mut self, obj: Value, name: &str, value: Value) {
        let key = self.atom(name);
        self.rt
            .set_property(&mut self.vm, obj, key, value)
            .unwrap();
    }

    /// `obj[name]` through the runtime.
    pub fn get(&mut self, obj: Value, name: &str) -> Value {
        let key = self.atom(name);
        self.rt.get_property(&mut self.vm, obj, key).unwrap()
    }

    /// Fresh object from `allocObject`.
    pub fn object(&mut self) -> Value {
        self.call("allocObject", &[]).unwrap()
    }

    pub fn storage(&self, obj: Value) -> Value {
        self.vm.heap().read_tagged(obj, object::FIELD).unwrap()
    }

    /// Value word of dictionary item `item`.
    pub fn item_value(&self, obj: Value, item: usize) -> Value {
        let word = item * key_dict::ITEM_SIZE as usize + key_dict::VALUE as usize;
        let offset = field::DATA + word * WORD_SIZE;
        self.vm.heap().read_tagged(self.storage(obj), offset).unwrap()
    }
}
