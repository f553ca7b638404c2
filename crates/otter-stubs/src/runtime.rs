//! Reference general runtime
//!
//! The slow paths stubs fall back to. Properties live in the object's
//! storage field as a key dictionary of `(key, value, attributes)` items;
//! dense objects index the field directly with small-integer keys.
//!
//! ```text
//! field: [map][length][k0][v0][a0][k1][v1][a1] ...
//!                      └── item 0 ─┘└── item 1 ─┘
//! ```
//!
//! Free items hold the hole in both key and value.

use otter_stub_cfg::{FatalReason, IcHandle, Machine, Runtime, RuntimeId, Trap};
use otter_stub_heap::layout::{WORD_SIZE, access_pair, boolean, field, key_dict, map, object};
use otter_stub_heap::{EntityKind, Heap, Value};

use crate::ic::InlineCacheTable;

/// Prototype hops before a lookup gives up.
const MAX_PROTO_HOPS: usize = 1024;

/// Attributes of a plain data property.
const DATA_ATTRIBUTES: i32 = access_pair::attributes::WRITABLE | access_pair::attributes::DEFAULT;

const ITEM_WORDS: usize = key_dict::ITEM_SIZE as usize;

fn item_offset(item: usize, part: i32) -> usize {
    field::DATA + (item * ITEM_WORDS + part as usize) * WORD_SIZE
}

fn dense_offset(slot: usize) -> usize {
    field::DATA + slot * WORD_SIZE
}

/// Where a property lives in an object's storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    Dense(usize),
    Item(usize),
}

impl Slot {
    fn index(self) -> usize {
        match self {
            Slot::Dense(i) | Slot::Item(i) => i,
        }
    }

    fn value_offset(self) -> usize {
        match self {
            Slot::Dense(i) => dense_offset(i),
            Slot::Item(i) => item_offset(i, key_dict::VALUE),
        }
    }
}

/// Runtime backing every `RuntimeId` the catalogue calls.
#[derive(Debug, Default)]
pub struct GeneralRuntime {
    caches: InlineCacheTable,
    calls: u64,
}

impl GeneralRuntime {
    /// Runtime with empty inline caches.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inline caches populated by `getPropertySlot`.
    pub fn caches(&self) -> &InlineCacheTable {
        &self.caches
    }

    /// Runtime calls served so far.
    pub fn calls(&self) -> u64 {
        self.calls
    }

    /// `obj[key]`, following accessors and the prototype chain.
    pub fn get_property(
        &mut self,
        vm: &mut Machine,
        obj: Value,
        key: Value,
    ) -> Result<Value, Trap> {
        let undefined = vm.heap().undefined();
        let mut holder = obj;
        for _ in 0..MAX_PROTO_HOPS {
            if holder.is_smi() || vm.heap().is_nullish(holder) {
                return Ok(undefined);
            }
            if let Some(slot) = find_slot(vm.heap(), holder, key)? {
                let value = read_slot(vm.heap(), holder, slot)?;
                if vm.heap().kind_of(value) == Some(EntityKind::AccessPair) {
                    let getter = vm.heap().read_tagged(value, access_pair::GETTER)?;
                    if getter == vm.heap().hole() {
                        return Ok(undefined);
                    }
                    return vm.call_value(self, getter, obj, &[]);
                }
                if value == vm.heap().hole() {
                    return Ok(undefined);
                }
                return Ok(value);
            }
            let holder_map = vm.heap().map_of(holder)?;
            holder = vm.heap().read_tagged(holder_map, map::PROTO)?;
        }
        tracing::debug!(?obj, "prototype chain too long");
        Ok(undefined)
    }

    /// `obj[key] = value`
    pub fn set_property(
        &mut self,
        vm: &mut Machine,
        obj: Value,
        key: Value,
        value: Value,
    ) -> Result<Value, Trap> {
        let undefined = vm.heap().undefined();
        if !is_object_like(vm.heap(), obj) {
            return Ok(undefined);
        }

        let slot = find_slot(vm.heap(), obj, key)?;
        let is_pair = vm.heap().kind_of(value) == Some(EntityKind::AccessPair);
        if let (Some(slot), false) = (slot, is_pair) {
            let current = read_slot(vm.heap(), obj, slot)?;
            if vm.heap().kind_of(current) == Some(EntityKind::AccessPair) {
                let setter = vm.heap().read_tagged(current, access_pair::SETTER)?;
                if setter != vm.heap().hole() {
                    vm.call_value(self, setter, obj, &[value])?;
                }
                return Ok(undefined);
            }
        }

        let slot = match slot {
            Some(slot) => slot,
            None => insert_key(vm.heap_mut(), obj, key)?,
        };
        let storage = vm.heap().read_tagged(obj, object::FIELD)?;
        vm.heap_mut()
            .write_tagged(storage, slot.value_offset(), value)?;
        Ok(undefined)
    }

    /// `delete obj[key]`
    pub fn delete_property(
        &mut self,
        vm: &mut Machine,
        obj: Value,
        key: Value,
    ) -> Result<Value, Trap> {
        if is_object_like(vm.heap(), obj) {
            if let Some(slot) = find_slot(vm.heap(), obj, key)? {
                let hole = vm.heap().hole();
                let storage = vm.heap().read_tagged(obj, object::FIELD)?;
                match slot {
                    Slot::Dense(_) => {
                        vm.heap_mut().write_tagged(storage, slot.value_offset(), hole)?;
                    }
                    Slot::Item(i) => {
                        let heap = vm.heap_mut();
                        heap.write_tagged(storage, item_offset(i, key_dict::KEY), hole)?;
                        heap.write_tagged(storage, item_offset(i, key_dict::VALUE), hole)?;
                        heap.write_tagged(storage, item_offset(i, key_dict::ATTRIBUTES), hole)?;
                    }
                }
            }
        }
        Ok(vm.heap().boolean(true))
    }

    /// Own slot of `key` in `obj`, recorded in `ic` against the object's map.
    ///
    /// Returns `undefined` when the slot cannot be cached.
    pub fn get_property_slot(
        &mut self,
        vm: &mut Machine,
        ic: IcHandle,
        obj: Value,
        key: Value,
        update: bool,
    ) -> Result<Value, Trap> {
        let undefined = vm.heap().undefined();
        if !is_object_like(vm.heap(), obj) {
            return Ok(undefined);
        }
        let flags = vm.heap().read_smi(obj, object::FLAGS)?;
        if flags & i64::from(object::flags::ACCESS) != 0 {
            return Ok(undefined);
        }

        let slot = match find_slot(vm.heap(), obj, key)? {
            Some(slot) => slot,
            None if update => {
                let slot = insert_key(vm.heap_mut(), obj, key)?;
                let storage = vm.heap().read_tagged(obj, object::FIELD)?;
                vm.heap_mut()
                    .write_tagged(storage, slot.value_offset(), undefined)?;
                slot
            }
            None => return Ok(undefined),
        };

        let (Ok(index), Some(encoded)) = (
            u32::try_from(slot.index()),
            i64::try_from(slot.index()).ok().and_then(Value::try_smi),
        ) else {
            return Ok(undefined);
        };
        let obj_map = vm.heap().map_of(obj)?;
        self.caches.record(ic, obj_map.raw(), index);
        tracing::trace!(ic = ic.0, slot = index, "inline cache updated");
        Ok(encoded)
    }

    /// Generic truthiness for values the `coerce/boolean` fast path rejects.
    pub fn to_boolean(&self, heap: &Heap, value: Value) -> Result<Value, Trap> {
        let truth = match value.as_smi() {
            Some(n) => n != 0,
            None if heap.is_nullish(value) => false,
            None => match heap.kind_of(value) {
                Some(EntityKind::Boolean) => heap.read_smi(value, boolean::VALUE)? != 0,
                Some(EntityKind::Atom) => {
                    heap.atom_name(value).is_some_and(|name| !name.is_empty())
                }
                _ => true,
            },
        };
        Ok(heap.boolean(truth))
    }
}

fn arg(args: &[Value], index: usize) -> Result<Value, Trap> {
    args.get(index)
        .copied()
        .ok_or(Trap::Fatal(FatalReason::MissingArgument(index)))
}

fn is_true(heap: &Heap, value: Value) -> bool {
    match value.as_smi() {
        Some(n) => n != 0,
        None => value == heap.boolean(true),
    }
}

impl Runtime for GeneralRuntime {
    fn call(&mut self, vm: &mut Machine, id: RuntimeId, args: &[Value]) -> Result<Value, Trap> {
        self.calls += 1;
        tracing::trace!(runtime = %id.name(), argc = args.len(), "runtime call");
        match id {
            RuntimeId::GetProperty => self.get_property(vm, arg(args, 0)?, arg(args, 1)?),
            RuntimeId::SetProperty => {
                self.set_property(vm, arg(args, 0)?, arg(args, 1)?, arg(args, 2)?)
            }
            RuntimeId::DeleteProperty => self.delete_property(vm, arg(args, 0)?, arg(args, 1)?),
            RuntimeId::GetPropertySlot => {
                let ic = arg(args, 0)?
                    .as_smi()
                    .and_then(|n| u32::try_from(n).ok())
                    .map(IcHandle)
                    .ok_or(Trap::Fatal(FatalReason::NotASmi))?;
                let update = is_true(vm.heap(), arg(args, 3)?);
                self.get_property_slot(vm, ic, arg(args, 1)?, arg(args, 2)?, update)
            }
            RuntimeId::Coerce(EntityKind::Boolean) => self.to_boolean(vm.heap(), arg(args, 0)?),
            RuntimeId::Coerce(_) => Err(Trap::Fatal(FatalReason::RuntimeUnavailable(id.name()))),
        }
    }
}

// =============================================================================
// Storage helpers
// =============================================================================

fn is_object_like(heap: &Heap, value: Value) -> bool {
    heap.kind_of(value).is_some_and(EntityKind::is_object_like)
}

/// The storage field of `obj`, if it has one.
fn storage_of(heap: &Heap, obj: Value) -> Result<Option<Value>, Trap> {
    if !is_object_like(heap, obj) {
        return Ok(None);
    }
    let storage = heap.read_tagged(obj, object::FIELD)?;
    if storage.is_pointer() && heap.kind_of(storage) == Some(EntityKind::Field) {
        Ok(Some(storage))
    } else {
        Ok(None)
    }
}

fn slot_count(heap: &Heap, storage: Value) -> Result<usize, Trap> {
    let length = heap.read_smi(storage, field::LENGTH)?;
    Ok(usize::try_from(length).unwrap_or(0))
}

fn is_dense(heap: &Heap, obj: Value) -> Result<bool, Trap> {
    Ok(heap.read_smi(obj, object::FLAGS)? & i64::from(object::flags::DENSE) != 0)
}

fn find_slot(heap: &Heap, obj: Value, key: Value) -> Result<Option<Slot>, Trap> {
    let Some(storage) = storage_of(heap, obj)? else {
        return Ok(None);
    };
    let slots = slot_count(heap, storage)?;
    if is_dense(heap, obj)? {
        let index = key.as_smi().and_then(|n| usize::try_from(n).ok());
        return Ok(index.filter(|i| *i < slots).map(Slot::Dense));
    }
    for item in 0..slots / ITEM_WORDS {
        if heap.read_tagged(storage, item_offset(item, key_dict::KEY))? == key {
            return Ok(Some(Slot::Item(item)));
        }
    }
    Ok(None)
}

fn read_slot(heap: &Heap, obj: Value, slot: Slot) -> Result<Value, Trap> {
    let storage = heap.read_tagged(obj, object::FIELD)?;
    Ok(heap.read_tagged(storage, slot.value_offset())?)
}

/// Claim a free dictionary item for `key`, growing the field when full.
fn insert_key(heap: &mut Heap, obj: Value, key: Value) -> Result<Slot, Trap> {
    if is_dense(heap, obj)? {
        // Dense storage has no room for keys outside its bounds
        return Err(Trap::Fatal(FatalReason::Unreachable));
    }
    let hole = heap.hole();
    let (storage, items) = match storage_of(heap, obj)? {
        Some(storage) => (storage, slot_count(heap, storage)? / ITEM_WORDS),
        None => {
            let storage = grow(heap, obj, None, 0)?;
            (storage, slot_count(heap, storage)? / ITEM_WORDS)
        }
    };

    let mut free = None;
    for item in 0..items {
        if heap.read_tagged(storage, item_offset(item, key_dict::KEY))? == hole {
            free = Some(item);
            break;
        }
    }
    let (storage, item) = match free {
        Some(item) => (storage, item),
        None => (grow(heap, obj, Some(storage), items)?, items),
    };

    heap.write_tagged(storage, item_offset(item, key_dict::KEY), key)?;
    heap.write_tagged(
        storage,
        item_offset(item, key_dict::ATTRIBUTES),
        Value::smi(DATA_ATTRIBUTES),
    )?;
    Ok(Slot::Item(item))
}

/// Replace the storage of `obj` with one of twice the items, copying the old
/// items over.
fn grow(heap: &mut Heap, obj: Value, old: Option<Value>, items: usize) -> Result<Value, Trap> {
    let capacity = (items * 2).max(object::MIN_SIZE as usize);
    let storage = heap.allocate_field(capacity * ITEM_WORDS)?;
    if let Some(old) = old {
        for word in 0..items * ITEM_WORDS {
            let value = heap.read_tagged(old, dense_offset(word))?;
            heap.write_tagged(storage, dense_offset(word), value)?;
        }
    }
    heap.write_tagged(obj, object::FIELD, storage)?;
    tracing::trace!(items = capacity, "grew property dictionary");
    Ok(storage)
}
