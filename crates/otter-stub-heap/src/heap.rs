//! Heap region
//!
//! One contiguous byte region, a bump cursor, the canonical maps and the
//! preallocated oddballs. Address 0 is never handed out so a zero word is
//! never a valid entity.

use rustc_hash::FxHashMap;

use crate::allocator::{BumpAllocator, align_size};
use crate::config::HeapConfig;
use crate::error::{HeapError, HeapResult};
use crate::layout::{EntityKind, WORD_SIZE, access_pair, atom, base, boolean, field, map, oddball};
use crate::pin::HeapPin;
use crate::value::Value;

// =============================================================================
// Byte-level access helpers
// =============================================================================

#[inline(always)]
fn read_u64(memory: &[u8], byte_offset: usize) -> Option<u64> {
    let slice = memory.get(byte_offset..byte_offset + WORD_SIZE)?;
    let bytes: [u8; 8] = slice.try_into().ok()?;
    Some(u64::from_le_bytes(bytes))
}

#[inline(always)]
fn write_u64(memory: &mut [u8], byte_offset: usize, value: u64) -> Option<()> {
    let slice = memory.get_mut(byte_offset..byte_offset + WORD_SIZE)?;
    slice.copy_from_slice(&value.to_le_bytes());
    Some(())
}

/// Preallocated singletons.
#[derive(Debug, Clone, Copy)]
pub struct Roots {
    /// `undefined`
    pub undefined: Value,
    /// `null`
    pub null: Value,
    /// Uninitialized slot marker
    pub hole: Value,
    /// `true`
    pub true_value: Value,
    /// `false`
    pub false_value: Value,
}

/// The VM heap
pub struct Heap {
    memory: Vec<u8>,
    allocator: BumpAllocator,
    maps: [Value; EntityKind::COUNT],
    roots: Roots,
    atoms: FxHashMap<String, Value>,
    atom_names: Vec<String>,
    pin: HeapPin,
}

impl Heap {
    /// Create a heap configured from the environment
    pub fn new() -> HeapResult<Self> {
        Self::with_config(HeapConfig::from_env())
    }

    /// Create a heap with a custom config
    pub fn with_config(config: HeapConfig) -> HeapResult<Self> {
        let region_size = align_size(config.region_size);
        let placeholder = Value::pointer(0);
        let mut heap = Self {
            memory: vec![0u8; region_size],
            allocator: BumpAllocator::new(WORD_SIZE, region_size),
            maps: [placeholder; EntityKind::COUNT],
            roots: Roots {
                undefined: placeholder,
                null: placeholder,
                hole: placeholder,
                true_value: placeholder,
                false_value: placeholder,
            },
            atoms: FxHashMap::default(),
            atom_names: Vec::new(),
            pin: HeapPin::new(),
        };
        heap.bootstrap()?;
        Ok(heap)
    }

    fn bootstrap(&mut self) -> HeapResult<()> {
        // The map of maps describes itself
        let meta = Value::pointer(self.bump(map::SIZE)?);
        self.write_tagged(meta, base::MAP, meta)?;
        self.maps[EntityKind::Map.index()] = meta;

        for kind in EntityKind::ALL {
            if kind == EntityKind::Map {
                continue;
            }
            let m = Value::pointer(self.bump(map::SIZE)?);
            self.write_tagged(m, base::MAP, meta)?;
            self.maps[kind.index()] = m;
        }

        for kind in EntityKind::ALL {
            let m = self.maps[kind.index()];
            let flags = if kind == EntityKind::Function {
                map::flags::FN
            } else {
                map::flags::DEFAULT
            };
            self.write_tagged(m, map::FLAGS, Value::smi(flags))?;
            self.write_tagged(m, map::TRANSITION_COUNT, Value::smi(0))?;
        }

        self.roots.undefined = self.allocate_oddball(oddball::UNDEFINED)?;
        self.roots.null = self.allocate_oddball(oddball::NULL)?;
        self.roots.hole = self.allocate_oddball(oddball::HOLE)?;
        self.roots.true_value = self.allocate_boolean(true)?;
        self.roots.false_value = self.allocate_boolean(false)?;

        // Every canonical chain ends at `null`, whose map points back at null
        for kind in EntityKind::ALL {
            let m = self.maps[kind.index()];
            self.write_tagged(m, map::PROTO, self.roots.null)?;
            self.write_tagged(m, map::EDGES, self.roots.hole)?;
        }
        Ok(())
    }

    fn allocate_oddball(&mut self, which: i32) -> HeapResult<Value> {
        let value = self.allocate(EntityKind::Oddball, oddball::SIZE)?;
        self.write_tagged(value, oddball::KIND, Value::smi(which))?;
        Ok(value)
    }

    fn allocate_boolean(&mut self, truth: bool) -> HeapResult<Value> {
        let value = self.allocate(EntityKind::Boolean, boolean::SIZE)?;
        self.write_tagged(value, boolean::VALUE, Value::smi(i32::from(truth)))?;
        Ok(value)
    }

    fn bump(&mut self, size: usize) -> HeapResult<usize> {
        match self.allocator.allocate(size) {
            Some(address) => Ok(address),
            None => {
                #[cfg(feature = "heap_logging")]
                tracing::debug!(
                    requested = align_size(size),
                    available = self.allocator.available(),
                    pinned = self.pin.is_pinned(),
                    "heap region exhausted"
                );
                Err(HeapError::NeedsCollection {
                    requested: align_size(size),
                    available: self.allocator.available(),
                })
            }
        }
    }

    // -------------------------------------------------------------------------
    // Allocation
    // -------------------------------------------------------------------------

    /// Allocate `size` bytes and stamp the canonical map for `kind`.
    pub fn allocate(&mut self, kind: EntityKind, size: usize) -> HeapResult<Value> {
        let value = Value::pointer(self.bump(size.max(WORD_SIZE))?);
        self.write_tagged(value, base::MAP, self.maps[kind.index()])?;
        Ok(value)
    }

    /// Allocate a field of `slots` slots, every slot holding the hole.
    pub fn allocate_field(&mut self, slots: usize) -> HeapResult<Value> {
        let value = self.allocate(EntityKind::Field, field::size(slots))?;
        let length = i64::try_from(slots)
            .ok()
            .and_then(Value::try_smi)
            .ok_or(HeapError::OutOfBounds { address: slots })?;
        self.write_tagged(value, field::LENGTH, length)?;
        let start = self.address_of(value)? + field::DATA;
        self.fill(start, start + slots * WORD_SIZE, self.roots.hole)?;
        Ok(value)
    }

    /// Allocate an accessor pair with both accessors unset.
    pub fn allocate_access_pair(&mut self) -> HeapResult<Value> {
        let pair = self.allocate(EntityKind::AccessPair, access_pair::SIZE)?;
        self.write_tagged(pair, access_pair::GETTER, self.roots.hole)?;
        self.write_tagged(pair, access_pair::SETTER, self.roots.hole)?;
        self.write_tagged(
            pair,
            access_pair::ATTRIBUTES,
            Value::smi(access_pair::attributes::DEFAULT),
        )?;
        Ok(pair)
    }

    /// The bump allocator.
    pub fn allocator(&self) -> &BumpAllocator {
        &self.allocator
    }

    /// Move the bump cursor. Used by the raw allocation stubs.
    pub fn set_current(&mut self, current: usize) -> HeapResult<()> {
        if self.allocator.set_current(current) {
            Ok(())
        } else {
            Err(HeapError::OutOfBounds { address: current })
        }
    }

    /// Bytes handed out so far.
    pub fn used(&self) -> usize {
        self.allocator.current()
    }

    /// Size of the region.
    pub fn capacity(&self) -> usize {
        self.memory.len()
    }

    // -------------------------------------------------------------------------
    // Access
    // -------------------------------------------------------------------------

    fn address_of(&self, value: Value) -> HeapResult<usize> {
        match value.address() {
            Some(0) => Err(HeapError::OutOfBounds { address: 0 }),
            Some(address) => Ok(address),
            None => Err(HeapError::NotAPointer(value)),
        }
    }

    fn checked(&self, address: usize) -> HeapResult<usize> {
        if address < WORD_SIZE
            || address % WORD_SIZE != 0
            || address + WORD_SIZE > self.memory.len()
        {
            return Err(HeapError::OutOfBounds { address });
        }
        Ok(address)
    }

    /// Read the word at an absolute address.
    pub fn read_word(&self, address: usize) -> HeapResult<Value> {
        let address = self.checked(address)?;
        read_u64(&self.memory, address)
            .map(Value::from_raw)
            .ok_or(HeapError::OutOfBounds { address })
    }

    /// Write the word at an absolute address.
    pub fn write_word(&mut self, address: usize, value: Value) -> HeapResult<()> {
        let address = self.checked(address)?;
        write_u64(&mut self.memory, address, value.raw()).ok_or(HeapError::OutOfBounds { address })
    }

    /// Read the tagged word `offset` bytes into the entity at `base`.
    pub fn read_tagged(&self, base: Value, offset: usize) -> HeapResult<Value> {
        let address = self.address_of(base)?;
        self.read_word(address + offset)
    }

    /// Write the tagged word `offset` bytes into the entity at `base`.
    pub fn write_tagged(&mut self, base: Value, offset: usize, value: Value) -> HeapResult<()> {
        let address = self.address_of(base)?;
        self.write_word(address + offset, value)
    }

    /// Read a small-integer field.
    pub fn read_smi(&self, base: Value, offset: usize) -> HeapResult<i64> {
        let value = self.read_tagged(base, offset)?;
        value.as_smi().ok_or(HeapError::NotASmi(value))
    }

    /// Store `value` into every word of `[start, end)`.
    pub fn fill(&mut self, start: usize, end: usize, value: Value) -> HeapResult<()> {
        let mut address = start;
        while address < end {
            self.write_word(address, value)?;
            address += WORD_SIZE;
        }
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Maps and kinds
    // -------------------------------------------------------------------------

    /// Canonical map for `kind`.
    pub fn canonical_map(&self, kind: EntityKind) -> Value {
        self.maps[kind.index()]
    }

    /// The map of a heap entity.
    pub fn map_of(&self, value: Value) -> HeapResult<Value> {
        self.read_tagged(value, base::MAP)
    }

    /// Kind of a heap entity, or None for small integers and garbage words.
    ///
    /// Non-canonical maps are instance maps, which only describe plain
    /// objects.
    pub fn kind_of(&self, value: Value) -> Option<EntityKind> {
        let m = self.map_of(value).ok()?;
        let kind = EntityKind::ALL
            .into_iter()
            .find(|kind| self.maps[kind.index()] == m)
            .unwrap_or(EntityKind::Object);
        Some(kind)
    }

    /// Whether the entity's map has `flag` set.
    pub fn map_has_flag(&self, value: Value, flag: i32) -> HeapResult<bool> {
        let m = self.map_of(value)?;
        Ok(self.read_smi(m, map::FLAGS)? & i64::from(flag) != 0)
    }

    // -------------------------------------------------------------------------
    // Singletons
    // -------------------------------------------------------------------------

    /// Preallocated singletons.
    pub fn roots(&self) -> &Roots {
        &self.roots
    }

    /// `undefined`
    pub fn undefined(&self) -> Value {
        self.roots.undefined
    }

    /// Uninitialized slot marker
    pub fn hole(&self) -> Value {
        self.roots.hole
    }

    /// Canonical `true` or `false`.
    pub fn boolean(&self, truth: bool) -> Value {
        if truth {
            self.roots.true_value
        } else {
            self.roots.false_value
        }
    }

    /// Whether `value` is `undefined`, `null` or the hole.
    pub fn is_nullish(&self, value: Value) -> bool {
        value == self.roots.undefined || value == self.roots.null || value == self.roots.hole
    }

    // -------------------------------------------------------------------------
    // Atoms
    // -------------------------------------------------------------------------

    /// Intern a property name. The same name always yields the same entity.
    pub fn atom(&mut self, name: &str) -> HeapResult<Value> {
        if let Some(value) = self.atoms.get(name) {
            return Ok(*value);
        }
        let value = self.allocate(EntityKind::Atom, atom::SIZE)?;
        let id = i32::try_from(self.atom_names.len())
            .map_err(|_| HeapError::OutOfBounds { address: self.atom_names.len() })?;
        self.write_tagged(value, atom::ID, Value::smi(id))?;
        self.atoms.insert(name.to_string(), value);
        self.atom_names.push(name.to_string());
        Ok(value)
    }

    /// Name of an interned atom.
    pub fn atom_name(&self, value: Value) -> Option<&str> {
        if self.kind_of(value) != Some(EntityKind::Atom) {
            return None;
        }
        let id = self.read_smi(value, atom::ID).ok()?;
        self.atom_names
            .get(usize::try_from(id).ok()?)
            .map(String::as_str)
    }

    // -------------------------------------------------------------------------
    // Pinning
    // -------------------------------------------------------------------------

    /// Handle used to pin this heap against relocation.
    pub fn pin_handle(&self) -> HeapPin {
        self.pin.clone()
    }

    /// Whether the heap is currently pinned.
    pub fn is_pinned(&self) -> bool {
        self.pin.is_pinned()
    }
}

impl std::fmt::Debug for Heap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Heap")
            .field("used", &self.used())
            .field("capacity", &self.capacity())
            .field("atoms", &self.atom_names.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_heap_creation() {
        let heap = Heap::new().unwrap();
        assert!(heap.used() > WORD_SIZE);
        assert_eq!(heap.capacity(), 1024 * 1024);
    }

    #[test]
    fn test_meta_map_is_self_referential() {
        let heap = Heap::new().unwrap();
        let meta = heap.canonical_map(EntityKind::Map);
        assert_eq!(heap.map_of(meta).unwrap(), meta);
        let object_map = heap.canonical_map(EntityKind::Object);
        assert_eq!(heap.map_of(object_map).unwrap(), meta);
    }

    #[test]
    fn test_only_function_map_has_fn_flag() {
        let heap = Heap::new().unwrap();
        for kind in EntityKind::ALL {
            let m = heap.canonical_map(kind);
            let flags = heap.read_smi(m, map::FLAGS).unwrap();
            assert_eq!(flags == i64::from(map::flags::FN), kind == EntityKind::Function);
        }
    }

    #[test]
    fn test_canonical_protos_end_at_null() {
        let heap = Heap::new().unwrap();
        let null = heap.roots().null;
        let null_map = heap.map_of(null).unwrap();
        assert_eq!(heap.read_tagged(null_map, map::PROTO).unwrap(), null);
    }

    #[test]
    fn test_allocate_field_fills_holes() {
        let mut heap = Heap::new().unwrap();
        let f = heap.allocate_field(5).unwrap();
        assert_eq!(heap.read_smi(f, field::LENGTH).unwrap(), 5);
        for i in 0..5 {
            assert_eq!(
                heap.read_tagged(f, field::DATA + i * WORD_SIZE).unwrap(),
                heap.hole()
            );
        }
        assert_eq!(heap.kind_of(f), Some(EntityKind::Field));
    }

    #[test]
    fn test_exhaustion_reports_needs_collection() {
        let mut heap = Heap::with_config(HeapConfig::with_region_size(4096)).unwrap();
        let err = heap.allocate(EntityKind::Object, 8192).unwrap_err();
        assert!(matches!(err, HeapError::NeedsCollection { requested: 8192, .. }));
    }

    #[test]
    fn test_atoms_are_interned() {
        let mut heap = Heap::new().unwrap();
        let a = heap.atom("prototype").unwrap();
        let b = heap.atom("prototype").unwrap();
        let c = heap.atom("length").unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(heap.atom_name(c), Some("length"));
        assert_eq!(heap.kind_of(a), Some(EntityKind::Atom));
    }

    #[test]
    fn test_null_and_smi_access_rejected() {
        let heap = Heap::new().unwrap();
        assert!(matches!(
            heap.read_tagged(Value::pointer(0), 0),
            Err(HeapError::OutOfBounds { address: 0 })
        ));
        assert!(matches!(
            heap.read_tagged(Value::smi(4), 0),
            Err(HeapError::NotAPointer(_))
        ));
    }

    #[test]
    fn test_access_pair_defaults() {
        let mut heap = Heap::new().unwrap();
        let pair = heap.allocate_access_pair().unwrap();
        assert_eq!(heap.read_tagged(pair, access_pair::GETTER).unwrap(), heap.hole());
        assert_eq!(heap.read_tagged(pair, access_pair::SETTER).unwrap(), heap.hole());
        assert_eq!(
            heap.read_smi(pair, access_pair::ATTRIBUTES).unwrap(),
            i64::from(access_pair::attributes::DEFAULT)
        );
    }
}
