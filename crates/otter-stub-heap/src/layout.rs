//! Entity layouts
//!
//! Byte offsets and size formulas for every heap entity kind. All fields are
//! tagged words; integer-valued fields (flags, sizes, attributes) hold small
//! integers.
//!
//! ```text
//! Map:        | map | flags | proto | edges | transition_count |
//! Object:     | map | flags | field |
//! Field:      | map | size  | slot 0 | slot 1 | ... |
//! Function:   | map | flags | field | code | instance_map | outer | context_size | ctx 0 | ... |
//! AccessPair: | map | getter | setter | attributes |
//! ```

/// Bytes per tagged word.
pub const WORD_SIZE: usize = 8;

/// `log2(WORD_SIZE)`, the shift turning a slot index into a byte offset.
pub const PTR_SHIFT: u32 = 3;

/// Header shared by all entities.
pub mod base {
    /// The entity's map.
    pub const MAP: usize = 0;
}

/// Shape descriptors.
pub mod map {
    /// Flag bits.
    pub const FLAGS: usize = 8;
    /// Prototype of instances carrying this map.
    pub const PROTO: usize = 16;
    /// Transition edges (unused by the stubs, hole-filled).
    pub const EDGES: usize = 24;
    /// Number of transitions.
    pub const TRANSITION_COUNT: usize = 32;
    /// Entity size.
    pub const SIZE: usize = 40;

    /// Map flag bits.
    pub mod flags {
        /// No flags.
        pub const DEFAULT: i32 = 0;
        /// Instances are callable functions.
        pub const FN: i32 = 1;
    }
}

/// Plain objects.
pub mod object {
    /// Object flag bits.
    pub const FLAGS: usize = 8;
    /// Property storage field.
    pub const FIELD: usize = 16;
    /// Entity size.
    pub const SIZE: usize = 24;
    /// Number of dictionary items a fresh object can hold.
    pub const MIN_SIZE: i32 = 8;

    /// Object flag bits.
    pub mod flags {
        /// Dictionary storage, no accessors.
        pub const DEFAULT: i32 = 0;
        /// An accessor pair exists; every access goes through the runtime.
        pub const ACCESS: i32 = 1;
        /// Storage is dense (slot index addresses the field directly).
        pub const DENSE: i32 = 2;
    }
}

/// Raw tagged buffers.
pub mod field {
    use super::WORD_SIZE;

    /// Number of slots, as a small integer.
    pub const LENGTH: usize = 8;
    /// First slot.
    pub const DATA: usize = 16;
    /// Shift turning a slot count into a byte count.
    pub const SHIFT: u32 = super::PTR_SHIFT;

    /// Entity size for `slots` slots.
    pub const fn size(slots: usize) -> usize {
        DATA + slots * WORD_SIZE
    }
}

/// Key/value dictionaries stored in a field.
pub mod key_dict {
    /// Words per item.
    pub const ITEM_SIZE: i32 = 3;
    /// Key word within an item.
    pub const KEY: i32 = 0;
    /// Value word within an item.
    pub const VALUE: i32 = 1;
    /// Attribute word within an item.
    pub const ATTRIBUTES: i32 = 2;
}

/// Functions.
pub mod function {
    use super::WORD_SIZE;

    /// Code entity to run on call.
    pub const CODE: usize = 24;
    /// Map assigned to instances created with `new`.
    pub const INSTANCE_MAP: usize = 32;
    /// Outer lexical context.
    pub const OUTER: usize = 40;
    /// Number of inline context slots, as a small integer.
    pub const CONTEXT_SIZE: usize = 48;
    /// First inline context slot.
    pub const CONTEXT: usize = 56;

    /// Entity size for `slots` inline context slots.
    pub const fn size(slots: usize) -> usize {
        CONTEXT + slots * WORD_SIZE
    }
}

/// Getter/setter pairs.
pub mod access_pair {
    /// Getter, or hole.
    pub const GETTER: usize = 8;
    /// Setter, or hole.
    pub const SETTER: usize = 16;
    /// Attribute bits.
    pub const ATTRIBUTES: usize = 24;
    /// Entity size.
    pub const SIZE: usize = 32;

    /// Attribute bits.
    pub mod attributes {
        /// Value may change.
        pub const WRITABLE: i32 = 1;
        /// Visible to enumeration.
        pub const ENUMERABLE: i32 = 2;
        /// May be deleted or redefined.
        pub const CONFIGURABLE: i32 = 4;
        /// Attributes of a fresh pair.
        pub const DEFAULT: i32 = ENUMERABLE | CONFIGURABLE;
    }
}

/// Callable code handles.
pub mod code {
    /// Index into the executor's code table.
    pub const INDEX: usize = 8;
    /// Entity size.
    pub const SIZE: usize = 16;
}

/// Boolean wrappers for `true` and `false`.
pub mod boolean {
    /// 1 or 0.
    pub const VALUE: usize = 8;
    /// Entity size.
    pub const SIZE: usize = 16;
}

/// `undefined`, `null` and the hole.
pub mod oddball {
    /// Which oddball this is.
    pub const KIND: usize = 8;
    /// Entity size.
    pub const SIZE: usize = 16;

    /// `undefined`.
    pub const UNDEFINED: i32 = 0;
    /// `null`.
    pub const NULL: i32 = 1;
    /// Uninitialized slot marker.
    pub const HOLE: i32 = 2;
}

/// Interned property names.
pub mod atom {
    /// Interning id.
    pub const ID: usize = 8;
    /// Entity size.
    pub const SIZE: usize = 16;
}

/// Entity kinds with a canonical map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    /// Maps themselves.
    Map,
    /// `true` / `false`.
    Boolean,
    /// Tagged buffers.
    Field,
    /// Plain objects.
    Object,
    /// Functions.
    Function,
    /// Accessor pairs.
    AccessPair,
    /// Code handles.
    Code,
    /// `undefined`, `null`, hole.
    Oddball,
    /// Property names.
    Atom,
}

impl EntityKind {
    /// Number of kinds.
    pub const COUNT: usize = 9;

    /// Every kind, in map-table order.
    pub const ALL: [EntityKind; Self::COUNT] = [
        EntityKind::Map,
        EntityKind::Boolean,
        EntityKind::Field,
        EntityKind::Object,
        EntityKind::Function,
        EntityKind::AccessPair,
        EntityKind::Code,
        EntityKind::Oddball,
        EntityKind::Atom,
    ];

    /// Position in the map table.
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Name used in stub names (`allocTagged/<name>`).
    pub const fn name(self) -> &'static str {
        match self {
            EntityKind::Map => "map",
            EntityKind::Boolean => "boolean",
            EntityKind::Field => "field",
            EntityKind::Object => "object",
            EntityKind::Function => "function",
            EntityKind::AccessPair => "access-pair",
            EntityKind::Code => "code",
            EntityKind::Oddball => "oddball",
            EntityKind::Atom => "atom",
        }
    }

    /// Look a kind up by name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.name() == name)
    }

    /// Whether instances carry object flags and property storage.
    pub const fn is_object_like(self) -> bool {
        matches!(self, EntityKind::Object | EntityKind::Function)
    }
}
