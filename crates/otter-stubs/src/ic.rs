//! Inline-cache table
//!
//! One state per [`IcHandle`], recording which dictionary slot a property
//! lived at for the maps seen so far.

use otter_stub_cfg::IcHandle;
use rustc_hash::FxHashMap;

/// Maximum number of maps a polymorphic cache tracks.
pub const MAX_POLYMORPHIC: usize = 4;

/// State of one inline cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InlineCacheState {
    /// Nothing cached yet
    #[default]
    Uninitialized,
    /// Single map and slot cached
    Monomorphic {
        /// Raw map word
        map: u64,
        /// Dictionary slot
        slot: u32,
    },
    /// Several maps cached (up to 4)
    Polymorphic {
        /// Number of valid entries (2-4)
        count: u8,
        /// `(map, slot)` pairs
        entries: [(u64, u32); MAX_POLYMORPHIC],
    },
    /// Too many maps seen, caching disabled
    Megamorphic,
}

impl InlineCacheState {
    /// Cached slot for `map`.
    pub fn lookup(&self, map: u64) -> Option<u32> {
        match *self {
            InlineCacheState::Monomorphic { map: cached, slot } if cached == map => Some(slot),
            InlineCacheState::Polymorphic { count, entries } => entries[..usize::from(count)]
                .iter()
                .find(|(cached, _)| *cached == map)
                .map(|(_, slot)| *slot),
            _ => None,
        }
    }

    /// State after observing `map` at `slot`.
    pub fn record(self, map: u64, slot: u32) -> Self {
        match self {
            InlineCacheState::Uninitialized => InlineCacheState::Monomorphic { map, slot },
            InlineCacheState::Monomorphic { map: cached, .. } if cached == map => {
                InlineCacheState::Monomorphic { map, slot }
            }
            InlineCacheState::Monomorphic {
                map: cached,
                slot: cached_slot,
            } => {
                let mut entries = [(0, 0); MAX_POLYMORPHIC];
                entries[0] = (cached, cached_slot);
                entries[1] = (map, slot);
                InlineCacheState::Polymorphic { count: 2, entries }
            }
            InlineCacheState::Polymorphic { count, mut entries } => {
                let len = usize::from(count);
                if let Some(entry) = entries[..len].iter_mut().find(|(cached, _)| *cached == map) {
                    entry.1 = slot;
                    return InlineCacheState::Polymorphic { count, entries };
                }
                if len == MAX_POLYMORPHIC {
                    return InlineCacheState::Megamorphic;
                }
                entries[len] = (map, slot);
                InlineCacheState::Polymorphic {
                    count: count + 1,
                    entries,
                }
            }
            InlineCacheState::Megamorphic => InlineCacheState::Megamorphic,
        }
    }
}

/// Inline-cache states keyed by handle.
#[derive(Debug, Default)]
pub struct InlineCacheTable {
    states: FxHashMap<IcHandle, InlineCacheState>,
}

impl InlineCacheTable {
    /// Empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// State of `ic`.
    pub fn state(&self, ic: IcHandle) -> InlineCacheState {
        self.states.get(&ic).copied().unwrap_or_default()
    }

    /// Record that `map` keeps the property at `slot`.
    pub fn record(&mut self, ic: IcHandle, map: u64, slot: u32) {
        let state = self.states.entry(ic).or_default();
        *state = state.record(map, slot);
    }
}
