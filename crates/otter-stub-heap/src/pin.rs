//! Scoped heap pinning
//!
//! While any [`PinGuard`] is alive the collector must not move objects. Stub
//! compilation holds a guard for its whole duration because the compiler may
//! allocate internal structures that refer to live entities.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Shareable handle onto a heap's pin depth.
#[derive(Debug, Clone, Default)]
pub struct HeapPin {
    depth: Arc<AtomicUsize>,
}

impl HeapPin {
    /// Create an unpinned handle.
    pub fn new() -> Self {
        Self::default()
    }

    /// Pin the heap until the returned guard drops.
    pub fn enter(&self) -> PinGuard {
        self.depth.fetch_add(1, Ordering::AcqRel);
        PinGuard {
            depth: Arc::clone(&self.depth),
        }
    }

    /// Whether any guard is alive.
    pub fn is_pinned(&self) -> bool {
        self.depth() > 0
    }

    /// Number of live guards.
    pub fn depth(&self) -> usize {
        self.depth.load(Ordering::Acquire)
    }
}

/// Releases one level of pinning on drop.
#[must_use = "the heap is unpinned as soon as the guard drops"]
#[derive(Debug)]
pub struct PinGuard {
    depth: Arc<AtomicUsize>,
}

impl Drop for PinGuard {
    fn drop(&mut self) {
        self.depth.fetch_sub(1, Ordering::AcqRel);
    }
}
