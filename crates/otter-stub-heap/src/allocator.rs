//! Bump allocator over the heap region

/// Allocation alignment in bytes.
pub const ALIGNMENT: usize = 8;

/// Round `size` up to the allocation alignment.
#[inline]
pub const fn align_size(size: usize) -> usize {
    (size + ALIGNMENT - 1) & !(ALIGNMENT - 1)
}

/// Cursor-within-region allocator.
///
/// `current` only moves forward; reclaiming space is the collector's job.
#[derive(Debug, Clone)]
pub struct BumpAllocator {
    /// Next free byte
    current: usize,
    /// End of the region (exclusive)
    limit: usize,
}

impl BumpAllocator {
    /// Create an allocator handing out `[start, limit)`.
    pub fn new(start: usize, limit: usize) -> Self {
        Self {
            current: align_size(start),
            limit,
        }
    }

    /// Allocate `size` bytes (returns None if the region is exhausted)
    pub fn allocate(&mut self, size: usize) -> Option<usize> {
        let aligned_size = align_size(size);
        let after = self.current.checked_add(aligned_size)?;
        if after > self.limit {
            return None;
        }
        let start = self.current;
        self.current = after;
        Some(start)
    }

    /// Next free byte.
    pub fn current(&self) -> usize {
        self.current
    }

    /// End of the region.
    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Bytes left before the limit.
    pub fn available(&self) -> usize {
        self.limit - self.current
    }

    /// Move the cursor. Returns false if `current` is misaligned, behind the
    /// cursor or past the limit.
    pub fn set_current(&mut self, current: usize) -> bool {
        if current % ALIGNMENT != 0 || current < self.current || current > self.limit {
            return false;
        }
        self.current = current;
        true
    }
}
