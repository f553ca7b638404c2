//! Tagged machine words
//!
//! A value is either a small integer carried inline or the address of a heap
//! entity. The low bit decides which.
//!
//! ## Encoding Scheme
//!
//! ```text
//! 64 bits: PPPPPPPP ... PPPPPPPT
//!          T = tag bit
//!
//! Small integer: T = 1, payload = bits >> 1 (63-bit signed)
//! Pointer:       T = 0, bits = byte address inside the heap region
//! ```
//!
//! Heap entities are 8-byte aligned, so a pointer never has the tag bit set.

use std::fmt;

const SMI_TAG: u64 = 1;
const SMI_TAG_MASK: u64 = 1;
const SMI_SHIFT: u32 = 1;

/// Smallest integer representable inline.
pub const SMI_MIN: i64 = -(1 << 62);

/// Largest integer representable inline.
pub const SMI_MAX: i64 = (1 << 62) - 1;

/// A tagged machine word.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Value(u64);

impl Value {
    /// Reinterpret raw bits as a value.
    #[inline]
    pub const fn from_raw(bits: u64) -> Self {
        Self(bits)
    }

    /// Raw bits of this value.
    #[inline]
    pub const fn raw(self) -> u64 {
        self.0
    }

    /// Encode a 32-bit integer. Always fits.
    #[inline]
    pub const fn smi(value: i32) -> Self {
        Self(((value as i64 as u64) << SMI_SHIFT) | SMI_TAG)
    }

    /// Encode an integer if it lies within the small-integer range.
    #[inline]
    pub fn try_smi(value: i64) -> Option<Self> {
        if (SMI_MIN..=SMI_MAX).contains(&value) {
            Some(Self(((value as u64) << SMI_SHIFT) | SMI_TAG))
        } else {
            None
        }
    }

    /// Encode an integer, discarding bits that do not fit the payload.
    ///
    /// Used to materialize the result of an overflowed operation; callers
    /// check the overflow flag before trusting it.
    #[inline]
    pub const fn smi_wrapping(value: i64) -> Self {
        Self(((value as u64) << SMI_SHIFT) | SMI_TAG)
    }

    /// Encode a heap address.
    #[inline]
    pub const fn pointer(address: usize) -> Self {
        debug_assert!(address & (SMI_TAG_MASK as usize) == 0);
        Self(address as u64)
    }

    /// Whether this is a small integer.
    #[inline]
    pub const fn is_smi(self) -> bool {
        self.0 & SMI_TAG_MASK == SMI_TAG
    }

    /// Whether this is a heap pointer.
    #[inline]
    pub const fn is_pointer(self) -> bool {
        !self.is_smi()
    }

    /// Decode a small integer.
    #[inline]
    pub const fn as_smi(self) -> Option<i64> {
        if self.is_smi() {
            Some((self.0 as i64) >> SMI_SHIFT)
        } else {
            None
        }
    }

    /// Decode a heap address.
    #[inline]
    pub const fn address(self) -> Option<usize> {
        if self.is_pointer() {
            Some(self.0 as usize)
        } else {
            None
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.as_smi() {
            Some(n) => write!(f, "Smi({})", n),
            None => write!(f, "Ptr({:#x})", self.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn smi_roundtrip_extremes() {
        assert_eq!(Value::try_smi(SMI_MAX).and_then(Value::as_smi), Some(SMI_MAX));
        assert_eq!(Value::try_smi(SMI_MIN).and_then(Value::as_smi), Some(SMI_MIN));
        assert_eq!(Value::smi(-7).as_smi(), Some(-7));
    }

    #[test]
    fn smi_out_of_range_rejected() {
        assert!(Value::try_smi(SMI_MAX + 1).is_none());
        assert!(Value::try_smi(SMI_MIN - 1).is_none());
        assert!(Value::try_smi(i64::MAX).is_none());
    }

    #[test]
    fn pointer_has_tag_cleared() {
        let ptr = Value::pointer(0x40);
        assert!(ptr.is_pointer());
        assert!(!ptr.is_smi());
        assert_eq!(ptr.address(), Some(0x40));
        assert_eq!(ptr.as_smi(), None);
        assert_eq!(Value::smi(3).address(), None);
    }
}
