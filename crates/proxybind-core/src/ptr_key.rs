//! Reversible encoding of addresses into integer keys.
//!
//! Allocators hand out addresses whose low bits are almost always zero. Used
//! directly as integer keys they pile up in the same hash buckets, so the
//! codec rotates the address right by [`ROTATION`] bits before handing it to
//! a table. Decoding rotates it back.

use std::fmt;

use crate::ObjectHandle;

/// Number of bits the address is rotated by.
pub const ROTATION: u32 = 4;

/// An address encoded as a hashable integer key.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct PtrKey(u64);

impl PtrKey {
    /// Encode an address.
    #[inline]
    pub const fn encode(addr: u64) -> Self {
        PtrKey(addr.rotate_right(ROTATION))
    }

    /// Recover the address this key was built from.
    #[inline]
    pub const fn decode(self) -> u64 {
        self.0.rotate_left(ROTATION)
    }

    /// Encode a raw pointer.
    #[inline]
    pub fn from_ptr<T>(ptr: *const T) -> Self {
        Self::encode(ptr as usize as u64)
    }

    /// Decode into a raw pointer.
    #[inline]
    pub fn to_ptr<T>(self) -> *mut T {
        self.decode() as usize as *mut T
    }

    /// Encode a managed object handle.
    #[inline]
    pub fn from_handle(handle: ObjectHandle) -> Self {
        Self::encode(handle.to_bits())
    }

    /// Decode into a managed object handle.
    #[inline]
    pub fn to_handle(self) -> ObjectHandle {
        ObjectHandle::from_bits(self.decode())
    }

    /// The key as the managed runtime's signed integer value.
    #[inline]
    pub const fn as_i64(self) -> i64 {
        self.0 as i64
    }

    /// Rebuild a key from the managed runtime's signed integer value.
    #[inline]
    pub const fn from_i64(value: i64) -> Self {
        PtrKey(value as u64)
    }
}

impl fmt::Debug for PtrKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PtrKey({:#x})", self.decode())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_addresses() {
        let samples = [
            0u64,
            1,
            0x10,
            0x7fff_ffff_fff0,
            0xdead_beef_0000_0008,
            u64::MAX,
            u64::MAX - 0xf,
        ];
        for addr in samples {
            assert_eq!(PtrKey::encode(addr).decode(), addr);
        }
    }

    #[test]
    fn aligned_addresses_spread_into_high_bits() {
        let key = PtrKey::encode(0x1000);
        assert_eq!(key.as_i64(), 0x100);

        let low_nibble = PtrKey::encode(0x1);
        assert_eq!(low_nibble.as_i64() as u64, 1u64 << 60);
    }

    #[test]
    fn round_trips_through_signed_value() {
        let key = PtrKey::encode(0xffff_0000_0000_0001);
        assert_eq!(PtrKey::from_i64(key.as_i64()), key);
    }

    #[test]
    fn round_trips_pointers_and_handles() {
        let value = 42u64;
        let ptr: *const u64 = &value;
        assert_eq!(PtrKey::from_ptr(ptr).to_ptr::<u64>() as *const u64, ptr);

        let handle = ObjectHandle::new(7, 3);
        assert_eq!(PtrKey::from_handle(handle).to_handle(), handle);
    }
}
