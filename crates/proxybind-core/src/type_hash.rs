//! Stable identity for native types.
//!
//! [`TypeHash`] is the key every bridge table uses to refer to a native type.
//! It compares by value, so two binaries that agree on how a type is named
//! agree on its identity even when their type-info objects live at different
//! addresses.
//!
//! # Examples
//!
//! ```
//! use proxybind_core::TypeHash;
//!
//! let a = TypeHash::from_name("geometry::Vec3");
//! let b = TypeHash::from_name("geometry::Vec3");
//! assert_eq!(a, b);
//!
//! assert_eq!(TypeHash::of::<u32>(), TypeHash::of::<u32>());
//! assert_ne!(TypeHash::of::<u32>(), TypeHash::of::<i32>());
//! ```

use std::any::TypeId;
use std::fmt;
use std::hash::{Hash, Hasher};

use xxhash_rust::xxh64::{Xxh64, xxh64};

/// Domain markers mixed into computed hashes.
pub mod hash_constants {
    /// Domain marker for hashes computed from a type name.
    pub const NAMED: u64 = 0x2fac10b63a6cc57c;

    /// Domain marker for hashes computed from a Rust `TypeId`.
    pub const RUST_TYPE: u64 = 0x9a7f3d5e2b8c4601;
}

/// A 64-bit identity for a native type.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct TypeHash(pub u64);

impl TypeHash {
    /// Empty/invalid hash constant.
    pub const EMPTY: TypeHash = TypeHash(0);

    /// Identity computed from a stable, fully qualified type name.
    ///
    /// Use this when the same type is described by more than one binary.
    #[inline]
    pub fn from_name(name: &str) -> Self {
        TypeHash(hash_constants::NAMED ^ xxh64(name.as_bytes(), 0))
    }

    /// Identity of a Rust type, derived from its `TypeId`.
    #[inline]
    pub fn of<T: 'static>() -> Self {
        Self::of_type_id(TypeId::of::<T>())
    }

    /// Identity of an existing `TypeId`.
    #[inline]
    pub fn of_type_id(type_id: TypeId) -> Self {
        let mut hasher = Xxh64::new(0);
        type_id.hash(&mut hasher);
        TypeHash(hash_constants::RUST_TYPE ^ hasher.finish())
    }

    /// Check if this is an empty/invalid hash.
    #[inline]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Get the underlying u64 value.
    #[inline]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Debug for TypeHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypeHash({:#018x})", self.0)
    }
}

impl fmt::Display for TypeHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#018x}", self.0)
    }
}
