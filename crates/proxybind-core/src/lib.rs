//! Core types for proxybind.
//!
//! This crate holds the leaf pieces every other proxybind crate shares:
//!
//! - [`TypeHash`] - stable identity of a native type
//! - [`PtrKey`] - reversible address-to-integer key codec
//! - [`NativeTypeDescriptor`] / [`DescriptorBuilder`] - what the bridge knows about a type
//! - [`RvPolicy`] - ownership policy for returned values
//! - [`BridgeError`] / [`FatalError`] / [`NativeError`] - error types
//! - [`runtime`] - the managed runtime's object model (heap, modules, `None`)

mod descriptor;
mod error;
mod policy;
mod ptr_key;
mod qualified_name;
pub mod runtime;
mod type_hash;

pub use descriptor::{
    CopyHook, DescriptorBuilder, DestructHook, InitHook, MoveHook, NativeTypeDescriptor,
    TypeFlags,
};
pub use error::{BridgeError, BridgeResult, FatalError, NativeError};
pub use policy::RvPolicy;
pub use ptr_key::{PtrKey, ROTATION};
pub use qualified_name::QualifiedName;
pub use runtime::{NoneObject, ObjectHandle, ObjectHeap, Scope};
pub use type_hash::{TypeHash, hash_constants};
