//! The managed runtime's object model, as far as the bridge needs it.
//!
//! - [`ObjectHeap`] - reference-counted object storage with generational handles
//! - [`Scope`] - module objects with an attribute table
//! - [`NoneObject`] - the runtime's `None` singleton

mod object_heap;
mod scope;

pub use object_heap::{ObjectHandle, ObjectHeap};
pub use scope::Scope;

/// Marker type of the runtime's `None` object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NoneObject;
