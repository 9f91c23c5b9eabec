//! Module objects: named attribute tables that types are published into.

use rustc_hash::FxHashMap;

use super::ObjectHandle;

/// A module in the managed runtime.
///
/// Attribute values are strong references; whoever replaces or clears an
/// attribute is responsible for releasing the handle it gets back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scope {
    name: String,
    attrs: FxHashMap<String, ObjectHandle>,
}

impl Scope {
    /// Create an empty module named `name`.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attrs: FxHashMap::default(),
        }
    }

    /// The module's `__name__`.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Look up an attribute.
    pub fn get(&self, name: &str) -> Option<ObjectHandle> {
        self.attrs.get(name).copied()
    }

    /// Bind an attribute, returning the handle it replaced.
    pub fn set(&mut self, name: impl Into<String>, value: ObjectHandle) -> Option<ObjectHandle> {
        self.attrs.insert(name.into(), value)
    }

    /// Unbind an attribute, returning its handle.
    pub fn remove(&mut self, name: &str) -> Option<ObjectHandle> {
        self.attrs.remove(name)
    }

    /// Remove every attribute, handing the handles back to the caller.
    pub fn drain(&mut self) -> Vec<ObjectHandle> {
        self.attrs.drain().map(|(_, handle)| handle).collect()
    }

    /// Number of bound attributes.
    pub fn len(&self) -> usize {
        self.attrs.len()
    }

    /// Whether the module has no attributes.
    pub fn is_empty(&self) -> bool {
        self.attrs.is_empty()
    }
}
