//! TypeRegistry - native type identity to type object mapping.
//!
//! Each registered native type has exactly one type object in the managed
//! runtime. The registry maps the type identity to that object and to the
//! descriptor it was built from, and keeps the reverse mapping from the type
//! object's handle back to the identity.
//!
//! The registry does not own type objects. An entry is removed when its type
//! object is freed, which normally only happens at shutdown.

use std::sync::Arc;

use rustc_hash::FxHashMap;

use proxybind_core::{FatalError, NativeTypeDescriptor, ObjectHandle, TypeHash};

/// One registered type.
#[derive(Debug, Clone)]
pub struct TypeEntry {
    /// The descriptor, shared with the type object.
    pub descriptor: Arc<NativeTypeDescriptor>,
    /// The type object in the managed runtime.
    pub type_object: ObjectHandle,
}

/// Registry of bound native types.
#[derive(Debug, Default)]
pub struct TypeRegistry {
    entries: FxHashMap<TypeHash, TypeEntry>,
    by_object: FxHashMap<ObjectHandle, TypeHash>,
}

impl TypeRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a type object for a descriptor.
    ///
    /// Fails with [`FatalError::DuplicateType`] if the identity is already
    /// registered; the existing entry is left untouched.
    pub fn insert(
        &mut self,
        descriptor: Arc<NativeTypeDescriptor>,
        type_object: ObjectHandle,
    ) -> Result<(), FatalError> {
        let type_hash = descriptor.type_hash;
        if self.entries.contains_key(&type_hash) {
            return Err(FatalError::DuplicateType(descriptor.name.clone()));
        }

        log::debug!(
            "registered type '{}' ({}) as {:?}",
            descriptor.name,
            type_hash,
            type_object
        );
        self.by_object.insert(type_object, type_hash);
        self.entries.insert(
            type_hash,
            TypeEntry {
                descriptor,
                type_object,
            },
        );
        Ok(())
    }

    /// Remove the entry for a type whose type object is being freed.
    ///
    /// `name` is only used for the error when the identity is unknown.
    pub fn remove(&mut self, type_hash: TypeHash, name: &str) -> Result<TypeEntry, FatalError> {
        let entry = self
            .entries
            .remove(&type_hash)
            .ok_or_else(|| FatalError::UnknownType(name.to_string()))?;
        self.by_object.remove(&entry.type_object);
        log::debug!("unregistered type '{}' ({})", name, type_hash);
        Ok(entry)
    }

    /// Get the entry for a type identity.
    pub fn get(&self, type_hash: TypeHash) -> Option<&TypeEntry> {
        self.entries.get(&type_hash)
    }

    /// Get the descriptor for a type identity.
    pub fn descriptor(&self, type_hash: TypeHash) -> Option<&NativeTypeDescriptor> {
        self.entries.get(&type_hash).map(|e| e.descriptor.as_ref())
    }

    /// Get the type object for a type identity.
    pub fn type_object(&self, type_hash: TypeHash) -> Option<ObjectHandle> {
        self.entries.get(&type_hash).map(|e| e.type_object)
    }

    /// Reverse lookup: which type identity a type object was created for.
    pub fn type_of_object(&self, type_object: ObjectHandle) -> Option<TypeHash> {
        self.by_object.get(&type_object).copied()
    }

    /// Check if a type identity is registered.
    pub fn contains(&self, type_hash: TypeHash) -> bool {
        self.entries.contains_key(&type_hash)
    }

    /// Number of registered types.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no type is registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate over all entries.
    pub fn iter(&self) -> impl Iterator<Item = &TypeEntry> {
        self.entries.values()
    }
}
