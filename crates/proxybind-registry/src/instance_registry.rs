//! InstanceRegistry - native address to live proxy mapping.
//!
//! At most one live proxy exists per `(address, type)` pair. The type is part
//! of the key because distinct native objects can share an address, e.g. a
//! struct and its first field.

use std::hash::{Hash, Hasher};

use rustc_hash::FxHashMap;

use proxybind_core::{ObjectHandle, ROTATION, TypeHash};

/// Key of the instance registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InstanceKey {
    /// Address of the native value.
    pub addr: usize,
    /// Identity of the native type.
    pub type_hash: TypeHash,
}

impl InstanceKey {
    /// Create a key.
    pub fn new(addr: usize, type_hash: TypeHash) -> Self {
        Self { addr, type_hash }
    }
}

impl Hash for InstanceKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        // Rotate away the alignment zeros before mixing in the type.
        let addr = (self.addr as u64).rotate_right(ROTATION);
        state.write_u64(addr.wrapping_add(self.type_hash.0.wrapping_mul(3)));
    }
}

/// Registry of live proxy instances.
#[derive(Debug, Default)]
pub struct InstanceRegistry {
    instances: FxHashMap<InstanceKey, ObjectHandle>,
}

impl InstanceRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a new proxy.
    ///
    /// If a proxy is already recorded for the key, nothing changes and the
    /// existing handle is returned as the error.
    pub fn try_insert(&mut self, key: InstanceKey, proxy: ObjectHandle) -> Result<(), ObjectHandle> {
        if let Some(existing) = self.instances.get(&key) {
            return Err(*existing);
        }
        self.instances.insert(key, proxy);
        Ok(())
    }

    /// Find the live proxy for a key.
    pub fn get(&self, key: InstanceKey) -> Option<ObjectHandle> {
        self.instances.get(&key).copied()
    }

    /// Forget the proxy for a key.
    pub fn remove(&mut self, key: InstanceKey) -> Option<ObjectHandle> {
        self.instances.remove(&key)
    }

    /// Check if a proxy is recorded for a key.
    pub fn contains(&self, key: InstanceKey) -> bool {
        self.instances.contains_key(&key)
    }

    /// Number of live proxies.
    pub fn len(&self) -> usize {
        self.instances.len()
    }

    /// Whether no proxy is live.
    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    /// Iterate over all recorded proxies.
    pub fn iter(&self) -> impl Iterator<Item = (InstanceKey, ObjectHandle)> + '_ {
        self.instances.iter().map(|(k, v)| (*k, *v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_get_remove() {
        let mut registry = InstanceRegistry::new();
        let key = InstanceKey::new(0x1000, TypeHash::from_name("Vec3"));
        let proxy = ObjectHandle::new(1, 0);

        assert!(registry.try_insert(key, proxy).is_ok());
        assert_eq!(registry.get(key), Some(proxy));
        assert_eq!(registry.len(), 1);

        assert_eq!(registry.remove(key), Some(proxy));
        assert!(registry.is_empty());
        assert_eq!(registry.remove(key), None);
    }

    #[test]
    fn duplicate_insert_reports_existing() {
        let mut registry = InstanceRegistry::new();
        let key = InstanceKey::new(0x1000, TypeHash::from_name("Vec3"));
        let first = ObjectHandle::new(1, 0);

        registry.try_insert(key, first).unwrap();
        assert_eq!(registry.try_insert(key, ObjectHandle::new(2, 0)), Err(first));
        assert_eq!(registry.get(key), Some(first));
    }

    #[test]
    fn same_address_different_types_coexist() {
        let mut registry = InstanceRegistry::new();
        let outer = InstanceKey::new(0x2000, TypeHash::from_name("Outer"));
        let field = InstanceKey::new(0x2000, TypeHash::from_name("Field"));

        registry.try_insert(outer, ObjectHandle::new(1, 0)).unwrap();
        registry.try_insert(field, ObjectHandle::new(2, 0)).unwrap();
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.get(field), Some(ObjectHandle::new(2, 0)));
    }

    #[test]
    fn aligned_addresses_hash_apart() {
        use std::collections::HashSet;
        use std::hash::BuildHasher;

        let hasher = rustc_hash::FxBuildHasher;
        let ty = TypeHash::from_name("Vec3");
        let hashes: HashSet<u64> = (0..64usize)
            .map(|i| hasher.hash_one(InstanceKey::new(0x10_0000 + i * 16, ty)))
            .collect();
        assert_eq!(hashes.len(), 64);
    }
}
