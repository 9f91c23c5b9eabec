//! Type objects and type registration.
//!
//! Registering a [`NativeTypeDescriptor`] creates one [`ProxyType`] in the
//! managed heap and records it in the type registry. Registration runs in
//! phases so that the registry never points at a half-built type object:
//!
//! 1. read the names of the enclosing scope
//! 2. build the complete `ProxyType` value without touching the runtime
//! 3. allocate it and insert it into the registry
//! 4. publish it on its scope and set its module name
//!
//! A type object lives as long as something references it: its scope
//! attribute, the bridge (for unscoped types) and every live instance.
//! Freeing it removes the registry entry.

use std::fmt;
use std::sync::Arc;

use rustc_hash::FxHashMap;

use proxybind_core::{
    BridgeError, BridgeResult, FatalError, NativeTypeDescriptor, ObjectHandle, QualifiedName,
    Scope, TypeHash,
};

use crate::bridge::Bridge;
use crate::instance::{instance_dealloc, instance_init, instance_new};

/// Creates an uninitialized instance of a type object.
pub type NewSlot = fn(&mut Bridge, ObjectHandle) -> BridgeResult<ObjectHandle>;
/// Initializes a freshly created instance.
pub type InitSlot = fn(&mut Bridge, ObjectHandle) -> BridgeResult<()>;
/// Finalizes an instance whose last reference was released.
pub type DeallocSlot = fn(&mut Bridge, ObjectHandle) -> BridgeResult<()>;

/// Per-type behavior installed at registration.
#[derive(Clone, Copy)]
pub struct TypeSlots {
    /// Allocation.
    pub new: NewSlot,
    /// Zero-argument initialization.
    pub init: InitSlot,
    /// Release.
    pub dealloc: DeallocSlot,
}

impl Default for TypeSlots {
    fn default() -> Self {
        Self {
            new: instance_new,
            init: instance_init,
            dealloc: instance_dealloc,
        }
    }
}

impl fmt::Debug for TypeSlots {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeSlots").finish_non_exhaustive()
    }
}

/// The managed-side type object of a registered native type.
#[derive(Debug)]
pub struct ProxyType {
    pub(crate) descriptor: Arc<NativeTypeDescriptor>,
    pub(crate) name: QualifiedName,
    pub(crate) slots: TypeSlots,
    pub(crate) attrs: FxHashMap<String, ObjectHandle>,
}

impl ProxyType {
    /// The descriptor this type was registered from.
    pub fn descriptor(&self) -> &NativeTypeDescriptor {
        &self.descriptor
    }

    /// Identity of the native type.
    pub fn type_hash(&self) -> TypeHash {
        self.descriptor.type_hash
    }

    /// Name, qualname and module.
    pub fn name(&self) -> &QualifiedName {
        &self.name
    }

    /// Module-qualified dotted name.
    pub fn full_name(&self) -> String {
        self.name.full_name()
    }

    /// Documentation string, if any.
    pub fn doc(&self) -> Option<&str> {
        self.descriptor.doc.as_deref()
    }

    /// The slot table.
    pub fn slots(&self) -> TypeSlots {
        self.slots
    }

    /// Look up an attribute (borrowed).
    pub fn attr(&self, name: &str) -> Option<ObjectHandle> {
        self.attrs.get(name).copied()
    }
}

impl Bridge {
    /// Register a native type and create its type object.
    ///
    /// Registering an identity twice is fatal; the first registration stays
    /// valid. When the descriptor names a scope, the type is published there
    /// under its simple name and the scope's attribute owns it. Otherwise the
    /// bridge holds it until shutdown.
    ///
    /// Returns the type object (borrowed).
    #[cfg_attr(feature = "profiling", profiling::function)]
    pub fn register_type(&mut self, descriptor: NativeTypeDescriptor) -> BridgeResult<ObjectHandle> {
        if self.types.contains(descriptor.type_hash) {
            return Err(self.fail(FatalError::DuplicateType(descriptor.name.clone())));
        }

        let (scope_qualname, module) = match descriptor.scope {
            Some(scope) => self.scope_names(scope)?,
            None => (None, None),
        };

        let descriptor = Arc::new(descriptor);
        let ty = ProxyType {
            name: QualifiedName::new(descriptor.name.clone(), scope_qualname.as_deref(), None),
            descriptor: Arc::clone(&descriptor),
            slots: TypeSlots::default(),
            attrs: FxHashMap::default(),
        };

        let handle = self.heap.allocate(ty);
        if let Err(err) = self.types.insert(Arc::clone(&descriptor), handle) {
            self.heap.free(handle);
            return Err(self.fail(err));
        }

        if let Some(ty) = self.heap.get_mut::<ProxyType>(handle) {
            ty.name.module = module;
        }

        match descriptor.scope {
            Some(scope) => {
                if let Err(err) = self.set_attr(scope, &descriptor.name, handle) {
                    self.roots.push(handle);
                    return Err(err);
                }
                self.heap.dec_ref(handle);
            }
            None => self.roots.push(handle),
        }

        log::debug!(
            "bound type '{}'",
            self.heap
                .get::<ProxyType>(handle)
                .map_or_else(|| descriptor.name.clone(), ProxyType::full_name)
        );
        Ok(handle)
    }

    /// Qualname contribution and module name of a registration scope.
    fn scope_names(&self, scope: ObjectHandle) -> BridgeResult<(Option<String>, Option<String>)> {
        if let Some(module) = self.heap.get::<Scope>(scope) {
            return Ok((None, Some(module.name().to_string())));
        }
        if let Some(outer) = self.heap.get::<ProxyType>(scope) {
            return Ok((Some(outer.name.qualname.clone()), outer.name.module.clone()));
        }
        if self.heap.contains(scope) {
            Err(BridgeError::NoAttributes)
        } else {
            Err(BridgeError::InvalidHandle)
        }
    }

    /// Finalize a type object whose last reference was released.
    pub(crate) fn type_free(&mut self, handle: ObjectHandle) -> BridgeResult<()> {
        let Some(ty) = self.heap.get_mut::<ProxyType>(handle) else {
            return Err(BridgeError::NotAType);
        };
        let type_hash = ty.descriptor.type_hash;
        let name = ty.name.full_name();
        let attrs: Vec<ObjectHandle> = ty.attrs.drain().map(|(_, attr)| attr).collect();

        let unregistered = match self.types.remove(type_hash, &name) {
            Ok(_) => Ok(()),
            Err(err) => Err(self.fail(err)),
        };
        self.heap.free(handle);
        log::debug!("freed type object of '{}'", name);

        let released = self.decref_all(attrs);
        unregistered.and(released)
    }

    /// Descriptor of a registered type.
    pub fn lookup_type(&self, type_hash: TypeHash) -> Option<&NativeTypeDescriptor> {
        self.types.descriptor(type_hash)
    }

    /// Type object of a registered type (borrowed).
    pub fn type_handle(&self, type_hash: TypeHash) -> Option<ObjectHandle> {
        self.types.type_object(type_hash)
    }

    /// Identity a type object was registered for.
    pub fn type_of(&self, type_object: ObjectHandle) -> Option<TypeHash> {
        self.types.type_of_object(type_object)
    }

    /// Borrow a type object.
    pub fn proxy_type(&self, type_object: ObjectHandle) -> Option<&ProxyType> {
        self.heap.get(type_object)
    }

    /// Replace the slot table of a type object.
    pub fn set_type_slots(&mut self, type_object: ObjectHandle, slots: TypeSlots) -> BridgeResult<()> {
        let ty = self
            .heap
            .get_mut::<ProxyType>(type_object)
            .ok_or(BridgeError::NotAType)?;
        ty.slots = slots;
        Ok(())
    }

    pub(crate) fn descriptor_of_type(
        &self,
        type_object: ObjectHandle,
    ) -> BridgeResult<Arc<NativeTypeDescriptor>> {
        self.heap
            .get::<ProxyType>(type_object)
            .map(|ty| Arc::clone(&ty.descriptor))
            .ok_or(BridgeError::NotAType)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BridgeConfig;

    fn bridge() -> Bridge {
        Bridge::with_config(BridgeConfig::new().with_abort_on_fatal(false))
    }

    fn descriptor(name: &str) -> NativeTypeDescriptor {
        NativeTypeDescriptor::new(TypeHash::from_name(name), name, 16, 8)
    }

    #[test]
    fn register_unscoped_type() {
        let mut bridge = bridge();
        let handle = bridge.register_type(descriptor("Vec3")).unwrap();

        let ty = bridge.proxy_type(handle).unwrap();
        assert_eq!(ty.full_name(), "Vec3");
        assert_eq!(ty.type_hash(), TypeHash::from_name("Vec3"));
        assert_eq!(bridge.type_handle(TypeHash::from_name("Vec3")), Some(handle));
        assert_eq!(bridge.type_of(handle), Some(TypeHash::from_name("Vec3")));
        assert_eq!(bridge.ref_count(handle), Some(1));
    }

    #[test]
    fn scoped_type_is_published() {
        let mut bridge = bridge();
        let module = bridge.new_module("geometry");
        let handle = bridge
            .register_type(descriptor("Vec3").with_scope(module).with_doc("A vector."))
            .unwrap();

        assert_eq!(bridge.get_attr(module, "Vec3"), Some(handle));
        assert_eq!(bridge.ref_count(handle), Some(1));
        let ty = bridge.proxy_type(handle).unwrap();
        assert_eq!(ty.full_name(), "geometry.Vec3");
        assert_eq!(ty.doc(), Some("A vector."));
    }

    #[test]
    fn nested_types_get_dotted_names() {
        let mut bridge = bridge();
        let module = bridge.new_module("scene");
        let outer = bridge
            .register_type(descriptor("Mesh").with_scope(module))
            .unwrap();
        let inner = bridge
            .register_type(descriptor("Iter").with_scope(outer))
            .unwrap();

        let name = bridge.proxy_type(inner).unwrap().name().clone();
        assert_eq!(name.qualname, "Mesh.Iter");
        assert_eq!(name.full_name(), "scene.Mesh.Iter");
        assert_eq!(bridge.proxy_type(outer).unwrap().attr("Iter"), Some(inner));
    }

    #[test]
    fn duplicate_registration_keeps_first() {
        let mut bridge = bridge();
        let first = bridge.register_type(descriptor("Vec3")).unwrap();
        let live = bridge.heap().live_count();

        let err = bridge.register_type(descriptor("Vec3")).unwrap_err();
        assert_eq!(err, BridgeError::Fatal(FatalError::DuplicateType("Vec3".into())));
        assert_eq!(bridge.type_handle(TypeHash::from_name("Vec3")), Some(first));
        assert_eq!(bridge.heap().live_count(), live);
        assert_eq!(bridge.type_count(), 1);
    }

    #[test]
    fn invalid_scope_has_no_side_effects() {
        let mut bridge = bridge();
        let plain = bridge.allocate_object(5u32);

        let err = bridge
            .register_type(descriptor("Vec3").with_scope(plain))
            .unwrap_err();
        assert_eq!(err, BridgeError::NoAttributes);
        assert_eq!(bridge.type_count(), 0);
    }

    #[test]
    fn freeing_type_object_unregisters() {
        let mut bridge = bridge();
        let module = bridge.new_module("m");
        let handle = bridge
            .register_type(descriptor("Vec3").with_scope(module))
            .unwrap();

        assert_eq!(bridge.del_attr(module, "Vec3"), Ok(true));
        assert!(!bridge.is_alive(handle));
        assert!(bridge.lookup_type(TypeHash::from_name("Vec3")).is_none());
    }

    #[test]
    fn missing_registry_entry_is_fatal() {
        let mut bridge = bridge();
        let module = bridge.new_module("m");
        bridge
            .register_type(descriptor("Vec3").with_scope(module))
            .unwrap();
        bridge
            .types
            .remove(TypeHash::from_name("Vec3"), "Vec3")
            .unwrap();

        let err = bridge.del_attr(module, "Vec3").unwrap_err();
        assert_eq!(err, BridgeError::Fatal(FatalError::UnknownType("m.Vec3".into())));
    }

    #[test]
    fn slots_can_be_replaced() {
        fn refuse(_: &mut Bridge, _: ObjectHandle) -> BridgeResult<()> {
            Err(BridgeError::NoConstructor("custom".into()))
        }

        let mut bridge = bridge();
        let handle = bridge.register_type(descriptor("Vec3")).unwrap();
        let slots = TypeSlots {
            init: refuse,
            ..TypeSlots::default()
        };
        bridge.set_type_slots(handle, slots).unwrap();
        assert_eq!(
            bridge.construct(handle),
            Err(BridgeError::NoConstructor("custom".into()))
        );
        assert_eq!(bridge.instance_count(), 0);

        let none = bridge.none();
        assert_eq!(bridge.set_type_slots(none, slots), Err(BridgeError::NotAType));
    }
}
