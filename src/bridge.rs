//! The bridge context.
//!
//! A [`Bridge`] owns the managed heap and the three process-wide tables
//! (types, instances, keep-alive edges). Every protocol of the crate is a
//! method on it, split across modules:
//!
//! - [`types`](crate::types) - type registration and type objects
//! - [`instance`](crate::instance) - allocation, release and construction of proxies
//! - [`bind`](crate::bind) - return-value binding, downcast and keep-alive
//!
//! This module holds the context itself, reference counting, attribute
//! access, the fatal-error choke point and shutdown.

use std::any::Any;

use proxybind_core::{
    BridgeError, BridgeResult, FatalError, NoneObject, ObjectHandle, ObjectHeap, Scope,
};
use proxybind_registry::{InstanceRegistry, KeepAliveGraph, TypeRegistry};

use crate::config::BridgeConfig;
use crate::instance::{ProxyInstance, instance_dealloc};
use crate::types::{DeallocSlot, ProxyType};

/// One bridge between native values and the managed runtime.
pub struct Bridge {
    pub(crate) config: BridgeConfig,
    pub(crate) heap: ObjectHeap,
    pub(crate) types: TypeRegistry,
    pub(crate) instances: InstanceRegistry,
    pub(crate) keep_alive: KeepAliveGraph,
    /// The runtime's `None`. Never freed.
    none: ObjectHandle,
    /// Objects the bridge itself holds a reference to (modules, unscoped
    /// types), released at shutdown in reverse order.
    pub(crate) roots: Vec<ObjectHandle>,
}

// SAFETY: the heap only holds bridge object kinds and values passed to
// `allocate_object`, which must be `Send`. Native addresses are only touched
// through descriptor hooks while the caller has `&mut Bridge`, so moving the
// whole context to the thread that holds the embedding's lock is sound as
// long as the native values themselves may be used from that thread.
unsafe impl Send for Bridge {}

/// What was still alive when a bridge shut down.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Proxy instances never released.
    pub leaked_instances: usize,
    /// Registered types whose type object was never freed.
    pub leaked_types: usize,
    /// Heap objects of any kind still alive, `None` excluded.
    pub live_objects: usize,
}

impl ShutdownReport {
    /// Whether nothing leaked.
    pub fn is_clean(&self) -> bool {
        self.leaked_instances == 0 && self.leaked_types == 0
    }
}

impl Bridge {
    /// Create a bridge with the default configuration.
    pub fn new() -> Self {
        Self::with_config(BridgeConfig::default())
    }

    /// Create a bridge with an explicit configuration.
    pub fn with_config(config: BridgeConfig) -> Self {
        let mut heap = ObjectHeap::new();
        let none = heap.allocate(NoneObject);
        Self {
            config,
            heap,
            types: TypeRegistry::new(),
            instances: InstanceRegistry::new(),
            keep_alive: KeepAliveGraph::new(),
            none,
            roots: Vec::new(),
        }
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// The configuration this bridge was created with.
    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// The managed heap.
    pub fn heap(&self) -> &ObjectHeap {
        &self.heap
    }

    /// The type registry.
    pub fn type_registry(&self) -> &TypeRegistry {
        &self.types
    }

    /// The instance registry.
    pub fn instance_registry(&self) -> &InstanceRegistry {
        &self.instances
    }

    /// The keep-alive graph.
    pub fn keep_alive_graph(&self) -> &KeepAliveGraph {
        &self.keep_alive
    }

    /// The runtime's `None` object (borrowed).
    pub fn none(&self) -> ObjectHandle {
        self.none
    }

    /// Whether `handle` is the `None` object.
    pub fn is_none(&self, handle: ObjectHandle) -> bool {
        handle == self.none
    }

    /// Number of live proxy instances.
    pub fn instance_count(&self) -> usize {
        self.instances.len()
    }

    /// Number of registered types.
    pub fn type_count(&self) -> usize {
        self.types.len()
    }

    /// Reference count of a live object.
    pub fn ref_count(&self, handle: ObjectHandle) -> Option<u32> {
        self.heap.ref_count(handle)
    }

    /// Whether `handle` refers to a live object.
    pub fn is_alive(&self, handle: ObjectHandle) -> bool {
        self.heap.contains(handle)
    }

    // =========================================================================
    // Managed objects
    // =========================================================================

    /// Allocate a plain managed object. The caller owns the new reference.
    pub fn allocate_object<T: Any + Send>(&mut self, value: T) -> ObjectHandle {
        self.heap.allocate(value)
    }

    /// Borrow a plain managed object.
    pub fn object<T: Any>(&self, handle: ObjectHandle) -> Option<&T> {
        self.heap.get(handle)
    }

    /// Create a module scope. The bridge holds it until shutdown.
    pub fn new_module(&mut self, name: impl Into<String>) -> ObjectHandle {
        let name = name.into();
        let module = self.heap.allocate(Scope::new(name.clone()));
        log::debug!("created module '{}' as {:?}", name, module);
        self.roots.push(module);
        module
    }

    /// Take a new reference to an object.
    pub fn incref(&mut self, handle: ObjectHandle) -> BridgeResult<()> {
        if self.heap.add_ref(handle) {
            Ok(())
        } else {
            Err(BridgeError::InvalidHandle)
        }
    }

    /// Release a reference to an object, finalizing it when it was the last.
    pub fn decref(&mut self, handle: ObjectHandle) -> BridgeResult<()> {
        match self.heap.dec_ref(handle) {
            None => Err(BridgeError::InvalidHandle),
            Some(0) => self.dealloc(handle),
            Some(_) => Ok(()),
        }
    }

    /// Finalize an object whose reference count reached zero.
    fn dealloc(&mut self, handle: ObjectHandle) -> BridgeResult<()> {
        if handle == self.none {
            self.heap.add_ref(handle);
            return Ok(());
        }

        if let Some(instance) = self.heap.get::<ProxyInstance>(handle) {
            let dealloc = self
                .heap
                .get::<ProxyType>(instance.type_object)
                .map_or(instance_dealloc as DeallocSlot, |ty| ty.slots().dealloc);
            return dealloc(self, handle);
        }

        if self.heap.is::<ProxyType>(handle) {
            return self.type_free(handle);
        }

        if let Some(scope) = self.heap.get_mut::<Scope>(handle) {
            let name = scope.name().to_string();
            let attrs = scope.drain();
            self.heap.free(handle);
            log::debug!("released module '{}'", name);
            return self.decref_all(attrs);
        }

        self.heap.free(handle);
        Ok(())
    }

    /// Release one reference on each handle, reporting the first failure.
    pub(crate) fn decref_all(&mut self, handles: Vec<ObjectHandle>) -> BridgeResult<()> {
        let mut result = Ok(());
        for handle in handles {
            if let Err(err) = self.decref(handle)
                && result.is_ok()
            {
                result = Err(err);
            }
        }
        result
    }

    // =========================================================================
    // Attributes
    // =========================================================================

    /// Store `value` under `name` on a module or type object.
    ///
    /// The attribute takes a new reference; a replaced value is released.
    pub fn set_attr(
        &mut self,
        target: ObjectHandle,
        name: &str,
        value: ObjectHandle,
    ) -> BridgeResult<()> {
        if !self.heap.contains(value) {
            return Err(BridgeError::InvalidHandle);
        }
        self.attr_target(target)?;
        self.heap.add_ref(value);

        let replaced = if let Some(scope) = self.heap.get_mut::<Scope>(target) {
            scope.set(name, value)
        } else if let Some(ty) = self.heap.get_mut::<ProxyType>(target) {
            ty.attrs.insert(name.to_string(), value)
        } else {
            None
        };

        match replaced {
            Some(old) => self.decref(old),
            None => Ok(()),
        }
    }

    /// Look up an attribute of a module or type object (borrowed).
    pub fn get_attr(&self, target: ObjectHandle, name: &str) -> Option<ObjectHandle> {
        if let Some(scope) = self.heap.get::<Scope>(target) {
            return scope.get(name);
        }
        self.heap
            .get::<ProxyType>(target)
            .and_then(|ty| ty.attrs.get(name).copied())
    }

    /// Remove an attribute, releasing the reference it held.
    ///
    /// Returns false if there was no such attribute.
    pub fn del_attr(&mut self, target: ObjectHandle, name: &str) -> BridgeResult<bool> {
        self.attr_target(target)?;
        let removed = if let Some(scope) = self.heap.get_mut::<Scope>(target) {
            scope.remove(name)
        } else if let Some(ty) = self.heap.get_mut::<ProxyType>(target) {
            ty.attrs.remove(name)
        } else {
            None
        };

        match removed {
            Some(old) => self.decref(old).map(|()| true),
            None => Ok(false),
        }
    }

    fn attr_target(&self, target: ObjectHandle) -> BridgeResult<()> {
        if self.heap.is::<Scope>(target) || self.heap.is::<ProxyType>(target) {
            Ok(())
        } else if self.heap.contains(target) {
            Err(BridgeError::NoAttributes)
        } else {
            Err(BridgeError::InvalidHandle)
        }
    }

    // =========================================================================
    // Fatal errors
    // =========================================================================

    /// Report a broken invariant.
    ///
    /// Panics unless the bridge was configured not to; otherwise the error is
    /// handed back for the caller to return once its tables are consistent.
    pub(crate) fn fail(&self, error: FatalError) -> BridgeError {
        log::error!("proxybind: {error}");
        if self.config.abort_on_fatal {
            panic!("proxybind: fatal error: {error}");
        }
        BridgeError::Fatal(error)
    }

    // =========================================================================
    // Shutdown
    // =========================================================================

    /// Tear the bridge down.
    ///
    /// Releases every module and unscoped type the bridge holds, then reports
    /// what is still alive. Leaked instances are not destroyed: their native
    /// values may already be gone.
    pub fn shutdown(mut self) -> ShutdownReport {
        let roots = std::mem::take(&mut self.roots);
        for root in roots.into_iter().rev() {
            if let Err(err) = self.decref(root) {
                log::warn!("error while releasing {:?} at shutdown: {err}", root);
            }
        }

        let report = ShutdownReport {
            leaked_instances: self.instances.len(),
            leaked_types: self.types.len(),
            live_objects: self.heap.live_count().saturating_sub(1),
        };

        if self.config.report_leaks {
            for (key, _) in self.instances.iter() {
                let name = self
                    .types
                    .descriptor(key.type_hash)
                    .map_or("<unregistered>", |d| d.name.as_str());
                log::warn!("leaked instance of '{}' at {:#x}", name, key.addr);
            }
            for entry in self.types.iter() {
                log::warn!("leaked type '{}'", entry.descriptor.name);
            }
        }

        log::debug!(
            "bridge shut down: {} leaked instances, {} leaked types",
            report.leaked_instances,
            report.leaked_types
        );
        report
    }
}

impl Default for Bridge {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Bridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bridge")
            .field("config", &self.config)
            .field("types", &self.types.len())
            .field("instances", &self.instances.len())
            .field("keep_alive_edges", &self.keep_alive.edge_count())
            .field("live_objects", &self.heap.live_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bridge() -> Bridge {
        Bridge::with_config(BridgeConfig::new().with_abort_on_fatal(false))
    }

    #[test]
    fn none_is_immortal() {
        let mut bridge = bridge();
        let none = bridge.none();
        bridge.decref(none).unwrap();
        bridge.decref(none).unwrap();
        assert!(bridge.is_alive(none));
        assert!(bridge.is_none(none));
    }

    #[test]
    fn plain_objects_free_on_last_release() {
        let mut bridge = bridge();
        let obj = bridge.allocate_object(42u32);
        bridge.incref(obj).unwrap();
        bridge.decref(obj).unwrap();
        assert_eq!(bridge.object::<u32>(obj), Some(&42));
        bridge.decref(obj).unwrap();
        assert!(!bridge.is_alive(obj));
        assert_eq!(bridge.decref(obj), Err(BridgeError::InvalidHandle));
    }

    #[test]
    fn module_attributes_hold_references() {
        let mut bridge = bridge();
        let module = bridge.new_module("geometry");
        let value = bridge.allocate_object("origin");

        bridge.set_attr(module, "origin", value).unwrap();
        assert_eq!(bridge.ref_count(value), Some(2));
        assert_eq!(bridge.get_attr(module, "origin"), Some(value));

        bridge.decref(value).unwrap();
        assert!(bridge.is_alive(value));

        assert_eq!(bridge.del_attr(module, "origin"), Ok(true));
        assert!(!bridge.is_alive(value));
        assert_eq!(bridge.del_attr(module, "origin"), Ok(false));
    }

    #[test]
    fn replacing_an_attribute_releases_the_old_value() {
        let mut bridge = bridge();
        let module = bridge.new_module("m");
        let first = bridge.allocate_object(1u8);
        let second = bridge.allocate_object(2u8);

        bridge.set_attr(module, "x", first).unwrap();
        bridge.decref(first).unwrap();
        bridge.set_attr(module, "x", second).unwrap();

        assert!(!bridge.is_alive(first));
        assert_eq!(bridge.get_attr(module, "x"), Some(second));
    }

    #[test]
    fn attributes_need_a_namespace() {
        let mut bridge = bridge();
        let plain = bridge.allocate_object(0i64);
        let value = bridge.allocate_object(1i64);
        assert_eq!(
            bridge.set_attr(plain, "x", value),
            Err(BridgeError::NoAttributes)
        );
        assert_eq!(bridge.get_attr(plain, "x"), None);
    }

    #[test]
    fn shutdown_releases_modules() {
        let mut bridge = bridge();
        let module = bridge.new_module("m");
        let value = bridge.allocate_object(7u16);
        bridge.set_attr(module, "seven", value).unwrap();
        bridge.decref(value).unwrap();

        let report = bridge.shutdown();
        assert!(report.is_clean());
        assert_eq!(report.live_objects, 0);
    }

    #[test]
    #[should_panic(expected = "fatal error")]
    fn fatal_errors_panic_by_default() {
        let bridge = Bridge::new();
        let _ = bridge.fail(FatalError::UnknownType("Ghost".into()));
    }

    #[test]
    fn fatal_errors_can_be_returned() {
        let bridge = bridge();
        let err = bridge.fail(FatalError::UnknownType("Ghost".into()));
        assert!(err.is_fatal());
    }
}
