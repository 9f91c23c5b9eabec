//! Proxy instances: allocation, release and zero-argument construction.
//!
//! A [`ProxyInstance`] is the managed object standing in for one native
//! value. The value either lives in a block owned by the proxy (inline
//! storage) or somewhere else (external storage). Two flags decide what
//! happens to it when the proxy goes away:
//!
//! | Flag | Meaning |
//! |------|---------|
//! | `DESTRUCT` | run the native destructor |
//! | `FREE` | release the storage (inline block or external allocation) |
//!
//! Release order: destruct, free, keep-alive clear, registry removal, heap
//! slot. The last step drops the instance's hold on its type object.

use std::alloc::{self, Layout};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::ptr::NonNull;

use bitflags::bitflags;

use proxybind_core::{BridgeError, BridgeResult, FatalError, NativeError, ObjectHandle};
use proxybind_registry::InstanceKey;

use crate::bridge::Bridge;
use crate::types::ProxyType;

bitflags! {
    /// Ownership state of a proxy instance.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct InstanceFlags: u8 {
        /// Run the native destructor on release.
        const DESTRUCT = 1 << 0;
        /// Release the value's storage on release.
        const FREE = 1 << 1;
        /// The instance is a keep-alive nurse.
        const CLEAR_KEEP_ALIVE = 1 << 2;
    }
}

// =============================================================================
// Storage
// =============================================================================

/// Heap block holding one value next to its proxy, aligned up from a
/// word-aligned allocation.
#[derive(Debug)]
pub(crate) struct InlineBlock {
    base: NonNull<u8>,
    layout: Layout,
    value: NonNull<u8>,
}

impl InlineBlock {
    const BASE_ALIGN: usize = std::mem::align_of::<usize>();

    /// Allocate zeroed room for a value of `size` bytes aligned to `align`.
    ///
    /// Returns None if the sizes overflow.
    pub(crate) fn new(size: usize, align: usize) -> Option<Self> {
        let align = align.max(1);
        if !align.is_power_of_two() {
            return None;
        }
        let padded = size.checked_add(align.saturating_sub(Self::BASE_ALIGN))?;
        let layout = Layout::from_size_align(padded.max(1), Self::BASE_ALIGN).ok()?;

        // SAFETY: the layout has a non-zero size.
        let raw = unsafe { alloc::alloc_zeroed(layout) };
        let Some(base) = NonNull::new(raw) else {
            alloc::handle_alloc_error(layout);
        };

        let addr = base.as_ptr() as usize;
        let offset = addr.next_multiple_of(align) - addr;
        // SAFETY: `base` is word aligned, so `offset <= align - BASE_ALIGN`
        // when `align > BASE_ALIGN` and zero otherwise; it stays in bounds.
        let value = unsafe { base.add(offset) };

        Some(Self {
            base,
            layout,
            value,
        })
    }

    pub(crate) fn value(&self) -> *mut u8 {
        self.value.as_ptr()
    }
}

impl Drop for InlineBlock {
    fn drop(&mut self) {
        // SAFETY: allocated in `new` with this layout.
        unsafe { alloc::dealloc(self.base.as_ptr(), self.layout) }
    }
}

/// Where the native value of an instance lives.
#[derive(Debug)]
pub(crate) enum Storage {
    /// In a block owned by the proxy.
    Inline(InlineBlock),
    /// Elsewhere; deallocated with the descriptor's layout when `FREE` is set.
    External,
    /// Storage already released.
    Released,
}

// =============================================================================
// ProxyInstance
// =============================================================================

/// The managed object representing one native value.
#[derive(Debug)]
pub struct ProxyInstance {
    pub(crate) type_object: ObjectHandle,
    pub(crate) value: *mut u8,
    pub(crate) flags: InstanceFlags,
    pub(crate) storage: Storage,
}

impl ProxyInstance {
    /// Address of the native value.
    pub fn value(&self) -> *mut u8 {
        self.value
    }

    /// The instance's type object.
    pub fn type_object(&self) -> ObjectHandle {
        self.type_object
    }

    /// Ownership flags.
    pub fn flags(&self) -> InstanceFlags {
        self.flags
    }

    /// Whether the value is co-located with the proxy.
    pub fn is_inline(&self) -> bool {
        matches!(&self.storage, Storage::Inline(block) if block.value() == self.value)
    }
}

// =============================================================================
// Default slots
// =============================================================================

/// Default `new` slot: an instance with inline storage and no flags.
pub(crate) fn instance_new(bridge: &mut Bridge, type_object: ObjectHandle) -> BridgeResult<ObjectHandle> {
    bridge.alloc_instance(type_object, None)
}

/// Default `init` slot: run the descriptor's default-init hook.
pub(crate) fn instance_init(bridge: &mut Bridge, instance: ObjectHandle) -> BridgeResult<()> {
    let (type_object, value) = bridge
        .heap
        .get::<ProxyInstance>(instance)
        .map(|inst| (inst.type_object, inst.value))
        .ok_or(BridgeError::InvalidHandle)?;
    let descriptor = bridge.descriptor_of_type(type_object)?;

    let Some(init) = descriptor.init else {
        let name = bridge
            .proxy_type(type_object)
            .map_or_else(|| descriptor.name.clone(), ProxyType::full_name);
        return Err(BridgeError::NoConstructor(name));
    };

    catch_unwind(AssertUnwindSafe(|| {
        // SAFETY: `value` is freshly allocated storage laid out for the type.
        unsafe { init(value) }
    }))
    .unwrap_or_else(|payload| Err(NativeError::from_panic(payload)))
    .map_err(|source| BridgeError::Native {
        type_name: descriptor.name.clone(),
        source,
    })?;

    if let Some(inst) = bridge.heap.get_mut::<ProxyInstance>(instance) {
        inst.flags |= InstanceFlags::DESTRUCT | InstanceFlags::FREE;
    }
    Ok(())
}

/// Default `dealloc` slot.
pub(crate) fn instance_dealloc(bridge: &mut Bridge, instance: ObjectHandle) -> BridgeResult<()> {
    bridge.release_instance(instance)
}

// =============================================================================
// Bridge protocols
// =============================================================================

impl Bridge {
    /// Create a proxy for a value of `type_object`.
    ///
    /// With `external` the proxy points at that address; otherwise it gets
    /// zeroed inline storage. Flags start empty. The caller owns the returned
    /// reference.
    pub fn alloc_instance(
        &mut self,
        type_object: ObjectHandle,
        external: Option<NonNull<u8>>,
    ) -> BridgeResult<ObjectHandle> {
        let descriptor = self.descriptor_of_type(type_object)?;

        let (value, storage) = match external {
            Some(ptr) => (ptr.as_ptr(), Storage::External),
            None => {
                let block = InlineBlock::new(descriptor.size, descriptor.align)
                    .ok_or_else(|| BridgeError::InvalidLayout(descriptor.name.clone()))?;
                (block.value(), Storage::Inline(block))
            }
        };

        let handle = self.heap.allocate(ProxyInstance {
            type_object,
            value,
            flags: InstanceFlags::empty(),
            storage,
        });

        let key = InstanceKey::new(value as usize, descriptor.type_hash);
        if self.instances.try_insert(key, handle).is_err() {
            // The registry entry belongs to the live proxy; only drop ours.
            self.heap.free(handle);
            return Err(self.fail(FatalError::DuplicateInstance {
                type_name: descriptor.name.clone(),
                addr: value as usize,
            }));
        }

        self.heap.add_ref(type_object);
        log::trace!("new instance of '{}' at {:p} as {:?}", descriptor.name, value, handle);
        Ok(handle)
    }

    /// Finalize a proxy instance whose last reference was released.
    ///
    /// Every step runs even when an earlier one reports a fatal error, so the
    /// tables stay consistent; the first error is returned.
    #[cfg_attr(feature = "profiling", profiling::function)]
    pub(crate) fn release_instance(&mut self, handle: ObjectHandle) -> BridgeResult<()> {
        let (type_object, value, flags) = self
            .heap
            .get::<ProxyInstance>(handle)
            .map(|inst| (inst.type_object, inst.value, inst.flags))
            .ok_or(BridgeError::InvalidHandle)?;
        let descriptor = self.descriptor_of_type(type_object)?;
        let mut first_error: Option<BridgeError> = None;

        if flags.contains(InstanceFlags::DESTRUCT) {
            if !descriptor.is_destructible() {
                let err = self.fail(FatalError::NonDestructible(descriptor.name.clone()));
                first_error.get_or_insert(err);
            } else if let Some(destruct) = descriptor.destruct {
                // SAFETY: DESTRUCT is only set on initialized values.
                unsafe { destruct(value) };
            }
        }

        if flags.contains(InstanceFlags::FREE) {
            let storage = self
                .heap
                .get_mut::<ProxyInstance>(handle)
                .map(|inst| std::mem::replace(&mut inst.storage, Storage::Released));
            if let Some(Storage::External) = storage
                && let Some(layout) = descriptor.layout()
                && layout.size() != 0
            {
                // SAFETY: FREE on external storage means the value was handed
                // over by its allocator with the descriptor's layout.
                unsafe { alloc::dealloc(value, layout) };
            }
        }

        if flags.contains(InstanceFlags::CLEAR_KEEP_ALIVE) {
            match self.keep_alive.clear(handle) {
                Some(patients) => {
                    let live: Vec<ObjectHandle> = patients
                        .into_iter()
                        .filter(|&patient| self.heap.contains(patient))
                        .collect();
                    if let Err(err) = self.decref_all(live) {
                        first_error.get_or_insert(err);
                    }
                }
                None => {
                    let err = self.fail(FatalError::KeepAliveCorrupted(descriptor.name.clone()));
                    first_error.get_or_insert(err);
                }
            }
        }

        let key = InstanceKey::new(value as usize, descriptor.type_hash);
        if self.instances.get(key) == Some(handle) {
            self.instances.remove(key);
        } else {
            let err = self.fail(FatalError::UnknownInstance(descriptor.name.clone()));
            first_error.get_or_insert(err);
        }

        self.heap.free(handle);
        log::trace!("released instance of '{}' at {:p}", descriptor.name, value);

        if let Err(err) = self.decref(type_object) {
            first_error.get_or_insert(err);
        }

        first_error.map_or(Ok(()), Err)
    }

    /// Build a new instance with no arguments, via the type's `new` and
    /// `init` slots.
    ///
    /// Without a default-init hook this fails with
    /// [`BridgeError::NoConstructor`] and the allocated instance is released.
    pub fn construct(&mut self, type_object: ObjectHandle) -> BridgeResult<ObjectHandle> {
        let slots = self
            .proxy_type(type_object)
            .map(ProxyType::slots)
            .ok_or(BridgeError::NotAType)?;

        let instance = (slots.new)(self, type_object)?;
        if let Err(err) = (slots.init)(self, instance) {
            if let Err(release) = self.decref(instance) {
                log::warn!("error while releasing a failed construction: {release}");
            }
            return Err(err);
        }
        Ok(instance)
    }

    /// Borrow a proxy instance.
    pub fn instance(&self, handle: ObjectHandle) -> Option<&ProxyInstance> {
        self.heap.get(handle)
    }
}
