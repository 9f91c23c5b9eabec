//! Return-value binding, downcast and keep-alive.
//!
//! [`Bridge::bind`] turns a native value returned to the managed runtime into
//! a proxy. The outcome depends on what is already known about the value:
//!
//! ```text
//! null address                 -> None object
//! live proxy for (addr, type)  -> that proxy, new reference
//! RvPolicy::None               -> not found
//! unregistered type            -> not found
//! otherwise                    -> new proxy, storage and flags per policy
//! ```
//!
//! | Policy | Storage | Flags |
//! |--------|---------|-------|
//! | `Reference` | external | none |
//! | `ReferenceInternal` | external | none, plus keep-alive on the owner |
//! | `Copy` | inline | `DESTRUCT \| FREE` |
//! | `Move` | inline | `DESTRUCT \| FREE` |
//! | `TakeOwnership` | external | `DESTRUCT \| FREE` |

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::ptr::{self, NonNull};

use proxybind_core::{
    BridgeError, BridgeResult, FatalError, NativeError, ObjectHandle, RvPolicy, TypeHash,
};
use proxybind_registry::InstanceKey;

use crate::bridge::Bridge;
use crate::instance::{InstanceFlags, ProxyInstance};
use crate::types::ProxyType;

impl Bridge {
    /// Find or create the proxy for a native value.
    ///
    /// Returns a new reference, or `Ok(None)` when the value cannot be
    /// represented (policy `None`, unregistered type, failed copy or move).
    /// Copying a non-copyable or moving a non-movable type is fatal, and is
    /// detected before anything is allocated.
    ///
    /// `owner` is only used by [`RvPolicy::ReferenceInternal`].
    #[cfg_attr(feature = "profiling", profiling::function)]
    pub fn bind(
        &mut self,
        type_hash: TypeHash,
        value: *mut u8,
        policy: RvPolicy,
        owner: Option<ObjectHandle>,
    ) -> BridgeResult<Option<ObjectHandle>> {
        let Some(src) = NonNull::new(value) else {
            let none = self.none();
            self.heap.add_ref(none);
            return Ok(Some(none));
        };

        if let Some(existing) = self.instances.get(InstanceKey::new(value as usize, type_hash)) {
            self.heap.add_ref(existing);
            log::trace!("reusing {:?} for {:p}", existing, value);
            return Ok(Some(existing));
        }

        if policy == RvPolicy::None {
            return Ok(None);
        }

        let Some(entry) = self.types.get(type_hash) else {
            return Ok(None);
        };
        let descriptor = entry.descriptor.clone();
        let type_object = entry.type_object;

        match policy {
            RvPolicy::Copy if !descriptor.is_copy_constructible() => {
                return Err(self.fail(FatalError::NonCopyable(descriptor.name.clone())));
            }
            RvPolicy::Move if !descriptor.is_move_constructible() => {
                return Err(self.fail(FatalError::NonMovable(descriptor.name.clone())));
            }
            _ => {}
        }

        let external = (!policy.stores_in_object()).then_some(src);
        let instance = self.alloc_instance(type_object, external)?;

        if policy == RvPolicy::ReferenceInternal
            && let Err(err) = self.keep_alive(instance, owner)
        {
            self.release_partial(instance);
            return Err(err);
        }

        if policy.stores_in_object() {
            let dst = self
                .heap
                .get::<ProxyInstance>(instance)
                .map(ProxyInstance::value)
                .ok_or(BridgeError::InvalidHandle)?;

            // Hooks may be raw functions that unwind; a panic counts as a
            // failed transfer.
            let transferred = catch_unwind(AssertUnwindSafe(|| {
                // SAFETY: `src` points to an initialized value of the described
                // type and `dst` to fresh inline storage laid out for it.
                unsafe {
                    match (policy, descriptor.copy, descriptor.move_) {
                        (RvPolicy::Copy, Some(copy), _) => copy(dst, src.as_ptr()),
                        (RvPolicy::Move, _, Some(move_)) => move_(dst, src.as_ptr()),
                        _ => {
                            ptr::copy_nonoverlapping(src.as_ptr(), dst, descriptor.size);
                            Ok(())
                        }
                    }
                }
            }))
            .unwrap_or_else(|payload| Err(NativeError::from_panic(payload)));

            if let Err(err) = transferred {
                log::warn!(
                    "{:?} of '{}' at {:p} failed: {err}",
                    policy,
                    descriptor.name,
                    value
                );
                self.release_partial(instance);
                return Ok(None);
            }
        }

        if policy.owns_value()
            && let Some(inst) = self.heap.get_mut::<ProxyInstance>(instance)
        {
            inst.flags |= InstanceFlags::DESTRUCT | InstanceFlags::FREE;
        }

        log::trace!("bound {:p} as {:?} ({:?})", value, instance, policy);
        Ok(Some(instance))
    }

    /// Drop a proxy that never got ownership of its value.
    fn release_partial(&mut self, instance: ObjectHandle) {
        if let Err(err) = self.decref(instance) {
            log::warn!("error while releasing a partial proxy: {err}");
        }
    }

    /// The native address behind `object`, if it is a live proxy of the
    /// type `type_hash`.
    ///
    /// Everything else is "no match", never an error.
    #[cfg_attr(feature = "profiling", profiling::function)]
    pub fn try_extract(&self, type_hash: TypeHash, object: Option<ObjectHandle>) -> Option<*mut u8> {
        let instance = self.heap.get::<ProxyInstance>(object?)?;
        let ty = self.heap.get::<ProxyType>(instance.type_object)?;
        (ty.type_hash() == type_hash).then_some(instance.value)
    }

    /// Keep `patient` alive at least as long as `nurse`.
    ///
    /// The nurse must be a live proxy instance. The first link of a pair takes
    /// a reference on the patient, released when the nurse is released;
    /// linking the same pair again does nothing. An absent patient is a no-op.
    pub fn keep_alive(
        &mut self,
        nurse: ObjectHandle,
        patient: Option<ObjectHandle>,
    ) -> BridgeResult<()> {
        let Some(patient) = patient else {
            return Ok(());
        };
        if !self.heap.is::<ProxyInstance>(nurse) {
            return Err(BridgeError::InvalidNurse);
        }
        if !self.heap.contains(patient) {
            return Err(BridgeError::InvalidHandle);
        }

        if self.keep_alive.link(nurse, patient) {
            self.heap.add_ref(patient);
            if let Some(inst) = self.heap.get_mut::<ProxyInstance>(nurse) {
                inst.flags |= InstanceFlags::CLEAR_KEEP_ALIVE;
            }
        }
        Ok(())
    }

    /// Objects kept alive by `nurse`.
    pub fn keep_alive_patients(&self, nurse: ObjectHandle) -> Vec<ObjectHandle> {
        self.keep_alive.patients_of(nurse)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BridgeConfig;
    use proxybind_core::DescriptorBuilder;

    #[derive(Debug, Clone, Copy, PartialEq)]
    struct Point {
        x: i32,
        y: i32,
    }

    fn setup() -> (Bridge, TypeHash) {
        let mut bridge = Bridge::with_config(BridgeConfig::new().with_abort_on_fatal(false));
        let desc = DescriptorBuilder::<Point>::new("Point").bitwise_copy().build();
        let hash = desc.type_hash;
        bridge.register_type(desc).unwrap();
        (bridge, hash)
    }

    fn addr(point: &mut Point) -> *mut u8 {
        (point as *mut Point).cast()
    }

    #[test]
    fn null_binds_to_none() {
        let (mut bridge, hash) = setup();
        let none = bridge.none();
        let before = bridge.ref_count(none).unwrap();
        let bound = bridge
            .bind(hash, ptr::null_mut(), RvPolicy::Copy, None)
            .unwrap();
        assert_eq!(bound, Some(none));
        assert_eq!(bridge.ref_count(none), Some(before + 1));
    }

    #[test]
    fn policy_none_is_not_found() {
        let (mut bridge, hash) = setup();
        let mut point = Point { x: 1, y: 2 };
        assert_eq!(bridge.bind(hash, addr(&mut point), RvPolicy::None, None), Ok(None));
        assert_eq!(bridge.instance_count(), 0);
    }

    #[test]
    fn unregistered_type_is_not_found() {
        let (mut bridge, _) = setup();
        let mut point = Point { x: 1, y: 2 };
        let other = TypeHash::from_name("Other");
        assert_eq!(
            bridge.bind(other, addr(&mut point), RvPolicy::Reference, None),
            Ok(None)
        );
    }

    #[test]
    fn copy_is_independent_of_source() {
        let (mut bridge, hash) = setup();
        let mut point = Point { x: 3, y: 4 };
        let proxy = bridge
            .bind(hash, addr(&mut point), RvPolicy::Copy, None)
            .unwrap()
            .unwrap();

        let stored = bridge.try_extract(hash, Some(proxy)).unwrap();
        assert_ne!(stored, addr(&mut point));
        point.x = 100;
        // SAFETY: the proxy owns an initialized copy.
        assert_eq!(unsafe { *stored.cast::<Point>() }, Point { x: 3, y: 4 });
    }

    #[test]
    fn try_extract_rejects_foreign_objects() {
        let (mut bridge, hash) = setup();
        let plain = bridge.allocate_object(1u8);
        let none = bridge.none();
        assert_eq!(bridge.try_extract(hash, None), None);
        assert_eq!(bridge.try_extract(hash, Some(none)), None);
        assert_eq!(bridge.try_extract(hash, Some(plain)), None);
        assert_eq!(bridge.try_extract(hash, Some(ObjectHandle::new(999, 0))), None);
    }

    #[test]
    fn keep_alive_rejects_non_instances() {
        let (mut bridge, _) = setup();
        let plain = bridge.allocate_object(1u8);
        let other = bridge.allocate_object(2u8);
        assert_eq!(
            bridge.keep_alive(plain, Some(other)),
            Err(BridgeError::InvalidNurse)
        );
        assert_eq!(bridge.keep_alive(plain, None), Ok(()));
    }
}
