//! Generational arena for reference-counted managed objects.

use std::any::Any;
use std::fmt;

/// Handle to a managed object.
///
/// Copyable and safe to hold after the object is gone: the generation makes
/// stale handles fail every lookup instead of aliasing a reused slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ObjectHandle {
    /// Index into ObjectHeap.slots
    pub index: u32,
    /// Generation for use-after-free detection
    pub generation: u32,
}

impl ObjectHandle {
    /// Create a new object handle.
    pub fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    /// Pack the handle into a single integer, the handle's "address".
    #[inline]
    pub const fn to_bits(self) -> u64 {
        ((self.generation as u64) << 32) | self.index as u64
    }

    /// Unpack a handle produced by [`ObjectHandle::to_bits`].
    #[inline]
    pub const fn from_bits(bits: u64) -> Self {
        Self {
            index: bits as u32,
            generation: (bits >> 32) as u32,
        }
    }
}

/// Heap storage for managed objects.
///
/// Unlike a plain arena, reaching a reference count of zero does not drop the
/// object: [`ObjectHeap::dec_ref`] only reports the new count, and the owner
/// of the heap runs the object's finalization before calling
/// [`ObjectHeap::free`]. Finalizers can therefore still read the object.
pub struct ObjectHeap {
    slots: Vec<HeapSlot>,
    free_list: Vec<u32>,
    live: usize,
}

struct HeapSlot {
    generation: u32,
    value: Option<Box<dyn Any>>,
    ref_count: u32,
}

impl ObjectHeap {
    /// Create a new empty object heap.
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free_list: Vec::new(),
            live: 0,
        }
    }

    /// Allocate a new object with a reference count of one.
    pub fn allocate<T: Any>(&mut self, value: T) -> ObjectHandle {
        let boxed: Box<dyn Any> = Box::new(value);
        self.live += 1;

        if let Some(index) = self.free_list.pop() {
            let slot = &mut self.slots[index as usize];
            slot.value = Some(boxed);
            slot.ref_count = 1;
            ObjectHandle::new(index, slot.generation)
        } else {
            let index = self.slots.len() as u32;
            self.slots.push(HeapSlot {
                generation: 0,
                value: Some(boxed),
                ref_count: 1,
            });
            ObjectHandle::new(index, 0)
        }
    }

    fn slot(&self, handle: ObjectHandle) -> Option<&HeapSlot> {
        self.slots
            .get(handle.index as usize)
            .filter(|slot| slot.generation == handle.generation && slot.value.is_some())
    }

    fn slot_mut(&mut self, handle: ObjectHandle) -> Option<&mut HeapSlot> {
        self.slots
            .get_mut(handle.index as usize)
            .filter(|slot| slot.generation == handle.generation && slot.value.is_some())
    }

    /// Whether the handle refers to a live object.
    pub fn contains(&self, handle: ObjectHandle) -> bool {
        self.slot(handle).is_some()
    }

    /// Whether the handle refers to a live object of type `T`.
    pub fn is<T: Any>(&self, handle: ObjectHandle) -> bool {
        self.get::<T>(handle).is_some()
    }

    /// Get immutable reference to an object.
    ///
    /// Returns None if the handle is stale or the type doesn't match.
    pub fn get<T: Any>(&self, handle: ObjectHandle) -> Option<&T> {
        self.slot(handle)?.value.as_ref()?.downcast_ref::<T>()
    }

    /// Get mutable reference to an object.
    ///
    /// Returns None if the handle is stale or the type doesn't match.
    pub fn get_mut<T: Any>(&mut self, handle: ObjectHandle) -> Option<&mut T> {
        self.slot_mut(handle)?.value.as_mut()?.downcast_mut::<T>()
    }

    /// Increment reference count.
    pub fn add_ref(&mut self, handle: ObjectHandle) -> bool {
        match self.slot_mut(handle) {
            Some(slot) => {
                slot.ref_count = slot.ref_count.saturating_add(1);
                true
            }
            None => false,
        }
    }

    /// Decrement reference count and return the remaining count.
    ///
    /// Returns None for stale handles. A result of `Some(0)` means the caller
    /// must finalize the object and then [`free`](Self::free) it.
    pub fn dec_ref(&mut self, handle: ObjectHandle) -> Option<u32> {
        let slot = self.slot_mut(handle)?;
        slot.ref_count = slot.ref_count.saturating_sub(1);
        Some(slot.ref_count)
    }

    /// Free an object immediately, handing back its value.
    pub fn free(&mut self, handle: ObjectHandle) -> Option<Box<dyn Any>> {
        let slot = self.slot_mut(handle)?;
        let value = slot.value.take();
        slot.ref_count = 0;
        slot.generation = slot.generation.wrapping_add(1);
        self.free_list.push(handle.index);
        self.live -= 1;
        value
    }

    /// Get the reference count for an object.
    pub fn ref_count(&self, handle: ObjectHandle) -> Option<u32> {
        self.slot(handle).map(|slot| slot.ref_count)
    }

    /// Number of live objects.
    pub fn live_count(&self) -> usize {
        self.live
    }

    /// Handles of all live objects of type `T`.
    pub fn handles_of<T: Any>(&self) -> Vec<ObjectHandle> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.value.as_ref().is_some_and(|v| v.is::<T>()))
            .map(|(index, slot)| ObjectHandle::new(index as u32, slot.generation))
            .collect()
    }
}

impl Default for ObjectHeap {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ObjectHeap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectHeap")
            .field("slot_count", &self.slots.len())
            .field("free_count", &self.free_list.len())
            .field("live", &self.live)
            .finish()
    }
}
