//! Native type descriptors.
//!
//! A [`NativeTypeDescriptor`] is everything the bridge knows about a native
//! type: its identity, its layout, what it can do (capability flags) and the
//! optional hooks that do it. It is plain data; the bridge copies it into the
//! type object at registration.
//!
//! Descriptors for Rust types are easiest to build with
//! [`DescriptorBuilder`], which fills in layout and drop glue and installs
//! panic-safe shims for `Clone` and `Default`:
//!
//! ```
//! use proxybind_core::{DescriptorBuilder, TypeFlags};
//!
//! #[derive(Clone, Default)]
//! struct Vec3 { x: f32, y: f32, z: f32 }
//!
//! let desc = DescriptorBuilder::<Vec3>::new("Vec3")
//!     .clone_hook()
//!     .default_init()
//!     .doc("A three component vector")
//!     .build();
//!
//! assert_eq!(desc.size, 12);
//! assert!(desc.flags.contains(TypeFlags::IS_COPY_CONSTRUCTIBLE | TypeFlags::HAS_INIT));
//! ```

use std::alloc::Layout;
use std::fmt;
use std::marker::PhantomData;
use std::panic::{AssertUnwindSafe, catch_unwind};

use bitflags::bitflags;

use crate::{NativeError, ObjectHandle, TypeHash};

bitflags! {
    /// Capabilities of a native type.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct TypeFlags: u16 {
        /// The type may be destroyed by the bridge.
        const IS_DESTRUCTIBLE = 1 << 0;
        /// Values can be copy-constructed.
        const IS_COPY_CONSTRUCTIBLE = 1 << 1;
        /// Values can be move-constructed.
        const IS_MOVE_CONSTRUCTIBLE = 1 << 2;
        /// A custom destruct hook is installed.
        const HAS_DESTRUCT = 1 << 3;
        /// A custom copy hook is installed.
        const HAS_COPY = 1 << 4;
        /// A custom move hook is installed.
        const HAS_MOVE = 1 << 5;
        /// A default-init hook is installed.
        const HAS_INIT = 1 << 6;
    }
}

/// Copy-construct the value at `src` into uninitialized storage at `dst`.
pub type CopyHook = unsafe fn(dst: *mut u8, src: *const u8) -> Result<(), NativeError>;

/// Move-construct the value at `src` into uninitialized storage at `dst`.
pub type MoveHook = unsafe fn(dst: *mut u8, src: *mut u8) -> Result<(), NativeError>;

/// Destroy the value at `value` in place.
pub type DestructHook = unsafe fn(value: *mut u8);

/// Default-construct a value into uninitialized storage at `dst`.
pub type InitHook = unsafe fn(dst: *mut u8) -> Result<(), NativeError>;

/// Description of a native type exposed through the bridge.
#[derive(Clone)]
pub struct NativeTypeDescriptor {
    /// Identity of the type.
    pub type_hash: TypeHash,
    /// Name the type is published under.
    pub name: String,
    /// Size of a value in bytes.
    pub size: usize,
    /// Required alignment of a value (a power of two).
    pub align: usize,
    /// Capability flags.
    pub flags: TypeFlags,
    /// Custom copy constructor; bitwise copy when absent.
    pub copy: Option<CopyHook>,
    /// Custom move constructor; bitwise copy when absent.
    pub move_: Option<MoveHook>,
    /// Custom destructor; nothing runs when absent.
    pub destruct: Option<DestructHook>,
    /// Default constructor used for zero-argument construction.
    pub init: Option<InitHook>,
    /// Enclosing scope (module or type object) to publish the type into.
    pub scope: Option<ObjectHandle>,
    /// Documentation string.
    pub doc: Option<String>,
}

impl NativeTypeDescriptor {
    /// Describe a plain-data type: destructible, copyable and movable
    /// bitwise, with no hooks.
    pub fn new(type_hash: TypeHash, name: impl Into<String>, size: usize, align: usize) -> Self {
        debug_assert!(align.is_power_of_two(), "alignment must be a power of two");
        Self {
            type_hash,
            name: name.into(),
            size,
            align,
            flags: TypeFlags::IS_DESTRUCTIBLE
                | TypeFlags::IS_COPY_CONSTRUCTIBLE
                | TypeFlags::IS_MOVE_CONSTRUCTIBLE,
            copy: None,
            move_: None,
            destruct: None,
            init: None,
            scope: None,
            doc: None,
        }
    }

    // === Builder Methods ===

    /// Install a copy hook.
    pub fn with_copy(mut self, hook: CopyHook) -> Self {
        self.copy = Some(hook);
        self.flags |= TypeFlags::HAS_COPY | TypeFlags::IS_COPY_CONSTRUCTIBLE;
        self
    }

    /// Install a move hook.
    pub fn with_move(mut self, hook: MoveHook) -> Self {
        self.move_ = Some(hook);
        self.flags |= TypeFlags::HAS_MOVE | TypeFlags::IS_MOVE_CONSTRUCTIBLE;
        self
    }

    /// Install a destruct hook.
    pub fn with_destruct(mut self, hook: DestructHook) -> Self {
        self.destruct = Some(hook);
        self.flags |= TypeFlags::HAS_DESTRUCT;
        self
    }

    /// Install a default-init hook.
    pub fn with_init(mut self, hook: InitHook) -> Self {
        self.init = Some(hook);
        self.flags |= TypeFlags::HAS_INIT;
        self
    }

    /// Publish the type into `scope`.
    pub fn with_scope(mut self, scope: ObjectHandle) -> Self {
        self.scope = Some(scope);
        self
    }

    /// Attach a documentation string.
    pub fn with_doc(mut self, doc: impl Into<String>) -> Self {
        self.doc = Some(doc.into());
        self
    }

    /// Remove capability flags.
    pub fn without(mut self, flags: TypeFlags) -> Self {
        self.flags.remove(flags);
        self
    }

    // === Queries ===

    /// Whether the bridge may destroy values of this type.
    pub fn is_destructible(&self) -> bool {
        self.flags.contains(TypeFlags::IS_DESTRUCTIBLE)
    }

    /// Whether values can be copy-constructed.
    pub fn is_copy_constructible(&self) -> bool {
        self.flags.contains(TypeFlags::IS_COPY_CONSTRUCTIBLE)
    }

    /// Whether values can be move-constructed.
    pub fn is_move_constructible(&self) -> bool {
        self.flags.contains(TypeFlags::IS_MOVE_CONSTRUCTIBLE)
    }

    /// Layout of one value, as used to deallocate externally owned storage.
    pub fn layout(&self) -> Option<Layout> {
        Layout::from_size_align(self.size, self.align).ok()
    }
}

impl fmt::Debug for NativeTypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeTypeDescriptor")
            .field("type_hash", &self.type_hash)
            .field("name", &self.name)
            .field("size", &self.size)
            .field("align", &self.align)
            .field("flags", &self.flags)
            .field("scope", &self.scope)
            .field("doc", &self.doc)
            .finish()
    }
}

// =============================================================================
// Typed builder
// =============================================================================

/// Builds a [`NativeTypeDescriptor`] for the Rust type `T`.
///
/// The starting point is destructible (with drop glue when `T` needs it) and
/// not copyable. Types without drop glue are movable bitwise. Types with drop
/// glue are not movable until [`take_on_move`](Self::take_on_move) installs a
/// hook that leaves a valid default value behind, since the caller still
/// drops the source after a move.
pub struct DescriptorBuilder<T> {
    desc: NativeTypeDescriptor,
    _marker: PhantomData<fn() -> T>,
}

impl<T: 'static> DescriptorBuilder<T> {
    /// Start describing `T`, published as `name`.
    pub fn new(name: impl Into<String>) -> Self {
        let mut desc = NativeTypeDescriptor::new(
            TypeHash::of::<T>(),
            name,
            std::mem::size_of::<T>(),
            std::mem::align_of::<T>(),
        )
        .without(TypeFlags::IS_COPY_CONSTRUCTIBLE);

        if std::mem::needs_drop::<T>() {
            desc = desc
                .with_destruct(drop_shim::<T>)
                .without(TypeFlags::IS_MOVE_CONSTRUCTIBLE);
        }

        Self {
            desc,
            _marker: PhantomData,
        }
    }

    /// Use a name-derived identity instead of the `TypeId`-derived one.
    pub fn named_identity(mut self, qualified_name: &str) -> Self {
        self.desc.type_hash = TypeHash::from_name(qualified_name);
        self
    }

    /// Copy through `Clone::clone`.
    pub fn clone_hook(mut self) -> Self
    where
        T: Clone,
    {
        self.desc = self.desc.with_copy(clone_shim::<T>);
        self
    }

    /// Copy bitwise; valid because `T: Copy`.
    pub fn bitwise_copy(mut self) -> Self
    where
        T: Copy,
    {
        self.desc.flags |= TypeFlags::IS_COPY_CONSTRUCTIBLE;
        self
    }

    /// Move with `std::mem::take`, leaving `T::default()` in the source.
    pub fn take_on_move(mut self) -> Self
    where
        T: Default,
    {
        self.desc = self.desc.with_move(take_shim::<T>);
        self
    }

    /// Allow zero-argument construction through `Default::default`.
    pub fn default_init(mut self) -> Self
    where
        T: Default,
    {
        self.desc = self.desc.with_init(default_shim::<T>);
        self
    }

    /// Forbid moves.
    pub fn non_movable(mut self) -> Self {
        self.desc.move_ = None;
        self.desc.flags.remove(TypeFlags::IS_MOVE_CONSTRUCTIBLE | TypeFlags::HAS_MOVE);
        self
    }

    /// Forbid the bridge from destroying values of this type.
    pub fn non_destructible(mut self) -> Self {
        self.desc.flags.remove(TypeFlags::IS_DESTRUCTIBLE);
        self
    }

    /// Publish the type into `scope`.
    pub fn scope(mut self, scope: ObjectHandle) -> Self {
        self.desc.scope = Some(scope);
        self
    }

    /// Attach a documentation string.
    pub fn doc(mut self, doc: impl Into<String>) -> Self {
        self.desc.doc = Some(doc.into());
        self
    }

    /// Finish the descriptor.
    pub fn build(self) -> NativeTypeDescriptor {
        self.desc
    }
}

unsafe fn drop_shim<T>(value: *mut u8) {
    // SAFETY: the bridge only destroys initialized values of the described type.
    unsafe { std::ptr::drop_in_place(value.cast::<T>()) }
}

unsafe fn clone_shim<T: Clone>(dst: *mut u8, src: *const u8) -> Result<(), NativeError> {
    // SAFETY: `src` points to an initialized T, `dst` to storage laid out for T.
    let src = unsafe { &*src.cast::<T>() };
    let value = catch_unwind(AssertUnwindSafe(|| src.clone())).map_err(NativeError::from_panic)?;
    unsafe { dst.cast::<T>().write(value) };
    Ok(())
}

unsafe fn take_shim<T: Default>(dst: *mut u8, src: *mut u8) -> Result<(), NativeError> {
    // SAFETY: as for `clone_shim`; the source stays initialized.
    let src = unsafe { &mut *src.cast::<T>() };
    let value =
        catch_unwind(AssertUnwindSafe(|| std::mem::take(src))).map_err(NativeError::from_panic)?;
    unsafe { dst.cast::<T>().write(value) };
    Ok(())
}

unsafe fn default_shim<T: Default>(dst: *mut u8) -> Result<(), NativeError> {
    let value = catch_unwind(T::default).map_err(NativeError::from_panic)?;
    // SAFETY: `dst` is storage laid out for T.
    unsafe { dst.cast::<T>().write(value) };
    Ok(())
}
