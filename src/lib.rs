//! proxybind - proxy objects for native values in a reference-counted
//! managed runtime.
//!
//! The crate keeps three tables in one [`Bridge`]:
//!
//! - registered native types and their type objects
//! - live proxies, keyed by native address and type, so a value is never
//!   wrapped twice
//! - keep-alive edges between managed objects
//!
//! Native values cross into the runtime through [`Bridge::bind`], whose
//! [`RvPolicy`] decides whether the proxy borrows, copies, moves or takes
//! over the value, and come back out through [`Bridge::try_extract`].
//!
//! # Example
//!
//! ```
//! use proxybind::prelude::*;
//!
//! #[derive(Clone, Copy)]
//! struct Vec2 {
//!     x: f32,
//!     y: f32,
//! }
//!
//! let mut bridge = Bridge::new();
//! let module = bridge.new_module("geometry");
//! let desc = DescriptorBuilder::<Vec2>::new("Vec2")
//!     .bitwise_copy()
//!     .scope(module)
//!     .build();
//! let type_hash = desc.type_hash;
//! bridge.register_type(desc).unwrap();
//!
//! let mut v = Vec2 { x: 1.0, y: 2.0 };
//! let addr = (&mut v as *mut Vec2).cast::<u8>();
//!
//! let first = bridge.bind(type_hash, addr, RvPolicy::Reference, None).unwrap();
//! let again = bridge.bind(type_hash, addr, RvPolicy::Copy, None).unwrap();
//! assert_eq!(first, again);
//! assert_eq!(bridge.try_extract(type_hash, first), Some(addr));
//!
//! let proxy = first.unwrap();
//! bridge.decref(proxy).unwrap();
//! bridge.decref(proxy).unwrap();
//! assert!(bridge.shutdown().is_clean());
//! ```

mod bind;
mod bridge;
mod config;
pub mod global;
mod instance;
mod types;

pub use bridge::{Bridge, ShutdownReport};
pub use config::BridgeConfig;
pub use instance::{InstanceFlags, ProxyInstance};
pub use types::{DeallocSlot, InitSlot, NewSlot, ProxyType, TypeSlots};

pub use proxybind_core::{
    BridgeError, BridgeResult, DescriptorBuilder, FatalError, NativeError, NativeTypeDescriptor,
    ObjectHandle, PtrKey, QualifiedName, RvPolicy, TypeFlags, TypeHash,
};

pub mod prelude {
    pub use crate::bridge::{Bridge, ShutdownReport};
    pub use crate::config::BridgeConfig;
    pub use crate::global;
    pub use crate::instance::{InstanceFlags, ProxyInstance};
    pub use crate::types::{ProxyType, TypeSlots};
    pub use proxybind_core::{
        BridgeError, BridgeResult, DescriptorBuilder, FatalError, NativeError,
        NativeTypeDescriptor, ObjectHandle, RvPolicy, TypeFlags, TypeHash,
    };
}
