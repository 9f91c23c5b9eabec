//! The process-wide tables of proxybind.
//!
//! - [`TypeRegistry`] - native type identity to type object
//! - [`InstanceRegistry`] - `(address, type)` to the live proxy
//! - [`KeepAliveGraph`] - nurse to patients
//!
//! # Thread Safety
//!
//! None of the tables are synchronized. They are owned by one bridge context
//! and mutated only through its protocols, under whatever lock the embedding
//! uses to serialize access to the managed runtime.

mod instance_registry;
mod keep_alive;
mod type_registry;

pub use instance_registry::{InstanceKey, InstanceRegistry};
pub use keep_alive::KeepAliveGraph;
pub use type_registry::{TypeEntry, TypeRegistry};
