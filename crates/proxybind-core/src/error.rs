//! Error types for the bridge.
//!
//! ## Error Hierarchy
//!
//! ```text
//! BridgeError
//! ├── Fatal(FatalError)   - broken bridge invariants, not meant to be handled
//! ├── NoConstructor       - zero-argument construction of an opaque type
//! ├── InvalidNurse        - keep-alive nurse is not a proxy instance
//! ├── InvalidHandle       - stale or dangling object handle
//! ├── NotAType            - a type object was expected
//! ├── NoAttributes        - the object has no attribute table
//! ├── InvalidLayout       - a descriptor's size/alignment cannot be allocated
//! ├── Native              - a default-init hook failed
//! └── LockPoisoned        - the process-wide bridge lock was poisoned
//!
//! NativeError             - failure reported by a native copy/move/init hook
//! ```

use std::sync::PoisonError;

use thiserror::Error;

/// Broken invariants of the bridge itself.
///
/// These mean a lower-level caller skipped a check it was required to make,
/// or the tables disagree with the managed runtime about what exists.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FatalError {
    /// The native type identity was already registered.
    #[error("type '{0}' was already registered")]
    DuplicateType(String),

    /// A type object was freed but its identity was not in the type registry.
    #[error("could not find type '{0}' while freeing its type object")]
    UnknownType(String),

    /// A second proxy was created for a live address/type pair.
    #[error("duplicate instance of '{type_name}' at {addr:#x}")]
    DuplicateInstance {
        /// The native type name.
        type_name: String,
        /// The native value address.
        addr: usize,
    },

    /// A proxy was released but was not in the instance registry.
    #[error("attempted to delete an unknown instance of '{0}'")]
    UnknownInstance(String),

    /// A proxy asked for destruction of a type declared non-destructible.
    #[error("attempted to call the destructor of non-destructible type '{0}'")]
    NonDestructible(String),

    /// A move was requested for a type that is not move-constructible.
    #[error("attempted to move an instance of non-movable type '{0}'")]
    NonMovable(String),

    /// A copy was requested for a type that is not copy-constructible.
    #[error("attempted to copy an instance of non-copyable type '{0}'")]
    NonCopyable(String),

    /// The keep-alive set of a nurse was missing while its flag was set.
    #[error("failure while clearing keep-alive references of '{0}'")]
    KeepAliveCorrupted(String),
}

/// Failure reported by a native hook (copy, move or default-init).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NativeError {
    /// The hook returned an error.
    #[error("{0}")]
    Failed(String),

    /// The hook panicked; the payload message is kept when it is a string.
    #[error("native hook panicked: {0}")]
    Panicked(String),
}

impl NativeError {
    /// Build an error from a panic payload caught with `catch_unwind`.
    pub fn from_panic(payload: Box<dyn std::any::Any + Send>) -> Self {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "non-string panic payload".to_string());
        NativeError::Panicked(message)
    }
}

/// Errors surfaced by bridge operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BridgeError {
    /// A broken invariant (see [`FatalError`]).
    #[error("fatal: {0}")]
    Fatal(#[from] FatalError),

    /// The type has no default-init hook, so it cannot be built from nothing.
    #[error("{0}: no constructor defined")]
    NoConstructor(String),

    /// The keep-alive nurse is not a live proxy instance.
    #[error("expected a proxy instance as keep-alive nurse")]
    InvalidNurse,

    /// The handle does not refer to a live object.
    #[error("stale or invalid object handle")]
    InvalidHandle,

    /// A type object was expected.
    #[error("object is not a bridge type object")]
    NotAType,

    /// The object is neither a module nor a type object.
    #[error("object has no attribute table")]
    NoAttributes,

    /// The descriptor's size and alignment do not form a valid layout.
    #[error("invalid layout for type '{0}'")]
    InvalidLayout(String),

    /// A native default-init hook failed.
    #[error("native hook of '{type_name}' failed: {source}")]
    Native {
        /// The native type name.
        type_name: String,
        /// What the hook reported.
        #[source]
        source: NativeError,
    },

    /// The process-wide bridge lock was poisoned by a panic.
    #[error("bridge lock poisoned")]
    LockPoisoned,
}

impl BridgeError {
    /// Whether this error reports a broken bridge invariant.
    pub fn is_fatal(&self) -> bool {
        matches!(self, BridgeError::Fatal(_))
    }
}

impl<T> From<PoisonError<T>> for BridgeError {
    fn from(_: PoisonError<T>) -> Self {
        BridgeError::LockPoisoned
    }
}

/// Result alias used across the bridge.
pub type BridgeResult<T> = Result<T, BridgeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fatal_errors_convert() {
        let err: BridgeError = FatalError::NonMovable("Mutex".into()).into();
        assert!(err.is_fatal());
        assert_eq!(
            err.to_string(),
            "fatal: attempted to move an instance of non-movable type 'Mutex'"
        );
        assert!(!BridgeError::InvalidNurse.is_fatal());
    }

    #[test]
    fn no_constructor_message() {
        let err = BridgeError::NoConstructor("geometry.Vec3".into());
        assert_eq!(err.to_string(), "geometry.Vec3: no constructor defined");
    }

    #[test]
    fn panic_payloads_are_captured() {
        let payload = std::panic::catch_unwind(|| panic!("boom")).unwrap_err();
        assert_eq!(
            NativeError::from_panic(payload),
            NativeError::Panicked("boom".into())
        );

        let owned = std::panic::catch_unwind(|| panic!("{} {}", "formatted", 1)).unwrap_err();
        assert_eq!(
            NativeError::from_panic(owned),
            NativeError::Panicked("formatted 1".into())
        );
    }
}
