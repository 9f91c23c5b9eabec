//! Process-wide bridge.
//!
//! Embeddings with a single managed runtime share one [`Bridge`] behind a
//! mutex that doubles as the runtime's global lock. It is created on first
//! use, or explicitly with [`init`], and torn down with [`shutdown`].
//!
//! ```
//! use proxybind::global;
//!
//! let module = global::with_bridge(|bridge| bridge.new_module("app")).unwrap();
//! let alive = global::with_bridge(|bridge| bridge.is_alive(module)).unwrap();
//! assert!(alive);
//! ```

use std::sync::Mutex;

use lazy_static::lazy_static;

use proxybind_core::BridgeResult;

use crate::bridge::{Bridge, ShutdownReport};
use crate::config::BridgeConfig;

lazy_static! {
    static ref BRIDGE: Mutex<Option<Bridge>> = Mutex::new(None);
}

/// Create the process-wide bridge with `config`.
///
/// Returns false, leaving the existing bridge untouched, if one is already
/// running.
pub fn init(config: BridgeConfig) -> BridgeResult<bool> {
    let mut guard = BRIDGE.lock()?;
    if guard.is_some() {
        return Ok(false);
    }
    *guard = Some(Bridge::with_config(config));
    log::debug!("process-wide bridge initialized");
    Ok(true)
}

/// Run `f` with exclusive access to the process-wide bridge, creating it with
/// the default configuration if needed.
///
/// A fatal error that panics inside `f` poisons the lock; later calls fail
/// with [`LockPoisoned`](proxybind_core::BridgeError::LockPoisoned).
pub fn with_bridge<R>(f: impl FnOnce(&mut Bridge) -> R) -> BridgeResult<R> {
    let mut guard = BRIDGE.lock()?;
    let bridge = guard.get_or_insert_with(Bridge::new);
    Ok(f(bridge))
}

/// Whether the process-wide bridge exists.
pub fn is_initialized() -> BridgeResult<bool> {
    Ok(BRIDGE.lock()?.is_some())
}

/// Tear down the process-wide bridge.
///
/// Returns None if it was never created.
pub fn shutdown() -> BridgeResult<Option<ShutdownReport>> {
    let bridge = BRIDGE.lock()?.take();
    Ok(bridge.map(Bridge::shutdown))
}
