//! An optional process-wide bus.
//!
//! Passing an [`EventBus`] explicitly is preferred. For code that cannot
//! thread a handle through, one bus can be installed here once and fetched
//! from anywhere afterwards.

use crate::{Error, EventBus, Result};
use std::sync::OnceLock;

static GLOBAL: OnceLock<EventBus> = OnceLock::new();

/// Install `bus` as the process-wide bus.
///
/// Fails with [`Error::AlreadyInitialized`] if a bus was installed before.
pub fn install(bus: EventBus) -> Result<&'static EventBus> {
    GLOBAL.set(bus).map_err(|_| Error::AlreadyInitialized)?;
    get()
}

/// The process-wide bus
pub fn get() -> Result<&'static EventBus> {
    GLOBAL.get().ok_or(Error::NotInitialized)
}

/// Whether a process-wide bus has been installed
pub fn is_installed() -> bool {
    GLOBAL.get().is_some()
}
