//! Transport implementations.
//!
//! This module provides concrete implementations of the domain-level
//! `Transport` capability. Each protocol is exposed only through a
//! [`TransportProvider`](crate::TransportProvider); protocols that need
//! third-party crates are hidden behind feature flags.
//!
//! Domain code must not depend on transport-specific types.

use std::sync::{Mutex, MutexGuard};

use crate::{log_error, Error, ProviderPtr, Result};

mod memory;
mod mqtt;

pub use memory::{memory_provider, memory_provider_with_hub, MemoryHub, MEMORY_PROTOCOL};
pub use mqtt::{mqtt_provider, MQTT_PROTOCOL};

/// Option understood by the in-memory transport: `true` sends everything
/// queued as one batch, `false` sends one message per batch.
pub const OPTION_BATCHING: &str = "batching";

/// Look up a transport provider by protocol name.
///
/// Known names are `"memory"` and `"rumqttc"`. A known protocol whose
/// feature is disabled still resolves; its provider fails on `create`.
///
/// # Errors
///
/// [`Error::InvalidArgument`] for an unknown name.
pub fn provider_for(name: &str) -> Result<ProviderPtr> {
    // ---
    match name {
        MEMORY_PROTOCOL => Ok(memory_provider()),
        MQTT_PROTOCOL => Ok(mqtt_provider()),
        other => {
            log_error!("unknown transport type: {other}");
            Err(Error::InvalidArgument(format!(
                "unknown transport type: {other}"
            )))
        }
    }
}

/// Acquire mutex guard, ignoring poisoning
pub(crate) fn lock_ignore_poison<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    match m.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
