//! Release handle for a generation's owned resources.

use crate::lifecycle::{Shutdown, ShutdownSignal};

/// Single-fire teardown action stored alongside each generation.
///
/// Everything the routing engine owns exclusively (embedded responders)
/// subscribes to the handle and stops when it fires. Connections already
/// spliced by the engine do not subscribe, so they outlive the release.
#[derive(Debug, Clone, Default)]
pub struct ReleaseHandle {
    shutdown: Shutdown,
}

impl ReleaseHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Signal observed by resources that must stop on release.
    pub fn subscribe(&self) -> ShutdownSignal {
        self.shutdown.subscribe()
    }

    /// Fire the handle. Returns `true` only for the first call.
    pub fn release(&self) -> bool {
        self.shutdown.trigger()
    }

    pub fn is_released(&self) -> bool {
        self.shutdown.is_triggered()
    }
}
