//! Eviction of tiles that left the window.
//!
//! After a cycle that rebuilt the window, every tile not marked used and not
//! pinned is removed from the registry and disposed. A reader on another
//! thread can hold the [`HoldOff`] to postpone eviction; the evictor waits a
//! bounded time for it and otherwise skips the pass.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tracing::debug;

use crate::tile::TileRegistry;

/// Default bound on waiting for the hold-off to be released.
pub const DEFAULT_UNLOAD_WAIT: Duration = Duration::from_millis(100);

/// Outcome of an eviction pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvictionOutcome {
    /// The hold-off was not released in time
    Skipped,
    /// Number of tiles disposed
    Evicted(usize),
}

/// Counter of readers that forbid eviction while held.
#[derive(Debug, Default)]
pub struct HoldOff {
    holders: Mutex<usize>,
    released: Condvar,
}

impl HoldOff {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forbid eviction until the guard is dropped.
    pub fn hold(&self) -> HoldOffGuard<'_> {
        *self.holders.lock() += 1;
        HoldOffGuard { hold_off: self }
    }

    pub fn is_held(&self) -> bool {
        *self.holders.lock() > 0
    }

    /// Wait at most `timeout` for every holder to release.
    pub fn wait_released(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut holders = self.holders.lock();
        while *holders > 0 {
            if self.released.wait_until(&mut holders, deadline).timed_out() {
                return *holders == 0;
            }
        }
        true
    }
}

/// Guard returned by [`HoldOff::hold`].
pub struct HoldOffGuard<'a> {
    hold_off: &'a HoldOff,
}

impl Drop for HoldOffGuard<'_> {
    fn drop(&mut self) {
        let mut holders = self.hold_off.holders.lock();
        *holders = holders.saturating_sub(1);
        if *holders == 0 {
            self.hold_off.released.notify_all();
        }
    }
}

/// Disposes unused tiles after a rebuilding cycle.
pub struct EvictionManager {
    registry: Arc<TileRegistry>,
    hold_off: Arc<HoldOff>,
    wait: Duration,
}

impl EvictionManager {
    pub fn new(registry: Arc<TileRegistry>, wait: Duration) -> Self {
        Self {
            registry,
            hold_off: Arc::new(HoldOff::new()),
            wait,
        }
    }

    /// Hold-off shared with readers of the buffer.
    pub fn hold_off(&self) -> &Arc<HoldOff> {
        &self.hold_off
    }

    /// Run one eviction pass.
    ///
    /// Tiles are removed under the registry lock and disposed after it is
    /// released. Pinned tiles stay registered and are retried next pass.
    pub fn evict(&self) -> EvictionOutcome {
        if !self.hold_off.wait_released(self.wait) {
            debug!("Eviction skipped: hold-off not released within {:?}", self.wait);
            return EvictionOutcome::Skipped;
        }

        let removed = self.registry.take_unused();
        for tile in &removed {
            tile.dispose();
        }

        if !removed.is_empty() {
            debug!(
                "Evicted {} tile(s), {} remain",
                removed.len(),
                self.registry.len()
            );
        }
        EvictionOutcome::Evicted(removed.len())
    }
}
