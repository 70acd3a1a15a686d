//! A single map tile and its pixel lifecycle.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use image::{imageops, RgbaImage};
use parking_lot::{Condvar, Mutex};
use serde::Serialize;

use crate::error::TileError;

use super::key::TileKey;

/// Lifecycle of a tile's imagery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TileStatus {
    /// Registered, no fetch requested yet
    None,
    /// Fetch in flight
    Loading,
    /// Pixels present and canonical size
    Loaded,
    /// Fetch or decode failed; rendered via parent fallback
    Error,
    /// Released by eviction or buffer teardown
    Disposed,
}

struct TileState {
    status: TileStatus,
    pixels: Option<Arc<RgbaImage>>,
    parent: Option<TileKey>,
}

/// One tile of map imagery.
///
/// Pixel data is held as an immutable snapshot behind an `Arc`. Readers clone
/// the snapshot and copy from it without holding the tile lock, so a dispose
/// or refetch never frees memory underneath an active blit.
pub struct Tile {
    key: TileKey,
    tile_size: u32,
    state: Mutex<TileState>,
    pixels_ready: Condvar,
    used: AtomicBool,
    pins: AtomicUsize,
}

impl Tile {
    pub(crate) fn new(key: TileKey, tile_size: u32, parent: Option<TileKey>) -> Self {
        Self {
            key,
            tile_size,
            state: Mutex::new(TileState {
                status: TileStatus::None,
                pixels: None,
                parent,
            }),
            pixels_ready: Condvar::new(),
            used: AtomicBool::new(false),
            pins: AtomicUsize::new(0),
        }
    }

    pub fn key(&self) -> TileKey {
        self.key
    }

    /// Canonical edge length of this tile's pixel data.
    pub fn tile_size(&self) -> u32 {
        self.tile_size
    }

    pub fn status(&self) -> TileStatus {
        self.state.lock().status
    }

    pub fn is_loaded(&self) -> bool {
        self.status() == TileStatus::Loaded
    }

    pub fn is_disposed(&self) -> bool {
        self.status() == TileStatus::Disposed
    }

    /// Key of the parent tile, if it was registered when this tile was linked.
    pub fn parent(&self) -> Option<TileKey> {
        self.state.lock().parent
    }

    pub(crate) fn set_parent(&self, parent: TileKey) {
        let mut state = self.state.lock();
        if state.status != TileStatus::Disposed {
            state.parent = Some(parent);
        }
    }

    /// Snapshot of the pixel data, present only while the tile is loaded.
    pub fn pixels(&self) -> Option<Arc<RgbaImage>> {
        let state = self.state.lock();
        match state.status {
            TileStatus::Loaded => state.pixels.clone(),
            _ => None,
        }
    }

    /// Transition to `Loading` before a fetch is issued.
    ///
    /// Returns `false` when the tile is already loaded, loading or disposed.
    pub fn begin_loading(&self) -> bool {
        let mut state = self.state.lock();
        match state.status {
            TileStatus::None | TileStatus::Error => {
                state.status = TileStatus::Loading;
                true
            }
            _ => false,
        }
    }

    /// Store decoded pixels and mark the tile loaded.
    ///
    /// Returns `Ok(false)` without writing when the tile has been disposed;
    /// a fetch completing after eviction is expected and harmless.
    pub fn apply_pixels(&self, pixels: RgbaImage) -> Result<bool, TileError> {
        if pixels.width() != self.tile_size || pixels.height() != self.tile_size {
            return Err(TileError::InvalidPixelSize {
                expected: self.tile_size,
                width: pixels.width(),
                height: pixels.height(),
            });
        }

        let mut state = self.state.lock();
        if state.status == TileStatus::Disposed {
            return Ok(false);
        }
        state.pixels = Some(Arc::new(pixels));
        state.status = TileStatus::Loaded;
        drop(state);

        self.pixels_ready.notify_all();
        Ok(true)
    }

    /// Record a failed fetch. Ignored on disposed tiles.
    pub fn mark_error(&self) -> bool {
        let mut state = self.state.lock();
        if state.status == TileStatus::Disposed {
            return false;
        }
        state.status = TileStatus::Error;
        drop(state);

        self.pixels_ready.notify_all();
        true
    }

    /// Release pixel storage and unlink the tile.
    pub fn dispose(&self) {
        let mut state = self.state.lock();
        state.status = TileStatus::Disposed;
        state.pixels = None;
        state.parent = None;
        drop(state);

        self.used.store(false, Ordering::Release);
        self.pixels_ready.notify_all();
    }

    /// Wait at most `timeout` for a pending fetch to deliver pixels.
    ///
    /// Returns the snapshot if the tile is loaded when the wait ends, `None`
    /// otherwise. Never blocks past the deadline.
    pub fn wait_for_pixels(&self, timeout: Duration) -> Option<Arc<RgbaImage>> {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        while matches!(state.status, TileStatus::None | TileStatus::Loading) {
            if self
                .pixels_ready
                .wait_until(&mut state, deadline)
                .timed_out()
            {
                break;
            }
        }
        match state.status {
            TileStatus::Loaded => state.pixels.clone(),
            _ => None,
        }
    }

    /// Copy the `size x size` block at `(x, y)` out of a loaded tile.
    pub fn subregion(&self, x: u32, y: u32, size: u32) -> Option<RgbaImage> {
        let pixels = self.pixels()?;
        if size == 0 || x + size > pixels.width() || y + size > pixels.height() {
            return None;
        }
        Some(imageops::crop_imm(pixels.as_ref(), x, y, size, size).to_image())
    }

    pub fn is_used(&self) -> bool {
        self.used.load(Ordering::Acquire)
    }

    pub fn set_used(&self, used: bool) {
        self.used.store(used, Ordering::Release);
    }

    /// Pin the tile against eviction for the lifetime of the guard.
    pub fn pin(&self) -> TilePin<'_> {
        self.pins.fetch_add(1, Ordering::AcqRel);
        TilePin { tile: self }
    }

    /// Whether any reader currently holds a pin.
    pub fn is_locked(&self) -> bool {
        self.pins.load(Ordering::Acquire) > 0
    }
}

impl std::fmt::Debug for Tile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tile")
            .field("key", &self.key)
            .field("status", &self.status())
            .field("used", &self.is_used())
            .field("locked", &self.is_locked())
            .finish()
    }
}

/// Guard returned by [`Tile::pin`].
pub struct TilePin<'a> {
    tile: &'a Tile,
}

impl Drop for TilePin<'_> {
    fn drop(&mut self) {
        self.tile.pins.fetch_sub(1, Ordering::AcqRel);
    }
}
