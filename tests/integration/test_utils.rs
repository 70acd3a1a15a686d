//! Test utilities for integration tests.
//!
//! This module provides mock tile sources, synchronous loaders and helpers
//! for building tile imagery and tile directories.

use async_trait::async_trait;
use bytes::Bytes;
use image::{Rgba, RgbaImage};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use map_buffer::compositor::BufferOptions;
use map_buffer::fetch::{encode_png, TileLoader, TileSource};
use map_buffer::{FetchError, MapContext, Projection, Tile, TileKey, ViewState};

// =============================================================================
// Mock Tile Source
// =============================================================================

/// In-memory tile source that counts fetches per key.
#[derive(Clone, Default)]
pub struct MockTileSource {
    tiles: Arc<HashMap<TileKey, Bytes>>,
    fetches: Arc<Mutex<HashMap<TileKey, usize>>>,
    total: Arc<AtomicUsize>,
}

impl MockTileSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `pixels` PNG-encoded for `key`.
    pub fn with_tile(mut self, key: TileKey, pixels: &RgbaImage) -> Self {
        let png = encode_png(pixels).unwrap();
        Arc::make_mut(&mut self.tiles).insert(key, png);
        self
    }

    /// Serve a PNG of `pixels` for every key in the grid at `zoom`.
    pub fn with_zoom(mut self, zoom: u8, paint: impl Fn(TileKey) -> RgbaImage) -> Self {
        let size = 1u32 << zoom;
        for x in 0..size {
            for y in 0..size {
                let key = TileKey::new(zoom, x, y).unwrap();
                let png = encode_png(&paint(key)).unwrap();
                Arc::make_mut(&mut self.tiles).insert(key, png);
            }
        }
        self
    }

    pub fn fetch_count(&self) -> usize {
        self.total.load(Ordering::SeqCst)
    }

    pub fn fetches_of(&self, key: TileKey) -> usize {
        self.fetches.lock().get(&key).copied().unwrap_or(0)
    }
}

#[async_trait]
impl TileSource for MockTileSource {
    fn provider_id(&self) -> &str {
        "mock"
    }

    async fn fetch(&self, key: TileKey) -> Result<Bytes, FetchError> {
        self.total.fetch_add(1, Ordering::SeqCst);
        *self.fetches.lock().entry(key).or_insert(0) += 1;
        self.tiles
            .get(&key)
            .cloned()
            .ok_or_else(|| FetchError::NotFound(key.to_string()))
    }
}

// =============================================================================
// Synchronous Loader
// =============================================================================

type Paint = Box<dyn Fn(TileKey) -> Option<RgbaImage> + Send + Sync>;

/// Loader that resolves tiles on the calling thread.
///
/// `paint` returning `None` marks the tile as failed.
pub struct PaintLoader {
    paint: Paint,
    requested: Mutex<Vec<TileKey>>,
}

impl PaintLoader {
    pub fn new(paint: impl Fn(TileKey) -> Option<RgbaImage> + Send + Sync + 'static) -> Self {
        Self {
            paint: Box::new(paint),
            requested: Mutex::new(Vec::new()),
        }
    }

    /// Loader that fails every tile.
    pub fn failing() -> Self {
        Self::new(|_| None)
    }

    pub fn requested(&self) -> Vec<TileKey> {
        self.requested.lock().clone()
    }
}

impl TileLoader for PaintLoader {
    fn enqueue(&self, tile: Arc<Tile>) {
        self.requested.lock().push(tile.key());
        if !tile.begin_loading() {
            return;
        }
        match (self.paint)(tile.key()) {
            Some(pixels) => {
                tile.apply_pixels(pixels).unwrap();
            }
            None => {
                tile.mark_error();
            }
        }
    }
}

// =============================================================================
// Imagery
// =============================================================================

pub fn solid(size: u32, color: [u8; 4]) -> RgbaImage {
    RgbaImage::from_pixel(size, size, Rgba(color))
}

/// Tile whose pixel `(x, y)` is `[x, y, tag, 255]`.
pub fn gradient(size: u32, tag: u8) -> RgbaImage {
    RgbaImage::from_fn(size, size, |x, y| Rgba([x as u8, y as u8, tag, 255]))
}

/// Solid tile encoding its address: `[x, y, zoom, 255]`.
pub fn keyed(size: u32, key: TileKey) -> RgbaImage {
    solid(size, [key.x as u8, key.y as u8, key.zoom, 255])
}

/// Write `pixels` as `{root}/{z}/{x}/{y}.png`.
pub fn write_tile(root: &Path, key: TileKey, pixels: &RgbaImage) {
    let dir = root.join(key.zoom.to_string()).join(key.x.to_string());
    std::fs::create_dir_all(&dir).unwrap();
    pixels
        .save_with_format(dir.join(format!("{}.png", key.y)), image::ImageFormat::Png)
        .unwrap();
}

// =============================================================================
// Setup Helpers
// =============================================================================

pub fn key(zoom: u8, x: u32, y: u32) -> TileKey {
    TileKey::new(zoom, x, y).unwrap()
}

pub fn context(tile_size: u32) -> MapContext {
    MapContext::with_options(tile_size, Projection::SphericalMercator)
}

/// Options with short bounded waits so tests never stall.
pub fn fast_options() -> BufferOptions {
    BufferOptions {
        pixel_wait: Duration::from_millis(1),
        unload_wait: Duration::from_millis(5),
        ..BufferOptions::default()
    }
}

/// View centered on fractional tile coordinates `(tile_x, tile_y)`.
pub fn view_at_tile(tile_x: f64, tile_y: f64, zoom: u8, width: u32, height: u32) -> ViewState {
    let (longitude, latitude) =
        Projection::SphericalMercator.tile_to_coordinates(tile_x, tile_y, zoom);
    ViewState::new(longitude, latitude, zoom, width, height)
}

/// Poll `condition` until it holds or five seconds pass.
pub async fn eventually(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    condition()
}
