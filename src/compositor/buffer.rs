//! The map buffer: window resolution, tile blits and front extraction.

use std::collections::HashSet;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};

use image::RgbaImage;
use serde::Serialize;
use tracing::{debug, error, warn};

use crate::context::MapContext;
use crate::display::DisplaySink;
use crate::error::BufferError;
use crate::fetch::TileLoader;
use crate::geo::GeoPoint;
use crate::overlay::{MarkerLayer, Overlay, OverlayTarget};
use crate::tile::{AncestorPolicy, Tile, TileKey, TileStatus};
use crate::view::{ViewProvider, ViewState};

use super::eviction::{EvictionManager, EvictionOutcome, HoldOff, DEFAULT_UNLOAD_WAIT};
use super::raster;
use super::status::{BufferStatus, CancelToken, RedrawType, StatusCell};
use super::window::{continuous_center_x, viewport_corners, TileWindow};

// =============================================================================
// Options
// =============================================================================

/// Default budget for waiting on in-flight tile pixels within one cycle.
pub const DEFAULT_PIXEL_WAIT: Duration = Duration::from_millis(20);

/// Default number of ancestor levels kept alive for fallback.
pub const DEFAULT_PARENT_LEVELS: u8 = 5;

/// Missing ancestors are only created above this zoom by default.
pub const DEFAULT_MIN_PARENT_ZOOM: u8 = 2;

/// Tunables for a [`MapBuffer`].
#[derive(Debug, Clone)]
pub struct BufferOptions {
    /// Only keep window-zoom tiles; no ancestors are created or kept
    pub use_current_zoom_tiles: bool,

    /// Extract a half-resolution frame instead of the full front buffer
    pub generate_smart_buffer: bool,

    /// Total time a cycle may wait for loading tiles before falling back
    pub pixel_wait: Duration,

    /// Bound on waiting for the eviction hold-off
    pub unload_wait: Duration,

    /// Ancestor levels marked used above each window tile
    pub parent_levels: u8,

    /// Ancestors at or below this zoom are never created
    pub min_parent_zoom: u8,
}

impl Default for BufferOptions {
    fn default() -> Self {
        Self {
            use_current_zoom_tiles: false,
            generate_smart_buffer: false,
            pixel_wait: DEFAULT_PIXEL_WAIT,
            unload_wait: DEFAULT_UNLOAD_WAIT,
            parent_levels: DEFAULT_PARENT_LEVELS,
            min_parent_zoom: DEFAULT_MIN_PARENT_ZOOM,
        }
    }
}

/// Summary of one compositing cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CycleReport {
    /// The backing buffer was rebuilt
    pub rebuilt: bool,

    /// Window used by the cycle
    pub window: Option<TileWindow>,

    /// Tiles handed to the loader
    pub requested: usize,

    /// Cells copied from their own loaded tile
    pub copied: usize,

    /// Cells synthesized from a loaded ancestor
    pub fallback: usize,

    /// Cells whose tile and ancestors have no pixels yet; left as they were
    pub pending: usize,

    /// Cells outside the grid, cleared to transparent
    pub cleared: usize,

    /// Overlays that failed to draw
    pub overlay_errors: usize,

    /// Tiles evicted after the cycle, `None` when eviction did not run
    pub evicted: Option<usize>,
}

impl CycleReport {
    /// Every cell of the window shows its own tile or lies off the grid.
    pub fn is_settled(&self) -> bool {
        self.window
            .map(|w| self.copied + self.cleared == w.cell_count())
            .unwrap_or(false)
    }
}

#[derive(Debug, Clone, Copy)]
struct PreviousCycle {
    view: ViewState,
    center_x: f64,
}

enum CellFill {
    Copied,
    Fallback,
    Stale,
}

// =============================================================================
// Map Buffer
// =============================================================================

/// Backing and front pixel buffers for one map view.
///
/// A cycle reads the view, resolves the tile window, rebuilds the backing
/// buffer when the window moved or new imagery arrived, draws overlays, and
/// extracts the viewport-sized front buffer.
///
/// # Example
///
/// ```ignore
/// use map_buffer::compositor::{BufferOptions, MapBuffer};
/// use map_buffer::view::ViewState;
///
/// let mut buffer = MapBuffer::new(context, loader, BufferOptions::default());
/// let report = buffer.run_cycle(&ViewState::new(2.35, 48.85, 12, 800, 600))?;
/// let frame = buffer.frame();
/// ```
pub struct MapBuffer {
    context: MapContext,
    options: BufferOptions,
    loader: Arc<dyn TileLoader>,
    status: Arc<StatusCell>,
    cancel: CancelToken,
    eviction: EvictionManager,
    overlays: Vec<Arc<dyn Overlay>>,
    markers: MarkerLayer,
    sink: Option<Arc<dyn DisplaySink>>,
    back: RgbaImage,
    front: RgbaImage,
    smart: RgbaImage,
    window: Option<TileWindow>,
    front_offset: (u32, u32),
    previous: Option<PreviousCycle>,
    redraw: RedrawType,
    update_back_buffer: bool,
}

impl MapBuffer {
    pub fn new(context: MapContext, loader: Arc<dyn TileLoader>, options: BufferOptions) -> Self {
        let eviction = EvictionManager::new(Arc::clone(context.registry()), options.unload_wait);
        Self {
            context,
            options,
            loader,
            status: Arc::new(StatusCell::new()),
            cancel: CancelToken::new(),
            eviction,
            overlays: Vec::new(),
            markers: MarkerLayer::new(),
            sink: None,
            back: RgbaImage::new(0, 0),
            front: RgbaImage::new(0, 0),
            smart: RgbaImage::new(0, 0),
            window: None,
            front_offset: (0, 0),
            previous: None,
            redraw: RedrawType::None,
            update_back_buffer: false,
        }
    }

    /// Present every extracted frame to `sink`.
    pub fn with_sink(mut self, sink: Arc<dyn DisplaySink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn set_sink(&mut self, sink: Option<Arc<dyn DisplaySink>>) {
        self.sink = sink;
    }

    pub fn context(&self) -> &MapContext {
        &self.context
    }

    pub fn options(&self) -> &BufferOptions {
        &self.options
    }

    pub fn status(&self) -> BufferStatus {
        self.status.get()
    }

    /// Status flag shared with a worker or control thread.
    pub fn status_cell(&self) -> &Arc<StatusCell> {
        &self.status
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Hold-off that postpones eviction while held.
    pub fn hold_off(&self) -> &Arc<HoldOff> {
        self.eviction.hold_off()
    }

    pub fn is_disposed(&self) -> bool {
        self.status.get() == BufferStatus::Disposed
    }

    /// Window of the last rebuild.
    pub fn window(&self) -> Option<&TileWindow> {
        self.window.as_ref()
    }

    /// Grid position of the backing buffer's top-left tile.
    pub fn buffer_position(&self) -> Option<(i64, i64)> {
        self.window.map(|w| w.position())
    }

    /// Top-left of the front buffer inside the backing buffer.
    pub fn front_offset(&self) -> (u32, u32) {
        self.front_offset
    }

    pub fn back_buffer(&self) -> &RgbaImage {
        &self.back
    }

    pub fn front_buffer(&self) -> &RgbaImage {
        &self.front
    }

    /// The half-resolution frame, when enabled.
    pub fn smart_buffer(&self) -> Option<&RgbaImage> {
        self.options.generate_smart_buffer.then_some(&self.smart)
    }

    /// The frame handed to display sinks.
    pub fn frame(&self) -> &RgbaImage {
        if self.options.generate_smart_buffer {
            &self.smart
        } else {
            &self.front
        }
    }

    pub fn add_overlay(&mut self, overlay: Arc<dyn Overlay>) {
        self.overlays.push(overlay);
    }

    pub fn markers(&self) -> &MarkerLayer {
        &self.markers
    }

    pub fn markers_mut(&mut self) -> &mut MarkerLayer {
        &mut self.markers
    }

    /// Schedule a redraw. `Full` forces the next cycle to rebuild.
    pub fn redraw(&mut self, kind: RedrawType) {
        if kind == RedrawType::Full || self.redraw != RedrawType::Full {
            self.redraw = kind;
        }
    }

    /// Queue a tile whose pixels were applied outside the fetch pipeline.
    pub fn apply_tile(&self, tile: Arc<Tile>) {
        self.context.completed().push(tile);
    }

    /// Geographic corners of the viewport of the last cycle.
    pub fn corners(&self) -> Option<(GeoPoint, GeoPoint)> {
        let previous = self.previous.as_ref()?;
        Some(viewport_corners(
            &previous.view,
            self.context.projection(),
            self.context.tile_size(),
        ))
    }

    // =========================================================================
    // Cycle
    // =========================================================================

    /// Run one compositing cycle.
    ///
    /// Failures inside the cycle, including panics in collaborators, are
    /// logged and the cycle still completes. Only disposal is returned as an
    /// error.
    pub fn run_cycle(&mut self, provider: &dyn ViewProvider) -> Result<CycleReport, BufferError> {
        if self.cancel.is_cancelled() || self.is_disposed() {
            return Err(BufferError::Disposed);
        }
        self.status.set(BufferStatus::Working);

        let view = provider.current();
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.compose(&view)));

        let mut report = match outcome {
            Ok(Ok(report)) => report,
            Ok(Err(BufferError::Disposed)) => return Err(BufferError::Disposed),
            Ok(Err(e)) => {
                warn!("Cycle failed: {}", e);
                CycleReport::default()
            }
            Err(_) => {
                error!("Cycle panicked; forcing a rebuild next cycle");
                self.update_back_buffer = true;
                CycleReport::default()
            }
        };

        if self.cancel.is_cancelled() {
            return Err(BufferError::Disposed);
        }
        self.status.set(BufferStatus::Complete);

        if report.rebuilt {
            report.evicted = match self.eviction.evict() {
                EvictionOutcome::Evicted(count) => Some(count),
                EvictionOutcome::Skipped => None,
            };
        }
        Ok(report)
    }

    fn compose(&mut self, view: &ViewState) -> Result<CycleReport, BufferError> {
        view.validate()?;

        let tile_size = self.context.tile_size();
        let projection = self.context.projection();
        let (raw_x, center_y) =
            projection.coordinates_to_tile(view.longitude, view.latitude, view.zoom);

        let previous_x = self
            .previous
            .filter(|p| p.view.zoom == view.zoom)
            .map(|p| p.center_x);
        let center_x = continuous_center_x(raw_x, view.zoom, previous_x);

        let window = TileWindow::compute(
            center_x,
            center_y,
            view.zoom,
            view.width,
            view.height,
            tile_size,
        );

        let mut full = self.redraw == RedrawType::Full;
        self.redraw = RedrawType::None;

        if self.front.dimensions() != (view.width, view.height) {
            self.front = RgbaImage::new(view.width, view.height);
            full = true;
        }
        if self.back.dimensions() != (window.pixel_width(), window.pixel_height()) {
            self.back = RgbaImage::new(window.pixel_width(), window.pixel_height());
            full = true;
        }

        self.collect_completed(&window);
        self.check_cancelled()?;

        let moved = self
            .window
            .map(|last| last.zoom != window.zoom || last.position() != window.position())
            .unwrap_or(true);

        let mut report = CycleReport {
            window: Some(window),
            ..CycleReport::default()
        };

        if full || moved || self.update_back_buffer {
            self.update_back_buffer = false;
            self.window = Some(window);
            self.rebuild(&window, &mut report)?;
            report.rebuilt = true;

            report.overlay_errors = self.draw_overlays(&window, view, center_x)?;
        }

        self.previous = Some(PreviousCycle {
            view: *view,
            center_x,
        });

        self.front_offset = window.front_offset(center_x, center_y, view.width, view.height);
        self.extract(view)?;

        if let Some(sink) = &self.sink {
            sink.present(self.frame());
        }
        Ok(report)
    }

    /// Drain completed tiles; any that shows in the window forces a rebuild.
    fn collect_completed(&mut self, window: &TileWindow) {
        let completed = self.context.completed().drain();
        let affected = completed
            .iter()
            .filter(|tile| !tile.is_disposed() && window.covers(&tile.key()))
            .count();
        if affected > 0 {
            debug!("{} completed tile(s) affect the window", affected);
            self.update_back_buffer = true;
        }
    }

    fn rebuild(&mut self, window: &TileWindow, report: &mut CycleReport) -> Result<(), BufferError> {
        debug!(
            "Rebuilding backing buffer at z{} ({}, {}) {}x{} tiles",
            window.zoom, window.origin_x, window.origin_y, window.count_x, window.count_y
        );

        let policy = (!self.options.use_current_zoom_tiles).then_some(AncestorPolicy {
            levels: self.options.parent_levels,
            min_create_zoom: self.options.min_parent_zoom,
        });
        let resolution = self.context.registry().resolve_window(&window.keys(), policy);

        report.requested = self.request_missing(&resolution.tiles, &resolution.created);

        let deadline = Instant::now() + self.options.pixel_wait;
        let tile_size = window.tile_size;

        for row in 0..window.count_y {
            self.check_cancelled()?;
            for column in 0..window.count_x {
                let index = (row * window.count_x + column) as usize;
                let (x, y) = window.cell_offset(column, row);

                let Some(tile) = resolution.tiles.get(index).and_then(Option::as_ref) else {
                    raster::clear(&mut self.back, x, y, tile_size, tile_size);
                    report.cleared += 1;
                    continue;
                };

                match self.blit_tile(tile, x, y, deadline) {
                    CellFill::Copied => report.copied += 1,
                    CellFill::Fallback => report.fallback += 1,
                    CellFill::Stale => report.pending += 1,
                }
            }
        }
        Ok(())
    }

    /// Hand every tile without imagery to the loader once.
    fn request_missing(&self, window_tiles: &[Option<Arc<Tile>>], created: &[Arc<Tile>]) -> usize {
        let mut seen: HashSet<TileKey> = HashSet::new();
        let mut requested = 0;

        let candidates = window_tiles.iter().flatten().chain(created.iter());
        for tile in candidates {
            if !seen.insert(tile.key()) || tile.status() != TileStatus::None {
                continue;
            }
            self.loader.enqueue(Arc::clone(tile));
            requested += 1;
        }
        requested
    }

    fn blit_tile(&mut self, tile: &Tile, x: i64, y: i64, deadline: Instant) -> CellFill {
        let _pin = tile.pin();
        let pixels = match tile.status() {
            TileStatus::Loaded => tile.pixels(),
            TileStatus::None | TileStatus::Loading => {
                tile.wait_for_pixels(deadline.saturating_duration_since(Instant::now()))
            }
            TileStatus::Error | TileStatus::Disposed => None,
        };

        if let Some(pixels) = pixels {
            let size = self.context.tile_size();
            debug_assert_eq!(
                pixels.dimensions(),
                (size, size),
                "loaded tile {} has non-canonical size",
                tile.key()
            );
            raster::blit(&mut self.back, &pixels, x, y);
            return CellFill::Copied;
        }

        if self.blit_from_ancestor(tile.key(), x, y) {
            CellFill::Fallback
        } else {
            CellFill::Stale
        }
    }

    /// Fill a cell from the nearest loaded ancestor.
    ///
    /// The block of the ancestor covering `key` shrinks by half per level
    /// up; it is scaled back to the full tile footprint with nearest-neighbour
    /// sampling.
    fn blit_from_ancestor(&mut self, key: TileKey, x: i64, y: i64) -> bool {
        let tile_size = self.context.tile_size();
        let max_levels = tile_size.checked_ilog2().unwrap_or(0).min(u8::MAX as u32) as u8;

        let Some((ancestor, levels)) = self.context.registry().loaded_ancestor(&key, max_levels)
        else {
            return false;
        };

        let span = 1u32 << levels;
        let size = tile_size / span;
        let offset = |i: u32| ((i % span) as u64 * tile_size as u64 / span as u64) as u32;
        let (sx, sy) = (offset(key.x), offset(key.y));

        let _pin = ancestor.pin();
        match ancestor.subregion(sx, sy, size) {
            Some(region) => {
                raster::blit_resized(&mut self.back, &region, x, y, tile_size);
                true
            }
            None => false,
        }
    }

    fn draw_overlays(
        &mut self,
        window: &TileWindow,
        view: &ViewState,
        center_x: f64,
    ) -> Result<usize, BufferError> {
        let cancel = self.cancel.clone();
        let mut target = OverlayTarget::new(
            &mut self.back,
            *window,
            self.context.projection(),
            *view,
            center_x,
            &cancel,
        );

        let mut errors = 0;
        let overlays = self
            .overlays
            .iter()
            .map(|overlay| overlay.as_ref())
            .chain(std::iter::once(&self.markers as &dyn Overlay));

        for overlay in overlays {
            if cancel.is_cancelled() {
                return Err(BufferError::Disposed);
            }
            if let Err(e) = overlay.draw(&mut target) {
                warn!("Overlay '{}' failed: {}", overlay.name(), e);
                errors += 1;
            }
        }
        Ok(errors)
    }

    fn extract(&mut self, view: &ViewState) -> Result<(), BufferError> {
        let (x, y) = self.front_offset;
        let completed = if self.options.generate_smart_buffer {
            let size = (view.width / 2, view.height / 2);
            if self.smart.dimensions() != size {
                self.smart = RgbaImage::new(size.0, size.1);
            }
            raster::downsample_half(&self.back, x, y, &mut self.smart, &self.cancel)
        } else {
            raster::extract(&self.back, x, y, &mut self.front, &self.cancel)
        };

        if completed {
            Ok(())
        } else {
            Err(BufferError::Disposed)
        }
    }

    fn check_cancelled(&self) -> Result<(), BufferError> {
        if self.cancel.is_cancelled() {
            Err(BufferError::Disposed)
        } else {
            Ok(())
        }
    }

    // =========================================================================
    // Teardown
    // =========================================================================

    /// Halt any cycle, release every tile and drop the pixel buffers.
    pub fn dispose(&mut self) {
        self.cancel.cancel();
        self.status.set(BufferStatus::Disposed);

        let tiles = self.context.registry().drain();
        let count = tiles.len();
        for tile in tiles {
            tile.dispose();
        }
        self.context.completed().drain();

        self.back = RgbaImage::new(0, 0);
        self.front = RgbaImage::new(0, 0);
        self.smart = RgbaImage::new(0, 0);
        self.window = None;
        self.previous = None;
        debug!("Buffer disposed, released {} tile(s)", count);
    }
}

impl std::fmt::Debug for MapBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MapBuffer")
            .field("status", &self.status.get())
            .field("window", &self.window)
            .field("front_offset", &self.front_offset)
            .field("overlays", &self.overlays.len())
            .field("markers", &self.markers.len())
            .finish()
    }
}
