//! Visible tile window and viewport geometry.
//!
//! The window covers the viewport plus a one-tile margin on every side:
//!
//! ```text
//!   origin (bufferPosition)
//!     ┌──────┬──────┬──────┬──────┐
//!     │      │      │      │      │
//!     ├──────┼──────┼──────┼──────┤
//!     │      │ ┌────┼────┐ │      │
//!     │      │ │ viewport│ │      │
//!     ├──────┼─┼────┼────┼─┼──────┤
//!     │      │ └────┼────┘ │      │
//!     ├──────┼──────┼──────┼──────┤
//!     │      │      │      │      │
//!     └──────┴──────┴──────┴──────┘
//!              countX = ceil(width / tileSize) + 2
//! ```
//!
//! X is never clamped: columns left of 0 or right of `2^zoom` wrap around the
//! antimeridian. Y is clamped so the window stays on the grid when it can.

use serde::Serialize;

use crate::geo::{grid_size, GeoPoint, Projection};
use crate::tile::{grid_dimension, TileKey};
use crate::view::ViewState;

/// The grid of tiles composited into the backing buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TileWindow {
    pub zoom: u8,

    /// Grid X of the left column; may be outside `[0, 2^zoom)`
    pub origin_x: i64,

    /// Grid Y of the top row
    pub origin_y: i64,

    pub count_x: u32,
    pub count_y: u32,
    pub tile_size: u32,
}

/// One cell of a [`TileWindow`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WindowCell {
    pub column: u32,
    pub row: u32,

    /// Wrapped tile address, `None` for rows outside the grid
    pub key: Option<TileKey>,
}

impl TileWindow {
    /// Window for a viewport of `width x height` pixels centered on the
    /// fractional tile coordinates `(center_x, center_y)`.
    pub fn compute(
        center_x: f64,
        center_y: f64,
        zoom: u8,
        width: u32,
        height: u32,
        tile_size: u32,
    ) -> Self {
        let count_x = width.div_ceil(tile_size) + 2;
        let count_y = height.div_ceil(tile_size) + 2;

        let origin_x = center_x.floor() as i64 - (count_x / 2) as i64;
        let mut origin_y = center_y.floor() as i64 - (count_y / 2) as i64;

        // Clamp order matters when the window is taller than the grid
        let max_y = grid_dimension(zoom) as i64;
        if origin_y < 0 {
            origin_y = 0;
        }
        if origin_y >= max_y - count_y as i64 {
            origin_y = max_y - count_y as i64;
        }

        Self {
            zoom,
            origin_x,
            origin_y,
            count_x,
            count_y,
            tile_size,
        }
    }

    /// `(origin_x, origin_y)` of the window.
    pub fn position(&self) -> (i64, i64) {
        (self.origin_x, self.origin_y)
    }

    pub fn pixel_width(&self) -> u32 {
        self.count_x * self.tile_size
    }

    pub fn pixel_height(&self) -> u32 {
        self.count_y * self.tile_size
    }

    pub fn cell_count(&self) -> usize {
        (self.count_x * self.count_y) as usize
    }

    /// All cells, row-major.
    pub fn cells(&self) -> Vec<WindowCell> {
        let mut cells = Vec::with_capacity(self.cell_count());
        for row in 0..self.count_y {
            for column in 0..self.count_x {
                cells.push(WindowCell {
                    column,
                    row,
                    key: TileKey::wrapped(
                        self.zoom,
                        self.origin_x + column as i64,
                        self.origin_y + row as i64,
                    ),
                });
            }
        }
        cells
    }

    /// Keys of all cells, row-major.
    pub fn keys(&self) -> Vec<Option<TileKey>> {
        self.cells().into_iter().map(|cell| cell.key).collect()
    }

    /// Pixel offset of a cell in the backing buffer.
    pub fn cell_offset(&self, column: u32, row: u32) -> (i64, i64) {
        (
            column as i64 * self.tile_size as i64,
            row as i64 * self.tile_size as i64,
        )
    }

    /// Whether `key`, or any part of it at window zoom, is in the window.
    ///
    /// Tiles deeper than the window zoom never affect it.
    pub fn covers(&self, key: &TileKey) -> bool {
        if key.zoom > self.zoom {
            return false;
        }
        let levels = self.zoom - key.zoom;
        let span = 1i64 << levels;
        let grid = grid_dimension(self.zoom) as i64;

        let top = key.y as i64 * span;
        let bottom = top + span;
        let rows_hit =
            top < self.origin_y + self.count_y as i64 && bottom > self.origin_y;
        if !rows_hit {
            return false;
        }

        let left = key.x as i64 * span;
        (0..self.count_x as i64).any(|column| {
            let x = (self.origin_x + column).rem_euclid(grid);
            x >= left && x < left + span
        })
    }

    /// Top-left of the viewport inside the backing buffer.
    ///
    /// `center_x` must be the same (possibly unwrapped) center the window was
    /// computed from. Rows are clamped to the buffer; columns are clamped
    /// defensively.
    pub fn front_offset(&self, center_x: f64, center_y: f64, width: u32, height: u32) -> (u32, u32) {
        let s = self.tile_size as f64;
        let left = center_x - width as f64 / s / 2.0 - self.origin_x as f64;
        let top = center_y - height as f64 / s / 2.0 - self.origin_y as f64;

        let max_x = self.pixel_width().saturating_sub(width) as i64;
        let max_y = self.pixel_height().saturating_sub(height) as i64;

        let ix = ((left * s).floor() as i64).clamp(0, max_x);
        let iy = ((top * s).floor() as i64).clamp(0, max_y);
        (ix as u32, iy as u32)
    }
}

/// Shift `center_x` by whole worlds so it stays continuous with `previous`.
///
/// Panning across the antimeridian would otherwise move the center from
/// `2^zoom - ε` to `ε` and jump the window across the whole grid.
pub fn continuous_center_x(center_x: f64, zoom: u8, previous: Option<f64>) -> f64 {
    let Some(previous) = previous else {
        return center_x;
    };
    let world = grid_size(zoom);
    let delta = previous - center_x;
    if delta.abs() <= world / 2.0 {
        return center_x;
    }
    center_x + (delta / world).round() * world
}

/// Geographic corners `(top_left, bottom_right)` of the viewport.
///
/// When one world exactly fills the viewport width, the corners sit just
/// either side of the meridian opposite the center.
pub fn viewport_corners(view: &ViewState, projection: Projection, tile_size: u32) -> (GeoPoint, GeoPoint) {
    let s = tile_size as f64;
    let half_w = view.width as f64 / s / 2.0;
    let half_h = view.height as f64 / s / 2.0;

    let (cx, cy) = projection.coordinates_to_tile(view.longitude, view.latitude, view.zoom);
    let (mut tlx, tly) = projection.tile_to_coordinates(cx - half_w, cy - half_h, view.zoom);
    let (mut brx, bry) = projection.tile_to_coordinates(cx + half_w, cy + half_h, view.zoom);

    let world_width = grid_size(view.zoom) * s;
    if world_width == view.width as f64 {
        let opposite = view.longitude + 180.0;
        tlx = opposite + 0.001;
        brx = opposite - 0.001;
    }

    (
        GeoPoint::new(normalize_longitude(tlx), tly),
        GeoPoint::new(normalize_longitude(brx), bry),
    )
}

fn normalize_longitude(longitude: f64) -> f64 {
    (longitude + 180.0).rem_euclid(360.0) - 180.0
}
