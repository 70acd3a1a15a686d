//! Overlays drawn into the backing buffer after the tiles.
//!
//! Overlays run only in cycles that rebuilt the backing buffer, in
//! registration order, followed by the marker layer. Each overlay receives an
//! [`OverlayTarget`] describing the buffer's placement on the map.

mod marker;

use image::imageops;
use image::RgbaImage;

use crate::compositor::{CancelToken, TileWindow};
use crate::error::OverlayError;
use crate::geo::{grid_size, GeoPoint, Projection};
use crate::view::ViewState;

pub use marker::{Align, Marker, MarkerLayer, MarkerSort, ZoomRange};

/// Drawing collaborator invoked once per rebuilding cycle.
pub trait Overlay: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &str;

    /// Draw into the backing buffer in place.
    fn draw(&self, target: &mut OverlayTarget<'_>) -> Result<(), OverlayError>;
}

/// The backing buffer plus its geographic placement.
pub struct OverlayTarget<'a> {
    pixels: &'a mut RgbaImage,
    window: TileWindow,
    projection: Projection,
    view: ViewState,
    center_x: f64,
    cancel: &'a CancelToken,
}

impl<'a> OverlayTarget<'a> {
    /// `center_x` is the fractional tile X the window was computed from.
    pub fn new(
        pixels: &'a mut RgbaImage,
        window: TileWindow,
        projection: Projection,
        view: ViewState,
        center_x: f64,
        cancel: &'a CancelToken,
    ) -> Self {
        Self {
            pixels,
            window,
            projection,
            view,
            center_x,
            cancel,
        }
    }

    pub fn pixels(&self) -> &RgbaImage {
        &*self.pixels
    }

    pub fn pixels_mut(&mut self) -> &mut RgbaImage {
        &mut *self.pixels
    }

    pub fn window(&self) -> &TileWindow {
        &self.window
    }

    pub fn zoom(&self) -> u8 {
        self.window.zoom
    }

    pub fn tile_size(&self) -> u32 {
        self.window.tile_size
    }

    pub fn projection(&self) -> Projection {
        self.projection
    }

    pub fn view(&self) -> &ViewState {
        &self.view
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Backing-buffer pixel position of a geographic point.
    ///
    /// Of all wrapped copies of the point, the one nearest the viewport
    /// center is returned.
    pub fn to_buffer(&self, point: GeoPoint) -> (f64, f64) {
        let zoom = self.window.zoom;
        let world = grid_size(zoom);
        let (tx, ty) = self.projection.point_to_tile(point, zoom);

        let mut px = tx - self.window.origin_x as f64;
        let py = ty - self.window.origin_y as f64;

        let anchor = self.center_x - self.window.origin_x as f64;
        px += ((anchor - px) / world).round() * world;

        let s = self.window.tile_size as f64;
        (px * s, py * s)
    }

    /// Alpha-blend an image with its top-left corner at `(x, y)`.
    ///
    /// Returns `false` without drawing if the cycle was cancelled.
    pub fn draw_image(&mut self, image: &RgbaImage, x: i64, y: i64) -> bool {
        if self.is_cancelled() {
            return false;
        }
        imageops::overlay(&mut *self.pixels, image, x, y);
        true
    }
}
