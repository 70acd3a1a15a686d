//! Bitmap markers composited over the tiles.

use std::cmp::Ordering;
use std::sync::Arc;

use image::RgbaImage;
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::error::OverlayError;
use crate::geo::GeoPoint;
use crate::tile::MAX_ZOOM;

use super::{Overlay, OverlayTarget};

/// Which point of the marker image sits on its geographic position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Align {
    TopLeft,
    Top,
    TopRight,
    Left,
    Center,
    Right,
    BottomLeft,
    #[default]
    Bottom,
    BottomRight,
}

impl Align {
    /// Top-left corner of a `width x height` image anchored at `(x, y)`.
    pub fn top_left(&self, x: i64, y: i64, width: u32, height: u32) -> (i64, i64) {
        let (w, h) = (width as i64, height as i64);
        let dx = match self {
            Align::TopLeft | Align::Left | Align::BottomLeft => 0,
            Align::Top | Align::Center | Align::Bottom => w / 2,
            Align::TopRight | Align::Right | Align::BottomRight => w,
        };
        let dy = match self {
            Align::TopLeft | Align::Top | Align::TopRight => 0,
            Align::Left | Align::Center | Align::Right => h / 2,
            Align::BottomLeft | Align::Bottom | Align::BottomRight => h,
        };
        (x - dx, y - dy)
    }
}

/// Inclusive zoom range in which a marker is drawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZoomRange {
    pub min: u8,
    pub max: u8,
}

impl ZoomRange {
    pub fn new(min: u8, max: u8) -> Self {
        Self { min, max }
    }

    pub fn in_range(&self, zoom: u8) -> bool {
        zoom >= self.min && zoom <= self.max
    }

    pub fn clamp(&self, zoom: u8) -> u8 {
        zoom.clamp(self.min, self.max.max(self.min))
    }
}

impl Default for ZoomRange {
    fn default() -> Self {
        Self::new(0, MAX_ZOOM)
    }
}

/// An image pinned to a geographic position.
#[derive(Debug, Clone)]
pub struct Marker {
    pub position: GeoPoint,
    pub image: Arc<RgbaImage>,
    pub align: Align,
    pub range: ZoomRange,
    pub enabled: bool,
    pub label: Option<String>,
}

impl Marker {
    pub fn new(position: GeoPoint, image: Arc<RgbaImage>) -> Self {
        Self {
            position,
            image,
            align: Align::default(),
            range: ZoomRange::default(),
            enabled: true,
            label: None,
        }
    }

    pub fn with_align(mut self, align: Align) -> Self {
        self.align = align;
        self
    }

    pub fn with_range(mut self, range: ZoomRange) -> Self {
        self.range = range;
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    fn is_visible(&self, zoom: u8) -> bool {
        self.enabled && self.range.in_range(zoom)
    }
}

/// Custom ordering of visible markers, drawn first to last.
pub type MarkerSort = Box<dyn Fn(&mut Vec<&Marker>) + Send + Sync>;

/// Default draw order: north to south, then west to east.
///
/// Southern markers are drawn last and end up in front.
pub fn default_order(a: &Marker, b: &Marker) -> Ordering {
    b.position
        .latitude
        .total_cmp(&a.position.latitude)
        .then_with(|| a.position.longitude.total_cmp(&b.position.longitude))
}

/// Overlay drawing all markers of a map.
#[derive(Default)]
pub struct MarkerLayer {
    markers: Vec<Marker>,
    sort: Option<MarkerSort>,
}

impl MarkerLayer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, marker: Marker) {
        self.markers.push(marker);
    }

    pub fn remove(&mut self, index: usize) -> Option<Marker> {
        if index < self.markers.len() {
            Some(self.markers.remove(index))
        } else {
            None
        }
    }

    pub fn clear(&mut self) {
        self.markers.clear();
    }

    pub fn markers(&self) -> &[Marker] {
        &self.markers
    }

    pub fn markers_mut(&mut self) -> &mut Vec<Marker> {
        &mut self.markers
    }

    pub fn len(&self) -> usize {
        self.markers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.markers.is_empty()
    }

    /// Replace the default draw order.
    pub fn set_sort<F>(&mut self, sort: F)
    where
        F: Fn(&mut Vec<&Marker>) + Send + Sync + 'static,
    {
        self.sort = Some(Box::new(sort));
    }

    pub fn clear_sort(&mut self) {
        self.sort = None;
    }

    /// Markers visible at `zoom`, in draw order.
    pub fn draw_order(&self, zoom: u8) -> Vec<&Marker> {
        let mut visible: Vec<&Marker> = self.markers.iter().filter(|m| m.is_visible(zoom)).collect();
        match &self.sort {
            Some(sort) => sort(&mut visible),
            None => visible.sort_by(|a, b| default_order(a, b)),
        }
        visible
    }
}

impl std::fmt::Debug for MarkerLayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MarkerLayer")
            .field("markers", &self.markers.len())
            .field("custom_sort", &self.sort.is_some())
            .finish()
    }
}

impl Overlay for MarkerLayer {
    fn name(&self) -> &str {
        "markers"
    }

    fn draw(&self, target: &mut OverlayTarget<'_>) -> Result<(), OverlayError> {
        for marker in self.draw_order(target.zoom()) {
            if target.is_cancelled() {
                return Ok(());
            }
            let image = marker.image.as_ref();
            if image.width() == 0 || image.height() == 0 {
                continue;
            }

            let (px, py) = target.to_buffer(marker.position);
            let (x, y) = marker
                .align
                .top_left(px as i64, py as i64, image.width(), image.height());
            trace!("Drawing marker at ({}, {})", x, y);
            target.draw_image(image, x, y);
        }
        Ok(())
    }
}
