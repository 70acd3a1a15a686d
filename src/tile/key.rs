//! Tile addressing in the zoom pyramid.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TileError;

/// Highest supported zoom level.
pub const MAX_ZOOM: u8 = 20;

/// Address of one tile in the quad-tile pyramid.
///
/// At zoom `z` the grid is `2^z` tiles wide and high. The parent of
/// `(z, x, y)` is `(z-1, x/2, y/2)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TileKey {
    /// Zoom level (0 = whole world in one tile)
    pub zoom: u8,

    /// Tile X coordinate (0-indexed from the antimeridian, eastwards)
    pub x: u32,

    /// Tile Y coordinate (0-indexed from the north)
    pub y: u32,
}

impl TileKey {
    /// Create a validated tile key.
    pub fn new(zoom: u8, x: u32, y: u32) -> Result<Self, TileError> {
        if zoom > MAX_ZOOM {
            return Err(TileError::InvalidZoom {
                zoom,
                max: MAX_ZOOM,
            });
        }
        let size = grid_dimension(zoom);
        if x >= size || y >= size {
            return Err(TileError::OutOfBounds { zoom, x, y, size });
        }
        Ok(Self { zoom, x, y })
    }

    /// Build a key from unbounded grid coordinates.
    ///
    /// X wraps modulo `2^zoom` so windows can span the antimeridian. Y does
    /// not wrap; rows outside the grid yield `None`.
    pub fn wrapped(zoom: u8, x: i64, y: i64) -> Option<Self> {
        if zoom > MAX_ZOOM {
            return None;
        }
        let size = grid_dimension(zoom) as i64;
        if y < 0 || y >= size {
            return None;
        }
        Some(Self {
            zoom,
            x: x.rem_euclid(size) as u32,
            y: y as u32,
        })
    }

    /// The tile one zoom level up that contains this one.
    pub fn parent(&self) -> Option<TileKey> {
        if self.zoom == 0 {
            return None;
        }
        Some(Self {
            zoom: self.zoom - 1,
            x: self.x / 2,
            y: self.y / 2,
        })
    }

    /// Ancestor `levels` zoom levels up (`ancestor(0)` is the tile itself).
    pub fn ancestor(&self, levels: u8) -> Option<TileKey> {
        if levels > self.zoom {
            return None;
        }
        Some(Self {
            zoom: self.zoom - levels,
            x: self.x >> levels,
            y: self.y >> levels,
        })
    }

    /// The four tiles one zoom level down, row-major.
    pub fn children(&self) -> Option<[TileKey; 4]> {
        if self.zoom >= MAX_ZOOM {
            return None;
        }
        let zoom = self.zoom + 1;
        let (x, y) = (self.x * 2, self.y * 2);
        Some([
            Self { zoom, x, y },
            Self { zoom, x: x + 1, y },
            Self { zoom, x, y: y + 1 },
            Self {
                zoom,
                x: x + 1,
                y: y + 1,
            },
        ])
    }
}

impl fmt::Display for TileKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.zoom, self.x, self.y)
    }
}

/// Number of tiles along one axis at `zoom`.
#[inline]
pub fn grid_dimension(zoom: u8) -> u32 {
    1u32 << zoom
}
