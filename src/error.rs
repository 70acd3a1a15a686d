use thiserror::Error;

use crate::tile::TileKey;

/// Errors that can occur while fetching or decoding tile imagery
#[derive(Debug, Clone, Error)]
pub enum FetchError {
    /// The provider has no imagery for this tile
    #[error("Tile not found: {0}")]
    NotFound(String),

    /// Network, filesystem or connection error reported by the provider
    #[error("Connection error: {0}")]
    Connection(String),

    /// The fetched bytes could not be decoded as an image
    #[error("Decode error: {message}")]
    Decode { message: String },

    /// The fetch task was aborted before completion
    #[error("Fetch cancelled for {0}")]
    Cancelled(TileKey),
}

/// Errors related to tile identity and tile pixel data
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TileError {
    /// A tile with the same key is already registered
    #[error("Tile already exists: {0}")]
    AlreadyExists(TileKey),

    /// Zoom level above the supported maximum
    #[error("Invalid zoom level {zoom}: maximum is {max}")]
    InvalidZoom { zoom: u8, max: u8 },

    /// Coordinates outside the tile grid of the zoom level
    #[error("Tile ({x}, {y}) out of bounds at zoom {zoom}: grid is {size}x{size}")]
    OutOfBounds { zoom: u8, x: u32, y: u32, size: u32 },

    /// Decoded pixels do not match the canonical tile size
    #[error("Invalid pixel size: expected {expected}x{expected}, got {width}x{height}")]
    InvalidPixelSize {
        expected: u32,
        width: u32,
        height: u32,
    },
}

/// Errors raised by overlay collaborators while drawing into the backing buffer
#[derive(Debug, Clone, Error)]
pub enum OverlayError {
    /// The overlay failed to draw
    #[error("Overlay '{name}' failed: {message}")]
    Draw { name: String, message: String },
}

/// Errors that abort a compositing cycle
#[derive(Debug, Clone, Error)]
pub enum BufferError {
    /// The buffer was disposed before or during the cycle
    #[error("Buffer disposed")]
    Disposed,

    /// The view cannot be rendered
    #[error("Invalid view: {0}")]
    InvalidView(String),

    /// An overlay failed while drawing
    #[error("Overlay error: {0}")]
    Overlay(#[from] OverlayError),

    /// A tile operation failed
    #[error("Tile error: {0}")]
    Tile(#[from] TileError),
}
