//! Tile fetch pipeline.
//!
//! Missing tiles are handed to a [`TileLoader`]. The provided loader,
//! [`FetchPipeline`], fetches encoded bytes from a [`TileSource`], decodes
//! them off the async workers, applies the pixels to the tile and queues the
//! tile for the compositor.
//!
//! # Components
//!
//! - [`TileLoader`]: the compositor's view of the fetch collaborator
//! - [`TileSource`]: opaque provider returning encoded bytes
//! - [`DirectorySource`]: provider reading `{z}/{x}/{y}.png` from disk
//! - [`FetchPipeline`]: async loader with bounded concurrency
//! - [`RawTileCache`]: LRU cache of encoded bytes
//! - [`TileDecoder`]: PNG/JPEG to RGBA decoding

mod cache;
mod decoder;
mod pipeline;
mod source;

use std::sync::Arc;

use crate::tile::Tile;

pub use cache::{RawTileCache, RawTileKey, DEFAULT_RAW_CACHE_CAPACITY};
pub use decoder::{encode_png, TileDecoder};
pub use pipeline::{FetchOptions, FetchPipeline, FetchStats, DEFAULT_MAX_CONCURRENT_FETCHES};
pub use source::{DirectorySource, TileSource};

/// Receives tiles that need imagery.
///
/// Implementations must return quickly: `enqueue` is called by the
/// compositor right after a window is resolved. The loader owns retry
/// policy; the compositor never re-requests a tile on its own.
pub trait TileLoader: Send + Sync {
    fn enqueue(&self, tile: Arc<Tile>);
}
