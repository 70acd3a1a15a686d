//! # map-buffer
//!
//! A tile pyramid cache and raster compositor for interactive online maps.
//!
//! The library keeps a zoom pyramid of map tiles, fetches missing imagery
//! asynchronously, and composites the visible tiles into an oversized backing
//! buffer from which a viewport-sized frame is extracted every cycle. Missing
//! detail is synthesized from loaded parent tiles, and tiles that leave the
//! window are evicted once no reader holds them.
//!
//! ## Features
//!
//! - **Parent fallback**: blurry-but-present imagery from up to five ancestor levels
//! - **Antimeridian wrapping**: seamless horizontal panning across the date line
//! - **Async fetching**: bounded concurrent fetches on tokio with an LRU byte cache
//! - **Overlays and markers**: alpha-blended markers with zoom ranges and custom ordering
//! - **Threaded mode**: an optional dedicated compositing thread with a status handoff
//!
//! ## Architecture
//!
//! The library is organized into several modules:
//!
//! - [`geo`] - Mercator projections between coordinates and tile space
//! - [`tile`] - Tile model, keys and the tile registry
//! - [`fetch`] - Tile sources, decoding, raw byte cache and the fetch pipeline
//! - [`compositor`] - Tile window, backing/front buffers, eviction and worker
//! - [`overlay`] - Overlay boundary and the marker layer
//! - [`view`] - View state and providers
//! - [`display`] - Display sinks for extracted frames
//! - [`config`] - CLI and configuration types
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use map_buffer::{
//!     BufferOptions, DirectorySource, FetchOptions, FetchPipeline, MapBuffer, MapContext,
//!     ViewState,
//! };
//!
//! #[tokio::main]
//! async fn main() {
//!     let context = MapContext::new();
//!     let pipeline = FetchPipeline::new(
//!         DirectorySource::new("/srv/tiles"),
//!         &context,
//!         FetchOptions::default(),
//!         tokio::runtime::Handle::current(),
//!     );
//!
//!     let mut buffer = MapBuffer::new(context, Arc::new(pipeline), BufferOptions::default());
//!     let view = ViewState::new(2.35, 48.85, 12, 800, 600);
//!
//!     tokio::task::spawn_blocking(move || {
//!         let report = buffer.run_cycle(&view).unwrap();
//!         println!("copied {} tiles", report.copied);
//!     })
//!     .await
//!     .unwrap();
//! }
//! ```

pub mod compositor;
pub mod config;
pub mod context;
pub mod display;
pub mod error;
pub mod fetch;
pub mod geo;
pub mod overlay;
pub mod tile;
pub mod view;

// Re-export commonly used types
pub use compositor::{
    BufferOptions, BufferStatus, BufferWorker, CancelToken, CycleReport, EvictionManager,
    EvictionOutcome, HoldOff, MapBuffer, RedrawType, TileWindow,
};
pub use config::{Cli, Command, OutputFormat, RenderConfig, WindowConfig};
pub use context::MapContext;
pub use display::{DisplaySink, LatestFrame, PngSink};
pub use error::{BufferError, FetchError, OverlayError, TileError};
pub use fetch::{
    DirectorySource, FetchOptions, FetchPipeline, FetchStats, RawTileCache, TileDecoder,
    TileLoader, TileSource,
};
pub use geo::{GeoPoint, Projection};
pub use overlay::{Align, Marker, MarkerLayer, Overlay, OverlayTarget, ZoomRange};
pub use tile::{Tile, TileKey, TileRegistry, TileStatus, MAX_ZOOM};
pub use view::{SharedView, ViewProvider, ViewState};
