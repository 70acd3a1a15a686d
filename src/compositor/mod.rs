//! Compositor: turns registered tiles into the frame a display shows.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                          MapBuffer cycle                         │
//! │                                                                  │
//! │  view ──► TileWindow ──► registry.resolve_window ──► loader      │
//! │                               │                                  │
//! │                               ▼                                  │
//! │               backing buffer (window + 1 tile margin)            │
//! │          tile blit │ ancestor fallback │ clear off-grid          │
//! │                               │                                  │
//! │                               ▼                                  │
//! │                  overlays, then markers                          │
//! │                               │                                  │
//! │                               ▼                                  │
//! │          front buffer (or half-res smart buffer) ──► sink        │
//! │                               │                                  │
//! │                               ▼                                  │
//! │                     eviction of unused tiles                     │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A [`MapBuffer`] can be driven synchronously with
//! [`MapBuffer::run_cycle`], or moved onto a dedicated thread with
//! [`BufferWorker`] and driven through the status handoff.

mod buffer;
mod eviction;
pub mod raster;
mod status;
mod window;
mod worker;

pub use buffer::{
    BufferOptions, CycleReport, MapBuffer, DEFAULT_MIN_PARENT_ZOOM, DEFAULT_PARENT_LEVELS,
    DEFAULT_PIXEL_WAIT,
};
pub use eviction::{EvictionManager, EvictionOutcome, HoldOff, HoldOffGuard, DEFAULT_UNLOAD_WAIT};
pub use status::{BufferStatus, CancelToken, RedrawType, StatusCell};
pub use window::{continuous_center_x, viewport_corners, TileWindow, WindowCell};
pub use worker::{BufferWorker, DEFAULT_WORKER_TICK};
