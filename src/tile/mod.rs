//! Tile data model.
//!
//! This module provides the tile pyramid: addressing, per-tile pixel state,
//! and the registry that owns every live tile.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │        Compositor / Fetch Pipeline      │
//! └────────────────────┬────────────────────┘
//!                      │
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │              TileRegistry               │
//! │  HashMap<TileKey, Arc<Tile>> (arena)    │
//! └────────────────────┬────────────────────┘
//!                      │
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │                  Tile                   │
//! │  status + Arc<RgbaImage> snapshot       │
//! │  used flag, pin count                   │
//! └─────────────────────────────────────────┘
//! ```
//!
//! # Components
//!
//! - [`TileKey`]: `(zoom, x, y)` address with parent/child arithmetic
//! - [`Tile`]: one tile's imagery and lifecycle
//! - [`TileRegistry`]: the only owner of tiles, keyed by [`TileKey`]
//! - [`CompletionQueue`]: tiles whose pixels arrived since the last cycle
//!
//! # Example
//!
//! ```
//! use map_buffer::tile::{TileKey, TileRegistry};
//!
//! let registry = TileRegistry::new(256);
//!
//! // X wraps around the antimeridian before lookup
//! let key = TileKey::wrapped(5, -1, 10).unwrap();
//! assert_eq!(key.x, 31);
//!
//! let (tile, created) = registry.get_or_create(key);
//! assert!(created);
//! assert!(tile.begin_loading());
//! ```

mod key;
mod model;
mod registry;

pub use key::{grid_dimension, TileKey, MAX_ZOOM};
pub use model::{Tile, TilePin, TileStatus};
pub use registry::{AncestorPolicy, CompletionQueue, Resolution, TileRegistry, DEFAULT_TILE_SIZE};
