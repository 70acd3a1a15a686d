//! Shared map context.
//!
//! A [`MapContext`] owns the state that the compositor, the fetch pipeline
//! and the evictor share: the tile registry, the completion queue, the
//! projection and the canonical tile size. Everything tied to one map lives
//! and dies with its context.

use std::sync::Arc;

use crate::geo::Projection;
use crate::tile::{CompletionQueue, TileRegistry, DEFAULT_TILE_SIZE};

/// Shared state for one map.
#[derive(Clone)]
pub struct MapContext {
    registry: Arc<TileRegistry>,
    completed: Arc<CompletionQueue>,
    projection: Projection,
}

impl MapContext {
    /// Create a context with 256px tiles and spherical Mercator.
    pub fn new() -> Self {
        Self::with_options(DEFAULT_TILE_SIZE, Projection::default())
    }

    /// Create a context with a custom tile size and projection.
    pub fn with_options(tile_size: u32, projection: Projection) -> Self {
        Self {
            registry: Arc::new(TileRegistry::new(tile_size)),
            completed: Arc::new(CompletionQueue::new()),
            projection,
        }
    }

    pub fn registry(&self) -> &Arc<TileRegistry> {
        &self.registry
    }

    /// Queue of tiles whose pixels arrived since the last cycle.
    pub fn completed(&self) -> &Arc<CompletionQueue> {
        &self.completed
    }

    pub fn projection(&self) -> Projection {
        self.projection
    }

    pub fn tile_size(&self) -> u32 {
        self.registry.tile_size()
    }
}

impl Default for MapContext {
    fn default() -> Self {
        Self::new()
    }
}
