//! Tile Registry: the arena that owns every live tile.
//!
//! Tiles are keyed by [`TileKey`]; parent/child relations are key arithmetic
//! resolved through the registry, so the registry holds the only owning
//! references and dropping an entry is enough to release a tile.
//!
//! # Locking
//!
//! Adding, removing and iterating the full set take the registry mutex.
//! The fetch pipeline, the compositor and the evictor all contend for it, so
//! callers keep critical sections short: no I/O, decoding or blitting happens
//! while the lock is held.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::TileError;

use super::key::TileKey;
use super::model::{Tile, TileStatus};

/// Default canonical tile edge length in pixels.
pub const DEFAULT_TILE_SIZE: u32 = 256;

/// Result of resolving a window of tile keys in one critical section.
#[derive(Debug, Default)]
pub struct Resolution {
    /// Resolved tile per requested key, `None` where the key was `None`
    pub tiles: Vec<Option<Arc<Tile>>>,

    /// Tiles created by this resolution (window tiles and ancestors)
    pub created: Vec<Arc<Tile>>,
}

/// Which ancestors of window tiles are kept alive during a resolution.
#[derive(Debug, Clone, Copy)]
pub struct AncestorPolicy {
    /// How many zoom levels above each window tile are marked used
    pub levels: u8,

    /// Missing ancestors are created only above this zoom
    pub min_create_zoom: u8,
}

/// Process-independent registry of live tiles.
pub struct TileRegistry {
    tiles: Mutex<HashMap<TileKey, Arc<Tile>>>,
    tile_size: u32,
}

impl TileRegistry {
    /// Create an empty registry for tiles of `tile_size` pixels.
    pub fn new(tile_size: u32) -> Self {
        Self {
            tiles: Mutex::new(HashMap::new()),
            tile_size,
        }
    }

    pub fn tile_size(&self) -> u32 {
        self.tile_size
    }

    pub fn get(&self, key: &TileKey) -> Option<Arc<Tile>> {
        self.tiles.lock().get(key).cloned()
    }

    pub fn contains(&self, key: &TileKey) -> bool {
        self.tiles.lock().contains_key(key)
    }

    /// Register a new tile.
    ///
    /// Fails if the key is already present. The parent link is recorded when
    /// the parent is registered; it need not be loaded.
    pub fn create(&self, key: TileKey) -> Result<Arc<Tile>, TileError> {
        let mut tiles = self.tiles.lock();
        if tiles.contains_key(&key) {
            return Err(TileError::AlreadyExists(key));
        }
        Ok(Self::insert_locked(&mut tiles, key, self.tile_size))
    }

    /// Look up a tile, creating it if absent. The flag is `true` on creation.
    pub fn get_or_create(&self, key: TileKey) -> (Arc<Tile>, bool) {
        let mut tiles = self.tiles.lock();
        if let Some(tile) = tiles.get(&key) {
            return (Arc::clone(tile), false);
        }
        (Self::insert_locked(&mut tiles, key, self.tile_size), true)
    }

    fn insert_locked(
        tiles: &mut HashMap<TileKey, Arc<Tile>>,
        key: TileKey,
        tile_size: u32,
    ) -> Arc<Tile> {
        let parent = key.parent().filter(|p| tiles.contains_key(p));
        let tile = Arc::new(Tile::new(key, tile_size, parent));

        // Children registered before their parent pick up the link now
        if let Some(children) = key.children() {
            for child in children.iter().filter_map(|c| tiles.get(c)) {
                child.set_parent(key);
            }
        }

        tiles.insert(key, Arc::clone(&tile));
        tile
    }

    /// Remove a tile from the registry without disposing it.
    pub fn remove(&self, key: &TileKey) -> Option<Arc<Tile>> {
        self.tiles.lock().remove(key)
    }

    pub fn len(&self) -> usize {
        self.tiles.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiles.lock().is_empty()
    }

    /// Snapshot of all registered keys, sorted.
    pub fn keys(&self) -> Vec<TileKey> {
        let mut keys: Vec<TileKey> = self.tiles.lock().keys().copied().collect();
        keys.sort();
        keys
    }

    /// Count registered tiles per status.
    pub fn status_counts(&self) -> HashMap<TileStatus, usize> {
        let tiles: Vec<Arc<Tile>> = self.tiles.lock().values().cloned().collect();
        let mut counts = HashMap::new();
        for tile in tiles {
            *counts.entry(tile.status()).or_insert(0) += 1;
        }
        counts
    }

    /// Resolve a window of keys in one critical section.
    ///
    /// Clears every `used` flag, then resolves or creates each key and marks
    /// it used. With an ancestor policy, existing ancestors up to
    /// `policy.levels` above each tile are marked used and missing ones above
    /// `policy.min_create_zoom` are created.
    pub fn resolve_window(
        &self,
        keys: &[Option<TileKey>],
        ancestors: Option<AncestorPolicy>,
    ) -> Resolution {
        let mut resolution = Resolution {
            tiles: Vec::with_capacity(keys.len()),
            created: Vec::new(),
        };

        let mut tiles = self.tiles.lock();
        for tile in tiles.values() {
            tile.set_used(false);
        }

        for key in keys {
            let Some(key) = *key else {
                resolution.tiles.push(None);
                continue;
            };

            let tile = match tiles.get(&key) {
                Some(tile) => Arc::clone(tile),
                None => {
                    let tile = Self::insert_locked(&mut tiles, key, self.tile_size);
                    resolution.created.push(Arc::clone(&tile));
                    tile
                }
            };
            tile.set_used(true);

            if let Some(policy) = ancestors {
                let floor = key
                    .zoom
                    .saturating_sub(policy.levels)
                    .max(policy.min_create_zoom);

                for level in 1..=policy.levels {
                    let Some(ancestor_key) = key.ancestor(level) else {
                        break;
                    };
                    let ancestor = match tiles.get(&ancestor_key) {
                        Some(existing) => Arc::clone(existing),
                        None if ancestor_key.zoom > floor => {
                            let created =
                                Self::insert_locked(&mut tiles, ancestor_key, self.tile_size);
                            resolution.created.push(Arc::clone(&created));
                            created
                        }
                        None => continue,
                    };
                    ancestor.set_used(true);
                }
            }

            resolution.tiles.push(Some(tile));
        }

        resolution
    }

    /// Nearest loaded ancestor of `key`, searching at most `max_levels` up.
    ///
    /// Returns the ancestor and how many levels above `key` it sits.
    pub fn loaded_ancestor(&self, key: &TileKey, max_levels: u8) -> Option<(Arc<Tile>, u8)> {
        for level in 1..=max_levels {
            let ancestor_key = key.ancestor(level)?;
            let ancestor = match self.get(&ancestor_key) {
                Some(tile) => tile,
                None => return None,
            };
            if ancestor.is_loaded() {
                return Some((ancestor, level));
            }
        }
        None
    }

    /// Remove every tile that is unused and not pinned.
    ///
    /// The removed tiles are returned undisposed so the caller can dispose
    /// them after the lock is released.
    pub fn take_unused(&self) -> Vec<Arc<Tile>> {
        let mut tiles = self.tiles.lock();
        let doomed: Vec<TileKey> = tiles
            .iter()
            .filter(|(_, tile)| !tile.is_used() && !tile.is_locked())
            .map(|(key, _)| *key)
            .collect();

        doomed
            .into_iter()
            .filter_map(|key| tiles.remove(&key))
            .collect()
    }

    /// Remove and return every tile.
    pub fn drain(&self) -> Vec<Arc<Tile>> {
        self.tiles.lock().drain().map(|(_, tile)| tile).collect()
    }
}

impl Default for TileRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_TILE_SIZE)
    }
}

/// Tiles whose pixels arrived since the compositor last looked.
///
/// The fetch pipeline pushes completed tiles; the compositor drains the
/// queue at the start of each cycle.
#[derive(Default)]
pub struct CompletionQueue {
    tiles: Mutex<Vec<Arc<Tile>>>,
}

impl CompletionQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, tile: Arc<Tile>) {
        self.tiles.lock().push(tile);
    }

    pub fn drain(&self) -> Vec<Arc<Tile>> {
        std::mem::take(&mut *self.tiles.lock())
    }

    pub fn len(&self) -> usize {
        self.tiles.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiles.lock().is_empty()
    }
}
