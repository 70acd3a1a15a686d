//! Cache for fetched (still encoded) tile bytes.
//!
//! Evicted tiles are often requested again when the view pans back. This
//! LRU cache keeps the provider's encoded bytes so a refetch only pays for
//! decoding.
//!
//! # Cache Key
//!
//! Entries are keyed by provider identifier plus tile address, so several
//! providers can share one cache.
//!
//! # Size-Based Eviction
//!
//! The cache tracks the total size of cached bytes and evicts
//! least-recently-used entries when the capacity is exceeded.

use std::sync::Arc;

use bytes::Bytes;
use lru::LruCache;
use tokio::sync::RwLock;

use crate::tile::TileKey;

/// Default cache capacity: 64MB
pub const DEFAULT_RAW_CACHE_CAPACITY: usize = 64 * 1024 * 1024;

/// Default maximum number of entries (to bound LRU overhead)
const DEFAULT_MAX_ENTRIES: usize = 10_000;

// =============================================================================
// Cache Key
// =============================================================================

/// Cache key for encoded tile bytes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RawTileKey {
    /// Provider identifier
    pub provider: Arc<str>,

    /// Tile address
    pub tile: TileKey,
}

impl RawTileKey {
    pub fn new(provider: impl Into<Arc<str>>, tile: TileKey) -> Self {
        Self {
            provider: provider.into(),
            tile,
        }
    }
}

// =============================================================================
// Raw Tile Cache
// =============================================================================

/// LRU cache for encoded tile bytes with size-based capacity.
///
/// # Thread Safety
///
/// The cache is thread-safe and can be shared across async tasks via `Arc`.
///
/// # Example
///
/// ```
/// use map_buffer::fetch::{RawTileCache, RawTileKey};
/// use map_buffer::tile::TileKey;
/// use bytes::Bytes;
///
/// #[tokio::main]
/// async fn main() {
///     let cache = RawTileCache::new();
///
///     let key = RawTileKey::new("osm", TileKey::new(3, 4, 2).unwrap());
///     let png = Bytes::from_static(&[0x89, b'P', b'N', b'G']);
///
///     cache.put(key.clone(), png.clone()).await;
///     assert_eq!(cache.get(&key).await, Some(png));
/// }
/// ```
pub struct RawTileCache {
    cache: RwLock<LruCache<RawTileKey, Bytes>>,

    /// Maximum total size in bytes
    max_size: usize,

    /// Current total size in bytes
    current_size: RwLock<usize>,
}

impl RawTileCache {
    /// Create a cache with default capacity (64MB).
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_RAW_CACHE_CAPACITY)
    }

    /// Create a cache with the specified capacity in bytes.
    pub fn with_capacity(max_size: usize) -> Self {
        Self::with_capacity_and_entries(max_size, DEFAULT_MAX_ENTRIES)
    }

    /// Create a cache with specified capacity and maximum entries.
    ///
    /// A zero entry limit is raised to one.
    pub fn with_capacity_and_entries(max_size: usize, max_entries: usize) -> Self {
        let entries = std::num::NonZeroUsize::new(max_entries).unwrap_or(std::num::NonZeroUsize::MIN);
        Self {
            cache: RwLock::new(LruCache::new(entries)),
            max_size,
            current_size: RwLock::new(0),
        }
    }

    /// Get cached bytes and mark the entry recently used.
    pub async fn get(&self, key: &RawTileKey) -> Option<Bytes> {
        let mut cache = self.cache.write().await;
        cache.get(key).cloned()
    }

    /// Check for an entry without updating LRU order.
    pub async fn contains(&self, key: &RawTileKey) -> bool {
        let cache = self.cache.read().await;
        cache.contains(key)
    }

    /// Store bytes, evicting least-recently-used entries while over capacity.
    pub async fn put(&self, key: RawTileKey, data: Bytes) {
        let data_size = data.len();
        let mut cache = self.cache.write().await;
        let mut current_size = self.current_size.write().await;

        let replaced = match cache.peek(&key) {
            Some(old_data) => {
                *current_size = current_size.saturating_sub(old_data.len());
                true
            }
            None => false,
        };

        // A new key can push out the LRU entry when the entry bound is hit
        if let Some((_, pushed_out)) = cache.push(key, data) {
            if !replaced {
                *current_size = current_size.saturating_sub(pushed_out.len());
            }
        }
        *current_size += data_size;

        while *current_size > self.max_size {
            if let Some((_, evicted_data)) = cache.pop_lru() {
                *current_size = current_size.saturating_sub(evicted_data.len());
            } else {
                break;
            }
        }
    }

    /// Remove an entry, returning its bytes.
    pub async fn remove(&self, key: &RawTileKey) -> Option<Bytes> {
        let mut cache = self.cache.write().await;
        let mut current_size = self.current_size.write().await;

        let data = cache.pop(key)?;
        *current_size = current_size.saturating_sub(data.len());
        Some(data)
    }

    pub async fn clear(&self) {
        let mut cache = self.cache.write().await;
        let mut current_size = self.current_size.write().await;
        cache.clear();
        *current_size = 0;
    }

    pub async fn len(&self) -> usize {
        self.cache.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.cache.read().await.is_empty()
    }

    /// Current total size of cached bytes.
    pub async fn size(&self) -> usize {
        *self.current_size.read().await
    }

    /// Maximum capacity in bytes.
    pub fn capacity(&self) -> usize {
        self.max_size
    }
}

impl Default for RawTileCache {
    fn default() -> Self {
        Self::new()
    }
}
