//! Fetch pipeline for orchestrating tile loading.
//!
//! The pipeline is the bridge between the compositor and a [`TileSource`]:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                         FetchPipeline                            │
//! │  ┌─────────────────────────────────────────────────────────┐    │
//! │  │                       load()                            │    │
//! │  │  1. Acquire permit     4. Decode (blocking pool)        │    │
//! │  │  2. Check raw cache    5. Apply pixels to tile          │    │
//! │  │  3. Fetch from source  6. Queue completion              │    │
//! │  └─────────────────────────────────────────────────────────┘    │
//! │           │                    │                    │            │
//! │           ▼                    ▼                    ▼            │
//! │    ┌─────────────┐      ┌──────────────┐    ┌─────────────────┐ │
//! │    │ RawTileCache│      │  TileSource  │    │   TileDecoder   │ │
//! │    └─────────────┘      └──────────────┘    └─────────────────┘ │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A tile evicted while its fetch is in flight is skipped before fetching
//! and ignored by [`Tile::apply_pixels`] afterwards.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tokio::runtime::Handle;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use crate::context::MapContext;
use crate::error::FetchError;
use crate::tile::{CompletionQueue, Tile};

use super::cache::{RawTileCache, RawTileKey, DEFAULT_RAW_CACHE_CAPACITY};
use super::decoder::TileDecoder;
use super::source::TileSource;
use super::TileLoader;

/// Default number of concurrent fetches.
pub const DEFAULT_MAX_CONCURRENT_FETCHES: usize = 8;

/// Tunables for the fetch pipeline.
#[derive(Debug, Clone)]
pub struct FetchOptions {
    /// Maximum fetches in flight at once
    pub max_concurrent: usize,

    /// Capacity of the raw byte cache in bytes
    pub cache_capacity: usize,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            max_concurrent: DEFAULT_MAX_CONCURRENT_FETCHES,
            cache_capacity: DEFAULT_RAW_CACHE_CAPACITY,
        }
    }
}

/// Counters describing pipeline activity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FetchStats {
    pub requested: u64,
    pub loaded: u64,
    pub failed: u64,
    pub cache_hits: u64,
    pub discarded: u64,
}

impl FetchStats {
    /// Requests that have not yet been counted as loaded, failed or discarded.
    pub fn in_flight(&self) -> u64 {
        self.requested
            .saturating_sub(self.loaded)
            .saturating_sub(self.failed)
            .saturating_sub(self.discarded)
    }
}

#[derive(Default)]
struct Counters {
    requested: AtomicU64,
    loaded: AtomicU64,
    failed: AtomicU64,
    cache_hits: AtomicU64,
    discarded: AtomicU64,
}

struct PipelineInner<S> {
    source: S,
    cache: RawTileCache,
    decoder: TileDecoder,
    completed: Arc<CompletionQueue>,
    limiter: Semaphore,
    counters: Counters,
}

/// Asynchronous tile loader backed by a [`TileSource`].
///
/// # Type Parameters
///
/// * `S` - The tile source (e.g. [`DirectorySource`](super::DirectorySource))
///
/// # Example
///
/// ```ignore
/// use map_buffer::fetch::{DirectorySource, FetchOptions, FetchPipeline, TileLoader};
///
/// let pipeline = FetchPipeline::new(
///     DirectorySource::new("./tiles"),
///     &context,
///     FetchOptions::default(),
///     tokio::runtime::Handle::current(),
/// );
/// pipeline.enqueue(tile);
/// ```
pub struct FetchPipeline<S: TileSource> {
    inner: Arc<PipelineInner<S>>,
    runtime: Handle,
}

impl<S: TileSource + 'static> FetchPipeline<S> {
    /// Create a pipeline that spawns fetch tasks on `runtime`.
    pub fn new(source: S, context: &MapContext, options: FetchOptions, runtime: Handle) -> Self {
        Self {
            inner: Arc::new(PipelineInner {
                source,
                cache: RawTileCache::with_capacity(options.cache_capacity),
                decoder: TileDecoder::new(context.tile_size()),
                completed: Arc::clone(context.completed()),
                limiter: Semaphore::new(options.max_concurrent.max(1)),
                counters: Counters::default(),
            }),
            runtime,
        }
    }

    /// Fetch, decode and apply one tile, awaiting completion.
    ///
    /// Returns `Ok(true)` when pixels were applied and `Ok(false)` when the
    /// tile was disposed before they arrived. On failure the tile is marked
    /// [`TileStatus::Error`](crate::tile::TileStatus::Error).
    pub async fn load(&self, tile: Arc<Tile>) -> Result<bool, FetchError> {
        self.inner.load(tile).await
    }

    /// Snapshot of the counters.
    ///
    /// Outcome counters are read before `requested`, so a snapshot never
    /// shows a finished request as still in flight.
    pub fn stats(&self) -> FetchStats {
        let c = &self.inner.counters;
        let loaded = c.loaded.load(Ordering::SeqCst);
        let failed = c.failed.load(Ordering::SeqCst);
        let discarded = c.discarded.load(Ordering::SeqCst);
        FetchStats {
            requested: c.requested.load(Ordering::SeqCst),
            loaded,
            failed,
            cache_hits: c.cache_hits.load(Ordering::Relaxed),
            discarded,
        }
    }

    pub fn cache(&self) -> &RawTileCache {
        &self.inner.cache
    }

    pub fn source(&self) -> &S {
        &self.inner.source
    }
}

impl<S: TileSource + 'static> TileLoader for FetchPipeline<S> {
    fn enqueue(&self, tile: Arc<Tile>) {
        if !tile.begin_loading() {
            return;
        }
        let inner = Arc::clone(&self.inner);
        self.runtime.spawn(async move {
            let key = tile.key();
            if let Err(e) = inner.load(tile).await {
                warn!("Tile {} failed: {}", key, e);
            }
        });
    }
}

impl<S: TileSource> PipelineInner<S> {
    async fn load(&self, tile: Arc<Tile>) -> Result<bool, FetchError> {
        let key = tile.key();
        self.counters.requested.fetch_add(1, Ordering::SeqCst);

        let _permit = match self.limiter.acquire().await {
            Ok(permit) => permit,
            Err(_) => {
                tile.mark_error();
                self.counters.failed.fetch_add(1, Ordering::SeqCst);
                return Err(FetchError::Cancelled(key));
            }
        };

        if tile.is_disposed() {
            debug!("Skipping fetch for disposed tile {}", key);
            self.counters.discarded.fetch_add(1, Ordering::SeqCst);
            return Ok(false);
        }

        let result = self.fetch_and_decode(&tile).await;
        let pixels = match result {
            Ok(pixels) => pixels,
            Err(e) => {
                tile.mark_error();
                self.counters.failed.fetch_add(1, Ordering::SeqCst);
                return Err(e);
            }
        };

        // The completion is queued before the request stops counting as in
        // flight
        match tile.apply_pixels(pixels) {
            Ok(true) => {
                debug!("Tile {} loaded", key);
                self.completed.push(tile);
                self.counters.loaded.fetch_add(1, Ordering::SeqCst);
                Ok(true)
            }
            Ok(false) => {
                debug!("Discarding pixels for disposed tile {}", key);
                self.counters.discarded.fetch_add(1, Ordering::SeqCst);
                Ok(false)
            }
            Err(e) => {
                tile.mark_error();
                self.counters.failed.fetch_add(1, Ordering::SeqCst);
                Err(FetchError::Decode {
                    message: e.to_string(),
                })
            }
        }
    }

    async fn fetch_and_decode(&self, tile: &Tile) -> Result<image::RgbaImage, FetchError> {
        let key = tile.key();
        let cache_key = RawTileKey::new(self.source.provider_id(), key);

        let bytes = match self.cache.get(&cache_key).await {
            Some(bytes) => {
                self.counters.cache_hits.fetch_add(1, Ordering::Relaxed);
                bytes
            }
            None => {
                let bytes = self.source.fetch(key).await?;
                self.cache.put(cache_key, bytes.clone()).await;
                bytes
            }
        };

        let decoder = self.decoder.clone();
        tokio::task::spawn_blocking(move || decoder.decode(&bytes))
            .await
            .map_err(|_| FetchError::Cancelled(key))?
    }
}
