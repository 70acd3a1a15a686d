//! Fetch pipeline integration tests.
//!
//! Tests verify:
//! - Directory sources feed the compositor end to end
//! - Failed fetches fall back to parents and are not retried
//! - Tiles of the wrong size are rejected
//! - Pixels arriving after disposal are discarded

use std::sync::Arc;
use std::time::Duration;

use image::Rgba;
use tempfile::TempDir;
use tokio::runtime::Handle;

use map_buffer::fetch::{FetchOptions, FetchPipeline, TileLoader};
use map_buffer::{
    BufferWorker, DirectorySource, FetchError, LatestFrame, MapBuffer, SharedView, Tile, TileStatus,
};

use super::test_utils::{
    context, eventually, fast_options, key, keyed, solid, view_at_tile, write_tile, MockTileSource,
};

const SIZE: u32 = 16;

// =============================================================================
// Directory Source
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_directory_tiles_reach_front_buffer() {
    let dir = TempDir::new().unwrap();
    for x in 0..8 {
        for y in 0..8 {
            write_tile(dir.path(), key(3, x, y), &solid(SIZE, [20, 40, 60, 255]));
        }
    }

    let context = context(SIZE);
    let pipeline = Arc::new(FetchPipeline::new(
        DirectorySource::new(dir.path()),
        &context,
        FetchOptions::default(),
        Handle::current(),
    ));
    let mut buffer = MapBuffer::new(context, pipeline.clone(), fast_options());
    let view = view_at_tile(4.0, 4.0, 3, 2 * SIZE, 2 * SIZE);

    let settled = tokio::task::spawn_blocking(move || {
        for _ in 0..500 {
            let report = buffer.run_cycle(&view).unwrap();
            if report.is_settled() {
                return Some(buffer);
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        None
    })
    .await
    .unwrap()
    .expect("view never settled");

    assert!(settled
        .front_buffer()
        .pixels()
        .all(|p| *p == Rgba([20, 40, 60, 255])));
    assert!(pipeline.stats().loaded >= 16);
}

#[tokio::test]
async fn test_missing_file_marks_error_once() {
    let dir = TempDir::new().unwrap();
    let context = context(SIZE);
    let pipeline = FetchPipeline::new(
        DirectorySource::new(dir.path()),
        &context,
        FetchOptions::default(),
        Handle::current(),
    );

    let tile = context.registry().create(key(4, 1, 1)).unwrap();
    assert!(tile.begin_loading());
    assert!(pipeline.load(Arc::clone(&tile)).await.is_err());
    assert_eq!(tile.status(), TileStatus::Error);
    assert_eq!(pipeline.stats().failed, 1);
    assert!(context.completed().is_empty());
}

// =============================================================================
// Failure Fallback
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_failed_tiles_use_parent_and_are_not_retried() {
    // Only zoom 3 exists; every zoom 4 fetch fails
    let source = MockTileSource::new().with_zoom(3, |k| keyed(SIZE, k));
    let context = context(SIZE);
    let pipeline = Arc::new(FetchPipeline::new(
        source.clone(),
        &context,
        FetchOptions::default(),
        Handle::current(),
    ));
    let mut buffer = MapBuffer::new(context, pipeline.clone(), fast_options());
    let view = view_at_tile(8.5, 8.5, 4, SIZE, SIZE);

    let buffer = tokio::task::spawn_blocking(move || {
        for _ in 0..400 {
            let report = buffer.run_cycle(&view).unwrap();
            if report.fallback == 9 {
                break;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        buffer
    })
    .await
    .unwrap();

    // Cell (1, 1) is tile (4, 8, 8), drawn from parent (3, 4, 4)
    let back = buffer.back_buffer();
    assert_eq!(back.get_pixel(SIZE + 1, SIZE + 1), &Rgba([4, 4, 3, 255]));
    assert_eq!(source.fetches_of(key(4, 8, 8)), 1);
}

// =============================================================================
// Decoding
// =============================================================================

#[tokio::test]
async fn test_wrong_size_tile_is_decode_error() {
    let dir = TempDir::new().unwrap();
    write_tile(dir.path(), key(2, 1, 1), &solid(SIZE / 2, [1, 2, 3, 255]));

    let context = context(SIZE);
    let pipeline = FetchPipeline::new(
        DirectorySource::new(dir.path()),
        &context,
        FetchOptions::default(),
        Handle::current(),
    );

    let tile = context.registry().create(key(2, 1, 1)).unwrap();
    let result = pipeline.load(Arc::clone(&tile)).await;
    assert!(matches!(result, Err(FetchError::Decode { .. })));
    assert_eq!(tile.status(), TileStatus::Error);
}

// =============================================================================
// Disposal
// =============================================================================

#[tokio::test]
async fn test_pixels_after_buffer_dispose_are_discarded() {
    let source = MockTileSource::new().with_tile(key(2, 1, 1), &solid(SIZE, [1, 2, 3, 255]));
    let context = context(SIZE);
    let pipeline = FetchPipeline::new(
        source.clone(),
        &context,
        FetchOptions::default(),
        Handle::current(),
    );

    let mut buffer = MapBuffer::new(context.clone(), Arc::new(NullLoader), fast_options());
    let tile = context.registry().create(key(2, 1, 1)).unwrap();
    buffer.dispose();

    assert!(context.registry().is_empty());
    assert!(!pipeline.load(Arc::clone(&tile)).await.unwrap());
    assert_eq!(tile.status(), TileStatus::Disposed);
    assert!(tile.pixels().is_none());
    assert!(context.completed().is_empty());
    assert_eq!(source.fetch_count(), 0);
}

/// Loader that drops every request.
struct NullLoader;

impl TileLoader for NullLoader {
    fn enqueue(&self, _tile: Arc<Tile>) {}
}

// =============================================================================
// Threaded Mode
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_worker_with_pipeline_converges() {
    let source = MockTileSource::new().with_zoom(3, |_| solid(SIZE, [70, 80, 90, 255]));
    let context = context(SIZE);
    let pipeline = Arc::new(FetchPipeline::new(
        source,
        &context,
        FetchOptions::default(),
        Handle::current(),
    ));
    let sink = Arc::new(LatestFrame::new());
    let buffer = MapBuffer::new(context, pipeline, fast_options()).with_sink(sink.clone());
    let view = Arc::new(SharedView::new(view_at_tile(4.0, 4.0, 3, 2 * SIZE, 2 * SIZE)));

    let worker = BufferWorker::spawn(buffer, view).unwrap();

    let converged = eventually(|| {
        worker.request_cycle();
        sink.frame()
            .map(|frame| frame.pixels().all(|p| *p == Rgba([70, 80, 90, 255])))
            .unwrap_or(false)
    })
    .await;
    assert!(converged);
    assert!(worker.cycles() >= 2);

    drop(worker);
}
