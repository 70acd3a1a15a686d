//! Compositor scenario tests.
//!
//! Tests verify:
//! - Horizontal wrapping across the antimeridian
//! - Parent fallback sampling one and two levels up
//! - Fallback covering the whole cell for tile sizes that are not powers of two
//! - Rebuilds are deterministic for an unchanged placement
//! - Panning reuses loaded tiles
//! - Whole-world views duplicate the seam columns

use std::collections::HashSet;
use std::sync::Arc;

use image::Rgba;

use map_buffer::compositor::RedrawType;
use map_buffer::{MapBuffer, TileStatus};

use super::test_utils::{
    context, fast_options, gradient, key, keyed, solid, view_at_tile, PaintLoader,
};

const SIZE: u32 = 256;

fn keyed_loader() -> Arc<PaintLoader> {
    Arc::new(PaintLoader::new(|key| Some(keyed(SIZE, key))))
}

// =============================================================================
// Wrapping
// =============================================================================

#[test]
fn test_column_left_of_grid_wraps_to_last_column() {
    let loader = keyed_loader();
    let mut buffer = MapBuffer::new(context(SIZE), loader.clone(), fast_options());

    // Just east of the antimeridian at zoom 5: window origin is column -1
    let view = view_at_tile(0.05, 16.5, 5, SIZE, SIZE);
    let report = buffer.run_cycle(&view).unwrap();

    let window = report.window.unwrap();
    assert_eq!(window.origin_x, -1);
    assert_eq!(window.keys()[0], Some(key(5, 31, window.origin_y as u32)));

    let back = buffer.back_buffer();
    assert_eq!(back.get_pixel(10, 10)[0], 31);
    assert_eq!(back.get_pixel(SIZE + 10, 10)[0], 0);
    assert_eq!(back.get_pixel(2 * SIZE + 10, 10)[0], 1);
    assert!(loader.requested().contains(&key(5, 31, window.origin_y as u32)));
}

#[test]
fn test_whole_world_seam_columns_match() {
    let loader = Arc::new(PaintLoader::new(|key| Some(gradient(SIZE, key.x as u8 * 100))));
    let mut buffer = MapBuffer::new(context(SIZE), loader, fast_options());

    // One world exactly fills the viewport at zoom 1
    let view = view_at_tile(1.0, 1.0, 1, 2 * SIZE, 2 * SIZE);
    let report = buffer.run_cycle(&view).unwrap();
    let window = report.window.unwrap();
    assert_eq!((window.count_x, window.origin_x), (4, -1));

    let back = buffer.back_buffer();
    for y in (0..back.height()).step_by(37) {
        for x in 0..SIZE {
            assert_eq!(
                back.get_pixel(x, y),
                back.get_pixel(x + 2 * SIZE, y),
                "seam mismatch at ({}, {})",
                x,
                y
            );
        }
    }

    let (top_left, bottom_right) = buffer.corners().unwrap();
    assert!((top_left.longitude - -179.999).abs() < 1e-6);
    assert!((bottom_right.longitude - 179.999).abs() < 1e-6);
}

// =============================================================================
// Parent Fallback
// =============================================================================

#[test]
fn test_missing_tile_upscales_parent_quadrant() {
    let context = context(SIZE);
    let parent = context.registry().create(key(2, 2, 2)).unwrap();
    parent.apply_pixels(gradient(SIZE, 7)).unwrap();

    let mut buffer = MapBuffer::new(context, Arc::new(PaintLoader::failing()), fast_options());

    // Tile (3, 4, 4) sits in column 1, row 1 of the window
    let view = view_at_tile(4.5, 4.5, 3, SIZE, SIZE);
    let report = buffer.run_cycle(&view).unwrap();
    assert_eq!(report.window.unwrap().position(), (3, 3));
    assert!(report.fallback >= 1);

    let tile = buffer
        .context()
        .registry()
        .get(&key(3, 4, 4))
        .unwrap();
    assert_eq!(tile.status(), TileStatus::Error);

    let back = buffer.back_buffer();
    for j in (0..SIZE / 2).step_by(5) {
        for i in (0..SIZE / 2).step_by(3) {
            let expected = Rgba([i as u8, j as u8, 7, 255]);
            assert_eq!(back.get_pixel(SIZE + 2 * i, SIZE + 2 * j), &expected);
            assert_eq!(back.get_pixel(SIZE + 2 * i + 1, SIZE + 2 * j + 1), &expected);
        }
    }
}

#[test]
fn test_fallback_skips_unloaded_intermediate_level() {
    let context = context(SIZE);
    let grandparent = context.registry().create(key(2, 2, 2)).unwrap();
    grandparent.apply_pixels(gradient(SIZE, 9)).unwrap();

    let mut buffer = MapBuffer::new(context, Arc::new(PaintLoader::failing()), fast_options());

    // Tile (4, 9, 9): its parent (3, 4, 4) is created but fails to load
    let view = view_at_tile(9.5, 9.5, 4, SIZE, SIZE);
    let report = buffer.run_cycle(&view).unwrap();
    assert_eq!(report.window.unwrap().position(), (8, 8));
    assert!(buffer.context().registry().contains(&key(3, 4, 4)));

    // Quadrant (1, 1) of (3, 4, 4) is block (64, 64, 64) of (2, 2, 2), scaled 4x
    let back = buffer.back_buffer();
    for j in (0..64).step_by(7) {
        for i in (0..64).step_by(7) {
            let expected = Rgba([(64 + i) as u8, (64 + j) as u8, 9, 255]);
            assert_eq!(back.get_pixel(SIZE + 4 * i, SIZE + 4 * j), &expected);
            assert_eq!(back.get_pixel(SIZE + 4 * i + 3, SIZE + 4 * j + 3), &expected);
        }
    }
}

#[test]
fn test_fallback_fills_whole_cell_for_uneven_tile_size() {
    const UNEVEN: u32 = 100;
    let context = context(UNEVEN);
    context.registry().create(key(2, 2, 2)).unwrap();
    let ancestor = context.registry().create(key(1, 1, 1)).unwrap();
    ancestor.apply_pixels(solid(UNEVEN, [200, 30, 90, 255])).unwrap();

    let mut buffer = MapBuffer::new(context, Arc::new(PaintLoader::failing()), fast_options());

    // Tile (4, 8, 8) is three levels below (1, 1, 1); its 12 pixel block is
    // scaled to the full 100 pixel cell
    let view = view_at_tile(8.5, 8.5, 4, UNEVEN, UNEVEN);
    let report = buffer.run_cycle(&view).unwrap();
    assert_eq!(report.window.unwrap().position(), (7, 7));
    assert!(report.fallback >= 1);

    let back = buffer.back_buffer();
    for j in 0..UNEVEN {
        for i in 0..UNEVEN {
            assert_eq!(
                back.get_pixel(UNEVEN + i, UNEVEN + j),
                &Rgba([200, 30, 90, 255]),
                "pixel ({}, {}) of the cell was not filled",
                i,
                j
            );
        }
    }
}

#[test]
fn test_no_loaded_ancestor_leaves_cell_pending() {
    let mut buffer = MapBuffer::new(context(SIZE), Arc::new(PaintLoader::failing()), fast_options());
    let report = buffer.run_cycle(&view_at_tile(4.5, 4.5, 3, SIZE, SIZE)).unwrap();

    assert_eq!(report.copied, 0);
    assert_eq!(report.fallback, 0);
    assert_eq!(report.pending, 9);
    assert!(!report.is_settled());
    assert!(buffer.back_buffer().pixels().all(|p| p[3] == 0));
}

// =============================================================================
// Rebuild and Panning
// =============================================================================

#[test]
fn test_full_rebuild_is_deterministic() {
    let mut buffer = MapBuffer::new(context(SIZE), keyed_loader(), fast_options());
    let view = view_at_tile(10.3, 12.7, 5, 600, 400);

    buffer.run_cycle(&view).unwrap();
    let first_back = buffer.back_buffer().clone();
    let first_front = buffer.front_buffer().clone();

    buffer.redraw(RedrawType::Full);
    let report = buffer.run_cycle(&view).unwrap();
    assert!(report.rebuilt);
    assert_eq!(buffer.back_buffer(), &first_back);
    assert_eq!(buffer.front_buffer(), &first_front);
}

#[test]
fn test_pan_one_tile_shifts_origin_without_refetch() {
    let loader = keyed_loader();
    let mut buffer = MapBuffer::new(context(SIZE), loader.clone(), fast_options());

    let first = buffer
        .run_cycle(&view_at_tile(8.5, 8.5, 4, SIZE, SIZE))
        .unwrap()
        .window
        .unwrap();
    let second = buffer
        .run_cycle(&view_at_tile(9.5, 8.5, 4, SIZE, SIZE))
        .unwrap()
        .window
        .unwrap();

    assert_eq!(second.origin_x, first.origin_x + 1);
    assert_eq!(second.origin_y, first.origin_y);

    let requested = loader.requested();
    let unique: HashSet<_> = requested.iter().collect();
    assert_eq!(unique.len(), requested.len(), "a loaded tile was requested twice");

    // Only the new column of window tiles was fetched at zoom 4
    let zoom4: Vec<_> = requested.iter().filter(|k| k.zoom == 4).collect();
    assert_eq!(zoom4.len(), 9 + 3);
}

#[test]
fn test_small_pan_inside_window_only_moves_front() {
    let mut buffer = MapBuffer::new(context(SIZE), keyed_loader(), fast_options());

    buffer.run_cycle(&view_at_tile(8.2, 8.5, 4, SIZE, SIZE)).unwrap();
    let (x0, _) = buffer.front_offset();

    let report = buffer.run_cycle(&view_at_tile(8.6, 8.5, 4, SIZE, SIZE)).unwrap();
    assert!(!report.rebuilt);

    let (x1, _) = buffer.front_offset();
    assert!(x1 > x0);
    assert!(((x1 - x0) as i64 - (0.4 * SIZE as f64) as i64).abs() <= 1);
}
