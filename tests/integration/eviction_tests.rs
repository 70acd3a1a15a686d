//! Eviction integration tests.
//!
//! Tests verify:
//! - Tiles that leave the window are disposed after a rebuild
//! - Ancestors of visible tiles survive a zoom change
//! - Pinned tiles outlive the pass that would evict them
//! - Eviction waits for a hold-off released by another thread

use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use map_buffer::compositor::{BufferOptions, RedrawType};
use map_buffer::{MapBuffer, TileStatus};

use super::test_utils::{context, fast_options, key, keyed, view_at_tile, PaintLoader};

const SIZE: u32 = 16;

fn buffer_with(options: BufferOptions) -> MapBuffer {
    let loader = Arc::new(PaintLoader::new(|key| Some(keyed(SIZE, key))));
    MapBuffer::new(context(SIZE), loader, options)
}

#[test]
fn test_zoom_in_keeps_ancestors_and_drops_old_window() {
    let mut buffer = buffer_with(fast_options());

    let first = buffer.run_cycle(&view_at_tile(4.5, 4.5, 3, SIZE, SIZE)).unwrap();
    assert_eq!(first.evicted, Some(0));
    assert_eq!(buffer.context().registry().len(), 9);

    // Window (8..=10, 8..=10) at zoom 4 has parents (4..=5, 4..=5) at zoom 3
    let second = buffer.run_cycle(&view_at_tile(9.0, 9.0, 4, SIZE, SIZE)).unwrap();
    assert_eq!(second.evicted, Some(5));

    let registry = buffer.context().registry();
    assert_eq!(registry.len(), 13);
    assert!(registry.contains(&key(3, 4, 4)));
    assert!(registry.contains(&key(3, 5, 5)));
    assert!(!registry.contains(&key(3, 3, 3)));
    for k in registry.keys() {
        assert!(registry.get(&k).unwrap().is_used(), "{} kept but unused", k);
    }
}

#[test]
fn test_pinned_tile_survives_until_released() {
    let mut buffer = buffer_with(fast_options());
    buffer.run_cycle(&view_at_tile(4.5, 4.5, 3, SIZE, SIZE)).unwrap();

    let tile = buffer.context().registry().get(&key(3, 3, 3)).unwrap();
    let pin = tile.pin();

    // Pan two columns east: columns 3 and 4 leave the window
    let report = buffer.run_cycle(&view_at_tile(6.5, 4.5, 3, SIZE, SIZE)).unwrap();
    assert_eq!(report.evicted, Some(5));
    assert!(buffer.context().registry().contains(&key(3, 3, 3)));
    assert_eq!(tile.status(), TileStatus::Loaded);

    drop(pin);
    buffer.redraw(RedrawType::Full);
    let report = buffer.run_cycle(&view_at_tile(6.5, 4.5, 3, SIZE, SIZE)).unwrap();
    assert_eq!(report.evicted, Some(1));
    assert_eq!(tile.status(), TileStatus::Disposed);
}

#[test]
fn test_eviction_waits_for_hold_off_release() {
    let mut buffer = buffer_with(BufferOptions {
        unload_wait: Duration::from_secs(2),
        ..fast_options()
    });
    buffer.run_cycle(&view_at_tile(4.5, 4.5, 3, SIZE, SIZE)).unwrap();

    let hold_off = Arc::clone(buffer.hold_off());
    let (held_tx, held_rx) = mpsc::channel();
    let reader = thread::spawn(move || {
        let _guard = hold_off.hold();
        held_tx.send(()).unwrap();
        thread::sleep(Duration::from_millis(30));
    });

    held_rx.recv().unwrap();
    let report = buffer.run_cycle(&view_at_tile(5.5, 4.5, 3, SIZE, SIZE)).unwrap();
    reader.join().unwrap();

    // Column 3 left the window once the reader let go
    assert_eq!(report.evicted, Some(3));
    assert!(!buffer.context().registry().contains(&key(3, 3, 4)));
}
