//! Integration tests for map-buffer.
//!
//! These tests verify end-to-end functionality including:
//! - Window placement and antimeridian wrapping
//! - Parent fallback when detail tiles are missing or failed
//! - Fetching from tile directories through the async pipeline
//! - Eviction with pins and the hold-off
//! - Threaded mode with a display sink

mod integration {
    pub mod test_utils;

    pub mod compositor_tests;
    pub mod eviction_tests;
    pub mod fetch_tests;
}
