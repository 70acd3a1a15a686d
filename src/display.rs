//! Display sinks receiving the front buffer after each cycle.

use std::path::{Path, PathBuf};

use image::RgbaImage;
use parking_lot::Mutex;
use tracing::{debug, warn};

/// Consumer of extracted front buffers.
///
/// Called once per completed cycle from the compositor thread. The sink
/// decides when and how the frame is shown.
pub trait DisplaySink: Send + Sync {
    fn present(&self, frame: &RgbaImage);
}

/// Keeps a copy of the most recent frame.
#[derive(Debug, Default)]
pub struct LatestFrame {
    frame: Mutex<Option<RgbaImage>>,
    presented: Mutex<u64>,
}

impl LatestFrame {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clone of the last presented frame.
    pub fn frame(&self) -> Option<RgbaImage> {
        self.frame.lock().clone()
    }

    /// Take the last frame, leaving the slot empty.
    pub fn take(&self) -> Option<RgbaImage> {
        self.frame.lock().take()
    }

    /// Number of frames presented so far.
    pub fn presented(&self) -> u64 {
        *self.presented.lock()
    }
}

impl DisplaySink for LatestFrame {
    fn present(&self, frame: &RgbaImage) {
        let mut slot = self.frame.lock();
        match slot.as_mut() {
            // Reuse the allocation when the viewport size is unchanged
            Some(existing) if existing.dimensions() == frame.dimensions() => {
                existing.copy_from_slice(frame.as_raw());
            }
            _ => *slot = Some(frame.clone()),
        }
        *self.presented.lock() += 1;
    }
}

/// Writes every presented frame to a PNG file, overwriting it.
#[derive(Debug, Clone)]
pub struct PngSink {
    path: PathBuf,
}

impl PngSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write `frame` now, returning any encoding or I/O error.
    pub fn write(&self, frame: &RgbaImage) -> image::ImageResult<()> {
        frame.save_with_format(&self.path, image::ImageFormat::Png)
    }
}

impl DisplaySink for PngSink {
    fn present(&self, frame: &RgbaImage) {
        match self.write(frame) {
            Ok(()) => debug!("Wrote frame to {}", self.path.display()),
            Err(e) => warn!("Failed to write frame to {}: {}", self.path.display(), e),
        }
    }
}
