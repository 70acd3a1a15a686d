//! View state read by the compositor once per cycle.

use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::BufferError;
use crate::geo::GeoPoint;
use crate::tile::MAX_ZOOM;

/// Map center, zoom and viewport size in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ViewState {
    pub longitude: f64,
    pub latitude: f64,
    pub zoom: u8,
    pub width: u32,
    pub height: u32,
}

impl ViewState {
    pub fn new(longitude: f64, latitude: f64, zoom: u8, width: u32, height: u32) -> Self {
        Self {
            longitude,
            latitude,
            zoom,
            width,
            height,
        }
    }

    pub fn center(&self) -> GeoPoint {
        GeoPoint::new(self.longitude, self.latitude)
    }

    /// Same view moved to another center.
    pub fn with_center(mut self, longitude: f64, latitude: f64) -> Self {
        self.longitude = longitude;
        self.latitude = latitude;
        self
    }

    /// Check that the view can be rendered.
    pub fn validate(&self) -> Result<(), BufferError> {
        if self.width == 0 || self.height == 0 {
            return Err(BufferError::InvalidView(format!(
                "viewport must be non-empty, got {}x{}",
                self.width, self.height
            )));
        }
        if self.zoom > MAX_ZOOM {
            return Err(BufferError::InvalidView(format!(
                "zoom {} exceeds maximum {}",
                self.zoom, MAX_ZOOM
            )));
        }
        if !self.longitude.is_finite() || !self.latitude.is_finite() {
            return Err(BufferError::InvalidView(
                "center coordinates must be finite".to_string(),
            ));
        }
        Ok(())
    }
}

/// Source of the current view.
pub trait ViewProvider: Send + Sync {
    fn current(&self) -> ViewState;
}

impl<T: ViewProvider + ?Sized> ViewProvider for Arc<T> {
    fn current(&self) -> ViewState {
        (**self).current()
    }
}

impl ViewProvider for ViewState {
    fn current(&self) -> ViewState {
        *self
    }
}

/// View shared between a control thread and the compositor.
#[derive(Debug)]
pub struct SharedView {
    state: RwLock<ViewState>,
}

impl SharedView {
    pub fn new(state: ViewState) -> Self {
        Self {
            state: RwLock::new(state),
        }
    }

    pub fn set(&self, state: ViewState) {
        *self.state.write() = state;
    }

    /// Move the center, keeping zoom and viewport.
    pub fn set_center(&self, longitude: f64, latitude: f64) {
        let mut state = self.state.write();
        state.longitude = longitude;
        state.latitude = latitude;
    }

    pub fn set_zoom(&self, zoom: u8) {
        self.state.write().zoom = zoom;
    }
}

impl ViewProvider for SharedView {
    fn current(&self) -> ViewState {
        *self.state.read()
    }
}
