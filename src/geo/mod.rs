//! Geographic coordinates and map projections.

mod projection;

pub use projection::{grid_size, GeoPoint, Projection, MAX_LATITUDE};
