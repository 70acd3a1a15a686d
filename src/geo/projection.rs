//! Map projections between geographic and fractional tile coordinates.
//!
//! Both projections share the longitude mapping; they differ in how latitude
//! is stretched. Tile coordinates are fractional: the integer part selects the
//! tile, the fractional part is the position inside it.

use std::f64::consts::PI;

use serde::{Deserialize, Serialize};

/// Latitude limit of the square Mercator world.
pub const MAX_LATITUDE: f64 = 85.051_128_78;

/// First eccentricity of the WGS84 ellipsoid.
const WGS84_ECCENTRICITY: f64 = 0.081_819_190_842_6;

/// Iterations used when inverting the ellipsoidal latitude.
const WGS84_INVERSE_ITERATIONS: usize = 15;

/// A geographic position in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub longitude: f64,
    pub latitude: f64,
}

impl GeoPoint {
    pub fn new(longitude: f64, latitude: f64) -> Self {
        Self {
            longitude,
            latitude,
        }
    }
}

/// Supported map projections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Projection {
    /// Spherical (web) Mercator used by most online tile providers
    #[default]
    SphericalMercator,
    /// Ellipsoidal Mercator on the WGS84 datum
    Wgs84Mercator,
}

impl Projection {
    /// Convert longitude/latitude to fractional tile coordinates at `zoom`.
    ///
    /// The returned X is normalized into `[0, 2^zoom)`; Y is clamped to the
    /// grid.
    pub fn coordinates_to_tile(&self, longitude: f64, latitude: f64, zoom: u8) -> (f64, f64) {
        let n = grid_size(zoom);
        let x = ((longitude + 180.0) / 360.0 * n).rem_euclid(n);

        let lat = latitude.clamp(-MAX_LATITUDE, MAX_LATITUDE);
        let y = match self {
            Projection::SphericalMercator => {
                let sin = (lat * PI / 180.0).sin();
                0.5 - ((1.0 + sin) / (1.0 - sin)).ln() / (4.0 * PI)
            }
            Projection::Wgs84Mercator => {
                let phi = lat * PI / 180.0;
                let con = WGS84_ECCENTRICITY * phi.sin();
                let northing = ((PI / 4.0 + phi / 2.0).tan()
                    * ((1.0 - con) / (1.0 + con)).powf(WGS84_ECCENTRICITY / 2.0))
                .ln();
                0.5 - northing / (2.0 * PI)
            }
        };

        (x, (y * n).clamp(0.0, n))
    }

    /// Convert fractional tile coordinates at `zoom` back to longitude/latitude.
    pub fn tile_to_coordinates(&self, tile_x: f64, tile_y: f64, zoom: u8) -> (f64, f64) {
        let n = grid_size(zoom);
        let longitude = tile_x / n * 360.0 - 180.0;
        let northing = (0.5 - tile_y / n) * 2.0 * PI;

        let latitude = match self {
            Projection::SphericalMercator => northing.sinh().atan() * 180.0 / PI,
            Projection::Wgs84Mercator => {
                let ts = (-northing).exp();
                let mut phi = PI / 2.0 - 2.0 * ts.atan();
                for _ in 0..WGS84_INVERSE_ITERATIONS {
                    let con = WGS84_ECCENTRICITY * phi.sin();
                    let next = PI / 2.0
                        - 2.0
                            * (ts * ((1.0 - con) / (1.0 + con)).powf(WGS84_ECCENTRICITY / 2.0))
                                .atan();
                    if (next - phi).abs() < 1e-12 {
                        phi = next;
                        break;
                    }
                    phi = next;
                }
                phi * 180.0 / PI
            }
        };

        (longitude, latitude)
    }

    /// Convert a [`GeoPoint`] to fractional tile coordinates.
    pub fn point_to_tile(&self, point: GeoPoint, zoom: u8) -> (f64, f64) {
        self.coordinates_to_tile(point.longitude, point.latitude, zoom)
    }
}

/// Number of tiles along one axis at `zoom`, as a float.
#[inline]
pub fn grid_size(zoom: u8) -> f64 {
    (1u64 << zoom) as f64
}
