//! Configuration for the map-buffer command line tool.
//!
//! This module provides:
//! - Command-line arguments via clap, with one subcommand per tool
//! - Environment variables with `MAPBUF_` prefix
//! - Defaults taken from the library's own constants
//!
//! # Example
//!
//! ```ignore
//! use map_buffer::config::{Cli, Command};
//!
//! let cli = Cli::parse();
//! match cli.into_command() {
//!     Command::Render(config) => println!("rendering z{}", config.view.zoom),
//!     Command::Window(config) => println!("window for z{}", config.view.zoom),
//! }
//! ```
//!
//! # Environment Variables
//!
//! - `MAPBUF_TILES` - Root directory of `{z}/{x}/{y}.{ext}` tiles (required for render)
//! - `MAPBUF_TILE_EXTENSION` - Tile file extension (default: png)
//! - `MAPBUF_TILE_SIZE` - Canonical tile edge in pixels (default: 256)
//! - `MAPBUF_MAX_FETCHES` - Concurrent tile fetches (default: 8)
//! - `MAPBUF_CACHE_SIZE` - Raw tile cache size in bytes (default: 64MB)
//! - `MAPBUF_TIMEOUT_MS` - Render settle timeout in milliseconds (default: 5000)

use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::compositor::BufferOptions;
use crate::fetch::{FetchOptions, DEFAULT_MAX_CONCURRENT_FETCHES, DEFAULT_RAW_CACHE_CAPACITY};
use crate::geo::Projection;
use crate::tile::{DEFAULT_TILE_SIZE, MAX_ZOOM};
use crate::view::ViewState;

// =============================================================================
// Default Values
// =============================================================================

/// Default viewport width in pixels.
pub const DEFAULT_WIDTH: u32 = 800;

/// Default viewport height in pixels.
pub const DEFAULT_HEIGHT: u32 = 600;

/// Default tile file extension.
pub const DEFAULT_TILE_EXTENSION: &str = "png";

/// Default output image path.
pub const DEFAULT_OUTPUT: &str = "frame.png";

/// Default time to wait for the view to settle.
pub const DEFAULT_TIMEOUT_MS: u64 = 5000;

/// Tile sizes outside this range are rejected.
const MIN_TILE_SIZE: u32 = 2;
const MAX_TILE_SIZE: u32 = 4096;

// =============================================================================
// CLI Arguments
// =============================================================================

/// map-buffer - Tile pyramid cache and raster compositor.
///
/// Composites map views from a pyramid of tiles, synthesizing missing detail
/// from loaded parent tiles.
#[derive(Parser, Debug, Clone)]
#[command(name = "map-buffer")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    pub fn into_command(self) -> Command {
        self.command
    }
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Composite a view from a tile directory into a PNG
    Render(RenderConfig),

    /// Print the tile window covering a view
    Window(WindowConfig),
}

/// Output format for command summaries.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// Map projection selectable from the command line.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProjectionArg {
    /// Spherical (web) Mercator
    #[default]
    Mercator,
    /// Ellipsoidal WGS84 Mercator
    Wgs84,
}

impl From<ProjectionArg> for Projection {
    fn from(arg: ProjectionArg) -> Self {
        match arg {
            ProjectionArg::Mercator => Projection::SphericalMercator,
            ProjectionArg::Wgs84 => Projection::Wgs84Mercator,
        }
    }
}

/// View placement shared by every subcommand.
#[derive(Args, Debug, Clone)]
pub struct ViewArgs {
    /// Center longitude in degrees.
    #[arg(long, allow_hyphen_values = true)]
    pub longitude: f64,

    /// Center latitude in degrees.
    #[arg(long, allow_hyphen_values = true)]
    pub latitude: f64,

    /// Zoom level.
    #[arg(short, long)]
    pub zoom: u8,

    /// Viewport width in pixels.
    #[arg(long, default_value_t = DEFAULT_WIDTH)]
    pub width: u32,

    /// Viewport height in pixels.
    #[arg(long, default_value_t = DEFAULT_HEIGHT)]
    pub height: u32,

    /// Canonical tile edge length in pixels.
    #[arg(long, default_value_t = DEFAULT_TILE_SIZE, env = "MAPBUF_TILE_SIZE")]
    pub tile_size: u32,

    /// Map projection.
    #[arg(long, value_enum, default_value_t = ProjectionArg::Mercator)]
    pub projection: ProjectionArg,
}

impl ViewArgs {
    pub fn validate(&self) -> Result<(), String> {
        if !self.longitude.is_finite() || !self.latitude.is_finite() {
            return Err("longitude and latitude must be finite".to_string());
        }
        if self.latitude.abs() > 90.0 {
            return Err(format!("latitude {} is outside -90..90", self.latitude));
        }
        if self.zoom > MAX_ZOOM {
            return Err(format!("zoom must be between 0 and {}", MAX_ZOOM));
        }
        if self.width == 0 || self.height == 0 {
            return Err("width and height must be greater than 0".to_string());
        }

        // Parent fallback halves the sampled block each level
        if !self.tile_size.is_power_of_two()
            || !(MIN_TILE_SIZE..=MAX_TILE_SIZE).contains(&self.tile_size)
        {
            return Err(format!(
                "tile_size must be a power of two between {} and {}",
                MIN_TILE_SIZE, MAX_TILE_SIZE
            ));
        }
        Ok(())
    }

    pub fn view(&self) -> ViewState {
        ViewState::new(
            self.longitude,
            self.latitude,
            self.zoom,
            self.width,
            self.height,
        )
    }

    pub fn projection(&self) -> Projection {
        self.projection.into()
    }
}

// =============================================================================
// Render Command
// =============================================================================

/// Configuration for `map-buffer render`.
#[derive(Args, Debug, Clone)]
pub struct RenderConfig {
    #[command(flatten)]
    pub view: ViewArgs,

    /// Root directory of `{z}/{x}/{y}.{ext}` tiles.
    #[arg(long, env = "MAPBUF_TILES")]
    pub tiles: PathBuf,

    /// Tile file extension.
    #[arg(long, default_value = DEFAULT_TILE_EXTENSION, env = "MAPBUF_TILE_EXTENSION")]
    pub extension: String,

    /// Output PNG path.
    #[arg(short, long, default_value = DEFAULT_OUTPUT)]
    pub output: PathBuf,

    /// Maximum number of concurrent tile fetches.
    #[arg(long, default_value_t = DEFAULT_MAX_CONCURRENT_FETCHES, env = "MAPBUF_MAX_FETCHES")]
    pub max_fetches: usize,

    /// Raw tile cache size in bytes.
    #[arg(long, default_value_t = DEFAULT_RAW_CACHE_CAPACITY, env = "MAPBUF_CACHE_SIZE")]
    pub cache_size: usize,

    /// Give up waiting for tiles after this many milliseconds.
    #[arg(long, default_value_t = DEFAULT_TIMEOUT_MS, env = "MAPBUF_TIMEOUT_MS")]
    pub timeout_ms: u64,

    /// Only use tiles of the view's zoom; no parent fallback tiles are fetched.
    #[arg(long, default_value_t = false)]
    pub current_zoom_only: bool,

    /// Write a half-resolution frame.
    #[arg(long, default_value_t = false)]
    pub smart: bool,

    /// Summary format.
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,

    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}

impl RenderConfig {
    /// Validate the configuration and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        self.view.validate()?;

        if self.tiles.as_os_str().is_empty() {
            return Err("Tile directory is required. Set --tiles or MAPBUF_TILES".to_string());
        }
        if self.extension.is_empty() {
            return Err("extension must not be empty".to_string());
        }
        if self.max_fetches == 0 {
            return Err("max_fetches must be greater than 0".to_string());
        }
        if self.cache_size == 0 {
            return Err("cache_size must be greater than 0".to_string());
        }
        if self.timeout_ms == 0 {
            return Err("timeout_ms must be greater than 0".to_string());
        }
        if self.smart && (self.view.width < 2 || self.view.height < 2) {
            return Err("smart frames need a viewport of at least 2x2".to_string());
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn buffer_options(&self) -> BufferOptions {
        BufferOptions {
            use_current_zoom_tiles: self.current_zoom_only,
            generate_smart_buffer: self.smart,
            ..BufferOptions::default()
        }
    }

    pub fn fetch_options(&self) -> FetchOptions {
        FetchOptions {
            max_concurrent: self.max_fetches,
            cache_capacity: self.cache_size,
        }
    }
}

// =============================================================================
// Window Command
// =============================================================================

/// Configuration for `map-buffer window`.
#[derive(Args, Debug, Clone)]
pub struct WindowConfig {
    #[command(flatten)]
    pub view: ViewArgs,

    /// Also list every cell's tile key.
    #[arg(long, default_value_t = false)]
    pub cells: bool,

    /// Output format.
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
}

impl WindowConfig {
    pub fn validate(&self) -> Result<(), String> {
        self.view.validate()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn test_view() -> ViewArgs {
        ViewArgs {
            longitude: 2.35,
            latitude: 48.85,
            zoom: 12,
            width: 800,
            height: 600,
            tile_size: 256,
            projection: ProjectionArg::Mercator,
        }
    }

    fn test_config() -> RenderConfig {
        RenderConfig {
            view: test_view(),
            tiles: PathBuf::from("/srv/tiles"),
            extension: "png".to_string(),
            output: PathBuf::from("out.png"),
            max_fetches: 4,
            cache_size: 1024 * 1024,
            timeout_ms: 1000,
            current_zoom_only: false,
            smart: false,
            format: OutputFormat::Text,
            verbose: false,
        }
    }

    #[test]
    fn test_valid_config() {
        assert!(test_config().validate().is_ok());
    }

    #[test]
    fn test_invalid_view() {
        let mut config = test_config();
        config.view.zoom = MAX_ZOOM + 1;
        assert!(config.validate().unwrap_err().contains("zoom"));

        let mut config = test_config();
        config.view.width = 0;
        assert!(config.validate().is_err());

        let mut config = test_config();
        config.view.latitude = 91.0;
        assert!(config.validate().unwrap_err().contains("latitude"));

        let mut config = test_config();
        config.view.longitude = f64::NAN;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_tile_size_power_of_two() {
        let mut config = test_config();
        config.view.tile_size = 300;
        assert!(config.validate().unwrap_err().contains("power of two"));

        config.view.tile_size = 512;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_fetch_settings() {
        let mut config = test_config();
        config.max_fetches = 0;
        assert!(config.validate().is_err());

        let mut config = test_config();
        config.cache_size = 0;
        assert!(config.validate().is_err());

        let mut config = test_config();
        config.timeout_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_empty_tiles_dir() {
        let mut config = test_config();
        config.tiles = PathBuf::new();
        assert!(config.validate().unwrap_err().contains("--tiles"));
    }

    #[test]
    fn test_options_follow_flags() {
        let mut config = test_config();
        config.current_zoom_only = true;
        config.smart = true;

        let options = config.buffer_options();
        assert!(options.use_current_zoom_tiles);
        assert!(options.generate_smart_buffer);
        assert_eq!(config.fetch_options().max_concurrent, 4);
        assert_eq!(config.timeout(), Duration::from_secs(1));
    }

    #[test]
    fn test_view_conversion() {
        let view = test_view().view();
        assert_eq!(view.zoom, 12);
        assert_eq!((view.width, view.height), (800, 600));
        assert_eq!(
            Projection::from(ProjectionArg::Wgs84),
            Projection::Wgs84Mercator
        );
    }

    #[test]
    fn test_parse_render_args() {
        let cli = Cli::try_parse_from([
            "map-buffer",
            "render",
            "--tiles",
            "/tmp/tiles",
            "--longitude",
            "-73.98",
            "--latitude",
            "40.75",
            "-z",
            "10",
            "--format",
            "json",
        ])
        .unwrap();

        match cli.into_command() {
            Command::Render(config) => {
                assert_eq!(config.view.longitude, -73.98);
                assert_eq!(config.format, OutputFormat::Json);
                assert_eq!(config.view.width, DEFAULT_WIDTH);
                assert!(config.validate().is_ok());
            }
            other => panic!("unexpected command {:?}", other),
        }
    }
}
