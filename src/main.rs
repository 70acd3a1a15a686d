//! map-buffer - Tile pyramid cache and raster compositor.
//!
//! This binary composites map views from a directory of tiles and inspects
//! tile windows.

use clap::Parser;
use serde::Serialize;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use map_buffer::{
    compositor::{viewport_corners, TileWindow, WindowCell},
    config::{Cli, Command, OutputFormat, RenderConfig, WindowConfig},
    BufferError, CycleReport, DirectorySource, FetchPipeline, FetchStats, GeoPoint, MapBuffer,
    MapContext, PngSink, TileStatus, ViewState,
};

/// Pause between render cycles while tiles are in flight.
const SETTLE_POLL: Duration = Duration::from_millis(10);

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match cli.into_command() {
        Command::Render(config) => run_render(config).await,
        Command::Window(config) => run_window(config),
    }
}

/// Initialize the tracing/logging subsystem.
fn init_logging(verbose: bool) {
    let env_filter = if verbose {
        "map_buffer=debug"
    } else {
        "map_buffer=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| env_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

// =============================================================================
// Render Command
// =============================================================================

#[derive(Debug, Serialize)]
struct RenderSummary {
    view: ViewState,
    output: PathBuf,
    cycles: usize,
    timed_out: bool,
    elapsed_ms: u64,
    last_rebuild: CycleReport,
    fetch: FetchStats,
}

struct Settled {
    buffer: MapBuffer,
    cycles: usize,
    timed_out: bool,
    last_rebuild: CycleReport,
}

async fn run_render(config: RenderConfig) -> ExitCode {
    init_logging(config.verbose);

    if let Err(e) = config.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }

    info!("Configuration:");
    info!("  Tiles: {} (*.{})", config.tiles.display(), config.extension);
    info!(
        "  View: {:.5}, {:.5} at z{}, {}x{} px",
        config.view.longitude,
        config.view.latitude,
        config.view.zoom,
        config.view.width,
        config.view.height
    );
    info!(
        "  Fetch: {} concurrent, {}MB cache",
        config.max_fetches,
        config.cache_size / (1024 * 1024)
    );

    if !config.tiles.is_dir() {
        error!("Tile directory {} does not exist", config.tiles.display());
        return ExitCode::FAILURE;
    }

    let context = MapContext::with_options(config.view.tile_size, config.view.projection());
    let source = DirectorySource::new(&config.tiles).with_extension(&config.extension);
    let pipeline = Arc::new(FetchPipeline::new(
        source,
        &context,
        config.fetch_options(),
        tokio::runtime::Handle::current(),
    ));
    let buffer = MapBuffer::new(context, pipeline.clone(), config.buffer_options());

    let view = config.view.view();
    let timeout = config.timeout();
    let started = Instant::now();

    // Cycles block on tile pixels, so they run off the async workers
    let settle_pipeline = Arc::clone(&pipeline);
    let task = tokio::task::spawn_blocking(move || settle(buffer, settle_pipeline, view, timeout));
    let settled = match task.await {
        Ok(Ok(settled)) => settled,
        Ok(Err(e)) => {
            error!("Render failed: {}", e);
            return ExitCode::FAILURE;
        }
        Err(e) => {
            error!("Render task failed: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let Settled {
        mut buffer,
        cycles,
        timed_out,
        last_rebuild,
    } = settled;

    let sink = PngSink::new(&config.output);
    if let Err(e) = sink.write(buffer.frame()) {
        error!("Failed to write {}: {}", config.output.display(), e);
        return ExitCode::FAILURE;
    }
    buffer.dispose();

    let summary = RenderSummary {
        view,
        output: config.output.clone(),
        cycles,
        timed_out,
        elapsed_ms: started.elapsed().as_millis() as u64,
        last_rebuild,
        fetch: pipeline.stats(),
    };

    match config.format {
        OutputFormat::Text => print_render_summary(&summary),
        OutputFormat::Json => match serde_json::to_string_pretty(&summary) {
            Ok(json) => println!("{}", json),
            Err(e) => {
                error!("Failed to serialize summary: {}", e);
                return ExitCode::FAILURE;
            }
        },
    }

    ExitCode::SUCCESS
}

/// Run cycles until every window tile is resolved or `timeout` expires.
fn settle(
    mut buffer: MapBuffer,
    pipeline: Arc<FetchPipeline<DirectorySource>>,
    view: ViewState,
    timeout: Duration,
) -> Result<Settled, BufferError> {
    let deadline = Instant::now() + timeout;
    let mut cycles = 0;
    let mut last_rebuild = CycleReport::default();

    let timed_out = loop {
        let report = buffer.run_cycle(&view)?;
        cycles += 1;
        if report.rebuilt {
            last_rebuild = report;
        }

        let loading = buffer
            .context()
            .registry()
            .status_counts()
            .get(&TileStatus::Loading)
            .copied()
            .unwrap_or(0);

        // Read in this order: a load leaves Loading, then queues its
        // completion, then stops counting as in flight
        let drained = loading == 0
            && pipeline.stats().in_flight() == 0
            && buffer.context().completed().is_empty();
        if last_rebuild.is_settled() || drained {
            break false;
        }
        if Instant::now() >= deadline {
            warn!("Timed out with {} tile(s) still loading", loading);
            break true;
        }
        thread::sleep(SETTLE_POLL);
    };

    Ok(Settled {
        buffer,
        cycles,
        timed_out,
        last_rebuild,
    })
}

fn print_render_summary(summary: &RenderSummary) {
    let report = &summary.last_rebuild;
    println!("Rendered {}", summary.output.display());
    println!("═════════════════════════════════");
    println!(
        "  Cycles:    {} in {} ms{}",
        summary.cycles,
        summary.elapsed_ms,
        if summary.timed_out { " (timed out)" } else { "" }
    );
    println!("  Copied:    {}", report.copied);
    println!("  Fallback:  {}", report.fallback);
    println!("  Pending:   {}", report.pending);
    println!("  Off-grid:  {}", report.cleared);
    println!(
        "  Fetches:   {} loaded, {} failed, {} cache hits",
        summary.fetch.loaded, summary.fetch.failed, summary.fetch.cache_hits
    );
}

// =============================================================================
// Window Command
// =============================================================================

#[derive(Debug, Serialize)]
struct WindowSummary {
    window: TileWindow,
    front_offset: (u32, u32),
    top_left: GeoPoint,
    bottom_right: GeoPoint,
    #[serde(skip_serializing_if = "Option::is_none")]
    cells: Option<Vec<WindowCell>>,
}

fn run_window(config: WindowConfig) -> ExitCode {
    if let Err(e) = config.validate() {
        eprintln!("Error: {}", e);
        return ExitCode::FAILURE;
    }

    let view = config.view.view();
    let projection = config.view.projection();
    let tile_size = config.view.tile_size;

    let (center_x, center_y) = projection.coordinates_to_tile(view.longitude, view.latitude, view.zoom);
    let window = TileWindow::compute(
        center_x,
        center_y,
        view.zoom,
        view.width,
        view.height,
        tile_size,
    );
    let (top_left, bottom_right) = viewport_corners(&view, projection, tile_size);

    let summary = WindowSummary {
        window,
        front_offset: window.front_offset(center_x, center_y, view.width, view.height),
        top_left,
        bottom_right,
        cells: config.cells.then(|| window.cells()),
    };

    match config.format {
        OutputFormat::Text => print_window_summary(&summary),
        OutputFormat::Json => match serde_json::to_string_pretty(&summary) {
            Ok(json) => println!("{}", json),
            Err(e) => {
                eprintln!("Error: {}", e);
                return ExitCode::FAILURE;
            }
        },
    }

    ExitCode::SUCCESS
}

fn print_window_summary(summary: &WindowSummary) {
    let w = &summary.window;
    println!("Tile window");
    println!("═════════════════════════════════");
    println!("  Zoom:          {}", w.zoom);
    println!("  Origin:        ({}, {})", w.origin_x, w.origin_y);
    println!(
        "  Tiles:         {} x {} ({})",
        w.count_x,
        w.count_y,
        w.cell_count()
    );
    println!("  Buffer:        {} x {} px", w.pixel_width(), w.pixel_height());
    println!(
        "  Front offset:  ({}, {})",
        summary.front_offset.0, summary.front_offset.1
    );
    println!(
        "  Top-left:      {:.6}, {:.6}",
        summary.top_left.longitude, summary.top_left.latitude
    );
    println!(
        "  Bottom-right:  {:.6}, {:.6}",
        summary.bottom_right.longitude, summary.bottom_right.latitude
    );

    if let Some(ref cells) = summary.cells {
        println!();
        for cell in cells {
            match cell.key {
                Some(key) => println!("  [{:>2}, {:>2}] {}", cell.column, cell.row, key),
                None => println!("  [{:>2}, {:>2}] off-grid", cell.column, cell.row),
            }
        }
    }
}
