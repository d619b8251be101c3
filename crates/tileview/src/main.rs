mod logging;

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow, bail};
use clap::{Parser, Subcommand};
use decoder::{ImageSource, PnmDecoderFactory, write_ppm_header};
use engine::{PipelineConfig, ViewportPipeline};
use model::{ImageOrientation, IntSize, Offset, SampleSize, TileGrid};
use protocol::{ImageEvent, RenderSnapshot};
use tracing::info;
use view::ContentTransformation;

#[derive(Parser)]
#[command(author, version, about = "Inspect and drive the tiled image viewport")]
struct Arguments {
    /// Debug logging; `RUST_LOG` overrides the filter.
    #[arg(long, short = 'v', global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the tile pyramid for a canvas and image size.
    Grid {
        #[arg(long, default_value = "1080x2214")]
        canvas: IntSize,
        #[arg(long)]
        image: IntSize,
        /// List every tile, not just the level summary.
        #[arg(long)]
        tiles: bool,
    },
    /// Write a binary PPM gradient for trying the viewer on large inputs.
    Synth {
        #[arg(long)]
        size: IntSize,
        #[arg(long, short = 'o')]
        output: PathBuf,
    },
    /// Open a PNM image, zoom into it and wait until every visible tile is
    /// drawn at full quality.
    Run {
        image: PathBuf,
        #[arg(long, default_value = "1080x2214")]
        canvas: IntSize,
        /// Zoom relative to fitting the whole image in the canvas.
        #[arg(long, default_value_t = 1.0)]
        zoom: f32,
        /// Clockwise rotation stored with the image, in degrees.
        #[arg(long, default_value_t = 0)]
        orientation: i32,
        /// JSON pipeline configuration.
        #[arg(long)]
        config: Option<PathBuf>,
        #[arg(long, default_value_t = 30_000)]
        timeout_ms: u64,
    },
}

fn main() -> Result<()> {
    let arguments = Arguments::parse();
    logging::init(arguments.verbose);

    match arguments.command {
        Command::Grid {
            canvas,
            image,
            tiles,
        } => print_grid(canvas, image, tiles),
        Command::Synth { size, output } => synthesize(size, &output),
        Command::Run {
            image,
            canvas,
            zoom,
            orientation,
            config,
            timeout_ms,
        } => {
            let config = match config {
                Some(path) => load_config(&path)?,
                None => PipelineConfig::default(),
            };
            let orientation = ImageOrientation::from_degrees(orientation)?;
            run(
                ImageSource::file(image).with_orientation(orientation),
                canvas,
                zoom,
                config,
                Duration::from_millis(timeout_ms),
            )
        }
    }
}

fn print_grid(canvas: IntSize, image: IntSize, list_tiles: bool) -> Result<()> {
    if canvas.is_empty() || image.is_empty() {
        bail!("canvas and image sizes must not be empty");
    }
    let grid = TileGrid::generate(canvas, image);
    println!("canvas {canvas}, image {image}");
    println!("base {}", grid.base());
    for (sample_size, count) in grid.level_summary() {
        println!("  level {sample_size}: {count} tiles");
    }
    if list_tiles {
        for level in grid.foreground() {
            for tile in level.tiles() {
                println!("{tile}");
            }
        }
    }
    Ok(())
}

fn synthesize(size: IntSize, output: &Path) -> Result<()> {
    if size.is_empty() {
        bail!("image size must not be empty");
    }
    let file =
        File::create(output).with_context(|| format!("create output {}", output.display()))?;
    let mut writer = BufWriter::new(file);
    write_ppm_header(&mut writer, size).context("write ppm header")?;

    let mut row = vec![0u8; size.width as usize * 3];
    for y in 0..size.height {
        for (x, pixel) in row.chunks_exact_mut(3).enumerate() {
            let x = x as u32;
            pixel[0] = gradient(x, size.width);
            pixel[1] = gradient(y, size.height);
            // Checkerboard of 256px squares so tile seams are easy to spot.
            pixel[2] = if (x / 256 + y / 256) % 2 == 0 { 64 } else { 192 };
        }
        writer
            .write_all(&row)
            .with_context(|| format!("write row {y} to {}", output.display()))?;
    }
    writer.flush().context("flush output")?;
    info!(output = %output.display(), %size, "wrote synthetic image");
    Ok(())
}

fn gradient(position: u32, extent: u32) -> u8 {
    let last = u64::from(extent.saturating_sub(1).max(1));
    (u64::from(position) * 255 / last).min(255) as u8
}

fn load_config(path: &Path) -> Result<PipelineConfig> {
    let text =
        fs::read_to_string(path).with_context(|| format!("read config {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parse config {}", path.display()))
}

fn run(
    source: ImageSource,
    canvas: IntSize,
    zoom: f32,
    config: PipelineConfig,
    timeout: Duration,
) -> Result<()> {
    if canvas.is_empty() {
        bail!("canvas size must not be empty");
    }
    let started = Instant::now();
    let deadline = started + timeout;
    let pipeline = ViewportPipeline::spawn(Arc::new(PnmDecoderFactory), config);
    pipeline.set_canvas_size(canvas);
    pipeline.set_source(source);

    let image_size = match next_event(&pipeline, deadline)? {
        ImageEvent::Opened { image_size } => image_size,
        ImageEvent::OpenFailed { error } => return Err(anyhow!("{error}")),
        other => bail!("unexpected event before the image opened: {other}"),
    };

    let center = Offset::new(canvas.width as f32 / 2.0, canvas.height as f32 / 2.0);
    let transformation = ContentTransformation::fit_center(image_size, canvas)
        .and_then(|fitted| fitted.zoomed_about(zoom, center))
        .context("build viewport transformation")?;
    let sample_size = SampleSize::for_zoom(transformation.scale().max_scale());
    println!("image {image_size}, canvas {canvas}, zoom {zoom}, sample size {sample_size}");
    pipeline.push_transformation(transformation);

    loop {
        match next_event(&pipeline, deadline)? {
            ImageEvent::FullQualityDisplayed => break,
            ImageEvent::Displayed => println!("first pixels after {:?}", started.elapsed()),
            other => info!(%other, "pipeline event"),
        }
    }
    let snapshot = pipeline.render_snapshot();
    print_snapshot(&snapshot);
    println!("full quality after {:?}", started.elapsed());
    Ok(())
}

fn next_event(pipeline: &ViewportPipeline, deadline: Instant) -> Result<ImageEvent> {
    let remaining = deadline.saturating_duration_since(Instant::now());
    pipeline.events().recv_timeout(remaining).map_err(|_| {
        let snapshot = pipeline.render_snapshot();
        anyhow!(
            "timed out with {} of {} tiles loaded",
            snapshot.loaded_tiles(),
            snapshot.tiles.len()
        )
    })
}

fn print_snapshot(snapshot: &RenderSnapshot) {
    println!(
        "revision {}: {} tiles drawn",
        snapshot.revision,
        snapshot.tiles.len()
    );
    for canvas_tile in &snapshot.tiles {
        let pixels = canvas_tile
            .bitmap
            .as_ref()
            .map(|bitmap| bitmap.size().to_string())
            .unwrap_or_else(|| "missing".to_string());
        println!(
            "  {} -> ({}, {})..({}, {}) bitmap {pixels}",
            canvas_tile.tile,
            canvas_tile.bounds.left,
            canvas_tile.bounds.top,
            canvas_tile.bounds.right,
            canvas_tile.bounds.bottom
        );
    }
}
