//! WSI Tiler - cut whole slide images into tiles.
//!
//! This binary parses the command line and runs one sub-command.

use clap::Parser;
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use wsi_tiler::{
    backend::{Backend, SlideBackend},
    config::{Cli, Command, InfoConfig, InspectConfig, ReadConfig, TileConfig},
    slide::{ReadOptions, SlideData},
    store,
};

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Err(e) = cli.read.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }

    match cli.command {
        Command::Info(config) => run_info(config, &cli.read),
        Command::Tile(config) => run_tile(config, &cli.read),
        Command::Inspect(config) => run_inspect(config),
    }
}

/// Initialize the tracing/logging subsystem.
fn init_logging(verbose: bool) {
    let env_filter = if verbose {
        "wsi_tiler=debug"
    } else {
        "wsi_tiler=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| env_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

// =============================================================================
// Info Command
// =============================================================================

fn run_info(config: InfoConfig, read: &ReadConfig) -> ExitCode {
    if let Err(e) = config.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }

    let slide = match SlideData::open_with(&config.slide, config.backend, read.options()) {
        Ok(slide) => slide,
        Err(e) => {
            error!("Failed to open {}: {}", config.slide.display(), e);
            return ExitCode::FAILURE;
        }
    };

    let backend = slide.backend();
    println!("Slide:   {}", slide.name());
    println!("Backend: {}", backend.source_format());
    println!("Samples: {:?}", backend.sample_shape());

    for level in 0..backend.level_count() {
        match backend.get_image_shape(level) {
            Ok((height, width)) => println!("Level {}: {} x {}", level, height, width),
            Err(e) => {
                error!("Failed to read level {}: {}", level, e);
                return ExitCode::FAILURE;
            }
        }
    }

    match backend {
        Backend::Pyramidal(pyramidal) => {
            for level in 0..pyramidal.level_count() {
                if let Ok(geometry) = pyramidal.level_geometry(level) {
                    println!("  level {} downsample {:.2}", level, geometry.downsample);
                }
            }
            if pyramidal.is_aperio() {
                println!("Aperio SVS");
            }
        }
        Backend::Volumetric(volumetric) => {
            let shape = volumetric.volume_shape();
            println!(
                "Volume:  x={} y={} z={} c={} t={}",
                shape.size_x, shape.size_y, shape.size_z, shape.size_c, shape.size_t
            );
        }
        Backend::FrameIndexed(frames) => {
            let (rows, cols) = frames.frame_grid();
            let (frame_h, frame_w) = frames.frame_shape();
            println!(
                "Frames:  {} ({} x {} grid of {} x {}), {}",
                frames.frame_count(),
                rows,
                cols,
                frame_h,
                frame_w,
                frames.transfer_syntax().uid()
            );
        }
    }

    ExitCode::SUCCESS
}

// =============================================================================
// Tile Command
// =============================================================================

fn run_tile(config: TileConfig, read: &ReadConfig) -> ExitCode {
    if let Err(e) = config.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }

    let options: ReadOptions = read.options();
    let mut slide = match SlideData::open_with(&config.slide, config.backend, options) {
        Ok(slide) => slide,
        Err(e) => {
            error!("Failed to open {}: {}", config.slide.display(), e);
            return ExitCode::FAILURE;
        }
    };

    let count = match slide.tile_into_store(config.shape, config.stride, config.pad, config.level)
    {
        Ok(count) => count,
        Err(e) => {
            error!("Tiling failed: {}", e);
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = slide.write(&config.output) {
        error!("Failed to write {}: {}", config.output.display(), e);
        return ExitCode::FAILURE;
    }

    info!(
        "Wrote {} tile(s) of {} to {}",
        count,
        config.shape,
        config.output.display()
    );
    ExitCode::SUCCESS
}

// =============================================================================
// Inspect Command
// =============================================================================

fn run_inspect(config: InspectConfig) -> ExitCode {
    if let Err(e) = config.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }

    let (tiles, masks) = match store::load(&config.store) {
        Ok(stores) => stores,
        Err(e) => {
            error!("Failed to read {}: {}", config.store.display(), e);
            return ExitCode::FAILURE;
        }
    };

    println!("Tiles:      {}", tiles.len());
    if let Some(shape) = tiles.shape() {
        println!("Tile shape: {:?}", shape);
    }
    if let Some(extent) = tiles.extent() {
        println!("Extent:     {:?}", extent);
    }
    let mask_names: Vec<_> = tiles.mask_names().collect();
    if !mask_names.is_empty() {
        println!("Tile masks: {}", mask_names.join(", "));
    }

    println!("Masks:      {}", masks.len());
    if let Some(shape) = masks.shape() {
        println!("Mask shape: {:?}", shape);
    }
    for name in masks.names() {
        println!("  {}", name);
    }

    if config.entries {
        for entry in tiles.entries() {
            let source = entry.source.map(|s| s.name()).unwrap_or("-");
            match &entry.name {
                Some(name) => println!("  {:?} {} [{}]", entry.coords, name, source),
                None => println!("  {:?} [{}]", entry.coords, source),
            }
        }
    }

    ExitCode::SUCCESS
}
