//! Command-line configuration for the `wsi-tiler` binary.
//!
//! # Environment Variables
//!
//! - `TILER_BLOCK_SIZE` - Block size in bytes for the read cache (default: 256KB)
//! - `TILER_CACHE_BLOCKS` - Max blocks kept in the read cache (default: 100)

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::backend::BackendKind;
use crate::grid::TileShape;
use crate::io::{DEFAULT_BLOCK_SIZE, DEFAULT_CACHE_CAPACITY};
use crate::slide::ReadOptions;

/// Smallest accepted read block.
pub const MIN_BLOCK_SIZE: usize = 1024;

/// Largest accepted read block.
pub const MAX_BLOCK_SIZE: usize = 16 * 1024 * 1024;

// =============================================================================
// CLI Arguments
// =============================================================================

/// WSI Tiler - cut whole slide images into tiles and store them.
#[derive(Parser, Debug, Clone)]
#[command(name = "wsi-tiler")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub read: ReadConfig,

    /// Enable verbose logging (debug level).
    #[arg(short, long, global = true, default_value_t = false)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Print the format, levels and shape of a slide.
    Info(InfoConfig),
    /// Tile a slide and write the tiles to a container file.
    Tile(TileConfig),
    /// Summarise a container file written by `tile`.
    Inspect(InspectConfig),
}

/// Options shared by every command that reads a slide.
#[derive(Args, Debug, Clone)]
pub struct ReadConfig {
    /// Block size in bytes for the read cache.
    #[arg(long, global = true, default_value_t = DEFAULT_BLOCK_SIZE, env = "TILER_BLOCK_SIZE")]
    pub block_size: usize,

    /// Maximum number of blocks kept in the read cache.
    #[arg(long, global = true, default_value_t = DEFAULT_CACHE_CAPACITY, env = "TILER_CACHE_BLOCKS")]
    pub cache_blocks: usize,
}

impl ReadConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.block_size < MIN_BLOCK_SIZE || self.block_size > MAX_BLOCK_SIZE {
            return Err("block_size must be between 1KB and 16MB".to_string());
        }
        if self.cache_blocks == 0 {
            return Err("cache_blocks must be greater than 0".to_string());
        }
        Ok(())
    }

    pub fn options(&self) -> ReadOptions {
        ReadOptions {
            block_size: self.block_size,
            cache_blocks: self.cache_blocks,
        }
    }
}

impl Default for ReadConfig {
    fn default() -> Self {
        Self {
            block_size: DEFAULT_BLOCK_SIZE,
            cache_blocks: DEFAULT_CACHE_CAPACITY,
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct InfoConfig {
    /// Path to the slide file.
    pub slide: PathBuf,

    /// Backend used to read the slide.
    #[arg(long, value_enum, default_value_t = BackendKind::Auto)]
    pub backend: BackendKind,
}

impl InfoConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.slide.as_os_str().is_empty() {
            return Err("slide path is required".to_string());
        }
        Ok(())
    }
}

#[derive(Args, Debug, Clone)]
pub struct TileConfig {
    /// Path to the slide file.
    pub slide: PathBuf,

    /// Tile shape, `N` for square tiles or `HxW`.
    #[arg(long)]
    pub shape: TileShape,

    /// Step between tile origins, `N` or `HxW`. Defaults to the tile shape.
    #[arg(long)]
    pub stride: Option<TileShape>,

    /// Keep tiles that hang over the image edge, zero-filled.
    #[arg(long, default_value_t = false)]
    pub pad: bool,

    /// Pyramid level to tile.
    #[arg(long, default_value_t = 0)]
    pub level: usize,

    /// Container file to write.
    #[arg(short, long)]
    pub output: PathBuf,

    /// Backend used to read the slide.
    #[arg(long, value_enum, default_value_t = BackendKind::Auto)]
    pub backend: BackendKind,
}

impl TileConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.shape.is_empty() {
            return Err("tile shape must be non-zero in both dimensions".to_string());
        }
        if let Some(stride) = self.stride {
            if stride.is_empty() {
                return Err("stride must be non-zero in both dimensions".to_string());
            }
        }
        if self.output.as_os_str().is_empty() {
            return Err("output path is required".to_string());
        }
        if self.output == self.slide {
            return Err("output must not overwrite the slide".to_string());
        }
        Ok(())
    }
}

#[derive(Args, Debug, Clone)]
pub struct InspectConfig {
    /// Container file written by `tile`.
    pub store: PathBuf,

    /// Also list every tile entry.
    #[arg(long, default_value_t = false)]
    pub entries: bool,
}

impl InspectConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.store.as_os_str().is_empty() {
            return Err("store path is required".to_string());
        }
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================
