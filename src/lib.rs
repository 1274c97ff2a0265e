//! # WSI Tiler
//!
//! Tiling of whole slide images into fixed-shape arrays for analysis
//! pipelines.
//!
//! Slides are read with byte-range access through a block cache, so only the
//! chunks a region touches are fetched and decoded. Three storage layouts are
//! supported:
//!
//! - **Pyramidal**: tiled TIFF and Aperio SVS with one IFD per resolution level
//! - **Volumetric**: multi-page TIFF stacks (ImageJ or OME) addressed as
//!   `(y, x, z, c, t)` volumes
//! - **Frame-indexed**: DICOM whole-slide instances whose pixels are a grid of
//!   encapsulated JPEG or JPEG 2000 frames
//!
//! ## Architecture
//!
//! - [`io`] - range reader abstraction, local file reader and block cache
//! - [`mod@format`] - TIFF and DICOM parsers and chunk decoding
//! - [`grid`] - tile origin enumeration
//! - [`backend`] - region extraction and tile generation per layout
//! - [`tile`] - the tile record passed between backends and stores
//! - [`store`] - tile and mask stores and their container file
//! - [`slide`] - a slide with its stores
//! - [`config`] - CLI and configuration types
//!
//! ## Example
//!
//! ```rust,no_run
//! use wsi_tiler::{BackendKind, SlideData, TileShape};
//!
//! let mut slide = SlideData::open("slide.svs", BackendKind::Auto)?;
//! let count = slide.tile_into_store(TileShape::square(256), None, false, 0)?;
//! println!("{} tiles", count);
//! slide.write("slide.wstc")?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod backend;
pub mod config;
pub mod error;
pub mod format;
pub mod grid;
pub mod io;
pub mod slide;
pub mod store;
pub mod tile;

// Re-export commonly used types
pub use backend::{
    Backend, BackendKind, FrameIndexedBackend, FrameLocation, PyramidalBackend, SlideBackend,
    TileIter, VolumeShape, VolumetricBackend,
};
pub use config::{Cli, Command};
pub use error::{
    BackendError, DecodeError, DicomError, FormatError, IoError, SlideError, StoreError, TiffError,
};
pub use format::{detect_format, SlideFormat};
pub use grid::{CoordinateGrid, TileShape};
pub use io::{BlockCache, LocalFileReader, MemoryReader, RangeReader};
pub use slide::{ReadOptions, SlideData};
pub use store::{MaskKey, MaskStore, TileEntry, TileKey, TileUpdate, TiledArrayStore};
pub use tile::{Labels, SourceFormat, Tile};
