//! Region extraction and tile generation over slide files.
//!
//! Three backends share the [`SlideBackend`] contract:
//!
//! | Backend | Files | Levels | Thumbnail |
//! |---------|-------|--------|-----------|
//! | [`PyramidalBackend`] | tiled TIFF, Aperio SVS | many | from the best level |
//! | [`VolumetricBackend`] | TIFF page stacks (ImageJ, OME) | one | resampled |
//! | [`FrameIndexedBackend`] | tiled DICOM | one | unsupported |
//!
//! [`Backend`] picks one from a file's leading bytes.

mod frame_indexed;
mod grid_tiles;
mod pyramidal;
mod resample;
mod volumetric;

use clap::ValueEnum;
use ndarray::ArrayD;

use crate::error::BackendError;
use crate::format::{detect_format, SlideFormat};
use crate::grid::TileShape;
use crate::io::RangeReader;
use crate::tile::{SourceFormat, Tile};

pub use frame_indexed::{FrameIndexedBackend, FrameLocation};
pub use pyramidal::{LevelGeometry, PyramidalBackend};
pub use volumetric::{
    as_volume, PlaneSource, StackSource, VolumeShape, VolumetricBackend, MAX_THUMBNAIL_SAMPLES,
};

/// Lazily generated tiles.
pub type TileIter<'a> = Box<dyn Iterator<Item = Result<Tile, BackendError>> + 'a>;

/// Region access common to every slide backend.
///
/// Locations and sizes are `(row, col)` / `(height, width)`.
pub trait SlideBackend {
    fn source_format(&self) -> SourceFormat;

    fn level_count(&self) -> usize {
        1
    }

    /// Read `size` pixels of `level` whose top-left corner sits at `location`.
    fn extract_region(
        &self,
        location: (usize, usize),
        size: TileShape,
        level: usize,
    ) -> Result<ArrayD<u8>, BackendError>;

    /// `(height, width)` of `level`.
    fn get_image_shape(&self, level: usize) -> Result<(usize, usize), BackendError>;

    fn get_thumbnail(&self, size: &[usize]) -> Result<ArrayD<u8>, BackendError>;

    /// Tile `level` with `shape` tiles every `stride` pixels (default: `shape`).
    /// Tile coords are full-resolution, so each one addresses its tile
    /// through [`extract_region`](Self::extract_region) at the same level.
    fn generate_tiles(
        &self,
        shape: TileShape,
        stride: Option<TileShape>,
        pad: bool,
        level: usize,
    ) -> Result<TileIter<'_>, BackendError>;

    /// Dimensions following height and width in every region.
    fn sample_shape(&self) -> Vec<usize>;
}

/// Backend selection for [`Backend::open`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum BackendKind {
    /// Detect from the file's leading bytes
    #[default]
    Auto,
    Pyramidal,
    Volumetric,
    FrameIndexed,
}

/// Any of the three backends.
pub enum Backend<R> {
    Pyramidal(PyramidalBackend<R>),
    Volumetric(VolumetricBackend<StackSource<R>>),
    FrameIndexed(FrameIndexedBackend<R>),
}

impl<R: RangeReader> Backend<R> {
    pub fn open(reader: R, kind: BackendKind) -> Result<Self, BackendError> {
        let kind = match kind {
            BackendKind::Auto => match detect_format(&reader)? {
                SlideFormat::AperioSvs | SlideFormat::PyramidalTiff => BackendKind::Pyramidal,
                SlideFormat::TiffStack => BackendKind::Volumetric,
                SlideFormat::Dicom => BackendKind::FrameIndexed,
            },
            explicit => explicit,
        };

        Ok(match kind {
            BackendKind::Pyramidal | BackendKind::Auto => {
                Backend::Pyramidal(PyramidalBackend::open(reader)?)
            }
            BackendKind::Volumetric => Backend::Volumetric(VolumetricBackend::open(reader)?),
            BackendKind::FrameIndexed => {
                Backend::FrameIndexed(FrameIndexedBackend::open(reader)?)
            }
        })
    }

    fn inner(&self) -> &dyn SlideBackend {
        match self {
            Backend::Pyramidal(b) => b,
            Backend::Volumetric(b) => b,
            Backend::FrameIndexed(b) => b,
        }
    }
}

impl<R: RangeReader> SlideBackend for Backend<R> {
    fn source_format(&self) -> SourceFormat {
        self.inner().source_format()
    }

    fn level_count(&self) -> usize {
        self.inner().level_count()
    }

    fn extract_region(
        &self,
        location: (usize, usize),
        size: TileShape,
        level: usize,
    ) -> Result<ArrayD<u8>, BackendError> {
        self.inner().extract_region(location, size, level)
    }

    fn get_image_shape(&self, level: usize) -> Result<(usize, usize), BackendError> {
        self.inner().get_image_shape(level)
    }

    fn get_thumbnail(&self, size: &[usize]) -> Result<ArrayD<u8>, BackendError> {
        self.inner().get_thumbnail(size)
    }

    fn generate_tiles(
        &self,
        shape: TileShape,
        stride: Option<TileShape>,
        pad: bool,
        level: usize,
    ) -> Result<TileIter<'_>, BackendError> {
        self.inner().generate_tiles(shape, stride, pad, level)
    }

    fn sample_shape(&self) -> Vec<usize> {
        self.inner().sample_shape()
    }
}
