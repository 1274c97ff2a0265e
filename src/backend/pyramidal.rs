//! Random access into tiled multi-resolution TIFF/SVS files.
//!
//! Region locations are given in the level-0 frame and scaled onto the
//! requested level; sizes are in the requested level's pixels. Generated
//! tiles report their coords in the level-0 frame as well. Areas past
//! the image edge read as zero, so edge tiles come back padded.

use ndarray::{ArrayD, Ix3};
use tracing::debug;

use crate::error::BackendError;
use crate::format::tiff::{ChunkLayout, TiffPyramid};
use crate::grid::TileShape;
use crate::io::RangeReader;
use crate::tile::SourceFormat;

use super::grid_tiles::{GridSource, GridTiles};
use super::resample::{fit_within, resize_hw};
use super::{SlideBackend, TileIter};

/// Per-level geometry.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LevelGeometry {
    pub width: u32,
    pub height: u32,
    pub downsample: f64,
}

/// Pyramidal backend over any [`RangeReader`].
pub struct PyramidalBackend<R> {
    reader: R,
    pyramid: TiffPyramid,
    layouts: Vec<ChunkLayout>,
}

impl<R: RangeReader> PyramidalBackend<R> {
    pub fn open(reader: R) -> Result<Self, BackendError> {
        let pyramid = TiffPyramid::parse(&reader)?;
        let layouts = pyramid
            .levels
            .iter()
            .map(|level| ChunkLayout::load(&reader, &pyramid.header, &level.ifd))
            .collect::<Result<Vec<_>, _>>()?;

        if let Some(first) = layouts.first() {
            if let Some(odd) = layouts
                .iter()
                .find(|l| l.samples_per_pixel != first.samples_per_pixel)
            {
                return Err(BackendError::InvalidArgument(format!(
                    "pyramid levels disagree on samples per pixel ({} vs {})",
                    first.samples_per_pixel, odd.samples_per_pixel
                )));
            }
        }

        debug!(
            identifier = reader.identifier(),
            levels = layouts.len(),
            aperio = pyramid.is_aperio(),
            "opened pyramidal backend"
        );

        Ok(Self {
            reader,
            pyramid,
            layouts,
        })
    }

    pub fn level_count(&self) -> usize {
        self.layouts.len()
    }

    pub fn level_geometry(&self, level: usize) -> Result<LevelGeometry, BackendError> {
        let info = self
            .pyramid
            .get_level(level)
            .ok_or(BackendError::LevelOutOfRange {
                level,
                count: self.level_count(),
            })?;
        Ok(LevelGeometry {
            width: info.width,
            height: info.height,
            downsample: info.downsample,
        })
    }

    /// Whether the file is an Aperio SVS.
    pub fn is_aperio(&self) -> bool {
        self.pyramid.is_aperio()
    }

    pub fn reader(&self) -> &R {
        &self.reader
    }

    fn layout(&self, level: usize) -> Result<&ChunkLayout, BackendError> {
        self.layouts.get(level).ok_or(BackendError::LevelOutOfRange {
            level,
            count: self.layouts.len(),
        })
    }
}

impl<R: RangeReader> GridSource for PyramidalBackend<R> {
    fn source_format(&self) -> SourceFormat {
        SourceFormat::Pyramidal
    }

    fn level_extent(&self, level: usize) -> Result<(usize, usize), BackendError> {
        let layout = self.layout(level)?;
        Ok((layout.height as usize, layout.width as usize))
    }

    fn sample_dims(&self) -> Vec<usize> {
        vec![self
            .layouts
            .first()
            .map_or(1, |l| l.samples_per_pixel as usize)]
    }

    fn read_level(
        &self,
        origin: (usize, usize),
        size: (usize, usize),
        level: usize,
    ) -> Result<ArrayD<u8>, BackendError> {
        let layout = self.layout(level)?;
        Ok(layout.read_region(&self.reader, origin, size)?.into_dyn())
    }

    fn level_downsample(&self, level: usize) -> Result<f64, BackendError> {
        Ok(self.level_geometry(level)?.downsample)
    }
}

impl<R: RangeReader> SlideBackend for PyramidalBackend<R> {
    fn source_format(&self) -> SourceFormat {
        SourceFormat::Pyramidal
    }

    fn level_count(&self) -> usize {
        self.layouts.len()
    }

    fn extract_region(
        &self,
        location: (usize, usize),
        size: TileShape,
        level: usize,
    ) -> Result<ArrayD<u8>, BackendError> {
        if size.is_empty() {
            return Err(BackendError::InvalidArgument(format!(
                "region size {} has a zero dimension",
                size
            )));
        }
        let downsample = self.level_geometry(level)?.downsample;
        let origin = (
            (location.0 as f64 / downsample).floor() as usize,
            (location.1 as f64 / downsample).floor() as usize,
        );
        self.read_level(origin, size.as_tuple(), level)
    }

    fn get_image_shape(&self, level: usize) -> Result<(usize, usize), BackendError> {
        self.level_extent(level)
    }

    /// `size` is the `(height, width)` bounding box of the thumbnail.
    fn get_thumbnail(&self, size: &[usize]) -> Result<ArrayD<u8>, BackendError> {
        let bounds = match size {
            [h, w] if *h > 0 && *w > 0 => (*h, *w),
            _ => {
                return Err(BackendError::InvalidArgument(format!(
                    "thumbnail size {:?} must be a non-zero (height, width)",
                    size
                )))
            }
        };

        let full = self.level_extent(0)?;
        let target = fit_within(full, bounds);
        let downsample = f64::max(
            full.0 as f64 / target.0 as f64,
            full.1 as f64 / target.1 as f64,
        );
        let source = self.pyramid.best_level_for_downsample(downsample).level_index;
        let extent = self.level_extent(source)?;
        debug!(level = source, target = ?target, "reading thumbnail");

        let pixels = self
            .read_level((0, 0), extent, source)?
            .into_dimensionality::<Ix3>()
            .map_err(|e| BackendError::InvalidArgument(e.to_string()))?;
        Ok(resize_hw(pixels.view(), target)?.into_dyn())
    }

    fn generate_tiles(
        &self,
        shape: TileShape,
        stride: Option<TileShape>,
        pad: bool,
        level: usize,
    ) -> Result<TileIter<'_>, BackendError> {
        Ok(Box::new(GridTiles::new(self, shape, stride, pad, level)?))
    }

    fn sample_shape(&self) -> Vec<usize> {
        self.sample_dims()
    }
}
