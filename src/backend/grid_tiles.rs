//! Grid-driven tile generation shared by the pyramidal and volumetric backends.

use ndarray::{ArrayD, IxDyn, Slice};
use tracing::trace;

use crate::error::BackendError;
use crate::grid::{CoordinateGrid, GridIter, TileShape};
use crate::tile::{SourceFormat, Tile};

/// What a backend exposes to have its tiles enumerated on a grid.
pub(crate) trait GridSource {
    fn source_format(&self) -> SourceFormat;

    /// `(height, width)` of `level`.
    fn level_extent(&self, level: usize) -> Result<(usize, usize), BackendError>;

    /// Dimensions that follow height and width in every region.
    fn sample_dims(&self) -> Vec<usize>;

    /// Read an in-bounds region of `level`; `origin` is in that level's frame.
    fn read_level(
        &self,
        origin: (usize, usize),
        size: (usize, usize),
        level: usize,
    ) -> Result<ArrayD<u8>, BackendError>;

    /// Factor from `level` pixels to full-resolution pixels.
    fn level_downsample(&self, _level: usize) -> Result<f64, BackendError> {
        Ok(1.0)
    }
}

/// Lazily extracts one tile per grid origin, zero-filling overhangs.
///
/// The grid runs over the tiled level; tile coords are reported in the
/// full-resolution frame.
pub(crate) struct GridTiles<'a, S: ?Sized> {
    source: &'a S,
    grid: CoordinateGrid,
    origins: GridIter,
    level: usize,
    downsample: f64,
}

impl<'a, S: GridSource + ?Sized> GridTiles<'a, S> {
    pub(crate) fn new(
        source: &'a S,
        shape: TileShape,
        stride: Option<TileShape>,
        pad: bool,
        level: usize,
    ) -> Result<Self, BackendError> {
        let extent = source.level_extent(level)?;
        let downsample = source.level_downsample(level)?;
        let grid = CoordinateGrid::new(extent, shape, stride, pad)?;
        Ok(Self {
            source,
            origins: grid.iter(),
            grid,
            level,
            downsample,
        })
    }

    /// Level origin scaled up to full resolution. Rounds up so that scaling
    /// back down and flooring lands on `origin` again.
    fn full_resolution(&self, origin: (usize, usize)) -> (usize, usize) {
        if self.downsample == 1.0 {
            return origin;
        }
        (
            (origin.0 as f64 * self.downsample).ceil() as usize,
            (origin.1 as f64 * self.downsample).ceil() as usize,
        )
    }

    fn extract(&self, origin: (usize, usize)) -> Result<ArrayD<u8>, BackendError> {
        let shape = self.grid.shape();
        if !self.grid.overhangs(origin) {
            return self
                .source
                .read_level(origin, shape.as_tuple(), self.level);
        }

        let extent = self.grid.extent();
        let clipped = (
            extent.0.saturating_sub(origin.0).min(shape.height),
            extent.1.saturating_sub(origin.1).min(shape.width),
        );
        trace!(origin = ?origin, clipped = ?clipped, "padding edge tile");

        let mut dims = vec![shape.height, shape.width];
        dims.extend(self.source.sample_dims());
        let mut padded = ArrayD::<u8>::zeros(IxDyn(&dims));
        if clipped.0 == 0 || clipped.1 == 0 {
            return Ok(padded);
        }

        let region = self.source.read_level(origin, clipped, self.level)?;
        padded
            .slice_each_axis_mut(|ax| match ax.axis.index() {
                0 => Slice::from(0..clipped.0),
                1 => Slice::from(0..clipped.1),
                _ => Slice::from(..),
            })
            .assign(&region);
        Ok(padded)
    }
}

impl<S: GridSource + ?Sized> Iterator for GridTiles<'_, S> {
    type Item = Result<Tile, BackendError>;

    fn next(&mut self) -> Option<Self::Item> {
        let origin = self.origins.next()?;
        let coords = self.full_resolution(origin);
        Some(self.extract(origin).map(|image| {
            Tile::new(image, coords).with_source(self.source.source_format())
        }))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.origins.size_hint()
    }
}
