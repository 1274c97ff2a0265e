//! Tile origin enumeration.
//!
//! A [`CoordinateGrid`] lists the top-left corners of every tile of a given
//! shape laid over an image extent with a given stride, in row-major order.
//!
//! # Padding
//!
//! Without padding only tiles that fit entirely inside the image are
//! produced, so each axis holds `floor((extent - tile) / stride) + 1` tiles
//! (none when the tile is larger than the extent). With padding each axis
//! holds `floor(extent / stride) + 1` tiles and the last ones may hang over
//! the image edge; the backend fills the overhang with zeros.

use std::fmt;
use std::str::FromStr;

use tracing::debug;

use crate::error::BackendError;

/// A 2-D `(height, width)` pair used for tile shapes and strides.
///
/// Parses from `"256"` (square) or `"256x512"` (height x width).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TileShape {
    pub height: usize,
    pub width: usize,
}

impl TileShape {
    pub const fn new(height: usize, width: usize) -> Self {
        Self { height, width }
    }

    pub const fn square(size: usize) -> Self {
        Self::new(size, size)
    }

    pub const fn as_tuple(&self) -> (usize, usize) {
        (self.height, self.width)
    }

    pub const fn is_empty(&self) -> bool {
        self.height == 0 || self.width == 0
    }
}

impl From<usize> for TileShape {
    fn from(size: usize) -> Self {
        TileShape::square(size)
    }
}

impl From<(usize, usize)> for TileShape {
    fn from((height, width): (usize, usize)) -> Self {
        TileShape::new(height, width)
    }
}

impl fmt::Display for TileShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.height, self.width)
    }
}

impl FromStr for TileShape {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parse = |part: &str| {
            part.trim()
                .parse::<usize>()
                .map_err(|_| format!("invalid tile dimension '{}' in '{}'", part, s))
        };
        match s.split_once(['x', 'X']) {
            Some((h, w)) => Ok(TileShape::new(parse(h)?, parse(w)?)),
            None => Ok(TileShape::square(parse(s)?)),
        }
    }
}

/// Tile origins for one extent, shape, stride and padding policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoordinateGrid {
    extent: (usize, usize),
    shape: TileShape,
    stride: TileShape,
    pad: bool,
    rows: usize,
    cols: usize,
}

impl CoordinateGrid {
    /// Build a grid; `stride` defaults to `shape`.
    pub fn new(
        extent: (usize, usize),
        shape: TileShape,
        stride: Option<TileShape>,
        pad: bool,
    ) -> Result<Self, BackendError> {
        let stride = stride.unwrap_or(shape);
        if shape.is_empty() {
            return Err(BackendError::InvalidArgument(format!(
                "tile shape {} has a zero dimension",
                shape
            )));
        }
        if stride.is_empty() {
            return Err(BackendError::InvalidArgument(format!(
                "stride {} has a zero dimension",
                stride
            )));
        }

        let rows = tiles_along(extent.0, shape.height, stride.height, pad);
        let cols = tiles_along(extent.1, shape.width, stride.width, pad);
        debug!(
            extent = ?extent,
            shape = %shape,
            stride = %stride,
            pad,
            rows,
            cols,
            "built coordinate grid"
        );

        Ok(Self {
            extent,
            shape,
            stride,
            pad,
            rows,
            cols,
        })
    }

    pub fn extent(&self) -> (usize, usize) {
        self.extent
    }

    pub fn shape(&self) -> TileShape {
        self.shape
    }

    pub fn stride(&self) -> TileShape {
        self.stride
    }

    pub fn pad(&self) -> bool {
        self.pad
    }

    /// Tiles along the vertical axis.
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Tiles along the horizontal axis.
    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn len(&self) -> usize {
        self.rows * self.cols
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Origin of the `index`-th tile in row-major order.
    pub fn origin(&self, index: usize) -> Option<(usize, usize)> {
        if index >= self.len() {
            return None;
        }
        Some((
            (index / self.cols) * self.stride.height,
            (index % self.cols) * self.stride.width,
        ))
    }

    /// Whether the tile at `origin` reaches past the image extent.
    pub fn overhangs(&self, origin: (usize, usize)) -> bool {
        origin.0 + self.shape.height > self.extent.0 || origin.1 + self.shape.width > self.extent.1
    }

    /// Iterate the origins; each call starts over from the first tile.
    pub fn iter(&self) -> GridIter {
        GridIter {
            grid: *self,
            next: 0,
        }
    }
}

impl IntoIterator for &CoordinateGrid {
    type Item = (usize, usize);
    type IntoIter = GridIter;

    fn into_iter(self) -> GridIter {
        self.iter()
    }
}

/// Tile count along one axis.
pub fn tiles_along(extent: usize, tile: usize, stride: usize, pad: bool) -> usize {
    if pad {
        extent / stride + 1
    } else if tile > extent {
        0
    } else {
        (extent - tile) / stride + 1
    }
}

/// Row-major iterator over a grid's tile origins.
#[derive(Debug, Clone)]
pub struct GridIter {
    grid: CoordinateGrid,
    next: usize,
}

impl Iterator for GridIter {
    type Item = (usize, usize);

    fn next(&mut self) -> Option<Self::Item> {
        let origin = self.grid.origin(self.next)?;
        self.next += 1;
        Some(origin)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.grid.len().saturating_sub(self.next);
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for GridIter {}

impl std::iter::FusedIterator for GridIter {}
