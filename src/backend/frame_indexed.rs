//! Frame-level access to tiled whole-slide DICOM.
//!
//! Every frame is one fixed-size tile of the total pixel matrix, stored as
//! an encapsulated codestream. Frames are numbered row-major across the
//! frame grid:
//!
//! ```text
//! total 100x100, frame 10x10  ->  10 x 10 frame grid
//! frame 0..=9 across the top row, frame 11 at (10, 10)
//! ```
//!
//! The grid size is rounded up, so partial frames on the right and bottom
//! edges still count. A frame is read by seeking to its basic offset table
//! entry and concatenating fragments until the next frame starts.

use ndarray::{Array3, ArrayD};
use tracing::{debug, trace};

use crate::error::{BackendError, DecodeError};
use crate::format::codec::{decode_chunk, ChunkShape};
use crate::format::dicom::{BasicOffsetTable, DicomHeader, TransferSyntax};
use crate::grid::TileShape;
use crate::io::RangeReader;
use crate::tile::{SourceFormat, Tile};

use super::{SlideBackend, TileIter};

/// A frame addressed by number or by the coordinates of its top-left pixel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameLocation {
    Index(usize),
    Coords((usize, usize)),
}

impl From<usize> for FrameLocation {
    fn from(index: usize) -> Self {
        FrameLocation::Index(index)
    }
}

impl From<(usize, usize)> for FrameLocation {
    fn from(coords: (usize, usize)) -> Self {
        FrameLocation::Coords(coords)
    }
}

pub struct FrameIndexedBackend<R> {
    reader: R,
    header: DicomHeader,
    offsets: BasicOffsetTable,
    frame_shape: (usize, usize),
    shape: (usize, usize),
    n_frames: usize,
    n_rows: usize,
    n_cols: usize,
}

impl<R: RangeReader> FrameIndexedBackend<R> {
    /// Parse the header and basic offset table.
    pub fn open(reader: R) -> Result<Self, BackendError> {
        let header = DicomHeader::parse(&reader)?;
        let frame_shape = (header.rows as usize, header.columns as usize);
        if frame_shape.0 == 0 || frame_shape.1 == 0 {
            return Err(BackendError::InvalidArgument(format!(
                "frame shape {:?} has a zero dimension",
                frame_shape
            )));
        }
        let shape = (header.total_rows as usize, header.total_columns as usize);
        if shape.0 == 0 || shape.1 == 0 {
            return Err(BackendError::InvalidArgument(format!(
                "total pixel matrix {:?} has a zero dimension",
                shape
            )));
        }
        let n_rows = shape.0.div_ceil(frame_shape.0);
        let n_cols = shape.1.div_ceil(frame_shape.1);
        let n_frames = header.number_of_frames;

        let offsets = BasicOffsetTable::read(&reader, header.pixel_data_offset, n_frames)?;

        debug!(
            identifier = reader.identifier(),
            transfer_syntax = header.transfer_syntax.uid(),
            shape = ?shape,
            frame_shape = ?frame_shape,
            frame_grid = ?(n_rows, n_cols),
            n_frames,
            "opened frame-indexed backend"
        );

        Ok(Self {
            reader,
            header,
            offsets,
            frame_shape,
            shape,
            n_frames,
            n_rows,
            n_cols,
        })
    }

    pub fn frame_shape(&self) -> (usize, usize) {
        self.frame_shape
    }

    pub fn frame_count(&self) -> usize {
        self.n_frames
    }

    /// `(rows, cols)` of the frame grid.
    pub fn frame_grid(&self) -> (usize, usize) {
        (self.n_rows, self.n_cols)
    }

    pub fn transfer_syntax(&self) -> TransferSyntax {
        self.header.transfer_syntax
    }

    pub fn offset_table(&self) -> &BasicOffsetTable {
        &self.offsets
    }

    /// Top-left pixel of frame `index`.
    pub fn index_to_coords(&self, index: usize) -> (usize, usize) {
        (
            (index / self.n_cols) * self.frame_shape.0,
            (index % self.n_cols) * self.frame_shape.1,
        )
    }

    /// Frame whose top-left pixel is `coords`.
    pub fn coords_to_index(&self, coords: (usize, usize)) -> Result<usize, BackendError> {
        let (fi, fj) = self.frame_shape;
        if coords.0 % fi != 0 || coords.1 % fj != 0 {
            return Err(BackendError::MisalignedCoordinate {
                coords,
                frame_shape: self.frame_shape,
            });
        }
        Ok((coords.0 / fi) * self.n_cols + coords.1 / fj)
    }

    /// Decode one frame as `(rows, columns, samples)`.
    pub fn extract_frame(
        &self,
        location: impl Into<FrameLocation>,
    ) -> Result<Array3<u8>, BackendError> {
        let location = location.into();
        let index = match location {
            FrameLocation::Index(index) => index,
            FrameLocation::Coords(coords) => self.coords_to_index(coords)?,
        };
        if index >= self.n_frames {
            return Err(BackendError::RegionOutOfBounds(format!(
                "{:?} is past the last of {} frames",
                location, self.n_frames
            )));
        }
        self.read_frame(index)
    }

    fn read_frame(&self, index: usize) -> Result<Array3<u8>, BackendError> {
        let data = self.offsets.read_frame(&self.reader, index)?;
        trace!(index, bytes = data.len(), "decoding frame");
        let shape = ChunkShape::new(
            self.frame_shape.0,
            self.frame_shape.1,
            self.header.samples_per_pixel as usize,
        );
        let frame = decode_chunk(self.header.transfer_syntax.codec(), &data, shape)?;
        if frame.shape() != shape.dims().as_slice() {
            return Err(DecodeError::UnexpectedShape {
                expected: shape.dims(),
                actual: frame.shape().to_vec(),
            }
            .into());
        }
        Ok(frame)
    }

    fn check_level(level: usize) -> Result<(), BackendError> {
        if level != 0 {
            return Err(BackendError::UnsupportedOperation(format!(
                "frame-indexed images have a single level, got level {}",
                level
            )));
        }
        Ok(())
    }

    fn check_frame_size(&self, size: TileShape) -> Result<(), BackendError> {
        if size.as_tuple() != self.frame_shape {
            return Err(BackendError::InvalidArgument(format!(
                "size {} must equal the frame shape {}x{}",
                size, self.frame_shape.0, self.frame_shape.1
            )));
        }
        Ok(())
    }

    /// Frames in the last row or column may be partial.
    fn on_edge(&self, index: usize) -> bool {
        index % self.n_cols == self.n_cols - 1
            || index >= self.n_frames.saturating_sub(self.n_cols)
    }
}

impl<R: RangeReader> SlideBackend for FrameIndexedBackend<R> {
    fn source_format(&self) -> SourceFormat {
        SourceFormat::FrameIndexed
    }

    /// `location` must be a frame corner and `size` the frame shape.
    fn extract_region(
        &self,
        location: (usize, usize),
        size: TileShape,
        level: usize,
    ) -> Result<ArrayD<u8>, BackendError> {
        Self::check_level(level)?;
        self.check_frame_size(size)?;
        Ok(self.extract_frame(location)?.into_dyn())
    }

    fn get_image_shape(&self, level: usize) -> Result<(usize, usize), BackendError> {
        Self::check_level(level)?;
        Ok(self.shape)
    }

    fn get_thumbnail(&self, _size: &[usize]) -> Result<ArrayD<u8>, BackendError> {
        Err(BackendError::UnsupportedOperation(
            "frame-indexed images have no thumbnail".to_string(),
        ))
    }

    /// One tile per frame. `stride` is ignored; without `pad` frames in the
    /// last row and column are skipped, with it they are emitted as decoded.
    fn generate_tiles(
        &self,
        shape: TileShape,
        stride: Option<TileShape>,
        pad: bool,
        level: usize,
    ) -> Result<TileIter<'_>, BackendError> {
        Self::check_level(level)?;
        self.check_frame_size(shape)?;
        if stride.is_some_and(|s| s != shape) {
            debug!("stride is ignored for frame-indexed images");
        }

        Ok(Box::new(
            (0..self.n_frames)
                .filter(move |&index| pad || !self.on_edge(index))
                .map(move |index| -> Result<Tile, BackendError> {
                    let image = self.read_frame(index)?;
                    Ok(Tile::new(image.into_dyn(), self.index_to_coords(index))
                        .with_source(SourceFormat::FrameIndexed))
                }),
        ))
    }

    fn sample_shape(&self) -> Vec<usize> {
        vec![self.header.samples_per_pixel as usize]
    }
}
