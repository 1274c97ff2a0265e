//! Single-level 5-D images: rows, columns, z-slices, channels, timepoints.
//!
//! Regions come back as `[height, width, z, c, t]` arrays holding every
//! plane of the requested window. Pixel access goes through a
//! [`PlaneSource`]; [`StackSource`] serves it from a multi-page TIFF.

use ndarray::{s, Array3, Array5, ArrayD, Ix5};
use tracing::debug;

use crate::error::BackendError;
use crate::format::tiff::TiffStack;
use crate::grid::TileShape;
use crate::io::RangeReader;
use crate::tile::SourceFormat;

use super::grid_tiles::{GridSource, GridTiles};
use super::resample::resize_hw;
use super::{SlideBackend, TileIter};

/// Largest image, in samples across x, y, z and c, that a thumbnail may
/// load at once.
pub const MAX_THUMBNAIL_SAMPLES: u64 = 2_147_483_647;

/// Extents of the five axes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VolumeShape {
    pub size_x: usize,
    pub size_y: usize,
    pub size_z: usize,
    pub size_c: usize,
    pub size_t: usize,
}

impl VolumeShape {
    /// `[height, width, z, c, t]`
    pub fn as_array_dims(&self) -> [usize; 5] {
        [self.size_y, self.size_x, self.size_z, self.size_c, self.size_t]
    }
}

/// Plane-level pixel access for a volumetric image.
pub trait PlaneSource {
    fn volume_shape(&self) -> VolumeShape;

    /// All channels of plane `(z, t)` over the window at `origin` (row, col),
    /// as `(height, width, channels)`. Pixels past the edge read as zero.
    fn read_planes(
        &self,
        z: usize,
        t: usize,
        origin: (usize, usize),
        size: (usize, usize),
    ) -> Result<Array3<u8>, BackendError>;

    fn identifier(&self) -> &str;
}

/// [`PlaneSource`] over a TIFF page stack.
pub struct StackSource<R> {
    reader: R,
    stack: TiffStack,
}

impl<R: RangeReader> StackSource<R> {
    pub fn open(reader: R) -> Result<Self, BackendError> {
        let stack = TiffStack::parse(&reader)?;
        Ok(Self { reader, stack })
    }

    pub fn stack(&self) -> &TiffStack {
        &self.stack
    }
}

impl<R: RangeReader> PlaneSource for StackSource<R> {
    fn volume_shape(&self) -> VolumeShape {
        let (width, height) = self.stack.plane_size();
        let dims = self.stack.dims;
        VolumeShape {
            size_x: width as usize,
            size_y: height as usize,
            size_z: dims.size_z,
            size_c: dims.size_c,
            size_t: dims.size_t,
        }
    }

    fn read_planes(
        &self,
        z: usize,
        t: usize,
        origin: (usize, usize),
        size: (usize, usize),
    ) -> Result<Array3<u8>, BackendError> {
        let dims = self.stack.dims;
        let page = |c: usize| {
            let index = dims.page_index(z, c, t);
            self.stack.pages.get(index).ok_or_else(|| {
                BackendError::RegionOutOfBounds(format!(
                    "plane (z={}, c={}, t={}) maps to page {} of {}",
                    z,
                    c,
                    t,
                    index,
                    self.stack.pages.len()
                ))
            })
        };

        if dims.interleaved_channels {
            return page(0)?.read_region(&self.reader, origin, size);
        }

        let mut out = Array3::<u8>::zeros((size.0, size.1, dims.size_c));
        for c in 0..dims.size_c {
            let plane = page(c)?.read_region(&self.reader, origin, size)?;
            out.slice_mut(s![.., .., c]).assign(&plane.slice(s![.., .., 0]));
        }
        Ok(out)
    }

    fn identifier(&self) -> &str {
        self.reader.identifier()
    }
}

/// Volumetric backend; only level 0 exists.
pub struct VolumetricBackend<P> {
    source: P,
    shape: VolumeShape,
}

impl<R: RangeReader> VolumetricBackend<StackSource<R>> {
    /// Open a multi-page TIFF as a volume.
    pub fn open(reader: R) -> Result<Self, BackendError> {
        Self::new(StackSource::open(reader)?)
    }
}

impl<P: PlaneSource> VolumetricBackend<P> {
    pub fn new(source: P) -> Result<Self, BackendError> {
        let shape = source.volume_shape();
        if shape.as_array_dims().contains(&0) {
            return Err(BackendError::InvalidArgument(format!(
                "volume {:?} has an empty axis",
                shape
            )));
        }
        debug!(
            identifier = source.identifier(),
            x = shape.size_x,
            y = shape.size_y,
            z = shape.size_z,
            c = shape.size_c,
            t = shape.size_t,
            "opened volumetric backend"
        );
        Ok(Self { source, shape })
    }

    pub fn volume_shape(&self) -> VolumeShape {
        self.shape
    }

    pub fn source(&self) -> &P {
        &self.source
    }

    fn check_level(level: usize) -> Result<(), BackendError> {
        if level != 0 {
            return Err(BackendError::UnsupportedOperation(format!(
                "volumetric images have a single level, got level {}",
                level
            )));
        }
        Ok(())
    }

    fn read_volume(
        &self,
        origin: (usize, usize),
        size: (usize, usize),
    ) -> Result<Array5<u8>, BackendError> {
        let VolumeShape {
            size_z,
            size_c,
            size_t,
            ..
        } = self.shape;
        let mut out = Array5::<u8>::zeros((size.0, size.1, size_z, size_c, size_t));
        for z in 0..size_z {
            for t in 0..size_t {
                let planes = self.source.read_planes(z, t, origin, size)?;
                if planes.dim() != (size.0, size.1, size_c) {
                    return Err(BackendError::InvalidArgument(format!(
                        "plane source returned {:?} for a {:?} window of {} channels",
                        planes.dim(),
                        size,
                        size_c
                    )));
                }
                out.slice_mut(s![.., .., z, .., t]).assign(&planes);
            }
        }
        Ok(out)
    }
}

impl<P: PlaneSource> GridSource for VolumetricBackend<P> {
    fn source_format(&self) -> SourceFormat {
        SourceFormat::Volumetric
    }

    fn level_extent(&self, level: usize) -> Result<(usize, usize), BackendError> {
        Self::check_level(level)?;
        Ok((self.shape.size_y, self.shape.size_x))
    }

    fn sample_dims(&self) -> Vec<usize> {
        vec![self.shape.size_z, self.shape.size_c, self.shape.size_t]
    }

    fn read_level(
        &self,
        origin: (usize, usize),
        size: (usize, usize),
        level: usize,
    ) -> Result<ArrayD<u8>, BackendError> {
        Self::check_level(level)?;
        Ok(self.read_volume(origin, size)?.into_dyn())
    }
}

impl<P: PlaneSource> SlideBackend for VolumetricBackend<P> {
    fn source_format(&self) -> SourceFormat {
        SourceFormat::Volumetric
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
        self.read_level(location, size.as_tuple(), level)
    }

    fn get_image_shape(&self, level: usize) -> Result<(usize, usize), BackendError> {
        self.level_extent(level)
    }

    /// Resample the whole volume to `size`, given as up to five target
    /// extents `[height, width, z, c, t]`; missing trailing extents keep the
    /// image's own. Channels cannot be resampled.
    fn get_thumbnail(&self, size: &[usize]) -> Result<ArrayD<u8>, BackendError> {
        let full = self.shape.as_array_dims();
        if size.len() > full.len() {
            return Err(BackendError::InvalidArgument(format!(
                "thumbnail size {:?} has more than 5 axes",
                size
            )));
        }
        let mut target = full;
        target[..size.len()].copy_from_slice(size);
        if target.contains(&0) {
            return Err(BackendError::InvalidArgument(format!(
                "thumbnail size {:?} has a zero axis",
                target
            )));
        }
        if target[3] != full[3] {
            return Err(BackendError::InvalidArgument(format!(
                "cannot interpolate between {} channels to {}",
                full[3], target[3]
            )));
        }

        let samples = full[..4].iter().map(|&n| n as u64).product::<u64>();
        if samples > MAX_THUMBNAIL_SAMPLES {
            return Err(BackendError::CapacityExceeded {
                pixels: samples,
                limit: MAX_THUMBNAIL_SAMPLES,
            });
        }

        let volume = self.read_volume((0, 0), (full[0], full[1]))?;
        if target == full {
            return Ok(volume.into_dyn());
        }

        let mut out = Array5::<u8>::zeros((target[0], target[1], target[2], target[3], target[4]));
        for tz in 0..target[2] {
            let z = tz * full[2] / target[2];
            for tt in 0..target[4] {
                let t = tt * full[4] / target[4];
                let plane = volume.slice(s![.., .., z, .., t]);
                let resized = resize_hw(plane, (target[0], target[1]))?;
                out.slice_mut(s![.., .., tz, .., tt]).assign(&resized);
            }
        }
        debug!(target = ?target, "resampled volumetric thumbnail");
        Ok(out.into_dyn())
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

/// Reinterpret a region returned by [`VolumetricBackend`] as 5-D.
pub fn as_volume(region: ArrayD<u8>) -> Result<Array5<u8>, BackendError> {
    region
        .into_dimensionality::<Ix5>()
        .map_err(|e| BackendError::InvalidArgument(e.to_string()))
}
