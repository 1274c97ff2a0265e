//! Multi-page TIFF stacks: every IFD is one 2-D plane of a 5-D image.
//!
//! The z/c/t extents and the order planes are stored in come from the first
//! ImageDescription when it is an ImageJ header or OME-XML; otherwise every
//! page is a z-slice and channels are the samples of each pixel.

use tracing::{debug, warn};

use crate::error::TiffError;
use crate::io::RangeReader;

use super::layout::ChunkLayout;
use super::parser::{read_header, read_ifd_chain, TiffHeader};
use super::pyramid::first_description;

/// IFD cap when walking a page stack
pub const MAX_STACK_PAGES: usize = 65536;

/// Order in which z, c and t vary across consecutive pages, fastest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DimensionOrder {
    Czt,
    Ctz,
    Zct,
    Ztc,
    Tcz,
    Tzc,
}

impl DimensionOrder {
    /// Parse an OME `DimensionOrder` attribute such as `XYZCT`.
    pub fn from_ome(value: &str) -> Option<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "XYCZT" => Some(DimensionOrder::Czt),
            "XYCTZ" => Some(DimensionOrder::Ctz),
            "XYZCT" => Some(DimensionOrder::Zct),
            "XYZTC" => Some(DimensionOrder::Ztc),
            "XYTCZ" => Some(DimensionOrder::Tcz),
            "XYTZC" => Some(DimensionOrder::Tzc),
            _ => None,
        }
    }
}

/// Extents of the non-spatial axes and how pages map onto them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StackDims {
    pub size_z: usize,
    pub size_c: usize,
    pub size_t: usize,
    pub order: DimensionOrder,
    /// Channels live in the samples of each page rather than in separate pages
    pub interleaved_channels: bool,
}

impl StackDims {
    /// Every page a z-slice, channels in samples.
    pub fn fallback(pages: usize, samples_per_pixel: usize) -> Self {
        StackDims {
            size_z: pages.max(1),
            size_c: samples_per_pixel.max(1),
            size_t: 1,
            order: DimensionOrder::Zct,
            interleaved_channels: true,
        }
    }

    /// Number of pages these dimensions occupy.
    pub fn page_count(&self) -> usize {
        let c = if self.interleaved_channels {
            1
        } else {
            self.size_c
        };
        self.size_z * c * self.size_t
    }

    /// Page holding plane `(z, c, t)`; `c` is ignored for interleaved channels.
    pub fn page_index(&self, z: usize, c: usize, t: usize) -> usize {
        let (c, size_c) = if self.interleaved_channels {
            (0, 1)
        } else {
            (c, self.size_c)
        };
        let ((a, na), (b, nb), (d, _)) = match self.order {
            DimensionOrder::Czt => ((c, size_c), (z, self.size_z), (t, self.size_t)),
            DimensionOrder::Ctz => ((c, size_c), (t, self.size_t), (z, self.size_z)),
            DimensionOrder::Zct => ((z, self.size_z), (c, size_c), (t, self.size_t)),
            DimensionOrder::Ztc => ((z, self.size_z), (t, self.size_t), (c, size_c)),
            DimensionOrder::Tcz => ((t, self.size_t), (c, size_c), (z, self.size_z)),
            DimensionOrder::Tzc => ((t, self.size_t), (z, self.size_z), (c, size_c)),
        };
        a + na * (b + nb * d)
    }
}

/// Parse an ImageJ description (`ImageJ=...\nimages=..\nchannels=..`).
pub fn parse_imagej(description: &str, samples_per_pixel: usize) -> Option<StackDims> {
    if !description.starts_with("ImageJ=") {
        return None;
    }

    let value = |key: &str| -> Option<usize> {
        description.lines().find_map(|line| {
            let (k, v) = line.split_once('=')?;
            (k.trim() == key).then(|| v.trim().parse().ok()).flatten()
        })
    };

    let images = value("images");
    let mut size_c = value("channels").unwrap_or(1);
    let interleaved_channels = samples_per_pixel > 1;
    if interleaved_channels {
        size_c = samples_per_pixel;
    }
    let size_t = value("frames").unwrap_or(1);
    let per_channel = if interleaved_channels { 1 } else { size_c };
    let size_z = value("slices").unwrap_or_else(|| {
        images
            .map(|n| n / (per_channel * size_t).max(1))
            .unwrap_or(1)
    });

    Some(StackDims {
        size_z: size_z.max(1),
        size_c: size_c.max(1),
        size_t: size_t.max(1),
        order: DimensionOrder::Czt,
        interleaved_channels,
    })
}

/// Parse the first `<Pixels>` element of an OME-XML description.
pub fn parse_ome(description: &str, samples_per_pixel: usize) -> Option<StackDims> {
    if !description.contains("<OME") {
        return None;
    }
    let start = description.find("<Pixels")?;
    let end = description[start..].find('>')? + start;
    let element = &description[start..end];

    let attr = |name: &str| -> Option<&str> {
        let needle = format!(" {}=\"", name);
        let from = element.find(&needle)? + needle.len();
        let len = element[from..].find('"')?;
        Some(&element[from..from + len])
    };
    let size = |name: &str| attr(name).and_then(|v| v.parse::<usize>().ok()).unwrap_or(1);

    let size_c = size("SizeC");
    Some(StackDims {
        size_z: size("SizeZ").max(1),
        size_c: size_c.max(1),
        size_t: size("SizeT").max(1),
        order: attr("DimensionOrder")
            .and_then(DimensionOrder::from_ome)
            .unwrap_or(DimensionOrder::Zct),
        interleaved_channels: samples_per_pixel > 1 && samples_per_pixel == size_c,
    })
}

/// A TIFF file read as a stack of same-sized planes.
#[derive(Debug, Clone)]
pub struct TiffStack {
    pub header: TiffHeader,
    pub pages: Vec<ChunkLayout>,
    pub dims: StackDims,
}

impl TiffStack {
    pub fn parse<R: RangeReader + ?Sized>(reader: &R) -> Result<Self, TiffError> {
        let header = read_header(reader)?;
        let ifds = read_ifd_chain(reader, &header, MAX_STACK_PAGES)?;
        let description = first_description(reader, &header, &ifds)?;

        let pages = ifds
            .iter()
            .map(|ifd| ChunkLayout::load(reader, &header, ifd))
            .collect::<Result<Vec<_>, _>>()?;
        let first = pages.first().ok_or(TiffError::NoPyramidLevels)?;
        let (width, height, spp) = (first.width, first.height, first.samples_per_pixel);

        // Trailing pages of another size (e.g. an embedded thumbnail) are dropped
        let matching = pages
            .iter()
            .take_while(|p| p.width == width && p.height == height && p.samples_per_pixel == spp)
            .count();
        let pages: Vec<ChunkLayout> = pages.into_iter().take(matching).collect();
        let spp = spp as usize;

        let declared = description
            .as_deref()
            .and_then(|d| parse_imagej(d, spp).or_else(|| parse_ome(d, spp)));
        let dims = match declared {
            Some(dims) if dims.page_count() <= pages.len() => dims,
            Some(dims) => {
                warn!(
                    declared = dims.page_count(),
                    pages = pages.len(),
                    "stack description disagrees with page count, treating pages as z-slices"
                );
                StackDims::fallback(pages.len(), spp)
            }
            None => StackDims::fallback(pages.len(), spp),
        };

        debug!(
            identifier = reader.identifier(),
            width,
            height,
            z = dims.size_z,
            c = dims.size_c,
            t = dims.size_t,
            "opened TIFF stack"
        );

        Ok(TiffStack {
            header,
            pages,
            dims,
        })
    }

    /// (width, height) of every plane.
    pub fn plane_size(&self) -> (u32, u32) {
        (self.pages[0].width, self.pages[0].height)
    }
}
