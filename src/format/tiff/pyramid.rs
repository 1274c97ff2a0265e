//! Identifying the resolution pyramid among a TIFF's IFDs.
//!
//! Slide files mix pyramid levels with label, macro and thumbnail images.
//! Levels are the tiled IFDs whose dimensions divide the largest one by a
//! power of two along both axes; everything else is set aside.

use tracing::debug;

use crate::error::TiffError;
use crate::io::RangeReader;

use super::parser::{read_header, read_ifd_chain, Ifd, TiffHeader};
use super::tags::TiffTag;
use super::values::ValueReader;

/// IFD cap when walking a pyramidal file
pub const MAX_PYRAMID_IFDS: usize = 100;

/// Largest disagreement tolerated between horizontal and vertical downsample
const MAX_AXIS_SKEW: f64 = 0.1;

/// One level of the pyramid.
#[derive(Debug, Clone)]
pub struct PyramidLevel {
    /// 0 = full resolution
    pub level_index: usize,
    pub ifd_index: usize,
    pub width: u32,
    pub height: u32,
    /// Relative to level 0
    pub downsample: f64,
    pub ifd: Ifd,
}

/// A parsed TIFF pyramid, levels sorted from full resolution down.
#[derive(Debug, Clone)]
pub struct TiffPyramid {
    pub header: TiffHeader,
    pub levels: Vec<PyramidLevel>,
    /// IFDs that are not pyramid levels (label, macro, stripped thumbnail)
    pub other_ifds: Vec<usize>,
    /// ImageDescription of the first IFD
    pub description: Option<String>,
}

impl TiffPyramid {
    pub fn parse<R: RangeReader + ?Sized>(reader: &R) -> Result<Self, TiffError> {
        let header = read_header(reader)?;
        let ifds = read_ifd_chain(reader, &header, MAX_PYRAMID_IFDS)?;
        let description = first_description(reader, &header, &ifds)?;
        Self::build(header, ifds, description)
    }

    fn build(
        header: TiffHeader,
        ifds: Vec<Ifd>,
        description: Option<String>,
    ) -> Result<Self, TiffError> {
        let order = header.byte_order;
        let mut candidates = Vec::new();
        let mut other_ifds = Vec::new();

        for (ifd_index, ifd) in ifds.into_iter().enumerate() {
            match (ifd.is_tiled(), ifd.image_width(order), ifd.image_height(order)) {
                (true, Some(width), Some(height)) if width > 0 && height > 0 => {
                    candidates.push(PyramidLevel {
                        level_index: 0,
                        ifd_index,
                        width,
                        height,
                        downsample: 1.0,
                        ifd,
                    })
                }
                _ => other_ifds.push(ifd_index),
            }
        }

        candidates.sort_by_key(|l| std::cmp::Reverse(l.width as u64 * l.height as u64));

        let mut levels: Vec<PyramidLevel> = Vec::new();
        for mut level in candidates {
            let Some(base) = levels.first() else {
                levels.push(level);
                continue;
            };

            let dx = base.width as f64 / level.width as f64;
            let dy = base.height as f64 / level.height as f64;
            let downsample = (dx + dy) / 2.0;
            let skew = (dx - dy).abs() / downsample;

            if skew <= MAX_AXIS_SKEW && is_valid_downsample(downsample) {
                level.level_index = levels.len();
                level.downsample = downsample;
                levels.push(level);
            } else {
                other_ifds.push(level.ifd_index);
            }
        }

        if levels.is_empty() {
            return Err(TiffError::NoPyramidLevels);
        }

        debug!(
            levels = levels.len(),
            width = levels[0].width,
            height = levels[0].height,
            "identified TIFF pyramid"
        );

        Ok(TiffPyramid {
            header,
            levels,
            other_ifds,
            description,
        })
    }

    pub fn level_count(&self) -> usize {
        self.levels.len()
    }

    pub fn get_level(&self, level: usize) -> Option<&PyramidLevel> {
        self.levels.get(level)
    }

    /// Full-resolution (width, height).
    pub fn dimensions(&self) -> (u32, u32) {
        (self.levels[0].width, self.levels[0].height)
    }

    /// Whether the first ImageDescription carries the Aperio marker.
    pub fn is_aperio(&self) -> bool {
        self.description
            .as_deref()
            .is_some_and(|d| d.starts_with("Aperio"))
    }

    /// Smallest level whose downsample does not exceed `downsample`.
    ///
    /// Reading from it and resampling never upsamples.
    pub fn best_level_for_downsample(&self, downsample: f64) -> &PyramidLevel {
        self.levels
            .iter()
            .rev()
            .find(|l| l.downsample <= downsample * 1.01)
            .unwrap_or(&self.levels[0])
    }
}

/// Power-of-two factor of at least 2, within 20%.
fn is_valid_downsample(downsample: f64) -> bool {
    let rounded = downsample.log2().round();
    if rounded < 1.0 {
        return false;
    }
    let ratio = downsample / 2.0_f64.powf(rounded);
    ratio > 0.8 && ratio < 1.2
}

/// ImageDescription of the first IFD, if any.
pub fn first_description<R: RangeReader + ?Sized>(
    reader: &R,
    header: &TiffHeader,
    ifds: &[Ifd],
) -> Result<Option<String>, TiffError> {
    let Some(entry) = ifds
        .first()
        .and_then(|ifd| ifd.get_entry_by_tag(TiffTag::ImageDescription))
    else {
        return Ok(None);
    };
    ValueReader::new(reader, header)
        .read_string(entry)
        .map(Some)
}
