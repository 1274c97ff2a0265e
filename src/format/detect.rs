//! Picking a parser from a file's leading bytes.
//!
//! - **DICOM**: "DICM" after the 128-byte preamble
//! - **TIFF stack**: ImageJ or OME-XML description, or an untiled first page
//! - **Aperio SVS**: tiled, "Aperio" at the start of the first description
//! - **Pyramidal TIFF**: any other tiled TIFF

use tracing::debug;

use crate::error::FormatError;
use crate::io::RangeReader;

use super::dicom::{has_dicm_prefix, PREAMBLE_LEN};
use super::tiff::{first_description, read_header, read_ifd_chain, ByteOrder, TIFF_HEADER_SIZE};

/// Detected slide format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlideFormat {
    AperioSvs,
    PyramidalTiff,
    /// Multi-page TIFF read as z/c/t planes
    TiffStack,
    /// Tiled DICOM with encapsulated frames
    Dicom,
}

impl SlideFormat {
    pub const fn name(&self) -> &'static str {
        match self {
            SlideFormat::AperioSvs => "Aperio SVS",
            SlideFormat::PyramidalTiff => "Pyramidal TIFF",
            SlideFormat::TiffStack => "TIFF stack",
            SlideFormat::Dicom => "DICOM WSI",
        }
    }
}

/// Bytes needed to see the DICM marker
const PROBE_LEN: u64 = PREAMBLE_LEN + 4;

/// Detect the format of a slide file.
pub fn detect_format<R: RangeReader + ?Sized>(reader: &R) -> Result<SlideFormat, FormatError> {
    let probe_len = std::cmp::min(reader.size(), PROBE_LEN) as usize;
    let probe = reader.read_exact_at(0, probe_len)?;

    if has_dicm_prefix(&probe) {
        return Ok(SlideFormat::Dicom);
    }
    if !is_tiff_header(&probe) {
        return Err(FormatError::UnsupportedFormat {
            reason: "neither a TIFF header nor a DICOM preamble".to_string(),
        });
    }

    let header = read_header(reader)?;
    let first = read_ifd_chain(reader, &header, 1)?;
    let tiled = first.first().is_some_and(|ifd| ifd.is_tiled());
    let description = first_description(reader, &header, &first)?.unwrap_or_default();

    let format = if description.starts_with("ImageJ=") || description.contains("<OME") {
        SlideFormat::TiffStack
    } else if !tiled {
        SlideFormat::TiffStack
    } else if description.starts_with("Aperio") {
        SlideFormat::AperioSvs
    } else {
        SlideFormat::PyramidalTiff
    };

    debug!(
        identifier = reader.identifier(),
        format = format.name(),
        "detected slide format"
    );
    Ok(format)
}

/// Quick TIFF/BigTIFF magic check.
pub fn is_tiff_header(bytes: &[u8]) -> bool {
    if bytes.len() < TIFF_HEADER_SIZE {
        return false;
    }
    let byte_order = match &bytes[0..2] {
        b"II" => ByteOrder::LittleEndian,
        b"MM" => ByteOrder::BigEndian,
        _ => return false,
    };
    matches!(byte_order.read_u16(&bytes[2..4]), 42 | 43)
}
