//! TIFF header and IFD parsing.
//!
//! ```text
//! Classic TIFF (8 bytes)          BigTIFF (16 bytes)
//!   0..2  byte order (II / MM)      0..2   byte order
//!   2..4  version 42                2..4   version 43
//!   4..8  first IFD offset (u32)    4..6   offset size (8)
//!                                   6..8   reserved
//!                                   8..16  first IFD offset (u64)
//! ```
//!
//! An IFD is an entry count, followed by fixed-size entries (12 bytes classic,
//! 20 bytes BigTIFF) and the offset of the next IFD (0 terminates the chain).

use tracing::debug;

use crate::error::TiffError;
use crate::io::{
    read_u16_be, read_u16_le, read_u32_be, read_u32_le, read_u64_be, read_u64_le, RangeReader,
};

use super::tags::{FieldType, TiffTag};

// =============================================================================
// Constants
// =============================================================================

const BYTE_ORDER_LITTLE_ENDIAN: u16 = 0x4949;
const BYTE_ORDER_BIG_ENDIAN: u16 = 0x4D4D;

const VERSION_TIFF: u16 = 42;
const VERSION_BIGTIFF: u16 = 43;

/// Size of classic TIFF header in bytes
pub const TIFF_HEADER_SIZE: usize = 8;

/// Size of BigTIFF header in bytes
pub const BIGTIFF_HEADER_SIZE: usize = 16;

// =============================================================================
// ByteOrder
// =============================================================================

/// Byte order declared by the first two bytes of a TIFF file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteOrder {
    /// "II"
    LittleEndian,
    /// "MM"
    BigEndian,
}

impl ByteOrder {
    #[inline]
    pub fn read_u16(self, bytes: &[u8]) -> u16 {
        match self {
            ByteOrder::LittleEndian => read_u16_le(bytes),
            ByteOrder::BigEndian => read_u16_be(bytes),
        }
    }

    #[inline]
    pub fn read_u32(self, bytes: &[u8]) -> u32 {
        match self {
            ByteOrder::LittleEndian => read_u32_le(bytes),
            ByteOrder::BigEndian => read_u32_be(bytes),
        }
    }

    #[inline]
    pub fn read_u64(self, bytes: &[u8]) -> u64 {
        match self {
            ByteOrder::LittleEndian => read_u64_le(bytes),
            ByteOrder::BigEndian => read_u64_be(bytes),
        }
    }
}

// =============================================================================
// TiffHeader
// =============================================================================

/// Parsed TIFF file header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TiffHeader {
    pub byte_order: ByteOrder,

    /// 64-bit offsets and 20-byte IFD entries
    pub is_bigtiff: bool,

    pub first_ifd_offset: u64,
}

impl TiffHeader {
    /// Parse a header from the first bytes of a file.
    ///
    /// `bytes` should hold 16 bytes when available so BigTIFF can be
    /// recognised; 8 bytes suffice for classic TIFF.
    pub fn parse(bytes: &[u8], file_size: u64) -> Result<Self, TiffError> {
        if bytes.len() < TIFF_HEADER_SIZE {
            return Err(TiffError::FileTooSmall {
                required: TIFF_HEADER_SIZE as u64,
                actual: bytes.len() as u64,
            });
        }

        let magic = u16::from_le_bytes([bytes[0], bytes[1]]);
        let byte_order = match magic {
            BYTE_ORDER_LITTLE_ENDIAN => ByteOrder::LittleEndian,
            BYTE_ORDER_BIG_ENDIAN => ByteOrder::BigEndian,
            _ => return Err(TiffError::InvalidMagic(magic)),
        };

        let version = byte_order.read_u16(&bytes[2..4]);
        let (is_bigtiff, first_ifd_offset) = match version {
            VERSION_TIFF => (false, byte_order.read_u32(&bytes[4..8]) as u64),
            VERSION_BIGTIFF => {
                if bytes.len() < BIGTIFF_HEADER_SIZE {
                    return Err(TiffError::FileTooSmall {
                        required: BIGTIFF_HEADER_SIZE as u64,
                        actual: bytes.len() as u64,
                    });
                }
                let offset_size = byte_order.read_u16(&bytes[4..6]);
                if offset_size != 8 {
                    return Err(TiffError::InvalidBigTiffOffsetSize(offset_size));
                }
                (true, byte_order.read_u64(&bytes[8..16]))
            }
            _ => return Err(TiffError::InvalidVersion(version)),
        };

        if first_ifd_offset >= file_size {
            return Err(TiffError::InvalidIfdOffset(first_ifd_offset));
        }

        Ok(TiffHeader {
            byte_order,
            is_bigtiff,
            first_ifd_offset,
        })
    }

    /// Bytes per IFD entry: 12 classic, 20 BigTIFF.
    #[inline]
    pub const fn ifd_entry_size(&self) -> usize {
        if self.is_bigtiff {
            20
        } else {
            12
        }
    }

    /// Width of the leading entry count.
    #[inline]
    pub const fn ifd_count_size(&self) -> usize {
        if self.is_bigtiff {
            8
        } else {
            2
        }
    }

    /// Width of the trailing next-IFD offset, also the inline value capacity.
    #[inline]
    pub const fn offset_size(&self) -> usize {
        if self.is_bigtiff {
            8
        } else {
            4
        }
    }

    fn read_offset(&self, bytes: &[u8]) -> u64 {
        if self.is_bigtiff {
            self.byte_order.read_u64(bytes)
        } else {
            self.byte_order.read_u32(bytes) as u64
        }
    }
}

// =============================================================================
// IfdEntry
// =============================================================================

/// One 12/20-byte entry of an IFD.
///
/// The value field is kept raw: it either holds the value itself (when it
/// fits) or the file offset where the value array lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IfdEntry {
    pub tag_id: u16,
    pub field_type: Option<FieldType>,
    pub field_type_raw: u16,
    pub count: u64,
    pub value_offset_bytes: Vec<u8>,
    pub is_inline: bool,
}

impl IfdEntry {
    fn parse(bytes: &[u8], header: &TiffHeader) -> Self {
        let order = header.byte_order;
        let tag_id = order.read_u16(&bytes[0..2]);
        let field_type_raw = order.read_u16(&bytes[2..4]);
        let field_type = FieldType::from_u16(field_type_raw);

        let (count, value_start) = if header.is_bigtiff {
            (order.read_u64(&bytes[4..12]), 12)
        } else {
            (order.read_u32(&bytes[4..8]) as u64, 8)
        };
        let value_offset_bytes = bytes[value_start..value_start + header.offset_size()].to_vec();

        // Unknown types are never dereferenced
        let is_inline = field_type
            .map(|t| t.fits_inline(count, header.is_bigtiff))
            .unwrap_or(true);

        IfdEntry {
            tag_id,
            field_type,
            field_type_raw,
            count,
            value_offset_bytes,
            is_inline,
        }
    }

    /// Total byte length of the value, or None for unknown field types.
    pub fn value_byte_size(&self) -> Option<u64> {
        self.field_type
            .map(|t| t.size_in_bytes() as u64 * self.count)
    }

    /// File offset of an out-of-line value.
    pub fn value_offset(&self, byte_order: ByteOrder) -> u64 {
        if self.value_offset_bytes.len() == 8 {
            byte_order.read_u64(&self.value_offset_bytes)
        } else {
            byte_order.read_u32(&self.value_offset_bytes) as u64
        }
    }

    /// Single inline Short/Long value.
    pub fn inline_u32(&self, byte_order: ByteOrder) -> Option<u32> {
        if !self.is_inline || self.count != 1 {
            return None;
        }
        match self.field_type? {
            FieldType::Short => Some(byte_order.read_u16(&self.value_offset_bytes) as u32),
            FieldType::Long => Some(byte_order.read_u32(&self.value_offset_bytes)),
            _ => None,
        }
    }

    /// Single inline Short/Long/Long8 value.
    pub fn inline_u64(&self, byte_order: ByteOrder) -> Option<u64> {
        match self.field_type? {
            FieldType::Long8 if self.is_inline && self.count == 1 => {
                Some(byte_order.read_u64(&self.value_offset_bytes))
            }
            _ => self.inline_u32(byte_order).map(u64::from),
        }
    }
}

// =============================================================================
// Ifd
// =============================================================================

/// A parsed Image File Directory.
#[derive(Debug, Clone, Default)]
pub struct Ifd {
    pub entries: Vec<IfdEntry>,
    pub next_ifd_offset: u64,
}

impl Ifd {
    /// Byte length of an IFD holding `entry_count` entries.
    pub fn calculate_size(entry_count: u64, header: &TiffHeader) -> usize {
        header.ifd_count_size()
            + entry_count as usize * header.ifd_entry_size()
            + header.offset_size()
    }

    /// Parse an IFD from bytes starting at its entry count.
    pub fn parse(bytes: &[u8], header: &TiffHeader) -> Result<Self, TiffError> {
        let count_size = header.ifd_count_size();
        if bytes.len() < count_size {
            return Err(TiffError::FileTooSmall {
                required: count_size as u64,
                actual: bytes.len() as u64,
            });
        }

        let entry_count = if header.is_bigtiff {
            header.byte_order.read_u64(&bytes[..8])
        } else {
            header.byte_order.read_u16(&bytes[..2]) as u64
        };

        let required = Self::calculate_size(entry_count, header);
        if bytes.len() < required {
            return Err(TiffError::FileTooSmall {
                required: required as u64,
                actual: bytes.len() as u64,
            });
        }

        let entry_size = header.ifd_entry_size();
        let entries = (0..entry_count as usize)
            .map(|i| {
                let start = count_size + i * entry_size;
                IfdEntry::parse(&bytes[start..start + entry_size], header)
            })
            .collect();

        let next_start = count_size + entry_count as usize * entry_size;
        let next_ifd_offset = header.read_offset(&bytes[next_start..]);

        Ok(Ifd {
            entries,
            next_ifd_offset,
        })
    }

    pub fn get_entry_by_tag(&self, tag: TiffTag) -> Option<&IfdEntry> {
        let id = tag.as_u16();
        self.entries.iter().find(|e| e.tag_id == id)
    }

    /// Inline scalar value of a tag.
    pub fn get_u32(&self, tag: TiffTag, byte_order: ByteOrder) -> Option<u32> {
        self.get_entry_by_tag(tag)?.inline_u32(byte_order)
    }

    pub fn image_width(&self, byte_order: ByteOrder) -> Option<u32> {
        self.get_u32(TiffTag::ImageWidth, byte_order)
    }

    pub fn image_height(&self, byte_order: ByteOrder) -> Option<u32> {
        self.get_u32(TiffTag::ImageLength, byte_order)
    }

    pub fn tile_width(&self, byte_order: ByteOrder) -> Option<u32> {
        self.get_u32(TiffTag::TileWidth, byte_order)
    }

    pub fn tile_height(&self, byte_order: ByteOrder) -> Option<u32> {
        self.get_u32(TiffTag::TileLength, byte_order)
    }

    pub fn compression(&self, byte_order: ByteOrder) -> Option<u16> {
        self.get_u32(TiffTag::Compression, byte_order)
            .map(|v| v as u16)
    }

    pub fn samples_per_pixel(&self, byte_order: ByteOrder) -> u32 {
        self.get_u32(TiffTag::SamplesPerPixel, byte_order)
            .unwrap_or(1)
    }

    pub fn is_tiled(&self) -> bool {
        self.get_entry_by_tag(TiffTag::TileWidth).is_some()
            && self.get_entry_by_tag(TiffTag::TileOffsets).is_some()
    }

    pub fn is_stripped(&self) -> bool {
        self.get_entry_by_tag(TiffTag::StripOffsets).is_some()
    }
}

/// Walk the IFD chain from the header's first offset.
///
/// Stops at a zero next-offset, after `max_ifds` directories, or when an
/// offset repeats.
pub fn read_ifd_chain<R: RangeReader + ?Sized>(
    reader: &R,
    header: &TiffHeader,
    max_ifds: usize,
) -> Result<Vec<Ifd>, TiffError> {
    let mut ifds = Vec::new();
    let mut seen = Vec::new();
    let mut offset = header.first_ifd_offset;

    while offset != 0 && ifds.len() < max_ifds {
        if offset >= reader.size() {
            return Err(TiffError::InvalidIfdOffset(offset));
        }
        if seen.contains(&offset) {
            debug!(offset, "IFD chain loops back, stopping");
            break;
        }
        seen.push(offset);

        let count_bytes = reader.read_exact_at(offset, header.ifd_count_size())?;
        let entry_count = if header.is_bigtiff {
            header.byte_order.read_u64(&count_bytes)
        } else {
            header.byte_order.read_u16(&count_bytes) as u64
        };

        let ifd_bytes = reader.read_exact_at(offset, Ifd::calculate_size(entry_count, header))?;
        let ifd = Ifd::parse(&ifd_bytes, header)?;
        offset = ifd.next_ifd_offset;
        ifds.push(ifd);
    }

    debug!(
        identifier = reader.identifier(),
        count = ifds.len(),
        "parsed IFD chain"
    );
    Ok(ifds)
}

/// Read and parse the header of a TIFF reader.
pub fn read_header<R: RangeReader + ?Sized>(reader: &R) -> Result<TiffHeader, TiffError> {
    let len = std::cmp::min(BIGTIFF_HEADER_SIZE as u64, reader.size()) as usize;
    let bytes = reader.read_exact_at(0, len)?;
    TiffHeader::parse(&bytes, reader.size())
}

// =============================================================================
// Tests
// =============================================================================
