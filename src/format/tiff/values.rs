//! Reading IFD entry values, inline or out-of-line.
//!
//! Offset arrays (TileOffsets, StripByteCounts, ...) are fetched with a single
//! read each.

use bytes::Bytes;

use crate::error::TiffError;
use crate::io::RangeReader;

use super::parser::{ByteOrder, IfdEntry, TiffHeader};
use super::tags::FieldType;

/// Reads entry values from a TIFF file using its header's byte order.
pub struct ValueReader<'a, R: RangeReader + ?Sized> {
    reader: &'a R,
    header: &'a TiffHeader,
}

impl<'a, R: RangeReader + ?Sized> ValueReader<'a, R> {
    pub fn new(reader: &'a R, header: &'a TiffHeader) -> Self {
        Self { reader, header }
    }

    #[inline]
    pub fn byte_order(&self) -> ByteOrder {
        self.header.byte_order
    }

    /// Raw value bytes: copied from the entry when inline, read from the
    /// file otherwise.
    pub fn read_bytes(&self, entry: &IfdEntry) -> Result<Bytes, TiffError> {
        let size = entry
            .value_byte_size()
            .ok_or(TiffError::UnknownFieldType(entry.field_type_raw))? as usize;

        if entry.is_inline {
            Ok(Bytes::copy_from_slice(&entry.value_offset_bytes[..size]))
        } else {
            let offset = entry.value_offset(self.header.byte_order);
            Ok(self.reader.read_exact_at(offset, size)?)
        }
    }

    /// All values of an integer entry widened to u64.
    pub fn read_u64_array(&self, entry: &IfdEntry) -> Result<Vec<u64>, TiffError> {
        let field_type = entry
            .field_type
            .ok_or(TiffError::UnknownFieldType(entry.field_type_raw))?;
        if !matches!(
            field_type,
            FieldType::Short | FieldType::Long | FieldType::Long8 | FieldType::Byte
        ) {
            return Err(TiffError::InvalidTagValue {
                tag: "integer array",
                message: format!("unexpected field type {:?}", field_type),
            });
        }
        if entry.count == 0 {
            return Ok(Vec::new());
        }

        let bytes = self.read_bytes(entry)?;
        Ok(parse_u64_array(
            &bytes,
            entry.count as usize,
            field_type,
            self.header.byte_order,
        ))
    }

    /// First value of an integer entry, inline or not.
    pub fn read_u64(&self, entry: &IfdEntry) -> Result<u64, TiffError> {
        if let Some(value) = entry.inline_u64(self.header.byte_order) {
            return Ok(value);
        }
        self.read_u64_array(entry)?
            .first()
            .copied()
            .ok_or(TiffError::InvalidTagValue {
                tag: "integer",
                message: "empty value".to_string(),
            })
    }

    /// ASCII value with the NUL terminator stripped.
    pub fn read_string(&self, entry: &IfdEntry) -> Result<String, TiffError> {
        if entry.field_type != Some(FieldType::Ascii) {
            return Err(TiffError::InvalidTagValue {
                tag: "string",
                message: format!("expected Ascii, got type {}", entry.field_type_raw),
            });
        }

        let bytes = self.read_bytes(entry)?;
        let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
        Ok(String::from_utf8_lossy(&bytes[..end]).into_owned())
    }
}

/// Decode `count` integers of `field_type` from `bytes`, ignoring a short tail.
pub fn parse_u64_array(
    bytes: &[u8],
    count: usize,
    field_type: FieldType,
    byte_order: ByteOrder,
) -> Vec<u64> {
    let width = field_type.size_in_bytes();
    bytes
        .chunks_exact(width)
        .take(count)
        .filter_map(|chunk| match field_type {
            FieldType::Byte => Some(chunk[0] as u64),
            FieldType::Short => Some(byte_order.read_u16(chunk) as u64),
            FieldType::Long => Some(byte_order.read_u32(chunk) as u64),
            FieldType::Long8 => Some(byte_order.read_u64(chunk)),
            _ => None,
        })
        .collect()
}
