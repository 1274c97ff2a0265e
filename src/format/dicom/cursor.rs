//! Bounds-checked sequential reads over a DICOM byte stream.

use bytes::Bytes;

use crate::error::DicomError;
use crate::io::{read_u16_le, read_u32_le, RangeReader};

/// Length value marking an undefined-length element or item
pub const UNDEFINED_LENGTH: u32 = 0xFFFF_FFFF;

/// A (group, element) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Tag(pub u16, pub u16);

impl Tag {
    pub const ITEM: Tag = Tag(0xFFFE, 0xE000);
    pub const ITEM_DELIMITER: Tag = Tag(0xFFFE, 0xE00D);
    pub const SEQUENCE_DELIMITER: Tag = Tag(0xFFFE, 0xE0DD);

    pub fn is_delimitation(&self) -> bool {
        self.0 == 0xFFFE
    }
}

impl std::fmt::Display for Tag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({:04X},{:04X})", self.0, self.1)
    }
}

/// Header of an explicit-VR little-endian data element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ElementHeader {
    pub tag: Tag,
    pub vr: [u8; 2],
    pub length: u32,
}

impl ElementHeader {
    pub fn has_undefined_length(&self) -> bool {
        self.length == UNDEFINED_LENGTH
    }
}

/// VRs encoded with 2 reserved bytes and a 4-byte length.
fn has_long_length(vr: [u8; 2]) -> bool {
    matches!(
        &vr,
        b"OB" | b"OD" | b"OF" | b"OL" | b"OV" | b"OW" | b"SQ" | b"SV" | b"UC" | b"UN" | b"UR"
            | b"UT" | b"UV"
    )
}

/// A read position over a [`RangeReader`].
pub struct Cursor<'a, R: RangeReader + ?Sized> {
    reader: &'a R,
    pos: u64,
}

impl<'a, R: RangeReader + ?Sized> Cursor<'a, R> {
    pub fn new(reader: &'a R, pos: u64) -> Self {
        Self { reader, pos }
    }

    pub fn position(&self) -> u64 {
        self.pos
    }

    pub fn seek(&mut self, pos: u64) {
        self.pos = pos;
    }

    pub fn remaining(&self) -> u64 {
        self.reader.size().saturating_sub(self.pos)
    }

    fn ensure(&self, needed: u64) -> Result<(), DicomError> {
        if needed > self.remaining() {
            return Err(DicomError::Truncated {
                offset: self.pos,
                needed,
            });
        }
        Ok(())
    }

    pub fn read_bytes(&mut self, len: usize) -> Result<Bytes, DicomError> {
        self.ensure(len as u64)?;
        let bytes = self.reader.read_exact_at(self.pos, len)?;
        self.pos += len as u64;
        Ok(bytes)
    }

    pub fn skip(&mut self, len: u64) -> Result<(), DicomError> {
        self.ensure(len)?;
        self.pos += len;
        Ok(())
    }

    pub fn read_u16(&mut self) -> Result<u16, DicomError> {
        Ok(read_u16_le(&self.read_bytes(2)?))
    }

    pub fn read_u32(&mut self) -> Result<u32, DicomError> {
        Ok(read_u32_le(&self.read_bytes(4)?))
    }

    pub fn read_tag(&mut self) -> Result<Tag, DicomError> {
        let group = self.read_u16()?;
        let element = self.read_u16()?;
        Ok(Tag(group, element))
    }

    /// Peek at the next tag without consuming it.
    pub fn peek_tag(&mut self) -> Result<Tag, DicomError> {
        let pos = self.pos;
        let tag = self.read_tag();
        self.pos = pos;
        tag
    }

    /// Item or delimiter header: tag + u32 length.
    pub fn read_item_header(&mut self) -> Result<(Tag, u32), DicomError> {
        let offset = self.pos;
        let tag = self.read_tag()?;
        if !tag.is_delimitation() {
            return Err(DicomError::UnexpectedTag {
                offset,
                group: tag.0,
                element: tag.1,
            });
        }
        Ok((tag, self.read_u32()?))
    }

    /// Explicit VR little-endian element header.
    pub fn read_element_header(&mut self) -> Result<ElementHeader, DicomError> {
        let tag = self.read_tag()?;
        let raw = self.read_bytes(2)?;
        let vr = [raw[0], raw[1]];
        let length = if has_long_length(vr) {
            self.skip(2)?;
            self.read_u32()?
        } else {
            self.read_u16()? as u32
        };
        Ok(ElementHeader { tag, vr, length })
    }

    /// Skip the contents of an undefined-length sequence whose header was
    /// just read, tracking nesting with a depth counter.
    pub fn skip_undefined_sequence(&mut self) -> Result<(), DicomError> {
        let mut depth = 1usize;
        while depth > 0 {
            let tag = self.peek_tag()?;
            if tag.is_delimitation() {
                let (tag, length) = self.read_item_header()?;
                match tag {
                    Tag::ITEM if length == UNDEFINED_LENGTH => depth += 1,
                    Tag::ITEM => self.skip(length as u64)?,
                    Tag::ITEM_DELIMITER | Tag::SEQUENCE_DELIMITER => depth -= 1,
                    other => {
                        return Err(DicomError::UnexpectedTag {
                            offset: self.pos - 8,
                            group: other.0,
                            element: other.1,
                        })
                    }
                }
            } else {
                let header = self.read_element_header()?;
                if header.has_undefined_length() {
                    depth += 1;
                } else {
                    self.skip(header.length as u64)?;
                }
            }
        }
        Ok(())
    }
}
