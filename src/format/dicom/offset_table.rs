//! Basic offset table and per-frame fragment reading.
//!
//! ```text
//! Pixel Data (7FE0,0010) OB, undefined length
//!   Item  (FFFE,E000) len=4n   u32 offsets[n]      <- basic offset table
//!   Item  (FFFE,E000) len=L0   fragment bytes      <- first_frame_offset
//!   Item  (FFFE,E000) len=L1   fragment bytes
//!   ...
//!   SequenceDelimiter (FFFE,E0DD) len=0
//! ```
//!
//! Offsets are relative to the first fragment item and point at the first
//! fragment of each frame.

use bytes::{Bytes, BytesMut};
use tracing::debug;

use crate::error::DicomError;
use crate::io::{read_u32_le, RangeReader};

use super::cursor::{Cursor, Tag};

/// Per-frame byte offsets, fixed once the file is opened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BasicOffsetTable {
    pub offsets: Vec<u64>,
    /// File offset of the first fragment item
    pub first_frame_offset: u64,
}

impl BasicOffsetTable {
    /// Read the table starting at the first item of Pixel Data.
    ///
    /// An empty table is rebuilt by scanning fragment items, which only maps
    /// unambiguously when there is one fragment per frame (or one frame).
    pub fn read<R: RangeReader + ?Sized>(
        reader: &R,
        pixel_data_offset: u64,
        number_of_frames: usize,
    ) -> Result<Self, DicomError> {
        let mut cursor = Cursor::new(reader, pixel_data_offset);
        let offset = cursor.position();
        let (tag, length) = cursor.read_item_header()?;
        if tag != Tag::ITEM {
            return Err(DicomError::UnexpectedTag {
                offset,
                group: tag.0,
                element: tag.1,
            });
        }
        if length % 4 != 0 {
            return Err(DicomError::InvalidValue {
                tag: "BasicOffsetTable",
                message: format!("length {} is not a multiple of 4", length),
            });
        }

        let raw = cursor.read_bytes(length as usize)?;
        let first_frame_offset = cursor.position();

        let offsets: Vec<u64> = if raw.is_empty() {
            scan_fragments(&mut cursor, first_frame_offset, number_of_frames)?
        } else {
            raw.chunks_exact(4).map(|c| read_u32_le(c) as u64).collect()
        };

        if offsets.len() != number_of_frames {
            return Err(DicomError::InvalidValue {
                tag: "BasicOffsetTable",
                message: format!(
                    "{} offsets for {} frames",
                    offsets.len(),
                    number_of_frames
                ),
            });
        }
        if offsets.windows(2).any(|w| w[1] <= w[0]) {
            return Err(DicomError::InvalidValue {
                tag: "BasicOffsetTable",
                message: "offsets are not strictly increasing".to_string(),
            });
        }

        debug!(
            frames = offsets.len(),
            first_frame_offset,
            rebuilt = raw.is_empty(),
            "read basic offset table"
        );

        Ok(BasicOffsetTable {
            offsets,
            first_frame_offset,
        })
    }

    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }

    /// Concatenated fragment payloads of frame `index`.
    ///
    /// Reading stops at the next frame's offset, or at the sequence
    /// delimiter for the last frame.
    pub fn read_frame<R: RangeReader + ?Sized>(
        &self,
        reader: &R,
        index: usize,
    ) -> Result<Bytes, DicomError> {
        let start = *self
            .offsets
            .get(index)
            .ok_or_else(|| DicomError::InvalidValue {
                tag: "frame index",
                message: format!("{} of {}", index, self.offsets.len()),
            })?;
        let stop_at = self.offsets.get(index + 1).map(|next| next - start);

        let mut cursor = Cursor::new(reader, self.first_frame_offset + start);
        let mut consumed = 0u64;
        let mut frame = BytesMut::new();

        loop {
            if Some(consumed) == stop_at {
                break;
            }
            if stop_at.is_some_and(|stop| consumed > stop) {
                return Err(DicomError::InvalidValue {
                    tag: "BasicOffsetTable",
                    message: format!("fragments of frame {} overrun the next frame", index),
                });
            }

            let offset = cursor.position();
            let (tag, length) = cursor.read_item_header()?;
            match tag {
                Tag::SEQUENCE_DELIMITER => break,
                Tag::ITEM => {
                    frame.extend_from_slice(&cursor.read_bytes(length as usize)?);
                    consumed += 8 + length as u64;
                }
                other => {
                    return Err(DicomError::UnexpectedTag {
                        offset,
                        group: other.0,
                        element: other.1,
                    })
                }
            }
        }

        Ok(frame.freeze())
    }
}

fn scan_fragments<R: RangeReader + ?Sized>(
    cursor: &mut Cursor<'_, R>,
    first_frame_offset: u64,
    number_of_frames: usize,
) -> Result<Vec<u64>, DicomError> {
    let mut fragments = Vec::new();
    loop {
        let offset = cursor.position();
        let (tag, length) = cursor.read_item_header()?;
        match tag {
            Tag::SEQUENCE_DELIMITER => break,
            Tag::ITEM => {
                fragments.push(offset - first_frame_offset);
                cursor.skip(length as u64)?;
            }
            other => {
                return Err(DicomError::UnexpectedTag {
                    offset,
                    group: other.0,
                    element: other.1,
                })
            }
        }
    }

    if number_of_frames == 1 && !fragments.is_empty() {
        return Ok(vec![0]);
    }
    if fragments.len() != number_of_frames {
        return Err(DicomError::AmbiguousFragments {
            fragments: fragments.len(),
            frames: number_of_frames,
        });
    }
    Ok(fragments)
}
