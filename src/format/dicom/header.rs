//! File meta information and the dataset elements preceding Pixel Data.

use tracing::debug;

use crate::error::DicomError;
use crate::format::codec::Codec;
use crate::io::RangeReader;

use super::cursor::{Cursor, ElementHeader, Tag};

/// Offset of the "DICM" marker
pub const PREAMBLE_LEN: u64 = 128;
pub const DICM: &[u8; 4] = b"DICM";

const TRANSFER_SYNTAX_UID: Tag = Tag(0x0002, 0x0010);
const SAMPLES_PER_PIXEL: Tag = Tag(0x0028, 0x0002);
const PHOTOMETRIC_INTERPRETATION: Tag = Tag(0x0028, 0x0004);
const NUMBER_OF_FRAMES: Tag = Tag(0x0028, 0x0008);
const ROWS: Tag = Tag(0x0028, 0x0010);
const COLUMNS: Tag = Tag(0x0028, 0x0011);
const TOTAL_PIXEL_MATRIX_COLUMNS: Tag = Tag(0x0048, 0x0006);
const TOTAL_PIXEL_MATRIX_ROWS: Tag = Tag(0x0048, 0x0007);
const PIXEL_DATA: Tag = Tag(0x7FE0, 0x0010);

/// Encapsulated transfer syntaxes with a frame decoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferSyntax {
    /// 1.2.840.10008.1.2.4.50
    JpegBaseline,
    /// 1.2.840.10008.1.2.4.51
    JpegExtended,
    /// 1.2.840.10008.1.2.4.90
    Jpeg2000Lossless,
    /// 1.2.840.10008.1.2.4.91
    Jpeg2000,
}

impl TransferSyntax {
    pub fn from_uid(uid: &str) -> Result<Self, DicomError> {
        match uid {
            "1.2.840.10008.1.2.4.50" => Ok(TransferSyntax::JpegBaseline),
            "1.2.840.10008.1.2.4.51" => Ok(TransferSyntax::JpegExtended),
            "1.2.840.10008.1.2.4.90" => Ok(TransferSyntax::Jpeg2000Lossless),
            "1.2.840.10008.1.2.4.91" => Ok(TransferSyntax::Jpeg2000),
            other => Err(DicomError::UnsupportedTransferSyntax(other.to_string())),
        }
    }

    pub const fn uid(&self) -> &'static str {
        match self {
            TransferSyntax::JpegBaseline => "1.2.840.10008.1.2.4.50",
            TransferSyntax::JpegExtended => "1.2.840.10008.1.2.4.51",
            TransferSyntax::Jpeg2000Lossless => "1.2.840.10008.1.2.4.90",
            TransferSyntax::Jpeg2000 => "1.2.840.10008.1.2.4.91",
        }
    }

    /// Codec for a frame. The JPEG 2000 decoder undoes the codestream's
    /// colour transform itself.
    pub const fn codec(&self) -> Codec {
        match self {
            TransferSyntax::JpegBaseline | TransferSyntax::JpegExtended => Codec::Jpeg,
            TransferSyntax::Jpeg2000Lossless | TransferSyntax::Jpeg2000 => {
                Codec::Jpeg2000 { ycbcr: false }
            }
        }
    }
}

/// Geometry and encoding of a tiled whole-slide DICOM instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DicomHeader {
    pub transfer_syntax: TransferSyntax,
    /// Frame rows
    pub rows: u16,
    /// Frame columns
    pub columns: u16,
    pub samples_per_pixel: u16,
    pub photometric_interpretation: String,
    pub number_of_frames: usize,
    pub total_rows: u32,
    pub total_columns: u32,
    /// File offset of the first item inside Pixel Data
    pub pixel_data_offset: u64,
}

#[derive(Default)]
struct Collected {
    transfer_syntax: Option<String>,
    rows: Option<u16>,
    columns: Option<u16>,
    samples_per_pixel: Option<u16>,
    photometric: Option<String>,
    frames: Option<usize>,
    total_rows: Option<u32>,
    total_columns: Option<u32>,
}

/// Whether the bytes at offset 128 read "DICM".
pub fn has_dicm_prefix(bytes: &[u8]) -> bool {
    bytes.len() >= (PREAMBLE_LEN as usize + 4)
        && &bytes[PREAMBLE_LEN as usize..PREAMBLE_LEN as usize + 4] == DICM
}

impl DicomHeader {
    /// Walk file meta and dataset up to the Pixel Data element.
    pub fn parse<R: RangeReader + ?Sized>(reader: &R) -> Result<Self, DicomError> {
        let mut cursor = Cursor::new(reader, PREAMBLE_LEN);
        if &cursor.read_bytes(4)?[..] != DICM {
            return Err(DicomError::MissingPrefix);
        }

        let mut found = Collected::default();
        let mut syntax_checked = false;

        let pixel_data_offset = loop {
            if !syntax_checked && cursor.peek_tag()?.0 != 0x0002 {
                // Encapsulated syntaxes are all explicit VR little endian
                let uid = found
                    .transfer_syntax
                    .as_deref()
                    .ok_or(DicomError::MissingElement("TransferSyntaxUID"))?;
                TransferSyntax::from_uid(uid)?;
                syntax_checked = true;
            }

            let header = cursor.read_element_header()?;
            if header.tag == PIXEL_DATA {
                if !header.has_undefined_length() {
                    return Err(DicomError::UnsupportedTransferSyntax(
                        "native (unencapsulated) pixel data".to_string(),
                    ));
                }
                break cursor.position();
            }

            if header.has_undefined_length() {
                cursor.skip_undefined_sequence()?;
                continue;
            }

            read_value(&mut cursor, header, &mut found)?;
        };

        let transfer_syntax = TransferSyntax::from_uid(
            found
                .transfer_syntax
                .as_deref()
                .ok_or(DicomError::MissingElement("TransferSyntaxUID"))?,
        )?;
        let rows = found.rows.ok_or(DicomError::MissingElement("Rows"))?;
        let columns = found.columns.ok_or(DicomError::MissingElement("Columns"))?;
        if rows == 0 || columns == 0 {
            return Err(DicomError::InvalidValue {
                tag: "Rows",
                message: format!("frame shape {}x{}", rows, columns),
            });
        }

        let header = DicomHeader {
            transfer_syntax,
            rows,
            columns,
            samples_per_pixel: found.samples_per_pixel.unwrap_or(1),
            photometric_interpretation: found.photometric.unwrap_or_default(),
            number_of_frames: found.frames.unwrap_or(1),
            total_rows: found.total_rows.unwrap_or(rows as u32),
            total_columns: found.total_columns.unwrap_or(columns as u32),
            pixel_data_offset,
        };

        debug!(
            identifier = reader.identifier(),
            frames = header.number_of_frames,
            frame_rows = header.rows,
            frame_cols = header.columns,
            total_rows = header.total_rows,
            total_cols = header.total_columns,
            syntax = header.transfer_syntax.uid(),
            "parsed DICOM header"
        );
        Ok(header)
    }
}

/// Read or skip one defined-length element value.
fn read_value<R: RangeReader + ?Sized>(
    cursor: &mut Cursor<'_, R>,
    header: ElementHeader,
    found: &mut Collected,
) -> Result<(), DicomError> {
    let len = header.length as usize;
    match header.tag {
        TRANSFER_SYNTAX_UID => found.transfer_syntax = Some(read_text(cursor, len)?),
        PHOTOMETRIC_INTERPRETATION => found.photometric = Some(read_text(cursor, len)?),
        SAMPLES_PER_PIXEL => found.samples_per_pixel = Some(read_us(cursor, len, "SamplesPerPixel")?),
        ROWS => found.rows = Some(read_us(cursor, len, "Rows")?),
        COLUMNS => found.columns = Some(read_us(cursor, len, "Columns")?),
        NUMBER_OF_FRAMES => {
            let text = read_text(cursor, len)?;
            let frames = text.parse().map_err(|_| DicomError::InvalidValue {
                tag: "NumberOfFrames",
                message: format!("{:?} is not an integer string", text),
            })?;
            found.frames = Some(frames);
        }
        TOTAL_PIXEL_MATRIX_COLUMNS => {
            found.total_columns = Some(read_ul(cursor, len, "TotalPixelMatrixColumns")?)
        }
        TOTAL_PIXEL_MATRIX_ROWS => {
            found.total_rows = Some(read_ul(cursor, len, "TotalPixelMatrixRows")?)
        }
        _ => cursor.skip(len as u64)?,
    }
    Ok(())
}

/// Text value with padding (NUL or space) trimmed.
fn read_text<R: RangeReader + ?Sized>(
    cursor: &mut Cursor<'_, R>,
    len: usize,
) -> Result<String, DicomError> {
    let bytes = cursor.read_bytes(len)?;
    Ok(String::from_utf8_lossy(&bytes)
        .trim_matches(|c: char| c == '\0' || c.is_whitespace())
        .to_string())
}

fn read_us<R: RangeReader + ?Sized>(
    cursor: &mut Cursor<'_, R>,
    len: usize,
    tag: &'static str,
) -> Result<u16, DicomError> {
    if len < 2 {
        return Err(DicomError::InvalidValue {
            tag,
            message: format!("US value of {} bytes", len),
        });
    }
    let value = cursor.read_u16()?;
    cursor.skip(len as u64 - 2)?;
    Ok(value)
}

fn read_ul<R: RangeReader + ?Sized>(
    cursor: &mut Cursor<'_, R>,
    len: usize,
    tag: &'static str,
) -> Result<u32, DicomError> {
    if len < 4 {
        return Err(DicomError::InvalidValue {
            tag,
            message: format!("UL value of {} bytes", len),
        });
    }
    let value = cursor.read_u32()?;
    cursor.skip(len as u64 - 4)?;
    Ok(value)
}
