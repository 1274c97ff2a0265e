//! One IFD's pixels as a grid of independently compressed chunks.
//!
//! Tiled images use TileWidth × TileLength chunks; stripped images are a
//! single column of ImageWidth × RowsPerStrip chunks. Either way a region
//! read decodes only the chunks it overlaps.

use bytes::Bytes;
use ndarray::{s, Array3};
use tracing::trace;

use crate::error::{BackendError, TiffError};
use crate::format::codec::{decode_chunk, ChunkShape, Codec};
use crate::format::jpeg::prepare_chunk_jpeg;
use crate::io::RangeReader;

use super::parser::{Ifd, TiffHeader};
use super::tags::{Compression, TiffTag};
use super::values::ValueReader;

/// Chunk organisation and decoding parameters of one image.
#[derive(Debug, Clone)]
pub struct ChunkLayout {
    pub width: u32,
    pub height: u32,
    pub chunk_width: u32,
    pub chunk_height: u32,
    pub chunks_across: u32,
    pub chunks_down: u32,
    pub samples_per_pixel: u16,
    pub compression: Compression,
    pub tiled: bool,
    codec: Codec,
    offsets: Vec<u64>,
    byte_counts: Vec<u64>,
    jpeg_tables: Option<Bytes>,
}

impl ChunkLayout {
    /// Read chunk geometry, offsets and shared tables of an IFD.
    pub fn load<R: RangeReader + ?Sized>(
        reader: &R,
        header: &TiffHeader,
        ifd: &Ifd,
    ) -> Result<Self, TiffError> {
        let order = header.byte_order;
        let values = ValueReader::new(reader, header);

        let width = ifd
            .image_width(order)
            .ok_or(TiffError::MissingTag("ImageWidth"))?;
        let height = ifd
            .image_height(order)
            .ok_or(TiffError::MissingTag("ImageLength"))?;
        let samples_per_pixel = ifd.samples_per_pixel(order) as u16;

        if let Some(entry) = ifd.get_entry_by_tag(TiffTag::BitsPerSample) {
            let bits = values.read_u64_array(entry)?;
            if bits.iter().any(|&b| b != 8) {
                return Err(TiffError::UnsupportedLayout(format!(
                    "{:?} bits per sample",
                    bits
                )));
            }
        }
        if samples_per_pixel > 1 && ifd.get_u32(TiffTag::PlanarConfiguration, order) == Some(2) {
            return Err(TiffError::UnsupportedLayout(
                "planar sample organisation".to_string(),
            ));
        }

        let raw_compression = ifd.compression(order).unwrap_or(1);
        let compression = Compression::from_u16(raw_compression)
            .filter(|c| c.is_supported())
            .ok_or_else(|| {
                TiffError::UnsupportedCompression(
                    Compression::from_u16(raw_compression)
                        .map(|c| c.name().to_string())
                        .unwrap_or_else(|| raw_compression.to_string()),
                )
            })?;
        let predictor = ifd.get_u32(TiffTag::Predictor, order).unwrap_or(1) == 2;
        let codec = match compression {
            Compression::Jpeg => Codec::Jpeg,
            Compression::Jpeg2000 => Codec::Jpeg2000 { ycbcr: true },
            Compression::Jpeg2000Rgb => Codec::Jpeg2000 { ycbcr: false },
            Compression::Deflate | Compression::AdobeDeflate => Codec::Deflate { predictor },
            _ => Codec::Raw,
        };

        let tiled = ifd.is_tiled();
        let (chunk_width, chunk_height, offsets_tag, counts_tag) = if tiled {
            (
                ifd.tile_width(order).ok_or(TiffError::MissingTag("TileWidth"))?,
                ifd.tile_height(order)
                    .ok_or(TiffError::MissingTag("TileLength"))?,
                TiffTag::TileOffsets,
                TiffTag::TileByteCounts,
            )
        } else if ifd.is_stripped() {
            let rows = ifd
                .get_u32(TiffTag::RowsPerStrip, order)
                .unwrap_or(height)
                .min(height);
            (width, rows, TiffTag::StripOffsets, TiffTag::StripByteCounts)
        } else {
            return Err(TiffError::MissingTag("TileOffsets"));
        };

        if chunk_width == 0 || chunk_height == 0 {
            return Err(TiffError::InvalidTagValue {
                tag: "TileWidth",
                message: "chunk dimension is zero".to_string(),
            });
        }

        let offsets = values.read_u64_array(
            ifd.get_entry_by_tag(offsets_tag)
                .ok_or(TiffError::MissingTag("TileOffsets"))?,
        )?;
        let byte_counts = values.read_u64_array(
            ifd.get_entry_by_tag(counts_tag)
                .ok_or(TiffError::MissingTag("TileByteCounts"))?,
        )?;

        let chunks_across = width.div_ceil(chunk_width);
        let chunks_down = height.div_ceil(chunk_height);
        let expected = chunks_across as usize * chunks_down as usize;
        if offsets.len() < expected || byte_counts.len() < expected {
            return Err(TiffError::InvalidTagValue {
                tag: "TileOffsets",
                message: format!(
                    "{} offsets and {} byte counts for {} chunks",
                    offsets.len(),
                    byte_counts.len(),
                    expected
                ),
            });
        }

        let jpeg_tables = match ifd.get_entry_by_tag(TiffTag::JpegTables) {
            Some(entry) if compression == Compression::Jpeg => Some(values.read_bytes(entry)?),
            _ => None,
        };

        Ok(ChunkLayout {
            width,
            height,
            chunk_width,
            chunk_height,
            chunks_across,
            chunks_down,
            samples_per_pixel,
            compression,
            tiled,
            codec,
            offsets,
            byte_counts,
            jpeg_tables,
        })
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks_across as usize * self.chunks_down as usize
    }

    /// Decode one chunk by row-major index.
    pub fn read_chunk<R: RangeReader + ?Sized>(
        &self,
        reader: &R,
        index: usize,
    ) -> Result<Array3<u8>, BackendError> {
        let (offset, length) = match (self.offsets.get(index), self.byte_counts.get(index)) {
            (Some(&o), Some(&l)) => (o, l as usize),
            _ => {
                return Err(BackendError::RegionOutOfBounds(format!(
                    "chunk {} of {}",
                    index,
                    self.chunk_count()
                )))
            }
        };

        let shape = ChunkShape::new(
            self.chunk_height as usize,
            self.chunk_width as usize,
            self.samples_per_pixel as usize,
        );

        // Sparse files leave never-written chunks empty
        if length == 0 {
            return Ok(Array3::zeros((shape.rows, shape.cols, shape.samples)));
        }

        let data = reader.read_exact_at(offset, length)?;
        let data = match self.codec {
            Codec::Jpeg => prepare_chunk_jpeg(self.jpeg_tables.as_deref(), &data),
            _ => data,
        };
        trace!(index, offset, length, "decoding chunk");
        Ok(decode_chunk(self.codec, &data, shape)?)
    }

    /// Read the `(rows, cols)` region whose top-left corner is `origin`
    /// `(row, col)`; anything beyond the image stays zero.
    pub fn read_region<R: RangeReader + ?Sized>(
        &self,
        reader: &R,
        origin: (usize, usize),
        size: (usize, usize),
    ) -> Result<Array3<u8>, BackendError> {
        let samples = self.samples_per_pixel as usize;
        let mut out = Array3::<u8>::zeros((size.0, size.1, samples));

        let (width, height) = (self.width as usize, self.height as usize);
        let row_end = (origin.0 + size.0).min(height);
        let col_end = (origin.1 + size.1).min(width);
        if origin.0 >= row_end || origin.1 >= col_end {
            return Ok(out);
        }

        let (cw, ch) = (self.chunk_width as usize, self.chunk_height as usize);
        for cy in origin.0 / ch..=(row_end - 1) / ch {
            for cx in origin.1 / cw..=(col_end - 1) / cw {
                let chunk = self.read_chunk(reader, cy * self.chunks_across as usize + cx)?;

                // Overlap of this chunk with the request, in image coordinates
                let r0 = (cy * ch).max(origin.0);
                let r1 = ((cy * ch) + chunk.shape()[0]).min(row_end);
                let c0 = (cx * cw).max(origin.1);
                let c1 = ((cx * cw) + chunk.shape()[1]).min(col_end);
                if r0 >= r1 || c0 >= c1 {
                    continue;
                }

                out.slice_mut(s![r0 - origin.0..r1 - origin.0, c0 - origin.1..c1 - origin.1, ..])
                    .assign(&chunk.slice(s![r0 - cy * ch..r1 - cy * ch, c0 - cx * cw..c1 - cx * cw, ..]));
            }
        }

        Ok(out)
    }
}
