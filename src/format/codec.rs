//! Decoding compressed chunks and frames into `(rows, cols, samples)` arrays.
//!
//! Shared by TIFF tiles/strips and DICOM frames. Every decoder yields 8-bit
//! samples; the sample count is forced to what the container declares.

use std::io::Read;

use flate2::read::ZlibDecoder;
use image::{DynamicImage, ImageFormat};
use ndarray::Array3;

use crate::error::DecodeError;

/// Pixel encoding of one chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Codec {
    /// Uncompressed, interleaved samples
    Raw,
    Jpeg,
    /// `ycbcr` marks codestreams whose components are YCbCr, not RGB
    Jpeg2000 { ycbcr: bool },
    /// zlib stream, optionally with horizontal differencing
    Deflate { predictor: bool },
}

impl Codec {
    pub const fn name(&self) -> &'static str {
        match self {
            Codec::Raw => "raw",
            Codec::Jpeg => "JPEG",
            Codec::Jpeg2000 { .. } => "JPEG 2000",
            Codec::Deflate { .. } => "Deflate",
        }
    }
}

/// Geometry a chunk is expected to decode to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkShape {
    pub rows: usize,
    pub cols: usize,
    pub samples: usize,
}

impl ChunkShape {
    pub fn new(rows: usize, cols: usize, samples: usize) -> Self {
        Self {
            rows,
            cols,
            samples,
        }
    }

    fn len(&self) -> usize {
        self.rows * self.cols * self.samples
    }

    pub(crate) fn dims(&self) -> Vec<usize> {
        vec![self.rows, self.cols, self.samples]
    }
}

/// Decode `data` into an array.
///
/// Raw and Deflate chunks have exactly `shape`. Image codecs return the
/// decoded rows/cols (short edge strips decode smaller) with `shape.samples`.
pub fn decode_chunk(codec: Codec, data: &[u8], shape: ChunkShape) -> Result<Array3<u8>, DecodeError> {
    match codec {
        Codec::Raw => interleaved(data.to_vec(), shape),
        Codec::Deflate { predictor } => {
            let mut buf = Vec::with_capacity(shape.len());
            ZlibDecoder::new(data)
                .read_to_end(&mut buf)
                .map_err(|e| DecodeError::Codec {
                    codec: "Deflate",
                    message: e.to_string(),
                })?;
            if predictor {
                undo_horizontal_differencing(&mut buf, shape);
            }
            interleaved(buf, shape)
        }
        Codec::Jpeg => {
            let img = image::load_from_memory_with_format(data, ImageFormat::Jpeg).map_err(
                |e| DecodeError::Codec {
                    codec: "JPEG",
                    message: e.to_string(),
                },
            )?;
            from_dynamic(img, shape.samples)
        }
        Codec::Jpeg2000 { ycbcr } => decode_jpeg2000(data, shape.samples, ycbcr),
    }
}

/// Shape a buffer of interleaved samples; a short final strip is allowed to
/// hold fewer rows.
fn interleaved(mut buf: Vec<u8>, shape: ChunkShape) -> Result<Array3<u8>, DecodeError> {
    let row_len = shape.cols * shape.samples;
    if row_len == 0 {
        return Err(DecodeError::UnexpectedShape {
            expected: shape.dims(),
            actual: vec![0],
        });
    }
    let rows = std::cmp::min(shape.rows, buf.len() / row_len);
    if rows == 0 {
        return Err(DecodeError::UnexpectedShape {
            expected: shape.dims(),
            actual: vec![buf.len()],
        });
    }
    buf.truncate(rows * row_len);
    Array3::from_shape_vec((rows, shape.cols, shape.samples), buf).map_err(|e| {
        DecodeError::Codec {
            codec: "raw",
            message: e.to_string(),
        }
    })
}

fn undo_horizontal_differencing(buf: &mut [u8], shape: ChunkShape) {
    let row_len = shape.cols * shape.samples;
    for row in buf.chunks_mut(row_len) {
        for i in shape.samples..row.len() {
            row[i] = row[i].wrapping_add(row[i - shape.samples]);
        }
    }
}

fn from_dynamic(img: DynamicImage, samples: usize) -> Result<Array3<u8>, DecodeError> {
    let (cols, rows) = (img.width() as usize, img.height() as usize);
    let raw = match samples {
        1 => img.into_luma8().into_raw(),
        3 => img.into_rgb8().into_raw(),
        4 => img.into_rgba8().into_raw(),
        other => {
            return Err(DecodeError::UnexpectedShape {
                expected: vec![rows, cols, other],
                actual: vec![rows, cols, img.color().channel_count() as usize],
            })
        }
    };
    Array3::from_shape_vec((rows, cols, samples), raw).map_err(|e| DecodeError::Codec {
        codec: "image",
        message: e.to_string(),
    })
}

fn decode_jpeg2000(data: &[u8], samples: usize, ycbcr: bool) -> Result<Array3<u8>, DecodeError> {
    let img = jpeg2k::Image::from_bytes(data).map_err(|e| DecodeError::Codec {
        codec: "JPEG 2000",
        message: e.to_string(),
    })?;

    let components = img.components();
    if components.len() < samples {
        return Err(DecodeError::UnexpectedShape {
            expected: vec![img.height() as usize, img.width() as usize, samples],
            actual: vec![
                img.height() as usize,
                img.width() as usize,
                components.len(),
            ],
        });
    }

    let (rows, cols) = (img.height() as usize, img.width() as usize);
    let mut out = Array3::<u8>::zeros((rows, cols, samples));
    for (s, component) in components.iter().take(samples).enumerate() {
        let shift = component.precision().saturating_sub(8);
        let data = component.data();
        let comp_cols = component.width() as usize;
        // Subsampled chroma planes are upsampled by replication
        let (fy, fx) = (
            (rows / component.height().max(1) as usize).max(1),
            (cols / comp_cols.max(1)).max(1),
        );
        for ((r, c), value) in out
            .index_axis_mut(ndarray::Axis(2), s)
            .indexed_iter_mut()
        {
            let idx = (r / fy) * comp_cols + (c / fx);
            let v = data.get(idx).copied().unwrap_or(0) >> shift;
            *value = v.clamp(0, 255) as u8;
        }
    }

    if ycbcr && samples == 3 {
        ycbcr_to_rgb(&mut out);
    }
    Ok(out)
}

/// Full-range BT.601 YCbCr to RGB, in place.
fn ycbcr_to_rgb(pixels: &mut Array3<u8>) {
    for mut px in pixels.lanes_mut(ndarray::Axis(2)) {
        let y = px[0] as f32;
        let cb = px[1] as f32 - 128.0;
        let cr = px[2] as f32 - 128.0;
        px[0] = (y + 1.402 * cr).round().clamp(0.0, 255.0) as u8;
        px[1] = (y - 0.344_136 * cb - 0.714_136 * cr)
            .round()
            .clamp(0.0, 255.0) as u8;
        px[2] = (y + 1.772 * cb).round().clamp(0.0, 255.0) as u8;
    }
}
