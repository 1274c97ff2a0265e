//! Test utilities for integration tests.
//!
//! Builders for small slide files written entirely in memory: tiled TIFF
//! pyramids, stripped page stacks and DICOM whole-slide instances with
//! JPEG frames. Pixel values follow closed-form patterns so tests can check
//! exact values after a round trip through the parsers.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::{Rgb, RgbImage};

use wsi_tiler::error::IoError;
use wsi_tiler::io::{MemoryReader, RangeReader};

// =============================================================================
// Counting Range Reader
// =============================================================================

/// A memory reader that counts the reads reaching it.
#[derive(Clone)]
pub struct CountingReader {
    inner: Arc<MemoryReader>,
    reads: Arc<AtomicUsize>,
}

impl CountingReader {
    pub fn new(data: Vec<u8>, identifier: &str) -> Self {
        Self {
            inner: Arc::new(MemoryReader::new(data, identifier)),
            reads: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}

impl RangeReader for CountingReader {
    fn read_exact_at(&self, offset: u64, len: usize) -> Result<Bytes, IoError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.inner.read_exact_at(offset, len)
    }

    fn size(&self) -> u64 {
        self.inner.size()
    }

    fn identifier(&self) -> &str {
        self.inner.identifier()
    }
}

/// Write `data` into `dir` and return the path.
pub fn write_file(dir: &Path, name: &str, data: &[u8]) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, data).unwrap();
    path
}

// =============================================================================
// TIFF Builder
// =============================================================================

const SHORT: u16 = 3;
const LONG: u16 = 4;
const ASCII: u16 = 2;

/// One image (IFD) of a little-endian classic TIFF with raw samples.
pub struct TiffImage {
    pub width: u32,
    pub height: u32,
    pub samples: u16,
    /// `Some((tile_width, tile_height))` for tiled images, `None` for one
    /// strip per image
    pub tile: Option<(u32, u32)>,
    pub description: Option<String>,
    /// Sample value at `(row, col, sample)`
    pub pixel: fn(usize, usize, usize) -> u8,
}

impl TiffImage {
    fn chunks(&self) -> Vec<Vec<u8>> {
        let samples = self.samples as usize;
        let (chunk_w, chunk_h) = self.tile.unwrap_or((self.width, self.height));
        let across = self.width.div_ceil(chunk_w) as usize;
        let down = self.height.div_ceil(chunk_h) as usize;
        let (chunk_w, chunk_h) = (chunk_w as usize, chunk_h as usize);

        let mut chunks = Vec::with_capacity(across * down);
        for ty in 0..down {
            for tx in 0..across {
                let mut chunk = Vec::with_capacity(chunk_w * chunk_h * samples);
                for r in 0..chunk_h {
                    for c in 0..chunk_w {
                        for s in 0..samples {
                            chunk.push((self.pixel)(ty * chunk_h + r, tx * chunk_w + c, s));
                        }
                    }
                }
                chunks.push(chunk);
            }
        }
        chunks
    }
}

struct Entry {
    tag: u16,
    field_type: u16,
    values: Vec<u32>,
    ascii: Option<Vec<u8>>,
}

impl Entry {
    fn numbers(tag: u16, field_type: u16, values: Vec<u32>) -> Self {
        Entry {
            tag,
            field_type,
            values,
            ascii: None,
        }
    }

    fn text(tag: u16, text: &str) -> Self {
        let mut bytes = text.as_bytes().to_vec();
        bytes.push(0);
        Entry {
            tag,
            field_type: ASCII,
            values: Vec::new(),
            ascii: Some(bytes),
        }
    }

    fn encoded(&self) -> (u32, Vec<u8>) {
        match &self.ascii {
            Some(bytes) => (bytes.len() as u32, bytes.clone()),
            None => {
                let mut out = Vec::new();
                for &v in &self.values {
                    if self.field_type == SHORT {
                        out.extend_from_slice(&(v as u16).to_le_bytes());
                    } else {
                        out.extend_from_slice(&v.to_le_bytes());
                    }
                }
                (self.values.len() as u32, out)
            }
        }
    }
}

/// Serialise `images` as one TIFF, in IFD order.
pub fn build_tiff(images: &[TiffImage]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(b"II");
    out.extend_from_slice(&42u16.to_le_bytes());
    out.extend_from_slice(&0u32.to_le_bytes());
    let mut next_pointer = 4usize;

    for image in images {
        let chunks = image.chunks();
        let mut offsets = Vec::with_capacity(chunks.len());
        let mut counts = Vec::with_capacity(chunks.len());
        for chunk in &chunks {
            offsets.push(out.len() as u32);
            counts.push(chunk.len() as u32);
            out.extend_from_slice(chunk);
        }

        let photometric = if image.samples >= 3 { 2 } else { 1 };
        let mut entries = vec![
            Entry::numbers(256, LONG, vec![image.width]),
            Entry::numbers(257, LONG, vec![image.height]),
            Entry::numbers(258, SHORT, vec![8; image.samples as usize]),
            Entry::numbers(259, SHORT, vec![1]),
            Entry::numbers(262, SHORT, vec![photometric]),
            Entry::numbers(277, SHORT, vec![image.samples as u32]),
            Entry::numbers(284, SHORT, vec![1]),
        ];
        if let Some(description) = &image.description {
            entries.push(Entry::text(270, description));
        }
        match image.tile {
            Some((tile_w, tile_h)) => {
                entries.push(Entry::numbers(322, LONG, vec![tile_w]));
                entries.push(Entry::numbers(323, LONG, vec![tile_h]));
                entries.push(Entry::numbers(324, LONG, offsets));
                entries.push(Entry::numbers(325, LONG, counts));
            }
            None => {
                entries.push(Entry::numbers(273, LONG, offsets));
                entries.push(Entry::numbers(278, LONG, vec![image.height]));
                entries.push(Entry::numbers(279, LONG, counts));
            }
        }
        entries.sort_by_key(|e| e.tag);

        // Values over four bytes live before the IFD
        let mut fields = Vec::with_capacity(entries.len());
        for entry in &entries {
            let (count, bytes) = entry.encoded();
            let value = if bytes.len() > 4 {
                if out.len() % 2 == 1 {
                    out.push(0);
                }
                let at = out.len() as u32;
                out.extend_from_slice(&bytes);
                at.to_le_bytes()
            } else {
                let mut inline = [0u8; 4];
                inline[..bytes.len()].copy_from_slice(&bytes);
                inline
            };
            fields.push((entry.tag, entry.field_type, count, value));
        }

        if out.len() % 2 == 1 {
            out.push(0);
        }
        let ifd_offset = out.len() as u32;
        out[next_pointer..next_pointer + 4].copy_from_slice(&ifd_offset.to_le_bytes());

        out.extend_from_slice(&(fields.len() as u16).to_le_bytes());
        for (tag, field_type, count, value) in fields {
            out.extend_from_slice(&tag.to_le_bytes());
            out.extend_from_slice(&field_type.to_le_bytes());
            out.extend_from_slice(&count.to_le_bytes());
            out.extend_from_slice(&value);
        }
        next_pointer = out.len();
        out.extend_from_slice(&0u32.to_le_bytes());
    }

    out
}

// =============================================================================
// Pyramidal Slide
// =============================================================================

pub const PYRAMID_WIDTH: u32 = 64;
pub const PYRAMID_HEIGHT: u32 = 48;
pub const PYRAMID_TILE: u32 = 16;

/// Full-resolution sample pattern.
pub fn level0_pixel(r: usize, c: usize, s: usize) -> u8 {
    ((r * 5 + c * 3 + s * 70) % 256) as u8
}

/// Half-resolution sample pattern.
pub fn level1_pixel(r: usize, c: usize, s: usize) -> u8 {
    ((r * 2 + c + s * 40 + 100) % 256) as u8
}

/// A two-level RGB pyramid: 64x48 and 32x24 pixels in 16x16 raw tiles,
/// followed by a stripped label image that is not part of the pyramid.
pub fn create_pyramidal_tiff(description: Option<&str>) -> Vec<u8> {
    build_tiff(&[
        TiffImage {
            width: PYRAMID_WIDTH,
            height: PYRAMID_HEIGHT,
            samples: 3,
            tile: Some((PYRAMID_TILE, PYRAMID_TILE)),
            description: description.map(str::to_string),
            pixel: level0_pixel,
        },
        TiffImage {
            width: PYRAMID_WIDTH / 2,
            height: PYRAMID_HEIGHT / 2,
            samples: 3,
            tile: Some((PYRAMID_TILE, PYRAMID_TILE)),
            description: None,
            pixel: level1_pixel,
        },
        TiffImage {
            width: 10,
            height: 6,
            samples: 3,
            tile: None,
            description: Some("label".to_string()),
            pixel: |_, _, _| 255,
        },
    ])
}

// =============================================================================
// Page Stack
// =============================================================================

pub const STACK_WIDTH: u32 = 20;
pub const STACK_HEIGHT: u32 = 12;
pub const STACK_PAGES: usize = 3;

fn page0(r: usize, c: usize, _: usize) -> u8 {
    (r + c) as u8
}

fn page1(r: usize, c: usize, _: usize) -> u8 {
    (r + c + 50) as u8
}

fn page2(r: usize, c: usize, _: usize) -> u8 {
    (r + c + 100) as u8
}

/// Sample at `(row, col)` of z-slice `z` in [`create_stack_tiff`].
pub fn stack_pixel(r: usize, c: usize, z: usize) -> u8 {
    (r + c + 50 * z) as u8
}

/// Three stripped grayscale 20x12 pages, one per z-slice.
pub fn create_stack_tiff() -> Vec<u8> {
    let pages: [fn(usize, usize, usize) -> u8; STACK_PAGES] = [page0, page1, page2];
    let images: Vec<TiffImage> = pages
        .into_iter()
        .map(|pixel| TiffImage {
            width: STACK_WIDTH,
            height: STACK_HEIGHT,
            samples: 1,
            tile: None,
            description: None,
            pixel,
        })
        .collect();
    build_tiff(&images)
}

// =============================================================================
// DICOM Builder
// =============================================================================

pub const FRAME_SIZE: usize = 16;
pub const DICOM_ROWS: u32 = 24;
pub const DICOM_COLUMNS: u32 = 40;
/// 2 rows x 3 columns of 16x16 frames
pub const DICOM_FRAMES: usize = 6;

/// Solid colour of frame `index`.
pub fn frame_color(index: usize) -> [u8; 3] {
    [(index * 40) as u8, 255 - (index * 40) as u8, 128]
}

/// A 16x16 JPEG of one solid colour.
pub fn create_solid_jpeg(color: [u8; 3]) -> Vec<u8> {
    let img = RgbImage::from_pixel(FRAME_SIZE as u32, FRAME_SIZE as u32, Rgb(color));
    let mut buf = Vec::new();
    JpegEncoder::new_with_quality(&mut buf, 95)
        .encode_image(&img)
        .unwrap();
    buf
}

fn element(group: u16, elem: u16, vr: &[u8; 2], value: &[u8]) -> Vec<u8> {
    let mut value = value.to_vec();
    if value.len() % 2 == 1 {
        value.push(if vr == b"UI" { 0 } else { b' ' });
    }
    let mut out = Vec::new();
    out.extend_from_slice(&group.to_le_bytes());
    out.extend_from_slice(&elem.to_le_bytes());
    out.extend_from_slice(vr);
    if matches!(vr, b"OB" | b"SQ" | b"UN") {
        out.extend_from_slice(&[0, 0]);
        out.extend_from_slice(&(value.len() as u32).to_le_bytes());
    } else {
        out.extend_from_slice(&(value.len() as u16).to_le_bytes());
    }
    out.extend_from_slice(&value);
    out
}

fn item(tag_element: u16, payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&0xFFFEu16.to_le_bytes());
    out.extend_from_slice(&tag_element.to_le_bytes());
    out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    out.extend_from_slice(payload);
    out
}

/// A JPEG baseline DICOM instance of 24x40 pixels in six solid 16x16
/// frames, with a populated basic offset table.
pub fn create_dicom(with_offset_table: bool) -> Vec<u8> {
    build_dicom(
        with_offset_table,
        FRAME_SIZE as u16,
        (DICOM_ROWS, DICOM_COLUMNS),
    )
}

/// DICOM whose header declares `frame_size` square frames and a `total`
/// `(rows, columns)` pixel matrix; the encoded frames are always 16x16.
pub fn build_dicom(with_offset_table: bool, frame_size: u16, total: (u32, u32)) -> Vec<u8> {
    let fragments: Vec<Vec<u8>> = (0..DICOM_FRAMES)
        .map(|i| {
            let mut jpeg = create_solid_jpeg(frame_color(i));
            if jpeg.len() % 2 == 1 {
                jpeg.push(0);
            }
            jpeg
        })
        .collect();

    let mut out = vec![0u8; 128];
    out.extend_from_slice(b"DICM");
    out.extend(element(0x0002, 0x0010, b"UI", b"1.2.840.10008.1.2.4.50"));
    out.extend(element(0x0008, 0x0060, b"CS", b"SM"));
    out.extend(element(0x0028, 0x0002, b"US", &3u16.to_le_bytes()));
    out.extend(element(0x0028, 0x0004, b"CS", b"YBR_FULL_422"));
    out.extend(element(
        0x0028,
        0x0008,
        b"IS",
        DICOM_FRAMES.to_string().as_bytes(),
    ));
    out.extend(element(0x0028, 0x0010, b"US", &frame_size.to_le_bytes()));
    out.extend(element(0x0028, 0x0011, b"US", &frame_size.to_le_bytes()));
    out.extend(element(0x0048, 0x0006, b"UL", &total.1.to_le_bytes()));
    out.extend(element(0x0048, 0x0007, b"UL", &total.0.to_le_bytes()));

    out.extend_from_slice(&0x7FE0u16.to_le_bytes());
    out.extend_from_slice(&0x0010u16.to_le_bytes());
    out.extend_from_slice(b"OB\0\0");
    out.extend_from_slice(&0xFFFF_FFFFu32.to_le_bytes());

    let mut table = Vec::new();
    if with_offset_table {
        let mut offset = 0u32;
        for fragment in &fragments {
            table.extend_from_slice(&offset.to_le_bytes());
            offset += 8 + fragment.len() as u32;
        }
    }
    out.extend(item(0xE000, &table));
    for fragment in &fragments {
        out.extend(item(0xE000, fragment));
    }
    out.extend(item(0xE0DD, &[]));
    out
}

/// Largest absolute difference between two samples.
pub fn max_abs_diff(a: &[u8], b: &[u8]) -> u8 {
    a.iter()
        .zip(b)
        .map(|(&x, &y)| x.abs_diff(y))
        .max()
        .unwrap_or(0)
}
