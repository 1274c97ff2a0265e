use bytes::Bytes;

use crate::error::IoError;

/// Positioned, synchronous reads over a slide file.
///
/// The TIFF and DICOM parsers fetch only what they touch: headers, IFDs,
/// offset tables and single chunks or frames. A reader keeps its handle
/// open for as long as it lives.
pub trait RangeReader: Send + Sync {
    /// Read exactly `len` bytes at `offset`; short ranges are errors.
    fn read_exact_at(&self, offset: u64, len: usize) -> Result<Bytes, IoError>;

    /// File length in bytes.
    fn size(&self) -> u64;

    /// Path or URI used in log lines and errors.
    fn identifier(&self) -> &str;

    /// Read up to `len` bytes starting at `offset`, truncating at end of file.
    fn read_at_most(&self, offset: u64, len: usize) -> Result<Bytes, IoError> {
        let available = self.size().saturating_sub(offset);
        let len = std::cmp::min(len as u64, available) as usize;
        self.read_exact_at(offset, len)
    }
}

impl<R: RangeReader + ?Sized> RangeReader for &R {
    fn read_exact_at(&self, offset: u64, len: usize) -> Result<Bytes, IoError> {
        (**self).read_exact_at(offset, len)
    }

    fn size(&self) -> u64 {
        (**self).size()
    }

    fn identifier(&self) -> &str {
        (**self).identifier()
    }
}

// =============================================================================
// Endian Helpers
// =============================================================================
//
// TIFF files come in either byte order; the DICOM datasets read here are
// always little-endian. Each helper panics when the slice is shorter than
// the integer it decodes.

fn prefix<const N: usize>(bytes: &[u8]) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(&bytes[..N]);
    out
}

#[inline]
pub fn read_u16_le(bytes: &[u8]) -> u16 {
    u16::from_le_bytes(prefix(bytes))
}

#[inline]
pub fn read_u16_be(bytes: &[u8]) -> u16 {
    u16::from_be_bytes(prefix(bytes))
}

#[inline]
pub fn read_u32_le(bytes: &[u8]) -> u32 {
    u32::from_le_bytes(prefix(bytes))
}

#[inline]
pub fn read_u32_be(bytes: &[u8]) -> u32 {
    u32::from_be_bytes(prefix(bytes))
}

#[inline]
pub fn read_u64_le(bytes: &[u8]) -> u64 {
    u64::from_le_bytes(prefix(bytes))
}

#[inline]
pub fn read_u64_be(bytes: &[u8]) -> u64 {
    u64::from_be_bytes(prefix(bytes))
}
