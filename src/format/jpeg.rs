//! Abbreviated JPEG streams.
//!
//! Aperio and many pyramidal TIFF writers strip the quantization and Huffman
//! tables from every tile and store them once in the `JPEGTables` tag. A tile
//! is decodable only after splicing the shared tables in front of its scan:
//!
//! ```text
//! tables: SOI DQT.. DHT.. EOI      tile: SOI [SOF] SOS ... EOI
//! merged: SOI DQT.. DHT.. [SOF] SOS ... EOI
//! ```

use bytes::{Bytes, BytesMut};

pub const SOI: [u8; 2] = [0xFF, 0xD8];
pub const EOI: [u8; 2] = [0xFF, 0xD9];
pub const DHT: [u8; 2] = [0xFF, 0xC4];
pub const DQT: [u8; 2] = [0xFF, 0xDB];
pub const SOS: [u8; 2] = [0xFF, 0xDA];

/// True when the stream reaches its first scan without defining any tables.
pub fn is_abbreviated_stream(data: &[u8]) -> bool {
    if data.len() < 4 || data[0..2] != SOI {
        return false;
    }

    let mut pos = 2;
    while pos + 1 < data.len() {
        if data[pos] != 0xFF {
            pos += 1;
            continue;
        }
        let marker = [data[pos], data[pos + 1]];
        if marker == DQT || marker == DHT {
            return false;
        }
        if marker == SOS {
            return true;
        }

        // Standalone markers (fill, SOI, EOI, RSTn) carry no length
        let standalone = matches!(marker[1], 0x00 | 0xFF | 0xD8 | 0xD9 | 0xD0..=0xD7);
        if !standalone && pos + 3 < data.len() {
            let length = u16::from_be_bytes([data[pos + 2], data[pos + 3]]) as usize;
            pos += 2 + length;
        } else {
            pos += 2;
        }
    }

    false
}

/// Splice shared tables in front of an abbreviated chunk.
pub fn merge_jpeg_tables(tables: &[u8], chunk: &[u8]) -> Bytes {
    if tables.is_empty() || chunk.is_empty() {
        return Bytes::copy_from_slice(chunk);
    }

    let tables_end = if tables.ends_with(&EOI) {
        tables.len() - 2
    } else {
        tables.len()
    };
    let chunk_start = if chunk.starts_with(&SOI) { 2 } else { 0 };

    let mut merged = BytesMut::with_capacity(tables_end + chunk.len() - chunk_start);
    merged.extend_from_slice(&tables[..tables_end]);
    merged.extend_from_slice(&chunk[chunk_start..]);
    merged.freeze()
}

/// Return a self-contained JPEG stream for a chunk.
pub fn prepare_chunk_jpeg(tables: Option<&[u8]>, chunk: &[u8]) -> Bytes {
    match tables {
        Some(tables) if is_abbreviated_stream(chunk) => merge_jpeg_tables(tables, chunk),
        _ => Bytes::copy_from_slice(chunk),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ABBREVIATED: [u8; 14] = [
        0xFF, 0xD8, // SOI
        0xFF, 0xDA, 0x00, 0x08, 0x01, 0x01, 0x00, 0x00, 0x3F, 0x00, // SOS
        0xFF, 0xD9, // EOI
    ];

    #[test]
    fn test_detects_abbreviated_stream() {
        assert!(is_abbreviated_stream(&ABBREVIATED));
        assert!(!is_abbreviated_stream(&[0xFF, 0xD8, 0xFF, 0xDB, 0x00, 0x43]));
        assert!(!is_abbreviated_stream(&[0xFF, 0xD8, 0xFF, 0xC4, 0x00, 0x1F]));
        assert!(!is_abbreviated_stream(&[]));
        assert!(!is_abbreviated_stream(&[0x00, 0x00, 0xFF, 0xDA]));
    }

    #[test]
    fn test_skips_app_segment_before_scan() {
        let data = [
            0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x04, 0xDB, 0xDB, 0xFF, 0xDA, 0x00, 0x02,
        ];
        // The DB bytes inside APP0 are payload, not a DQT marker
        assert!(is_abbreviated_stream(&data));
    }

    #[test]
    fn test_merge_strips_inner_markers() {
        let tables = [0xFF, 0xD8, 0xFF, 0xDB, 0x00, 0x03, 0x07, 0xFF, 0xD9];
        let merged = merge_jpeg_tables(&tables, &ABBREVIATED);

        assert!(merged.starts_with(&SOI));
        assert!(merged.ends_with(&EOI));
        assert_eq!(merged.len(), tables.len() - 2 + ABBREVIATED.len() - 2);
        assert_eq!(&merged[2..4], &DQT);
        assert_eq!(&merged[7..9], &SOS);
    }

    #[test]
    fn test_prepare_leaves_complete_streams() {
        let complete = [0xFF, 0xD8, 0xFF, 0xDB, 0x00, 0x02, 0xFF, 0xD9];
        let tables = [0xFF, 0xD8, 0xFF, 0xC4, 0x00, 0x02, 0xFF, 0xD9];
        assert_eq!(&prepare_chunk_jpeg(Some(&tables), &complete)[..], &complete);
        assert_eq!(&prepare_chunk_jpeg(None, &ABBREVIATED)[..], &ABBREVIATED);
    }
}
