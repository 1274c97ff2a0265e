//! On-disk container for a tile store and a mask store.
//!
//! ```text
//! offset 0    "WSTC"  u16 version  u16 flags  u32 reserved
//!             u64 manifest length  u64 payload length  u32 reserved   (32 bytes, LE)
//! offset 32   manifest (JSON)
//! then        payload: one gzip stream per array, row-major u8
//! ```
//!
//! The manifest records each array's extent and byte range in the payload,
//! the tile index in insertion order, and the SHA-256 of the payload. The
//! whole index lives in memory between reads and writes.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use indexmap::IndexMap;
use ndarray::{ArrayD, ArrayViewD, IxDyn};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::error::{IoError, StoreError};
use crate::tile::{format_coords, parse_coords, Labels, SourceFormat};

use super::array::GrowableArray;
use super::masks::MaskStore;
use super::tiles::{TileEntry, TiledArrayStore};

pub const MAGIC: &[u8; 4] = b"WSTC";
pub const VERSION: u16 = 1;
pub const HEADER_SIZE: usize = 32;

/// Manifests larger than this are treated as corrupt
pub const MAX_MANIFEST_LEN: u64 = 256 * 1024 * 1024;

/// gzip level for array payloads
const COMPRESSION_LEVEL: u32 = 5;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct Blob {
    extent: Vec<usize>,
    offset: u64,
    length: u64,
}

#[derive(Debug, Serialize, Deserialize)]
struct IndexRecord {
    coords: String,
    name: Option<String>,
    labels: Labels,
    source: Option<SourceFormat>,
}

#[derive(Debug, Serialize, Deserialize)]
struct TilesManifest {
    shape: Option<Vec<usize>>,
    array: Option<Blob>,
    masks: IndexMap<String, Blob>,
    index: Vec<IndexRecord>,
}

#[derive(Debug, Serialize, Deserialize)]
struct MaskRecord {
    name: String,
    blob: Blob,
}

#[derive(Debug, Serialize, Deserialize)]
struct MasksManifest {
    shape: Option<Vec<usize>>,
    entries: Vec<MaskRecord>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Manifest {
    tiles: TilesManifest,
    masks: MasksManifest,
    payload_sha256: String,
}

#[derive(Default)]
struct PayloadWriter {
    bytes: Vec<u8>,
}

impl PayloadWriter {
    fn push(&mut self, array: ArrayViewD<'_, u8>) -> Result<Blob, StoreError> {
        let offset = self.bytes.len() as u64;
        let raw: Vec<u8> = array.iter().copied().collect();
        let mut encoder = GzEncoder::new(&mut self.bytes, Compression::new(COMPRESSION_LEVEL));
        encoder
            .write_all(&raw)
            .and_then(|_| encoder.finish().map(|_| ()))
            .map_err(|e| StoreError::Io(IoError::from_std("container payload", e)))?;
        Ok(Blob {
            extent: array.shape().to_vec(),
            offset,
            length: self.bytes.len() as u64 - offset,
        })
    }
}

/// Serialise both stores to `writer`.
pub fn write_container<W: Write>(
    mut writer: W,
    tiles: &TiledArrayStore,
    masks: &MaskStore,
) -> Result<(), StoreError> {
    let mut payload = PayloadWriter::default();

    let array = tiles
        .array()
        .map(|a| payload.push(a.view()))
        .transpose()?;
    let mut tile_masks = IndexMap::new();
    for name in tiles.mask_names() {
        if let Some(mask) = tiles.mask_array(name) {
            tile_masks.insert(name.to_string(), payload.push(mask.view())?);
        }
    }
    let index = tiles
        .entries()
        .map(|entry| IndexRecord {
            coords: format_coords(entry.coords),
            name: entry.name.clone(),
            labels: entry.labels.clone(),
            source: entry.source,
        })
        .collect();

    let mut entries = Vec::with_capacity(masks.len());
    for (name, mask) in masks.arrays() {
        entries.push(MaskRecord {
            name: name.clone(),
            blob: payload.push(mask.view())?,
        });
    }

    let manifest = Manifest {
        tiles: TilesManifest {
            shape: tiles.shape().map(<[usize]>::to_vec),
            array,
            masks: tile_masks,
            index,
        },
        masks: MasksManifest {
            shape: masks.shape().map(<[usize]>::to_vec),
            entries,
        },
        payload_sha256: hex::encode(Sha256::digest(&payload.bytes)),
    };
    let manifest = serde_json::to_vec(&manifest)?;

    let mut header = [0u8; HEADER_SIZE];
    header[0..4].copy_from_slice(MAGIC);
    header[4..6].copy_from_slice(&VERSION.to_le_bytes());
    header[12..20].copy_from_slice(&(manifest.len() as u64).to_le_bytes());
    header[20..28].copy_from_slice(&(payload.bytes.len() as u64).to_le_bytes());

    let io = |e| StoreError::Io(IoError::from_std("container stream", e));
    writer.write_all(&header).map_err(io)?;
    writer.write_all(&manifest).map_err(io)?;
    writer.write_all(&payload.bytes).map_err(io)?;
    writer.flush().map_err(io)?;

    debug!(
        manifest_bytes = manifest.len(),
        payload_bytes = payload.bytes.len(),
        "wrote container"
    );
    Ok(())
}

/// Deserialise both stores from `reader`.
pub fn read_container<R: Read>(mut reader: R) -> Result<(TiledArrayStore, MaskStore), StoreError> {
    let io = |e| StoreError::Io(IoError::from_std("container stream", e));

    let mut header = [0u8; HEADER_SIZE];
    reader.read_exact(&mut header).map_err(io)?;
    if &header[0..4] != MAGIC {
        return Err(StoreError::Corrupt(format!(
            "bad magic {:02X?}",
            &header[0..4]
        )));
    }
    let version = u16::from_le_bytes([header[4], header[5]]);
    if version != VERSION {
        return Err(StoreError::Corrupt(format!(
            "unsupported container version {}",
            version
        )));
    }
    let manifest_len = u64::from_le_bytes(le8(&header[12..20]));
    let payload_len = u64::from_le_bytes(le8(&header[20..28]));
    if manifest_len > MAX_MANIFEST_LEN {
        return Err(StoreError::Corrupt(format!(
            "manifest of {} bytes exceeds {}",
            manifest_len, MAX_MANIFEST_LEN
        )));
    }

    let manifest_bytes = read_section(&mut reader, manifest_len, "manifest")?;
    let manifest: Manifest = serde_json::from_slice(&manifest_bytes)?;
    let payload = read_section(&mut reader, payload_len, "payload")?;

    let digest = hex::encode(Sha256::digest(&payload));
    if digest != manifest.payload_sha256 {
        return Err(StoreError::Corrupt(format!(
            "payload checksum {} does not match manifest {}",
            digest, manifest.payload_sha256
        )));
    }

    let TilesManifest {
        shape,
        array,
        masks: tile_masks,
        index: records,
    } = manifest.tiles;
    let array = array
        .map(|blob| decode_blob(&payload, &blob).map(GrowableArray::from_array))
        .transpose()?;
    let mut masks = IndexMap::with_capacity(tile_masks.len());
    for (name, blob) in tile_masks {
        masks.insert(name, GrowableArray::from_array(decode_blob(&payload, &blob)?));
    }

    let mut index = IndexMap::with_capacity(records.len());
    for record in records {
        let coords = parse_coords(&record.coords).ok_or_else(|| {
            StoreError::Corrupt(format!("unreadable coordinates '{}'", record.coords))
        })?;
        index.insert(
            coords,
            TileEntry {
                name: record.name,
                labels: record.labels,
                coords,
                source: record.source,
            },
        );
    }
    let tiles = TiledArrayStore::from_parts(shape, array, masks, index);

    let mut mask_arrays = IndexMap::with_capacity(manifest.masks.entries.len());
    for record in manifest.masks.entries {
        mask_arrays.insert(record.name, decode_blob(&payload, &record.blob)?);
    }
    let masks = MaskStore::from_parts(manifest.masks.shape, mask_arrays);

    debug!(
        tiles = tiles.len(),
        masks = masks.len(),
        "read container"
    );
    Ok((tiles, masks))
}

/// Write both stores to a file at `path`.
pub fn save(
    path: impl AsRef<Path>,
    tiles: &TiledArrayStore,
    masks: &MaskStore,
) -> Result<(), StoreError> {
    let path = path.as_ref();
    let file = File::create(path)
        .map_err(|e| StoreError::Io(IoError::from_std(path.display().to_string(), e)))?;
    write_container(BufWriter::new(file), tiles, masks)?;
    info!(
        path = %path.display(),
        tiles = tiles.len(),
        masks = masks.len(),
        "saved stores"
    );
    Ok(())
}

/// Read both stores from the file at `path`.
pub fn load(path: impl AsRef<Path>) -> Result<(TiledArrayStore, MaskStore), StoreError> {
    let path = path.as_ref();
    let file = File::open(path)
        .map_err(|e| StoreError::Io(IoError::from_std(path.display().to_string(), e)))?;
    let stores = read_container(BufReader::new(file))?;
    info!(
        path = %path.display(),
        tiles = stores.0.len(),
        masks = stores.1.len(),
        "loaded stores"
    );
    Ok(stores)
}

fn le8(bytes: &[u8]) -> [u8; 8] {
    let mut out = [0u8; 8];
    out.copy_from_slice(&bytes[..8]);
    out
}

fn read_section<R: Read>(reader: &mut R, len: u64, what: &str) -> Result<Vec<u8>, StoreError> {
    let mut buf = Vec::new();
    reader
        .take(len)
        .read_to_end(&mut buf)
        .map_err(|e| StoreError::Io(IoError::from_std("container stream", e)))?;
    if buf.len() as u64 != len {
        return Err(StoreError::Corrupt(format!(
            "{} truncated: expected {} bytes, got {}",
            what,
            len,
            buf.len()
        )));
    }
    Ok(buf)
}

fn decode_blob(payload: &[u8], blob: &Blob) -> Result<ArrayD<u8>, StoreError> {
    let start = usize::try_from(blob.offset).unwrap_or(usize::MAX);
    let end = start.saturating_add(usize::try_from(blob.length).unwrap_or(usize::MAX));
    let compressed = payload.get(start..end).ok_or_else(|| {
        StoreError::Corrupt(format!(
            "blob at {}+{} lies outside the {}-byte payload",
            blob.offset,
            blob.length,
            payload.len()
        ))
    })?;

    let expected = blob
        .extent
        .iter()
        .try_fold(1usize, |acc, &n| acc.checked_mul(n))
        .ok_or_else(|| StoreError::Corrupt(format!("blob extent {:?} overflows", blob.extent)))?;
    // One byte past the extent is enough to tell an oversized stream apart
    let mut raw = Vec::new();
    GzDecoder::new(compressed)
        .take((expected as u64).saturating_add(1))
        .read_to_end(&mut raw)
        .map_err(|e| StoreError::Corrupt(format!("blob does not decompress: {}", e)))?;
    if raw.len() != expected {
        return Err(StoreError::Corrupt(format!(
            "blob of extent {:?} holds {} bytes",
            blob.extent,
            raw.len()
        )));
    }
    ArrayD::from_shape_vec(IxDyn(&blob.extent), raw)
        .map_err(|e| StoreError::Corrupt(e.to_string()))
}
