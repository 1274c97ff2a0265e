use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;
use std::sync::Mutex;

use bytes::Bytes;
use tracing::debug;

use super::RangeReader;
use crate::error::IoError;

/// Local-file implementation of RangeReader.
///
/// The file handle is opened once and held until the reader is dropped, so a
/// backend that owns a `LocalFileReader` releases its handle deterministically
/// on every exit path. Reads seek and fill under a mutex.
pub struct LocalFileReader {
    file: Mutex<File>,
    size: u64,
    identifier: String,
}

impl LocalFileReader {
    /// Open the file at `path` for positioned reads.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, IoError> {
        let path = path.as_ref();
        let identifier = path.display().to_string();

        let file = File::open(path).map_err(|e| IoError::from_std(identifier.clone(), e))?;
        let size = file
            .metadata()
            .map_err(|e| IoError::from_std(identifier.clone(), e))?
            .len();

        debug!(path = %identifier, size, "opened slide file");

        Ok(Self {
            file: Mutex::new(file),
            size,
            identifier,
        })
    }
}

impl RangeReader for LocalFileReader {
    fn read_exact_at(&self, offset: u64, len: usize) -> Result<Bytes, IoError> {
        if offset.saturating_add(len as u64) > self.size {
            return Err(IoError::RangeOutOfBounds {
                offset,
                requested: len as u64,
                size: self.size,
            });
        }
        if len == 0 {
            return Ok(Bytes::new());
        }

        let mut file = self.file.lock().map_err(|_| IoError::File {
            path: self.identifier.clone(),
            message: "file handle lock poisoned".to_string(),
        })?;

        let mut buf = vec![0u8; len];
        file.seek(SeekFrom::Start(offset))
            .map_err(|e| IoError::from_std(self.identifier.clone(), e))?;
        file.read_exact(&mut buf)
            .map_err(|e| IoError::from_std(self.identifier.clone(), e))?;

        Ok(Bytes::from(buf))
    }

    fn size(&self) -> u64 {
        self.size
    }

    fn identifier(&self) -> &str {
        &self.identifier
    }
}
