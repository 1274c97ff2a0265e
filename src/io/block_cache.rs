use std::num::NonZeroUsize;
use std::sync::Mutex;

use bytes::{Bytes, BytesMut};
use lru::LruCache;

use super::RangeReader;
use crate::error::IoError;

/// Block size used when none is configured (256KB): one IFD with its
/// offset arrays, or a handful of compressed chunks.
pub const DEFAULT_BLOCK_SIZE: usize = 256 * 1024;

/// Blocks kept when no capacity is configured (about 25MB at the default
/// block size).
pub const DEFAULT_CACHE_CAPACITY: usize = 100;

/// Aligned block cache in front of a [`RangeReader`].
///
/// Region reads touch many small chunks at scattered offsets, and chunks of
/// neighbouring tiles tend to share blocks. Every read is served from whole
/// `block_size` blocks; least recently used blocks are dropped once
/// `capacity` is reached. The final block of a file may be short.
pub struct BlockCache<R> {
    inner: R,
    block_size: u64,
    blocks: Mutex<LruCache<u64, Bytes>>,
}

impl<R: RangeReader> BlockCache<R> {
    pub fn new(inner: R) -> Self {
        Self::with_capacity(inner, DEFAULT_BLOCK_SIZE, DEFAULT_CACHE_CAPACITY)
    }

    /// Zero sizes are raised to one.
    pub fn with_capacity(inner: R, block_size: usize, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner,
            block_size: block_size.max(1) as u64,
            blocks: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub fn inner(&self) -> &R {
        &self.inner
    }

    /// Number of blocks currently held.
    pub fn cached_blocks(&self) -> usize {
        self.blocks.lock().map(|b| b.len()).unwrap_or(0)
    }

    fn block(&self, index: u64) -> Result<Bytes, IoError> {
        // A poisoned lock only costs us the cache, never the read
        if let Some(hit) = self
            .blocks
            .lock()
            .ok()
            .and_then(|mut blocks| blocks.get(&index).cloned())
        {
            return Ok(hit);
        }

        let start = index * self.block_size;
        let len = self.block_size.min(self.inner.size().saturating_sub(start)) as usize;
        let data = self.inner.read_exact_at(start, len)?;

        if let Ok(mut blocks) = self.blocks.lock() {
            blocks.put(index, data.clone());
        }
        Ok(data)
    }
}

impl<R: RangeReader> RangeReader for BlockCache<R> {
    fn read_exact_at(&self, offset: u64, len: usize) -> Result<Bytes, IoError> {
        let size = self.inner.size();
        let end = offset.saturating_add(len as u64);
        if end > size {
            return Err(IoError::RangeOutOfBounds {
                offset,
                requested: len as u64,
                size,
            });
        }
        if len == 0 {
            return Ok(Bytes::new());
        }

        let first = offset / self.block_size;
        let last = (end - 1) / self.block_size;
        let skip = (offset - first * self.block_size) as usize;

        if first == last {
            return Ok(self.block(first)?.slice(skip..skip + len));
        }

        let mut out = BytesMut::with_capacity(len);
        for index in first..=last {
            let block = self.block(index)?;
            let from = if index == first { skip } else { 0 };
            let to = block.len().min(from + len - out.len());
            out.extend_from_slice(&block[from..to]);
        }
        Ok(out.freeze())
    }

    fn size(&self) -> u64 {
        self.inner.size()
    }

    fn identifier(&self) -> &str {
        self.inner.identifier()
    }
}
