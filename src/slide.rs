//! A slide file together with the tiles and masks extracted from it.

use std::path::Path;

use tracing::info;

use crate::backend::{Backend, BackendKind, SlideBackend, TileIter};
use crate::error::{BackendError, SlideError, StoreError};
use crate::grid::TileShape;
use crate::io::{BlockCache, LocalFileReader, RangeReader, DEFAULT_BLOCK_SIZE, DEFAULT_CACHE_CAPACITY};
use crate::store::{self, MaskStore, TiledArrayStore};

/// How slide files are read from disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadOptions {
    pub block_size: usize,
    pub cache_blocks: usize,
}

impl Default for ReadOptions {
    fn default() -> Self {
        Self {
            block_size: DEFAULT_BLOCK_SIZE,
            cache_blocks: DEFAULT_CACHE_CAPACITY,
        }
    }
}

/// A local slide file read through a block cache.
pub type CachedFile = BlockCache<LocalFileReader>;

pub struct SlideData<R = CachedFile> {
    name: String,
    backend: Backend<R>,
    pub tiles: TiledArrayStore,
    pub masks: MaskStore,
}

impl SlideData<CachedFile> {
    /// Open a slide file with default read options.
    pub fn open(path: impl AsRef<Path>, kind: BackendKind) -> Result<Self, SlideError> {
        Self::open_with(path, kind, ReadOptions::default())
    }

    pub fn open_with(
        path: impl AsRef<Path>,
        kind: BackendKind,
        options: ReadOptions,
    ) -> Result<Self, SlideError> {
        let path = path.as_ref();
        let file = LocalFileReader::open(path).map_err(BackendError::from)?;
        let reader = BlockCache::with_capacity(file, options.block_size, options.cache_blocks);
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Self::from_reader(reader, kind, name)
    }
}

impl<R: RangeReader> SlideData<R> {
    pub fn from_reader(
        reader: R,
        kind: BackendKind,
        name: impl Into<String>,
    ) -> Result<Self, SlideError> {
        let name = name.into();
        let backend = Backend::open(reader, kind)?;
        info!(
            slide = %name,
            backend = backend.source_format().name(),
            "opened slide"
        );
        Ok(Self {
            name,
            backend,
            tiles: TiledArrayStore::new(),
            masks: MaskStore::new(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn backend(&self) -> &Backend<R> {
        &self.backend
    }

    /// `(height, width)` of level 0.
    pub fn shape(&self) -> Result<(usize, usize), BackendError> {
        self.backend.get_image_shape(0)
    }

    pub fn generate_tiles(
        &self,
        shape: TileShape,
        stride: Option<TileShape>,
        pad: bool,
        level: usize,
    ) -> Result<TileIter<'_>, BackendError> {
        self.backend.generate_tiles(shape, stride, pad, level)
    }

    /// Add every generated tile to the tile store; returns how many were added.
    pub fn tile_into_store(
        &mut self,
        shape: TileShape,
        stride: Option<TileShape>,
        pad: bool,
        level: usize,
    ) -> Result<usize, SlideError> {
        let mut count = 0;
        for tile in self.backend.generate_tiles(shape, stride, pad, level)? {
            let tile = tile?;
            self.tiles.add(tile.coords, &tile)?;
            count += 1;
        }
        info!(
            slide = %self.name,
            tiles = count,
            shape = %shape,
            pad,
            level,
            "tiled slide into store"
        );
        Ok(count)
    }

    /// Persist the tile and mask stores to `path`.
    pub fn write(&self, path: impl AsRef<Path>) -> Result<(), StoreError> {
        store::save(path, &self.tiles, &self.masks)
    }

    /// Replace the stores with those persisted at `path`.
    pub fn read_stores(&mut self, path: impl AsRef<Path>) -> Result<(), StoreError> {
        let (tiles, masks) = store::load(path)?;
        self.tiles = tiles;
        self.masks = masks;
        Ok(())
    }
}
