//! Tiles stitched into one growable mosaic, plus a coordinate index.
//!
//! The first tile fixes the store's tile shape. Each tile's pixels are
//! written into the primary array at its coordinates, and each of its masks
//! into a per-name array of the same spatial extent. The index maps
//! coordinates to the tile's name, labels and source, in insertion order.

use std::ops::Range;

use indexmap::IndexMap;
use ndarray::ArrayD;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::StoreError;
use crate::grid::TileShape;
use crate::tile::{format_coords, Labels, SourceFormat, Tile};

use super::array::{crop, GrowableArray};

/// Index entry for one tile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TileEntry {
    pub name: Option<String>,
    pub labels: Labels,
    pub coords: (usize, usize),
    pub source: Option<SourceFormat>,
}

/// How a tile is looked up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TileKey<'a> {
    /// Position in insertion order
    Index(usize),
    Coords((usize, usize)),
    Name(&'a str),
}

impl From<usize> for TileKey<'_> {
    fn from(index: usize) -> Self {
        TileKey::Index(index)
    }
}

impl From<(usize, usize)> for TileKey<'_> {
    fn from(coords: (usize, usize)) -> Self {
        TileKey::Coords(coords)
    }
}

impl<'a> From<&'a str> for TileKey<'a> {
    fn from(name: &'a str) -> Self {
        TileKey::Name(name)
    }
}

/// A replacement for part or all of a stored tile.
#[derive(Debug, Clone)]
pub enum TileUpdate {
    /// Pixels, masks and metadata
    All(Tile),
    Image(ArrayD<u8>),
    Masks(IndexMap<String, ArrayD<u8>>),
    Labels(Labels),
}

#[derive(Debug, Clone, Default)]
pub struct TiledArrayStore {
    shape: Option<Vec<usize>>,
    array: Option<GrowableArray>,
    masks: IndexMap<String, GrowableArray>,
    index: IndexMap<(usize, usize), TileEntry>,
}

impl TiledArrayStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a store from persisted parts.
    pub(crate) fn from_parts(
        shape: Option<Vec<usize>>,
        array: Option<GrowableArray>,
        masks: IndexMap<String, GrowableArray>,
        index: IndexMap<(usize, usize), TileEntry>,
    ) -> Self {
        Self {
            shape,
            array,
            masks,
            index,
        }
    }

    /// Tile shape, once the first tile has been added.
    pub fn shape(&self) -> Option<&[usize]> {
        self.shape.as_deref()
    }

    /// Extent of the primary array.
    pub fn extent(&self) -> Option<&[usize]> {
        self.array.as_ref().map(GrowableArray::extent)
    }

    pub fn array(&self) -> Option<&GrowableArray> {
        self.array.as_ref()
    }

    pub fn mask_array(&self, name: &str) -> Option<&GrowableArray> {
        self.masks.get(name)
    }

    pub fn mask_names(&self) -> impl Iterator<Item = &str> {
        self.masks.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Coordinates of every tile in insertion order.
    pub fn keys(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.index.keys().copied()
    }

    pub fn entries(&self) -> impl Iterator<Item = &TileEntry> {
        self.index.values()
    }

    /// Write `tile` at `coords`, replacing any tile already there.
    pub fn add(&mut self, coords: (usize, usize), tile: &Tile) -> Result<(), StoreError> {
        let image_shape = tile.image.shape();
        if image_shape.len() < 2 {
            return Err(StoreError::InvalidArgument(format!(
                "tile image must have at least 2 axes, got {:?}",
                image_shape
            )));
        }
        match &self.shape {
            Some(shape) if shape.as_slice() != image_shape => {
                return Err(StoreError::ShapeMismatch {
                    expected: shape.clone(),
                    actual: image_shape.to_vec(),
                })
            }
            _ => {}
        }
        for (name, mask) in &tile.masks {
            if mask.ndim() < 2 || mask.shape()[..2] != image_shape[..2] {
                return Err(StoreError::ShapeMismatch {
                    expected: image_shape[..2].to_vec(),
                    actual: mask.shape().to_vec(),
                });
            }
            if let Some(existing) = self.masks.get(name) {
                if existing.ndim() != mask.ndim() || existing.extent()[2..] != mask.shape()[2..] {
                    return Err(StoreError::ShapeMismatch {
                        expected: existing.extent().to_vec(),
                        actual: mask.shape().to_vec(),
                    });
                }
            }
        }

        if self.index.contains_key(&coords) {
            warn!(coords = %format_coords(coords), "tile already stored, overwriting in place");
        }
        if self.shape.is_none() {
            debug!(shape = ?image_shape, "tile shape established");
            self.shape = Some(image_shape.to_vec());
        }

        let origin = [coords.0, coords.1];
        match &mut self.array {
            Some(array) => array.write(&origin, tile.image.view())?,
            None => {
                let mut extent = image_shape.to_vec();
                extent[0] += coords.0;
                extent[1] += coords.1;
                let mut array = GrowableArray::zeros(&extent);
                array.write(&origin, tile.image.view())?;
                self.array = Some(array);
            }
        }

        let spatial = self.spatial_extent();
        for (name, mask) in &tile.masks {
            let array = self.masks.entry(name.clone()).or_insert_with(|| {
                debug!(mask = %name, "creating mask array");
                let mut extent = mask.shape().to_vec();
                extent[..2].copy_from_slice(&spatial);
                GrowableArray::zeros(&extent)
            });
            array.write(&origin, mask.view())?;
        }
        self.sync_mask_extents()?;

        self.index.insert(
            coords,
            TileEntry {
                name: tile.name.clone(),
                labels: tile.labels.clone(),
                coords,
                source: tile.source,
            },
        );
        Ok(())
    }

    /// Fetch a tile, optionally cropped by `slicer` on its leading axes.
    pub fn get<'k>(
        &self,
        key: impl Into<TileKey<'k>>,
        slicer: Option<&[Range<usize>]>,
    ) -> Result<Tile, StoreError> {
        let coords = self.resolve(key.into())?;
        let entry = &self.index[&coords];
        let (array, shape) = match (&self.array, &self.shape) {
            (Some(array), Some(shape)) => (array, shape),
            _ => return Err(StoreError::KeyNotFound(format_coords(coords))),
        };

        let origin = [coords.0, coords.1];
        let mut image = array.read(&origin, shape)?;
        if let Some(slicer) = slicer {
            image = crop(image.view(), slicer)?;
        }

        let mut masks = IndexMap::with_capacity(self.masks.len());
        for (name, mask_array) in &self.masks {
            let mut block_shape = mask_array.extent().to_vec();
            block_shape[..2].copy_from_slice(&shape[..2]);
            let mut mask = mask_array.read(&origin, &block_shape)?;
            if let Some(slicer) = slicer {
                mask = crop(mask.view(), slicer)?;
            }
            masks.insert(name.clone(), mask);
        }

        Ok(Tile {
            image,
            coords,
            masks,
            labels: entry.labels.clone(),
            name: entry.name.clone(),
            source: entry.source,
        })
    }

    /// Replace part or all of a stored tile.
    pub fn update<'k>(
        &mut self,
        key: impl Into<TileKey<'k>>,
        update: TileUpdate,
    ) -> Result<(), StoreError> {
        let coords = self.resolve(key.into())?;
        match update {
            TileUpdate::All(tile) => {
                self.check_shape(tile.image.shape())?;
                self.add(coords, &tile)?;
                debug!(coords = %format_coords(coords), "tile overwritten");
            }
            TileUpdate::Image(image) => {
                self.check_shape(image.shape())?;
                if let Some(array) = &mut self.array {
                    array.write(&[coords.0, coords.1], image.view())?;
                }
                debug!(coords = %format_coords(coords), "tile image overwritten");
            }
            TileUpdate::Masks(_) => {
                return Err(StoreError::UnsupportedOperation(
                    "updating the masks of a stored tile".to_string(),
                ))
            }
            TileUpdate::Labels(labels) => {
                if let Some(entry) = self.index.get_mut(&coords) {
                    entry.labels = labels;
                }
                debug!(coords = %format_coords(coords), "tile labels overwritten");
            }
        }
        Ok(())
    }

    /// Drop a tile from the index. Its pixels stay in the backing arrays.
    pub fn remove<'k>(&mut self, key: impl Into<TileKey<'k>>) -> Result<TileEntry, StoreError> {
        let key = key.into();
        if let TileKey::Index(index) = key {
            return Err(StoreError::InvalidArgument(format!(
                "tiles are removed by coordinates or name, not by index {}",
                index
            )));
        }
        let coords = self.resolve(key)?;
        self.index
            .shift_remove(&coords)
            .ok_or_else(|| StoreError::KeyNotFound(format_coords(coords)))
    }

    /// Every tile in insertion order, each cropped by `slicer`.
    pub fn slice<'s>(
        &'s self,
        slicer: Option<&'s [Range<usize>]>,
    ) -> impl Iterator<Item = Result<((usize, usize), Tile), StoreError>> + 's {
        self.index
            .keys()
            .map(move |&coords| self.get(coords, slicer).map(|tile| (coords, tile)))
    }

    /// Every tile in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = Result<Tile, StoreError>> + '_ {
        self.slice(None).map(|r| r.map(|(_, tile)| tile))
    }

    /// Re-tile the index over the existing mosaic with `shape` tiles.
    ///
    /// Pixels are untouched; names and labels are discarded. Only tiles that
    /// fit entirely are indexed, flush with the origin or, with
    /// `centercrop`, centred in the mosaic.
    pub fn reshape(&mut self, shape: TileShape, centercrop: bool) -> Result<(), StoreError> {
        let (array, old_shape) = match (&self.array, &self.shape) {
            (Some(array), Some(shape)) => (array, shape),
            _ => {
                return Err(StoreError::InvalidArgument(
                    "cannot reshape an empty store".to_string(),
                ))
            }
        };
        if shape.is_empty() {
            return Err(StoreError::InvalidArgument(format!(
                "tile shape {} has a zero dimension",
                shape
            )));
        }

        let extent = array.extent();
        let (rows, cols) = (extent[0] / shape.height, extent[1] / shape.width);
        let offset = if centercrop {
            (
                (extent[0] - rows * shape.height) / 2,
                (extent[1] - cols * shape.width) / 2,
            )
        } else {
            (0, 0)
        };
        let source = self.index.values().next().and_then(|e| e.source);

        let mut new_shape = old_shape.clone();
        new_shape[0] = shape.height;
        new_shape[1] = shape.width;

        let mut index = IndexMap::with_capacity(rows * cols);
        for r in 0..rows {
            for c in 0..cols {
                let coords = (offset.0 + r * shape.height, offset.1 + c * shape.width);
                index.insert(
                    coords,
                    TileEntry {
                        name: None,
                        labels: Labels::new(),
                        coords,
                        source,
                    },
                );
            }
        }

        debug!(
            from = ?old_shape,
            to = ?new_shape,
            tiles = index.len(),
            "reshaped tile index"
        );
        self.shape = Some(new_shape);
        self.index = index;
        Ok(())
    }

    fn resolve(&self, key: TileKey<'_>) -> Result<(usize, usize), StoreError> {
        match key {
            TileKey::Index(index) => self
                .index
                .get_index(index)
                .map(|(coords, _)| *coords)
                .ok_or(StoreError::IndexOutOfRange {
                    index,
                    len: self.index.len(),
                }),
            TileKey::Coords(coords) => {
                if self.index.contains_key(&coords) {
                    Ok(coords)
                } else {
                    Err(StoreError::KeyNotFound(format_coords(coords)))
                }
            }
            TileKey::Name(name) => self
                .index
                .iter()
                .find(|(_, entry)| entry.name.as_deref() == Some(name))
                .map(|(coords, _)| *coords)
                .ok_or_else(|| StoreError::KeyNotFound(name.to_string())),
        }
    }

    fn check_shape(&self, actual: &[usize]) -> Result<(), StoreError> {
        match &self.shape {
            Some(shape) if shape.as_slice() == actual => Ok(()),
            Some(shape) => Err(StoreError::ShapeMismatch {
                expected: shape.clone(),
                actual: actual.to_vec(),
            }),
            None => Err(StoreError::InvalidArgument(
                "store holds no tiles".to_string(),
            )),
        }
    }

    fn spatial_extent(&self) -> [usize; 2] {
        self.array
            .as_ref()
            .map_or([0, 0], |a| [a.extent()[0], a.extent()[1]])
    }

    /// Keep every mask array spatially as large as the primary array.
    fn sync_mask_extents(&mut self) -> Result<(), StoreError> {
        let spatial = self.spatial_extent();
        for array in self.masks.values_mut() {
            let mut required = array.extent().to_vec();
            required[0] = required[0].max(spatial[0]);
            required[1] = required[1].max(spatial[1]);
            array.grow_to(&required)?;
        }
        Ok(())
    }
}
