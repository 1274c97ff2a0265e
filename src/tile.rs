//! Tile records produced by backends and held by stores.

use std::fmt;

use indexmap::IndexMap;
use ndarray::ArrayD;
use serde::{Deserialize, Serialize};

use crate::error::StoreError;

/// Free-form per-tile annotations, kept in insertion order.
pub type Labels = IndexMap<String, serde_json::Value>;

/// Which kind of backend produced a tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SourceFormat {
    Pyramidal,
    Volumetric,
    FrameIndexed,
}

impl SourceFormat {
    pub const fn name(&self) -> &'static str {
        match self {
            SourceFormat::Pyramidal => "pyramidal",
            SourceFormat::Volumetric => "volumetric",
            SourceFormat::FrameIndexed => "frame-indexed",
        }
    }
}

impl fmt::Display for SourceFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One tile: pixels, where they sit in the mosaic, and what is known about them.
///
/// `coords` is the `(row, col)` of the top-left pixel. Every mask shares the
/// image's two leading (spatial) dimensions.
#[derive(Debug, Clone, PartialEq)]
pub struct Tile {
    pub image: ArrayD<u8>,
    pub coords: (usize, usize),
    pub masks: IndexMap<String, ArrayD<u8>>,
    pub labels: Labels,
    pub name: Option<String>,
    pub source: Option<SourceFormat>,
}

impl Tile {
    pub fn new(image: ArrayD<u8>, coords: (usize, usize)) -> Self {
        Self {
            image,
            coords,
            masks: IndexMap::new(),
            labels: Labels::new(),
            name: None,
            source: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_labels(mut self, labels: Labels) -> Self {
        self.labels = labels;
        self
    }

    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    pub fn with_source(mut self, source: SourceFormat) -> Self {
        self.source = Some(source);
        self
    }

    /// Attach a mask; its leading two dimensions must match the image.
    pub fn with_mask(
        mut self,
        name: impl Into<String>,
        mask: ArrayD<u8>,
    ) -> Result<Self, StoreError> {
        let name = name.into();
        if mask.ndim() < 2 || mask.shape()[..2] != self.image.shape()[..2.min(self.image.ndim())] {
            return Err(StoreError::ShapeMismatch {
                expected: self.image.shape().iter().take(2).copied().collect(),
                actual: mask.shape().to_vec(),
            });
        }
        self.masks.insert(name, mask);
        Ok(self)
    }

    /// `(height, width)` of the image.
    pub fn spatial_shape(&self) -> (usize, usize) {
        let shape = self.image.shape();
        (
            shape.first().copied().unwrap_or(0),
            shape.get(1).copied().unwrap_or(0),
        )
    }
}

/// `"(i, j)"`, the textual form coordinates take in persisted indices.
pub fn format_coords(coords: (usize, usize)) -> String {
    format!("({}, {})", coords.0, coords.1)
}

/// Inverse of [`format_coords`].
pub fn parse_coords(s: &str) -> Option<(usize, usize)> {
    let inner = s.trim().strip_prefix('(')?.strip_suffix(')')?;
    let (i, j) = inner.split_once(',')?;
    Some((i.trim().parse().ok()?, j.trim().parse().ok()?))
}
