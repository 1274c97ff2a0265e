//! Named fixed-shape arrays that all share one shape.

use std::ops::Range;

use indexmap::IndexMap;
use ndarray::ArrayD;
use tracing::debug;

use crate::error::StoreError;

use super::array::crop;

/// How a mask is looked up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaskKey<'a> {
    Index(usize),
    Name(&'a str),
}

impl From<usize> for MaskKey<'_> {
    fn from(index: usize) -> Self {
        MaskKey::Index(index)
    }
}

impl<'a> From<&'a str> for MaskKey<'a> {
    fn from(name: &'a str) -> Self {
        MaskKey::Name(name)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MaskStore {
    shape: Option<Vec<usize>>,
    masks: IndexMap<String, ArrayD<u8>>,
}

impl MaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn from_parts(shape: Option<Vec<usize>>, masks: IndexMap<String, ArrayD<u8>>) -> Self {
        Self { shape, masks }
    }

    pub fn shape(&self) -> Option<&[usize]> {
        self.shape.as_deref()
    }

    pub fn len(&self) -> usize {
        self.masks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.masks.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.masks.keys().map(String::as_str)
    }

    /// Store a new mask. Names are unique; use [`update`](Self::update) to
    /// overwrite.
    pub fn add(&mut self, name: &str, mask: ArrayD<u8>) -> Result<(), StoreError> {
        if name.is_empty() {
            return Err(StoreError::InvalidArgument(
                "mask name must not be empty".to_string(),
            ));
        }
        if self.masks.contains_key(name) {
            return Err(StoreError::InvalidArgument(format!(
                "mask '{}' already exists, update it instead",
                name
            )));
        }
        match self.shape.as_deref() {
            Some(shape) if shape != mask.shape() => {
                return Err(StoreError::ShapeMismatch {
                    expected: shape.to_vec(),
                    actual: mask.shape().to_vec(),
                })
            }
            Some(_) => {}
            None => {
                debug!(shape = ?mask.shape(), "mask shape established");
                self.shape = Some(mask.shape().to_vec());
            }
        }
        self.masks.insert(name.to_string(), mask);
        Ok(())
    }

    /// Overwrite an existing mask with one of the same shape.
    pub fn update(&mut self, name: &str, mask: ArrayD<u8>) -> Result<(), StoreError> {
        let existing = self
            .masks
            .get_mut(name)
            .ok_or_else(|| StoreError::KeyNotFound(name.to_string()))?;
        if existing.shape() != mask.shape() {
            return Err(StoreError::ShapeMismatch {
                expected: existing.shape().to_vec(),
                actual: mask.shape().to_vec(),
            });
        }
        *existing = mask;
        Ok(())
    }

    /// Copy out a mask, optionally cropped by `slicer` on its leading axes.
    pub fn get<'k>(
        &self,
        key: impl Into<MaskKey<'k>>,
        slicer: Option<&[Range<usize>]>,
    ) -> Result<ArrayD<u8>, StoreError> {
        let mask = match key.into() {
            MaskKey::Name(name) => self
                .masks
                .get(name)
                .ok_or_else(|| StoreError::KeyNotFound(name.to_string()))?,
            MaskKey::Index(index) => self
                .masks
                .get_index(index)
                .map(|(_, mask)| mask)
                .ok_or(StoreError::IndexOutOfRange {
                    index,
                    len: self.masks.len(),
                })?,
        };
        match slicer {
            Some(slicer) => crop(mask.view(), slicer),
            None => Ok(mask.clone()),
        }
    }

    pub fn remove(&mut self, name: &str) -> Result<ArrayD<u8>, StoreError> {
        self.masks
            .shift_remove(name)
            .ok_or_else(|| StoreError::KeyNotFound(name.to_string()))
    }

    /// Every mask in insertion order, each cropped by `slicer`.
    pub fn slice<'s>(
        &'s self,
        slicer: Option<&'s [Range<usize>]>,
    ) -> impl Iterator<Item = Result<(&'s str, ArrayD<u8>), StoreError>> + 's {
        self.masks.keys().map(move |name| {
            self.get(name.as_str(), slicer)
                .map(|mask| (name.as_str(), mask))
        })
    }

    pub(crate) fn arrays(&self) -> &IndexMap<String, ArrayD<u8>> {
        &self.masks
    }
}
