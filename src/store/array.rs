//! Grow-only N-D byte arrays.
//!
//! A [`GrowableArray`] keeps a logical extent inside a larger allocation.
//! Writing past the extent grows it; when the allocation is too small it is
//! reallocated at twice its size (or the required size, if larger) along
//! each short axis and the old contents are copied over. Nothing ever
//! shrinks.

use std::ops::Range;

use ndarray::{ArrayD, ArrayViewD, IxDyn, Slice};
use tracing::trace;

use crate::error::StoreError;

#[derive(Debug, Clone, PartialEq)]
pub struct GrowableArray {
    data: ArrayD<u8>,
    extent: Vec<usize>,
}

impl GrowableArray {
    /// Zero-filled array of `extent`, allocated exactly.
    pub fn zeros(extent: &[usize]) -> Self {
        Self {
            data: ArrayD::zeros(IxDyn(extent)),
            extent: extent.to_vec(),
        }
    }

    /// Wrap an existing array; its shape becomes the extent.
    pub fn from_array(data: ArrayD<u8>) -> Self {
        let extent = data.shape().to_vec();
        Self { data, extent }
    }

    pub fn ndim(&self) -> usize {
        self.extent.len()
    }

    /// Logical size along each axis.
    pub fn extent(&self) -> &[usize] {
        &self.extent
    }

    /// Allocated size along each axis.
    pub fn capacity(&self) -> &[usize] {
        self.data.shape()
    }

    /// View of the logical extent.
    pub fn view(&self) -> ArrayViewD<'_, u8> {
        let extent = &self.extent;
        self.data
            .slice_each_axis(|ax| Slice::from(0..extent[ax.axis.index()]))
    }

    /// Make the extent at least `required` along every axis.
    pub fn grow_to(&mut self, required: &[usize]) -> Result<(), StoreError> {
        self.check_rank(required.len())?;
        if required.iter().zip(&self.extent).all(|(r, e)| r <= e) {
            return Ok(());
        }

        let capacity = self.data.shape().to_vec();
        if required.iter().zip(&capacity).any(|(r, c)| r > c) {
            let new_capacity: Vec<usize> = required
                .iter()
                .zip(&capacity)
                .map(|(&r, &c)| if r > c { r.max(c * 2) } else { c })
                .collect();
            trace!(from = ?capacity, to = ?new_capacity, "reallocating array");

            let mut data = ArrayD::<u8>::zeros(IxDyn(&new_capacity));
            let extent = &self.extent;
            data.slice_each_axis_mut(|ax| Slice::from(0..extent[ax.axis.index()]))
                .assign(&self.view());
            self.data = data;
        }

        for (e, &r) in self.extent.iter_mut().zip(required) {
            *e = (*e).max(r);
        }
        Ok(())
    }

    /// Write `value` with its first corner at `origin`, growing as needed.
    ///
    /// `origin` may be shorter than the array rank; missing axes start at 0.
    pub fn write(&mut self, origin: &[usize], value: ArrayViewD<'_, u8>) -> Result<(), StoreError> {
        self.check_rank(value.ndim())?;
        let origin = pad_origin(origin, value.ndim())?;
        let required: Vec<usize> = origin.iter().zip(value.shape()).map(|(o, n)| o + n).collect();
        self.grow_to(&required)?;

        self.data
            .slice_each_axis_mut(|ax| {
                let i = ax.axis.index();
                Slice::from(origin[i]..required[i])
            })
            .assign(&value);
        Ok(())
    }

    /// Copy out the block of `shape` at `origin`; it must lie inside the extent.
    pub fn read(&self, origin: &[usize], shape: &[usize]) -> Result<ArrayD<u8>, StoreError> {
        self.check_rank(shape.len())?;
        let origin = pad_origin(origin, shape.len())?;
        let ranges: Vec<Range<usize>> = origin
            .iter()
            .zip(shape)
            .map(|(&o, &n)| o..o + n)
            .collect();
        if ranges.iter().zip(&self.extent).any(|(r, &e)| r.end > e) {
            return Err(StoreError::InvalidArgument(format!(
                "block {:?} lies outside extent {:?}",
                ranges, self.extent
            )));
        }
        Ok(self
            .data
            .slice_each_axis(|ax| Slice::from(ranges[ax.axis.index()].clone()))
            .to_owned())
    }

    /// The logical extent as a standalone array.
    pub fn to_array(&self) -> ArrayD<u8> {
        self.view().to_owned()
    }

    fn check_rank(&self, ndim: usize) -> Result<(), StoreError> {
        if ndim != self.ndim() {
            return Err(StoreError::InvalidArgument(format!(
                "expected {} axes, got {}",
                self.ndim(),
                ndim
            )));
        }
        Ok(())
    }
}

fn pad_origin(origin: &[usize], ndim: usize) -> Result<Vec<usize>, StoreError> {
    if origin.len() > ndim {
        return Err(StoreError::InvalidArgument(format!(
            "origin {:?} has more than {} axes",
            origin, ndim
        )));
    }
    let mut padded = origin.to_vec();
    padded.resize(ndim, 0);
    Ok(padded)
}

/// Crop the leading axes of `array` to `slicer`; trailing axes stay whole.
pub fn crop(array: ArrayViewD<'_, u8>, slicer: &[Range<usize>]) -> Result<ArrayD<u8>, StoreError> {
    if slicer.len() > array.ndim() {
        return Err(StoreError::InvalidArgument(format!(
            "slicer has {} ranges for a {}-D array",
            slicer.len(),
            array.ndim()
        )));
    }
    for (axis, (range, &len)) in slicer.iter().zip(array.shape()).enumerate() {
        if range.start > range.end || range.end > len {
            return Err(StoreError::InvalidArgument(format!(
                "range {:?} out of bounds for axis {} of length {}",
                range, axis, len
            )));
        }
    }
    Ok(array
        .slice_each_axis(|ax| match slicer.get(ax.axis.index()) {
            Some(range) => Slice::from(range.clone()),
            None => Slice::from(..),
        })
        .to_owned())
}
