//! Thumbnail resampling through the `image` crate.

use image::imageops::{self, FilterType};
use image::GrayImage;
use ndarray::{s, Array3, ArrayView3};

use crate::error::BackendError;

/// Resize every channel of a `(height, width, channels)` array to `size`.
pub(crate) fn resize_hw(
    pixels: ArrayView3<'_, u8>,
    size: (usize, usize),
) -> Result<Array3<u8>, BackendError> {
    let (h, w, channels) = pixels.dim();
    if size.0 == 0 || size.1 == 0 {
        return Err(BackendError::InvalidArgument(format!(
            "thumbnail size {:?} has a zero dimension",
            size
        )));
    }
    if (h, w) == size {
        return Ok(pixels.to_owned());
    }

    let mut out = Array3::<u8>::zeros((size.0, size.1, channels));
    for c in 0..channels {
        let plane: Vec<u8> = pixels.slice(s![.., .., c]).iter().copied().collect();
        let plane = GrayImage::from_raw(w as u32, h as u32, plane).ok_or_else(|| {
            BackendError::InvalidArgument(format!("cannot view {}x{} plane as an image", h, w))
        })?;
        let resized = imageops::resize(&plane, size.1 as u32, size.0 as u32, FilterType::Triangle);
        for (x, y, px) in resized.enumerate_pixels() {
            out[[y as usize, x as usize, c]] = px.0[0];
        }
    }
    Ok(out)
}

/// Fit `extent` inside `bounds`, keeping the aspect ratio.
pub(crate) fn fit_within(extent: (usize, usize), bounds: (usize, usize)) -> (usize, usize) {
    let scale = f64::max(
        extent.0 as f64 / bounds.0 as f64,
        extent.1 as f64 / bounds.1 as f64,
    )
    .max(1.0);
    (
        ((extent.0 as f64 / scale).round() as usize).max(1),
        ((extent.1 as f64 / scale).round() as usize).max(1),
    )
}
