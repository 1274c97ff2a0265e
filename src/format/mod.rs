//! Container parsers and pixel codecs.
//!
//! - [`tiff`]: pyramidal TIFF/SVS and multi-page stacks
//! - [`dicom`]: tiled whole-slide DICOM with encapsulated frames
//! - [`codec`]: JPEG, JPEG 2000, Deflate and raw chunk decoding
//!
//! Use [`detect::detect_format`] to pick a parser from a file's leading bytes.

pub mod codec;
pub mod detect;
pub mod dicom;
pub mod jpeg;
pub mod tiff;

pub use detect::{detect_format, is_tiff_header, SlideFormat};
