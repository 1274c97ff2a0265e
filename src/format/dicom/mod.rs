//! DICOM Part 10 parsing for tiled whole-slide instances.
//!
//! Only what frame-level random access needs: the file meta group, the few
//! image geometry elements of the dataset, and the encapsulated Pixel Data
//! element with its basic offset table. Sequences before Pixel Data are
//! skipped, never materialised.

mod cursor;
mod header;
mod offset_table;

pub use cursor::{Cursor, ElementHeader, Tag, UNDEFINED_LENGTH};
pub use header::{has_dicm_prefix, DicomHeader, TransferSyntax, DICM, PREAMBLE_LEN};
pub use offset_table::BasicOffsetTable;
