//! TIFF and BigTIFF parsing.
//!
//! - **Byte order**: declared by the header (II / MM); every multi-byte
//!   value is read through [`ByteOrder`].
//! - **IFD chain**: pyramidal slides hold one IFD per level plus label and
//!   macro images; page stacks hold one IFD per plane.
//! - **Chunks**: pixels are stored in tiles or strips, each compressed on its
//!   own; [`ChunkLayout`] decodes just the chunks a region touches.

mod layout;
mod parser;
mod pyramid;
mod stack;
mod tags;
mod values;

pub use layout::ChunkLayout;
pub use parser::{
    read_header, read_ifd_chain, ByteOrder, Ifd, IfdEntry, TiffHeader, BIGTIFF_HEADER_SIZE,
    TIFF_HEADER_SIZE,
};
pub use pyramid::{first_description, PyramidLevel, TiffPyramid, MAX_PYRAMID_IFDS};
pub use stack::{parse_imagej, parse_ome, DimensionOrder, StackDims, TiffStack, MAX_STACK_PAGES};
pub use tags::{Compression, FieldType, TiffTag};
pub use values::{parse_u64_array, ValueReader};
