//! Tile and mask storage.
//!
//! - [`TiledArrayStore`]: tiles written into one growable mosaic, indexed by
//!   coordinates, insertion order and name
//! - [`MaskStore`]: standalone named arrays sharing one shape
//! - [`container`]: persisting both to a single file

mod array;
pub mod container;
mod masks;
mod tiles;

pub use array::{crop, GrowableArray};
pub use container::{load, read_container, save, write_container};
pub use masks::{MaskKey, MaskStore};
pub use tiles::{TileEntry, TileKey, TileUpdate, TiledArrayStore};
