//! TIFF page stack integration tests.
//!
//! Tests verify:
//! - Untiled multi-page TIFFs are opened as `(y, x, z, c, t)` volumes
//! - Regions and tiles carry every plane of the stack
//! - Thumbnail resampling rules

use ndarray::Ix5;

use wsi_tiler::backend::{as_volume, Backend, BackendKind, SlideBackend, StackSource, VolumetricBackend};
use wsi_tiler::error::BackendError;
use wsi_tiler::format::{detect_format, SlideFormat};
use wsi_tiler::grid::TileShape;
use wsi_tiler::io::MemoryReader;
use wsi_tiler::tile::SourceFormat;

use super::test_utils::{create_stack_tiff, stack_pixel, STACK_HEIGHT, STACK_PAGES, STACK_WIDTH};

fn open() -> VolumetricBackend<StackSource<MemoryReader>> {
    let reader = MemoryReader::new(create_stack_tiff(), "mem://stack.tif");
    VolumetricBackend::open(reader).unwrap()
}

#[test]
fn test_detects_page_stack() {
    let reader = MemoryReader::new(create_stack_tiff(), "mem://stack.tif");
    assert_eq!(detect_format(&reader).unwrap(), SlideFormat::TiffStack);

    let backend = Backend::open(reader, BackendKind::Auto).unwrap();
    assert!(matches!(backend, Backend::Volumetric(_)));
    assert_eq!(backend.source_format(), SourceFormat::Volumetric);
}

#[test]
fn test_volume_shape() {
    let backend = open();
    let shape = backend.volume_shape();
    assert_eq!(shape.size_x, STACK_WIDTH as usize);
    assert_eq!(shape.size_y, STACK_HEIGHT as usize);
    assert_eq!(shape.size_z, STACK_PAGES);
    assert_eq!((shape.size_c, shape.size_t), (1, 1));

    assert_eq!(backend.get_image_shape(0).unwrap(), (12, 20));
    assert_eq!(backend.sample_shape(), vec![3, 1, 1]);
}

#[test]
fn test_extract_region_reads_every_plane() {
    let backend = open();
    let region = backend
        .extract_region((2, 4), TileShape::new(4, 5), 0)
        .unwrap();
    let volume = as_volume(region).unwrap();
    assert_eq!(volume.dim(), (4, 5, 3, 1, 1));

    for ((r, c, z, _, _), &value) in volume.indexed_iter() {
        assert_eq!(value, stack_pixel(2 + r, 4 + c, z));
    }
}

#[test]
fn test_single_level_only() {
    let backend = open();
    assert!(matches!(
        backend.extract_region((0, 0), TileShape::square(4), 1),
        Err(BackendError::UnsupportedOperation(_))
    ));
    assert!(matches!(
        backend.get_image_shape(1),
        Err(BackendError::UnsupportedOperation(_))
    ));
}

#[test]
fn test_generate_tiles_counts() {
    let backend = open();
    let unpadded: Vec<_> = backend
        .generate_tiles(TileShape::square(4), None, false, 0)
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(unpadded.len(), 15);
    for tile in &unpadded {
        assert_eq!(tile.image.shape(), &[4, 4, 3, 1, 1]);
        assert_eq!(tile.source, Some(SourceFormat::Volumetric));
    }

    let padded = backend
        .generate_tiles(TileShape::square(4), None, true, 0)
        .unwrap()
        .count();
    assert_eq!(padded, 24);
}

#[test]
fn test_generate_tiles_pads_volume() {
    let backend = open();
    let tile = backend
        .generate_tiles(TileShape::square(8), None, true, 0)
        .unwrap()
        .map(Result::unwrap)
        .find(|t| t.coords == (8, 16))
        .unwrap();
    let volume = tile.image.into_dimensionality::<Ix5>().unwrap();

    for ((r, c, z, _, _), &value) in volume.indexed_iter() {
        let expected = if r < 4 && c < 4 {
            stack_pixel(8 + r, 16 + c, z)
        } else {
            0
        };
        assert_eq!(value, expected);
    }
}

// =============================================================================
// Thumbnail
// =============================================================================

#[test]
fn test_thumbnail_full_size_when_empty() {
    let backend = open();
    let thumbnail = backend.get_thumbnail(&[]).unwrap();
    let full = backend
        .extract_region((0, 0), TileShape::new(12, 20), 0)
        .unwrap();
    assert_eq!(thumbnail, full);
}

#[test]
fn test_thumbnail_resamples_plane_and_depth() {
    let backend = open();
    assert_eq!(
        backend.get_thumbnail(&[6, 10]).unwrap().shape(),
        &[6, 10, 3, 1, 1]
    );
    assert_eq!(
        backend.get_thumbnail(&[6, 10, 2]).unwrap().shape(),
        &[6, 10, 2, 1, 1]
    );
}

#[test]
fn test_thumbnail_rejects_channel_change() {
    let backend = open();
    assert!(matches!(
        backend.get_thumbnail(&[6, 10, 3, 2]),
        Err(BackendError::InvalidArgument(_))
    ));
    assert!(matches!(
        backend.get_thumbnail(&[6, 10, 3, 1, 1, 1]),
        Err(BackendError::InvalidArgument(_))
    ));
}
