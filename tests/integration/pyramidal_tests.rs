//! Pyramidal TIFF integration tests.
//!
//! Tests verify:
//! - Tiled TIFFs are detected and opened as pyramids, label images excluded
//! - Region reads return exact samples, across chunk boundaries and levels
//! - Regions and padded tiles past the image edge are zero-filled
//! - Thumbnails and the block cache

use ndarray::{ArrayD, Ix3};

use wsi_tiler::backend::{Backend, BackendKind, PyramidalBackend, SlideBackend};
use wsi_tiler::error::BackendError;
use wsi_tiler::format::{detect_format, SlideFormat};
use wsi_tiler::grid::TileShape;
use wsi_tiler::io::{BlockCache, MemoryReader};
use wsi_tiler::tile::SourceFormat;

use super::test_utils::{
    create_pyramidal_tiff, level0_pixel, level1_pixel, CountingReader, PYRAMID_HEIGHT,
    PYRAMID_WIDTH,
};

fn open() -> PyramidalBackend<MemoryReader> {
    let reader = MemoryReader::new(create_pyramidal_tiff(None), "mem://pyramid.tif");
    PyramidalBackend::open(reader).unwrap()
}

/// Assert that `region[r, c, s] == pixel(origin + (r, c), s)` inside
/// `valid` rows and columns and zero outside.
fn assert_region(
    region: &ArrayD<u8>,
    origin: (usize, usize),
    valid: (usize, usize),
    pixel: fn(usize, usize, usize) -> u8,
) {
    let region = region.view().into_dimensionality::<Ix3>().unwrap();
    for ((r, c, s), &value) in region.indexed_iter() {
        let expected = if r < valid.0 && c < valid.1 {
            pixel(origin.0 + r, origin.1 + c, s)
        } else {
            0
        };
        assert_eq!(value, expected, "sample ({}, {}, {})", r, c, s);
    }
}

// =============================================================================
// Detection
// =============================================================================

#[test]
fn test_detects_pyramidal_tiff() {
    let reader = MemoryReader::new(create_pyramidal_tiff(None), "mem://pyramid.tif");
    assert_eq!(detect_format(&reader).unwrap(), SlideFormat::PyramidalTiff);

    let backend = Backend::open(reader, BackendKind::Auto).unwrap();
    assert!(matches!(backend, Backend::Pyramidal(_)));
    assert_eq!(backend.source_format(), SourceFormat::Pyramidal);
}

#[test]
fn test_detects_aperio_description() {
    let data = create_pyramidal_tiff(Some("Aperio Image Library v12\n64x48 |AppMag = 40"));
    let reader = MemoryReader::new(data, "mem://slide.svs");
    assert_eq!(detect_format(&reader).unwrap(), SlideFormat::AperioSvs);

    let backend = PyramidalBackend::open(reader).unwrap();
    assert!(backend.is_aperio());
}

// =============================================================================
// Levels
// =============================================================================

#[test]
fn test_levels_exclude_label_image() {
    let backend = open();
    assert_eq!(backend.level_count(), 2);
    assert_eq!(
        backend.get_image_shape(0).unwrap(),
        (PYRAMID_HEIGHT as usize, PYRAMID_WIDTH as usize)
    );
    assert_eq!(backend.get_image_shape(1).unwrap(), (24, 32));
    assert!((backend.level_geometry(1).unwrap().downsample - 2.0).abs() < 1e-9);
    assert_eq!(backend.sample_shape(), vec![3]);

    assert!(matches!(
        backend.get_image_shape(2),
        Err(BackendError::LevelOutOfRange { level: 2, count: 2 })
    ));
}

// =============================================================================
// Region Extraction
// =============================================================================

#[test]
fn test_extract_single_chunk() {
    let backend = open();
    let region = backend
        .extract_region((16, 32), TileShape::square(16), 0)
        .unwrap();
    assert_eq!(region.shape(), &[16, 16, 3]);
    assert_region(&region, (16, 32), (16, 16), level0_pixel);
}

#[test]
fn test_extract_across_chunk_boundaries() {
    let backend = open();
    let region = backend
        .extract_region((10, 7), TileShape::new(20, 30), 0)
        .unwrap();
    assert_eq!(region.shape(), &[20, 30, 3]);
    assert_region(&region, (10, 7), (20, 30), level0_pixel);
}

#[test]
fn test_extract_lower_level_uses_level0_location() {
    let backend = open();
    let region = backend
        .extract_region((16, 32), TileShape::new(8, 12), 1)
        .unwrap();
    assert_region(&region, (8, 16), (8, 12), level1_pixel);
}

#[test]
fn test_extract_past_edge_is_zero_filled() {
    let backend = open();
    let region = backend
        .extract_region((40, 56), TileShape::square(16), 0)
        .unwrap();
    assert_eq!(region.shape(), &[16, 16, 3]);
    assert_region(&region, (40, 56), (8, 8), level0_pixel);
}

#[test]
fn test_extract_rejects_empty_size() {
    let backend = open();
    assert!(matches!(
        backend.extract_region((0, 0), TileShape::new(0, 4), 0),
        Err(BackendError::InvalidArgument(_))
    ));
}

// =============================================================================
// Tile Generation
// =============================================================================

#[test]
fn test_generate_tiles_unpadded() {
    let backend = open();
    let tiles: Vec<_> = backend
        .generate_tiles(TileShape::square(24), None, false, 0)
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();

    let coords: Vec<_> = tiles.iter().map(|t| t.coords).collect();
    assert_eq!(coords, vec![(0, 0), (0, 24), (24, 0), (24, 24)]);
    for tile in &tiles {
        assert_eq!(tile.image.shape(), &[24, 24, 3]);
        assert_eq!(tile.source, Some(SourceFormat::Pyramidal));
        assert_region(&tile.image, tile.coords, (24, 24), level0_pixel);
    }
}

#[test]
fn test_generate_tiles_padded() {
    let backend = open();
    let tiles: Vec<_> = backend
        .generate_tiles(TileShape::square(24), None, true, 0)
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(tiles.len(), 9);

    let overhang = tiles.iter().find(|t| t.coords == (24, 48)).unwrap();
    assert_region(&overhang.image, (24, 48), (24, 16), level0_pixel);

    let outside = tiles.iter().find(|t| t.coords == (48, 48)).unwrap();
    assert_eq!(outside.image.shape(), &[24, 24, 3]);
    assert!(outside.image.iter().all(|&v| v == 0));
}

#[test]
fn test_generate_tiles_with_stride_on_level() {
    let backend = open();
    let coords: Vec<_> = backend
        .generate_tiles(TileShape::square(16), Some(TileShape::new(8, 16)), false, 1)
        .unwrap()
        .map(|t| t.unwrap().coords)
        .collect();
    // level 1 origins (0|8, 0|16) reported at level 0
    assert_eq!(coords, vec![(0, 0), (0, 32), (16, 0), (16, 32)]);
}

#[test]
fn test_generated_coords_address_their_region() {
    let backend = open();
    for pad in [false, true] {
        for tile in backend
            .generate_tiles(TileShape::square(16), None, pad, 1)
            .unwrap()
        {
            let tile = tile.unwrap();
            let region = backend
                .extract_region(tile.coords, TileShape::square(16), 1)
                .unwrap();
            assert_eq!(region, tile.image, "tile at {:?}", tile.coords);
        }
    }
}

#[test]
fn test_generate_tiles_rejects_bad_level() {
    let backend = open();
    assert!(backend
        .generate_tiles(TileShape::square(16), None, false, 5)
        .is_err());
}

// =============================================================================
// Thumbnail and Caching
// =============================================================================

#[test]
fn test_thumbnail_fits_bounds() {
    let backend = open();
    let thumbnail = backend.get_thumbnail(&[12, 16]).unwrap();
    assert_eq!(thumbnail.shape(), &[12, 16, 3]);

    assert!(matches!(
        backend.get_thumbnail(&[12]),
        Err(BackendError::InvalidArgument(_))
    ));
}

#[test]
fn test_block_cache_serves_repeat_reads() {
    let reader = CountingReader::new(create_pyramidal_tiff(None), "mem://counted.tif");
    let cache = BlockCache::with_capacity(reader.clone(), 4096, 64);
    let backend = PyramidalBackend::open(cache).unwrap();

    let first = backend
        .extract_region((0, 0), TileShape::square(32), 0)
        .unwrap();
    let reads = reader.reads();
    let second = backend
        .extract_region((0, 0), TileShape::square(32), 0)
        .unwrap();

    assert_eq!(first, second);
    assert_eq!(reader.reads(), reads);
}
