//! Slide, store and container integration tests.
//!
//! Tests verify:
//! - Slides open from disk with the requested or detected backend
//! - Tiling a slide fills the tile store with the backend's pixels
//! - Stores survive a write/read round trip through the container file
//! - The `wsi-tiler` binary tiles and inspects slides end to end

use std::process::Command;

use ndarray::{ArrayD, IxDyn};
use tempfile::TempDir;

use wsi_tiler::backend::{BackendKind, SlideBackend};
use wsi_tiler::error::{BackendError, SlideError, StoreError};
use wsi_tiler::grid::TileShape;
use wsi_tiler::slide::{ReadOptions, SlideData};
use wsi_tiler::store::{self, MaskStore, TileKey, TileUpdate, TiledArrayStore};
use wsi_tiler::tile::{SourceFormat, Tile};

use super::test_utils::{
    create_dicom, create_pyramidal_tiff, create_stack_tiff, level0_pixel, write_file,
};

fn pyramid_slide(dir: &TempDir) -> SlideData {
    let path = write_file(dir.path(), "slide.tif", &create_pyramidal_tiff(None));
    SlideData::open(path, BackendKind::Auto).unwrap()
}

// =============================================================================
// Opening
// =============================================================================

#[test]
fn test_open_names_slide_after_file() {
    let dir = TempDir::new().unwrap();
    let slide = pyramid_slide(&dir);
    assert_eq!(slide.name(), "slide");
    assert_eq!(slide.shape().unwrap(), (48, 64));
    assert_eq!(slide.backend().source_format(), SourceFormat::Pyramidal);
    assert!(slide.tiles.is_empty());
    assert!(slide.masks.is_empty());
}

#[test]
fn test_open_with_read_options() {
    let dir = TempDir::new().unwrap();
    let path = write_file(dir.path(), "small-blocks.tif", &create_pyramidal_tiff(None));
    let options = ReadOptions {
        block_size: 1024,
        cache_blocks: 4,
    };
    let slide = SlideData::open_with(path, BackendKind::Pyramidal, options).unwrap();
    let region = slide
        .backend()
        .extract_region((0, 0), TileShape::square(48), 0)
        .unwrap();
    assert_eq!(region[[47, 40, 2]], level0_pixel(47, 40, 2));
}

#[test]
fn test_open_with_wrong_backend() {
    let dir = TempDir::new().unwrap();
    let path = write_file(dir.path(), "stack.tif", &create_stack_tiff());
    assert!(matches!(
        SlideData::open(path, BackendKind::FrameIndexed),
        Err(SlideError::Backend(_))
    ));
}

#[test]
fn test_open_missing_file() {
    let dir = TempDir::new().unwrap();
    assert!(matches!(
        SlideData::open(dir.path().join("missing.svs"), BackendKind::Auto),
        Err(SlideError::Backend(BackendError::Io(_)))
    ));
}

// =============================================================================
// Tiling Into Stores
// =============================================================================

#[test]
fn test_tile_pyramid_into_store() {
    let dir = TempDir::new().unwrap();
    let mut slide = pyramid_slide(&dir);

    let count = slide
        .tile_into_store(TileShape::square(16), None, false, 0)
        .unwrap();
    assert_eq!(count, 12);
    assert_eq!(slide.tiles.len(), 12);
    assert_eq!(slide.tiles.shape().unwrap(), &[16, 16, 3]);
    assert_eq!(slide.tiles.extent().unwrap(), &[48, 64, 3]);

    let stored = slide.tiles.get((16, 32), None).unwrap();
    let region = slide
        .backend()
        .extract_region((16, 32), TileShape::square(16), 0)
        .unwrap();
    assert_eq!(stored.image, region);
    assert_eq!(stored.source, Some(SourceFormat::Pyramidal));

    let first = slide.tiles.get(TileKey::Index(0), None).unwrap();
    assert_eq!(first.coords, (0, 0));
}

#[test]
fn test_tile_stack_into_store() {
    let dir = TempDir::new().unwrap();
    let path = write_file(dir.path(), "stack.tif", &create_stack_tiff());
    let mut slide = SlideData::open(path, BackendKind::Auto).unwrap();

    let count = slide
        .tile_into_store(TileShape::square(4), None, false, 0)
        .unwrap();
    assert_eq!(count, 15);
    assert_eq!(slide.tiles.extent().unwrap(), &[12, 20, 3, 1, 1]);
}

#[test]
fn test_tile_dicom_into_store() {
    let dir = TempDir::new().unwrap();
    let path = write_file(dir.path(), "wsi.dcm", &create_dicom(true));
    let mut slide = SlideData::open(path, BackendKind::Auto).unwrap();

    assert_eq!(
        slide
            .tile_into_store(TileShape::square(16), None, false, 0)
            .unwrap(),
        2
    );
    let keys: Vec<_> = slide.tiles.keys().collect();
    assert_eq!(keys, vec![(0, 0), (0, 16)]);
}

#[test]
fn test_reshape_after_tiling() {
    let dir = TempDir::new().unwrap();
    let mut slide = pyramid_slide(&dir);
    slide
        .tile_into_store(TileShape::square(16), None, false, 0)
        .unwrap();

    slide.tiles.reshape(TileShape::square(32), false).unwrap();
    let keys: Vec<_> = slide.tiles.keys().collect();
    assert_eq!(keys, vec![(0, 0), (0, 32)]);

    let tile = slide.tiles.get((0, 32), None).unwrap();
    let region = slide
        .backend()
        .extract_region((0, 32), TileShape::square(32), 0)
        .unwrap();
    assert_eq!(tile.image, region);

    slide.tiles.reshape(TileShape::square(32), true).unwrap();
    let keys: Vec<_> = slide.tiles.keys().collect();
    assert_eq!(keys, vec![(8, 0), (8, 32)]);
}

// =============================================================================
// Persistence
// =============================================================================

#[test]
fn test_write_and_read_stores() {
    let dir = TempDir::new().unwrap();
    let mut slide = pyramid_slide(&dir);
    slide
        .tile_into_store(TileShape::square(16), None, true, 1)
        .unwrap();
    let thumbnail = slide.backend().get_thumbnail(&[12, 16]).unwrap();
    slide.masks.add("thumbnail", thumbnail.clone()).unwrap();

    let path = dir.path().join("slide.wstc");
    slide.write(&path).unwrap();

    let (tiles, masks) = store::load(&path).unwrap();
    assert_eq!(tiles.len(), slide.tiles.len());
    assert_eq!(
        tiles.keys().collect::<Vec<_>>(),
        slide.tiles.keys().collect::<Vec<_>>()
    );
    for coords in slide.tiles.keys() {
        assert_eq!(
            tiles.get(coords, None).unwrap(),
            slide.tiles.get(coords, None).unwrap()
        );
    }
    assert_eq!(masks.get("thumbnail", None).unwrap(), thumbnail);

    let mut reopened = pyramid_slide(&dir);
    reopened.read_stores(&path).unwrap();
    assert_eq!(reopened.tiles.len(), 6);
    assert_eq!(reopened.masks.len(), 1);
}

#[test]
fn test_store_round_trip_keeps_tile_metadata() {
    let mut tiles = TiledArrayStore::new();
    let image = ArrayD::from_elem(IxDyn(&[4, 4, 3]), 7u8);
    let tile = Tile::new(image.clone(), (0, 4))
        .with_name("first")
        .with_label("class", "tumor")
        .with_source(SourceFormat::FrameIndexed)
        .with_mask("tissue", ArrayD::from_elem(IxDyn(&[4, 4]), 1u8))
        .unwrap();
    tiles.add((0, 4), &tile).unwrap();
    tiles
        .add((4, 0), &Tile::new(ArrayD::zeros(IxDyn(&[4, 4, 3])), (4, 0)))
        .unwrap();

    let dir = TempDir::new().unwrap();
    let path = dir.path().join("meta.wstc");
    store::save(&path, &tiles, &MaskStore::new()).unwrap();
    let (mut loaded, masks) = store::load(&path).unwrap();
    assert!(masks.is_empty());

    let named = loaded.get("first", None).unwrap();
    assert_eq!(named.coords, (0, 4));
    assert_eq!(named.image, image);
    assert_eq!(named.labels["class"], "tumor");
    assert_eq!(named.source, Some(SourceFormat::FrameIndexed));
    assert_eq!(named.masks["tissue"], ArrayD::from_elem(IxDyn(&[4, 4]), 1u8));
    assert_eq!(loaded.extent().unwrap(), &[8, 8, 3]);

    loaded
        .update("first", TileUpdate::Image(ArrayD::from_elem(IxDyn(&[4, 4, 3]), 9)))
        .unwrap();
    assert!(loaded.get((0, 4), None).unwrap().image.iter().all(|&v| v == 9));
    loaded.remove("first").unwrap();
    assert!(matches!(
        loaded.get("first", None),
        Err(StoreError::KeyNotFound(_))
    ));
}

#[test]
fn test_load_rejects_non_container() {
    let dir = TempDir::new().unwrap();
    let path = write_file(dir.path(), "slide.tif", &create_pyramidal_tiff(None));
    assert!(matches!(store::load(&path), Err(StoreError::Corrupt(_))));
}

// =============================================================================
// Binary
// =============================================================================

#[test]
fn test_cli_tile_then_inspect() {
    let dir = TempDir::new().unwrap();
    let slide = write_file(dir.path(), "slide.tif", &create_pyramidal_tiff(None));
    let output = dir.path().join("tiles.wstc");

    let status = Command::new(env!("CARGO_BIN_EXE_wsi-tiler"))
        .arg("tile")
        .arg(&slide)
        .args(["--shape", "16", "--output"])
        .arg(&output)
        .status()
        .unwrap();
    assert!(status.success());
    assert!(output.exists());

    let inspect = Command::new(env!("CARGO_BIN_EXE_wsi-tiler"))
        .arg("inspect")
        .arg(&output)
        .output()
        .unwrap();
    assert!(inspect.status.success());
    let stdout = String::from_utf8_lossy(&inspect.stdout);
    assert!(stdout.contains("Tiles:      12"), "{}", stdout);
}

#[test]
fn test_cli_info_fails_on_missing_slide() {
    let dir = TempDir::new().unwrap();
    let status = Command::new(env!("CARGO_BIN_EXE_wsi-tiler"))
        .arg("info")
        .arg(dir.path().join("missing.svs"))
        .status()
        .unwrap();
    assert!(!status.success());
}
