//! DICOM frame-indexed integration tests.
//!
//! Tests verify:
//! - DICOM Part 10 files are detected and their frame grid derived
//! - Frame index and pixel coordinate addressing agree
//! - Frames decode from the basic offset table or from a fragment scan
//! - Edge frames are skipped unless padding is requested

use ndarray::ArrayD;

use wsi_tiler::backend::{Backend, BackendKind, FrameIndexedBackend, SlideBackend};
use wsi_tiler::error::{BackendError, DecodeError};
use wsi_tiler::format::{detect_format, SlideFormat};
use wsi_tiler::grid::TileShape;
use wsi_tiler::io::MemoryReader;
use wsi_tiler::tile::SourceFormat;

use super::test_utils::{
    build_dicom, create_dicom, frame_color, DICOM_COLUMNS, DICOM_FRAMES, DICOM_ROWS, FRAME_SIZE,
};

const TOLERANCE: u8 = 8;

fn open(with_offset_table: bool) -> FrameIndexedBackend<MemoryReader> {
    let reader = MemoryReader::new(create_dicom(with_offset_table), "mem://wsi.dcm");
    FrameIndexedBackend::open(reader).unwrap()
}

fn assert_solid(frame: &ArrayD<u8>, color: [u8; 3]) {
    assert_eq!(frame.shape(), &[FRAME_SIZE, FRAME_SIZE, 3]);
    for (index, &value) in frame.iter().enumerate() {
        let expected = color[index % 3];
        assert!(
            value.abs_diff(expected) <= TOLERANCE,
            "sample {} is {}, expected about {}",
            index,
            value,
            expected
        );
    }
}

#[test]
fn test_detects_dicom() {
    let reader = MemoryReader::new(create_dicom(true), "mem://wsi.dcm");
    assert_eq!(detect_format(&reader).unwrap(), SlideFormat::Dicom);

    let backend = Backend::open(reader, BackendKind::Auto).unwrap();
    assert!(matches!(backend, Backend::FrameIndexed(_)));
    assert_eq!(backend.source_format(), SourceFormat::FrameIndexed);
}

#[test]
fn test_frame_grid() {
    let backend = open(true);
    assert_eq!(backend.frame_shape(), (FRAME_SIZE, FRAME_SIZE));
    assert_eq!(backend.frame_count(), DICOM_FRAMES);
    assert_eq!(backend.frame_grid(), (2, 3));
    assert_eq!(backend.get_image_shape(0).unwrap(), (24, 40));
    assert_eq!(backend.sample_shape(), vec![3]);
    assert_eq!(backend.transfer_syntax().uid(), "1.2.840.10008.1.2.4.50");
    assert_eq!(backend.offset_table().len(), DICOM_FRAMES);
}

#[test]
fn test_open_rejects_empty_pixel_matrix() {
    for total in [(DICOM_ROWS, 0), (0, DICOM_COLUMNS)] {
        let reader = MemoryReader::new(
            build_dicom(true, FRAME_SIZE as u16, total),
            "mem://empty.dcm",
        );
        assert!(
            matches!(
                FrameIndexedBackend::open(reader),
                Err(BackendError::InvalidArgument(_))
            ),
            "total {:?}",
            total
        );
    }
}

#[test]
fn test_index_and_coords_agree() {
    let backend = open(true);
    for index in 0..DICOM_FRAMES {
        let coords = backend.index_to_coords(index);
        assert_eq!(backend.coords_to_index(coords).unwrap(), index);
    }
    assert_eq!(backend.index_to_coords(4), (16, 16));
    assert_eq!(backend.index_to_coords(2), (0, 32));
}

#[test]
fn test_misaligned_coords() {
    let backend = open(true);
    assert!(matches!(
        backend.coords_to_index((8, 0)),
        Err(BackendError::MisalignedCoordinate {
            coords: (8, 0),
            frame_shape: (16, 16)
        })
    ));
    assert!(matches!(
        backend.extract_frame((0, 5)),
        Err(BackendError::MisalignedCoordinate { .. })
    ));
}

#[test]
fn test_extract_frames() {
    let backend = open(true);
    for index in 0..DICOM_FRAMES {
        let frame = backend.extract_frame(index).unwrap().into_dyn();
        assert_solid(&frame, frame_color(index));
    }

    let by_coords = backend.extract_frame((16, 16)).unwrap();
    let by_index = backend.extract_frame(4).unwrap();
    assert_eq!(by_coords, by_index);
}

#[test]
fn test_extract_frame_out_of_bounds() {
    let backend = open(true);
    assert!(matches!(
        backend.extract_frame(DICOM_FRAMES),
        Err(BackendError::RegionOutOfBounds(_))
    ));
    assert!(matches!(
        backend.extract_frame((32, 0)),
        Err(BackendError::RegionOutOfBounds(_))
    ));
}

#[test]
fn test_frames_without_offset_table() {
    let backend = open(false);
    assert_eq!(backend.offset_table().len(), DICOM_FRAMES);
    for index in 0..DICOM_FRAMES {
        let frame = backend.extract_frame(index).unwrap().into_dyn();
        assert_solid(&frame, frame_color(index));
    }
}

#[test]
fn test_extract_region_requires_frame_geometry() {
    let backend = open(true);
    let region = backend
        .extract_region((16, 32), TileShape::square(FRAME_SIZE), 0)
        .unwrap();
    assert_solid(&region, frame_color(5));

    assert!(matches!(
        backend.extract_region((0, 0), TileShape::square(8), 0),
        Err(BackendError::InvalidArgument(_))
    ));
    assert!(matches!(
        backend.extract_region((0, 0), TileShape::square(FRAME_SIZE), 1),
        Err(BackendError::UnsupportedOperation(_))
    ));
}

#[test]
fn test_no_thumbnail() {
    let backend = open(true);
    assert!(matches!(
        backend.get_thumbnail(&[8, 8]),
        Err(BackendError::UnsupportedOperation(_))
    ));
}

#[test]
fn test_generate_tiles_skips_edge_frames() {
    let backend = open(true);
    let tiles: Vec<_> = backend
        .generate_tiles(TileShape::square(FRAME_SIZE), None, false, 0)
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();
    let coords: Vec<_> = tiles.iter().map(|t| t.coords).collect();
    assert_eq!(coords, vec![(0, 0), (0, 16)]);
    assert_solid(&tiles[1].image, frame_color(1));
    assert_eq!(tiles[0].source, Some(SourceFormat::FrameIndexed));
}

#[test]
fn test_generate_tiles_padded_emits_every_frame() {
    let backend = open(true);
    let coords: Vec<_> = backend
        .generate_tiles(TileShape::square(FRAME_SIZE), None, true, 0)
        .unwrap()
        .map(|t| t.unwrap().coords)
        .collect();
    assert_eq!(
        coords,
        vec![(0, 0), (0, 16), (0, 32), (16, 0), (16, 16), (16, 32)]
    );
}

#[test]
fn test_generate_tiles_requires_frame_shape() {
    let backend = open(true);
    assert!(matches!(
        backend.generate_tiles(TileShape::square(8), None, false, 0),
        Err(BackendError::InvalidArgument(_))
    ));
}

#[test]
fn test_frame_must_decode_to_declared_shape() {
    // Header declares 8x8 frames but every codestream is 16x16
    let reader = MemoryReader::new(
        build_dicom(true, 8, (DICOM_ROWS, DICOM_COLUMNS)),
        "mem://mis-sized.dcm",
    );
    let backend = FrameIndexedBackend::open(reader).unwrap();
    assert_eq!(backend.frame_shape(), (8, 8));

    let err = backend.extract_frame(0).unwrap_err();
    match err {
        BackendError::Decode(DecodeError::UnexpectedShape { expected, actual }) => {
            assert_eq!(expected, vec![8, 8, 3]);
            assert_eq!(actual, vec![16, 16, 3]);
        }
        other => panic!("unexpected error: {:?}", other),
    }

    let first = backend
        .generate_tiles(TileShape::square(8), None, true, 0)
        .unwrap()
        .next()
        .unwrap();
    assert!(matches!(
        first,
        Err(BackendError::Decode(DecodeError::UnexpectedShape { .. }))
    ));
}
