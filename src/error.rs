use thiserror::Error;

/// I/O errors that can occur when reading slide files
#[derive(Debug, Clone, Error)]
pub enum IoError {
    /// The file could not be opened or read
    #[error("I/O error on {path}: {message}")]
    File { path: String, message: String },

    /// Requested range exceeds resource bounds
    #[error("Range out of bounds: requested {requested} bytes at offset {offset}, size is {size}")]
    RangeOutOfBounds {
        offset: u64,
        requested: u64,
        size: u64,
    },

    /// File not found
    #[error("File not found: {0}")]
    NotFound(String),
}

impl IoError {
    pub(crate) fn from_std(path: impl Into<String>, err: std::io::Error) -> Self {
        let path = path.into();
        if err.kind() == std::io::ErrorKind::NotFound {
            IoError::NotFound(path)
        } else {
            IoError::File {
                path,
                message: err.to_string(),
            }
        }
    }
}

/// Errors related to format detection
#[derive(Debug, Clone, Error)]
pub enum FormatError {
    /// I/O error while reading the file
    #[error("I/O error: {0}")]
    Io(#[from] IoError),

    /// TIFF parsing error
    #[error("TIFF error: {0}")]
    Tiff(#[from] TiffError),

    /// DICOM parsing error
    #[error("DICOM error: {0}")]
    Dicom(#[from] DicomError),

    /// File format is not supported
    #[error("Unsupported format: {reason}")]
    UnsupportedFormat { reason: String },
}

/// Errors that can occur when parsing TIFF files
#[derive(Debug, Clone, Error)]
pub enum TiffError {
    /// I/O error while reading the file
    #[error("I/O error: {0}")]
    Io(#[from] IoError),

    /// Invalid TIFF magic bytes (not II or MM)
    #[error("Invalid TIFF magic bytes: expected 0x4949 (II) or 0x4D4D (MM), got 0x{0:04X}")]
    InvalidMagic(u16),

    /// Invalid TIFF version number
    #[error("Invalid TIFF version: expected 42 (TIFF) or 43 (BigTIFF), got {0}")]
    InvalidVersion(u16),

    /// Invalid BigTIFF offset byte size (must be 8)
    #[error("Invalid BigTIFF offset byte size: expected 8, got {0}")]
    InvalidBigTiffOffsetSize(u16),

    /// File is too small to contain a valid TIFF header
    #[error("File too small: need at least {required} bytes, got {actual}")]
    FileTooSmall { required: u64, actual: u64 },

    /// Invalid IFD offset (points outside file or to invalid location)
    #[error("Invalid IFD offset: {0}")]
    InvalidIfdOffset(u64),

    /// Required tag is missing from IFD
    #[error("Missing required tag: {0}")]
    MissingTag(&'static str),

    /// Entry uses a field type the reader does not model
    #[error("Unknown field type: {0}")]
    UnknownFieldType(u16),

    /// Tag has unexpected type or count
    #[error("Invalid tag value for {tag}: {message}")]
    InvalidTagValue { tag: &'static str, message: String },

    /// Unsupported compression scheme
    #[error("Unsupported compression: {0}")]
    UnsupportedCompression(String),

    /// Pixel layout the chunk decoder cannot handle
    #[error("Unsupported pixel layout: {0}")]
    UnsupportedLayout(String),

    /// No usable image found in the file
    #[error("No pyramid levels found")]
    NoPyramidLevels,
}

/// Errors that can occur when parsing DICOM Part 10 files
#[derive(Debug, Clone, Error)]
pub enum DicomError {
    /// I/O error while reading the file
    #[error("I/O error: {0}")]
    Io(#[from] IoError),

    /// Missing "DICM" marker after the preamble
    #[error("Missing DICM prefix at offset 128")]
    MissingPrefix,

    /// Ran past the end of the buffer while decoding an element
    #[error("Truncated data at offset {offset}: needed {needed} bytes")]
    Truncated { offset: u64, needed: u64 },

    /// Element with unexpected type or value
    #[error("Invalid value for {tag}: {message}")]
    InvalidValue { tag: &'static str, message: String },

    /// Required element is missing
    #[error("Missing required element: {0}")]
    MissingElement(&'static str),

    /// Transfer syntax the frame decoder cannot handle
    #[error("Unsupported transfer syntax: {0}")]
    UnsupportedTransferSyntax(String),

    /// Expected an item tag inside the encapsulated pixel data
    #[error("Expected item tag at offset {offset}, found ({group:04X},{element:04X})")]
    UnexpectedTag {
        offset: u64,
        group: u16,
        element: u16,
    },

    /// Basic offset table is empty and fragments cannot be mapped to frames
    #[error("Cannot map {fragments} fragments onto {frames} frames without an offset table")]
    AmbiguousFragments { fragments: usize, frames: usize },
}

/// Errors that can occur when decoding compressed pixel data
#[derive(Debug, Clone, Error)]
pub enum DecodeError {
    /// The codec rejected the byte stream
    #[error("{codec} decode failed: {message}")]
    Codec {
        codec: &'static str,
        message: String,
    },

    /// Decoded image does not have the expected geometry
    #[error("Decoded {actual:?} pixels, expected {expected:?}")]
    UnexpectedShape {
        expected: Vec<usize>,
        actual: Vec<usize>,
    },
}

/// Errors raised by slide backends while extracting regions
#[derive(Debug, Clone, Error)]
pub enum BackendError {
    /// Malformed size, stride, location or level argument
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Level beyond what the slide provides
    #[error("Level {level} out of range for a slide with {count} levels")]
    LevelOutOfRange { level: usize, count: usize },

    /// Read outside the addressable frames
    #[error("Region out of bounds: {0}")]
    RegionOutOfBounds(String),

    /// Frame coordinate not on a frame corner
    #[error("Coordinates {coords:?} are not a multiple of frame shape {frame_shape:?}")]
    MisalignedCoordinate {
        coords: (usize, usize),
        frame_shape: (usize, usize),
    },

    /// Operation the backend does not provide
    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),

    /// Image too large to materialise in one buffer
    #[error("Image of {pixels} samples exceeds the addressable limit of {limit}")]
    CapacityExceeded { pixels: u64, limit: u64 },

    #[error(transparent)]
    Io(#[from] IoError),

    #[error(transparent)]
    Tiff(#[from] TiffError),

    #[error(transparent)]
    Dicom(#[from] DicomError),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Format(#[from] FormatError),
}

/// Errors raised by the tile and mask stores
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// Malformed key type, slicer or target
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Array shape disagrees with the shape established by the first add
    #[error("Shape mismatch: store holds {expected:?}, got {actual:?}")]
    ShapeMismatch {
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    /// Lookup on an absent coordinate, name or key
    #[error("Key not found: {0}")]
    KeyNotFound(String),

    /// Integer index beyond the number of stored entries
    #[error("Index {index} out of range, valid indices are 0..{len}")]
    IndexOutOfRange { index: usize, len: usize },

    /// Operation the store deliberately does not provide
    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),

    /// Failure reading or writing the container file
    #[error(transparent)]
    Io(#[from] IoError),

    /// Container file is structurally invalid
    #[error("Corrupt store file: {0}")]
    Corrupt(String),

    /// Manifest (de)serialization failure
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

/// Errors from [`crate::slide::SlideData`], which drives a backend into stores.
#[derive(Debug, Clone, Error)]
pub enum SlideError {
    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error(transparent)]
    Store(#[from] StoreError),
}
