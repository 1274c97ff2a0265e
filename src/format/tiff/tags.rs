//! TIFF field types, tag ids and compression codes.

// =============================================================================
// Field types
// =============================================================================

/// Encoding of an IFD entry's value.
///
/// Only the types that appear in slide files and page stacks are modelled;
/// entries of any other type are carried with `field_type: None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum FieldType {
    Byte = 1,
    Ascii = 2,
    Short = 3,
    Long = 4,
    /// Two Longs (numerator, denominator)
    Rational = 5,
    Undefined = 7,
    /// BigTIFF only
    Long8 = 16,
}

impl FieldType {
    #[inline]
    pub const fn size_in_bytes(self) -> usize {
        match self {
            FieldType::Byte | FieldType::Ascii | FieldType::Undefined => 1,
            FieldType::Short => 2,
            FieldType::Long => 4,
            FieldType::Rational | FieldType::Long8 => 8,
        }
    }

    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            1 => Some(FieldType::Byte),
            2 => Some(FieldType::Ascii),
            3 => Some(FieldType::Short),
            4 => Some(FieldType::Long),
            5 => Some(FieldType::Rational),
            7 => Some(FieldType::Undefined),
            16 => Some(FieldType::Long8),
            _ => None,
        }
    }

    /// Whether `count` values fit in the entry's value field
    /// (4 bytes classic, 8 bytes BigTIFF).
    #[inline]
    pub fn fits_inline(self, count: u64, is_bigtiff: bool) -> bool {
        let capacity = if is_bigtiff { 8 } else { 4 };
        self.size_in_bytes() as u64 * count <= capacity
    }
}

// =============================================================================
// Tags
// =============================================================================

/// Tag ids read by the pyramid and page-stack parsers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum TiffTag {
    ImageWidth = 256,
    ImageLength = 257,
    BitsPerSample = 258,
    Compression = 259,
    PhotometricInterpretation = 262,
    /// Free text; carries Aperio, ImageJ and OME-XML metadata
    ImageDescription = 270,
    StripOffsets = 273,
    SamplesPerPixel = 277,
    RowsPerStrip = 278,
    StripByteCounts = 279,
    PlanarConfiguration = 284,
    /// Horizontal differencing applied before Deflate
    Predictor = 317,
    TileWidth = 322,
    TileLength = 323,
    TileOffsets = 324,
    TileByteCounts = 325,
    /// Shared DQT/DHT segments for abbreviated JPEG chunks
    JpegTables = 347,
}

impl TiffTag {
    #[inline]
    pub const fn as_u16(self) -> u16 {
        self as u16
    }
}

// =============================================================================
// Compression
// =============================================================================

/// Compression codes found in slide files.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum Compression {
    None = 1,
    Lzw = 5,
    OldJpeg = 6,
    Jpeg = 7,
    Deflate = 8,
    AdobeDeflate = 32946,
    /// Aperio JPEG 2000, YCbCr
    Jpeg2000 = 33003,
    /// Aperio JPEG 2000, RGB
    Jpeg2000Rgb = 33005,
}

impl Compression {
    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            1 => Some(Compression::None),
            5 => Some(Compression::Lzw),
            6 => Some(Compression::OldJpeg),
            7 => Some(Compression::Jpeg),
            8 => Some(Compression::Deflate),
            32946 => Some(Compression::AdobeDeflate),
            33003 => Some(Compression::Jpeg2000),
            33005 => Some(Compression::Jpeg2000Rgb),
            _ => None,
        }
    }

    /// Whether the chunk decoder handles this scheme.
    #[inline]
    pub const fn is_supported(self) -> bool {
        !matches!(self, Compression::Lzw | Compression::OldJpeg)
    }

    pub const fn name(self) -> &'static str {
        match self {
            Compression::None => "None",
            Compression::Lzw => "LZW",
            Compression::OldJpeg => "Old JPEG",
            Compression::Jpeg => "JPEG",
            Compression::Deflate => "Deflate",
            Compression::AdobeDeflate => "Adobe Deflate",
            Compression::Jpeg2000 => "JPEG 2000",
            Compression::Jpeg2000Rgb => "JPEG 2000 (RGB)",
        }
    }
}
