use num_enum::{IntoPrimitive, TryFromPrimitive};

/// Second byte of the JPEG 2000 codestream markers the encoder emits
/// (ISO/IEC 15444-1 Table A.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum JpegMarkerCode {
    /// SOC: Marks the start of a codestream.
    StartOfCodestream = 0x4F,

    /// SIZ: Image and tile size.
    ImageAndTileSize = 0x51,

    /// COD: Coding style default.
    CodingStyleDefault = 0x52,

    /// QCD: Quantization default.
    QuantizationDefault = 0x5C,

    /// COM: Comment.
    Comment = 0x64,

    /// SOT: Start of tile-part.
    StartOfTile = 0x90,

    /// SOD: Start of data.
    StartOfData = 0x93,

    /// EOC: Marks the end of the codestream.
    EndOfCodestream = 0xD9,
}

pub const JPEG_MARKER_START_BYTE: u8 = 0xFF;

impl JpegMarkerCode {
    pub fn to_bytes(self) -> [u8; 2] {
        [JPEG_MARKER_START_BYTE, self.into()]
    }
}
