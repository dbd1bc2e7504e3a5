//! JP2 Box structure implementation (ISO/IEC 15444-1 Annex I), writer side.

use std::io;

use crate::image::PlanarImage;
use crate::options::PhotometricInterpretation;
use crate::stream::OutputStream;

/// JP2 signature box, exactly 12 bytes.
pub const JP2_SIGNATURE: [u8; 12] = *b"\x00\x00\x00\x0CjP  \r\n\x87\n";

const BOX_HEADER_LEN: u32 = 8;
const IHDR_LEN: u32 = 22;
const COLR_LEN: u32 = 15;

/// Enumerated colour space of the `colr` box (Table I.10).
pub fn enumerated_colour_space(interpretation: PhotometricInterpretation, components: usize) -> u32 {
    match interpretation {
        PhotometricInterpretation::Srgb => 16,
        PhotometricInterpretation::Gray => 17,
        PhotometricInterpretation::Sycc => 18,
        PhotometricInterpretation::Eycc => 24,
        PhotometricInterpretation::Cmyk => 12,
        PhotometricInterpretation::Unspecified if components == 1 => 17,
        PhotometricInterpretation::Unspecified => 16,
    }
}

/// Writes the boxes around a codestream: signature, file type and header
/// boxes up front, then a `jp2c` box whose header is completed once the
/// codestream length is known.
#[derive(Debug, Default)]
pub struct Jp2Writer {
    codestream_box_start: Option<u64>,
}

impl Jp2Writer {
    pub fn new() -> Self {
        Self::default()
    }

    fn write_box_header(stream: &mut OutputStream<'_>, length: u32, box_type: &[u8; 4]) -> io::Result<()> {
        stream.write_u32(length)?;
        stream.write(box_type)
    }

    /// Signature, `ftyp` and `jp2h`, then reserves the `jp2c` box header.
    pub fn write_preamble(&mut self, stream: &mut OutputStream<'_>, image: &PlanarImage) -> io::Result<()> {
        stream.write(&JP2_SIGNATURE)?;

        // ftyp: brand, minor version, one compatible brand
        Self::write_box_header(stream, BOX_HEADER_LEN + 12, b"ftyp")?;
        stream.write(b"jp2 ")?;
        stream.write_u32(0)?;
        stream.write(b"jp2 ")?;

        Self::write_box_header(stream, BOX_HEADER_LEN + IHDR_LEN + COLR_LEN, b"jp2h")?;

        let (precision, signed) = image
            .components
            .first()
            .map_or((1, false), |c| (c.precision, c.signed));
        Self::write_box_header(stream, IHDR_LEN, b"ihdr")?;
        stream.write_u32(image.y1 - image.y0)?;
        stream.write_u32(image.x1 - image.x0)?;
        stream.write_u16(image.components.len() as u16)?;
        stream.write_u8((precision - 1) | if signed { 0x80 } else { 0 })?;
        stream.write_u8(7)?; // C: wavelet compression
        stream.write_u8(0)?; // UnkC
        stream.write_u8(0)?; // IPR

        Self::write_box_header(stream, COLR_LEN, b"colr")?;
        stream.write_u8(1)?; // METH: enumerated
        stream.write_u8(0)?; // PREC
        stream.write_u8(0)?; // APPROX
        stream.write_u32(enumerated_colour_space(image.color_space, image.components.len()))?;

        self.codestream_box_start = Some(stream.tell());
        stream.skip(i64::from(BOX_HEADER_LEN))
    }

    /// Fills in the `jp2c` header now that the codestream has been written
    /// and returns to the end of the output.
    pub fn finish_codestream(&mut self, stream: &mut OutputStream<'_>) -> io::Result<()> {
        let Some(start) = self.codestream_box_start.take() else {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "jp2c box was never reserved"));
        };
        let end = stream.tell();
        let length = u32::try_from(end - start)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "codestream too large for a jp2c box"))?;
        stream.seek(start)?;
        Self::write_box_header(stream, length, b"jp2c")?;
        stream.seek(end)
    }
}
