//! Codestream marker segments (ISO/IEC 15444-1 Annex A).

use super::quantization::StepSize;
use crate::coding_parameters::ProgressionOrder;
use crate::image::PlanarImage;
use crate::jpeg_marker_code::JpegMarkerCode;

/// Coding style default parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct J2kCod {
    pub coding_style: u8,
    pub progression_order: ProgressionOrder,
    pub number_of_layers: u16,
    pub use_mct: bool,
    pub decomposition_levels: u8,
    /// Code-block width and height exponents.
    pub codeblock_exponents: (u8, u8),
    pub codeblock_style: u8,
    pub reversible: bool,
}

/// Quantization default parameters, one step size per subband in
/// codestream order (LL, then HL, LH, HH from the coarsest level).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct J2kQcd {
    pub guard_bits: u8,
    pub reversible: bool,
    pub step_sizes: Vec<StepSize>,
}

#[derive(Debug, Default)]
pub struct J2kWriter {
    data: Vec<u8>,
}

impl J2kWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.data
    }

    fn write_marker(&mut self, marker: JpegMarkerCode) {
        self.data.extend_from_slice(&marker.to_bytes());
    }

    fn write_byte(&mut self, value: u8) {
        self.data.push(value);
    }

    fn write_u16(&mut self, value: u16) {
        self.data.extend_from_slice(&value.to_be_bytes());
    }

    fn write_u32(&mut self, value: u32) {
        self.data.extend_from_slice(&value.to_be_bytes());
    }

    pub fn write_soc(&mut self) {
        self.write_marker(JpegMarkerCode::StartOfCodestream);
    }

    pub fn write_eoc(&mut self) {
        self.write_marker(JpegMarkerCode::EndOfCodestream);
    }

    /// SIZ for a single tile covering the whole image.
    pub fn write_siz(&mut self, image: &PlanarImage) {
        self.write_marker(JpegMarkerCode::ImageAndTileSize);

        let component_count = image.components.len() as u16;
        // Length: 2 (Rsiz) + 4(W) + 4(H) + 4(OX) + 4(OY) + 4(TW) + 4(TH) + 4(TOX) + 4(TOY) + 2(C) + 3*C
        self.write_u16(38 + 3 * component_count);
        self.write_u16(0); // Rsiz
        self.write_u32(image.x1);
        self.write_u32(image.y1);
        self.write_u32(image.x0);
        self.write_u32(image.y0);
        self.write_u32(image.x1 - image.x0);
        self.write_u32(image.y1 - image.y0);
        self.write_u32(image.x0);
        self.write_u32(image.y0);
        self.write_u16(component_count);

        for component in &image.components {
            let sign = if component.signed { 0x80 } else { 0 };
            self.write_byte((component.precision - 1) | sign);
            self.write_byte(component.dx as u8);
            self.write_byte(component.dy as u8);
        }
    }

    pub fn write_cod(&mut self, cod: &J2kCod) {
        self.write_marker(JpegMarkerCode::CodingStyleDefault);
        // Scod (1) + SGcod (4) + SPcod (5) + length field
        self.write_u16(12);
        self.write_byte(cod.coding_style);

        // SGcod
        self.write_byte(cod.progression_order as u8);
        self.write_u16(cod.number_of_layers);
        self.write_byte(u8::from(cod.use_mct));

        // SPcod
        self.write_byte(cod.decomposition_levels);
        self.write_byte(cod.codeblock_exponents.0 - 2);
        self.write_byte(cod.codeblock_exponents.1 - 2);
        self.write_byte(cod.codeblock_style);
        self.write_byte(u8::from(cod.reversible)); // 1 = 5-3, 0 = 9-7
    }

    pub fn write_qcd(&mut self, qcd: &J2kQcd) {
        self.write_marker(JpegMarkerCode::QuantizationDefault);

        let bands = qcd.step_sizes.len();
        if qcd.reversible {
            // no quantization: one exponent byte per band
            self.write_u16((3 + bands) as u16);
            self.write_byte(qcd.guard_bits << 5);
            for step in &qcd.step_sizes {
                self.write_byte(step.exponent << 3);
            }
        } else {
            // scalar expounded: exponent and mantissa per band
            self.write_u16((3 + 2 * bands) as u16);
            self.write_byte((qcd.guard_bits << 5) | 2);
            for step in &qcd.step_sizes {
                self.write_u16((u16::from(step.exponent) << 11) | step.mantissa);
            }
        }
    }

    /// COM with Latin-1 text.
    pub fn write_com(&mut self, text: &str) {
        self.write_marker(JpegMarkerCode::Comment);
        self.write_u16((4 + text.len()) as u16);
        self.write_u16(1); // Rcom
        self.data.extend_from_slice(text.as_bytes());
    }

    pub fn write_sot(&mut self, tile_index: u16, tile_len: u32, tile_part_index: u8, num_tile_parts: u8) {
        self.write_marker(JpegMarkerCode::StartOfTile);
        self.write_u16(10); // Length of marker segment (10 bytes)
        self.write_u16(tile_index);
        self.write_u32(tile_len); // Psot
        self.write_byte(tile_part_index); // TPsot
        self.write_byte(num_tile_parts); // TNsot
    }

    pub fn write_sod(&mut self) {
        self.write_marker(JpegMarkerCode::StartOfData);
    }
}
