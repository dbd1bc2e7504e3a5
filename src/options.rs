use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::error::EncodeError;

/// Color space tag stored with the image and in the JP2 `colr` box.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, IntoPrimitive, TryFromPrimitive)]
#[repr(i32)]
pub enum PhotometricInterpretation {
    /// Let the encoder decide from the number of samples.
    #[default]
    Unspecified = 0,
    Srgb = 1,
    Gray = 2,
    Sycc = 3,
    Eycc = 4,
    Cmyk = 5,
}

impl PhotometricInterpretation {
    /// Whether this interpretation can describe pixels with `samples_per_pixel` samples.
    pub const fn is_compatible_with(self, samples_per_pixel: u16) -> bool {
        use PhotometricInterpretation::*;
        match samples_per_pixel {
            1 => matches!(self, Unspecified | Gray),
            3 => matches!(self, Unspecified | Srgb | Sycc | Eycc),
            4 => matches!(self, Unspecified | Cmyk),
            _ => false,
        }
    }
}

/// Output container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, IntoPrimitive, TryFromPrimitive)]
#[repr(i32)]
pub enum ContainerFormat {
    /// Bare codestream (`.j2k`).
    #[default]
    Codestream = 0,
    /// JP2 file format wrapper (`.jp2`).
    FileFormat = 2,
}

/// Caller-facing encoding options.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodeOptions {
    pub bits_stored: u8,
    pub photometric_interpretation: PhotometricInterpretation,
    /// `None` applies the multiple component transform wherever it fits;
    /// `Some` records an explicit choice by the caller.
    pub use_mct: Option<bool>,
    pub lossless: bool,
    /// One target ratio per quality layer, only used when `lossless` is false.
    pub compression_ratios: Vec<f64>,
    pub codec_format: ContainerFormat,
}

impl Default for EncodeOptions {
    fn default() -> Self {
        Self {
            bits_stored: 8,
            photometric_interpretation: PhotometricInterpretation::Unspecified,
            use_mct: None,
            lossless: true,
            compression_ratios: Vec::new(),
            codec_format: ContainerFormat::Codestream,
        }
    }
}

impl EncodeOptions {
    /// Builds options from the integer tags used at the C ABI.
    pub fn from_raw(
        bits_stored: i32,
        photometric_interpretation: i32,
        use_mct: bool,
        lossless: bool,
        compression_ratios: &[f64],
        codec_format: i32,
    ) -> Result<Self, EncodeError> {
        let photometric_interpretation = PhotometricInterpretation::try_from(photometric_interpretation)
            .map_err(|_| EncodeError::IncompatibleColorSpace)?;
        let codec_format =
            ContainerFormat::try_from(codec_format).map_err(|_| EncodeError::UnsupportedContainerFormat)?;
        let bits_stored = u8::try_from(bits_stored).map_err(|_| EncodeError::InvalidBitsStored)?;

        Ok(Self {
            bits_stored,
            photometric_interpretation,
            use_mct: Some(use_mct),
            lossless,
            compression_ratios: compression_ratios.to_vec(),
            codec_format,
        })
    }

    pub fn with_bits_stored(mut self, bits_stored: u8) -> Self {
        self.bits_stored = bits_stored;
        self
    }

    pub fn with_photometric_interpretation(mut self, interpretation: PhotometricInterpretation) -> Self {
        self.photometric_interpretation = interpretation;
        self
    }

    pub fn with_mct(mut self, use_mct: bool) -> Self {
        self.use_mct = Some(use_mct);
        self
    }

    pub fn with_codec_format(mut self, codec_format: ContainerFormat) -> Self {
        self.codec_format = codec_format;
        self
    }

    pub fn lossless(mut self) -> Self {
        self.lossless = true;
        self.compression_ratios.clear();
        self
    }

    /// Switches to lossy coding with one quality layer per ratio.
    pub fn lossy(mut self, compression_ratios: &[f64]) -> Self {
        self.lossless = false;
        self.compression_ratios = compression_ratios.to_vec();
        self
    }
}
