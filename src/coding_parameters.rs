//! Cross-validation of [`EncodeOptions`] against the source geometry and the
//! encoder-native parameter record derived from the result.

use crate::constants::{
    CODEBLOCK_SIZE, DEFAULT_NUMBER_OF_RESOLUTIONS, MAX_BITS_STORED, MAX_COMPRESSION_RATIO, MAX_LAYERS,
    MIN_BITS_STORED, MIN_COMPRESSION_RATIO,
};
use crate::error::EncodeError;
use crate::log::EncodeLog;
use crate::options::{ContainerFormat, EncodeOptions, PhotometricInterpretation};
use crate::source::{DType, Geometry};

#[derive(Debug, Clone, PartialEq)]
pub enum CompressionMode {
    /// Reversible 5/3 wavelet, one layer.
    Lossless,
    /// Irreversible 9/7 wavelet, one layer per ratio.
    Lossy { ratios: Vec<f64> },
}

/// Options checked against the source and normalised for the encoder.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedParameters {
    pub rows: u32,
    pub columns: u32,
    pub samples_per_pixel: u16,
    pub bits_allocated: u8,
    pub bits_stored: u8,
    pub is_signed: bool,
    pub photometric_interpretation: PhotometricInterpretation,
    pub use_mct: bool,
    pub codec_format: ContainerFormat,
    pub mode: CompressionMode,
}

impl ResolvedParameters {
    pub fn resolve(
        geometry: &Geometry,
        dtype: DType,
        options: &EncodeOptions,
        log: &dyn EncodeLog,
    ) -> Result<Self, EncodeError> {
        if !(MIN_BITS_STORED..=MAX_BITS_STORED).contains(&options.bits_stored) {
            return Err(EncodeError::InvalidBitsStored);
        }

        let interpretation = options.photometric_interpretation;
        if !interpretation.is_compatible_with(geometry.samples_per_pixel) {
            return Err(EncodeError::IncompatibleColorSpace);
        }

        let mct_applies = geometry.samples_per_pixel == 3 && interpretation == PhotometricInterpretation::Srgb;
        // only an explicit request is worth a warning
        if options.use_mct == Some(true) && !mct_applies {
            log.warning(&format!(
                "Multiple component transform disabled: it requires 3 samples per pixel with an sRGB \
                 interpretation, got {} sample(s) as {:?}",
                geometry.samples_per_pixel, interpretation
            ));
        }

        let mode = if options.lossless {
            CompressionMode::Lossless
        } else {
            let ratios = &options.compression_ratios;
            if ratios.len() > MAX_LAYERS {
                return Err(EncodeError::TooManyLayers);
            }
            if ratios
                .iter()
                .any(|ratio| !ratio.is_finite() || !(MIN_COMPRESSION_RATIO..=MAX_COMPRESSION_RATIO).contains(ratio))
            {
                return Err(EncodeError::InvalidCompressionRatio);
            }
            CompressionMode::Lossy { ratios: ratios.clone() }
        };

        Ok(Self {
            rows: geometry.rows,
            columns: geometry.columns,
            samples_per_pixel: geometry.samples_per_pixel,
            bits_allocated: dtype.bits_allocated(),
            bits_stored: options.bits_stored,
            is_signed: dtype.is_signed(),
            photometric_interpretation: interpretation,
            use_mct: options.use_mct.unwrap_or(true) && mct_applies,
            codec_format: options.codec_format,
            mode,
        })
    }

    pub fn is_lossless(&self) -> bool {
        self.mode == CompressionMode::Lossless
    }
}

/// Progression order of packets in the codestream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum ProgressionOrder {
    /// Layer, resolution, component, position.
    #[default]
    Lrcp = 0,
}

/// Encoder-native parameters handed to [`crate::codec::Compressor::setup_encoder`].
#[derive(Debug, Clone, PartialEq)]
pub struct CodingParameters {
    pub codec_format: ContainerFormat,
    pub use_mct: bool,
    /// 9/7 wavelet and quantization when set, 5/3 integer wavelet otherwise.
    pub irreversible: bool,
    pub number_of_layers: usize,
    /// Target compression ratio per layer; empty or `1.0` means unconstrained.
    pub layer_ratios: Vec<f64>,
    pub distortion_allocation: bool,
    pub number_of_resolutions: u8,
    pub codeblock_width: usize,
    pub codeblock_height: usize,
    pub progression_order: ProgressionOrder,
    pub image_offset_x: u32,
    pub image_offset_y: u32,
}

impl Default for CodingParameters {
    fn default() -> Self {
        Self {
            codec_format: ContainerFormat::Codestream,
            use_mct: false,
            irreversible: false,
            number_of_layers: 1,
            layer_ratios: Vec::new(),
            distortion_allocation: false,
            number_of_resolutions: DEFAULT_NUMBER_OF_RESOLUTIONS,
            codeblock_width: CODEBLOCK_SIZE,
            codeblock_height: CODEBLOCK_SIZE,
            progression_order: ProgressionOrder::Lrcp,
            image_offset_x: 0,
            image_offset_y: 0,
        }
    }
}

impl From<&ResolvedParameters> for CodingParameters {
    fn from(resolved: &ResolvedParameters) -> Self {
        let defaults = Self {
            codec_format: resolved.codec_format,
            use_mct: resolved.use_mct,
            ..Self::default()
        };
        match &resolved.mode {
            CompressionMode::Lossless => defaults,
            CompressionMode::Lossy { ratios } => Self {
                irreversible: true,
                number_of_layers: ratios.len().max(1),
                layer_ratios: ratios.clone(),
                distortion_allocation: true,
                ..defaults
            },
        }
    }
}
