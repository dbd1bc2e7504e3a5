//! Scalar quantization (ISO/IEC 15444-1 Annex E) and the wavelet norms used
//! to derive step sizes and distortion weights.

use super::image::SubbandOrientation;

// L2 norms of the synthesis basis functions, indexed [orientation][level]
// with level 0 the finest decomposition.
const NORMS_53: [&[f64]; 4] = [
    &[1.000, 1.500, 2.750, 5.375, 10.68, 21.34, 42.67, 85.33, 170.7, 341.3],
    &[1.038, 1.592, 2.919, 5.703, 11.33, 22.64, 45.25, 90.48, 180.9],
    &[1.038, 1.592, 2.919, 5.703, 11.33, 22.64, 45.25, 90.48, 180.9],
    &[0.7186, 0.9218, 1.586, 3.043, 6.019, 12.01, 24.00, 47.97, 95.93],
];

const NORMS_97: [&[f64]; 4] = [
    &[1.000, 1.965, 4.177, 8.403, 16.90, 33.84, 67.69, 135.3, 270.6, 540.9],
    &[2.022, 3.989, 8.355, 17.04, 34.27, 68.63, 137.3, 274.6, 549.0],
    &[2.022, 3.989, 8.355, 17.04, 34.27, 68.63, 137.3, 274.6, 549.0],
    &[2.080, 3.865, 8.307, 17.18, 34.71, 69.59, 139.3, 278.6, 557.2],
];

// Norms of the inverse component transforms, per component.
const RCT_NORMS: [f64; 3] = [1.732, 0.8292, 0.8292];
const ICT_NORMS: [f64; 3] = [1.732, 1.805, 1.573];

/// Synthesis norm of a subband. `level` is 0 for the finest decomposition;
/// values past the tables reuse the coarsest entry.
pub fn synthesis_norm(irreversible: bool, orientation: SubbandOrientation, level: u8) -> f64 {
    let table = if irreversible { &NORMS_97 } else { &NORMS_53 };
    let row = table[orientation.index()];
    row[(level as usize).min(row.len() - 1)]
}

/// Weight of component `component` after a multiple component transform.
pub fn mct_norm(irreversible: bool, component: usize) -> f64 {
    let table = if irreversible { &ICT_NORMS } else { &RCT_NORMS };
    table.get(component).copied().unwrap_or(1.0)
}

/// Quantization step size as signalled in QCD: `(1 + mantissa / 2^11) * 2^(Rb - exponent)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StepSize {
    pub exponent: u8,
    pub mantissa: u16,
}

impl StepSize {
    /// Reversible path: no quantization, only the dynamic range is signalled.
    pub fn reversible(precision: u8, orientation: SubbandOrientation) -> Self {
        Self {
            exponent: precision + orientation.gain(),
            mantissa: 0,
        }
    }

    /// Irreversible path: a step inversely proportional to the band's norm so
    /// every band contributes the same error per index unit.
    pub fn irreversible(precision: u8, orientation: SubbandOrientation, level: u8) -> Self {
        let gain = orientation.gain();
        let step = f64::from(1u32 << gain) / synthesis_norm(true, orientation, level);
        Self::encode((step * 8192.0).floor() as i32, i32::from(precision + gain))
    }

    // step is a 13 bit fixed point value
    fn encode(step: i32, dynamic_range: i32) -> Self {
        let log2 = floor_log2(step.max(1));
        let p = log2 - 13;
        let n = 11 - log2;
        let mantissa = (if n < 0 { step >> -n } else { step << n }) & 0x7FF;
        Self {
            exponent: (dynamic_range - p).clamp(0, 31) as u8,
            mantissa: mantissa as u16,
        }
    }

    /// Step size in coefficient units for a band of nominal range `dynamic_range` bits.
    pub fn delta(&self, dynamic_range: u8) -> f64 {
        (1.0 + f64::from(self.mantissa) / 2048.0) * 2f64.powi(i32::from(dynamic_range) - i32::from(self.exponent))
    }

    /// Number of magnitude bit-planes `Mb` a decoder allows for the band.
    pub fn magnitude_bits(&self, guard_bits: u8) -> u8 {
        (guard_bits + self.exponent).saturating_sub(1)
    }
}

fn floor_log2(value: i32) -> i32 {
    31 - value.leading_zeros() as i32
}

/// Dead-zone scalar quantization: `sign(x) * floor(|x| / delta)`.
pub fn quantize_scalar(coeff: f64, delta: f64) -> i32 {
    let magnitude = (coeff.abs() / delta).floor() as i32;
    if coeff < 0.0 { -magnitude } else { magnitude }
}
