//! Tile geometry of one component: resolutions, subbands, precincts and
//! code-blocks, all in the coordinates of the single tile that covers the
//! image.

use std::ops::Range;

use super::bit_plane_coder::CodeBlockEncoding;
use super::quantization::StepSize;
use crate::constants::CODEBLOCK_SIZE;

/// Precinct exponent signalled in COD when no explicit size is given.
pub const PRECINCT_EXPONENT: u8 = 15;

/// Orientation of a wavelet subband.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SubbandOrientation {
    #[default]
    /// Low-Low (base image)
    LL,
    /// High-Low (horizontal details)
    HL,
    /// Low-High (vertical details)
    LH,
    /// High-High (diagonal details)
    HH,
}

impl SubbandOrientation {
    pub const fn index(self) -> usize {
        match self {
            Self::LL => 0,
            Self::HL => 1,
            Self::LH => 2,
            Self::HH => 3,
        }
    }

    /// Log2 of the nominal dynamic range gain (Table E.1).
    pub const fn gain(self) -> u8 {
        match self {
            Self::LL => 0,
            Self::HL | Self::LH => 1,
            Self::HH => 2,
        }
    }
}

/// A point on the lower convex hull of a code-block's rate-distortion curve.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HullPoint {
    /// Number of coding passes kept.
    pub passes: usize,
    pub rate: usize,
    /// Weighted distortion reduction per byte relative to the previous point.
    pub slope: f64,
}

/// A code-block and its coded data.
#[derive(Debug, Clone, Default)]
pub struct J2kCodeBlock {
    /// Horizontal offset inside the subband.
    pub x0: usize,
    /// Vertical offset inside the subband.
    pub y0: usize,
    pub width: usize,
    pub height: usize,
    /// Tier-1 output.
    pub encoding: CodeBlockEncoding,
    /// Truncation points that are worth keeping, in increasing rate.
    pub hull: Vec<HullPoint>,
    /// Passes included up to and including each quality layer.
    pub layer_passes: Vec<usize>,
}

impl J2kCodeBlock {
    /// Passes included before `layer`.
    pub fn passes_before(&self, layer: usize) -> usize {
        match layer {
            0 => 0,
            _ => self.layer_passes.get(layer - 1).copied().unwrap_or(0),
        }
    }

    /// Bytes needed to decode the first `passes` passes.
    pub fn rate_of(&self, passes: usize) -> usize {
        match passes {
            0 => 0,
            _ => self.encoding.passes[passes - 1].rate,
        }
    }

    /// Computes the hull from the Tier-1 passes, scaling distortion by `weight`.
    pub fn compute_hull(&mut self, weight: f64) {
        let mut hull = vec![(0usize, 0usize, 0.0f64)];
        for (k, pass) in self.encoding.passes.iter().enumerate() {
            let (rate, distortion) = (pass.rate, pass.distortion * weight);
            if hull.last().is_some_and(|&(_, _, d)| distortion <= d) {
                continue;
            }
            while hull.len() >= 2 {
                let (_, ra, da) = hull[hull.len() - 2];
                let (_, rb, db) = hull[hull.len() - 1];
                // drop b when the slope a->b does not exceed b->candidate
                if (db - da) * (rate - rb) as f64 <= (distortion - db) * (rb - ra) as f64 {
                    hull.pop();
                } else {
                    break;
                }
            }
            hull.push((k + 1, rate, distortion));
        }

        self.hull = hull
            .windows(2)
            .map(|pair| {
                let (_, ra, da) = pair[0];
                let (passes, rb, db) = pair[1];
                HullPoint {
                    passes,
                    rate: rb,
                    slope: (db - da) / (rb - ra) as f64,
                }
            })
            .collect();
    }

    /// Number of passes to keep for a slope threshold `lambda`.
    pub fn truncation(&self, lambda: f64) -> usize {
        self.hull
            .iter()
            .take_while(|point| point.slope >= lambda)
            .last()
            .map_or(0, |point| point.passes)
    }
}

/// A frequency subband within a resolution level.
#[derive(Debug, Clone, Default)]
pub struct J2kSubband {
    pub orientation: SubbandOrientation,
    /// Decomposition level the band comes from; 0 for LL of a 0-level transform.
    pub level: u8,
    /// Horizontal offset of the band inside the transformed tile-component.
    pub x0: usize,
    /// Vertical offset of the band inside the transformed tile-component.
    pub y0: usize,
    pub width: usize,
    pub height: usize,
    pub step: StepSize,
    /// Magnitude bit-planes a decoder expects (`Mb`).
    pub magnitude_bits: u8,
    /// Image-domain squared error per squared quantization index unit.
    pub distortion_weight: f64,
    /// Code-block columns.
    pub blocks_wide: usize,
    /// Code-block rows.
    pub blocks_high: usize,
    /// Code-blocks in raster order.
    pub codeblocks: Vec<J2kCodeBlock>,
}

impl J2kSubband {
    fn new(orientation: SubbandOrientation, level: u8, x0: usize, y0: usize, width: usize, height: usize) -> Self {
        let blocks_wide = width.div_ceil(CODEBLOCK_SIZE);
        let blocks_high = height.div_ceil(CODEBLOCK_SIZE);
        let mut codeblocks = Vec::with_capacity(blocks_wide * blocks_high);
        for by in 0..blocks_high {
            for bx in 0..blocks_wide {
                let x = bx * CODEBLOCK_SIZE;
                let y = by * CODEBLOCK_SIZE;
                codeblocks.push(J2kCodeBlock {
                    x0: x,
                    y0: y,
                    width: CODEBLOCK_SIZE.min(width - x),
                    height: CODEBLOCK_SIZE.min(height - y),
                    ..J2kCodeBlock::default()
                });
            }
        }
        Self {
            orientation,
            level,
            x0,
            y0,
            width,
            height,
            blocks_wide,
            blocks_high,
            codeblocks,
            ..Self::default()
        }
    }

    /// Index of the synthesis norm for this band: high bands of decomposition
    /// level `n` use row `n - 1`, the LL band uses row `D`.
    pub fn norm_level(&self) -> u8 {
        match self.orientation {
            SubbandOrientation::LL => self.level,
            _ => self.level.saturating_sub(1),
        }
    }
}

/// A resolution level of the decomposition.
#[derive(Debug, Clone, Default)]
pub struct J2kResolution {
    /// Resolution index, 0 being the lowest (LL only).
    pub level: u8,
    pub width: usize,
    pub height: usize,
    pub precincts_wide: usize,
    pub precincts_high: usize,
    /// LL for resolution 0, HL, LH and HH otherwise.
    pub subbands: Vec<J2kSubband>,
}

impl J2kResolution {
    pub fn precinct_count(&self) -> usize {
        self.precincts_wide * self.precincts_high
    }

    // Code-blocks per precinct side in the band domain
    fn blocks_per_precinct(&self) -> usize {
        let exponent = if self.level == 0 { PRECINCT_EXPONENT } else { PRECINCT_EXPONENT - 1 };
        (1usize << exponent) / CODEBLOCK_SIZE
    }

    /// Block columns and rows of `band` that fall in precinct `precinct`.
    pub fn precinct_blocks(&self, band: &J2kSubband, precinct: usize) -> (Range<usize>, Range<usize>) {
        let span = self.blocks_per_precinct();
        let px = precinct % self.precincts_wide.max(1);
        let py = precinct / self.precincts_wide.max(1);
        let columns = (px * span).min(band.blocks_wide)..((px + 1) * span).min(band.blocks_wide);
        let rows = (py * span).min(band.blocks_high)..((py + 1) * span).min(band.blocks_high);
        (columns, rows)
    }
}

/// Geometry and coded data of one component of the tile.
#[derive(Debug, Clone, Default)]
pub struct J2kTileComponent {
    pub width: usize,
    pub height: usize,
    /// Number of decomposition levels `D`.
    pub levels: u8,
    /// `D + 1` resolutions, lowest first.
    pub resolutions: Vec<J2kResolution>,
}

impl J2kTileComponent {
    /// Lays out the Mallat decomposition of a `width` x `height` component.
    pub fn new(width: usize, height: usize, levels: u8) -> Self {
        let scaled = |size: usize, shift: u8| size.div_ceil(1 << shift);
        let mut resolutions = Vec::with_capacity(levels as usize + 1);

        let ll = J2kSubband::new(
            SubbandOrientation::LL,
            levels,
            0,
            0,
            scaled(width, levels),
            scaled(height, levels),
        );
        resolutions.push(Self::resolution(0, scaled(width, levels), scaled(height, levels), vec![ll]));

        for r in 1..=levels {
            let n = levels - r + 1;
            let cw = scaled(width, n - 1);
            let ch = scaled(height, n - 1);
            let lw = cw.div_ceil(2);
            let lh = ch.div_ceil(2);
            let subbands = vec![
                J2kSubband::new(SubbandOrientation::HL, n, lw, 0, cw - lw, lh),
                J2kSubband::new(SubbandOrientation::LH, n, 0, lh, lw, ch - lh),
                J2kSubband::new(SubbandOrientation::HH, n, lw, lh, cw - lw, ch - lh),
            ];
            resolutions.push(Self::resolution(r, cw, ch, subbands));
        }

        Self {
            width,
            height,
            levels,
            resolutions,
        }
    }

    fn resolution(level: u8, width: usize, height: usize, subbands: Vec<J2kSubband>) -> J2kResolution {
        let precinct = 1usize << PRECINCT_EXPONENT;
        J2kResolution {
            level,
            width,
            height,
            precincts_wide: width.div_ceil(precinct),
            precincts_high: height.div_ceil(precinct),
            subbands,
        }
    }

    pub fn subbands(&self) -> impl Iterator<Item = &J2kSubband> {
        self.resolutions.iter().flat_map(|r| r.subbands.iter())
    }

    pub fn subbands_mut(&mut self) -> impl Iterator<Item = &mut J2kSubband> {
        self.resolutions.iter_mut().flat_map(|r| r.subbands.iter_mut())
    }
}
