//! EBCOT Tier-1 coding of one code-block (ISO/IEC 15444-1 Annex D).

use super::image::SubbandOrientation;
use super::mq_coder::{CTX_AGG, CTX_UNI, MqCoder};

/// State after a coding pass, both values cumulative from the block start.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CodingPass {
    /// Bytes needed to decode up to and including this pass.
    pub rate: usize,
    /// Squared error removed so far, in quantization index units, under
    /// mid-point reconstruction. A refinement pass can lower it when the
    /// mid-point lands further from the sample than the previous estimate.
    pub distortion: f64,
}

/// Result of coding a code-block.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CodeBlockEncoding {
    pub data: Vec<u8>,
    pub passes: Vec<CodingPass>,
    /// Number of magnitude bit-planes actually coded.
    pub magnitude_bits: u8,
}

pub struct BitPlaneCoder<'a> {
    width: usize,
    height: usize,
    data: &'a [i32],
    orientation: SubbandOrientation,
    // padded by one sample on every side so neighbours never go out of bounds
    state: Vec<u8>,
    mq: MqCoder,
    distortion: f64,
    passes: Vec<CodingPass>,
}

impl<'a> BitPlaneCoder<'a> {
    /// `data` holds `width * height` quantization indices in row-major order.
    pub fn new(width: usize, height: usize, data: &'a [i32], orientation: SubbandOrientation) -> Self {
        Self {
            width,
            height,
            data,
            orientation,
            state: vec![0; (width + 2) * (height + 2)],
            mq: MqCoder::new(),
            distortion: 0.0,
            passes: Vec::new(),
        }
    }

    // State Bit Definitions
    const SIG: u8 = 1 << 0;
    const VISITED: u8 = 1 << 1;
    const REFINE: u8 = 1 << 2;
    const SIGN: u8 = 1 << 3;

    fn index(&self, x: usize, y: usize) -> usize {
        (y + 1) * (self.width + 2) + x + 1
    }

    fn magnitude(&self, x: usize, y: usize) -> u64 {
        u64::from(self.data[y * self.width + x].unsigned_abs())
    }

    fn is_sig(&self, idx: usize) -> u8 {
        self.state[idx] & Self::SIG
    }

    /// Counts of significant horizontal, vertical and diagonal neighbours.
    fn neighbours(&self, x: usize, y: usize) -> (u8, u8, u8) {
        let i = self.index(x, y);
        let row = self.width + 2;
        let h = self.is_sig(i - 1) + self.is_sig(i + 1);
        let v = self.is_sig(i - row) + self.is_sig(i + row);
        let d = self.is_sig(i - row - 1) + self.is_sig(i - row + 1) + self.is_sig(i + row - 1) + self.is_sig(i + row + 1);
        (h, v, d)
    }

    // Table D.1
    fn zc_context(&self, h: u8, v: u8, d: u8) -> usize {
        match self.orientation {
            SubbandOrientation::LL | SubbandOrientation::LH => zc_context_lh(h, v, d),
            SubbandOrientation::HL => zc_context_lh(v, h, d),
            SubbandOrientation::HH => match (d, h + v) {
                (d, _) if d >= 3 => 8,
                (2, hv) if hv >= 1 => 7,
                (2, _) => 6,
                (1, hv) if hv >= 2 => 5,
                (1, 1) => 4,
                (1, _) => 3,
                (_, hv) if hv >= 2 => 2,
                (_, 1) => 1,
                _ => 0,
            },
        }
    }

    fn sign_contribution(&self, idx: usize) -> i8 {
        match self.state[idx] & (Self::SIG | Self::SIGN) {
            s if s == Self::SIG => 1,
            s if s == Self::SIG | Self::SIGN => -1,
            _ => 0,
        }
    }

    // Tables D.2 and D.3
    fn encode_sign(&mut self, x: usize, y: usize) {
        let i = self.index(x, y);
        let row = self.width + 2;
        let h = (self.sign_contribution(i - 1) + self.sign_contribution(i + 1)).clamp(-1, 1);
        let v = (self.sign_contribution(i - row) + self.sign_contribution(i + row)).clamp(-1, 1);
        let (cx, xor_bit) = match (h, v) {
            (1, 1) => (13, 0),
            (1, 0) => (12, 0),
            (1, _) => (11, 0),
            (0, 1) => (10, 0),
            (0, 0) => (9, 0),
            (0, _) => (10, 1),
            (_, 1) => (11, 1),
            (_, 0) => (12, 1),
            _ => (13, 1),
        };
        let negative = self.data[y * self.width + x] < 0;
        self.mq.encode(u8::from(negative) ^ xor_bit, cx);
    }

    fn become_significant(&mut self, x: usize, y: usize, bit_plane: u8) {
        self.encode_sign(x, y);
        let i = self.index(x, y);
        self.state[i] |= Self::SIG;
        if self.data[y * self.width + x] < 0 {
            self.state[i] |= Self::SIGN;
        }
        self.distortion += significance_gain(self.magnitude(x, y), bit_plane);
    }

    /// Codes all passes and terminates the codeword.
    pub fn encode(mut self) -> CodeBlockEncoding {
        let max = self.data.iter().map(|v| v.unsigned_abs()).max().unwrap_or(0);
        let magnitude_bits = (u32::BITS - max.leading_zeros()) as u8;

        for bit_plane in (0..magnitude_bits).rev() {
            if bit_plane + 1 != magnitude_bits {
                self.significance_propagation(bit_plane);
                self.record_pass();
                self.magnitude_refinement(bit_plane);
                self.record_pass();
            }
            self.cleanup(bit_plane);
            self.record_pass();
        }

        if magnitude_bits == 0 {
            return CodeBlockEncoding::default();
        }

        let Self { mq, mut passes, .. } = self;
        let data = mq.flush();
        let mut previous = 0;
        for pass in &mut passes {
            pass.rate = pass.rate.min(data.len());
            // a pass never ends on 0xFF
            if pass.rate > 1 && data[pass.rate - 1] == 0xFF {
                pass.rate -= 1;
            }
            pass.rate = pass.rate.max(previous);
            previous = pass.rate;
        }
        if let Some(last) = passes.last_mut() {
            last.rate = data.len();
        }

        CodeBlockEncoding {
            data,
            passes,
            magnitude_bits,
        }
    }

    fn record_pass(&mut self) {
        self.passes.push(CodingPass {
            rate: self.mq.rate_estimate(),
            distortion: self.distortion,
        });
    }

    fn significance_propagation(&mut self, bit_plane: u8) {
        for (y0, y1) in stripes(self.height) {
            for x in 0..self.width {
                for y in y0..y1 {
                    let i = self.index(x, y);
                    if self.state[i] & Self::SIG != 0 {
                        continue;
                    }
                    let (h, v, d) = self.neighbours(x, y);
                    if h + v + d == 0 {
                        continue;
                    }
                    let bit = ((self.magnitude(x, y) >> bit_plane) & 1) as u8;
                    let cx = self.zc_context(h, v, d);
                    self.mq.encode(bit, cx);
                    self.state[i] |= Self::VISITED;
                    if bit == 1 {
                        self.become_significant(x, y, bit_plane);
                    }
                }
            }
        }
    }

    fn magnitude_refinement(&mut self, bit_plane: u8) {
        for (y0, y1) in stripes(self.height) {
            for x in 0..self.width {
                for y in y0..y1 {
                    let i = self.index(x, y);
                    let state = self.state[i];
                    if state & Self::SIG == 0 || state & Self::VISITED != 0 {
                        continue;
                    }
                    let cx = if state & Self::REFINE != 0 {
                        16
                    } else {
                        let (h, v, d) = self.neighbours(x, y);
                        if h + v + d > 0 { 15 } else { 14 }
                    };
                    let magnitude = self.magnitude(x, y);
                    self.mq.encode(((magnitude >> bit_plane) & 1) as u8, cx);
                    self.state[i] |= Self::REFINE;
                    self.distortion += refinement_gain(magnitude, bit_plane);
                }
            }
        }
    }

    fn cleanup(&mut self, bit_plane: u8) {
        for (y0, y1) in stripes(self.height) {
            for x in 0..self.width {
                let mut y = y0;
                if y1 - y0 == 4 && self.run_length_eligible(x, y0) {
                    let first = (y0..y1).find(|&y| (self.magnitude(x, y) >> bit_plane) & 1 == 1);
                    let Some(hit) = first else {
                        self.mq.encode(0, CTX_AGG);
                        continue;
                    };
                    let offset = (hit - y0) as u8;
                    self.mq.encode(1, CTX_AGG);
                    self.mq.encode((offset >> 1) & 1, CTX_UNI);
                    self.mq.encode(offset & 1, CTX_UNI);
                    self.become_significant(x, hit, bit_plane);
                    y = hit + 1;
                }

                for y in y..y1 {
                    let i = self.index(x, y);
                    if self.state[i] & (Self::SIG | Self::VISITED) != 0 {
                        continue;
                    }
                    let (h, v, d) = self.neighbours(x, y);
                    let bit = ((self.magnitude(x, y) >> bit_plane) & 1) as u8;
                    let cx = self.zc_context(h, v, d);
                    self.mq.encode(bit, cx);
                    if bit == 1 {
                        self.become_significant(x, y, bit_plane);
                    }
                }
            }
        }

        for state in &mut self.state {
            *state &= !Self::VISITED;
        }
    }

    fn run_length_eligible(&self, x: usize, y0: usize) -> bool {
        (y0..y0 + 4).all(|y| {
            let (h, v, d) = self.neighbours(x, y);
            self.state[self.index(x, y)] & (Self::SIG | Self::VISITED) == 0 && h + v + d == 0
        })
    }
}

/// Row ranges of the four-row stripes of the scan pattern.
fn stripes(height: usize) -> impl Iterator<Item = (usize, usize)> {
    (0..height).step_by(4).map(move |y0| (y0, (y0 + 4).min(height)))
}

fn zc_context_lh(h: u8, v: u8, d: u8) -> usize {
    match (h, v, d) {
        (2, _, _) => 8,
        (1, v, _) if v >= 1 => 7,
        (1, 0, d) if d >= 1 => 6,
        (1, 0, 0) => 5,
        (0, 2, _) => 4,
        (0, 1, _) => 3,
        (0, 0, d) if d >= 2 => 2,
        (0, 0, 1) => 1,
        _ => 0,
    }
}

/// Mid-point reconstruction of `magnitude` once bit-planes down to
/// `bit_plane` are known.
fn reconstruction(magnitude: u64, bit_plane: u8) -> f64 {
    if bit_plane == 0 {
        magnitude as f64
    } else {
        (((magnitude >> bit_plane) << bit_plane) + (1 << (bit_plane - 1))) as f64
    }
}

fn significance_gain(magnitude: u64, bit_plane: u8) -> f64 {
    let m = magnitude as f64;
    let error = m - reconstruction(magnitude, bit_plane);
    m * m - error * error
}

fn refinement_gain(magnitude: u64, bit_plane: u8) -> f64 {
    let m = magnitude as f64;
    let before = m - reconstruction(magnitude, bit_plane + 1);
    let after = m - reconstruction(magnitude, bit_plane);
    before * before - after * after
}
