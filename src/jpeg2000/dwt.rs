//! Forward Discrete Wavelet Transforms for JPEG 2000 (ISO/IEC 15444-1 Annex F).

pub struct Dwt53;

impl Dwt53 {
    /// Forward 5/3 reversible transform of one line. The low-pass half goes
    /// to `out_l` (`ceil(len / 2)` values), the high-pass half to `out_h`.
    pub fn forward(signal: &[i32], out_l: &mut [i32], out_h: &mut [i32]) {
        let len = signal.len();
        if len == 0 {
            return;
        }
        if len == 1 {
            out_l[0] = signal[0];
            return;
        }

        let mut x = signal.to_vec();

        // Prediction: y[2n+1] = x[2n+1] - floor((x[2n] + x[2n+2]) / 2)
        for i in (1..len).step_by(2) {
            let right = if i + 1 < len { x[i + 1] } else { x[i - 1] };
            x[i] -= (x[i - 1] + right) >> 1;
        }
        // Update: y[2n] = x[2n] + floor((y[2n-1] + y[2n+1] + 2) / 4)
        for i in (0..len).step_by(2) {
            let left = if i > 0 { x[i - 1] } else { x[i + 1] };
            let right = if i + 1 < len { x[i + 1] } else { x[i - 1] };
            x[i] += (left + right + 2) >> 2;
        }

        deinterleave(&x, out_l, out_h);
    }
}

pub struct Dwt97;

impl Dwt97 {
    // 9/7 Filter Constants
    const ALPHA: f32 = -1.586_134_3;
    const BETA: f32 = -0.052_980_12;
    const GAMMA: f32 = 0.882_911_1;
    const DELTA: f32 = 0.443_506_87;
    const K: f32 = 1.230_174_1;
    const INV_K: f32 = 1.0 / 1.230_174_1;

    /// Forward 9/7 irreversible transform of one line.
    pub fn forward(signal: &[f32], out_l: &mut [f32], out_h: &mut [f32]) {
        let len = signal.len();
        if len == 0 {
            return;
        }
        if len == 1 {
            out_l[0] = signal[0];
            return;
        }

        let mut x = signal.to_vec();
        Self::lift(&mut x, 1, Self::ALPHA);
        Self::lift(&mut x, 0, Self::BETA);
        Self::lift(&mut x, 1, Self::GAMMA);
        Self::lift(&mut x, 0, Self::DELTA);

        for (i, value) in x.iter_mut().enumerate() {
            *value *= if i % 2 == 0 { Self::INV_K } else { Self::K };
        }

        deinterleave(&x, out_l, out_h);
    }

    // x[i] += c * (x[i-1] + x[i+1]) for every i of the given parity, with
    // symmetric extension at both ends
    fn lift(x: &mut [f32], parity: usize, coefficient: f32) {
        let len = x.len();
        for i in (parity..len).step_by(2) {
            let left = if i > 0 { x[i - 1] } else { x[i + 1] };
            let right = if i + 1 < len { x[i + 1] } else { x[i - 1] };
            x[i] += coefficient * (left + right);
        }
    }
}

fn deinterleave<T: Copy>(x: &[T], out_l: &mut [T], out_h: &mut [T]) {
    for (i, &value) in x.iter().enumerate() {
        if i % 2 == 0 {
            out_l[i / 2] = value;
        } else {
            out_h[i / 2] = value;
        }
    }
}

/// Sample types with a one dimensional forward transform.
pub trait Wavelet: Copy + Default {
    fn forward_line(signal: &[Self], out_l: &mut [Self], out_h: &mut [Self]);
}

impl Wavelet for i32 {
    fn forward_line(signal: &[i32], out_l: &mut [i32], out_h: &mut [i32]) {
        Dwt53::forward(signal, out_l, out_h);
    }
}

impl Wavelet for f32 {
    fn forward_line(signal: &[f32], out_l: &mut [f32], out_h: &mut [f32]) {
        Dwt97::forward(signal, out_l, out_h);
    }
}

/// Number of decomposition levels for a `width` x `height` tile: at most
/// `number_of_resolutions - 1`, and never more than the smaller side allows.
pub fn decomposition_levels(width: usize, height: usize, number_of_resolutions: u8) -> u8 {
    let smallest = width.min(height).max(1);
    let limit = smallest.ilog2() as u8;
    number_of_resolutions.saturating_sub(1).min(limit)
}

/// Multi-level 2D forward transform in place (Mallat layout).
///
/// After level `n` the top-left `ceil(w / 2^n) x ceil(h / 2^n)` region holds
/// the LL band, with HL to its right, LH below and HH diagonally:
/// ```text
/// +-------+-------+
/// |  LL   |  HL   |
/// +-------+-------+
/// |  LH   |  HH   |
/// +-------+-------+
/// ```
pub fn forward_2d<T: Wavelet>(data: &mut [T], width: usize, height: usize, levels: u8) {
    let mut cw = width;
    let mut ch = height;

    for _ in 0..levels {
        let lw = cw.div_ceil(2);
        let lh = ch.div_ceil(2);

        let mut line = vec![T::default(); cw.max(ch)];
        let mut low = vec![T::default(); lw.max(lh)];
        let mut high = vec![T::default(); lw.max(lh)];

        // vertical pass first; decoders undo the horizontal pass first
        for x in 0..cw {
            for y in 0..ch {
                line[y] = data[y * width + x];
            }
            T::forward_line(&line[..ch], &mut low[..lh], &mut high[..ch - lh]);
            for y in 0..lh {
                data[y * width + x] = low[y];
            }
            for y in lh..ch {
                data[y * width + x] = high[y - lh];
            }
        }

        for y in 0..ch {
            let row = &mut data[y * width..y * width + cw];
            line[..cw].copy_from_slice(row);
            T::forward_line(&line[..cw], &mut low[..lw], &mut high[..cw - lw]);
            row[..lw].copy_from_slice(&low[..lw]);
            row[lw..].copy_from_slice(&high[..cw - lw]);
        }

        cw = lw;
        ch = lh;
    }
}
