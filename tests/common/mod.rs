//! Reference JPEG 2000 reader used to check encoder output by decoding it.
//!
//! Written from ISO/IEC 15444-1 Annexes A to G, independently of the crate's
//! encoder modules. It covers the codestreams the encoder produces: a single
//! tile anchored at the origin, LRCP progression, default (maximal) precincts,
//! one codeword segment per code-block and no code-block style flags.

#![allow(dead_code)]

pub struct DecodedComponent {
    pub precision: u8,
    pub signed: bool,
    pub data: Vec<i32>,
}

pub struct DecodedImage {
    pub width: usize,
    pub height: usize,
    pub use_mct: bool,
    pub reversible: bool,
    pub layers: usize,
    pub components: Vec<DecodedComponent>,
}

/// Decodes a bare codestream or a JP2 file with every quality layer.
pub fn decode(bytes: &[u8]) -> Result<DecodedImage, String> {
    decode_layers(bytes, usize::MAX)
}

/// Decodes using only the first `max_layers` quality layers.
pub fn decode_layers(bytes: &[u8], max_layers: usize) -> Result<DecodedImage, String> {
    let codestream = codestream(bytes)?;
    let header = MainHeader::read(codestream)?;
    header.decode_tile(max_layers)
}

/// Peak signal to noise ratio in dB of `decoded` against `original`.
pub fn psnr(original: &[i32], decoded: &[i32], precision: u8) -> f64 {
    let peak = f64::from((1u32 << precision) - 1);
    let mse = original
        .iter()
        .zip(decoded)
        .map(|(&a, &b)| f64::from(a - b).powi(2))
        .sum::<f64>()
        / original.len() as f64;
    if mse == 0.0 {
        f64::INFINITY
    } else {
        10.0 * (peak * peak / mse).log10()
    }
}

fn codestream(bytes: &[u8]) -> Result<&[u8], String> {
    if bytes.starts_with(&[0xFF, 0x4F]) {
        return Ok(bytes);
    }
    let mut pos = 0;
    while pos + 8 <= bytes.len() {
        let length = u32::from_be_bytes([bytes[pos], bytes[pos + 1], bytes[pos + 2], bytes[pos + 3]]) as usize;
        let end = match length {
            0 => bytes.len(),
            1 => return Err("extended box lengths are not supported".to_string()),
            n => pos + n,
        };
        if end > bytes.len() || end < pos + 8 {
            return Err(format!("box at {pos} overruns the file"));
        }
        if &bytes[pos + 4..pos + 8] == b"jp2c" {
            return Ok(&bytes[pos + 8..end]);
        }
        pos = end;
    }
    Err("no codestream found".to_string())
}

struct ByteReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    fn u8(&mut self) -> Result<u8, String> {
        let value = *self.data.get(self.pos).ok_or("unexpected end of codestream")?;
        self.pos += 1;
        Ok(value)
    }

    fn u16(&mut self) -> Result<u16, String> {
        Ok(u16::from(self.u8()?) << 8 | u16::from(self.u8()?))
    }

    fn u32(&mut self) -> Result<u32, String> {
        Ok(u32::from(self.u16()?) << 16 | u32::from(self.u16()?))
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], String> {
        let slice = self.data.get(self.pos..self.pos + n).ok_or("segment overruns codestream")?;
        self.pos += n;
        Ok(slice)
    }
}

#[derive(Clone, Copy)]
struct Step {
    exponent: u8,
    mantissa: u16,
}

struct MainHeader<'a> {
    width: usize,
    height: usize,
    components: Vec<(u8, bool)>,
    layers: usize,
    use_mct: bool,
    levels: u8,
    reversible: bool,
    guard_bits: u8,
    steps: Vec<Step>,
    tile_data: &'a [u8],
}

impl<'a> MainHeader<'a> {
    fn read(data: &'a [u8]) -> Result<Self, String> {
        let mut reader = ByteReader { data, pos: 0 };
        if reader.u16()? != 0xFF4F {
            return Err("missing SOC".to_string());
        }
        let mut header = MainHeader {
            width: 0,
            height: 0,
            components: Vec::new(),
            layers: 0,
            use_mct: false,
            levels: 0,
            reversible: true,
            guard_bits: 0,
            steps: Vec::new(),
            tile_data: &[],
        };

        loop {
            let marker_start = reader.pos;
            let marker = reader.u16()?;
            let length = usize::from(reader.u16()?);
            let mut segment = ByteReader {
                data: reader.take(length.saturating_sub(2))?,
                pos: 0,
            };
            match marker {
                // SIZ
                0xFF51 => {
                    segment.u16()?;
                    let (x1, y1) = (segment.u32()?, segment.u32()?);
                    let (x0, y0) = (segment.u32()?, segment.u32()?);
                    let (tw, th) = (segment.u32()?, segment.u32()?);
                    let (tx0, ty0) = (segment.u32()?, segment.u32()?);
                    if x0 != 0 || y0 != 0 || tx0 != 0 || ty0 != 0 || tw < x1 || th < y1 {
                        return Err("only a single tile at the origin is supported".to_string());
                    }
                    header.width = x1 as usize;
                    header.height = y1 as usize;
                    for _ in 0..segment.u16()? {
                        let ssiz = segment.u8()?;
                        if segment.u8()? != 1 || segment.u8()? != 1 {
                            return Err("subsampled components are not supported".to_string());
                        }
                        header.components.push(((ssiz & 0x7F) + 1, ssiz & 0x80 != 0));
                    }
                }
                // COD
                0xFF52 => {
                    let scod = segment.u8()?;
                    let progression = segment.u8()?;
                    header.layers = usize::from(segment.u16()?);
                    header.use_mct = segment.u8()? == 1;
                    header.levels = segment.u8()?;
                    let (xcb, ycb) = (segment.u8()?, segment.u8()?);
                    let style = segment.u8()?;
                    header.reversible = segment.u8()? == 1;
                    if scod != 0 || progression != 0 || style != 0 || xcb != 4 || ycb != 4 {
                        return Err(format!(
                            "unsupported coding style: Scod {scod}, order {progression}, style {style}, blocks {xcb}/{ycb}"
                        ));
                    }
                }
                // QCD
                0xFF5C => {
                    let sqcd = segment.u8()?;
                    header.guard_bits = sqcd >> 5;
                    header.steps = match sqcd & 0x1F {
                        0 => (0..length - 3)
                            .map(|_| segment.u8().map(|b| Step { exponent: b >> 3, mantissa: 0 }))
                            .collect::<Result<_, _>>()?,
                        2 => (0..(length - 3) / 2)
                            .map(|_| {
                                segment.u16().map(|v| Step {
                                    exponent: (v >> 11) as u8,
                                    mantissa: v & 0x7FF,
                                })
                            })
                            .collect::<Result<_, _>>()?,
                        style => return Err(format!("quantization style {style} is not supported")),
                    };
                }
                // SOT
                0xFF90 => {
                    segment.u16()?;
                    let psot = segment.u32()? as usize;
                    let (part, parts) = (segment.u8()?, segment.u8()?);
                    if part != 0 || parts > 1 {
                        return Err("only one tile-part is supported".to_string());
                    }
                    if reader.u16()? != 0xFF93 {
                        return Err("SOD expected after SOT".to_string());
                    }
                    let end = if psot == 0 { data.len() - 2 } else { marker_start + psot };
                    header.tile_data = data.get(reader.pos..end).ok_or("tile-part overruns codestream")?;
                    if data.get(end..end + 2) != Some(&[0xFF, 0xD9][..]) {
                        return Err("EOC expected after the tile-part".to_string());
                    }
                    return Ok(header);
                }
                _ => {}
            }
        }
    }

    fn decode_tile(&self, max_layers: usize) -> Result<DecodedImage, String> {
        let (width, height) = (self.width, self.height);
        let levels = usize::from(self.levels);
        if self.steps.len() != 1 + 3 * levels {
            return Err(format!("{} step sizes for {levels} levels", self.steps.len()));
        }

        let mut tiles: Vec<Vec<Resolution>> = self
            .components
            .iter()
            .map(|_| (0..=levels).map(|r| Resolution::new(width, height, levels, r)).collect())
            .collect::<Vec<_>>();
        for resolution in tiles.iter().flatten() {
            if resolution.width > 1 << 15 || resolution.height > 1 << 15 {
                return Err("more than one precinct per resolution".to_string());
            }
        }

        // LRCP: one precinct per resolution
        let mut pos = 0;
        for layer in 0..self.layers.min(max_layers) {
            for r in 0..=levels {
                for component in tiles.iter_mut() {
                    pos += read_packet(&self.tile_data[pos..], &mut component[r].bands, layer)?;
                }
            }
        }

        let mut planes: Vec<Vec<f64>> = Vec::with_capacity(tiles.len());
        for (c, resolutions) in tiles.iter().enumerate() {
            let precision = self.components[c].0;
            let mut coefficients = vec![0.0f64; width * height];
            for (r, resolution) in resolutions.iter().enumerate() {
                for (b, band) in resolution.bands.iter().enumerate() {
                    let step = self.steps[if r == 0 { 0 } else { 1 + 3 * (r - 1) + b }];
                    let magnitude_bits = u32::from(self.guard_bits + step.exponent) - 1;
                    let delta = (1.0 + f64::from(step.mantissa) / 2048.0)
                        * 2f64.powi(i32::from(precision) + i32::from(band.gain) - i32::from(step.exponent));
                    band.reconstruct(magnitude_bits, self.reversible, delta, &mut coefficients, width)?;
                }
            }
            if self.reversible {
                let mut integers: Vec<i32> = coefficients.iter().map(|&v| v as i32).collect();
                inverse_2d(&mut integers, width, height, levels, inverse_53);
                planes.push(integers.into_iter().map(f64::from).collect());
            } else {
                inverse_2d(&mut coefficients, width, height, levels, inverse_97);
                planes.push(coefficients);
            }
        }

        if self.use_mct {
            if planes.len() < 3 {
                return Err("component transform with fewer than 3 components".to_string());
            }
            inverse_mct(&mut planes, self.reversible);
        }

        let components = planes
            .into_iter()
            .zip(&self.components)
            .map(|(plane, &(precision, signed))| {
                let (low, high, shift) = if signed {
                    (-(1i64 << (precision - 1)), (1i64 << (precision - 1)) - 1, 0)
                } else {
                    (0, (1i64 << precision) - 1, 1i64 << (precision - 1))
                };
                DecodedComponent {
                    precision,
                    signed,
                    data: plane
                        .into_iter()
                        .map(|v| (v.round() as i64 + shift).clamp(low, high) as i32)
                        .collect(),
                }
            })
            .collect();

        Ok(DecodedImage {
            width,
            height,
            use_mct: self.use_mct,
            reversible: self.reversible,
            layers: self.layers,
            components,
        })
    }
}

// --- Tile geometry (B.5 to B.7) ---

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum Orientation {
    Ll,
    Hl,
    Lh,
    Hh,
}

struct Resolution {
    width: usize,
    height: usize,
    bands: Vec<Band>,
}

impl Resolution {
    fn new(width: usize, height: usize, levels: usize, r: usize) -> Self {
        let ceil = |size: usize, n: usize| size.div_ceil(1 << n);
        let n = levels - r;
        let bands = if r == 0 {
            vec![Band::new(Orientation::Ll, 0, 0, ceil(width, n), ceil(height, n))]
        } else {
            let n = n + 1;
            let (lw, lh) = (ceil(width, n), ceil(height, n));
            let (hw, hh) = (ceil(width, n - 1) - lw, ceil(height, n - 1) - lh);
            vec![
                Band::new(Orientation::Hl, lw, 0, hw, lh),
                Band::new(Orientation::Lh, 0, lh, lw, hh),
                Band::new(Orientation::Hh, lw, lh, hw, hh),
            ]
        };
        Self {
            width: ceil(width, n),
            height: ceil(height, n),
            bands,
        }
    }
}

#[derive(Default)]
struct Block {
    width: usize,
    height: usize,
    included: bool,
    zero_bit_planes: u32,
    lblock: u32,
    passes: usize,
    data: Vec<u8>,
}

struct Band {
    orientation: Orientation,
    gain: u8,
    // position in the Mallat layout of the tile
    x0: usize,
    y0: usize,
    width: usize,
    blocks_wide: usize,
    blocks: Vec<Block>,
    inclusion: TagTree,
    zero_bit_planes: TagTree,
}

impl Band {
    fn new(orientation: Orientation, x0: usize, y0: usize, width: usize, height: usize) -> Self {
        let gain = match orientation {
            Orientation::Ll => 0,
            Orientation::Hl | Orientation::Lh => 1,
            Orientation::Hh => 2,
        };
        let (wide, high) = (width.div_ceil(64), height.div_ceil(64));
        let mut blocks = Vec::with_capacity(wide * high);
        for by in 0..high {
            for bx in 0..wide {
                blocks.push(Block {
                    width: (width - bx * 64).min(64),
                    height: (height - by * 64).min(64),
                    ..Block::default()
                });
            }
        }
        Self {
            orientation,
            gain,
            x0,
            y0,
            width,
            blocks_wide: wide,
            blocks,
            inclusion: TagTree::new(wide, high),
            zero_bit_planes: TagTree::new(wide, high),
        }
    }

    fn reconstruct(
        &self,
        magnitude_bits: u32,
        reversible: bool,
        delta: f64,
        out: &mut [f64],
        stride: usize,
    ) -> Result<(), String> {
        for (i, block) in self.blocks.iter().enumerate() {
            if !block.included || block.passes == 0 {
                continue;
            }
            let planes = magnitude_bits
                .checked_sub(block.zero_bit_planes)
                .ok_or("more zero bit-planes than magnitude bits")?;
            let samples = decode_block(block, self.orientation, planes)?;
            let (bx, by) = ((i % self.blocks_wide) * 64, (i / self.blocks_wide) * 64);
            for (j, sample) in samples.iter().enumerate() {
                if sample.magnitude == 0 {
                    continue;
                }
                let magnitude = f64::from(sample.magnitude);
                let value = if reversible {
                    match sample.lowest_plane {
                        0 => magnitude,
                        p => magnitude + f64::from(1u32 << (p - 1)),
                    }
                } else {
                    (magnitude + 0.5 * f64::from(1u32 << sample.lowest_plane)) * delta
                };
                let (x, y) = (self.x0 + bx + j % block.width, self.y0 + by + j / block.width);
                out[y * stride + x] = if sample.negative { -value } else { value };
            }
        }
        Ok(())
    }
}

// --- Packet headers (B.9, B.10) ---

struct HeaderBits<'a> {
    data: &'a [u8],
    pos: usize,
    byte: u8,
    left: u8,
}

impl<'a> HeaderBits<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            pos: 0,
            byte: 0,
            left: 0,
        }
    }

    fn bit(&mut self) -> Result<u32, String> {
        if self.left == 0 {
            let stuffed = self.pos > 0 && self.byte == 0xFF;
            self.byte = *self.data.get(self.pos).ok_or("packet header overruns tile data")?;
            self.pos += 1;
            self.left = if stuffed { 7 } else { 8 };
        }
        self.left -= 1;
        Ok(u32::from((self.byte >> self.left) & 1))
    }

    fn bits(&mut self, count: u32) -> Result<u32, String> {
        (0..count).try_fold(0, |value, _| Ok(value << 1 | self.bit()?))
    }

    /// Header length in bytes, including a stuffing byte after a final 0xFF.
    fn finish(self) -> usize {
        if self.pos > 0 && self.byte == 0xFF { self.pos + 1 } else { self.pos }
    }
}

fn pass_count(bits: &mut HeaderBits<'_>) -> Result<usize, String> {
    if bits.bit()? == 0 {
        return Ok(1);
    }
    if bits.bit()? == 0 {
        return Ok(2);
    }
    let two = bits.bits(2)?;
    if two != 3 {
        return Ok(3 + two as usize);
    }
    let five = bits.bits(5)?;
    if five != 31 {
        return Ok(6 + five as usize);
    }
    Ok(37 + bits.bits(7)? as usize)
}

/// Reads one packet of a precinct and returns its length in bytes.
fn read_packet(data: &[u8], bands: &mut [Band], layer: usize) -> Result<usize, String> {
    let mut bits = HeaderBits::new(data);
    if bits.bit()? == 0 {
        return Ok(bits.finish());
    }

    let mut lengths = Vec::new();
    for (b, band) in bands.iter_mut().enumerate() {
        for i in 0..band.blocks.len() {
            let included = if band.blocks[i].included {
                bits.bit()? == 1
            } else {
                band.inclusion.decode(&mut bits, i, layer as u32 + 1)?
            };
            if !included {
                continue;
            }
            if !band.blocks[i].included {
                let mut threshold = 1;
                while !band.zero_bit_planes.decode(&mut bits, i, threshold)? {
                    threshold += 1;
                }
                let block = &mut band.blocks[i];
                block.included = true;
                block.zero_bit_planes = threshold - 1;
                block.lblock = 3;
            }
            let passes = pass_count(&mut bits)?;
            let block = &mut band.blocks[i];
            while bits.bit()? == 1 {
                block.lblock += 1;
            }
            let length = bits.bits(block.lblock + passes.ilog2())? as usize;
            block.passes += passes;
            lengths.push((b, i, length));
        }
    }

    let mut pos = bits.finish();
    for (b, i, length) in lengths {
        let body = data.get(pos..pos + length).ok_or("packet body overruns tile data")?;
        bands[b].blocks[i].data.extend_from_slice(body);
        pos += length;
    }
    Ok(pos)
}

struct TagTree {
    // (width, height, first node) per level, leaves first
    levels: Vec<(usize, usize, usize)>,
    value: Vec<u32>,
    low: Vec<u32>,
}

impl TagTree {
    const UNKNOWN: u32 = u32::MAX;

    fn new(width: usize, height: usize) -> Self {
        let mut levels = vec![(width, height, 0)];
        let mut total = width * height;
        let (mut w, mut h) = (width, height);
        while w * h > 1 {
            w = w.div_ceil(2);
            h = h.div_ceil(2);
            levels.push((w, h, total));
            total += w * h;
        }
        Self {
            levels,
            value: vec![Self::UNKNOWN; total],
            low: vec![0; total],
        }
    }

    /// Reads bits for `leaf` until its value is known or shown to be at least
    /// `threshold`. Returns whether the value is below `threshold`.
    fn decode(&mut self, bits: &mut HeaderBits<'_>, leaf: usize, threshold: u32) -> Result<bool, String> {
        let leaf_width = self.levels[0].0;
        let (x, y) = (leaf % leaf_width, leaf / leaf_width);
        let mut low = 0;
        let mut node = 0;
        for (level, &(w, _, first)) in self.levels.iter().enumerate().rev() {
            node = first + (y >> level) * w + (x >> level);
            if low > self.low[node] {
                self.low[node] = low;
            } else {
                low = self.low[node];
            }
            while low < threshold && low < self.value[node] {
                if bits.bit()? == 1 {
                    self.value[node] = low;
                } else {
                    low += 1;
                }
            }
            self.low[node] = low;
        }
        Ok(self.value[node] < threshold)
    }
}

// --- MQ decoder (C.3) ---

// (Qe, NMPS, NLPS, SWITCH), Table C.2
const QE: [(u32, u8, u8, bool); 47] = [
    (0x5601, 1, 1, true),
    (0x3401, 2, 6, false),
    (0x1801, 3, 9, false),
    (0x0AC1, 4, 12, false),
    (0x0521, 5, 29, false),
    (0x0221, 38, 33, false),
    (0x5601, 7, 6, true),
    (0x5401, 8, 14, false),
    (0x4801, 9, 14, false),
    (0x3801, 10, 14, false),
    (0x3001, 11, 17, false),
    (0x2401, 12, 18, false),
    (0x1C01, 13, 20, false),
    (0x1601, 29, 21, false),
    (0x5601, 15, 14, true),
    (0x5401, 16, 14, false),
    (0x5101, 17, 15, false),
    (0x4801, 18, 16, false),
    (0x3801, 19, 17, false),
    (0x3401, 20, 18, false),
    (0x3001, 21, 19, false),
    (0x2801, 22, 19, false),
    (0x2401, 23, 20, false),
    (0x2201, 24, 21, false),
    (0x1C01, 25, 22, false),
    (0x1801, 26, 23, false),
    (0x1601, 27, 24, false),
    (0x1401, 28, 25, false),
    (0x1201, 29, 26, false),
    (0x1101, 30, 27, false),
    (0x0AC1, 31, 28, false),
    (0x09C1, 32, 29, false),
    (0x08A1, 33, 30, false),
    (0x0521, 34, 31, false),
    (0x0441, 35, 32, false),
    (0x02A1, 36, 33, false),
    (0x0221, 37, 34, false),
    (0x0141, 38, 35, false),
    (0x0111, 39, 36, false),
    (0x0085, 40, 37, false),
    (0x0049, 41, 38, false),
    (0x0025, 42, 39, false),
    (0x0015, 43, 40, false),
    (0x0009, 44, 41, false),
    (0x0005, 45, 42, false),
    (0x0001, 45, 43, false),
    (0x5601, 46, 46, false),
];

const ZC: usize = 0;
const SC: usize = 9;
const MR: usize = 14;
const RL: usize = 17;
const UNI: usize = 18;

struct MqDecoder<'a> {
    data: &'a [u8],
    pos: usize,
    a: u32,
    c: u32,
    ct: u32,
    // (state index, mps)
    contexts: [(u8, u8); 19],
}

impl<'a> MqDecoder<'a> {
    fn new(data: &'a [u8]) -> Self {
        let mut contexts = [(0, 0); 19];
        contexts[ZC] = (4, 0);
        contexts[RL] = (3, 0);
        contexts[UNI] = (46, 0);
        let mut decoder = Self {
            data,
            pos: 0,
            a: 0,
            c: 0,
            ct: 0,
            contexts,
        };
        // INITDEC
        decoder.c = u32::from(decoder.byte(0)) << 16;
        decoder.byte_in();
        decoder.c <<= 7;
        decoder.ct -= 7;
        decoder.a = 0x8000;
        decoder
    }

    // bytes past the end of the segment read as 0xFF
    fn byte(&self, pos: usize) -> u8 {
        self.data.get(pos).copied().unwrap_or(0xFF)
    }

    fn byte_in(&mut self) {
        if self.byte(self.pos) == 0xFF {
            if self.byte(self.pos + 1) > 0x8F {
                self.c += 0xFF00;
                self.ct = 8;
            } else {
                self.pos += 1;
                self.c += u32::from(self.byte(self.pos)) << 9;
                self.ct = 7;
            }
        } else {
            self.pos += 1;
            self.c += u32::from(self.byte(self.pos)) << 8;
            self.ct = 8;
        }
    }

    fn renormalize(&mut self) {
        loop {
            if self.ct == 0 {
                self.byte_in();
            }
            self.a <<= 1;
            self.c <<= 1;
            self.ct -= 1;
            if self.a & 0x8000 != 0 {
                break;
            }
        }
    }

    fn decode(&mut self, cx: usize) -> u8 {
        let (index, mps) = self.contexts[cx];
        let (qe, nmps, nlps, switch) = QE[usize::from(index)];
        let lps = |contexts: &mut [(u8, u8); 19]| {
            contexts[cx] = (nlps, if switch { 1 - mps } else { mps });
            1 - mps
        };
        let more_probable = |contexts: &mut [(u8, u8); 19]| {
            contexts[cx] = (nmps, mps);
            mps
        };

        self.a -= qe;
        if (self.c >> 16) < self.a {
            if self.a & 0x8000 != 0 {
                return mps;
            }
            // MPS_EXCHANGE
            let d = if self.a < qe {
                lps(&mut self.contexts)
            } else {
                more_probable(&mut self.contexts)
            };
            self.renormalize();
            d
        } else {
            self.c -= self.a << 16;
            // LPS_EXCHANGE
            let d = if self.a < qe {
                more_probable(&mut self.contexts)
            } else {
                lps(&mut self.contexts)
            };
            self.a = qe;
            self.renormalize();
            d
        }
    }
}

// --- Tier-1 decoding (Annex D) ---

#[derive(Clone, Copy, Default)]
struct Sample {
    magnitude: u32,
    negative: bool,
    lowest_plane: u32,
}

struct BlockDecoder<'a> {
    width: usize,
    height: usize,
    orientation: Orientation,
    mq: MqDecoder<'a>,
    // one sample of padding on every side
    significant: Vec<bool>,
    visited: Vec<bool>,
    refined: Vec<bool>,
    samples: Vec<Sample>,
}

fn decode_block(block: &Block, orientation: Orientation, planes: u32) -> Result<Vec<Sample>, String> {
    let padded = (block.width + 2) * (block.height + 2);
    let mut decoder = BlockDecoder {
        width: block.width,
        height: block.height,
        orientation,
        mq: MqDecoder::new(&block.data),
        significant: vec![false; padded],
        visited: vec![false; padded],
        refined: vec![false; padded],
        samples: vec![Sample::default(); padded],
    };
    if planes == 0 || block.passes > 3 * planes as usize - 2 {
        return Err(format!("{} passes for {planes} bit-planes", block.passes));
    }

    let mut plane = planes - 1;
    for pass in 0..block.passes {
        match (pass + 2) % 3 {
            0 => decoder.significance_pass(plane),
            1 => decoder.refinement_pass(plane),
            _ => {
                decoder.cleanup_pass(plane);
                if pass + 1 < block.passes {
                    plane -= 1;
                }
            }
        }
    }

    let mut out = Vec::with_capacity(block.width * block.height);
    for y in 0..block.height {
        for x in 0..block.width {
            out.push(decoder.samples[decoder.index(x, y)]);
        }
    }
    Ok(out)
}

fn stripes(height: usize) -> impl Iterator<Item = (usize, usize)> {
    (0..height).step_by(4).map(move |y0| (y0, (y0 + 4).min(height)))
}

impl BlockDecoder<'_> {
    fn index(&self, x: usize, y: usize) -> usize {
        (y + 1) * (self.width + 2) + x + 1
    }

    fn sign_of(&self, i: usize) -> i32 {
        match (self.significant[i], self.samples[i].negative) {
            (false, _) => 0,
            (true, false) => 1,
            (true, true) => -1,
        }
    }

    fn neighbours(&self, x: usize, y: usize) -> (u32, u32, u32) {
        let i = self.index(x, y);
        let row = self.width + 2;
        let count = |indices: &[usize]| indices.iter().filter(|&&j| self.significant[j]).count() as u32;
        (
            count(&[i - 1, i + 1]),
            count(&[i - row, i + row]),
            count(&[i - row - 1, i - row + 1, i + row - 1, i + row + 1]),
        )
    }

    // Table D.1
    fn zero_context(&self, h: u32, v: u32, d: u32) -> usize {
        let (h, v) = match self.orientation {
            Orientation::Hl => (v, h),
            _ => (h, v),
        };
        if self.orientation == Orientation::Hh {
            return match (d, h + v) {
                (3.., _) => 8,
                (2, 1..) => 7,
                (2, 0) => 6,
                (1, 2..) => 5,
                (1, 1) => 4,
                (1, 0) => 3,
                (0, 2..) => 2,
                (0, 1) => 1,
                _ => 0,
            };
        }
        match (h, v, d) {
            (2, _, _) => 8,
            (1, 1.., _) => 7,
            (1, 0, 1..) => 6,
            (1, 0, 0) => 5,
            (0, 2, _) => 4,
            (0, 1, _) => 3,
            (0, 0, 2..) => 2,
            (0, 0, 1) => 1,
            _ => 0,
        }
    }

    // Tables D.2 and D.3
    fn decode_sign(&mut self, x: usize, y: usize) -> bool {
        let i = self.index(x, y);
        let row = self.width + 2;
        let h = (self.sign_of(i - 1) + self.sign_of(i + 1)).clamp(-1, 1);
        let v = (self.sign_of(i - row) + self.sign_of(i + row)).clamp(-1, 1);
        let (offset, xor) = match (h, v) {
            (1, 1) => (4, 0),
            (1, 0) => (3, 0),
            (1, -1) => (2, 0),
            (0, 1) => (1, 0),
            (0, 0) => (0, 0),
            (0, -1) => (1, 1),
            (-1, 1) => (2, 1),
            (-1, 0) => (3, 1),
            _ => (4, 1),
        };
        self.mq.decode(SC + offset) ^ xor == 1
    }

    fn become_significant(&mut self, x: usize, y: usize, plane: u32) {
        let negative = self.decode_sign(x, y);
        let i = self.index(x, y);
        self.significant[i] = true;
        self.samples[i] = Sample {
            magnitude: 1 << plane,
            negative,
            lowest_plane: plane,
        };
    }

    fn significance_pass(&mut self, plane: u32) {
        for (y0, y1) in stripes(self.height) {
            for x in 0..self.width {
                for y in y0..y1 {
                    let i = self.index(x, y);
                    if self.significant[i] {
                        continue;
                    }
                    let (h, v, d) = self.neighbours(x, y);
                    if h + v + d == 0 {
                        continue;
                    }
                    let cx = ZC + self.zero_context(h, v, d);
                    if self.mq.decode(cx) == 1 {
                        self.become_significant(x, y, plane);
                    }
                    self.visited[i] = true;
                }
            }
        }
    }

    fn refinement_pass(&mut self, plane: u32) {
        for (y0, y1) in stripes(self.height) {
            for x in 0..self.width {
                for y in y0..y1 {
                    let i = self.index(x, y);
                    if !self.significant[i] || self.visited[i] {
                        continue;
                    }
                    let cx = if self.refined[i] {
                        MR + 2
                    } else {
                        let (h, v, d) = self.neighbours(x, y);
                        if h + v + d > 0 { MR + 1 } else { MR }
                    };
                    let bit = u32::from(self.mq.decode(cx));
                    let sample = &mut self.samples[i];
                    sample.magnitude |= bit << plane;
                    sample.lowest_plane = plane;
                    self.refined[i] = true;
                }
            }
        }
    }

    fn cleanup_pass(&mut self, plane: u32) {
        for (y0, y1) in stripes(self.height) {
            for x in 0..self.width {
                let mut start = y0;
                let run = y1 - y0 == 4
                    && (y0..y1).all(|y| {
                        let i = self.index(x, y);
                        let (h, v, d) = self.neighbours(x, y);
                        !self.significant[i] && !self.visited[i] && h + v + d == 0
                    });
                if run {
                    if self.mq.decode(RL) == 0 {
                        continue;
                    }
                    let offset = usize::from(self.mq.decode(UNI)) << 1 | usize::from(self.mq.decode(UNI));
                    self.become_significant(x, y0 + offset, plane);
                    start = y0 + offset + 1;
                }
                for y in start..y1 {
                    let i = self.index(x, y);
                    if self.significant[i] || self.visited[i] {
                        continue;
                    }
                    let (h, v, d) = self.neighbours(x, y);
                    let cx = ZC + self.zero_context(h, v, d);
                    if self.mq.decode(cx) == 1 {
                        self.become_significant(x, y, plane);
                    }
                }
            }
        }
        self.visited.fill(false);
    }
}

// --- Inverse wavelet transforms (Annex F) and component transforms (Annex G) ---

// symmetric extension of an interleaved line
fn mirror(len: usize, i: isize) -> usize {
    if i < 0 {
        i.unsigned_abs()
    } else if i as usize >= len {
        2 * (len - 1) - i as usize
    } else {
        i as usize
    }
}

fn interleave<T: Copy>(low: &[T], high: &[T]) -> Vec<T> {
    (0..low.len() + high.len())
        .map(|i| if i % 2 == 0 { low[i / 2] } else { high[i / 2] })
        .collect()
}

fn inverse_53(low: &[i32], high: &[i32]) -> Vec<i32> {
    let mut x = interleave(low, high);
    let len = x.len();
    if len < 2 {
        return x;
    }
    for i in (0..len).step_by(2) {
        let (left, right) = (x[mirror(len, i as isize - 1)], x[mirror(len, i as isize + 1)]);
        x[i] -= (left + right + 2) >> 2;
    }
    for i in (1..len).step_by(2) {
        let (left, right) = (x[i - 1], x[mirror(len, i as isize + 1)]);
        x[i] += (left + right) >> 1;
    }
    x
}

fn inverse_97(low: &[f64], high: &[f64]) -> Vec<f64> {
    const ALPHA: f64 = -1.586_134_342_059_924;
    const BETA: f64 = -0.052_980_118_572_961;
    const GAMMA: f64 = 0.882_911_075_530_934;
    const DELTA: f64 = 0.443_506_852_043_971;
    const K: f64 = 1.230_174_104_914_001;

    let mut x = interleave(low, high);
    let len = x.len();
    if len < 2 {
        return x;
    }
    for (i, value) in x.iter_mut().enumerate() {
        *value *= if i % 2 == 0 { K } else { 1.0 / K };
    }
    for (parity, coefficient) in [(0, DELTA), (1, GAMMA), (0, BETA), (1, ALPHA)] {
        for i in (parity..len).step_by(2) {
            let (left, right) = (x[mirror(len, i as isize - 1)], x[mirror(len, i as isize + 1)]);
            x[i] -= coefficient * (left + right);
        }
    }
    x
}

/// Synthesis from the coarsest level up: rows, then columns, per level.
fn inverse_2d<T: Copy>(data: &mut [T], width: usize, height: usize, levels: usize, line: fn(&[T], &[T]) -> Vec<T>) {
    for n in (1..=levels).rev() {
        let (cw, ch) = (width.div_ceil(1 << (n - 1)), height.div_ceil(1 << (n - 1)));
        let (lw, lh) = (cw.div_ceil(2), ch.div_ceil(2));
        for y in 0..ch {
            let row = &mut data[y * width..y * width + cw];
            let restored = line(&row[..lw], &row[lw..]);
            row.copy_from_slice(&restored);
        }
        for x in 0..cw {
            let column: Vec<T> = (0..ch).map(|y| data[y * width + x]).collect();
            for (y, value) in line(&column[..lh], &column[lh..]).into_iter().enumerate() {
                data[y * width + x] = value;
            }
        }
    }
}

fn inverse_mct(planes: &mut [Vec<f64>], reversible: bool) {
    let (first, rest) = planes.split_at_mut(1);
    let (second, third) = rest.split_at_mut(1);
    for ((y0, y1), y2) in first[0].iter_mut().zip(second[0].iter_mut()).zip(third[0].iter_mut()) {
        let (a, b, c) = (*y0, *y1, *y2);
        if reversible {
            let (a, b, c) = (a as i32, b as i32, c as i32);
            let green = a - ((b + c) >> 2);
            *y0 = f64::from(c + green);
            *y1 = f64::from(green);
            *y2 = f64::from(b + green);
        } else {
            *y0 = a + 1.402 * c;
            *y1 = a - 0.344_136 * b - 0.714_136 * c;
            *y2 = a + 1.772 * b;
        }
    }
}
