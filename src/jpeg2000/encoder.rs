//! JPEG 2000 Encoder
//!
//! One tile, LRCP progression, 64x64 code-blocks and maximal precincts.
//! Lossless output uses the reversible 5/3 DWT (with RCT for colour);
//! lossy output uses the 9/7 DWT (with ICT), scalar quantization and
//! post-compression rate-distortion optimisation over the requested layers.

use super::bit_plane_coder::BitPlaneCoder;
use super::dwt::{decomposition_levels, forward_2d};
use super::image::{J2kCodeBlock, J2kSubband, J2kTileComponent};
use super::jp2::Jp2Writer;
use super::packet::{Contribution, PrecinctState, encode_packet};
use super::quantization::{StepSize, mct_norm, quantize_scalar, synthesis_norm};
use super::writer::{J2kCod, J2kQcd, J2kWriter};
use crate::codec::{CodecError, Compressor, MessageHandlers};
use crate::coding_parameters::CodingParameters;
use crate::constants::{
    CODEBLOCK_EXPONENT, CODEBLOCK_SIZE, CREATOR_COMMENT, GUARD_BITS, MAX_BITS_STORED, MAX_LAYERS,
    MAX_NUMBER_OF_RESOLUTIONS, MIN_BITS_STORED,
};
use crate::image::PlanarImage;
use crate::options::ContainerFormat;
use crate::stream::OutputStream;

// SOT (12) + SOD (2)
const TILE_HEADER_LEN: usize = 14;
const EOC_LEN: usize = 2;
const BISECTION_STEPS: usize = 48;

/// Precinct coding state indexed by component, resolution and precinct.
type PrecinctStates = Vec<Vec<Vec<PrecinctState>>>;

/// Samples copied out of the image when compression starts.
struct Tile {
    width: usize,
    height: usize,
    precision: u8,
    signed: bool,
    planes: Vec<Vec<i32>>,
}

/// Wavelet coefficients of one component.
enum Plane {
    Integer(Vec<i32>),
    Real(Vec<f32>),
}

impl Plane {
    fn index(&self, offset: usize, delta: f64) -> i32 {
        match self {
            Plane::Integer(plane) => plane[offset],
            Plane::Real(plane) => quantize_scalar(f64::from(plane[offset]), delta),
        }
    }
}

/// JPEG 2000 Encoder
pub struct J2kEncoder {
    format: ContainerFormat,
    handlers: MessageHandlers,
    parameters: Option<CodingParameters>,
    /// Number of DWT decomposition levels
    levels: u8,
    tile: Option<Tile>,
    jp2: Option<Jp2Writer>,
    /// Main header length, from SOC to the end of COM
    header_len: usize,
}

impl J2kEncoder {
    pub fn new(format: ContainerFormat) -> Self {
        Self {
            format,
            handlers: MessageHandlers::default(),
            parameters: None,
            levels: 0,
            tile: None,
            jp2: None,
            header_len: 0,
        }
    }

    fn reject(&self, message: String) -> CodecError {
        self.handlers.error(&message);
        CodecError::Rejected(message)
    }

    fn check(&self, parameters: &CodingParameters, image: &PlanarImage) -> Result<(), String> {
        if parameters.codec_format != self.format {
            return Err(format!(
                "compressor created for {:?} cannot write {:?}",
                self.format, parameters.codec_format
            ));
        }
        let Some(first) = image.components.first() else {
            return Err("image has no components".to_string());
        };
        if image.x1 <= image.x0 || image.y1 <= image.y0 {
            return Err(format!("empty image area {}x{}", image.width(), image.height()));
        }
        let (width, height) = (image.x1 - image.x0, image.y1 - image.y0);
        for (i, component) in image.components.iter().enumerate() {
            if component.width != width || component.height != height {
                return Err(format!(
                    "component {i} is {}x{}, expected {width}x{height}",
                    component.width, component.height
                ));
            }
            if component.dx != 1 || component.dy != 1 {
                return Err(format!("component {i} is subsampled"));
            }
            if component.precision != first.precision || component.signed != first.signed {
                return Err(format!("component {i} differs in precision or signedness"));
            }
            if component.data.len() != width as usize * height as usize {
                return Err(format!(
                    "component {i} holds {} samples, expected {}",
                    component.data.len(),
                    width as usize * height as usize
                ));
            }
        }
        if !(MIN_BITS_STORED..=MAX_BITS_STORED).contains(&first.precision) {
            return Err(format!("unsupported precision {}", first.precision));
        }
        if parameters.use_mct && image.components.len() != 3 {
            return Err(format!(
                "multiple component transform needs 3 components, image has {}",
                image.components.len()
            ));
        }
        if parameters.codeblock_width != CODEBLOCK_SIZE || parameters.codeblock_height != CODEBLOCK_SIZE {
            return Err(format!(
                "code-block size {}x{} is not supported",
                parameters.codeblock_width, parameters.codeblock_height
            ));
        }
        if !(1..=MAX_NUMBER_OF_RESOLUTIONS).contains(&parameters.number_of_resolutions) {
            return Err(format!(
                "number of resolutions {} outside 1..={MAX_NUMBER_OF_RESOLUTIONS}",
                parameters.number_of_resolutions
            ));
        }
        if !(1..=MAX_LAYERS).contains(&parameters.number_of_layers) {
            return Err(format!("number of layers {} outside 1..={MAX_LAYERS}", parameters.number_of_layers));
        }
        if parameters.layer_ratios.len() > parameters.number_of_layers {
            return Err(format!(
                "{} compression ratios for {} layers",
                parameters.layer_ratios.len(),
                parameters.number_of_layers
            ));
        }
        if parameters.image_offset_x != 0 || parameters.image_offset_y != 0 {
            return Err("image offsets are not supported".to_string());
        }
        Ok(())
    }

    /// Sets step size, `Mb` and distortion weight of `band` for `component`.
    fn configure_band(&self, band: &mut J2kSubband, parameters: &CodingParameters, precision: u8, component: usize) {
        let orientation = band.orientation;
        let level = band.norm_level();
        let irreversible = parameters.irreversible;
        let mct_weight = if parameters.use_mct {
            mct_norm(irreversible, component).powi(2)
        } else {
            1.0
        };

        if irreversible {
            band.step = StepSize::irreversible(precision, orientation, level);
            let delta = band.step.delta(precision + orientation.gain());
            let norm = synthesis_norm(true, orientation, level);
            band.distortion_weight = (delta * norm / f64::from(1u32 << orientation.gain())).powi(2) * mct_weight;
        } else {
            // RCT chrominance carries one extra bit
            band.step = StepSize::reversible(precision + u8::from(parameters.use_mct), orientation);
            band.distortion_weight = synthesis_norm(false, orientation, level).powi(2) * mct_weight;
        }
        band.magnitude_bits = band.step.magnitude_bits(GUARD_BITS);
    }

    /// QCD step sizes, LL first then HL, LH, HH from the coarsest level.
    fn step_sizes(&self, parameters: &CodingParameters, tile: &Tile) -> Vec<StepSize> {
        let mut template = J2kTileComponent::new(tile.width, tile.height, self.levels);
        template
            .subbands_mut()
            .map(|band| {
                self.configure_band(band, parameters, tile.precision, 0);
                band.step
            })
            .collect()
    }

    /// Level shift, component transform, wavelet transform and Tier-1 coding.
    /// Fails on samples outside the declared precision and on code-blocks
    /// needing more bit-planes than the QCD signals.
    fn code_tile(&self, parameters: &CodingParameters, tile: Tile) -> Result<Vec<J2kTileComponent>, CodecError> {
        let Tile {
            width,
            height,
            precision,
            signed,
            mut planes,
        } = tile;

        let (low, high) = if signed {
            (-(1i32 << (precision - 1)), (1i32 << (precision - 1)) - 1)
        } else {
            (0, (1i32 << precision) - 1)
        };
        let outside = planes.iter().flatten().filter(|&&v| v < low || v > high).count();
        if outside > 0 {
            return Err(self.reject(format!(
                "{outside} sample(s) outside {low}..={high}; samples exceed the declared precision of {precision} bits"
            )));
        }

        if !signed {
            let shift = 1i32 << (precision - 1);
            for sample in planes.iter_mut().flatten() {
                *sample -= shift;
            }
        }

        let coefficients: Vec<Plane> = if parameters.irreversible {
            let mut real: Vec<Vec<f32>> = planes
                .into_iter()
                .map(|plane| plane.into_iter().map(|v| v as f32).collect())
                .collect();
            if parameters.use_mct {
                forward_ict(&mut real);
            }
            real.into_iter()
                .map(|mut plane| {
                    forward_2d(&mut plane, width, height, self.levels);
                    Plane::Real(plane)
                })
                .collect()
        } else {
            if parameters.use_mct {
                forward_rct(&mut planes);
            }
            planes
                .into_iter()
                .map(|mut plane| {
                    forward_2d(&mut plane, width, height, self.levels);
                    Plane::Integer(plane)
                })
                .collect()
        };

        let mut overflowing = 0usize;
        let mut components = Vec::with_capacity(coefficients.len());
        for (c, plane) in coefficients.iter().enumerate() {
            let mut component = J2kTileComponent::new(width, height, self.levels);
            for band in component.subbands_mut() {
                self.configure_band(band, parameters, precision, c);
                let delta = band.step.delta(precision + band.orientation.gain());
                let (x0, y0) = (band.x0, band.y0);
                for block in &mut band.codeblocks {
                    let mut indices = Vec::with_capacity(block.width * block.height);
                    for y in 0..block.height {
                        let row = (y0 + block.y0 + y) * width + x0 + block.x0;
                        indices.extend((0..block.width).map(|x| plane.index(row + x, delta)));
                    }
                    block.encoding = BitPlaneCoder::new(block.width, block.height, &indices, band.orientation).encode();
                    if block.encoding.magnitude_bits > band.magnitude_bits {
                        overflowing += 1;
                    }
                    block.compute_hull(band.distortion_weight);
                }
            }
            components.push(component);
        }

        if overflowing > 0 {
            return Err(self.reject(format!(
                "{overflowing} code-block(s) need more magnitude bit-planes than {precision} bits stored allow"
            )));
        }
        Ok(components)
    }

    /// Byte budget of the tile data after each layer, `None` when unconstrained.
    fn layer_budgets(&self, parameters: &CodingParameters, tile: &Tile) -> Vec<Option<usize>> {
        let raw_bits = (tile.width * tile.height * tile.planes.len()) as f64 * f64::from(tile.precision);
        let overhead = self.header_len + TILE_HEADER_LEN + EOC_LEN;
        (0..parameters.number_of_layers)
            .map(|layer| {
                if !parameters.distortion_allocation {
                    return None;
                }
                let ratio = parameters.layer_ratios.get(layer).copied()?;
                if ratio <= 1.0 {
                    return None;
                }
                let bytes = (raw_bits / 8.0 / ratio).floor() as usize;
                Some(bytes.saturating_sub(overhead))
            })
            .collect()
    }
}

impl Default for J2kEncoder {
    fn default() -> Self {
        Self::new(ContainerFormat::Codestream)
    }
}

impl Compressor for J2kEncoder {
    fn set_message_handlers(&mut self, handlers: MessageHandlers) {
        self.handlers = handlers;
    }

    fn setup_encoder(&mut self, parameters: &CodingParameters, image: &PlanarImage) -> Result<(), CodecError> {
        self.check(parameters, image).map_err(|message| self.reject(message))?;

        let (width, height) = (image.width() as usize, image.height() as usize);
        self.levels = decomposition_levels(width, height, parameters.number_of_resolutions);
        if self.levels + 1 < parameters.number_of_resolutions {
            self.handlers.warning(&format!(
                "{}x{} image allows {} resolutions, {} requested",
                width,
                height,
                self.levels + 1,
                parameters.number_of_resolutions
            ));
        }
        if parameters.irreversible && parameters.layer_ratios.is_empty() {
            self.handlers
                .warning("no compression ratio given, writing a single layer with every coding pass");
        }

        self.handlers.info(&format!(
            "{} {}x{} x {}, {} decomposition levels, {} layer(s)",
            if parameters.irreversible { "irreversible" } else { "reversible" },
            width,
            height,
            image.component_count(),
            self.levels,
            parameters.number_of_layers
        ));
        self.parameters = Some(parameters.clone());
        Ok(())
    }

    fn start_compress(&mut self, image: &PlanarImage, stream: &mut OutputStream<'_>) -> Result<(), CodecError> {
        let Some(parameters) = self.parameters.clone() else {
            return Err(self.reject("encoder was not set up".to_string()));
        };
        let (precision, signed) = image
            .components
            .first()
            .map_or((MIN_BITS_STORED, false), |c| (c.precision, c.signed));
        let tile = Tile {
            width: image.width() as usize,
            height: image.height() as usize,
            precision,
            signed,
            planes: image.components.iter().map(|c| c.data.clone()).collect(),
        };

        if self.format == ContainerFormat::FileFormat {
            let mut jp2 = Jp2Writer::new();
            jp2.write_preamble(stream, image)?;
            self.jp2 = Some(jp2);
        }

        let mut writer = J2kWriter::new();
        writer.write_soc();
        writer.write_siz(image);
        writer.write_cod(&J2kCod {
            coding_style: 0,
            progression_order: parameters.progression_order,
            number_of_layers: parameters.number_of_layers as u16,
            use_mct: parameters.use_mct,
            decomposition_levels: self.levels,
            codeblock_exponents: (CODEBLOCK_EXPONENT, CODEBLOCK_EXPONENT),
            codeblock_style: 0,
            reversible: !parameters.irreversible,
        });
        writer.write_qcd(&J2kQcd {
            guard_bits: GUARD_BITS,
            reversible: !parameters.irreversible,
            step_sizes: self.step_sizes(&parameters, &tile),
        });
        writer.write_com(CREATOR_COMMENT);
        stream.write(writer.as_bytes())?;

        self.header_len = writer.len();
        self.tile = Some(tile);
        Ok(())
    }

    fn encode(&mut self, stream: &mut OutputStream<'_>) -> Result<(), CodecError> {
        let (Some(parameters), Some(tile)) = (self.parameters.clone(), self.tile.take()) else {
            return Err(self.reject("compression was not started".to_string()));
        };

        let budgets = self.layer_budgets(&parameters, &tile);
        let mut components = self.code_tile(&parameters, tile)?;
        let mut states = precinct_states(&components);

        let mut tile_data = Vec::new();
        for (layer, budget) in budgets.iter().enumerate() {
            let target = budget.map(|b| b.saturating_sub(tile_data.len()));
            allocate_layer(&mut components, &states, layer, target);
            let before = tile_data.len();
            layer_packets(&components, &mut states, layer, |b| b.layer_passes[layer], &mut tile_data);
            if let Some(target) = target
                && tile_data.len() - before > target
            {
                self.handlers.warning(&format!(
                    "layer {layer} takes {} bytes, more than its budget of {target}",
                    tile_data.len() - before
                ));
            }
        }

        let psot = u32::try_from(TILE_HEADER_LEN + tile_data.len())
            .map_err(|_| self.reject("tile data does not fit a single tile-part".to_string()))?;
        let mut writer = J2kWriter::new();
        writer.write_sot(0, psot, 0, 1);
        writer.write_sod();
        stream.write(writer.as_bytes())?;
        stream.write(&tile_data)?;

        self.handlers
            .info(&format!("{} bytes of packet data in {} layer(s)", tile_data.len(), budgets.len()));
        Ok(())
    }

    fn end_compress(&mut self, stream: &mut OutputStream<'_>) -> Result<(), CodecError> {
        let mut writer = J2kWriter::new();
        writer.write_eoc();
        stream.write(writer.as_bytes())?;
        if let Some(mut jp2) = self.jp2.take() {
            jp2.finish_codestream(stream)?;
        }
        stream.flush()?;
        Ok(())
    }
}

// Table G.2 applied in place on the first three components
fn forward_rct(planes: &mut [Vec<i32>]) {
    let [r, g, b] = planes else {
        return;
    };
    for ((r, g), b) in r.iter_mut().zip(g.iter_mut()).zip(b.iter_mut()) {
        let (red, green, blue) = (*r, *g, *b);
        *r = (red + 2 * green + blue) >> 2;
        *g = blue - green;
        *b = red - green;
    }
}

// Table G.1
fn forward_ict(planes: &mut [Vec<f32>]) {
    let [r, g, b] = planes else {
        return;
    };
    for ((r, g), b) in r.iter_mut().zip(g.iter_mut()).zip(b.iter_mut()) {
        let (red, green, blue) = (*r, *g, *b);
        *r = 0.299 * red + 0.587 * green + 0.114 * blue;
        *g = -0.168_736 * red - 0.331_264 * green + 0.5 * blue;
        *b = 0.5 * red - 0.418_688 * green - 0.081_312 * blue;
    }
}

fn precinct_states(components: &[J2kTileComponent]) -> PrecinctStates {
    components
        .iter()
        .map(|component| {
            component
                .resolutions
                .iter()
                .map(|resolution| {
                    (0..resolution.precinct_count())
                        .map(|p| {
                            let grids: Vec<(usize, usize)> = resolution
                                .subbands
                                .iter()
                                .map(|band| {
                                    let (columns, rows) = resolution.precinct_blocks(band, p);
                                    (columns.len(), rows.len())
                                })
                                .collect();
                            PrecinctState::new(&grids)
                        })
                        .collect()
                })
                .collect()
        })
        .collect()
}

fn codeblocks_mut(components: &mut [J2kTileComponent]) -> impl Iterator<Item = &mut J2kCodeBlock> {
    components
        .iter_mut()
        .flat_map(|component| component.subbands_mut())
        .flat_map(|band| band.codeblocks.iter_mut())
}

/// Appends the packets of `layer` in LRCP order, taking `passes(block)`
/// passes from each code-block (never fewer than earlier layers took).
fn layer_packets<F>(
    components: &[J2kTileComponent],
    states: &mut PrecinctStates,
    layer: usize,
    passes: F,
    out: &mut Vec<u8>,
) where
    F: Fn(&J2kCodeBlock) -> usize,
{
    let resolutions = components.iter().map(|c| c.resolutions.len()).max().unwrap_or(0);
    for r in 0..resolutions {
        for (c, component) in components.iter().enumerate() {
            let Some(resolution) = component.resolutions.get(r) else {
                continue;
            };
            for p in 0..resolution.precinct_count() {
                let contributions: Vec<Vec<Contribution<'_>>> = resolution
                    .subbands
                    .iter()
                    .map(|band| {
                        let (columns, rows) = resolution.precinct_blocks(band, p);
                        let wide = band.blocks_wide;
                        rows.flat_map(|y| columns.clone().map(move |x| y * wide + x))
                            .map(|i| contribution(band, &band.codeblocks[i], layer, &passes))
                            .collect()
                    })
                    .collect();
                out.extend(encode_packet(&mut states[c][r][p], layer, &contributions));
            }
        }
    }
}

fn contribution<'a, F>(band: &J2kSubband, block: &'a J2kCodeBlock, layer: usize, passes: &F) -> Contribution<'a>
where
    F: Fn(&J2kCodeBlock) -> usize,
{
    let before = block.passes_before(layer);
    let now = passes(block).max(before);
    Contribution {
        zero_bit_planes: u32::from(band.magnitude_bits.saturating_sub(block.encoding.magnitude_bits)),
        new_passes: now - before,
        bytes: &block.encoding.data[block.rate_of(before)..block.rate_of(now)],
    }
}

/// Chooses how many passes each code-block adds in `layer` so the layer's
/// packets fit `target` bytes, by bisection on the rate-distortion slope.
/// Without a target every remaining pass is included.
fn allocate_layer(components: &mut [J2kTileComponent], states: &PrecinctStates, layer: usize, target: Option<usize>) {
    let lambda = target.map(|target| {
        let size = |lambda: f64| {
            let mut trial = states.clone();
            let mut out = Vec::new();
            layer_packets(components, &mut trial, layer, |b| b.truncation(lambda), &mut out);
            out.len()
        };
        if size(0.0) <= target {
            return 0.0;
        }

        let steepest = components
            .iter()
            .flat_map(|c| c.subbands())
            .flat_map(|b| b.codeblocks.iter())
            .flat_map(|b| b.hull.iter())
            .map(|point| point.slope)
            .filter(|slope| slope.is_finite())
            .fold(0.0f64, f64::max);
        let (mut lo, mut hi) = (0.0, steepest * 2.0 + 1.0);
        for _ in 0..BISECTION_STEPS {
            let mid = 0.5 * (lo + hi);
            if size(mid) <= target {
                hi = mid;
            } else {
                lo = mid;
            }
        }
        hi
    });

    for block in codeblocks_mut(components) {
        let before = block.passes_before(layer);
        let passes = match lambda {
            Some(lambda) => block.truncation(lambda),
            None => block.encoding.passes.len(),
        };
        block.layer_passes.push(passes.max(before));
    }
}
