//! Packet assembly (ISO/IEC 15444-1 B.9 and B.10).

use super::bit_io::J2kBitWriter;
use super::tag_tree::TagTree;

/// Coding state of one code-block carried from layer to layer.
#[derive(Debug, Clone, Default)]
pub struct CodeBlockState {
    /// Passes already sent in earlier layers.
    pub passes_sent: usize,
    /// `Lblock`, the base number of bits of the length field.
    pub length_bits: u32,
}

/// The code-blocks of one subband that fall inside a precinct.
#[derive(Debug, Clone)]
pub struct PrecinctBand {
    inclusion_tree: TagTree,
    zero_bp_tree: TagTree,
    blocks: Vec<CodeBlockState>,
}

impl PrecinctBand {
    pub fn new(w: usize, h: usize) -> Self {
        let mut band = Self {
            inclusion_tree: TagTree::new(w, h),
            zero_bp_tree: TagTree::new(w, h),
            blocks: vec![CodeBlockState::default(); w * h],
        };
        band.reset();
        band
    }

    pub fn reset(&mut self) {
        self.inclusion_tree.reset();
        self.zero_bp_tree.reset();
        self.blocks.fill(CodeBlockState::default());
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }
}

/// Tag trees and per-block state of a precinct, one entry per subband of
/// its resolution. Cloning it lets rate control try a layer without
/// committing to it.
#[derive(Debug, Clone)]
pub struct PrecinctState {
    pub bands: Vec<PrecinctBand>,
}

impl PrecinctState {
    /// `grids` holds the code-block columns and rows of each subband.
    pub fn new(grids: &[(usize, usize)]) -> Self {
        Self {
            bands: grids.iter().map(|&(w, h)| PrecinctBand::new(w, h)).collect(),
        }
    }
}

/// What a code-block adds to the current packet.
#[derive(Debug, Clone, Copy, Default)]
pub struct Contribution<'a> {
    /// `Mb` minus the number of coded magnitude bit-planes.
    pub zero_bit_planes: u32,
    /// Coding passes new in this layer.
    pub new_passes: usize,
    /// Codeword bytes of those passes.
    pub bytes: &'a [u8],
}

/// Encodes the packet of `layer` for one precinct. `contributions` mirrors
/// `state.bands`, one entry per code-block in raster order. Returns header
/// and body.
pub fn encode_packet(state: &mut PrecinctState, layer: usize, contributions: &[Vec<Contribution<'_>>]) -> Vec<u8> {
    if layer == 0 {
        for (band, blocks) in state.bands.iter_mut().zip(contributions) {
            band.reset();
            for (i, block) in blocks.iter().enumerate() {
                band.zero_bp_tree.set_value(i, block.zero_bit_planes as i32);
            }
        }
    }

    let empty = contributions.iter().flatten().all(|block| block.new_passes == 0);

    let mut writer = J2kBitWriter::new();
    writer.write_bit(u8::from(!empty));

    if !empty {
        for (band, blocks) in state.bands.iter_mut().zip(contributions) {
            for (i, block) in blocks.iter().enumerate() {
                if band.blocks[i].passes_sent == 0 && block.new_passes > 0 {
                    band.inclusion_tree.set_value(i, layer as i32);
                }
            }

            for (i, block) in blocks.iter().enumerate() {
                let first_inclusion = band.blocks[i].passes_sent == 0;
                if first_inclusion {
                    band.inclusion_tree.encode(&mut writer, i, layer as i32 + 1);
                } else {
                    writer.write_bit(u8::from(block.new_passes > 0));
                }
                if block.new_passes == 0 {
                    continue;
                }

                let cblk = &mut band.blocks[i];
                if first_inclusion {
                    cblk.length_bits = 3;
                    band.zero_bp_tree.encode(&mut writer, i, 999);
                }
                write_pass_count(&mut writer, block.new_passes);

                // one codeword segment per contribution
                let length = block.bytes.len() as u32;
                let pass_bits = floor_log2(block.new_passes as u32);
                let needed = floor_log2(length) + 1;
                let increment = needed.saturating_sub(cblk.length_bits + pass_bits);
                writer.write_comma_code(increment);
                cblk.length_bits += increment;
                writer.write_bits(length, cblk.length_bits + pass_bits);
                cblk.passes_sent += block.new_passes;
            }
        }
    }

    let mut packet = writer.finish();
    for block in contributions.iter().flatten() {
        packet.extend_from_slice(block.bytes);
    }
    packet
}

// Table B.4
fn write_pass_count(writer: &mut J2kBitWriter, n: usize) {
    let n = n as u32;
    match n {
        1 => writer.write_bit(0),
        2 => writer.write_bits(0b10, 2),
        3..=5 => writer.write_bits(0xC | (n - 3), 4),
        6..=36 => writer.write_bits(0x1E0 | (n - 6), 9),
        _ => writer.write_bits(0xFF80 | (n - 37), 16),
    }
}

fn floor_log2(value: u32) -> u32 {
    value.checked_ilog2().unwrap_or(0)
}
