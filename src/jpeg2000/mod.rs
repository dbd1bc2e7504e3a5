//! JPEG 2000 Implementation (Part 1, ISO/IEC 15444-1), encoder side.
//!
//! This module contains the native compressor behind [`NativeCodec`].
//! It is divided into several sub-modules handling different aspects of the codec:
//!
//! - `writer` / `jp2`: Codestream marker segments and the JP2 box wrapper.
//! - `packet`: Packet headers and bodies (Tier-2 coding).
//! - `tag_tree` / `bit_io`: Tag trees and the bit writer used in packet headers.
//! - `image`: Tile-component geometry: resolutions, subbands, precincts, code-blocks.
//! - `mq_coder`: The MQ Arithmetic Coder (Tier-1 Coding).
//! - `bit_plane_coder`: Context modeling and bit-plane coding (Tier-1 Coding).
//! - `dwt`: Discrete Wavelet Transform (5-3 and 9-7).
//! - `quantization`: Scalar quantization and subband norms.
//! - `encoder`: The compressor tying the stages together, with rate control.

pub mod bit_io;
pub mod bit_plane_coder;
pub mod dwt;
pub mod encoder;
pub mod image;
pub mod jp2;
pub mod mq_coder;
pub mod packet;
pub mod quantization;
pub mod tag_tree;
pub mod writer;

use crate::codec::{CodecFactory, Compressor};
use crate::options::ContainerFormat;
use encoder::J2kEncoder;

/// Factory for the built-in compressor. Supports both container formats.
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeCodec;

impl CodecFactory for NativeCodec {
    fn create_compress(&self, format: ContainerFormat) -> Option<Box<dyn Compressor + '_>> {
        Some(Box::new(J2kEncoder::new(format)))
    }
}
