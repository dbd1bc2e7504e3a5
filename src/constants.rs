/// Largest accepted number of rows or columns (SIZ stores them as 32 bit, the
/// encoding interface caps them at 16 bit).
pub const MAX_DIMENSION: usize = 65535;
pub const MIN_DIMENSION: usize = 1;

pub const MIN_BITS_STORED: u8 = 1;
pub const MAX_BITS_STORED: u8 = 16;

/// Largest number of quality layers a lossy encode may request.
pub const MAX_LAYERS: usize = 100;

pub const MIN_COMPRESSION_RATIO: f64 = 1.0;
pub const MAX_COMPRESSION_RATIO: f64 = 100.0;

// Samples per pixel accepted for rank 3 input, besides the implicit 1 of rank 2.
pub const SUPPORTED_SAMPLE_COUNTS: [usize; 2] = [3, 4];

/// Initial capacity of the buffered output stream in bytes.
pub const STREAM_BUFFER_SIZE: usize = 1024 * 1024;

// Encoder defaults, ISO/IEC 15444-1 Annex A.
pub const DEFAULT_NUMBER_OF_RESOLUTIONS: u8 = 6;
pub const MAX_NUMBER_OF_RESOLUTIONS: u8 = 33;
pub const CODEBLOCK_SIZE: usize = 64;
pub const CODEBLOCK_EXPONENT: u8 = 6;
pub const GUARD_BITS: u8 = 2;

/// Comment written into every codestream (COM marker, Latin-1 registration).
pub const CREATOR_COMMENT: &str = concat!("Created by j2karray-rs ", env!("CARGO_PKG_VERSION"));

/// Target used for every event emitted by the default tracing logger.
pub const LOG_TARGET: &str = "j2karray::encode";
