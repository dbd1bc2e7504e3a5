//! Encodes raw sample arrays (numpy style: rank 2 or 3, 8 or 16 bit
//! integers) as JPEG 2000 codestreams or JP2 files.
//!
//! An encode runs four stages: the [`SourceBuffer`] is validated, the
//! [`EncodeOptions`] are resolved against it, the samples are marshalled into
//! a [`PlanarImage`], and a [`CodecDriver`] runs a compressor over a [`Sink`].
//! Every failure maps onto a stable status code, see [`EncodeError`].
//!
//! ```no_run
//! use std::io::Cursor;
//! use j2karray_rs::{encode, EncodeOptions, SourceBuffer};
//!
//! let pixels: [u8; 4] = [0, 255, 128, 64];
//! let source = SourceBuffer::from_samples(&pixels, &[2, 2]);
//! let mut sink = Cursor::new(Vec::new());
//! encode(&source, &mut sink, &EncodeOptions::default()).unwrap();
//! ```

pub mod codec;
pub mod coding_parameters;
pub mod constants;
pub mod driver;
pub mod error;
#[cfg(feature = "ffi")]
pub mod ffi;
pub mod image;
pub mod jpeg2000;
pub mod jpeg_marker_code;
pub mod log;
pub mod options;
pub mod source;
pub mod stream;

use std::sync::Arc;

pub use codec::{CodecError, CodecFactory, Compressor, MessageHandlers};
pub use coding_parameters::{CodingParameters, CompressionMode, ResolvedParameters};
pub use driver::{CodecDriver, DriverState};
pub use error::EncodeError;
pub use image::{ImageComponent, PlanarImage};
pub use jpeg2000::NativeCodec;
pub use log::{EncodeLog, LogLevel, MemoryLog, TracingLog};
pub use options::{ContainerFormat, EncodeOptions, PhotometricInterpretation};
pub use source::{ByteOrder, DType, Geometry, SourceBuffer};
pub use stream::{OutputStream, Sink};

/// Encodes `source` into `sink` with the native codec, logging through
/// `tracing`.
///
/// On error the sink may hold a partial stream and must be discarded.
pub fn encode(
    source: &SourceBuffer<'_>,
    sink: &mut dyn Sink,
    options: &EncodeOptions,
) -> Result<ResolvedParameters, EncodeError> {
    encode_with(source, sink, options, &NativeCodec, Arc::new(TracingLog))
}

/// Same as [`encode`] with an explicit codec and log.
///
/// A failure is reported once on the error channel of `log` before it is
/// returned.
pub fn encode_with(
    source: &SourceBuffer<'_>,
    sink: &mut dyn Sink,
    options: &EncodeOptions,
    factory: &dyn CodecFactory,
    log: Arc<dyn EncodeLog>,
) -> Result<ResolvedParameters, EncodeError> {
    let result = run_pipeline(source, sink, options, factory, &log);
    if let Err(error) = &result {
        log.error(&error.to_string());
    }
    result
}

fn run_pipeline(
    source: &SourceBuffer<'_>,
    sink: &mut dyn Sink,
    options: &EncodeOptions,
    factory: &dyn CodecFactory,
    log: &Arc<dyn EncodeLog>,
) -> Result<ResolvedParameters, EncodeError> {
    let geometry = source.validate()?;
    let parameters = ResolvedParameters::resolve(&geometry, source.dtype(), options, log.as_ref())?;
    let image = PlanarImage::from_source(source, &geometry, &parameters)?;

    let coding = CodingParameters::from(&parameters);
    CodecDriver::new(factory, Arc::clone(log)).run(image, &coding, sink)?;
    Ok(parameters)
}

/// [`encode`] reduced to its integer status: `0` on success, otherwise
/// [`EncodeError::status_code`].
pub fn encode_status(source: &SourceBuffer<'_>, sink: &mut dyn Sink, options: &EncodeOptions) -> i32 {
    match encode(source, sink, options) {
        Ok(_) => 0,
        Err(error) => error.status_code(),
    }
}
