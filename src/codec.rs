//! The boundary between the pipeline and a JPEG 2000 compressor.
//!
//! The driver only talks to [`CodecFactory`] and [`Compressor`]; the native
//! engine in [`crate::jpeg2000`] is one implementation, test doubles are
//! another.

use std::fmt;
use std::io;
use std::sync::Arc;

use thiserror::Error;

use crate::coding_parameters::CodingParameters;
use crate::image::PlanarImage;
use crate::log::{EncodeLog, LogLevel};
use crate::options::ContainerFormat;
use crate::stream::OutputStream;

/// Failure reported by a compressor. The driver maps it onto the status of
/// the phase that produced it.
#[derive(Error, Debug)]
pub enum CodecError {
    #[error("output stream error: {0}")]
    Io(#[from] io::Error),
    #[error("{0}")]
    Rejected(String),
}

/// Message callbacks installed into a compressor before setup.
#[derive(Clone)]
pub struct MessageHandlers {
    log: Arc<dyn EncodeLog>,
}

impl MessageHandlers {
    pub fn new(log: Arc<dyn EncodeLog>) -> Self {
        Self { log }
    }

    pub fn info(&self, message: &str) {
        self.log.info(message);
    }

    pub fn warning(&self, message: &str) {
        self.log.warning(message);
    }

    pub fn error(&self, message: &str) {
        self.log.error(message);
    }
}

struct Discard;

impl EncodeLog for Discard {
    fn log(&self, _level: LogLevel, _message: &str) {}
}

impl Default for MessageHandlers {
    fn default() -> Self {
        Self::new(Arc::new(Discard))
    }
}

impl fmt::Debug for MessageHandlers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageHandlers").finish_non_exhaustive()
    }
}

/// One compression session.
///
/// Methods are called at most once each, in declaration order; the first
/// error ends the session.
pub trait Compressor {
    fn set_message_handlers(&mut self, handlers: MessageHandlers);

    /// Validates `parameters` against the image and prepares the encoder.
    fn setup_encoder(&mut self, parameters: &CodingParameters, image: &PlanarImage) -> Result<(), CodecError>;

    /// Takes the samples of `image` and writes everything before the tile data.
    fn start_compress(&mut self, image: &PlanarImage, stream: &mut OutputStream<'_>) -> Result<(), CodecError>;

    /// Writes the tile data.
    fn encode(&mut self, stream: &mut OutputStream<'_>) -> Result<(), CodecError>;

    /// Writes the trailer, completes any reserved headers and flushes.
    fn end_compress(&mut self, stream: &mut OutputStream<'_>) -> Result<(), CodecError>;
}

/// Creates compressors for a container format.
pub trait CodecFactory {
    /// `None` when no compressor can be created for `format`.
    fn create_compress(&self, format: ContainerFormat) -> Option<Box<dyn Compressor + '_>>;
}
