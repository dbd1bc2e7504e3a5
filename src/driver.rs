//! Drives a [`Compressor`] through one encode and owns the resources it
//! needs while doing so.

use std::sync::Arc;

use crate::codec::{CodecError, CodecFactory, Compressor, MessageHandlers};
use crate::coding_parameters::CodingParameters;
use crate::error::EncodeError;
use crate::image::PlanarImage;
use crate::log::EncodeLog;
use crate::stream::{OutputStream, Sink};

/// Progress of one encode through the codec.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DriverState {
    /// The compressor handle exists.
    Created,
    /// Message handlers are installed and the encoder accepted its parameters.
    Configured,
    /// The output stream is bound to the sink.
    StreamBound,
    Started,
    Encoded,
    Finished,
    Failed,
}

/// Holds everything acquired for one encode and releases it on drop,
/// stream first, then codec, then image.
struct Session<'a> {
    log: Arc<dyn EncodeLog>,
    stream: Option<OutputStream<'a>>,
    codec: Option<Box<dyn Compressor + 'a>>,
    image: Option<PlanarImage>,
}

impl Session<'_> {
    fn new(log: Arc<dyn EncodeLog>) -> Self {
        Self {
            log,
            stream: None,
            codec: None,
            image: None,
        }
    }
}

impl Drop for Session<'_> {
    fn drop(&mut self) {
        if let Some(stream) = self.stream.take() {
            drop(stream);
            self.log.debug("released output stream");
        }
        if let Some(codec) = self.codec.take() {
            drop(codec);
            self.log.debug("released codec");
        }
        if let Some(image) = self.image.take() {
            drop(image);
            self.log.debug("released image");
        }
    }
}

pub struct CodecDriver<'f> {
    factory: &'f dyn CodecFactory,
    log: Arc<dyn EncodeLog>,
    state: Option<DriverState>,
}

impl<'f> CodecDriver<'f> {
    pub fn new(factory: &'f dyn CodecFactory, log: Arc<dyn EncodeLog>) -> Self {
        Self {
            factory,
            log,
            state: None,
        }
    }

    /// Last state reached, `None` before [`CodecDriver::run`].
    pub fn state(&self) -> Option<DriverState> {
        self.state
    }

    /// Encodes `image` into `sink`. The image is consumed and released
    /// together with the codec and stream whatever the outcome.
    pub fn run(
        &mut self,
        image: PlanarImage,
        parameters: &CodingParameters,
        sink: &mut dyn Sink,
    ) -> Result<(), EncodeError> {
        let mut session = Session::new(Arc::clone(&self.log));
        let image: &PlanarImage = session.image.insert(image);

        let codec = match self.factory.create_compress(parameters.codec_format) {
            Some(codec) => session.codec.insert(codec),
            None => return Err(self.fail(EncodeError::CodecCreationFailed, None)),
        };
        self.advance(DriverState::Created);

        codec.set_message_handlers(MessageHandlers::new(Arc::clone(&self.log)));
        codec
            .setup_encoder(parameters, image)
            .map_err(|e| self.fail(EncodeError::EncoderSetupFailed, Some(e)))?;
        self.advance(DriverState::Configured);

        let stream = match OutputStream::new(sink) {
            Ok(stream) => session.stream.insert(stream),
            Err(e) => return Err(self.fail(e, None)),
        };
        self.advance(DriverState::StreamBound);

        codec
            .start_compress(image, stream)
            .map_err(|e| self.fail(EncodeError::CompressStartFailed, Some(e)))?;
        self.advance(DriverState::Started);

        codec
            .encode(stream)
            .map_err(|e| self.fail(EncodeError::CompressRunFailed, Some(e)))?;
        self.advance(DriverState::Encoded);

        codec
            .end_compress(stream)
            .and_then(|()| stream.flush().map_err(CodecError::from))
            .map_err(|e| self.fail(EncodeError::CompressFinishFailed, Some(e)))?;
        self.advance(DriverState::Finished);

        Ok(())
    }

    fn advance(&mut self, state: DriverState) {
        self.state = Some(state);
    }

    fn fail(&mut self, error: EncodeError, cause: Option<CodecError>) -> EncodeError {
        self.state = Some(DriverState::Failed);
        if let Some(cause) = cause {
            self.log.debug(&format!("{error}: {cause}"));
        }
        error
    }
}
