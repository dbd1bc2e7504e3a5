use thiserror::Error;

/// Failure kinds of an encode call.
///
/// The discriminant of every variant is the stable status code returned by
/// [`crate::encode_status`] and the C ABI, so callers can branch on the cause
/// without parsing messages. `0` is reserved for success and code `12` is
/// intentionally unassigned.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EncodeError {
    // Input shape errors
    #[error("The input array has an unsupported number of samples per pixel")]
    UnsupportedSampleCount = 1,
    #[error("An input array with the given dimensions is not supported")]
    UnsupportedRank = 2,
    #[error("The input array has an unsupported number of rows")]
    RowsOutOfRange = 3,
    #[error("The input array has an unsupported number of columns")]
    ColumnsOutOfRange = 4,

    // Input type errors
    #[error("The input array has an unsupported dtype")]
    UnsupportedDType = 5,
    #[error("The input array uses a byte order other than the native one")]
    UnsupportedByteOrder = 6,
    #[error("The input array must be C-style, contiguous and aligned")]
    NonContiguousBuffer = 7,

    // Option errors
    #[error("The value of 'bits_stored' must be between 1 and 16")]
    InvalidBitsStored = 8,
    #[error(
        "The value of the 'photometric_interpretation' parameter is not valid for the number of samples per pixel"
    )]
    IncompatibleColorSpace = 9,
    #[error("The value of the 'codec_format' parameter is invalid")]
    UnsupportedContainerFormat = 10,
    #[error("More than 100 quality layers were requested")]
    TooManyLayers = 11,
    #[error("Compression ratios must be real numbers between 1 and 100")]
    InvalidCompressionRatio = 13,

    // Resource errors
    #[error("Failed to create an empty image object")]
    ImageAllocationFailed = 21,
    #[error("Failed to set the encoding handler")]
    CodecCreationFailed = 22,
    #[error("Failed to set up the encoder")]
    EncoderSetupFailed = 23,
    #[error("Failed to create the output stream")]
    StreamCreationFailed = 24,

    // Protocol errors
    #[error("Failure result from 'start_compress()'")]
    CompressStartFailed = 25,
    #[error("Failure result from 'encode()'")]
    CompressRunFailed = 26,
    #[error("Failure result from 'end_compress()'")]
    CompressFinishFailed = 27,
}

impl EncodeError {
    pub const ALL: [EncodeError; 19] = [
        EncodeError::UnsupportedSampleCount,
        EncodeError::UnsupportedRank,
        EncodeError::RowsOutOfRange,
        EncodeError::ColumnsOutOfRange,
        EncodeError::UnsupportedDType,
        EncodeError::UnsupportedByteOrder,
        EncodeError::NonContiguousBuffer,
        EncodeError::InvalidBitsStored,
        EncodeError::IncompatibleColorSpace,
        EncodeError::UnsupportedContainerFormat,
        EncodeError::TooManyLayers,
        EncodeError::InvalidCompressionRatio,
        EncodeError::ImageAllocationFailed,
        EncodeError::CodecCreationFailed,
        EncodeError::EncoderSetupFailed,
        EncodeError::StreamCreationFailed,
        EncodeError::CompressStartFailed,
        EncodeError::CompressRunFailed,
        EncodeError::CompressFinishFailed,
    ];

    /// Integer status reported across the C ABI and by the CLI.
    pub const fn status_code(self) -> i32 {
        self as i32
    }

    /// Reverse lookup of [`EncodeError::status_code`].
    pub fn from_status_code(code: i32) -> Option<Self> {
        Self::ALL.into_iter().find(|e| e.status_code() == code)
    }
}
