//! Codec adapter errors.

use thiserror::Error;

/// Failure reading or writing an image file.
#[derive(Debug, Error)]
pub enum IoError {
    /// Opening or reading the file failed.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Neither the header nor the extension names a supported codec.
    /// Carries the file extension.
    #[error("no codec for '.{0}' files")]
    UnsupportedFormat(String),

    /// The codec rejected the file contents.
    #[error("{codec} decode failed: {message}")]
    Decode {
        /// Codec name.
        codec: &'static str,
        /// Codec message.
        message: String,
    },

    /// The PNG encoder failed.
    #[error("PNG encode failed: {0}")]
    Encode(String),

    /// Sample buffer length disagrees with width * height * channels.
    #[error("pixel buffer holds {actual} samples, {expected} expected")]
    DimensionMismatch {
        /// Expected sample count.
        expected: usize,
        /// Actual sample count.
        actual: usize,
    },

    /// Color type / bit depth combination the adapter does not expand.
    #[error("unsupported pixel layout: {0}")]
    UnsupportedLayout(String),
}

/// Result alias for codec operations.
pub type IoResult<T> = Result<T, IoError>;
