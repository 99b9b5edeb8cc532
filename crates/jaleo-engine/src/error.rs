//! Error types.

use thiserror::Error;

/// Error type.
#[derive(Error, Debug)]
pub enum Error {
    /// Capture or render failure. Fatal to the stream loop, never to the process.
    #[error("Audio device error: {0}")]
    Device(String),

    /// Sound file could not be recognised or decoded.
    #[error("Unsupported audio format: {0}")]
    UnsupportedFormat(String),

    /// IO error (file open, bank persistence).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Rate ratio would produce an empty or undefined buffer.
    #[error("Invalid resample: ratio {ratio} on {len} samples")]
    InvalidResample { ratio: f64, len: usize },

    /// Sound slot index outside the bank.
    #[error("Invalid sound slot: {0}")]
    InvalidSlot(usize),

    /// Engine settings that cannot drive a pipeline.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Result alias.
pub type Result<T> = std::result::Result<T, Error>;

impl From<cpal::DevicesError> for Error {
    fn from(e: cpal::DevicesError) -> Self {
        Error::Device(format!("failed to enumerate devices: {e}"))
    }
}

impl From<cpal::DefaultStreamConfigError> for Error {
    fn from(e: cpal::DefaultStreamConfigError) -> Self {
        Error::Device(format!("no default stream config: {e}"))
    }
}

impl From<cpal::BuildStreamError> for Error {
    fn from(e: cpal::BuildStreamError) -> Self {
        Error::Device(format!("failed to build stream: {e}"))
    }
}

impl From<cpal::PlayStreamError> for Error {
    fn from(e: cpal::PlayStreamError) -> Self {
        Error::Device(format!("failed to play stream: {e}"))
    }
}

impl From<hound::Error> for Error {
    fn from(e: hound::Error) -> Self {
        match e {
            hound::Error::IoError(io) => Error::Io(io),
            other => Error::UnsupportedFormat(other.to_string()),
        }
    }
}

impl Error {
    pub fn is_device(&self) -> bool {
        matches!(self, Error::Device(_))
    }
}
