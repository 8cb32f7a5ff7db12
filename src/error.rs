use std::{error, fmt, io};

// -------------------------------------------------------------------------------------------------

/// Provides an enumeration of all possible errors reported by drifters.
#[derive(Debug)]
#[allow(clippy::enum_variant_names)]
pub enum Error {
    SampleLoadError(Box<dyn error::Error + Send + Sync>),
    SampleTooShort(usize),
    ParameterError(String),
    SendError(String),
    IoError(io::Error),
}

impl error::Error for Error {}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SampleLoadError(err) => write!(f, "Failed to load sample: {err}"),
            Self::SampleTooShort(frames) => {
                write!(f, "Sample is too short to play grains: {frames} frames")
            }
            Self::ParameterError(str) => write!(f, "Invalid parameter: {str}"),
            Self::SendError(str) => write!(f, "Failed to send engine message: {str}"),
            Self::IoError(err) => err.fmt(f),
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Error {
        Error::IoError(err)
    }
}

#[cfg(feature = "wav-file")]
impl From<hound::Error> for Error {
    fn from(err: hound::Error) -> Error {
        match err {
            hound::Error::IoError(err) => Error::IoError(err),
            _ => Error::SampleLoadError(Box::new(err)),
        }
    }
}
