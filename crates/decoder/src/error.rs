use std::fmt;
use std::io;

use model::{IntRect, IntSize};

#[derive(Debug)]
pub enum OpenError {
    Io {
        source_description: String,
        error: io::Error,
    },
    UnsupportedFormat {
        source_description: String,
        reason: Box<dyn std::error::Error + Send + Sync>,
    },
    EmptyImage {
        source_description: String,
    },
}

impl OpenError {
    pub fn unsupported(
        source_description: impl Into<String>,
        reason: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        OpenError::UnsupportedFormat {
            source_description: source_description.into(),
            reason: reason.into(),
        }
    }

    pub fn source_description(&self) -> &str {
        match self {
            OpenError::Io {
                source_description, ..
            }
            | OpenError::UnsupportedFormat {
                source_description, ..
            }
            | OpenError::EmptyImage { source_description } => source_description,
        }
    }
}

impl fmt::Display for OpenError {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OpenError::Io {
                source_description,
                error,
            } => write!(formatter, "failed to read {source_description}: {error}"),
            OpenError::UnsupportedFormat {
                source_description,
                reason,
            } => write!(
                formatter,
                "image format of {source_description} is not supported: {reason}"
            ),
            OpenError::EmptyImage { source_description } => {
                write!(formatter, "{source_description} has no pixels")
            }
        }
    }
}

impl std::error::Error for OpenError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            OpenError::Io { error, .. } => Some(error),
            OpenError::UnsupportedFormat { reason, .. } => Some(reason.as_ref()),
            OpenError::EmptyImage { .. } => None,
        }
    }
}

#[derive(Debug)]
pub enum DecodeError {
    /// The request was cancelled before or while decoding. Not a failure.
    Cancelled,
    Io(io::Error),
    EmptyRegion(IntRect),
    RegionOutOfBounds { region: IntRect, image_size: IntSize },
    Panicked(String),
}

impl DecodeError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, DecodeError::Cancelled)
    }
}

impl fmt::Display for DecodeError {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeError::Cancelled => write!(formatter, "decode cancelled"),
            DecodeError::Io(error) => write!(formatter, "failed to read region: {error}"),
            DecodeError::EmptyRegion(region) => {
                write!(formatter, "region {region:?} has no pixels")
            }
            DecodeError::RegionOutOfBounds { region, image_size } => write!(
                formatter,
                "region {region:?} is outside of the {image_size} image"
            ),
            DecodeError::Panicked(message) => write!(formatter, "decoder panicked: {message}"),
        }
    }
}

impl std::error::Error for DecodeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DecodeError::Io(error) => Some(error),
            _ => None,
        }
    }
}

impl From<io::Error> for DecodeError {
    fn from(error: io::Error) -> Self {
        DecodeError::Io(error)
    }
}
