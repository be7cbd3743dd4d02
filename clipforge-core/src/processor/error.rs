use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProcessorError {
    #[error("unsupported container: {0}")]
    UnsupportedContainer(String),
    #[error("failed to decode {path}: {reason}")]
    DecodeFailure { path: PathBuf, reason: String },
    #[error("{path} has no audio track")]
    NoAudioTrack { path: PathBuf },
    #[error("encode failed: {0}")]
    EncodeFailure(String),
    #[error("media tool not found: {0}")]
    ToolMissing(PathBuf),
    #[error("media command timed out after {0:?}")]
    Timeout(Duration),
    #[error("io error at {path}: {source}")]
    Io {
        source: std::io::Error,
        path: PathBuf,
    },
    #[error("image processing error: {0}")]
    Image(String),
    #[error("archive error: {0}")]
    Archive(String),
    #[error("archive already contains an entry named {0}")]
    DuplicateEntry(String),
    #[error("invalid clip: {0}")]
    InvalidClip(String),
    #[error("{part} failed: {source}")]
    PartFailed {
        part: String,
        #[source]
        source: Box<ProcessorError>,
    },
}

impl ProcessorError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ProcessorError::Io {
            path: path.into(),
            source,
        }
    }

    /// Unwraps `PartFailed` down to the error that stopped the part.
    pub fn root(&self) -> &ProcessorError {
        match self {
            ProcessorError::PartFailed { source, .. } => source.root(),
            other => other,
        }
    }
}

impl From<std::io::Error> for ProcessorError {
    fn from(source: std::io::Error) -> Self {
        ProcessorError::Io {
            path: PathBuf::new(),
            source,
        }
    }
}

impl From<image::ImageError> for ProcessorError {
    fn from(error: image::ImageError) -> Self {
        ProcessorError::Image(error.to_string())
    }
}

impl From<hound::Error> for ProcessorError {
    fn from(error: hound::Error) -> Self {
        ProcessorError::EncodeFailure(format!("wav: {error}"))
    }
}

impl From<zip::result::ZipError> for ProcessorError {
    fn from(error: zip::result::ZipError) -> Self {
        ProcessorError::Archive(error.to_string())
    }
}

pub type ProcessorResult<T> = Result<T, ProcessorError>;
