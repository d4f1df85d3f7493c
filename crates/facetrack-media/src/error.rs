//! Error types for media operations.

use facetrack_models::{CoordsError, OptionsError};
use std::path::PathBuf;
use thiserror::Error;

/// Result type for media operations.
pub type MediaResult<T> = Result<T, MediaError>;

/// Errors that can occur while reading, detecting or writing.
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Confidence {value} not in range [{min}, 1]")]
    ConfidenceOutOfRange { value: f32, min: f32 },

    #[error("Invalid buffer size: {0}")]
    InvalidBufferSize(usize),

    #[error("Invalid buffer overlap {overlap}: must be lower than buffer size {size}")]
    InvalidOverlap { overlap: usize, size: usize },

    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Model not found: {0}")]
    ModelNotFound(PathBuf),

    #[error("Model {path} has extension '{found}', expected '{expected}'")]
    BadModelExtension {
        path: PathBuf,
        expected: String,
        found: String,
    },

    #[error("Model could not be loaded: {0}")]
    ModelLoad(String),

    #[error("No model loaded")]
    ModelNotLoaded,

    #[error("Video could not be read: {0}")]
    VideoRead(String),

    #[error("Video could not be written: {0}")]
    VideoWrite(String),

    #[error("No buffer loaded")]
    NoBufferLoaded,

    #[error("Frame index {index} out of buffer range [{begin}, {end}]")]
    IndexOutOfRange { index: usize, begin: usize, end: usize },

    #[error("{0} not yet computed for the current buffer")]
    NotYetComputed(&'static str),

    #[error("Coordinates error: {0}")]
    Coords(#[from] CoordsError),

    #[error(transparent)]
    Options(#[from] OptionsError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("Face detection failed: {0}")]
    DetectionFailed(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl MediaError {
    /// Create a detection failure error.
    pub fn detection_failed(message: impl Into<String>) -> Self {
        Self::DetectionFailed(message.into())
    }

    /// Create a model not found error.
    pub fn model_not_found(path: impl Into<PathBuf>) -> Self {
        Self::ModelNotFound(path.into())
    }

    /// Create a model loading error.
    pub fn model_load(message: impl Into<String>) -> Self {
        Self::ModelLoad(message.into())
    }

    /// Create a video read error.
    pub fn video_read(message: impl Into<String>) -> Self {
        Self::VideoRead(message.into())
    }

    /// Create a video write error.
    pub fn video_write(message: impl Into<String>) -> Self {
        Self::VideoWrite(message.into())
    }

    /// Create an invalid parameter error.
    pub fn invalid_parameter(message: impl Into<String>) -> Self {
        Self::InvalidParameter(message.into())
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }
}

#[cfg(feature = "opencv")]
impl From<opencv::Error> for MediaError {
    fn from(e: opencv::Error) -> Self {
        Self::DetectionFailed(format!("OpenCV: {e}"))
    }
}
