#![deny(unreachable_patterns)]
//! Face tracking over buffered video.
//!
//! This crate provides:
//! - Sliding-window video buffering with frame overlap
//! - Haar cascade and Caffe DNN face detectors, merged by a composite detector
//! - Landmark estimation and person identity assignment per detected face
//! - CSV, tagged video, per-person video and image folder outputs
//!
//! OpenCV collaborators are compiled with the `opencv` feature; LBF
//! landmarks additionally need `facemark`.

pub mod config;
pub mod detection;
pub mod error;
pub mod image_utils;
pub mod metrics;
pub mod output;
pub mod tracking;
pub mod video;

#[cfg(test)]
pub(crate) mod testing;

pub use config::TrackerConfig;
pub use detection::{
    CompositeDetector, DetectionSet, HaarCascadeDetector, LandmarkDetector, NeuralNetDetector,
    ObjectDetector,
};
pub use error::{MediaError, MediaResult};
pub use output::{read_csv, ResultWriter};
pub use tracking::{
    FaceTracker, FaceTrackingBuffer, PersonCatalogue, PersonLabel, PersonMatcher, TrackingSummary,
};
pub use video::{MemoryVideoReader, VideoBuffer, VideoReader, VideoSink, VideoSinkFactory};

pub use facetrack_models::{BoundingBox, FaceTrackingOptions};
