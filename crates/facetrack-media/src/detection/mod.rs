//! Face and landmark detection.
//!
//! This module provides:
//! - [`ObjectDetector`]: contract of a detector wrapping one trained model
//! - [`HaarCascadeDetector`] (`.xml`) and [`NeuralNetDetector`] (`.caffemodel`)
//! - [`CompositeDetector`]: runs several detectors and merges their results
//! - [`LandmarkDetector`]: facial landmarks on cropped faces
//! - [`portrait`]: head-and-shoulders reframing of face boxes

pub mod composite;
pub mod detection_set;
pub mod detector;
pub mod dnn;
pub mod haar;
pub mod landmarks;
pub mod portrait;

pub use composite::{CompositeDetector, DetectorFactory, DetectorRegistry};
pub use detection_set::{DetectionSet, DEFAULT_OVERLAP_PCT};
pub use detector::{DetectorSettings, ObjectDetector, DEFAULT_MIN_RATIO, DEFAULT_MIN_SCORE};
pub use dnn::{NetBackend, NeuralNetDetector};
pub use haar::{normalize_weights, CascadeBackend, HaarCascadeDetector};
pub use landmarks::{load_landmark_detector, LandmarkDetector};
pub use portrait::{to_portrait, to_portraits};
