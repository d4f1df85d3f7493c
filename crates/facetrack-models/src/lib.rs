//! Shared data models for the face tracking pipeline.
//!
//! This crate contains serde-serializable types shared by the engine and the
//! command-line front end:
//! - [`BoundingBox`]: integer pixel rectangle with optional confidence
//! - [`FaceTrackingOptions`]: output and filtering options of a run

pub mod coords;
pub mod options;

pub use coords::{BoundingBox, CoordsError, MAX_H, MAX_W};
pub use options::{FaceTrackingOptions, OptionsError};
