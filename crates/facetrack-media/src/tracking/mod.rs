//! Face tracking over a sliding video window.

pub mod buffer;
pub mod persons;
pub mod pipeline;

pub use buffer::{FaceTrackingBuffer, Landmarks};
pub use persons::{anonymous_identity, PersonCatalogue, PersonEntry, PersonLabel, PersonMatcher};
pub use pipeline::{FaceTracker, TrackingSummary};
