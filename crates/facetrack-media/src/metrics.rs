//! Metrics recorded by the tracking pipeline.
//!
//! Recording is a no-op until the binary installs a recorder.

use metrics::{counter, histogram};

/// Metric names as constants for consistency.
pub mod names {
    pub const FRAMES_PROCESSED_TOTAL: &str = "facetrack_frames_processed_total";
    pub const FACES_DETECTED_TOTAL: &str = "facetrack_faces_detected_total";
    pub const LANDMARK_FAILURES_TOTAL: &str = "facetrack_landmark_failures_total";
    pub const WINDOWS_PROCESSED_TOTAL: &str = "facetrack_windows_processed_total";
    pub const WINDOW_DURATION_SECONDS: &str = "facetrack_window_duration_seconds";
}

/// Record face detection over one window.
pub fn record_detection(frames: usize, faces: usize) {
    counter!(names::FRAMES_PROCESSED_TOTAL).increment(frames as u64);
    counter!(names::FACES_DETECTED_TOTAL).increment(faces as u64);
}

/// Record a landmark estimation failure for one face.
pub fn record_landmark_failure() {
    counter!(names::LANDMARK_FAILURES_TOTAL).increment(1);
}

/// Record one fully processed window.
pub fn record_window(duration_secs: f64) {
    counter!(names::WINDOWS_PROCESSED_TOTAL).increment(1);
    histogram!(names::WINDOW_DURATION_SECONDS).record(duration_secs);
}
