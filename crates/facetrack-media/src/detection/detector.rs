//! Object detector contract shared by the concrete detectors.

use super::detection_set::{DetectionSet, DEFAULT_OVERLAP_PCT};
use crate::error::{MediaError, MediaResult};
use facetrack_models::BoundingBox;
use image::RgbImage;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default minimum box size, as a ratio of the image size.
pub const DEFAULT_MIN_RATIO: f32 = 0.05;

/// Default minimum confidence.
pub const DEFAULT_MIN_SCORE: f32 = 0.18;

/// Size and confidence thresholds of a detector.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DetectorSettings {
    /// Detected width and height must exceed this ratio of the image size
    pub min_ratio: f32,
    /// Detections must score strictly above this value
    pub min_score: f32,
}

impl Default for DetectorSettings {
    fn default() -> Self {
        Self {
            min_ratio: DEFAULT_MIN_RATIO,
            min_score: DEFAULT_MIN_SCORE,
        }
    }
}

fn check_unit(name: &str, value: f32) -> MediaResult<f32> {
    if !(0.0..=1.0).contains(&value) {
        return Err(MediaError::invalid_parameter(format!(
            "{name}={value} is not in range [0, 1]"
        )));
    }
    Ok(value)
}

impl DetectorSettings {
    pub fn set_min_ratio(&mut self, value: f32) -> MediaResult<()> {
        self.min_ratio = check_unit("min_ratio", value)?;
        Ok(())
    }

    pub fn set_min_score(&mut self, value: f32) -> MediaResult<()> {
        self.min_score = check_unit("min_score", value)?;
        Ok(())
    }

    /// Whether a box is large enough for an image of the given size.
    pub fn is_large_enough(&self, bbox: &BoundingBox, width: u32, height: u32) -> bool {
        bbox.w() as f32 > self.min_ratio * width as f32
            && bbox.h() as f32 > self.min_ratio * height as f32
    }
}

/// Check a model path against the expected extension and its existence.
pub fn check_model_path(path: &Path, expected: &str) -> MediaResult<()> {
    let found = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    let expected = expected.trim_start_matches('.');
    if found != expected {
        return Err(MediaError::BadModelExtension {
            path: path.to_path_buf(),
            expected: expected.to_string(),
            found,
        });
    }
    if !path.is_file() {
        return Err(MediaError::model_not_found(path));
    }
    Ok(())
}

/// A detector wrapping exactly one trained model.
///
/// `detect()` replaces the previous results with a set sorted by descending
/// confidence; the provided methods query and filter that set.
pub trait ObjectDetector: Send {
    /// Model file extension handled by this detector, without the dot.
    fn extension(&self) -> &'static str;

    /// Load a model, validating its extension and companion files.
    fn load_model(&mut self, path: &Path) -> MediaResult<()>;

    fn is_loaded(&self) -> bool;

    /// Detect objects in an image, replacing the previous results.
    fn detect(&mut self, image: &RgbImage) -> MediaResult<()>;

    fn detections(&self) -> &DetectionSet;

    fn detections_mut(&mut self) -> &mut DetectionSet;

    fn settings(&self) -> &DetectorSettings;

    fn settings_mut(&mut self) -> &mut DetectorSettings;

    fn min_score(&self) -> f32 {
        self.settings().min_score
    }

    fn set_min_score(&mut self, value: f32) -> MediaResult<()> {
        self.settings_mut().set_min_score(value)
    }

    fn min_ratio(&self) -> f32 {
        self.settings().min_ratio
    }

    fn set_min_ratio(&mut self, value: f32) -> MediaResult<()> {
        self.settings_mut().set_min_ratio(value)
    }

    /// Number of current detections.
    fn len(&self) -> usize {
        self.detections().len()
    }

    fn is_empty(&self) -> bool {
        self.detections().is_empty()
    }

    /// Best detection, `None` when nothing was detected.
    fn best(&self) -> Option<BoundingBox> {
        self.detections().best()
    }

    /// Copies of the `n` best detections padded with `None`.
    fn get_best(&self, n: usize) -> Option<Vec<Option<BoundingBox>>> {
        self.detections().get_best(n)
    }

    /// Copies of the detections scoring strictly above `confidence`.
    ///
    /// `confidence` must lie in `[min_score, 1]`.
    fn get_confidence(&self, confidence: f32) -> MediaResult<Vec<BoundingBox>> {
        check_confidence(confidence, self.min_score())?;
        Ok(self.detections().above(confidence))
    }

    /// Keep the `n` best detections.
    fn filter_best(&mut self, n: usize) {
        self.detections_mut().filter_best(n);
    }

    /// Keep detections scoring strictly above `confidence`.
    fn filter_confidence(&mut self, confidence: f32) -> MediaResult<()> {
        check_confidence(confidence, self.min_score())?;
        self.detections_mut().filter_confidence(confidence);
        Ok(())
    }

    /// Remove duplicates among overlapping detections.
    fn filter_overlapped(&mut self, overlap_pct: f32) {
        self.detections_mut().filter_overlapped(overlap_pct);
    }

    /// [`filter_overlapped`](Self::filter_overlapped) at the default percentage.
    fn filter_overlapped_default(&mut self) {
        self.filter_overlapped(DEFAULT_OVERLAP_PCT);
    }
}

fn check_confidence(value: f32, min: f32) -> MediaResult<()> {
    if !(value >= min && value <= 1.0) {
        return Err(MediaError::ConfidenceOutOfRange { value, min });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_defaults_and_validation() {
        let mut s = DetectorSettings::default();
        assert_eq!(s.min_ratio, 0.05);
        assert_eq!(s.min_score, 0.18);
        assert!(s.set_min_score(1.2).is_err());
        assert!(s.set_min_ratio(-0.1).is_err());
        s.set_min_score(0.5).unwrap();
        assert_eq!(s.min_score, 0.5);
    }

    #[test]
    fn test_is_large_enough() {
        let s = DetectorSettings::default();
        let tiny = BoundingBox::new(0, 0, 5, 40).unwrap();
        let ok = BoundingBox::new(0, 0, 11, 6).unwrap();
        assert!(!s.is_large_enough(&tiny, 200, 100));
        assert!(ok.w() as f32 > 0.05 * 200.0);
        assert!(s.is_large_enough(&ok, 200, 100));
    }

    #[test]
    fn test_check_model_path() {
        let dir = tempfile::tempdir().unwrap();
        let model = dir.path().join("face.xml");
        std::fs::write(&model, "<opencv_storage/>").unwrap();

        assert!(check_model_path(&model, "xml").is_ok());
        assert!(check_model_path(&dir.path().join("FACE.XML"), ".xml").is_err());
        assert!(matches!(
            check_model_path(&model, "caffemodel"),
            Err(MediaError::BadModelExtension { .. })
        ));
        assert!(matches!(
            check_model_path(&dir.path().join("missing.xml"), "xml"),
            Err(MediaError::ModelNotFound(_))
        ));
    }
}
