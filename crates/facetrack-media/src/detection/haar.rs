//! Haar cascade face detector.
//!
//! The cascade classifier already merges neighbouring hits, so this detector
//! does not run the overlap filter. Its raw level weights are rescaled into
//! `[min_score, 0.998]` so they can be compared with other detectors.

use super::detection_set::DetectionSet;
use super::detector::{check_model_path, DetectorSettings, ObjectDetector};
use crate::error::{MediaError, MediaResult};
use facetrack_models::BoundingBox;
use image::RgbImage;
use std::path::Path;
use tracing::{debug, info};

/// Highest confidence assigned to a cascade hit.
pub const MAX_CASCADE_SCORE: f32 = 0.998;

/// Relative margin applied to the weight range before rescaling.
const WEIGHT_MARGIN: f64 = 0.05;

/// Raw cascade classifier.
pub trait CascadeBackend: Send {
    /// Detect regions at least `min_size` large, with their level weight.
    fn detect_multi_scale(
        &mut self,
        image: &RgbImage,
        min_size: (u32, u32),
    ) -> MediaResult<Vec<(BoundingBox, f64)>>;
}

/// Loads a cascade backend from a model file.
pub type CascadeLoader = fn(&Path) -> MediaResult<Box<dyn CascadeBackend>>;

/// Rescale level weights into `[min_score, 0.998]`.
///
/// The batch minimum and maximum are widened by 5% of their magnitude so no
/// score saturates at the bounds. A batch of equal weights maps to the middle
/// of the range.
pub fn normalize_weights(weights: &[f64], min_score: f32) -> Vec<f32> {
    if weights.is_empty() {
        return Vec::new();
    }
    let min = weights.iter().copied().fold(f64::INFINITY, f64::min);
    let max = weights.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let lo = min - min.abs() * WEIGHT_MARGIN;
    let hi = max + max.abs() * WEIGHT_MARGIN;
    let low_score = min_score as f64;
    let high_score = MAX_CASCADE_SCORE as f64;

    if (hi - lo).abs() < f64::EPSILON {
        let mid = ((low_score + high_score) / 2.0) as f32;
        return vec![mid; weights.len()];
    }
    weights
        .iter()
        .map(|w| {
            let score = low_score + (w - lo) * (high_score - low_score) / (hi - lo);
            score.clamp(low_score, high_score) as f32
        })
        .collect()
}

pub struct HaarCascadeDetector {
    backend: Option<Box<dyn CascadeBackend>>,
    loader: CascadeLoader,
    detections: DetectionSet,
    settings: DetectorSettings,
}

impl Default for HaarCascadeDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl HaarCascadeDetector {
    /// Detector loading models with the OpenCV cascade classifier.
    pub fn new() -> Self {
        Self::with_loader(load_cascade)
    }

    pub fn with_loader(loader: CascadeLoader) -> Self {
        Self {
            backend: None,
            loader,
            detections: DetectionSet::new(),
            settings: DetectorSettings::default(),
        }
    }

    /// Detector using an already loaded backend.
    pub fn with_backend(backend: Box<dyn CascadeBackend>) -> Self {
        let mut detector = Self::new();
        detector.backend = Some(backend);
        detector
    }
}

impl ObjectDetector for HaarCascadeDetector {
    fn extension(&self) -> &'static str {
        "xml"
    }

    fn load_model(&mut self, path: &Path) -> MediaResult<()> {
        check_model_path(path, self.extension())?;
        self.backend = Some((self.loader)(path)?);
        self.detections.clear();
        info!(model = %path.display(), "Loaded Haar cascade");
        Ok(())
    }

    fn is_loaded(&self) -> bool {
        self.backend.is_some()
    }

    fn detect(&mut self, image: &RgbImage) -> MediaResult<()> {
        self.detections.clear();
        let backend = self.backend.as_mut().ok_or(MediaError::ModelNotLoaded)?;

        let (width, height) = image.dimensions();
        let min_size = (
            (width as f32 * self.settings.min_ratio) as u32,
            (height as f32 * self.settings.min_ratio) as u32,
        );
        let hits: Vec<(BoundingBox, f64)> = backend
            .detect_multi_scale(image, min_size)?
            .into_iter()
            .filter(|(b, _)| self.settings.is_large_enough(b, width, height))
            .collect();

        let weights: Vec<f64> = hits.iter().map(|(_, w)| *w).collect();
        let scores = normalize_weights(&weights, self.settings.min_score);
        let mut boxes = Vec::with_capacity(hits.len());
        for ((bbox, _), score) in hits.into_iter().zip(scores) {
            if score > self.settings.min_score {
                boxes.push(bbox.with_confidence(score)?);
            }
        }
        self.detections = DetectionSet::from_boxes(boxes);
        debug!(faces = self.detections.len(), "Haar cascade detection");
        Ok(())
    }

    fn detections(&self) -> &DetectionSet {
        &self.detections
    }

    fn detections_mut(&mut self) -> &mut DetectionSet {
        &mut self.detections
    }

    fn settings(&self) -> &DetectorSettings {
        &self.settings
    }

    fn settings_mut(&mut self) -> &mut DetectorSettings {
        &mut self.settings
    }

    /// The cascade already suppresses overlapping hits.
    fn filter_overlapped(&mut self, _overlap_pct: f32) {}
}

#[cfg(feature = "opencv")]
fn load_cascade(path: &Path) -> MediaResult<Box<dyn CascadeBackend>> {
    cv::OpencvCascade::load(path).map(|c| Box::new(c) as Box<dyn CascadeBackend>)
}

#[cfg(not(feature = "opencv"))]
fn load_cascade(_path: &Path) -> MediaResult<Box<dyn CascadeBackend>> {
    Err(MediaError::detection_failed("OpenCV feature not enabled"))
}

#[cfg(feature = "opencv")]
mod cv {
    use super::CascadeBackend;
    use crate::error::{MediaError, MediaResult};
    use crate::image_utils::mat::rgb_image_to_gray_mat;
    use facetrack_models::BoundingBox;
    use image::RgbImage;
    use opencv::{
        core::{Rect, Size, Vector},
        imgproc,
        objdetect::CascadeClassifier,
        prelude::*,
    };
    use std::path::Path;

    const SCALE_FACTOR: f64 = 1.1;
    const MIN_NEIGHBORS: i32 = 3;

    pub struct OpencvCascade {
        classifier: CascadeClassifier,
    }

    impl OpencvCascade {
        pub fn load(path: &Path) -> MediaResult<Self> {
            let classifier = CascadeClassifier::new(&path.to_string_lossy())
                .map_err(|e| MediaError::model_load(format!("{}: {}", path.display(), e)))?;
            if classifier.empty().unwrap_or(true) {
                return Err(MediaError::model_load(format!(
                    "{}: not a cascade classifier",
                    path.display()
                )));
            }
            Ok(Self { classifier })
        }
    }

    impl CascadeBackend for OpencvCascade {
        fn detect_multi_scale(
            &mut self,
            image: &RgbImage,
            min_size: (u32, u32),
        ) -> MediaResult<Vec<(BoundingBox, f64)>> {
            let gray = rgb_image_to_gray_mat(image)?;
            let mut equalized = opencv::core::Mat::default();
            imgproc::equalize_hist(&gray, &mut equalized)?;

            let mut rects = Vector::<Rect>::new();
            let mut levels = Vector::<i32>::new();
            let mut weights = Vector::<f64>::new();
            self.classifier.detect_multi_scale3(
                &equalized,
                &mut rects,
                &mut levels,
                &mut weights,
                SCALE_FACTOR,
                MIN_NEIGHBORS,
                0,
                Size::new(min_size.0 as i32, min_size.1 as i32),
                Size::default(),
                true,
            )?;

            let mut hits = Vec::with_capacity(rects.len());
            for (rect, weight) in rects.iter().zip(weights.iter()) {
                let bbox = BoundingBox::new(
                    rect.x.max(0) as u32,
                    rect.y.max(0) as u32,
                    rect.width.max(0) as u32,
                    rect.height.max(0) as u32,
                )?;
                hits.push((bbox, weight));
            }
            Ok(hits)
        }
    }
}
