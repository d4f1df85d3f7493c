//! Multi-model detector merging the results of several detectors.

use super::detection_set::{DetectionSet, DEFAULT_OVERLAP_PCT};
use super::detector::{DetectorSettings, ObjectDetector};
use super::dnn::NeuralNetDetector;
use super::haar::HaarCascadeDetector;
use crate::error::{MediaError, MediaResult};
use facetrack_models::BoundingBox;
use image::RgbImage;
use std::path::Path;
use tracing::{debug, info};

/// Creates an empty detector for one model format.
pub type DetectorFactory = fn() -> Box<dyn ObjectDetector>;

fn haar_factory() -> Box<dyn ObjectDetector> {
    Box::new(HaarCascadeDetector::new())
}

fn dnn_factory() -> Box<dyn ObjectDetector> {
    Box::new(NeuralNetDetector::new())
}

/// Maps model file extensions to detector factories.
#[derive(Clone)]
pub struct DetectorRegistry {
    factories: Vec<(&'static str, DetectorFactory)>,
}

impl Default for DetectorRegistry {
    fn default() -> Self {
        Self {
            factories: vec![("xml", haar_factory), ("caffemodel", dnn_factory)],
        }
    }
}

impl DetectorRegistry {
    /// Registry without any format.
    pub fn empty() -> Self {
        Self {
            factories: Vec::new(),
        }
    }

    /// Register a factory, replacing any previous one for `extension`.
    pub fn register(&mut self, extension: &'static str, factory: DetectorFactory) {
        self.factories.retain(|(ext, _)| *ext != extension);
        self.factories.push((extension, factory));
    }

    pub fn extensions(&self) -> Vec<&'static str> {
        self.factories.iter().map(|(ext, _)| *ext).collect()
    }

    /// New detector able to load the model at `path`.
    pub fn create_for(&self, path: &Path) -> MediaResult<Box<dyn ObjectDetector>> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();
        self.factories
            .iter()
            .find(|(e, _)| *e == ext)
            .map(|(_, factory)| factory())
            .ok_or_else(|| {
                MediaError::UnsupportedFormat(format!("model {} has no matching detector", path.display()))
            })
    }
}

/// Runs several detectors and merges their detections.
///
/// Each confidence is divided by the number of detectors. Overlapping boxes
/// found by different detectors are merged into the most confident one,
/// which receives the sum of their confidences.
pub struct CompositeDetector {
    detectors: Vec<Box<dyn ObjectDetector>>,
    registry: DetectorRegistry,
    detections: DetectionSet,
    settings: DetectorSettings,
}

impl Default for CompositeDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl CompositeDetector {
    pub fn new() -> Self {
        Self::with_registry(DetectorRegistry::default())
    }

    pub fn with_registry(registry: DetectorRegistry) -> Self {
        Self {
            detectors: Vec::new(),
            registry,
            detections: DetectionSet::new(),
            settings: DetectorSettings::default(),
        }
    }

    /// Append an already configured detector.
    pub fn add_detector(&mut self, mut detector: Box<dyn ObjectDetector>) -> MediaResult<()> {
        detector.set_min_score(self.settings.min_score)?;
        detector.set_min_ratio(self.settings.min_ratio)?;
        self.detectors.push(detector);
        self.detections.clear();
        Ok(())
    }

    /// Replace all detectors by the ones loading `paths`.
    pub fn load_models<P: AsRef<Path>>(&mut self, paths: &[P]) -> MediaResult<()> {
        self.detectors.clear();
        self.detections.clear();
        for path in paths {
            self.load_model(path.as_ref())?;
        }
        Ok(())
    }

    pub fn detector_count(&self) -> usize {
        self.detectors.len()
    }

    /// Merge detections of different sources, most confident first.
    fn merge(items: Vec<(usize, BoundingBox)>) -> MediaResult<Vec<BoundingBox>> {
        let mut items = items;
        items.sort_by(|a, b| b.1.confidence().total_cmp(&a.1.confidence()));
        let mut cancelled = vec![false; items.len()];

        for i in 0..items.len() {
            if cancelled[i] {
                continue;
            }
            for j in (i + 1)..items.len() {
                if cancelled[j] || items[i].0 == items[j].0 {
                    continue;
                }
                let (pct_i, pct_j) = items[i].1.overlap(&items[j].1);
                if pct_i > DEFAULT_OVERLAP_PCT || pct_j > DEFAULT_OVERLAP_PCT {
                    let merged = (items[i].1.confidence() + items[j].1.confidence()).min(1.0);
                    items[i].1.set_confidence(merged)?;
                    items[j].1.set_confidence(0.0)?;
                    cancelled[j] = true;
                }
            }
        }

        Ok(items
            .into_iter()
            .zip(cancelled)
            .filter(|(_, c)| !c)
            .map(|((_, b), _)| b)
            .collect())
    }
}

impl ObjectDetector for CompositeDetector {
    /// Any extension known to the registry is accepted.
    fn extension(&self) -> &'static str {
        "*"
    }

    /// Create a detector for the model format and append it.
    fn load_model(&mut self, path: &Path) -> MediaResult<()> {
        let mut detector = self.registry.create_for(path)?;
        detector.set_min_score(self.settings.min_score)?;
        detector.set_min_ratio(self.settings.min_ratio)?;
        detector.load_model(path)?;
        self.detectors.push(detector);
        self.detections.clear();
        info!(model = %path.display(), detectors = self.detectors.len(), "Added face model");
        Ok(())
    }

    fn is_loaded(&self) -> bool {
        !self.detectors.is_empty() && self.detectors.iter().all(|d| d.is_loaded())
    }

    fn detect(&mut self, image: &RgbImage) -> MediaResult<()> {
        self.detections.clear();
        if self.detectors.is_empty() {
            return Err(MediaError::ModelNotLoaded);
        }

        let count = self.detectors.len() as f32;
        let mut items = Vec::new();
        for (source, detector) in self.detectors.iter_mut().enumerate() {
            detector.detect(image)?;
            for bbox in detector.detections() {
                let scaled = bbox.with_confidence(bbox.confidence() / count)?;
                items.push((source, scaled));
            }
        }
        let candidates = items.len();

        let merged = Self::merge(items)?;
        let min_score = self.settings.min_score;
        let kept = merged
            .into_iter()
            .filter(|b| b.confidence() > min_score)
            .collect();
        self.detections = DetectionSet::from_boxes(kept);
        debug!(candidates, faces = self.detections.len(), "Composite detection");
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

    fn set_min_score(&mut self, value: f32) -> MediaResult<()> {
        self.settings.set_min_score(value)?;
        for detector in &mut self.detectors {
            detector.set_min_score(value)?;
        }
        Ok(())
    }

    fn set_min_ratio(&mut self, value: f32) -> MediaResult<()> {
        self.settings.set_min_ratio(value)?;
        for detector in &mut self.detectors {
            detector.set_min_ratio(value)?;
        }
        Ok(())
    }
}
