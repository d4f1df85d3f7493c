//! In-memory collaborators shared by unit tests.

use crate::detection::dnn::DetectionRow;
use crate::detection::{
    CascadeBackend, DetectionSet, DetectorSettings, LandmarkDetector, NetBackend, ObjectDetector,
};
use crate::error::{MediaError, MediaResult};
use crate::video::{VideoSink, VideoSinkFactory};
use facetrack_models::BoundingBox;
use image::RgbImage;
use ndarray::Array4;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

pub fn scored(x: u32, y: u32, w: u32, h: u32, confidence: f32) -> BoundingBox {
    BoundingBox::new(x, y, w, h)
        .unwrap()
        .with_confidence(confidence)
        .unwrap()
}

/// Detector returning the same boxes for every image.
pub struct StaticDetector {
    boxes: Vec<BoundingBox>,
    detections: DetectionSet,
    settings: DetectorSettings,
}

impl StaticDetector {
    pub fn new(boxes: Vec<BoundingBox>) -> Self {
        Self {
            boxes,
            detections: DetectionSet::default(),
            settings: DetectorSettings::default(),
        }
    }
}

impl ObjectDetector for StaticDetector {
    fn extension(&self) -> &'static str {
        "mock"
    }

    fn load_model(&mut self, _path: &Path) -> MediaResult<()> {
        Ok(())
    }

    fn is_loaded(&self) -> bool {
        true
    }

    fn detect(&mut self, _image: &RgbImage) -> MediaResult<()> {
        self.detections = DetectionSet::from_boxes(self.boxes.clone());
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
}

/// Cascade returning fixed hits.
#[derive(Default)]
pub struct FixedCascade {
    hits: Vec<(BoundingBox, f64)>,
}

impl FixedCascade {
    pub fn new(hits: Vec<(BoundingBox, f64)>) -> Self {
        Self { hits }
    }
}

impl CascadeBackend for FixedCascade {
    fn detect_multi_scale(
        &mut self,
        _image: &RgbImage,
        min_size: (u32, u32),
    ) -> MediaResult<Vec<(BoundingBox, f64)>> {
        Ok(self
            .hits
            .iter()
            .filter(|(b, _)| b.w() >= min_size.0 && b.h() >= min_size.1)
            .copied()
            .collect())
    }
}

/// Network returning fixed output rows.
#[derive(Default)]
pub struct FixedNet {
    rows: Vec<DetectionRow>,
}

impl FixedNet {
    pub fn new(rows: Vec<DetectionRow>) -> Self {
        Self { rows }
    }
}

impl NetBackend for FixedNet {
    fn forward(&mut self, _blob: &Array4<f32>) -> MediaResult<Vec<DetectionRow>> {
        Ok(self.rows.clone())
    }
}

/// Landmark detector returning the same points for every face.
pub struct FixedLandmarks(pub Vec<(i32, i32)>);

impl LandmarkDetector for FixedLandmarks {
    fn load_model(&mut self, _path: &Path) -> MediaResult<()> {
        Ok(())
    }

    fn is_loaded(&self) -> bool {
        true
    }

    fn detect(&mut self, _face: &RgbImage) -> MediaResult<Vec<(i32, i32)>> {
        Ok(self.0.clone())
    }
}

/// Landmark detector failing on faces narrower than `min_width`.
pub struct FailingLandmarks {
    pub min_width: u32,
}

impl LandmarkDetector for FailingLandmarks {
    fn load_model(&mut self, _path: &Path) -> MediaResult<()> {
        Ok(())
    }

    fn is_loaded(&self) -> bool {
        true
    }

    fn detect(&mut self, face: &RgbImage) -> MediaResult<Vec<(i32, i32)>> {
        if face.width() < self.min_width {
            return Err(MediaError::detection_failed("face too small"));
        }
        Ok(vec![(0, 0)])
    }
}

#[derive(Default)]
struct Recorded {
    frames: Vec<RgbImage>,
    closed: bool,
}

/// Video sinks keeping written frames in memory, keyed by path.
#[derive(Clone, Default)]
pub struct RecordingSinks {
    videos: Arc<Mutex<BTreeMap<PathBuf, Recorded>>>,
}

impl RecordingSinks {
    pub fn frames(&self, path: &Path) -> Vec<RgbImage> {
        self.videos
            .lock()
            .unwrap()
            .get(path)
            .map(|r| r.frames.clone())
            .unwrap_or_default()
    }

    pub fn is_closed(&self, path: &Path) -> bool {
        self.videos
            .lock()
            .unwrap()
            .get(path)
            .is_some_and(|r| r.closed)
    }
}

struct RecordingSink {
    path: PathBuf,
    videos: Arc<Mutex<BTreeMap<PathBuf, Recorded>>>,
}

impl VideoSink for RecordingSink {
    fn write(&mut self, frame: &RgbImage) -> MediaResult<()> {
        let mut videos = self.videos.lock().unwrap();
        videos.entry(self.path.clone()).or_default().frames.push(frame.clone());
        Ok(())
    }

    fn close(&mut self) -> MediaResult<()> {
        let mut videos = self.videos.lock().unwrap();
        videos.entry(self.path.clone()).or_default().closed = true;
        Ok(())
    }
}

impl VideoSinkFactory for RecordingSinks {
    fn create(&self, path: &Path, _fps: f64, _size: (u32, u32)) -> MediaResult<Box<dyn VideoSink>> {
        self.videos
            .lock()
            .unwrap()
            .insert(path.to_path_buf(), Recorded::default());
        Ok(Box::new(RecordingSink {
            path: path.to_path_buf(),
            videos: Arc::clone(&self.videos),
        }))
    }
}
