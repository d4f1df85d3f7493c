//! Deep neural network face detector (Caffe SSD model).
//!
//! The model is a `.caffemodel` weights file with its `.prototxt` topology
//! beside it. Input frames are resized to 300x300, converted to BGR and
//! mean-subtracted before the forward pass.

use super::detection_set::{DetectionSet, DEFAULT_OVERLAP_PCT};
use super::detector::{check_model_path, DetectorSettings, ObjectDetector};
use crate::error::{MediaError, MediaResult};
use facetrack_models::BoundingBox;
use image::imageops::{self, FilterType};
use image::RgbImage;
use ndarray::Array4;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Network input width and height.
pub const DNN_INPUT_SIZE: u32 = 300;

/// Per-channel mean subtracted from the input, in BGR order.
pub const DNN_MEAN_BGR: [f32; 3] = [104.0, 177.0, 123.0];

/// One output row: `[image_id, label, confidence, x1, y1, x2, y2]` with
/// coordinates normalized to `[0, 1]`.
pub type DetectionRow = [f32; 7];

/// Runs the forward pass of a loaded network.
pub trait NetBackend: Send {
    fn forward(&mut self, blob: &Array4<f32>) -> MediaResult<Vec<DetectionRow>>;
}

/// Loads a network from its weights and topology files.
pub type NetLoader = fn(&Path, &Path) -> MediaResult<Box<dyn NetBackend>>;

/// Build the NCHW input blob for an image.
pub fn blob_from_image(image: &RgbImage) -> Array4<f32> {
    let size = DNN_INPUT_SIZE as usize;
    let resized = imageops::resize(image, DNN_INPUT_SIZE, DNN_INPUT_SIZE, FilterType::Triangle);
    let mut blob = Array4::<f32>::zeros((1, 3, size, size));
    for (x, y, pixel) in resized.enumerate_pixels() {
        let (x, y) = (x as usize, y as usize);
        blob[[0, 0, y, x]] = pixel[2] as f32 - DNN_MEAN_BGR[0];
        blob[[0, 1, y, x]] = pixel[1] as f32 - DNN_MEAN_BGR[1];
        blob[[0, 2, y, x]] = pixel[0] as f32 - DNN_MEAN_BGR[2];
    }
    blob
}

/// Topology file expected beside a weights file.
pub fn companion_path(model: &Path) -> PathBuf {
    model.with_extension("prototxt")
}

fn project(value: f32, extent: u32) -> u32 {
    (value.clamp(0.0, 1.0) * extent as f32) as u32
}

pub struct NeuralNetDetector {
    backend: Option<Box<dyn NetBackend>>,
    loader: NetLoader,
    detections: DetectionSet,
    settings: DetectorSettings,
}

impl Default for NeuralNetDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl NeuralNetDetector {
    /// Detector loading models with the OpenCV DNN module.
    pub fn new() -> Self {
        Self::with_loader(load_caffe)
    }

    pub fn with_loader(loader: NetLoader) -> Self {
        Self {
            backend: None,
            loader,
            detections: DetectionSet::new(),
            settings: DetectorSettings::default(),
        }
    }

    /// Detector using an already loaded backend.
    pub fn with_backend(backend: Box<dyn NetBackend>) -> Self {
        let mut detector = Self::new();
        detector.backend = Some(backend);
        detector
    }

    /// Convert network rows into boxes in image coordinates.
    fn boxes_from_rows(&self, rows: &[DetectionRow], width: u32, height: u32) -> MediaResult<Vec<BoundingBox>> {
        let mut boxes = Vec::new();
        for row in rows {
            let confidence = row[2];
            if !(confidence > self.settings.min_score) {
                continue;
            }
            let (x1, y1) = (project(row[3], width), project(row[4], height));
            let (x2, y2) = (project(row[5], width), project(row[6], height));
            if x2 <= x1 || y2 <= y1 {
                continue;
            }
            let bbox = BoundingBox::new(x1, y1, x2 - x1, y2 - y1)?;
            if self.settings.is_large_enough(&bbox, width, height) {
                boxes.push(bbox.with_confidence(confidence.min(1.0))?);
            }
        }
        Ok(boxes)
    }
}

impl ObjectDetector for NeuralNetDetector {
    fn extension(&self) -> &'static str {
        "caffemodel"
    }

    fn load_model(&mut self, path: &Path) -> MediaResult<()> {
        check_model_path(path, self.extension())?;
        let topology = companion_path(path);
        if !topology.is_file() {
            return Err(MediaError::model_not_found(topology));
        }
        self.backend = Some((self.loader)(path, &topology)?);
        self.detections.clear();
        info!(model = %path.display(), topology = %topology.display(), "Loaded DNN face model");
        Ok(())
    }

    fn is_loaded(&self) -> bool {
        self.backend.is_some()
    }

    fn detect(&mut self, image: &RgbImage) -> MediaResult<()> {
        self.detections.clear();
        let backend = self.backend.as_mut().ok_or(MediaError::ModelNotLoaded)?;

        let blob = blob_from_image(image);
        let rows = backend.forward(&blob)?;
        let (width, height) = image.dimensions();
        let boxes = self.boxes_from_rows(&rows, width, height)?;

        self.detections = DetectionSet::from_boxes(boxes);
        self.filter_overlapped(DEFAULT_OVERLAP_PCT);
        debug!(rows = rows.len(), faces = self.detections.len(), "DNN detection");
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

#[cfg(feature = "opencv")]
fn load_caffe(model: &Path, topology: &Path) -> MediaResult<Box<dyn NetBackend>> {
    cv::OpencvNet::load(model, topology).map(|n| Box::new(n) as Box<dyn NetBackend>)
}

#[cfg(not(feature = "opencv"))]
fn load_caffe(_model: &Path, _topology: &Path) -> MediaResult<Box<dyn NetBackend>> {
    Err(MediaError::detection_failed("OpenCV feature not enabled"))
}

#[cfg(feature = "opencv")]
mod cv {
    use super::{DetectionRow, NetBackend};
    use crate::error::{MediaError, MediaResult};
    use ndarray::Array4;
    use opencv::{core::Mat, dnn, prelude::*};
    use std::path::Path;

    pub struct OpencvNet {
        net: dnn::Net,
    }

    impl OpencvNet {
        pub fn load(model: &Path, topology: &Path) -> MediaResult<Self> {
            let net = dnn::read_net_from_caffe(&topology.to_string_lossy(), &model.to_string_lossy())
                .map_err(|e| MediaError::model_load(format!("{}: {}", model.display(), e)))?;
            if net.empty().unwrap_or(true) {
                return Err(MediaError::model_load(format!(
                    "{}: empty network",
                    model.display()
                )));
            }
            Ok(Self { net })
        }
    }

    impl NetBackend for OpencvNet {
        fn forward(&mut self, blob: &Array4<f32>) -> MediaResult<Vec<DetectionRow>> {
            let shape: Vec<i32> = blob.shape().iter().map(|d| *d as i32).collect();
            let contiguous = blob.as_standard_layout();
            let data = contiguous
                .as_slice()
                .ok_or_else(|| MediaError::internal("Blob is not contiguous"))?;
            let input = Mat::new_nd_with_data(&shape, data)?;

            self.net.set_input_def(&input)?;
            let output: Mat = self.net.forward_single_def()?;
            let values = output.data_typed::<f32>()?;

            Ok(values
                .chunks_exact(7)
                .map(|c| [c[0], c[1], c[2], c[3], c[4], c[5], c[6]])
                .collect())
        }
    }
}
