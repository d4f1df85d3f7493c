//! Video buffer enriched with per-frame face tracking results.
//!
//! For each frame of the current window the buffer stores the detected
//! faces, one landmark set per face and one person label per face. Results
//! belong to the window they were computed for: moving to another window,
//! resetting or loading models discards them.

use super::persons::{PersonCatalogue, PersonLabel, PersonMatcher};
use crate::detection::landmarks::load_landmark_detector;
use crate::detection::portrait::to_portraits;
use crate::detection::{CompositeDetector, LandmarkDetector, ObjectDetector};
use crate::error::{MediaError, MediaResult};
use crate::image_utils::{blank, crop};
use crate::metrics;
use crate::video::{VideoBuffer, VideoReader};
use facetrack_models::{BoundingBox, FaceTrackingOptions};
use image::RgbImage;
use std::path::Path;
use tracing::{debug, info, warn};

/// Landmark points of one face, in frame coordinates.
pub type Landmarks = Vec<(i32, i32)>;

#[derive(Debug, Clone, Default)]
struct WindowResults {
    faces: Vec<Vec<BoundingBox>>,
    landmarks: Vec<Vec<Landmarks>>,
    persons: Vec<Vec<Option<PersonLabel>>>,
}

pub struct FaceTrackingBuffer {
    video: VideoBuffer,
    detector: CompositeDetector,
    landmarker: Option<Box<dyn LandmarkDetector>>,
    matcher: Option<Box<dyn PersonMatcher>>,
    catalogue: PersonCatalogue,
    options: FaceTrackingOptions,
    results: Option<WindowResults>,
}

impl FaceTrackingBuffer {
    /// Buffer of `size` frames carrying `overlap` frames between windows.
    pub fn new(
        reader: Box<dyn VideoReader>,
        size: usize,
        overlap: usize,
        options: FaceTrackingOptions,
    ) -> MediaResult<Self> {
        Ok(Self::with_video(VideoBuffer::new(reader, size, overlap)?, options))
    }

    pub fn with_video(video: VideoBuffer, options: FaceTrackingOptions) -> Self {
        Self {
            video,
            detector: CompositeDetector::new(),
            landmarker: None,
            matcher: None,
            catalogue: PersonCatalogue::new(),
            options,
            results: None,
        }
    }

    pub fn options(&self) -> &FaceTrackingOptions {
        &self.options
    }

    /// Replace the options; computed results are discarded.
    pub fn set_options(&mut self, options: FaceTrackingOptions) -> MediaResult<()> {
        options.validate()?;
        self.options = options;
        self.results = None;
        Ok(())
    }

    pub fn video(&self) -> &VideoBuffer {
        &self.video
    }

    pub fn detector(&self) -> &CompositeDetector {
        &self.detector
    }

    pub fn catalogue(&self) -> &PersonCatalogue {
        &self.catalogue
    }

    pub fn catalogue_mut(&mut self) -> &mut PersonCatalogue {
        &mut self.catalogue
    }

    // ------------------------------------------------------------------
    // Models
    // ------------------------------------------------------------------

    /// Replace the face detectors by the ones loading `paths`.
    pub fn load_face_models<P: AsRef<Path>>(&mut self, paths: &[P]) -> MediaResult<()> {
        self.results = None;
        self.detector.load_models(paths)
    }

    /// Append an already loaded face detector.
    pub fn add_face_detector(&mut self, detector: Box<dyn ObjectDetector>) -> MediaResult<()> {
        self.results = None;
        self.detector.add_detector(detector)
    }

    pub fn set_min_score(&mut self, value: f32) -> MediaResult<()> {
        self.results = None;
        self.detector.set_min_score(value)
    }

    pub fn set_min_ratio(&mut self, value: f32) -> MediaResult<()> {
        self.results = None;
        self.detector.set_min_ratio(value)
    }

    pub fn load_landmark_model(&mut self, path: &Path) -> MediaResult<()> {
        let detector = load_landmark_detector(path)?;
        self.set_landmark_detector(detector);
        Ok(())
    }

    pub fn set_landmark_detector(&mut self, detector: Box<dyn LandmarkDetector>) {
        self.results = None;
        self.landmarker = Some(detector);
    }

    pub fn has_landmark_detector(&self) -> bool {
        self.landmarker.is_some()
    }

    pub fn set_person_matcher(&mut self, matcher: Box<dyn PersonMatcher>) {
        self.results = None;
        self.matcher = Some(matcher);
    }

    // ------------------------------------------------------------------
    // Video window
    // ------------------------------------------------------------------

    pub fn open(&mut self, path: &Path) -> MediaResult<()> {
        self.results = None;
        self.video.open(path)
    }

    pub fn close(&mut self) {
        self.results = None;
        self.video.close();
    }

    /// Rewind to the first frame and forget the session's persons.
    pub fn reset(&mut self) -> MediaResult<()> {
        self.results = None;
        self.catalogue.clear();
        self.video.reset()
    }

    pub fn seek_buffer(&mut self, frame: usize) -> MediaResult<()> {
        self.results = None;
        self.video.seek_buffer(frame)
    }

    /// Fill the next window; see [`VideoBuffer::next`].
    pub fn next(&mut self) -> MediaResult<bool> {
        self.results = None;
        self.video.next()
    }

    pub fn buffer_range(&self) -> Option<(usize, usize)> {
        self.video.buffer_range()
    }

    fn missing_results_error(&self) -> MediaError {
        if self.video.buffer_range().is_none() {
            MediaError::NoBufferLoaded
        } else {
            MediaError::NotYetComputed("Face detection")
        }
    }

    // ------------------------------------------------------------------
    // Detection
    // ------------------------------------------------------------------

    /// Detect the faces of every frame of the current window.
    pub fn detect_faces_buffer(&mut self) -> MediaResult<()> {
        self.results = None;
        let (begin, end) = self.video.buffer_range().ok_or(MediaError::NoBufferLoaded)?;
        if !self.detector.is_loaded() {
            return Err(MediaError::ModelNotLoaded);
        }

        let score = self.options.score;
        let nbest = self.options.nbest;
        let mut results = WindowResults::default();

        for frame in self.video.frames() {
            self.detector.detect(frame)?;
            if score > self.detector.min_score() {
                self.detector.filter_confidence(score)?;
            }
            if nbest > 0 {
                self.detector.filter_best(nbest);
            }

            let mut boxes = self.detector.detections().as_slice().to_vec();
            if self.options.portrait {
                to_portraits(&mut boxes, frame.width(), frame.height())?;
            }
            results.landmarks.push(vec![Vec::new(); boxes.len()]);
            results.persons.push(vec![None; boxes.len()]);
            results.faces.push(boxes);
        }

        let total: usize = results.faces.iter().map(Vec::len).sum();
        metrics::record_detection(results.faces.len(), total);
        debug!(begin, end, faces = total, "Detected faces in buffer");
        self.results = Some(results);
        Ok(())
    }

    /// Estimate landmarks of every detected face of the current window.
    ///
    /// A face whose estimation fails keeps an empty landmark set.
    pub fn detect_landmarks_buffer(&mut self) -> MediaResult<()> {
        if self.results.is_none() {
            return Err(self.missing_results_error());
        }
        let landmarker = self.landmarker.as_mut().ok_or(MediaError::ModelNotLoaded)?;
        let Some(results) = self.results.as_mut() else {
            return Ok(());
        };
        let begin = self.video.buffer_range().map(|(b, _)| b).unwrap_or(0);

        for (i, frame) in self.video.frames().iter().enumerate() {
            for (j, face) in results.faces[i].iter().enumerate() {
                results.landmarks[i][j].clear();
                let Some(image) = crop(frame, face) else {
                    warn!(frame = begin + i, face = j, "Face lies outside the image");
                    metrics::record_landmark_failure();
                    continue;
                };
                match landmarker.detect(&image) {
                    Ok(points) => {
                        results.landmarks[i][j] = points
                            .into_iter()
                            .map(|(x, y)| (x + face.x() as i32, y + face.y() as i32))
                            .collect();
                    }
                    Err(e) => {
                        warn!(frame = begin + i, face = j, error = %e, "Landmark detection failed");
                        metrics::record_landmark_failure();
                    }
                }
            }
        }
        Ok(())
    }

    /// Give each face of each frame an anonymous identity named after its
    /// index in the frame.
    pub fn set_default_detected_persons(&mut self) -> MediaResult<()> {
        if self.results.is_none() {
            return Err(self.missing_results_error());
        }
        if let Some(results) = self.results.as_mut() {
            for (faces, persons) in results.faces.iter().zip(results.persons.iter_mut()) {
                *persons = (0..faces.len()).map(|j| Some(PersonLabel::anonymous(j))).collect();
            }
        }
        Ok(())
    }

    /// Assign identities with the person matcher.
    ///
    /// Faces matching nobody are added to the catalogue as new anonymous
    /// persons. Without a matcher, anonymous identities are assigned per
    /// face index.
    pub fn detect_persons_buffer(&mut self) -> MediaResult<()> {
        if self.results.is_none() {
            return Err(self.missing_results_error());
        }
        if self.matcher.is_none() {
            debug!("No person matcher, assigning default identities");
            return self.set_default_detected_persons();
        }
        let (Some(matcher), Some(results)) = (self.matcher.as_mut(), self.results.as_mut()) else {
            return Ok(());
        };

        for (i, frame) in self.video.frames().iter().enumerate() {
            let crops: Vec<RgbImage> = results.faces[i]
                .iter()
                .map(|face| crop(frame, face).unwrap_or_else(|| blank(1, 1)))
                .collect();
            let labels = matcher.assign(&crops, &self.catalogue)?;
            if labels.len() != crops.len() {
                return Err(MediaError::internal(format!(
                    "person matcher returned {} labels for {} faces",
                    labels.len(),
                    crops.len()
                )));
            }
            results.persons[i] = labels
                .into_iter()
                .zip(crops)
                .map(|(label, face)| match label {
                    Some(label) => Some(label),
                    None => {
                        let label = self.catalogue.add_unknown(face);
                        info!(identity = %label.identity, "New person");
                        Some(label)
                    }
                })
                .collect();
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Results
    // ------------------------------------------------------------------

    fn window_results(&self, index: usize) -> MediaResult<(&WindowResults, usize)> {
        let i = self.video.check_buffer_index(index)?;
        let results = self
            .results
            .as_ref()
            .ok_or(MediaError::NotYetComputed("Face detection"))?;
        Ok((results, i))
    }

    /// Faces detected in the frame at an absolute index.
    pub fn get_detected_faces(&self, index: usize) -> MediaResult<&[BoundingBox]> {
        let (results, i) = self.window_results(index)?;
        Ok(&results.faces[i])
    }

    /// Landmarks of each face of the frame at an absolute index.
    pub fn get_detected_landmarks(&self, index: usize) -> MediaResult<&[Landmarks]> {
        let (results, i) = self.window_results(index)?;
        Ok(&results.landmarks[i])
    }

    /// Person label of each face of the frame at an absolute index.
    pub fn get_detected_persons(&self, index: usize) -> MediaResult<&[Option<PersonLabel>]> {
        let (results, i) = self.window_results(index)?;
        Ok(&results.persons[i])
    }

    /// Frame at an absolute index.
    pub fn frame(&self, index: usize) -> MediaResult<&RgbImage> {
        self.video.frame(index)
    }
}
