//! Facial landmark detection on cropped faces.
//!
//! The LBF (Local Binary Features) facemark model yields 68 points per face.
//! It needs OpenCV's contrib face module and is only built with the
//! `facemark` feature.

use crate::error::{MediaError, MediaResult};
use image::RgbImage;
use std::path::Path;

/// Model file extension of the LBF facemark model.
pub const LBF_EXTENSION: &str = "yaml";

/// Number of points produced by the LBF model.
pub const LBF_POINTS: usize = 68;

/// Detects landmark points on a face image.
pub trait LandmarkDetector: Send {
    fn load_model(&mut self, path: &Path) -> MediaResult<()>;

    fn is_loaded(&self) -> bool;

    /// Landmarks of the face filling `face`, in `face` pixel coordinates.
    fn detect(&mut self, face: &RgbImage) -> MediaResult<Vec<(i32, i32)>>;
}

/// Create a landmark detector and load its model.
#[cfg(feature = "facemark")]
pub fn load_landmark_detector(path: &Path) -> MediaResult<Box<dyn LandmarkDetector>> {
    let mut detector = lbf::LbfLandmarkDetector::new()?;
    detector.load_model(path)?;
    Ok(Box::new(detector))
}

/// Create a landmark detector and load its model.
#[cfg(not(feature = "facemark"))]
pub fn load_landmark_detector(path: &Path) -> MediaResult<Box<dyn LandmarkDetector>> {
    super::detector::check_model_path(path, LBF_EXTENSION)?;
    Err(MediaError::detection_failed("facemark feature not enabled"))
}

#[cfg(feature = "facemark")]
pub use self::lbf::LbfLandmarkDetector;

#[cfg(feature = "facemark")]
mod lbf {
    use super::{LandmarkDetector, LBF_EXTENSION};
    use crate::detection::detector::check_model_path;
    use crate::error::{MediaError, MediaResult};
    use crate::image_utils::mat::rgb_image_to_gray_mat;
    use image::RgbImage;
    use opencv::{
        core::{Point2f, Ptr, Rect, Vector},
        face::{self, Facemark},
        prelude::*,
    };
    use std::path::Path;
    use tracing::info;

    pub struct LbfLandmarkDetector {
        facemark: Ptr<Facemark>,
        loaded: bool,
    }

    impl LbfLandmarkDetector {
        pub fn new() -> MediaResult<Self> {
            let facemark = face::create_facemark_lbf()?;
            Ok(Self {
                facemark,
                loaded: false,
            })
        }
    }

    impl LandmarkDetector for LbfLandmarkDetector {
        fn load_model(&mut self, path: &Path) -> MediaResult<()> {
            check_model_path(path, LBF_EXTENSION)?;
            self.facemark
                .load_model(&path.to_string_lossy())
                .map_err(|e| MediaError::model_load(format!("{}: {}", path.display(), e)))?;
            self.loaded = true;
            info!(model = %path.display(), "Loaded LBF facemark model");
            Ok(())
        }

        fn is_loaded(&self) -> bool {
            self.loaded
        }

        fn detect(&mut self, face: &RgbImage) -> MediaResult<Vec<(i32, i32)>> {
            if !self.loaded {
                return Err(MediaError::ModelNotLoaded);
            }
            let gray = rgb_image_to_gray_mat(face)?;
            let mut rects = Vector::<Rect>::new();
            rects.push(Rect::new(0, 0, face.width() as i32, face.height() as i32));
            let mut shapes = Vector::<Vector<Point2f>>::new();

            if !self.facemark.fit(&gray, &rects, &mut shapes)? || shapes.is_empty() {
                return Err(MediaError::detection_failed("no landmarks fitted"));
            }
            let points = shapes.get(0)?;
            Ok(points
                .iter()
                .map(|p| (p.x.round() as i32, p.y.round() as i32))
                .collect())
        }
    }
}
