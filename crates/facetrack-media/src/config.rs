//! Tracker configuration.

use crate::error::{MediaError, MediaResult};
use crate::image_utils::is_image_extension;
use crate::output::{DEFAULT_IMAGE_EXTENSION, DEFAULT_VIDEO_EXTENSION};
use crate::tracking::{FaceTracker, FaceTrackingBuffer};
use crate::video::{fourcc_for_extension, VideoReader, DEFAULT_BUFFER_OVERLAP, DEFAULT_BUFFER_SIZE};
use facetrack_models::FaceTrackingOptions;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Settings of one tracking session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackerConfig {
    /// Frames per window
    pub buffer_size: usize,
    /// Frames carried from one window to the next
    pub overlap: usize,
    /// Output video extension
    pub video_ext: String,
    /// Output image extension
    pub image_ext: String,
    #[serde(default)]
    pub options: FaceTrackingOptions,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            buffer_size: DEFAULT_BUFFER_SIZE,
            overlap: DEFAULT_BUFFER_OVERLAP,
            video_ext: DEFAULT_VIDEO_EXTENSION.to_string(),
            image_ext: DEFAULT_IMAGE_EXTENSION.to_string(),
            options: FaceTrackingOptions::default(),
        }
    }
}

impl TrackerConfig {
    /// Create config from environment variables.
    ///
    /// Reads `FACETRACK_BUFFER_SIZE`, `FACETRACK_BUFFER_OVERLAP`,
    /// `FACETRACK_VIDEO_EXT` and `FACETRACK_IMAGE_EXT`.
    pub fn from_env() -> Self {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    fn from_vars(var: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let number = |key: &str, default: usize| match var(key) {
            Some(s) => s.trim().parse().unwrap_or_else(|_| {
                warn!(key, value = %s, default, "Invalid number, using default");
                default
            }),
            None => default,
        };
        Self {
            buffer_size: number("FACETRACK_BUFFER_SIZE", defaults.buffer_size),
            overlap: number("FACETRACK_BUFFER_OVERLAP", defaults.overlap),
            video_ext: var("FACETRACK_VIDEO_EXT").unwrap_or(defaults.video_ext),
            image_ext: var("FACETRACK_IMAGE_EXT").unwrap_or(defaults.image_ext),
            options: defaults.options,
        }
    }

    pub fn with_options(mut self, options: FaceTrackingOptions) -> Self {
        self.options = options;
        self
    }

    /// Check window sizes, extensions and options.
    pub fn validate(&self) -> MediaResult<()> {
        if self.buffer_size == 0 {
            return Err(MediaError::InvalidBufferSize(self.buffer_size));
        }
        if self.overlap >= self.buffer_size {
            return Err(MediaError::InvalidOverlap {
                overlap: self.overlap,
                size: self.buffer_size,
            });
        }
        fourcc_for_extension(&self.video_ext)?;
        let image_ext = self.image_ext.trim_start_matches('.');
        if !is_image_extension(image_ext) {
            return Err(MediaError::UnsupportedFormat(format!(
                "image extension '{image_ext}'"
            )));
        }
        self.options.validate()?;
        Ok(())
    }

    /// Tracker reading frames from `reader`, without any model loaded.
    pub fn build_tracker(&self, reader: Box<dyn VideoReader>) -> MediaResult<FaceTracker> {
        self.validate()?;
        let buffer =
            FaceTrackingBuffer::new(reader, self.buffer_size, self.overlap, self.options.clone())?;
        Ok(FaceTracker::new(buffer).with_extensions(&self.video_ext, &self.image_ext))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::video::MemoryVideoReader;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = TrackerConfig::default();
        assert_eq!(config.buffer_size, 200);
        assert_eq!(config.overlap, 0);
        assert_eq!(config.video_ext, "mp4");
        assert_eq!(config.image_ext, "png");
        config.validate().unwrap();
    }

    #[test]
    fn test_from_vars() {
        let vars: HashMap<&str, &str> = [
            ("FACETRACK_BUFFER_SIZE", "50"),
            ("FACETRACK_BUFFER_OVERLAP", "oops"),
            ("FACETRACK_VIDEO_EXT", "avi"),
        ]
        .into_iter()
        .collect();
        let config = TrackerConfig::from_vars(|k| vars.get(k).map(|v| v.to_string()));
        assert_eq!(config.buffer_size, 50);
        assert_eq!(config.overlap, 0);
        assert_eq!(config.video_ext, "avi");
        assert_eq!(config.image_ext, "png");
    }

    #[test]
    fn test_validate() {
        let bad_overlap = TrackerConfig {
            buffer_size: 10,
            overlap: 10,
            ..TrackerConfig::default()
        };
        assert!(matches!(
            bad_overlap.validate(),
            Err(MediaError::InvalidOverlap { overlap: 10, size: 10 })
        ));
        let bad_ext = TrackerConfig {
            image_ext: "txt".to_string(),
            ..TrackerConfig::default()
        };
        assert!(matches!(bad_ext.validate(), Err(MediaError::UnsupportedFormat(_))));
        let bad_score = TrackerConfig::default().with_options(FaceTrackingOptions {
            score: 1.5,
            ..FaceTrackingOptions::default()
        });
        assert!(matches!(bad_score.validate(), Err(MediaError::Options(_))));
    }

    #[test]
    fn test_build_tracker() {
        let config = TrackerConfig {
            buffer_size: 4,
            overlap: 1,
            ..TrackerConfig::default()
        };
        let reader = Box::new(MemoryVideoReader::new(vec![image::RgbImage::new(8, 8)], 25.0));
        let tracker = config.build_tracker(reader).unwrap();
        assert_eq!(tracker.buffer().video().size(), 4);
        assert_eq!(tracker.buffer().video().overlap(), 1);
    }
}
