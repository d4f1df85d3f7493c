//! Options controlling a face tracking run and its outputs.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while building or updating [`FaceTrackingOptions`].
#[derive(Debug, Clone, PartialEq, Error)]
pub enum OptionsError {
    #[error("Unknown annotation option: {0}")]
    UnknownOption(String),

    #[error("Invalid value '{value}' for option '{key}': {reason}")]
    InvalidValue {
        key: String,
        value: String,
        reason: String,
    },
}

impl OptionsError {
    fn invalid(key: &str, value: &str, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
            reason: reason.into(),
        }
    }
}

/// Immutable configuration handed to the tracking buffer and result writers.
///
/// Changing an option means building a new value; writers never observe a
/// mutation mid-run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FaceTrackingOptions {
    /// Maximum number of faces kept per frame (0 = unlimited)
    pub nbest: usize,
    /// Minimum confidence a face must exceed
    pub score: f32,
    /// Write detections to a CSV file
    pub csv: bool,
    /// Draw detections onto a copy of each frame
    pub tag: bool,
    /// Extract one sub-image per detected face
    pub crop: bool,
    /// Route tagged/cropped frames into video files
    pub video: bool,
    /// Route tagged/cropped frames into image folders
    pub folder: bool,
    /// Output width (0 or negative = no resize)
    pub width: i32,
    /// Output height (0 or negative = no resize)
    pub height: i32,
    /// Reframe face boxes into head-and-shoulders portraits
    pub portrait: bool,
}

impl Default for FaceTrackingOptions {
    fn default() -> Self {
        Self {
            nbest: 0,
            score: 0.2,
            csv: true,
            tag: false,
            crop: false,
            video: false,
            folder: false,
            width: 0,
            height: 0,
            portrait: false,
        }
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool, OptionsError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(OptionsError::invalid(key, value, "expected a boolean")),
    }
}

fn parse_num<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, OptionsError>
where
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e: T::Err| OptionsError::invalid(key, value, e.to_string()))
}

impl FaceTrackingOptions {
    /// Option keys accepted by [`set_option`](Self::set_option).
    pub const KEYS: [&'static str; 10] = [
        "nbest", "score", "csv", "tag", "crop", "video", "folder", "width", "height", "portrait",
    ];

    /// Options writing nothing but the CSV file.
    pub fn csv_only() -> Self {
        Self::default()
    }

    /// Options writing one tagged video next to the CSV file.
    pub fn tagged_video() -> Self {
        Self {
            tag: true,
            video: true,
            ..Self::default()
        }
    }

    /// Options writing per-person portrait crops into image folders.
    pub fn portrait_folders(width: i32, height: i32) -> Self {
        Self {
            crop: true,
            folder: true,
            portrait: true,
            width,
            height,
            ..Self::default()
        }
    }

    pub fn with_nbest(mut self, nbest: usize) -> Self {
        self.nbest = nbest;
        self
    }

    pub fn with_score(mut self, score: f32) -> Self {
        self.score = score;
        self
    }

    pub fn with_portrait(mut self, portrait: bool) -> Self {
        self.portrait = portrait;
        self
    }

    pub fn with_size(mut self, width: i32, height: i32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    /// Target output size, `None` when no dimension requests a resize.
    pub fn resize_to(&self) -> Option<(u32, u32)> {
        if self.width <= 0 && self.height <= 0 {
            None
        } else {
            Some((self.width.max(0) as u32, self.height.max(0) as u32))
        }
    }

    /// Whether any image-producing output is enabled.
    pub fn has_image_output(&self) -> bool {
        (self.tag || self.crop) && (self.video || self.folder)
    }

    /// Check value ranges.
    pub fn validate(&self) -> Result<(), OptionsError> {
        if !(0.0..=1.0).contains(&self.score) {
            return Err(OptionsError::invalid(
                "score",
                &self.score.to_string(),
                "must be in range [0, 1]",
            ));
        }
        Ok(())
    }

    /// Set one option from its textual key and value.
    pub fn set_option(&mut self, key: &str, value: &str) -> Result<(), OptionsError> {
        match key.trim().to_ascii_lowercase().as_str() {
            "nbest" => self.nbest = parse_num(key, value)?,
            "score" => {
                let score: f32 = parse_num(key, value)?;
                if !(0.0..=1.0).contains(&score) {
                    return Err(OptionsError::invalid(key, value, "must be in range [0, 1]"));
                }
                self.score = score;
            }
            "csv" => self.csv = parse_bool(key, value)?,
            "tag" => self.tag = parse_bool(key, value)?,
            "crop" => self.crop = parse_bool(key, value)?,
            "video" => self.video = parse_bool(key, value)?,
            "folder" => self.folder = parse_bool(key, value)?,
            "width" => self.width = parse_num(key, value)?,
            "height" => self.height = parse_num(key, value)?,
            "portrait" => self.portrait = parse_bool(key, value)?,
            _ => return Err(OptionsError::UnknownOption(key.to_string())),
        }
        Ok(())
    }

    /// Copy of these options with one key replaced.
    pub fn with_option(&self, key: &str, value: &str) -> Result<Self, OptionsError> {
        let mut updated = self.clone();
        updated.set_option(key, value)?;
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let opts = FaceTrackingOptions::default();
        assert_eq!(opts.nbest, 0);
        assert!(opts.csv);
        assert!(!opts.portrait);
        assert!(opts.resize_to().is_none());
        assert!(opts.validate().is_ok());
    }

    #[test]
    fn test_set_option_parses_values() {
        let mut opts = FaceTrackingOptions::default();
        opts.set_option("nbest", "2").unwrap();
        opts.set_option("score", "0.5").unwrap();
        opts.set_option("Tag", "True").unwrap();
        opts.set_option("width", "-1").unwrap();
        opts.set_option("height", "480").unwrap();
        assert_eq!(opts.nbest, 2);
        assert_eq!(opts.score, 0.5);
        assert!(opts.tag);
        assert_eq!(opts.resize_to(), Some((0, 480)));
    }

    #[test]
    fn test_unknown_option() {
        let mut opts = FaceTrackingOptions::default();
        let err = opts.set_option("colour", "red").unwrap_err();
        assert_eq!(err, OptionsError::UnknownOption("colour".to_string()));
    }

    #[test]
    fn test_invalid_values() {
        let mut opts = FaceTrackingOptions::default();
        assert!(matches!(
            opts.set_option("score", "1.5"),
            Err(OptionsError::InvalidValue { .. })
        ));
        assert!(matches!(
            opts.set_option("csv", "maybe"),
            Err(OptionsError::InvalidValue { .. })
        ));
        assert!(matches!(
            opts.set_option("nbest", "-3"),
            Err(OptionsError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_with_option_leaves_original() {
        let opts = FaceTrackingOptions::default();
        let updated = opts.with_option("portrait", "yes").unwrap();
        assert!(updated.portrait);
        assert!(!opts.portrait);
    }

    #[test]
    fn test_presets() {
        assert!(FaceTrackingOptions::tagged_video().has_image_output());
        assert!(!FaceTrackingOptions::csv_only().has_image_output());
        let p = FaceTrackingOptions::portrait_folders(320, 480);
        assert!(p.portrait && p.crop && p.folder);
    }

    #[test]
    fn test_serde_defaults_missing_fields() {
        let opts: FaceTrackingOptions = serde_json::from_str(r#"{"nbest": 1}"#).unwrap();
        assert_eq!(opts.nbest, 1);
        assert!(opts.csv);
    }
}
