//! Tracking result outputs.
//!
//! - [`csv`]: one semicolon separated row per detected face
//! - [`tagging`]: frames annotated with boxes and landmarks
//! - [`writer`]: [`ResultWriter`] fanning results out to CSV, videos and folders

pub mod csv;
pub mod tagging;
pub mod writer;

pub use csv::{image_name, read_csv, CsvFace, CsvRow, CsvWriter};
pub use tagging::{person_color, tag_image};
pub use writer::{ResultWriter, DEFAULT_IMAGE_EXTENSION, DEFAULT_VIDEO_EXTENSION};
