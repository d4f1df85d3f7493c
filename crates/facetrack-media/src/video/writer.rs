//! Video encoders used by the result writers.

use crate::error::{MediaError, MediaResult};
use image::RgbImage;
use std::path::Path;

/// FOURCC codes keyed by output extension.
pub const FOURCC_TABLE: &[(&str, [char; 4])] = &[
    ("mp4", ['m', 'p', '4', 'v']),
    ("m4v", ['m', 'p', '4', 'v']),
    ("avi", ['M', 'J', 'P', 'G']),
    ("mkv", ['X', '2', '6', '4']),
    ("webm", ['V', 'P', '8', '0']),
    ("ogv", ['T', 'H', 'E', 'O']),
];

/// FOURCC code for an output extension (with or without leading dot).
pub fn fourcc_for_extension(ext: &str) -> MediaResult<[char; 4]> {
    let ext = ext.trim_start_matches('.').to_ascii_lowercase();
    FOURCC_TABLE
        .iter()
        .find(|(e, _)| *e == ext)
        .map(|(_, code)| *code)
        .ok_or_else(|| MediaError::UnsupportedFormat(format!("video extension '{ext}'")))
}

/// An open video encoder.
///
/// The frame size is fixed when the sink is created; frames of another size
/// are resized before encoding.
pub trait VideoSink: Send {
    fn write(&mut self, frame: &RgbImage) -> MediaResult<()>;

    /// Flush and release the encoder.
    fn close(&mut self) -> MediaResult<()>;
}

/// Creates video sinks for output paths.
pub trait VideoSinkFactory: Send {
    fn create(&self, path: &Path, fps: f64, size: (u32, u32)) -> MediaResult<Box<dyn VideoSink>>;
}

#[cfg(feature = "opencv")]
pub use self::cv::{OpencvVideoSink, OpencvVideoSinkFactory};

#[cfg(feature = "opencv")]
mod cv {
    use super::{fourcc_for_extension, VideoSink, VideoSinkFactory};
    use crate::error::{MediaError, MediaResult};
    use crate::image_utils::{mat::rgb_image_to_mat, resize};
    use image::RgbImage;
    use opencv::{core::Size, prelude::*, videoio::VideoWriter};
    use std::path::Path;
    use tracing::info;

    pub struct OpencvVideoSink {
        writer: Option<VideoWriter>,
        size: (u32, u32),
    }

    impl VideoSink for OpencvVideoSink {
        fn write(&mut self, frame: &RgbImage) -> MediaResult<()> {
            let writer = self
                .writer
                .as_mut()
                .ok_or_else(|| MediaError::video_write("write on a closed video"))?;
            let mat = if frame.dimensions() == self.size {
                rgb_image_to_mat(frame)?
            } else {
                rgb_image_to_mat(&resize(frame, self.size.0 as i32, self.size.1 as i32))?
            };
            writer
                .write(&mat)
                .map_err(|e| MediaError::video_write(e.to_string()))
        }

        fn close(&mut self) -> MediaResult<()> {
            if let Some(mut writer) = self.writer.take() {
                writer
                    .release()
                    .map_err(|e| MediaError::video_write(e.to_string()))?;
            }
            Ok(())
        }
    }

    #[derive(Debug, Default, Clone, Copy)]
    pub struct OpencvVideoSinkFactory;

    impl VideoSinkFactory for OpencvVideoSinkFactory {
        fn create(
            &self,
            path: &Path,
            fps: f64,
            size: (u32, u32),
        ) -> MediaResult<Box<dyn VideoSink>> {
            let ext = path.extension().and_then(|e| e.to_str()).unwrap_or_default();
            let [a, b, c, d] = fourcc_for_extension(ext)?;
            let fourcc = VideoWriter::fourcc(a, b, c, d)?;
            let writer = VideoWriter::new(
                &path.to_string_lossy(),
                fourcc,
                fps,
                Size::new(size.0 as i32, size.1 as i32),
                true,
            )
            .map_err(|e| MediaError::video_write(format!("{}: {}", path.display(), e)))?;
            if !writer.is_opened().unwrap_or(false) {
                return Err(MediaError::video_write(format!(
                    "{}: encoder could not be opened",
                    path.display()
                )));
            }
            info!(path = %path.display(), fps, width = size.0, height = size.1, "Created video writer");
            Ok(Box::new(OpencvVideoSink {
                writer: Some(writer),
                size,
            }))
        }
    }
}
